//! Block adapters: build a hierarchical block tree per file without ASTs (§4.3).

mod indent;
mod markdown;
mod window;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Layout,
    Heading,
    Window,
}

/// A block: a contiguous 1-indexed line span with a kind, a nesting level,
/// and an optional parent (index into the same file's block Vec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub level: u32,
    pub line_start: u32,
    pub line_end: u32,
    /// Index into the file's block list, or `None` for a root block.
    pub parent: Option<usize>,
}

/// Adapter output: the block forest plus a per-line block index.
pub struct AdapterResult {
    pub blocks: Vec<Block>,
    /// 1-indexed line -> index into `blocks` (innermost containing block).
    pub block_idx_by_line: Vec<usize>,
}

/// The three-adapter capability set (§9: "adapters are three concrete
/// producers behind a small capability set").
pub trait BlockAdapter {
    fn file_type(&self) -> &'static str;
    fn build_blocks(&self, lines: &[String]) -> AdapterResult;
}

pub use indent::IndentAdapter;
pub use markdown::MarkdownAdapter;
pub use window::WindowAdapter;

/// File classification used to pick an adapter (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Code,
    Config,
    Markdown,
    Text,
}

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "h", "cpp", "cc", "hpp", "cs",
    "rb", "php", "swift", "kt", "scala", "sh", "bash", "zsh", "pl", "lua", "r", "sql", "el",
];
const CONFIG_EXTENSIONS: &[&str] = &[
    "yaml", "yml", "toml", "json", "ini", "cfg", "conf", "env",
];
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdx"];
const CODE_FILENAMES: &[&str] = &["Makefile", "Gemfile", "Dockerfile", "Rakefile", "Vagrantfile"];

pub fn classify(path: &std::path::Path) -> FileKind {
    if let Some(name) = path.file_name().and_then(|n| n.to_str())
        && CODE_FILENAMES.iter().any(|f| f.eq_ignore_ascii_case(name)) {
            return FileKind::Code;
        }
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some(e) if CODE_EXTENSIONS.contains(&e) => FileKind::Code,
        Some(e) if CONFIG_EXTENSIONS.contains(&e) => FileKind::Config,
        Some(e) if MARKDOWN_EXTENSIONS.contains(&e) => FileKind::Markdown,
        _ => FileKind::Text,
    }
}

/// Select the adapter for a classified file (window adapter is the fallback).
pub fn adapter_for(kind: FileKind, tab_width: u32) -> Box<dyn BlockAdapter> {
    match kind {
        FileKind::Code | FileKind::Config => Box::new(IndentAdapter::new(tab_width)),
        FileKind::Markdown => Box::new(MarkdownAdapter),
        FileKind::Text => Box::new(WindowAdapter::default()),
    }
}
