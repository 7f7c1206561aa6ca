//! CLI argument definitions, one struct per command (§6).

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "scopesearch", about = "Intent-first local code/text search")]
pub struct Cli {
    /// Workspace root; defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    pub root: String,

    /// Output format for commands that produce results.
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Grep,
    Json,
    Jsonl,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// (Re)build the index for the workspace.
    Index(IndexArgs),
    /// Train co-occurrence models and neighbor tables.
    Train(TrainArgs),
    /// Run an intent-first query.
    Query(QueryArgs),
    /// Show the trained neighbors of a single token.
    Terms(TermsArgs),
    /// Print the block outline for matching files.
    Outline(OutlineArgs),
    /// Record feedback on a result id.
    Mark(MarkArgs),
    /// List the most frequent non-stopword tokens.
    Keywords(KeywordsArgs),
}

#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// Discard all indexed state and re-scan from scratch.
    #[arg(long)]
    pub rebuild: bool,
    /// Train all models immediately after indexing.
    #[arg(long)]
    pub train: bool,
    /// Include hidden files and directories.
    #[arg(long)]
    pub hidden: bool,
    /// Ignore .gitignore and other standard ignore files.
    #[arg(long)]
    pub no_ignore: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TrainTarget {
    Line,
    Scope,
    All,
}

#[derive(Parser, Debug)]
pub struct TrainArgs {
    #[arg(long, value_enum, default_value_t = TrainTarget::All)]
    pub model: TrainTarget,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum VectorModeArg {
    None,
    Line,
    Block,
    All,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClusterModeArg {
    Centroid,
    Concentration,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    pub text: String,

    #[arg(long, value_enum)]
    pub vector_mode: Option<VectorModeArg>,
    #[arg(long, value_enum)]
    pub cluster_mode: Option<ClusterModeArg>,
    #[arg(long)]
    pub raw_vectors: bool,
    #[arg(long)]
    pub top_k: Option<usize>,
    #[arg(long)]
    pub min_similarity: Option<f64>,
    #[arg(long)]
    pub max_df_percent: Option<f64>,
    #[arg(long)]
    pub expansion_top_k: Option<usize>,
    #[arg(long)]
    pub explain: bool,
}

#[derive(Parser, Debug)]
pub struct TermsArgs {
    pub token: String,
    #[arg(long, value_enum, default_value_t = VectorModeArg::Line)]
    pub model: VectorModeArg,
    #[arg(long, default_value_t = 8)]
    pub top: usize,
}

#[derive(Parser, Debug)]
pub struct OutlineArgs {
    #[arg(long)]
    pub file: Option<String>,
    #[arg(long)]
    pub level: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct MarkArgs {
    pub result_id: String,
    #[arg(long)]
    pub useful: bool,
    #[arg(long)]
    pub not_useful: bool,
    #[arg(long)]
    pub promising: bool,
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Parser, Debug)]
pub struct KeywordsArgs {
    #[arg(long, default_value_t = 50)]
    pub top: usize,
    #[arg(long, default_value_t = 1)]
    pub min_count: i64,
}
