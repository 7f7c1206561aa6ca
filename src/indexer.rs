//! File scan, classify, tokenize, build blocks & postings, update DF (§4.5).

use std::collections::HashMap;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::blocks::{self, AdapterResult, BlockKind};
use crate::cancel::CancellationToken;
use crate::config::IndexConfig;
use crate::error::Error;
use crate::hash::hash_bytes;
use crate::store::Store;
use crate::tokenizer::{tokenize_lines_with_max_len, TokenKind};
use crate::varint::encode_line_list;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub total_tokens: u64,
    pub elapsed_ms: u128,
}

fn block_kind_str(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Layout => "layout",
        BlockKind::Heading => "heading",
        BlockKind::Window => "window",
    }
}

/// Index every file under `root`, skipping files whose content hash is
/// unchanged, then reconcile files that have disappeared from disk.
pub fn run_index(
    store: &Store,
    root: &Path,
    config: &IndexConfig,
    hidden: bool,
    no_ignore: bool,
    cancel: &CancellationToken,
) -> Result<IndexStats, Error> {
    let start = Instant::now();
    let mut stats = IndexStats::default();

    let mut builder = WalkBuilder::new(root);
    builder.hidden(!hidden);
    builder.git_ignore(!no_ignore);
    builder.git_global(!no_ignore);
    builder.git_exclude(!no_ignore);
    builder.standard_filters(!no_ignore);

    let mut seen_paths = std::collections::HashSet::new();

    for entry in builder.build() {
        cancel.check()?;
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walk error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
        seen_paths.insert(rel.clone());

        match index_one_file(store, root, path, &rel, config) {
            Ok(true) => stats.files_indexed += 1,
            Ok(false) => stats.files_skipped += 1,
            Err(Error::FileRead { path, source }) => {
                warn!(%path, error = %source, "file read error, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    // Reconcile deleted files.
    for (file_id, rel_path) in store.all_file_paths()? {
        cancel.check()?;
        if !seen_paths.contains(&rel_path) {
            store.delete_file_cascade(file_id)?;
            stats.files_removed += 1;
        }
    }

    stats.total_tokens = store.all_tokens_for_keyword_scan()?.len() as u64;
    stats.elapsed_ms = start.elapsed().as_millis();
    info!(files_indexed = stats.files_indexed, files_skipped = stats.files_skipped,
          files_removed = stats.files_removed, elapsed_ms = stats.elapsed_ms, "index complete");
    Ok(stats)
}

/// Index a single file. Returns `Ok(true)` if (re)indexed, `Ok(false)` if
/// skipped because content is unchanged.
fn index_one_file(store: &Store, root: &Path, abs_path: &Path, rel_path: &str, config: &IndexConfig) -> Result<bool, Error> {
    let bytes = std::fs::read(abs_path).map_err(|e| Error::FileRead { path: rel_path.to_string(), source: e })?;
    let content_hash = hash_bytes(&bytes);

    if let Some(existing) = store.find_file_by_path(rel_path)?
        && existing.content_hash == content_hash {
            return Ok(false);
        }

    let metadata = std::fs::metadata(abs_path).map_err(|e| Error::FileRead { path: rel_path.to_string(), source: e })?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let size = metadata.len() as i64;

    let content = String::from_utf8_lossy(&bytes).to_string();
    let lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
    let line_count = lines.len() as i64;

    let file_kind = blocks::classify(abs_path);
    let file_type_str = match file_kind {
        blocks::FileKind::Code => "code",
        blocks::FileKind::Config => "config",
        blocks::FileKind::Markdown => "markdown",
        blocks::FileKind::Text => "text",
    };
    let adapter = blocks::adapter_for(file_kind, config.tab_width);
    let AdapterResult { blocks: adapted_blocks, block_idx_by_line } = adapter.build_blocks(&lines);

    let in_word_context = matches!(file_kind, blocks::FileKind::Markdown | blocks::FileKind::Text);

    let indexed_at = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;

    let token_max_len = config.max_token_len;
    let path_owned = rel_path.to_string();
    let _ = root;

    let tok_result = tokenize_lines_with_max_len(&lines, in_word_context, token_max_len);
    let total_eligible_tokens = tok_result.eligible_token_count;

    store.reindex_file(&path_owned, mtime, size, line_count, &content_hash, indexed_at, file_type_str, move |tx, file_id| {
        // blocks: insert in order (parents precede children by construction).
        let mut global_ids: Vec<i64> = Vec::with_capacity(adapted_blocks.len());
        let mut eligible_counts = vec![0i64; adapted_blocks.len()];

        // per-line eligible token counts, to sum per block below.
        let mut per_line_eligible = vec![0u32; lines.len()];
        for occ in &tok_result.occurrences {
            if matches!(occ.kind, TokenKind::Ident | TokenKind::Word | TokenKind::Compound) {
                let idx = occ.line as usize - 1;
                if idx < per_line_eligible.len() {
                    per_line_eligible[idx] += 1;
                }
            }
        }
        for (i, &block_idx) in block_idx_by_line.iter().enumerate() {
            if block_idx < eligible_counts.len() {
                eligible_counts[block_idx] += per_line_eligible[i] as i64;
            }
        }

        for (local_idx, b) in adapted_blocks.iter().enumerate() {
            let parent_global = b.parent.map(|p| global_ids[p]);
            let global_id = Store::insert_block(
                tx, file_id, block_kind_str(b.kind), b.level as i64,
                b.line_start as i64, b.line_end as i64, parent_global, eligible_counts[local_idx],
            )?;
            global_ids.push(global_id);
        }

        // block-line map: global block ids per line, 1-indexed via index 0.
        let map_ids: Vec<i64> = block_idx_by_line.iter().map(|&i| global_ids[i]).collect();
        Store::upsert_block_line_map(tx, file_id, &Store::encode_block_line_map(&map_ids))?;

        // postings: group occurrences by (key, kind).
        let mut per_token: HashMap<(String, TokenKind), Vec<u32>> = HashMap::new();
        for occ in &tok_result.occurrences {
            if matches!(occ.kind, TokenKind::Symbol) {
                continue;
            }
            per_token.entry((occ.key.clone(), occ.kind)).or_default().push(occ.line);
        }
        for ((key, kind), mut line_list) in per_token {
            line_list.sort_unstable();
            line_list.dedup();
            let tf = line_list.len() as i64;
            let token_id = Store::upsert_token(tx, &key, kind)?;
            Store::upsert_posting(tx, token_id, file_id, tf, &encode_line_list(&line_list))?;
            Store::recompute_df(tx, token_id)?;
        }

        // line cache: only block-start lines, per §4.5 step 3f.
        for b in &adapted_blocks {
            if let Some(text) = lines.get(b.line_start as usize - 1) {
                Store::upsert_line_cache(tx, file_id, b.line_start as i64, text)?;
            }
        }

        Ok(())
    })?;

    debug!(%rel_path, tokens = total_eligible_tokens, "indexed file");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::tests::assert_containment;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = tmp.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let store = Store::open_in_memory().unwrap();
        (tmp, store)
    }

    #[test]
    fn index_builds_files_and_postings() {
        let (tmp, store) = setup(&[("a.txt", "foo bar\nbaz")]);
        let cancel = CancellationToken::new();
        let stats = run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        assert_eq!(stats.files_indexed, 1);
        let file = store.find_file_by_path("a.txt").unwrap().unwrap();
        assert_eq!(file.line_count, 2);
        let (token_id, _) = store.find_token("foo").unwrap().unwrap();
        let postings = store.postings_for_token(token_id).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].lines, vec![1]);
    }

    #[test]
    fn reindex_unchanged_file_is_skipped() {
        let (tmp, store) = setup(&[("a.txt", "foo bar")]);
        let cancel = CancellationToken::new();
        run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        let stats2 = run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        assert_eq!(stats2.files_indexed, 0);
        assert_eq!(stats2.files_skipped, 1);
    }

    #[test]
    fn removed_file_is_reconciled() {
        let (tmp, store) = setup(&[("a.txt", "foo")]);
        let cancel = CancellationToken::new();
        run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        std::fs::remove_file(tmp.path().join("a.txt")).unwrap();
        let stats = run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        assert_eq!(stats.files_removed, 1);
        assert!(store.find_file_by_path("a.txt").unwrap().is_none());
    }

    #[test]
    fn all_blank_file_indexes_without_panic() {
        let (tmp, store) = setup(&[("blank.py", "\n   \n\t\n")]);
        let cancel = CancellationToken::new();
        let stats = run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        assert_eq!(stats.files_indexed, 1);
        let file = store.find_file_by_path("blank.py").unwrap().unwrap();
        let map = store.block_line_map(file.id).unwrap().unwrap();
        assert_eq!(map.len() as i64, file.line_count);
    }

    #[test]
    fn blocks_satisfy_containment_invariant() {
        let (tmp, store) = setup(&[("a.py", "module X\n  def a\n    x = 1\n  def b\n    y = 2")]);
        let cancel = CancellationToken::new();
        run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        let file = store.find_file_by_path("a.py").unwrap().unwrap();
        let blocks = store.blocks_for_file(file.id).unwrap();
        let indexed: Vec<crate::blocks::Block> = blocks.iter().map(|b| crate::blocks::Block {
            kind: crate::blocks::BlockKind::Layout,
            level: b.level as u32,
            line_start: b.line_start as u32,
            line_end: b.line_end as u32,
            parent: b.parent_id.map(|p| blocks.iter().position(|x| x.id == p).unwrap()),
        }).collect();
        assert_containment(&indexed);
    }

    #[test]
    fn line_map_consistency() {
        let (tmp, store) = setup(&[("a.py", "module X\n  def a\n    x = 1\n  def b\n    y = 2")]);
        let cancel = CancellationToken::new();
        run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        let file = store.find_file_by_path("a.py").unwrap().unwrap();
        let map = store.block_line_map(file.id).unwrap().unwrap();
        assert_eq!(map.len() as i64, file.line_count);
        for (i, &block_id) in map.iter().enumerate() {
            let line = (i + 1) as i64;
            let block = store.get_block(block_id).unwrap().unwrap();
            assert!(block.line_start <= line && line <= block.line_end);
        }
    }
}
