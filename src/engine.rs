//! Engine: the single entry point owning workspace root, config, store, and
//! cancellation, tying indexing/training/expansion/scoring/snippets into the
//! query surface (§9: no global state).

use std::path::{Path, PathBuf};

use crate::ann::compute_block_centroids;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::Error;
use crate::expansion::{expand, VectorMode};
use crate::hash::result_id;
use crate::indexer::{run_index, IndexStats};
use crate::scorer::{score_query, ClusterMode, HitInfo, ScoreOptions};
use crate::snippet::{self, SnippetOptions};
use crate::store::Store;
use crate::train::{run_train, TrainStats, SCOPE_MODEL};

pub const APP_NAME: &str = "scopesearch";

pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub vector_mode: VectorMode,
    pub cluster_mode: Option<ClusterMode>,
    pub raw_vectors: bool,
    pub min_similarity: Option<f64>,
    pub max_df_percent: Option<f64>,
    pub expansion_top_k: Option<usize>,
    pub explain: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            vector_mode: VectorMode::None,
            cluster_mode: None,
            raw_vectors: false,
            min_similarity: None,
            max_df_percent: None,
            expansion_top_k: None,
            explain: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AncestorInfo {
    pub block_id: i64,
    pub line_start: i64,
    pub kind: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HitSummary {
    pub expanded_token: String,
    pub originating_query_token: String,
    pub similarity: f64,
    pub lines: Vec<u32>,
    pub contribution: f64,
}

impl From<&HitInfo> for HitSummary {
    fn from(h: &HitInfo) -> Self {
        Self {
            expanded_token: h.expanded_token.clone(),
            originating_query_token: h.originating_query_token.clone(),
            similarity: h.similarity,
            lines: h.lines.clone(),
            contribution: h.contribution,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryResult {
    pub result_id: String,
    pub file_path: String,
    pub file_type: String,
    pub block_id: i64,
    pub line_start: i64,
    pub line_end: i64,
    pub score: f64,
    pub header_text: Option<String>,
    pub snippet: String,
    pub snippet_start: u32,
    pub ancestry: Vec<AncestorInfo>,
    pub hits: Option<Vec<HitSummary>>,
    pub warn: Option<String>,
}

pub struct Engine {
    root: PathBuf,
    config: Config,
    store: Store,
    cancel: CancellationToken,
}

impl Engine {
    pub fn open(root: &Path) -> Result<Self, Error> {
        let cache_dir = root.join(".cache");
        std::fs::create_dir_all(&cache_dir).map_err(|e| Error::Store(format!("{}: {e}", cache_dir.display())))?;
        let db_path = cache_dir.join(format!("{APP_NAME}.db"));
        let store = Store::open(&db_path)?;
        let config = Config::load(root, APP_NAME)?;
        Ok(Self { root: root.to_path_buf(), config, store, cancel: CancellationToken::new() })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self, rebuild: bool, also_train: bool, hidden: bool, no_ignore: bool) -> Result<IndexStats, Error> {
        if rebuild {
            for (file_id, _path) in self.store.all_file_paths()? {
                self.cancel.check()?;
                self.store.delete_file_cascade(file_id)?;
            }
        }
        let stats = run_index(&self.store, &self.root, &self.config.index, hidden, no_ignore, &self.cancel)?;
        if also_train {
            self.train("all")?;
        }
        Ok(stats)
    }

    pub fn train(&self, target: &str) -> Result<TrainStats, Error> {
        let stats = run_train(&self.store, target, &self.cancel)?;
        if target == "scope" || target == "all" {
            compute_block_centroids(&self.store, SCOPE_MODEL, &self.cancel)?;
        }
        Ok(stats)
    }

    pub fn query(&self, text: &str, opts: &QueryOptions) -> Result<Vec<QueryResult>, Error> {
        let qcfg = &self.config.query;
        let expansions = expand(
            &self.store,
            text,
            opts.vector_mode,
            opts.expansion_top_k.unwrap_or(qcfg.expansion_top_k),
            opts.min_similarity.unwrap_or(qcfg.min_similarity),
            opts.max_df_percent.unwrap_or(qcfg.max_df_percent),
            opts.raw_vectors,
        )?;
        if expansions.is_empty() {
            return Ok(Vec::new());
        }

        let cluster_mode = opts.cluster_mode.unwrap_or(match qcfg.cluster_mode.as_str() {
            "concentration" => ClusterMode::Concentration,
            _ => ClusterMode::Centroid,
        });
        let score_opts = ScoreOptions {
            top_k: opts.top_k.unwrap_or(qcfg.top_k),
            max_candidates: qcfg.max_candidates,
            raw_vectors: opts.raw_vectors,
            cluster_mode,
        };
        let scored = score_query(&self.store, &expansions, &score_opts)?;

        let mut out = Vec::with_capacity(scored.len());
        for r in scored {
            let Some(file) = self.store.get_file(r.file_id)? else { continue };
            let Some(block) = self.store.get_block(r.block_id)? else { continue };

            let abs_path = self.root.join(&file.path);
            let snippet = match std::fs::read_to_string(&abs_path) {
                Ok(content) => {
                    let lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
                    snippet::carve(&lines, block.line_start as u32, block.line_end as u32, &hit_lines(&r.hits), &SnippetOptions::default())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => snippet::missing_file("file not found"),
                Err(_) => snippet::missing_file("read error"),
            };

            let ancestry = self
                .store
                .ancestor_chain(r.block_id)?
                .into_iter()
                .skip(1)
                .map(|b| AncestorInfo { block_id: b.id, line_start: b.line_start, kind: b.kind })
                .collect();

            let header_text = self.store.get_line(r.file_id, block.line_start)?;

            out.push(QueryResult {
                result_id: result_id(&file.path, block.line_start as u32, block.line_end as u32, &file.content_hash),
                file_path: file.path,
                file_type: file.file_type,
                block_id: r.block_id,
                line_start: block.line_start,
                line_end: block.line_end,
                score: r.score,
                header_text,
                snippet: snippet.content,
                snippet_start: snippet.snippet_start,
                ancestry,
                hits: opts.explain.then(|| r.hits.iter().map(HitSummary::from).collect()),
                warn: snippet.warn,
            });
        }
        Ok(out)
    }

    pub fn mark(&self, result_id: &str, verdict: &str, note: Option<&str>) -> Result<(), Error> {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.store.insert_feedback_event(result_id, verdict, note, created_at)
    }

    pub fn keywords(&self, top_n: usize, min_count: i64) -> Result<Vec<(String, i64)>, Error> {
        let mut tokens = self.store.all_tokens_for_keyword_scan()?;
        tokens.retain(|(_, _, df)| *df >= min_count);
        tokens.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
        tokens.truncate(top_n);
        Ok(tokens.into_iter().map(|(_, key, df)| (key, df)).collect())
    }
}

fn hit_lines(hits: &[HitInfo]) -> Vec<u32> {
    let mut lines: Vec<u32> = hits.iter().flat_map(|h| h.lines.iter().copied()).collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = tmp.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        tmp
    }

    #[test]
    fn empty_query_yields_no_results() {
        let tmp = workspace(&[("a.txt", "hello world")]);
        let engine = Engine::open(tmp.path()).unwrap();
        engine.index(false, false, false, false).unwrap();
        let results = engine.query("", &QueryOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn identity_query_finds_hit() {
        let tmp = workspace(&[("a.txt", "a needle in a haystack")]);
        let engine = Engine::open(tmp.path()).unwrap();
        engine.index(false, false, false, false).unwrap();
        let results = engine.query("needle", &QueryOptions::default()).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].file_path, "a.txt");
        assert!(!results[0].result_id.is_empty());
    }

    #[test]
    fn indexing_is_idempotent_on_rebuild() {
        let tmp = workspace(&[("a.txt", "needle")]);
        let engine = Engine::open(tmp.path()).unwrap();
        let first = engine.index(false, false, false, false).unwrap();
        let second = engine.index(true, false, false, false).unwrap();
        assert_eq!(first.files_indexed, second.files_indexed);
    }

    #[test]
    fn expansion_off_vs_on_changes_result_count() {
        let tmp = workspace(&[
            ("a.txt", "retry backoff\nretry backoff"),
            ("b.txt", "retry backoff\nretry backoff"),
        ]);
        let engine = Engine::open(tmp.path()).unwrap();
        engine.index(false, false, false, false).unwrap();
        engine.train("line").unwrap();

        let off = engine.query("retry", &QueryOptions::default()).unwrap();
        let mut on_opts = QueryOptions::default();
        on_opts.vector_mode = VectorMode::Line;
        on_opts.explain = true;
        let on = engine.query("retry", &on_opts).unwrap();

        assert!(!off.is_empty());
        assert!(!on.is_empty());
        assert!(on[0].hits.is_some());
    }
}
