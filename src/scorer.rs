//! Scope-aware scorer: collect hits, propagate weighted TF and raw hit
//! counts up the block tree, compute salience and a clustering signal, and
//! rank candidate blocks (§4.9).

use std::collections::{HashMap, HashSet};

use crate::ann::{cosine, project, AnnIndex, DENSE_DIM};
use crate::error::Error;
use crate::expansion::QueryTokenExpansion;
use crate::store::Store;
use crate::train::SCOPE_MODEL;

const SIZE_ALPHA: f64 = 0.5;
const CLUSTER_LAMBDA: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    Concentration,
    Centroid,
}

impl ClusterMode {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "concentration" => Ok(ClusterMode::Concentration),
            "centroid" => Ok(ClusterMode::Centroid),
            other => Err(Error::InvalidOption(format!("unknown cluster mode: {other}"))),
        }
    }
}

/// One originating hit behind a scored result, for `explain` output (§4.11).
#[derive(Debug, Clone)]
pub struct HitInfo {
    pub expanded_token: String,
    pub originating_query_token: String,
    pub similarity: f64,
    pub lines: Vec<u32>,
    pub contribution: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub file_id: i64,
    pub block_id: i64,
    pub score: f64,
    pub salience: f64,
    pub cluster: f64,
    pub distinct_tokens_hit: usize,
    pub total_hit_lines: usize,
    pub hits: Vec<HitInfo>,
}

pub struct ScoreOptions {
    pub top_k: usize,
    pub max_candidates: usize,
    pub raw_vectors: bool,
    pub cluster_mode: ClusterMode,
}

#[derive(Default)]
struct CandidateAccum {
    file_id: i64,
    weighted_tf: HashMap<String, f64>,
    hits: Vec<HitInfo>,
    distinct_tokens: HashSet<String>,
    total_hit_lines: usize,
    child_hit_counts: HashMap<i64, i64>,
}

/// Smoothed inverse document frequency (§4.9 step 3): rarer tokens (lower
/// `df`) score higher, and the `+1` terms keep it defined and positive even
/// at `df == 0` or `df == file_count`.
fn idf(file_count: i64, df: i64) -> f64 {
    ((file_count as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
}

pub fn score_query(store: &Store, expansions: &[QueryTokenExpansion], opts: &ScoreOptions) -> Result<Vec<ScoredResult>, Error> {
    let file_count = store.file_count()?;

    // §4.9 step 3: idf(q) drawn from the primary (identity) expansion's df.
    let mut idf_by_q: HashMap<String, f64> = HashMap::new();
    for qte in expansions {
        let df = match qte.entries.first().and_then(|e| e.token_id) {
            Some(id) => store.token_df(id)?,
            None => 0,
        };
        idf_by_q.insert(qte.original.clone(), idf(file_count, df));
    }

    // §4.9 step 1: collect hits, grouped by the innermost block each hit
    // line falls in.
    let mut leaf_hits: HashMap<i64, (i64, Vec<(String, String, f64, Vec<u32>)>)> = HashMap::new();
    for qte in expansions {
        for entry in &qte.entries {
            let Some(token_id) = entry.token_id else { continue };
            for posting in store.postings_for_token(token_id)? {
                let Some(map) = store.block_line_map(posting.file_id)? else { continue };
                let mut by_block: HashMap<i64, Vec<u32>> = HashMap::new();
                for &line in &posting.lines {
                    let idx = line as usize;
                    if idx >= 1 && idx <= map.len() {
                        by_block.entry(map[idx - 1]).or_default().push(line);
                    }
                }
                for (block_id, lines) in by_block {
                    let bucket = leaf_hits.entry(block_id).or_insert_with(|| (posting.file_id, Vec::new()));
                    bucket.1.push((qte.original.clone(), entry.expanded_token.clone(), entry.similarity, lines));
                }
            }
        }
    }

    // §4.9 step 2: build candidates by walking each hit block's ancestor
    // chain, accumulating weighted TF, hit info, and per-direct-child raw
    // hit counts (used by the concentration clustering signal).
    let mut candidates: HashMap<i64, CandidateAccum> = HashMap::new();
    for (block_id, (file_id, entries)) in &leaf_hits {
        let chain = store.ancestor_chain(*block_id)?;
        if chain.is_empty() {
            continue;
        }
        let raw_hit_lines: i64 = entries.iter().map(|(_, _, _, lines)| lines.len() as i64).sum();

        for node in &chain {
            let acc = candidates.entry(node.id).or_insert_with(|| CandidateAccum { file_id: *file_id, ..Default::default() });
            for (orig_q, expanded_token, similarity, lines) in entries {
                let tf_w = if opts.raw_vectors { lines.len() as f64 } else { lines.len() as f64 * similarity };
                *acc.weighted_tf.entry(orig_q.clone()).or_insert(0.0) += tf_w;
                acc.distinct_tokens.insert(expanded_token.clone());
                acc.total_hit_lines += lines.len();
                let idf = idf_by_q.get(orig_q).copied().unwrap_or(0.0);
                acc.hits.push(HitInfo {
                    expanded_token: expanded_token.clone(),
                    originating_query_token: orig_q.clone(),
                    similarity: *similarity,
                    lines: lines.clone(),
                    contribution: (1.0 + tf_w).ln() * idf,
                });
            }
        }

        for idx in 0..chain.len().saturating_sub(1) {
            let child_id = chain[idx].id;
            let parent_id = chain[idx + 1].id;
            if let Some(parent_acc) = candidates.get_mut(&parent_id) {
                *parent_acc.child_hit_counts.entry(child_id).or_insert(0) += raw_hit_lines;
            }
        }
    }

    // Bound the work: keep only the candidates with the most raw hit lines
    // when there are more than the configured ceiling.
    let mut block_ids: Vec<i64> = candidates.keys().copied().collect();
    if block_ids.len() > opts.max_candidates {
        block_ids.sort_by_key(|id| std::cmp::Reverse(candidates[id].total_hit_lines));
        block_ids.truncate(opts.max_candidates);
    }

    let block_ann = match opts.cluster_mode {
        ClusterMode::Centroid => Some(crate::ann::build_block_ann(store, SCOPE_MODEL)?),
        ClusterMode::Concentration => None,
    };
    let query_centroid = match opts.cluster_mode {
        ClusterMode::Centroid => build_query_centroid(store, expansions)?,
        ClusterMode::Concentration => None,
    };

    let mut scored = Vec::with_capacity(block_ids.len());
    for block_id in block_ids {
        let acc = &candidates[&block_id];
        let Some(block) = store.get_block(block_id)? else { continue };

        let salience = acc
            .weighted_tf
            .iter()
            .map(|(q, tf_w)| (1.0 + tf_w).ln() * idf_by_q.get(q).copied().unwrap_or(0.0))
            .sum::<f64>()
            / (1.0 + block.eligible_token_count as f64).powf(SIZE_ALPHA);

        let cluster = match opts.cluster_mode {
            ClusterMode::Concentration => concentration_cluster(&acc.child_hit_counts),
            ClusterMode::Centroid => centroid_cluster(block_ann.as_ref(), query_centroid.as_ref(), block_id)
                .unwrap_or_else(|| concentration_cluster(&acc.child_hit_counts)),
        };

        let score = salience * (1.0 + CLUSTER_LAMBDA * cluster);
        let mut hits = acc.hits.clone();
        hits.sort_by(|a, b| b.contribution.partial_cmp(&a.contribution).unwrap());

        scored.push(ScoredResult {
            file_id: acc.file_id,
            block_id,
            score,
            salience,
            cluster,
            distinct_tokens_hit: acc.distinct_tokens.len(),
            total_hit_lines: acc.total_hit_lines,
            hits,
        });
    }

    // §4.9 step 7: sort by (score desc, distinct tokens desc, hit lines
    // desc), tie-broken deterministically by (file path, block start).
    struct SortKey {
        file_path: String,
        line_start: i64,
    }
    let mut enriched: Vec<(ScoredResult, SortKey)> = Vec::with_capacity(scored.len());
    for r in scored {
        let file_path = store.get_file(r.file_id)?.map(|f| f.path).unwrap_or_default();
        let line_start = store.get_block(r.block_id)?.map(|b| b.line_start).unwrap_or(0);
        enriched.push((r, SortKey { file_path, line_start }));
    }
    enriched.sort_by(|(a, ak), (b, bk)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap()
            .then(b.distinct_tokens_hit.cmp(&a.distinct_tokens_hit))
            .then(b.total_hit_lines.cmp(&a.total_hit_lines))
            .then_with(|| ak.file_path.cmp(&bk.file_path).then(ak.line_start.cmp(&bk.line_start)))
    });
    enriched.truncate(opts.top_k);
    let mut results: Vec<ScoredResult> = enriched.into_iter().map(|(r, _)| r).collect();

    // §4.9 step 8: ancestor de-duplication, centroid mode only.
    if opts.cluster_mode == ClusterMode::Centroid {
        results = dedup_ancestors(store, results)?;
    }

    Ok(results)
}

/// Entropy-based concentration signal over a candidate's direct-child hit
/// counts: 0 when fewer than two children carry hits, else `1 - H/H_max`
/// so a skewed distribution across children scores higher than a uniform
/// one (§4.9 step 4, §8 scenario 4).
fn concentration_cluster(child_hit_counts: &HashMap<i64, i64>) -> f64 {
    let counts: Vec<i64> = child_hit_counts.values().copied().filter(|&c| c > 0).collect();
    if counts.len() < 2 {
        return 0.0;
    }
    let total: i64 = counts.iter().sum();
    let entropy: f64 = counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    let max_entropy = (counts.len() as f64).ln();
    if max_entropy <= 0.0 {
        return 0.0;
    }
    (1.0 - entropy / max_entropy).clamp(0.0, 1.0)
}

fn centroid_cluster(ann: Option<&AnnIndex>, query_centroid: Option<&[f32; DENSE_DIM]>, block_id: i64) -> Option<f64> {
    let ann = ann?;
    let qc = query_centroid?;
    let block_vec = ann.get(block_id)?;
    Some(cosine(qc, block_vec).clamp(0.0, 1.0) as f64)
}

/// Average the resolved query tokens' own co-occurrence rows under the
/// scope model and project to a dense centroid, for centroid-mode
/// clustering (§4.9 step 4).
fn build_query_centroid(store: &Store, expansions: &[QueryTokenExpansion]) -> Result<Option<[f32; DENSE_DIM]>, Error> {
    let model_id = store.model_id(SCOPE_MODEL)?;
    let mut combined: HashMap<i64, f64> = HashMap::new();
    let mut contributors = 0usize;
    for qte in expansions {
        let Some(token_id) = qte.entries.first().and_then(|e| e.token_id) else { continue };
        let row = store.cooccurrence_for_token(model_id, token_id)?;
        if row.is_empty() {
            continue;
        }
        contributors += 1;
        for (context_id, count) in row {
            *combined.entry(context_id).or_insert(0.0) += count as f64;
        }
    }
    if contributors == 0 {
        return Ok(None);
    }
    for v in combined.values_mut() {
        *v /= contributors as f64;
    }
    let sparse: Vec<(i64, f64)> = combined.into_iter().collect();
    Ok(Some(project(&sparse)))
}

fn dedup_ancestors(store: &Store, results: Vec<ScoredResult>) -> Result<Vec<ScoredResult>, Error> {
    let mut keep = vec![true; results.len()];
    for i in 0..results.len() {
        if !keep[i] {
            continue;
        }
        for j in 0..results.len() {
            if i == j || !keep[j] {
                continue;
            }
            if is_ancestor(store, results[i].block_id, results[j].block_id)? {
                if results[i].score > results[j].score {
                    keep[j] = false;
                } else {
                    keep[i] = false;
                }
            }
        }
    }
    Ok(results.into_iter().zip(keep).filter_map(|(r, k)| k.then_some(r)).collect())
}

fn is_ancestor(store: &Store, ancestor_id: i64, block_id: i64) -> Result<bool, Error> {
    let chain = store.ancestor_chain(block_id)?;
    Ok(chain.iter().skip(1).any(|b| b.id == ancestor_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::IndexConfig;
    use crate::expansion::{expand, VectorMode};
    use crate::indexer::run_index;

    fn indexed(files: &[(&str, &str)]) -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(tmp.path().join(name), content).unwrap();
        }
        let store = Store::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        (tmp, store)
    }

    fn default_opts(cluster_mode: ClusterMode) -> ScoreOptions {
        ScoreOptions { top_k: 100, max_candidates: 1000, raw_vectors: false, cluster_mode }
    }

    #[test]
    fn empty_query_yields_no_results() {
        let (_tmp, store) = indexed(&[("a.txt", "hello world")]);
        let expansions = expand(&store, "", VectorMode::None, 8, 0.0, 100.0, false).unwrap();
        let results = score_query(&store, &expansions, &default_opts(ClusterMode::Concentration)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn identity_hit_scores_and_reports_contribution() {
        let (_tmp, store) = indexed(&[("a.txt", "needle in a haystack")]);
        let expansions = expand(&store, "needle", VectorMode::None, 8, 0.0, 100.0, false).unwrap();
        let results = score_query(&store, &expansions, &default_opts(ClusterMode::Concentration)).unwrap();
        assert!(!results.is_empty());
        let top = &results[0];
        assert!(top.score > 0.0);
        assert_eq!(top.distinct_tokens_hit, 1);
        assert_eq!(top.total_hit_lines, 1);
        assert!(top.hits.iter().any(|h| h.expanded_token == "needle" && h.contribution > 0.0));
    }

    #[test]
    fn concentration_mode_prefers_concentrated_hits() {
        // Markdown headings give genuine sibling blocks (unlike same-level
        // indent blocks, which merge into one, §4.3) so the root's two
        // direct children carry distinct, comparable hit counts.
        let (_tmp, store) = indexed(&[
            ("a.md", "# Module A\n## Retry One\nretry\nretry\nretry\n## Backoff One\nbackoff\n"),
            ("b.md", "# Module B\n## Retry Two\nretry\nretry\n## Backoff Two\nbackoff\nbackoff\n"),
        ]);
        let expansions = expand(&store, "retry backoff", VectorMode::None, 8, 0.0, 100.0, false).unwrap();
        let results = score_query(&store, &expansions, &default_opts(ClusterMode::Concentration)).unwrap();

        let file_a = store.find_file_by_path("a.md").unwrap().unwrap();
        let file_b = store.find_file_by_path("b.md").unwrap().unwrap();
        let root_a = store.top_level_blocks(file_a.id).unwrap().remove(0);
        let root_b = store.top_level_blocks(file_b.id).unwrap().remove(0);

        let score_a = results.iter().find(|r| r.block_id == root_a.id).unwrap().score;
        let score_b = results.iter().find(|r| r.block_id == root_b.id).unwrap().score;
        assert!(score_a > score_b, "concentrated hits ({score_a}) should outrank spread hits ({score_b})");
    }

    #[test]
    fn concentration_cluster_rewards_skew_over_uniform() {
        let skewed: HashMap<i64, i64> = [(1, 3), (2, 1)].into_iter().collect();
        let uniform: HashMap<i64, i64> = [(1, 2), (2, 2)].into_iter().collect();
        assert!(concentration_cluster(&skewed) > concentration_cluster(&uniform));
    }

    #[test]
    fn concentration_cluster_needs_two_active_children() {
        let single: HashMap<i64, i64> = [(1, 5)].into_iter().collect();
        assert_eq!(concentration_cluster(&single), 0.0);
    }

    #[test]
    fn deterministic_tie_break_orders_by_path_then_line() {
        let (_tmp, store) = indexed(&[("b.txt", "needle"), ("a.txt", "needle")]);
        let expansions = expand(&store, "needle", VectorMode::None, 8, 0.0, 100.0, false).unwrap();
        let results = score_query(&store, &expansions, &default_opts(ClusterMode::Concentration)).unwrap();
        assert!(results.len() >= 2);
        let path_of = |file_id: i64| store.get_file(file_id).unwrap().unwrap().path;
        assert!(path_of(results[0].file_id) <= path_of(results[1].file_id));
    }

    #[test]
    fn centroid_mode_falls_back_without_trained_model() {
        let (_tmp, store) = indexed(&[("a.txt", "needle in a haystack")]);
        let expansions = expand(&store, "needle", VectorMode::None, 8, 0.0, 100.0, false).unwrap();
        let results = score_query(&store, &expansions, &default_opts(ClusterMode::Centroid)).unwrap();
        assert!(!results.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn idf_is_monotonically_non_increasing_in_df(
            file_count in 0i64..10_000,
            df_a in 0i64..10_000,
            df_b in 0i64..10_000,
        ) {
            let df_a = df_a.min(file_count);
            let df_b = df_b.min(file_count);
            let (lo, hi) = if df_a <= df_b { (df_a, df_b) } else { (df_b, df_a) };
            proptest::prop_assert!(idf(file_count, lo) >= idf(file_count, hi));
        }
    }
}
