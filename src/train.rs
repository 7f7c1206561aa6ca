//! Co-occurrence trainer: line & scope models, norms, and quantized neighbors (§4.6).

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::error::Error;
use crate::store::Store;

pub const LINE_MODEL: &str = "line";
pub const SCOPE_MODEL: &str = "scope";

const DEFAULT_WINDOW: usize = 5;
const DEFAULT_MIN_COUNT: f64 = 2.0;
const DEFAULT_TOP_K: usize = 32;

/// Co-occurrence counts are accumulated as floating weights but the schema
/// stores an integer count column; scale up before writing and scale back
/// down when reading, the same fixed-point trick used for quantized
/// similarities elsewhere (§4.6, §4.7).
const WEIGHT_SCALE: f64 = 1000.0;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct TrainStats {
    pub models_trained: usize,
    pub tokens_embedded: usize,
    pub elapsed_ms: u128,
}

/// Flatten a file's postings into a per-line list of distinct token ids,
/// sorted for determinism within a line.
pub(crate) fn file_line_tokens(store: &Store, file_id: i64, line_count: i64) -> Result<Vec<Vec<i64>>, Error> {
    let mut lines: Vec<Vec<i64>> = vec![Vec::new(); line_count.max(0) as usize];
    for (token_id, token_lines) in store.postings_for_file(file_id)? {
        for l in token_lines {
            let idx = l as usize;
            if idx >= 1 && idx <= lines.len() {
                lines[idx - 1].push(token_id);
            }
        }
    }
    for line in &mut lines {
        line.sort_unstable();
        line.dedup();
    }
    Ok(lines)
}

/// Sliding window of radius `window` over a flattened token sequence,
/// weight `(window - |i-j| + 1) / window`, symmetric pair canonicalized to
/// avoid double counting before both directions are written out (§4.6).
fn sliding_window_cells(token_seq: &[i64], window: usize, out: &mut HashMap<(i64, i64), f64>) {
    let n = token_seq.len();
    for i in 0..n {
        for j in (i + 1)..n.min(i + window + 1) {
            if token_seq[i] == token_seq[j] {
                continue;
            }
            let dist = j - i;
            let weight = (window as f64 - dist as f64 + 1.0) / window as f64;
            let (a, b) = if token_seq[i] < token_seq[j] {
                (token_seq[i], token_seq[j])
            } else {
                (token_seq[j], token_seq[i])
            };
            *out.entry((a, b)).or_insert(0.0) += weight;
        }
    }
}

fn write_cells(store: &Store, model_id: i64, cells: &HashMap<(i64, i64), f64>) -> Result<(), Error> {
    let mut batch = Vec::with_capacity(cells.len() * 2);
    for (&(a, b), &w) in cells {
        let scaled = (w * WEIGHT_SCALE).round() as i64;
        if scaled <= 0 {
            continue;
        }
        batch.push((a, b, scaled));
        batch.push((b, a, scaled));
    }
    store.insert_cooc_batch(model_id, &batch)
}

/// Build the line model: one whole-file sliding-window sweep per file,
/// crossing block boundaries freely (documented behavior, §9).
pub fn train_line_model(store: &Store, cancel: &CancellationToken) -> Result<(), Error> {
    let model_id = store.model_id(LINE_MODEL)?;
    store.delete_cooccurrence_for_model(model_id)?;
    for (file_id, _path) in store.all_file_paths()? {
        cancel.check()?;
        let file = store.get_file(file_id)?.ok_or_else(|| Error::MalformedIndex("file row vanished during training".into()))?;
        let line_tokens = file_line_tokens(store, file_id, file.line_count)?;
        let seq: Vec<i64> = line_tokens.into_iter().flatten().collect();
        let mut cells = HashMap::new();
        sliding_window_cells(&seq, DEFAULT_WINDOW, &mut cells);
        write_cells(store, model_id, &cells)?;
    }
    debug!(model = LINE_MODEL, "trained");
    Ok(())
}

/// Build the scope model: leaf blocks sweep their own lines; internal
/// blocks sweep their direct children's header lines; the file root
/// additionally sweeps all top-level block headers (§4.6).
pub fn train_scope_model(store: &Store, cancel: &CancellationToken) -> Result<(), Error> {
    let model_id = store.model_id(SCOPE_MODEL)?;
    store.delete_cooccurrence_for_model(model_id)?;
    for (file_id, _path) in store.all_file_paths()? {
        cancel.check()?;
        let file = store.get_file(file_id)?.ok_or_else(|| Error::MalformedIndex("file row vanished during training".into()))?;
        let line_tokens = file_line_tokens(store, file_id, file.line_count)?;
        let blocks = store.blocks_for_file(file_id)?;
        let mut cells: HashMap<(i64, i64), f64> = HashMap::new();

        for b in &blocks {
            let children = store.children_of(b.id)?;
            let seq: Vec<i64> = if children.is_empty() {
                (b.line_start..=b.line_end)
                    .filter_map(|l| line_tokens.get((l - 1) as usize))
                    .flat_map(|v| v.iter().copied())
                    .collect()
            } else {
                children
                    .iter()
                    .filter_map(|c| line_tokens.get((c.line_start - 1) as usize))
                    .flat_map(|v| v.iter().copied())
                    .collect()
            };
            sliding_window_cells(&seq, DEFAULT_WINDOW, &mut cells);
        }

        let top = store.top_level_blocks(file_id)?;
        let root_seq: Vec<i64> = top
            .iter()
            .filter_map(|b| line_tokens.get((b.line_start - 1) as usize))
            .flat_map(|v| v.iter().copied())
            .collect();
        sliding_window_cells(&root_seq, DEFAULT_WINDOW, &mut cells);

        write_cells(store, model_id, &cells)?;
        let _ = file.file_type;
    }
    debug!(model = SCOPE_MODEL, "trained");
    Ok(())
}

/// Compute top-K quantized neighbors for a trained model (§4.6 step 4-5).
/// Parallelized by disjoint token chunks over `std::thread::scope`; each
/// worker owns its output, the coordinator merges and writes.
pub fn compute_neighbors(store: &Store, model_name: &str, cancel: &CancellationToken) -> Result<usize, Error> {
    let model_id = store.model_id(model_name)?;
    let rows = store.cooccurrence_rows(model_id)?;
    cancel.check()?;

    let mut vectors: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
    let mut inv: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
    let mut totals: HashMap<i64, f64> = HashMap::new();
    for (token, context, count) in rows {
        let w = count as f64 / WEIGHT_SCALE;
        vectors.entry(token).or_default().push((context, w));
        inv.entry(context).or_default().push((token, w));
        *totals.entry(token).or_insert(0.0) += w;
    }

    let mut eligible: Vec<i64> = Vec::new();
    for (&token_id, &total) in &totals {
        if total < DEFAULT_MIN_COUNT {
            continue;
        }
        if let Some(kind) = store.token_kind(token_id)?
            && matches!(kind.as_str(), "ident" | "word" | "compound") {
                eligible.push(token_id);
            }
    }
    eligible.sort_unstable();
    let eligible_set: HashSet<i64> = eligible.iter().copied().collect();

    let mut norms: HashMap<i64, f64> = HashMap::new();
    for &t in &eligible {
        let norm = vectors.get(&t).map(|v| v.iter().map(|&(_, c)| c * c).sum::<f64>().sqrt()).unwrap_or(0.0);
        store.upsert_norm(model_id, t, norm)?;
        norms.insert(t, norm);
    }

    cancel.check()?;

    let num_workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).max(1);
    let chunk_size = eligible.len().div_ceil(num_workers).max(1);
    let chunks: Vec<&[i64]> = eligible.chunks(chunk_size).collect();

    let chunk_results: Vec<Vec<(i64, i64, u16)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .iter()
            .map(|&chunk| {
                let vectors = &vectors;
                let inv = &inv;
                let norms = &norms;
                let eligible_set = &eligible_set;
                scope.spawn(move || {
                    let mut out = Vec::new();
                    for &t in chunk {
                        let mut acc: HashMap<i64, f64> = HashMap::new();
                        if let Some(row) = vectors.get(&t) {
                            for &(context, w_tc) in row {
                                if let Some(ctx_row) = inv.get(&context) {
                                    for &(u, w_uc) in ctx_row {
                                        if u == t || !eligible_set.contains(&u) {
                                            continue;
                                        }
                                        *acc.entry(u).or_insert(0.0) += w_tc * w_uc;
                                    }
                                }
                            }
                        }
                        let norm_t = norms.get(&t).copied().unwrap_or(0.0);
                        let mut sims: Vec<(i64, f64)> = acc
                            .into_iter()
                            .filter_map(|(u, dot)| {
                                let norm_u = norms.get(&u).copied().unwrap_or(0.0);
                                if norm_t <= 0.0 || norm_u <= 0.0 {
                                    return None;
                                }
                                let sim = dot / (norm_t * norm_u);
                                if sim <= 0.0 { None } else { Some((u, sim)) }
                            })
                            .collect();
                        sims.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
                        sims.truncate(DEFAULT_TOP_K);
                        for (u, sim) in sims {
                            let quantized = (sim * 65535.0).round().clamp(0.0, 65535.0) as u16;
                            out.push((t, u, quantized));
                        }
                    }
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("neighbor worker panicked")).collect()
    });

    store.delete_neighbors_for_model(model_id)?;
    let mut tokens_embedded = 0usize;
    for result in chunk_results {
        let mut grouped: HashMap<i64, Vec<(i64, u16)>> = HashMap::new();
        for (t, u, sim) in result {
            grouped.entry(t).or_default().push((u, sim));
        }
        let mut rows_to_insert = Vec::new();
        for (t, neighbors) in grouped {
            tokens_embedded += 1;
            for (rank, (u, sim)) in neighbors.into_iter().enumerate() {
                rows_to_insert.push((t, rank as i64, u, sim));
            }
        }
        if !rows_to_insert.is_empty() {
            store.insert_neighbors_batch(model_id, &rows_to_insert)?;
        }
    }
    info!(model = model_name, tokens_embedded, "neighbors computed");
    Ok(tokens_embedded)
}

/// Run both models plus neighbor computation for the requested target
/// (`"line"`, `"scope"`, or `"all"`).
pub fn run_train(store: &Store, target: &str, cancel: &CancellationToken) -> Result<TrainStats, Error> {
    let start = std::time::Instant::now();
    let mut stats = TrainStats::default();

    if target == "line" || target == "all" {
        train_line_model(store, cancel)?;
        cancel.check()?;
        stats.tokens_embedded += compute_neighbors(store, LINE_MODEL, cancel)?;
        stats.models_trained += 1;
    }
    if target == "scope" || target == "all" {
        train_scope_model(store, cancel)?;
        cancel.check()?;
        stats.tokens_embedded += compute_neighbors(store, SCOPE_MODEL, cancel)?;
        stats.models_trained += 1;
    }
    if stats.models_trained == 0 {
        return Err(Error::InvalidOption(format!("unknown training target: {target}")));
    }

    stats.elapsed_ms = start.elapsed().as_millis();
    Ok(stats)
}
