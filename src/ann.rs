//! Dense projector and ANN index: feature-hashed 256-dim token/block vectors
//! and a flat approximate-nearest-neighbor lookup over them (§4.7).

use std::collections::HashMap;

use crate::cancel::CancellationToken;
use crate::error::Error;
use crate::store::Store;

pub const DENSE_DIM: usize = 256;

/// `hash64(x) = ((x*C1) xor ((x*C1)>>17)) * C2`, fixed constants so the
/// projection is stable across runs (§4.7).
pub fn hash64(x: u64) -> u64 {
    let m = x.wrapping_mul(0x0005_DEEC_E66D);
    (m ^ (m >> 17)).wrapping_mul(0x0000_0085_EBCA_6B)
}

fn normalize(v: &mut [f32; DENSE_DIM]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Project a sparse (context_id, weight) vector into a unit-normalized
/// 256-dim dense signature via signed feature hashing.
pub fn project(sparse: &[(i64, f64)]) -> [f32; DENSE_DIM] {
    let mut dense = [0f32; DENSE_DIM];
    for &(context_id, weight) in sparse {
        let h = hash64(context_id as u64);
        let bin = (h & 0xFF) as usize;
        let sign = if (h >> 8) & 1 == 0 { 1.0 } else { -1.0 };
        dense[bin] += sign * weight as f32;
    }
    normalize(&mut dense);
    dense
}

/// Quantize to a little-endian int16 blob, `round(v*32767)` clamped [-1,1].
pub fn quantize(v: &[f32; DENSE_DIM]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DENSE_DIM * 2);
    for &x in v {
        let q = (x.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        out.extend_from_slice(&q.to_le_bytes());
    }
    out
}

pub fn dequantize(bytes: &[u8]) -> Result<[f32; DENSE_DIM], Error> {
    if bytes.len() != DENSE_DIM * 2 {
        return Err(Error::MalformedIndex(format!(
            "dense vector blob has {} bytes, expected {}",
            bytes.len(),
            DENSE_DIM * 2
        )));
    }
    let mut out = [0f32; DENSE_DIM];
    for (i, slot) in out.iter_mut().enumerate() {
        let q = i16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        *slot = q as f32 / 32767.0;
    }
    Ok(out)
}

/// Cosine similarity of two already-unit-normalized vectors is their dot
/// product (§4.7).
pub fn cosine(a: &[f32; DENSE_DIM], b: &[f32; DENSE_DIM]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>().clamp(-1.0, 1.0)
}

/// Flat read-only ANN index over (id, dense vector) pairs. Search is exact
/// brute-force cosine ranking rather than a graph-based approximate index —
/// accurate at the corpus sizes this engine targets, and it keeps the
/// determinism guarantee (§8) trivial to prove.
pub struct AnnIndex {
    entries: Vec<(i64, [f32; DENSE_DIM])>,
}

impl AnnIndex {
    pub fn build<I: IntoIterator<Item = (i64, [f32; DENSE_DIM])>>(iter: I) -> Self {
        let mut entries: Vec<_> = iter.into_iter().collect();
        entries.sort_by_key(|&(id, _)| id);
        Self { entries }
    }

    pub fn get(&self, id: i64) -> Option<&[f32; DENSE_DIM]> {
        self.entries.binary_search_by_key(&id, |&(i, _)| i).ok().map(|idx| &self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate (here: exact) top-K search by cosine similarity,
    /// deterministic given the same input order (ties break by id).
    pub fn search(&self, query: &[f32; DENSE_DIM], top_k: usize) -> Vec<(i64, f32)> {
        let mut scored: Vec<(i64, f32)> = self.entries.iter().map(|&(id, ref v)| (id, cosine(query, v))).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
    }
}

/// Build the token ANN index for a model directly from its stored norms:
/// re-derive each eligible token's co-occurrence row and project it.
pub fn build_token_ann(store: &Store, model_name: &str) -> Result<AnnIndex, Error> {
    let model_id = store.model_id(model_name)?;
    let rows = store.cooccurrence_rows(model_id)?;
    let mut vectors: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
    for (token, context, count) in rows {
        vectors.entry(token).or_default().push((context, count as f64));
    }
    let entries = vectors.into_iter().map(|(token, sparse)| (token, project(&sparse)));
    Ok(AnnIndex::build(entries))
}

/// Build the block-centroid ANN index for a model from stored centroid blobs.
pub fn build_block_ann(store: &Store, model_name: &str) -> Result<AnnIndex, Error> {
    let model_id = store.model_id(model_name)?;
    let mut entries = Vec::new();
    for (block_id, blob) in store.all_block_centroids(model_id)? {
        entries.push((block_id, dequantize(&blob)?));
    }
    Ok(AnnIndex::build(entries))
}

/// Bottom-up block-centroid rollup for a trained model (§4.7). Leaf blocks
/// select their top-IDF tokens and average (IDF-weighted) the tokens'
/// co-occurrence rows before projecting; internal blocks average their
/// direct children's already-computed dense centroids.
pub fn compute_block_centroids(store: &Store, model_name: &str, cancel: &CancellationToken) -> Result<usize, Error> {
    let model_id = store.model_id(model_name)?;
    let rows = store.cooccurrence_rows(model_id)?;
    let mut vectors: HashMap<i64, Vec<(i64, f64)>> = HashMap::new();
    for (token, context, count) in rows {
        vectors.entry(token).or_default().push((context, count as f64));
    }
    let file_count = store.file_count()?;
    let mut written = 0usize;

    for (file_id, _path) in store.all_file_paths()? {
        cancel.check()?;
        let file = store.get_file(file_id)?.ok_or_else(|| Error::MalformedIndex("file row vanished during centroid rollup".into()))?;
        let line_tokens = crate::train::file_line_tokens(store, file_id, file.line_count)?;
        let mut blocks = store.blocks_for_file(file_id)?;
        // Children are always inserted after their parent (§4.5 step 3c), so
        // descending id order visits every child before its parent.
        blocks.sort_by(|a, b| b.id.cmp(&a.id));

        let mut dense_by_block: HashMap<i64, [f32; DENSE_DIM]> = HashMap::new();

        for b in &blocks {
            let children = store.children_of(b.id)?;
            let dense = if children.is_empty() {
                match leaf_centroid(store, &vectors, &line_tokens, b.line_start, b.line_end, file_count)? {
                    Some(d) => d,
                    None => continue,
                }
            } else {
                let mut acc = [0f32; DENSE_DIM];
                let mut n = 0usize;
                for c in &children {
                    if let Some(d) = dense_by_block.get(&c.id) {
                        for i in 0..DENSE_DIM {
                            acc[i] += d[i];
                        }
                        n += 1;
                    }
                }
                if n == 0 {
                    continue;
                }
                for x in acc.iter_mut() {
                    *x /= n as f32;
                }
                normalize(&mut acc);
                acc
            };
            store.upsert_block_centroid(b.id, model_id, &quantize(&dense))?;
            dense_by_block.insert(b.id, dense);
            written += 1;
        }
    }
    Ok(written)
}

fn leaf_centroid(
    store: &Store,
    vectors: &HashMap<i64, Vec<(i64, f64)>>,
    line_tokens: &[Vec<i64>],
    line_start: i64,
    line_end: i64,
    file_count: i64,
) -> Result<Option<[f32; DENSE_DIM]>, Error> {
    let mut token_set: Vec<i64> = Vec::new();
    for l in line_start..=line_end {
        if let Some(toks) = line_tokens.get((l - 1) as usize) {
            for &t in toks {
                if !token_set.contains(&t) {
                    token_set.push(t);
                }
            }
        }
    }
    if token_set.is_empty() {
        return Ok(None);
    }

    let mut with_idf: Vec<(i64, f64)> = Vec::with_capacity(token_set.len());
    for &t in &token_set {
        let df = store.token_df(t)?;
        let idf = ((file_count as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
        with_idf.push((t, idf));
    }
    with_idf.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
    let select_count = ((0.30 * token_set.len() as f64).round() as usize).clamp(8, 64).min(with_idf.len());
    let selected = &with_idf[..select_count];
    let sum_idf: f64 = selected.iter().map(|&(_, idf)| idf).sum();
    if sum_idf <= 0.0 {
        return Ok(None);
    }

    let mut combined: HashMap<i64, f64> = HashMap::new();
    for &(t, idf) in selected {
        if let Some(row) = vectors.get(&t) {
            for &(ctx, w) in row {
                *combined.entry(ctx).or_insert(0.0) += idf * w / sum_idf;
            }
        }
    }
    if combined.is_empty() {
        return Ok(None);
    }
    let sparse: Vec<(i64, f64)> = combined.into_iter().collect();
    Ok(Some(project(&sparse)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::IndexConfig;
    use crate::indexer::run_index;
    use crate::train::{train_line_model, LINE_MODEL};

    #[test]
    fn hash64_is_deterministic() {
        assert_eq!(hash64(42), hash64(42));
        assert_ne!(hash64(42), hash64(43));
    }

    #[test]
    fn project_zero_vector_passes_through() {
        let v = project(&[]);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn project_is_unit_normalized() {
        let v = project(&[(1, 1.0), (2, 2.0), (3, -1.5)]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn quantize_roundtrip_is_close() {
        let v = project(&[(1, 1.0), (99, 3.0)]);
        let blob = quantize(&v);
        let back = dequantize(&blob).unwrap();
        for i in 0..DENSE_DIM {
            assert!((v[i] - back[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn dequantize_rejects_wrong_length() {
        assert!(dequantize(&[0u8; 10]).is_err());
    }

    #[test]
    fn ann_index_get_and_search() {
        let idx = AnnIndex::build(vec![(1, project(&[(1, 1.0)])), (2, project(&[(2, 1.0)])), (3, project(&[(1, 1.0), (2, 0.1)]))]);
        assert!(idx.get(1).is_some());
        assert!(idx.get(999).is_none());
        let results = idx.search(&project(&[(1, 1.0)]), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn block_centroids_cover_leaf_and_internal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.py"), "module alpha\n  def one\n    retry backoff value\n  def two\n    retry backoff other").unwrap();
        let store = Store::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        run_index(&store, tmp.path(), &IndexConfig::default(), false, false, &cancel).unwrap();
        train_line_model(&store, &cancel).unwrap();

        let written = compute_block_centroids(&store, LINE_MODEL, &cancel).unwrap();
        assert!(written > 0);

        let file = store.find_file_by_path("a.py").unwrap().unwrap();
        let model_id = store.model_id(LINE_MODEL).unwrap();
        let root = store.top_level_blocks(file.id).unwrap().into_iter().next().unwrap();
        assert!(store.block_centroid(root.id, model_id).unwrap().is_some());
    }
}
