//! Query expansion: tokenize, resolve token ids, optionally expand via the
//! trained neighbor tables (§4.8).

use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::store::Store;
use crate::tokenizer::{tokenize_query, TokenKind};
use crate::train::{LINE_MODEL, SCOPE_MODEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMode {
    None,
    Line,
    Block,
    All,
}

impl VectorMode {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "none" => Ok(VectorMode::None),
            "line" => Ok(VectorMode::Line),
            "block" => Ok(VectorMode::Block),
            "all" => Ok(VectorMode::All),
            other => Err(Error::InvalidOption(format!("unknown vector mode: {other}"))),
        }
    }
}

/// One weighted member of a query token's expansion set. `token_id` is
/// `None` for an unresolved identity entry (§9: unknown tokens carry no
/// postings, so their contribution is a documented no-op). `kind` mirrors it:
/// `None` when unresolved, `Some(kind)` (§4.2 token kind) when resolved
/// (§4.8 step 4).
#[derive(Debug, Clone)]
pub struct ExpansionEntry {
    pub expanded_token: String,
    pub token_id: Option<i64>,
    pub kind: Option<String>,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct QueryTokenExpansion {
    pub original: String,
    pub entries: Vec<ExpansionEntry>,
}

const RRF_K: f64 = 60.0;

/// Resolve a query token key to a (token_id, kind, similarity) triple: exact
/// match first, then a case-insensitive fallback carrying a 0.05 similarity
/// penalty (§4.8 step 2).
fn resolve_token(store: &Store, key: &str) -> Result<Option<(i64, String, f64)>, Error> {
    if let Some((id, kind)) = store.find_token(key)? {
        return Ok(Some((id, kind, 1.0)));
    }
    let lower = key.to_lowercase();
    if lower != key
        && let Some((id, kind)) = store.find_token(&lower)? {
            return Ok(Some((id, kind, 0.95)));
        }
    Ok(None)
}

fn neighbor_entries(
    store: &Store,
    model_name: &str,
    token_id: i64,
    top_m: usize,
    max_df_percent: f64,
    min_similarity: f64,
    file_count: i64,
) -> Result<Vec<(i64, String, f64, usize)>, Error> {
    let model_id = store.model_id(model_name)?;
    let neighbors = store.neighbors(model_id, token_id, top_m)?;
    let mut out = Vec::new();
    for (rank, (neighbor_id, sim_q)) in neighbors.into_iter().enumerate() {
        let similarity = sim_q as f64 / 65535.0;
        if similarity < min_similarity {
            continue;
        }
        let df = store.token_df(neighbor_id)?;
        let df_percent = if file_count > 0 { df as f64 / file_count as f64 * 100.0 } else { 0.0 };
        if df_percent > max_df_percent {
            continue;
        }
        let kind = store.token_kind(neighbor_id)?.unwrap_or_default();
        out.push((neighbor_id, kind, similarity, rank + 1));
    }
    Ok(out)
}

/// Expand a raw query string into a per-query-token list of weighted
/// expansion entries. `raw_vectors` forces every expanded token's
/// similarity to 1.0 (§8 scenario 6).
pub fn expand(
    store: &Store,
    query: &str,
    mode: VectorMode,
    expansion_top_k: usize,
    min_similarity: f64,
    max_df_percent: f64,
    raw_vectors: bool,
) -> Result<Vec<QueryTokenExpansion>, Error> {
    let occurrences = tokenize_query(query);
    let file_count = store.file_count()?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for occ in occurrences {
        if matches!(occ.kind, TokenKind::Symbol) {
            continue;
        }
        if !seen.insert(occ.key.clone()) {
            continue;
        }
        let resolved = resolve_token(store, &occ.key)?;
        let mut entries = vec![ExpansionEntry {
            expanded_token: occ.key.clone(),
            token_id: resolved.as_ref().map(|(id, _, _)| *id),
            kind: resolved.as_ref().map(|(_, kind, _)| kind.clone()),
            similarity: 1.0,
        }];

        if mode != VectorMode::None
            && let Some((token_id, _, _)) = resolved {
                let mut fused: HashMap<i64, (String, f64, f64)> = HashMap::new();

                let mut apply = |rows: Vec<(i64, String, f64, usize)>| {
                    for (neighbor_id, kind, similarity, rank) in rows {
                        if neighbor_id == token_id {
                            continue;
                        }
                        let rrf = 1.0 / (RRF_K + rank as f64);
                        let entry = fused.entry(neighbor_id).or_insert((kind, similarity, 0.0));
                        entry.1 = entry.1.max(similarity);
                        entry.2 += rrf;
                    }
                };

                if matches!(mode, VectorMode::Line | VectorMode::All) {
                    apply(neighbor_entries(store, LINE_MODEL, token_id, expansion_top_k, max_df_percent, min_similarity, file_count)?);
                }
                if matches!(mode, VectorMode::Block | VectorMode::All) {
                    apply(neighbor_entries(store, SCOPE_MODEL, token_id, expansion_top_k, max_df_percent, min_similarity, file_count)?);
                }

                let mut ranked: Vec<(i64, String, f64, f64)> = fused.into_iter().map(|(id, (kind, sim, rrf))| (id, kind, sim, rrf)).collect();
                ranked.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap().then(a.0.cmp(&b.0)));
                ranked.truncate(expansion_top_k);

                for (neighbor_id, kind, similarity, _) in ranked {
                    let key = store.token_key(neighbor_id)?.unwrap_or_default();
                    let sim = if raw_vectors { 1.0 } else { similarity };
                    entries.push(ExpansionEntry { expanded_token: key, token_id: Some(neighbor_id), kind: Some(kind), similarity: sim });
                }
            }

        out.push(QueryTokenExpansion { original: occ.key, entries });
    }

    Ok(out)
}
