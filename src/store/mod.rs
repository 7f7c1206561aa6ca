//! Persistent relational schema + prepared operations (§4.4).
//!
//! A single SQLite database (via `rusqlite`) backs the whole store: one
//! writer at a time, ACID transactions at file granularity, cascading
//! deletes for file -> postings/blocks/block-line-map/line-cache/centroids.

mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Error;
use crate::tokenizer::TokenKind;

pub struct Store {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: i64,
    pub path: String,
    pub content_hash: String,
    pub line_count: i64,
    pub file_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackStats {
    pub useful_count: i64,
    pub not_useful_count: i64,
    pub promising_count: i64,
}

#[derive(Debug, Clone)]
pub struct BlockRow {
    pub id: i64,
    pub file_id: i64,
    pub kind: String,
    pub level: i64,
    pub line_start: i64,
    pub line_end: i64,
    pub parent_id: Option<i64>,
    pub eligible_token_count: i64,
}

#[derive(Debug, Clone)]
pub struct PostingRow {
    pub file_id: i64,
    pub tf: i64,
    pub lines: Vec<u32>,
}

fn kind_str(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Ident => "ident",
        TokenKind::Word => "word",
        TokenKind::Compound => "compound",
        TokenKind::Symbol => "symbol",
        TokenKind::Keyword => "keyword",
    }
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Store(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init(conn: &Connection) -> Result<(), Error> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(())
    }

    // ─── Files ───────────────────────────────────────────────────

    pub fn find_file_by_path(&self, path: &str) -> Result<Option<FileRow>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, path, content_hash, line_count, file_type FROM files WHERE path = ?1",
            params![path],
            |r| Ok(FileRow { id: r.get(0)?, path: r.get(1)?, content_hash: r.get(2)?, line_count: r.get(3)?, file_type: r.get(4)? }),
        ).optional().map_err(Into::into)
    }

    pub fn all_file_paths(&self) -> Result<Vec<(i64, String)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, path FROM files")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn file_count(&self) -> Result<i64, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0)).map_err(Into::into)
    }

    pub fn get_file(&self, file_id: i64) -> Result<Option<FileRow>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, path, content_hash, line_count, file_type FROM files WHERE id = ?1",
            params![file_id],
            |r| Ok(FileRow { id: r.get(0)?, path: r.get(1)?, content_hash: r.get(2)?, line_count: r.get(3)?, file_type: r.get(4)? }),
        ).optional().map_err(Into::into)
    }

    pub fn delete_file_cascade(&self, file_id: i64) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;
        Ok(())
    }

    /// Reindex a single file atomically: delete prior derived rows, insert
    /// the new file row + everything the caller provides within one
    /// transaction. `build` receives a live transaction and the new file id.
    pub fn reindex_file<F>(
        &self,
        path: &str,
        mtime: i64,
        size: i64,
        line_count: i64,
        content_hash: &str,
        indexed_at: i64,
        file_type: &str,
        build: F,
    ) -> Result<i64, Error>
    where
        F: FnOnce(&rusqlite::Transaction, i64) -> Result<(), Error>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        // Deleting first lets ON DELETE CASCADE drop stale postings/blocks/etc.
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        tx.execute(
            "INSERT INTO files (path, mtime, size, line_count, content_hash, indexed_at, file_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![path, mtime, size, line_count, content_hash, indexed_at, file_type],
        )?;
        let file_id = tx.last_insert_rowid();
        build(&tx, file_id)?;
        tx.commit()?;
        Ok(file_id)
    }

    // ─── Tokens ──────────────────────────────────────────────────

    pub fn upsert_token(tx: &rusqlite::Transaction, key: &str, kind: TokenKind) -> Result<i64, Error> {
        let ks = kind_str(kind);
        tx.execute(
            "INSERT INTO tokens (key, kind) VALUES (?1, ?2)
             ON CONFLICT(key, kind) DO NOTHING",
            params![key, ks],
        )?;
        tx.query_row(
            "SELECT id FROM tokens WHERE key = ?1 AND kind = ?2",
            params![key, ks],
            |r| r.get(0),
        ).map_err(Into::into)
    }

    pub fn find_token(&self, key: &str) -> Result<Option<(i64, String)>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, kind FROM tokens WHERE key = ?1 ORDER BY df DESC LIMIT 1",
            params![key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        ).optional().map_err(Into::into)
    }

    pub fn token_df(&self, token_id: i64) -> Result<i64, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT df FROM tokens WHERE id = ?1", params![token_id], |r| r.get(0)).map_err(Into::into)
    }

    pub fn recompute_df(tx: &rusqlite::Transaction, token_id: i64) -> Result<(), Error> {
        tx.execute(
            "UPDATE tokens SET df = (SELECT COUNT(DISTINCT file_id) FROM postings WHERE token_id = ?1) WHERE id = ?1",
            params![token_id],
        )?;
        Ok(())
    }

    pub fn set_keyword_flag(&self, token_id: i64, is_keyword: bool) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE tokens SET is_keyword = ?1 WHERE id = ?2", params![is_keyword as i64, token_id])?;
        Ok(())
    }

    pub fn token_kind(&self, token_id: i64) -> Result<Option<String>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT kind FROM tokens WHERE id = ?1", params![token_id], |r| r.get(0))
            .optional().map_err(Into::into)
    }

    pub fn token_key(&self, token_id: i64) -> Result<Option<String>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT key FROM tokens WHERE id = ?1", params![token_id], |r| r.get(0))
            .optional().map_err(Into::into)
    }

    pub fn all_tokens_for_keyword_scan(&self) -> Result<Vec<(i64, String, i64)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, key, df FROM tokens")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ─── Postings ────────────────────────────────────────────────

    pub fn upsert_posting(tx: &rusqlite::Transaction, token_id: i64, file_id: i64, tf: i64, lines_blob: &[u8]) -> Result<(), Error> {
        tx.execute(
            "INSERT INTO postings (token_id, file_id, tf, lines) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(token_id, file_id) DO UPDATE SET tf = excluded.tf, lines = excluded.lines",
            params![token_id, file_id, tf, lines_blob],
        )?;
        Ok(())
    }

    pub fn postings_for_token(&self, token_id: i64) -> Result<Vec<PostingRow>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT file_id, tf, lines FROM postings WHERE token_id = ?1")?;
        let rows = stmt.query_map(params![token_id], |r| {
            let file_id: i64 = r.get(0)?;
            let tf: i64 = r.get(1)?;
            let blob: Vec<u8> = r.get(2)?;
            Ok((file_id, tf, blob))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (file_id, tf, blob) = row?;
            let lines = crate::varint::decode_line_list(&blob)
                .map_err(|e| Error::MalformedIndex(format!("posting lines: {e}")))?;
            out.push(PostingRow { file_id, tf, lines });
        }
        Ok(out)
    }

    pub fn postings_for_file(&self, file_id: i64) -> Result<Vec<(i64, Vec<u32>)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT token_id, lines FROM postings WHERE file_id = ?1")?;
        let rows = stmt.query_map(params![file_id], |r| {
            let token_id: i64 = r.get(0)?;
            let blob: Vec<u8> = r.get(1)?;
            Ok((token_id, blob))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (token_id, blob) = row?;
            let lines = crate::varint::decode_line_list(&blob)
                .map_err(|e| Error::MalformedIndex(format!("posting lines: {e}")))?;
            out.push((token_id, lines));
        }
        Ok(out)
    }

    // ─── Blocks ──────────────────────────────────────────────────

    pub fn insert_block(
        tx: &rusqlite::Transaction,
        file_id: i64,
        kind: &str,
        level: i64,
        line_start: i64,
        line_end: i64,
        parent_id: Option<i64>,
        eligible_token_count: i64,
    ) -> Result<i64, Error> {
        tx.execute(
            "INSERT INTO blocks (file_id, kind, level, line_start, line_end, parent_id, eligible_token_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![file_id, kind, level, line_start, line_end, parent_id, eligible_token_count],
        )?;
        Ok(tx.last_insert_rowid())
    }

    pub fn get_block(&self, block_id: i64) -> Result<Option<BlockRow>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, file_id, kind, level, line_start, line_end, parent_id, eligible_token_count FROM blocks WHERE id = ?1",
            params![block_id],
            Self::block_row,
        ).optional().map_err(Into::into)
    }

    fn block_row(r: &rusqlite::Row) -> rusqlite::Result<BlockRow> {
        Ok(BlockRow {
            id: r.get(0)?,
            file_id: r.get(1)?,
            kind: r.get(2)?,
            level: r.get(3)?,
            line_start: r.get(4)?,
            line_end: r.get(5)?,
            parent_id: r.get(6)?,
            eligible_token_count: r.get(7)?,
        })
    }

    pub fn blocks_for_file(&self, file_id: i64) -> Result<Vec<BlockRow>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, kind, level, line_start, line_end, parent_id, eligible_token_count FROM blocks WHERE file_id = ?1",
        )?;
        let rows = stmt.query_map(params![file_id], Self::block_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn children_of(&self, block_id: i64) -> Result<Vec<BlockRow>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, kind, level, line_start, line_end, parent_id, eligible_token_count FROM blocks WHERE parent_id = ?1",
        )?;
        let rows = stmt.query_map(params![block_id], Self::block_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn top_level_blocks(&self, file_id: i64) -> Result<Vec<BlockRow>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, kind, level, line_start, line_end, parent_id, eligible_token_count FROM blocks WHERE file_id = ?1 AND parent_id IS NULL",
        )?;
        let rows = stmt.query_map(params![file_id], Self::block_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Ancestor chain from the block itself up to (and including) its root.
    pub fn ancestor_chain(&self, block_id: i64) -> Result<Vec<BlockRow>, Error> {
        let mut chain = Vec::new();
        let mut current = self.get_block(block_id)?;
        while let Some(b) = current {
            let parent = b.parent_id;
            chain.push(b);
            current = match parent {
                Some(p) => self.get_block(p)?,
                None => None,
            };
        }
        Ok(chain)
    }

    // ─── Block-line map ──────────────────────────────────────────

    pub fn upsert_block_line_map(tx: &rusqlite::Transaction, file_id: i64, blob: &[u8]) -> Result<(), Error> {
        tx.execute(
            "INSERT INTO block_line_map (file_id, blob) VALUES (?1, ?2)
             ON CONFLICT(file_id) DO UPDATE SET blob = excluded.blob",
            params![file_id, blob],
        )?;
        Ok(())
    }

    pub fn block_line_map(&self, file_id: i64) -> Result<Option<Vec<i64>>, Error> {
        let conn = self.conn.lock().unwrap();
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT blob FROM block_line_map WHERE file_id = ?1", params![file_id], |r| r.get(0))
            .optional()?;
        match blob {
            None => Ok(None),
            Some(b) => {
                let mut pos = 0;
                let count = crate::varint::decode_u64(&b, &mut pos)
                    .map_err(|e| Error::MalformedIndex(format!("block-line map: {e}")))? as usize;
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    let v = crate::varint::decode_u64(&b, &mut pos)
                        .map_err(|e| Error::MalformedIndex(format!("block-line map: {e}")))?;
                    out.push(v as i64);
                }
                Ok(Some(out))
            }
        }
    }

    pub fn encode_block_line_map(ids: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        crate::varint::encode_u64(ids.len() as u64, &mut out);
        for &id in ids {
            crate::varint::encode_u64(id as u64, &mut out);
        }
        out
    }

    // ─── Line cache ──────────────────────────────────────────────

    pub fn upsert_line_cache(tx: &rusqlite::Transaction, file_id: i64, line_no: i64, text: &str) -> Result<(), Error> {
        tx.execute(
            "INSERT INTO line_cache (file_id, line_no, text) VALUES (?1, ?2, ?3)
             ON CONFLICT(file_id, line_no) DO UPDATE SET text = excluded.text",
            params![file_id, line_no, text],
        )?;
        Ok(())
    }

    pub fn get_line(&self, file_id: i64, line_no: i64) -> Result<Option<String>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT text FROM line_cache WHERE file_id = ?1 AND line_no = ?2",
            params![file_id, line_no],
            |r| r.get(0),
        ).optional().map_err(Into::into)
    }

    // ─── Models ──────────────────────────────────────────────────

    pub fn model_id(&self, name: &str) -> Result<i64, Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO models (name) VALUES (?1) ON CONFLICT(name) DO NOTHING", params![name])?;
        conn.query_row("SELECT id FROM models WHERE name = ?1", params![name], |r| r.get(0)).map_err(Into::into)
    }

    // ─── Co-occurrence ───────────────────────────────────────────

    pub fn delete_cooccurrence_for_model(&self, model_id: i64) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cooccurrence WHERE model_id = ?1", params![model_id])?;
        Ok(())
    }

    /// Insert a batch of co-occurrence cells within one transaction,
    /// accumulating counts on conflict (both directions are written by the
    /// caller, see §4.6).
    pub fn insert_cooc_batch(&self, model_id: i64, cells: &[(i64, i64, i64)]) -> Result<(), Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cooccurrence (model_id, token_id, context_id, count) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(model_id, token_id, context_id) DO UPDATE SET count = count + excluded.count",
            )?;
            for &(t, c, n) in cells {
                stmt.execute(params![model_id, t, c, n])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn cooccurrence_rows(&self, model_id: i64) -> Result<Vec<(i64, i64, i64)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT token_id, context_id, count FROM cooccurrence WHERE model_id = ?1")?;
        let rows = stmt.query_map(params![model_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn cooccurrence_for_token(&self, model_id: i64, token_id: i64) -> Result<Vec<(i64, i64)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT context_id, count FROM cooccurrence WHERE model_id = ?1 AND token_id = ?2")?;
        let rows = stmt.query_map(params![model_id, token_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn upsert_norm(&self, model_id: i64, token_id: i64, norm: f64) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO norms (model_id, token_id, norm) VALUES (?1, ?2, ?3)
             ON CONFLICT(model_id, token_id) DO UPDATE SET norm = excluded.norm",
            params![model_id, token_id, norm],
        )?;
        Ok(())
    }

    pub fn norm(&self, model_id: i64, token_id: i64) -> Result<Option<f64>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT norm FROM norms WHERE model_id = ?1 AND token_id = ?2", params![model_id, token_id], |r| r.get(0))
            .optional().map_err(Into::into)
    }

    pub fn delete_neighbors_for_model(&self, model_id: i64) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM neighbors WHERE model_id = ?1", params![model_id])?;
        Ok(())
    }

    pub fn insert_neighbors_batch(&self, model_id: i64, rows: &[(i64, i64, i64, u16)]) -> Result<(), Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO neighbors (model_id, token_id, rank, neighbor_id, similarity) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for &(token_id, rank, neighbor_id, sim) in rows {
                stmt.execute(params![model_id, token_id, rank, neighbor_id, sim])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn neighbors(&self, model_id: i64, token_id: i64, top_m: usize) -> Result<Vec<(i64, u16)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT neighbor_id, similarity FROM neighbors WHERE model_id = ?1 AND token_id = ?2 ORDER BY rank ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![model_id, token_id, top_m as i64], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ─── Block centroids ─────────────────────────────────────────

    pub fn upsert_block_centroid(&self, block_id: i64, model_id: i64, vector: &[u8]) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO block_centroids (block_id, model_id, vector) VALUES (?1, ?2, ?3)
             ON CONFLICT(block_id, model_id) DO UPDATE SET vector = excluded.vector",
            params![block_id, model_id, vector],
        )?;
        Ok(())
    }

    pub fn block_centroid(&self, block_id: i64, model_id: i64) -> Result<Option<Vec<u8>>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT vector FROM block_centroids WHERE block_id = ?1 AND model_id = ?2",
            params![block_id, model_id],
            |r| r.get(0),
        ).optional().map_err(Into::into)
    }

    pub fn all_block_centroids(&self, model_id: i64) -> Result<Vec<(i64, Vec<u8>)>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT block_id, vector FROM block_centroids WHERE model_id = ?1")?;
        let rows = stmt.query_map(params![model_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ─── Feedback ────────────────────────────────────────────────

    pub fn feedback_stats(&self, result_id: &str) -> Result<Option<FeedbackStats>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT useful_count, not_useful_count, promising_count FROM feedback_stats WHERE result_id = ?1",
            params![result_id],
            |r| {
                Ok(FeedbackStats {
                    useful_count: r.get(0)?,
                    not_useful_count: r.get(1)?,
                    promising_count: r.get(2)?,
                })
            },
        ).optional().map_err(Into::into)
    }

    pub fn insert_feedback_event(&self, result_id: &str, verdict: &str, note: Option<&str>, created_at: i64) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO feedback_events (result_id, verdict, note, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![result_id, verdict, note, created_at],
        )?;
        let col = match verdict {
            "useful" => "useful_count",
            "not_useful" => "not_useful_count",
            _ => "promising_count",
        };
        conn.execute(
            &format!(
                "INSERT INTO feedback_stats (result_id, {col}) VALUES (?1, 1)
                 ON CONFLICT(result_id) DO UPDATE SET {col} = {col} + 1"
            ),
            params![result_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_useful_mark_increments_not_useful_count() {
        let store = Store::open_in_memory().unwrap();
        store.insert_feedback_event("result-1", "not_useful", None, 100).unwrap();
        let stats = store.feedback_stats("result-1").unwrap().unwrap();
        assert_eq!(stats.not_useful_count, 1);
        assert_eq!(stats.useful_count, 0);
        assert_eq!(stats.promising_count, 0);
    }

    #[test]
    fn reindex_file_is_atomic_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let file_id = store
            .reindex_file("a.rs", 0, 10, 2, "hash1", 100, "code", |tx, file_id| {
                let token_id = Store::upsert_token(tx, "foo", TokenKind::Ident)?;
                Store::upsert_posting(tx, token_id, file_id, 1, &crate::varint::encode_line_list(&[1]))?;
                Store::recompute_df(tx, token_id)?;
                Ok(())
            })
            .unwrap();
        let file = store.get_file(file_id).unwrap().unwrap();
        assert_eq!(file.path, "a.rs");
        let (token_id, _) = store.find_token("foo").unwrap().unwrap();
        assert_eq!(store.token_df(token_id).unwrap(), 1);
    }

    #[test]
    fn reindex_deletes_prior_postings() {
        let store = Store::open_in_memory().unwrap();
        store.reindex_file("a.rs", 0, 10, 2, "h1", 100, "code", |tx, file_id| {
            let token_id = Store::upsert_token(tx, "foo", TokenKind::Ident)?;
            Store::upsert_posting(tx, token_id, file_id, 1, &crate::varint::encode_line_list(&[1]))?;
            Ok(())
        }).unwrap();
        // reindex with different content — no "foo" token this time
        store.reindex_file("a.rs", 0, 10, 2, "h2", 200, "code", |_tx, _file_id| Ok(())).unwrap();
        let (token_id, _) = store.find_token("foo").unwrap().unwrap();
        assert!(store.postings_for_token(token_id).unwrap().is_empty());
    }

    #[test]
    fn delete_file_cascades_to_blocks_and_postings() {
        let store = Store::open_in_memory().unwrap();
        let file_id = store.reindex_file("a.rs", 0, 10, 2, "h1", 100, "code", |tx, file_id| {
            let token_id = Store::upsert_token(tx, "foo", TokenKind::Ident)?;
            Store::upsert_posting(tx, token_id, file_id, 1, &crate::varint::encode_line_list(&[1]))?;
            Store::insert_block(tx, file_id, "layout", 0, 1, 2, None, 1)?;
            Ok(())
        }).unwrap();
        store.delete_file_cascade(file_id).unwrap();
        assert!(store.blocks_for_file(file_id).unwrap().is_empty());
        assert!(store.get_file(file_id).unwrap().is_none());
    }

    #[test]
    fn ancestor_chain_ends_at_root() {
        let store = Store::open_in_memory().unwrap();
        let file_id = store.reindex_file("a.rs", 0, 10, 5, "h1", 100, "code", |tx, file_id| {
            let root = Store::insert_block(tx, file_id, "layout", 0, 1, 5, None, 1)?;
            let child = Store::insert_block(tx, file_id, "layout", 1, 2, 3, Some(root), 1)?;
            let _leaf = Store::insert_block(tx, file_id, "layout", 2, 2, 2, Some(child), 1)?;
            Ok(())
        }).unwrap();
        let leaf_id = store.blocks_for_file(file_id).unwrap().into_iter().max_by_key(|b| b.level).unwrap().id;
        let chain = store.ancestor_chain(leaf_id).unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.last().unwrap().parent_id.is_none());
    }
}
