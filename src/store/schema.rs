//! SQL schema for the store (§3, §4.4).

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY,
    path          TEXT NOT NULL UNIQUE,
    mtime         INTEGER NOT NULL,
    size          INTEGER NOT NULL,
    line_count    INTEGER NOT NULL,
    content_hash  TEXT NOT NULL,
    indexed_at    INTEGER NOT NULL,
    file_type     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    id        INTEGER PRIMARY KEY,
    key       TEXT NOT NULL,
    kind      TEXT NOT NULL,
    is_keyword INTEGER NOT NULL DEFAULT 0,
    df        INTEGER NOT NULL DEFAULT 0,
    UNIQUE(key, kind)
);
CREATE INDEX IF NOT EXISTS idx_tokens_key ON tokens(key);

CREATE TABLE IF NOT EXISTS postings (
    token_id  INTEGER NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    file_id   INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    tf        INTEGER NOT NULL,
    lines     BLOB NOT NULL,
    PRIMARY KEY (token_id, file_id)
);
CREATE INDEX IF NOT EXISTS idx_postings_file ON postings(file_id);

CREATE TABLE IF NOT EXISTS blocks (
    id         INTEGER PRIMARY KEY,
    file_id    INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    level      INTEGER NOT NULL,
    line_start INTEGER NOT NULL,
    line_end   INTEGER NOT NULL,
    parent_id  INTEGER REFERENCES blocks(id) ON DELETE CASCADE,
    eligible_token_count INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_blocks_file ON blocks(file_id);
CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(parent_id);

CREATE TABLE IF NOT EXISTS block_line_map (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    blob    BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS line_cache (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    line_no INTEGER NOT NULL,
    text    TEXT NOT NULL,
    PRIMARY KEY (file_id, line_no)
);

CREATE TABLE IF NOT EXISTS models (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cooccurrence (
    model_id   INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
    token_id   INTEGER NOT NULL,
    context_id INTEGER NOT NULL,
    count      INTEGER NOT NULL,
    PRIMARY KEY (model_id, token_id, context_id)
);

CREATE TABLE IF NOT EXISTS norms (
    model_id INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
    token_id INTEGER NOT NULL,
    norm     REAL NOT NULL,
    PRIMARY KEY (model_id, token_id)
);

CREATE TABLE IF NOT EXISTS neighbors (
    model_id    INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
    token_id    INTEGER NOT NULL,
    rank        INTEGER NOT NULL,
    neighbor_id INTEGER NOT NULL,
    similarity  INTEGER NOT NULL,
    PRIMARY KEY (model_id, token_id, rank)
);

CREATE TABLE IF NOT EXISTS block_centroids (
    block_id INTEGER NOT NULL REFERENCES blocks(id) ON DELETE CASCADE,
    model_id INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
    vector   BLOB NOT NULL,
    PRIMARY KEY (block_id, model_id)
);

CREATE TABLE IF NOT EXISTS feedback_events (
    id         INTEGER PRIMARY KEY,
    result_id  TEXT NOT NULL,
    verdict    TEXT NOT NULL,
    note       TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS feedback_stats (
    result_id         TEXT PRIMARY KEY,
    useful_count      INTEGER NOT NULL DEFAULT 0,
    not_useful_count  INTEGER NOT NULL DEFAULT 0,
    promising_count   INTEGER NOT NULL DEFAULT 0
);
"#;
