use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::error::StoreError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open a pooled SQLite database at `path` and run migrations.
///
/// `":memory:"` yields a single-connection pool so every caller sees the
/// same in-memory database.
pub fn init_pool<P: AsRef<Path>>(path: P) -> Result<DbPool, StoreError> {
    let path = path.as_ref();
    let in_memory = path.as_os_str() == ":memory:";
    let manager = if in_memory {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(path)
    }
    .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
    let builder = Pool::builder();
    let pool = if in_memory {
        builder.max_size(1).build(manager)?
    } else {
        builder.build(manager)?
    };
    pool.get()?.execute_batch(SCHEMA)?;
    Ok(pool)
}

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rsc (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT UNIQUE,
  category TEXT NOT NULL,
  title TEXT NOT NULL DEFAULT '',
  body TEXT,
  content_group_id INTEGER REFERENCES rsc(id) ON DELETE SET NULL,
  creator_id INTEGER,
  is_protected INTEGER NOT NULL DEFAULT 0,
  seo_noindex INTEGER NOT NULL DEFAULT 0,
  created INTEGER NOT NULL,
  modified INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS rsc_content_group_modified ON rsc(content_group_id, modified);

CREATE TABLE IF NOT EXISTS edge (
  subject_id INTEGER NOT NULL REFERENCES rsc(id) ON DELETE CASCADE,
  predicate TEXT NOT NULL,
  object_id INTEGER NOT NULL REFERENCES rsc(id) ON DELETE CASCADE,
  created INTEGER NOT NULL,
  PRIMARY KEY (subject_id, predicate, object_id)
);

CREATE TABLE IF NOT EXISTS identity (
  rsc_id INTEGER NOT NULL REFERENCES rsc(id) ON DELETE CASCADE,
  kind TEXT NOT NULL,
  key TEXT NOT NULL,
  secret TEXT NOT NULL,
  modified INTEGER NOT NULL,
  UNIQUE (rsc_id, kind),
  UNIQUE (kind, key)
);
"#;
