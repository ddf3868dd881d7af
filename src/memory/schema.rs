use rusqlite::Connection;
use tracing::debug;

/// Current schema version.  Increment when adding new migrations.
pub const SCHEMA_VERSION: u32 = 1;

/// Apply all pending migrations to `conn`.
///
/// Tables are created with `IF NOT EXISTS` and the `meta` table tracks which
/// version has been applied so only new migrations run.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    // WAL keeps readers of the file unblocked while a generation is written.
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    // ------------------------------------------------------------------
    // meta: schema version plus the embedding model the vectors belong to.
    // ------------------------------------------------------------------
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    let current_version = get_meta(conn, "schema_version")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        debug!(version = current_version, "memory schema up to date");
        return Ok(());
    }

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    set_meta(conn, "schema_version", &SCHEMA_VERSION.to_string())?;
    debug!(version = SCHEMA_VERSION, "memory schema migrated");
    Ok(())
}

// ---------------------------------------------------------------------------
// v1: initial tables
// ---------------------------------------------------------------------------

fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    // ------------------------------------------------------------------
    // files: every document of the last installed generation, including
    // documents that produced no chunks.
    // ------------------------------------------------------------------
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
            path   TEXT PRIMARY KEY,
            source TEXT NOT NULL
        );",
    )?;

    // ------------------------------------------------------------------
    // chunks: index entries keyed by (path, hash). A NULL embedding marks
    // a chunk whose embedding is still pending.
    // ------------------------------------------------------------------
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            path        TEXT    NOT NULL,
            hash        TEXT    NOT NULL,
            start_line  INTEGER NOT NULL,
            end_line    INTEGER NOT NULL,
            token_count INTEGER NOT NULL DEFAULT 0,
            text        TEXT    NOT NULL,
            source      TEXT    NOT NULL,
            embedding   BLOB,
            PRIMARY KEY (path, hash)
        );",
    )?;

    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn get_meta(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
        row.get::<_, String>(0)
    })
    .ok()
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_meta(&conn, "schema_version").as_deref(), Some("1"));

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('files', 'chunks')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
