/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the v1 schema.
///
/// One `comments` table keyed by the store-assigned UUID v4 text id. The
/// anchor columns (`text`, `context_before`, `context_after`) are written once
/// on insert and never updated. `resolved_at` is `NULL` while the comment is
/// open; `y` is the last known anchor coordinate and only a cache.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS comments (
        id             TEXT    PRIMARY KEY,
        page           TEXT    NOT NULL,
        kind           TEXT    NOT NULL DEFAULT 'TEXT'
                               CHECK(kind IN ('TEXT', 'IMAGE')),
        text           TEXT    NOT NULL,
        context_before TEXT    NOT NULL DEFAULT '',
        context_after  TEXT    NOT NULL DEFAULT '',
        src            TEXT,
        body           TEXT    NOT NULL,
        y              REAL    NOT NULL DEFAULT 0,
        user_name      TEXT    NOT NULL DEFAULT '',
        created_at     INTEGER NOT NULL,
        resolved_at    INTEGER
    ) STRICT;

    CREATE INDEX IF NOT EXISTS comments_by_page ON comments(page, created_at);
";

/// Forward migrations in order; entry `n` brings the schema to version `n + 1`.
const MIGRATIONS: &[&str] = &[SCHEMA_V1_SQL];

/// Latest schema version this build knows.
pub fn latest_version() -> i64 {
    MIGRATIONS.len() as i64
}

/// Applies every migration newer than the recorded version, each in its own
/// immediate transaction. Safe to call on every open.
///
/// # Errors
///
/// Returns `rusqlite::Error` if a DDL batch or the version bookkeeping fails.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;
    let current: i64 = db.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    for (version, sql) in (1..).zip(MIGRATIONS).skip(current.max(0) as usize) {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(sql)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
    }
    Ok(())
}
