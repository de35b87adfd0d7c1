use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};
use crate::store::{validate_draft, CommentStore};
use crate::types::{Anchor, Comment, CommentKind, Draft};

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// This function is the single entry point for all database connections.
/// It sets `busy_timeout` via the `Connection` method (not a PRAGMA string) to
/// ensure the setting takes effect regardless of pragma caching.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(path: &str) -> std::result::Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    conn.call(|db| {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        // Fold whatever a previous run left in the WAL back into the main file.
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok::<_, rusqlite::Error>(())
    })
    .await?;

    conn.call(|db| {
        crate::schema::migrate(db)?;
        Ok::<_, rusqlite::Error>(())
    })
    .await?;

    Ok(conn)
}

/// Returns the current Unix timestamp in seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

const COMMENT_COLUMNS: &str =
    "id, page, kind, text, context_before, context_after, src, body, y, user_name, created_at, resolved_at";

fn row_to_comment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let kind: String = r.get(2)?;
    let resolved_at: Option<i64> = r.get(11)?;
    Ok(Comment::from_parts(
        r.get(0)?,
        r.get(1)?,
        Anchor::new(r.get::<_, String>(3)?, r.get::<_, String>(4)?, r.get::<_, String>(5)?),
        r.get(7)?,
        CommentKind::parse(&kind).unwrap_or_default(),
        r.get(6)?,
        r.get(8)?,
        resolved_at.is_some(),
        r.get(9)?,
        r.get(10)?,
    ))
}

/// Loads every comment for `page`, oldest first, resolved ones included.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn list_comments(
    conn: &Connection,
    page: &str,
) -> std::result::Result<Vec<Comment>, tokio_rusqlite::Error> {
    let page = page.to_owned();

    conn.call(move |db| {
        let mut stmt = db.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE page = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![&page], row_to_comment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok::<_, rusqlite::Error>(rows)
    })
    .await
}

/// Loads every comment in the database, for export.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn all_comments(
    conn: &Connection,
) -> std::result::Result<Vec<Comment>, tokio_rusqlite::Error> {
    conn.call(|db| {
        let mut stmt = db.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments ORDER BY page, created_at, rowid"
        ))?;
        let rows = stmt
            .query_map([], row_to_comment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok::<_, rusqlite::Error>(rows)
    })
    .await
}

fn insert_row(tx: &rusqlite::Transaction<'_>, comment: &Comment) -> rusqlite::Result<usize> {
    let anchor = comment.anchor();
    let resolved_at: Option<i64> = comment.is_resolved().then_some(comment.created_at);
    tx.execute(
        "INSERT OR IGNORE INTO comments
             (id, page, kind, text, context_before, context_after, src, body, y,
              user_name, created_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            &comment.id,
            &comment.page,
            comment.kind.as_str(),
            anchor.text(),
            anchor.context_before(),
            anchor.context_after(),
            &comment.src,
            &comment.comment,
            comment.y,
            &comment.user,
            comment.created_at,
            resolved_at,
        ],
    )
}

/// Persists `draft` under a fresh UUID v4 id inside `BEGIN IMMEDIATE`.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the write transaction fails.
pub async fn insert_comment(
    conn: &Connection,
    draft: &Draft,
) -> std::result::Result<Comment, tokio_rusqlite::Error> {
    let comment = Comment::from_draft(uuid::Uuid::new_v4().to_string(), draft);

    conn.call(move |db| {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        insert_row(&tx, &comment)?;
        tx.commit()?;
        Ok::<_, rusqlite::Error>(comment)
    })
    .await
}

/// Inserts already-identified comments (an import), skipping ids that exist.
/// Returns how many rows were added.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the write transaction fails; nothing
/// is imported in that case.
pub async fn import_comments(
    conn: &Connection,
    comments: Vec<Comment>,
) -> std::result::Result<usize, tokio_rusqlite::Error> {
    conn.call(move |db| {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut added = 0;
        for comment in &comments {
            added += insert_row(&tx, comment)?;
        }
        tx.commit()?;
        Ok::<_, rusqlite::Error>(added)
    })
    .await
}

/// Resolves comment `id`: sets `resolved_at`, or deletes the row when
/// `delete` is set. Returns `false` if no open comment had that id.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the write transaction fails.
pub async fn resolve_comment(
    conn: &Connection,
    id: &str,
    delete: bool,
) -> std::result::Result<bool, tokio_rusqlite::Error> {
    let id = id.to_owned();

    conn.call(move |db| {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let changed = if delete {
            tx.execute("DELETE FROM comments WHERE id = ?1", rusqlite::params![&id])?
        } else {
            tx.execute(
                "UPDATE comments SET resolved_at = ?1 WHERE id = ?2 AND resolved_at IS NULL",
                rusqlite::params![now_secs(), &id],
            )?
        };
        tx.commit()?;
        Ok::<_, rusqlite::Error>(changed > 0)
    })
    .await
}

/// The local persistent store: one SQLite file in WAL mode.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
    delete_on_resolve: bool,
}

impl SqliteStore {
    /// Opens the database at `path`; see [`open_db`].
    pub async fn open(path: &str) -> Result<Self> {
        Ok(Self::new(open_db(path).await?))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            delete_on_resolve: false,
        }
    }

    /// Deletes rows on resolve instead of setting `resolved_at`.
    pub fn delete_on_resolve(mut self, on: bool) -> Self {
        self.delete_on_resolve = on;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Adds `comments` to the store; returns how many were new.
    pub async fn import(&self, comments: Vec<Comment>) -> Result<usize> {
        let added = import_comments(&self.conn, comments).await?;
        info!(added, "comments imported");
        Ok(added)
    }

    /// Every comment in the store, all pages.
    pub async fn export(&self) -> Result<Vec<Comment>> {
        Ok(all_comments(&self.conn).await?)
    }
}

impl CommentStore for SqliteStore {
    async fn list(&self, page: &str) -> Result<Vec<Comment>> {
        Ok(list_comments(&self.conn, page).await?)
    }

    async fn create(&self, draft: &Draft) -> Result<String> {
        validate_draft(draft)?;
        let comment = insert_comment(&self.conn, draft).await?;
        info!(comment = %comment.id, page = %comment.page, "comment created");
        Ok(comment.id)
    }

    async fn resolve(&self, id: &str) -> Result<()> {
        if !resolve_comment(&self.conn, id, self.delete_on_resolve).await? {
            return Err(Error::NotFound(id.to_owned()));
        }
        info!(comment = %id, hard = self.delete_on_resolve, "comment resolved");
        Ok(())
    }
}
