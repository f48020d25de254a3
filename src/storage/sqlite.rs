use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Storage, VisitRecord};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::history::{ItemId, NodeRecord, NoteLink, Relation, Session, SessionId};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory database, mostly for tests.
    ///
    /// Every SQLite memory connection is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const NODE_COLUMNS: &str = "id, item_id, parent_id, session_id, created_at, last_visit, \
     visit_count, relation, depth, title, creators, year, item_type, item_key, doi, tags, \
     notes, importance, closed_at";

const UPSERT_NODE: &str = r#"
    INSERT OR REPLACE INTO history_nodes (
        id, item_id, parent_id, session_id, created_at, last_visit,
        visit_count, relation, depth, title, creators, year, item_type, item_key, doi, tags,
        notes, importance, closed_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn bind_node<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    node: &NodeRecord,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(node.id.to_string())
        .bind(node.item_id)
        .bind(node.parent_id.map(|p| p.to_string()))
        .bind(node.session_id.to_string())
        .bind(encode_time(&node.created_at))
        .bind(encode_time(&node.last_visit))
        .bind(i64::from(node.visit_count))
        .bind(node.relation.as_str())
        .bind(i64::from(node.depth))
        .bind(node.title.clone())
        .bind(node.creators.clone())
        .bind(node.year.clone())
        .bind(node.item_type.clone())
        .bind(node.item_key.clone())
        .bind(node.doi.clone())
        .bind(serde_json::to_string(&node.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(node.notes.clone())
        .bind(i64::from(node.importance))
        .bind(node.closed_at.as_ref().map(encode_time))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_session(&self, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (id, started_at)
            VALUES (?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(encode_time(&session.started_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_sessions(&self) -> StorageResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, started_at
            FROM sessions
            ORDER BY started_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn save_node(&self, node: &NodeRecord) -> StorageResult<()> {
        bind_node(sqlx::query(UPSERT_NODE), node)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_nodes(&self, nodes: &[NodeRecord]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for node in nodes {
            bind_node(sqlx::query(UPSERT_NODE), node)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn load_nodes(&self, limit: usize) -> StorageResult<Vec<NodeRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM history_nodes ORDER BY created_at DESC LIMIT ?",
            NODE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut nodes: Vec<NodeRecord> = decode_rows(rows);
        nodes.reverse();
        Ok(nodes)
    }

    async fn get_session_nodes(&self, session_id: &SessionId) -> StorageResult<Vec<NodeRecord>> {
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM history_nodes WHERE session_id = ? ORDER BY created_at ASC",
            NODE_COLUMNS
        ))
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn record_visit(&self, visit: &VisitRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO visits (item_id, timestamp, session_id, parent_item_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(visit.item_id)
        .bind(encode_time(&visit.timestamp))
        .bind(visit.session_id.to_string())
        .bind(visit.parent_item_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session_visits(&self, session_id: &SessionId) -> StorageResult<Vec<VisitRecord>> {
        let rows: Vec<VisitRow> = sqlx::query_as(
            r#"
            SELECT item_id, timestamp, session_id, parent_item_id
            FROM visits
            WHERE session_id = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn save_note_link(&self, link: &NoteLink) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO note_links (note_id, node_id, kind, created_at, session_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(link.note_id)
        .bind(link.node_id.to_string())
        .bind(link.kind.as_str())
        .bind(encode_time(&link.created_at))
        .bind(link.session_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_note_link(&self, note_id: ItemId, node_id: &Uuid) -> StorageResult<()> {
        sqlx::query("DELETE FROM note_links WHERE note_id = ? AND node_id = ?")
            .bind(note_id)
            .bind(node_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_note_links(&self) -> StorageResult<Vec<NoteLink>> {
        let rows: Vec<NoteLinkRow> = sqlx::query_as(
            r#"
            SELECT note_id, node_id, kind, created_at, session_id
            FROM note_links
            ORDER BY created_at ASC, note_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn clear_all(&self) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM note_links")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM visits").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM history_nodes")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions").execute(&mut *tx).await?;
        tx.commit().await?;

        info!("Cleared stored history");
        Ok(())
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn encode_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid timestamp {}: {}", value, e),
        })
}

fn decode_session_id(value: &str) -> StorageResult<SessionId> {
    value
        .parse()
        .map_err(|message| StorageError::Query { message })
}

fn decode_uuid(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::Query {
        message: format!("Invalid node id {}: {}", value, e),
    })
}

/// Convert rows, skipping (and logging) any that fail to decode.
fn decode_rows<R, T>(rows: Vec<R>) -> Vec<T>
where
    R: TryInto<T, Error = StorageError>,
{
    rows.into_iter()
        .filter_map(|row| match row.try_into() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable row");
                None
            }
        })
        .collect()
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    started_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: decode_session_id(&row.id)?,
            started_at: decode_time(&row.started_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: String,
    item_id: i64,
    parent_id: Option<String>,
    session_id: String,
    created_at: String,
    last_visit: String,
    visit_count: i64,
    relation: String,
    depth: i64,
    title: String,
    creators: String,
    year: String,
    item_type: String,
    item_key: String,
    doi: String,
    tags: String,
    notes: String,
    importance: i64,
    closed_at: Option<String>,
}

impl TryFrom<NodeRow> for NodeRecord {
    type Error = StorageError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: decode_uuid(&row.id)?,
            item_id: row.item_id,
            parent_id: row.parent_id.as_deref().map(decode_uuid).transpose()?,
            session_id: decode_session_id(&row.session_id)?,
            created_at: decode_time(&row.created_at)?,
            last_visit: decode_time(&row.last_visit)?,
            visit_count: u32::try_from(row.visit_count).unwrap_or(1).max(1),
            relation: row.relation.parse().unwrap_or(Relation::Manual),
            depth: u32::try_from(row.depth).unwrap_or(0),
            title: row.title,
            creators: row.creators,
            year: row.year,
            item_type: row.item_type,
            item_key: row.item_key,
            doi: row.doi,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            notes: row.notes,
            importance: u8::try_from(row.importance).unwrap_or(0),
            closed_at: row.closed_at.as_deref().map(decode_time).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VisitRow {
    item_id: i64,
    timestamp: String,
    session_id: String,
    parent_item_id: Option<i64>,
}

impl TryFrom<VisitRow> for VisitRecord {
    type Error = StorageError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            item_id: row.item_id,
            timestamp: decode_time(&row.timestamp)?,
            session_id: decode_session_id(&row.session_id)?,
            parent_item_id: row.parent_item_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NoteLinkRow {
    note_id: i64,
    node_id: String,
    kind: String,
    created_at: String,
    session_id: String,
}

impl TryFrom<NoteLinkRow> for NoteLink {
    type Error = StorageError;

    fn try_from(row: NoteLinkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            note_id: row.note_id,
            node_id: decode_uuid(&row.node_id)?,
            kind: row.kind.parse().unwrap_or_default(),
            created_at: decode_time(&row.created_at)?,
            session_id: decode_session_id(&row.session_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encoded_times_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::nanoseconds(1_500);
        let c = a + chrono::Duration::seconds(1);
        let mut encoded = vec![encode_time(&c), encode_time(&a), encode_time(&b)];
        encoded.sort();
        assert_eq!(encoded, vec![encode_time(&a), encode_time(&b), encode_time(&c)]);
    }

    #[test]
    fn test_time_round_trip_is_lossless() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 4, 12, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(decode_time(&encode_time(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_decode_time_rejects_garbage() {
        assert!(matches!(
            decode_time("yesterday"),
            Err(StorageError::Query { .. })
        ));
    }

    #[test]
    fn test_node_row_with_bad_relation_falls_back_to_manual() {
        let row = NodeRow {
            id: Uuid::new_v4().to_string(),
            item_id: 3,
            parent_id: None,
            session_id: SessionId::new().to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            last_visit: "2024-01-01T00:00:00Z".to_string(),
            visit_count: 0,
            relation: "mystery".to_string(),
            depth: 0,
            title: "t".to_string(),
            creators: String::new(),
            year: String::new(),
            item_type: String::new(),
            item_key: String::new(),
            doi: String::new(),
            tags: "not json".to_string(),
            notes: String::new(),
            importance: 99,
            closed_at: None,
        };
        let record = NodeRecord::try_from(row).unwrap();
        assert_eq!(record.relation, Relation::Manual);
        assert_eq!(record.visit_count, 1);
        assert!(record.tags.is_empty());
        assert_eq!(record.importance, 99);
    }

    #[test]
    fn test_note_link_row_with_unknown_kind_uses_default() {
        let row = NoteLinkRow {
            note_id: 12,
            node_id: Uuid::new_v4().to_string(),
            kind: "scribbled".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            session_id: SessionId::new().to_string(),
        };
        let link = NoteLink::try_from(row).unwrap();
        assert_eq!(link.kind, crate::history::NoteLinkKind::CreatedDuring);
        assert_eq!(link.note_id, 12);
    }

    #[test]
    fn test_decode_rows_skips_bad_rows() {
        let rows = vec![
            SessionRow {
                id: SessionId::new().to_string(),
                started_at: "2024-01-01T00:00:00Z".to_string(),
            },
            SessionRow {
                id: "bogus".to_string(),
                started_at: "2024-01-01T00:00:00Z".to_string(),
            },
        ];
        let sessions: Vec<Session> = decode_rows(rows);
        assert_eq!(sessions.len(), 1);
    }
}
