//! SQLite-backed position store.
//!
//! Every record is kept as a JSON document next to the columns queries
//! filter on. Read-modify-write operations run in `IMMEDIATE` transactions,
//! so several processes can share one database file.

use crate::{PositionFilter, PositionPatch, PositionStore, StoreError};
use async_trait::async_trait;
use chrono::SecondsFormat;
use model::{Position, PositionKind};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_POSITIONS: &str = r#"
CREATE TABLE IF NOT EXISTS positions (
    id TEXT PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    venue TEXT NOT NULL,
    instrument_class TEXT NOT NULL,
    symbol TEXT NOT NULL,
    depends_on TEXT,
    filled INTEGER NOT NULL,
    tp_opened INTEGER NOT NULL,
    finished INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    body TEXT NOT NULL
);
"#;

const SCHEMA_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_positions_owner ON positions(owner_id, venue, finished);",
    "CREATE INDEX IF NOT EXISTS idx_positions_depends_on ON positions(depends_on);",
    "CREATE INDEX IF NOT EXISTS idx_positions_open ON positions(finished, kind, filled);",
];

const COLUMNS: &str = "id, owner_id, kind, venue, instrument_class, symbol, depends_on, \
                       filled, tp_opened, finished, created_at, body";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Durable position store on a single SQLite file.
#[derive(Clone)]
pub struct SqlitePositionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePositionStore {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Io(format!("create {}: {e}", dir.display())))?;
        }
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        tracing::info!(path = %path.display(), "Position database opened");
        Self::init(conn)
    }

    /// A private database that lives as long as the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(SCHEMA_POSITIONS, [])?;
        conn.execute(SCHEMA_METADATA, [])?;
        for index in INDEXES {
            conn.execute(index, [])?;
        }
        conn.execute(
            "INSERT OR REPLACE INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| StoreError::Io(format!("store task failed: {e}")))?
    }
}

fn write(conn: &Connection, p: &Position) -> Result<(), StoreError> {
    let body = serde_json::to_string(p)?;
    conn.execute(
        &format!("INSERT OR REPLACE INTO positions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
        params![
            p.id,
            p.owner_id,
            p.kind.as_str(),
            p.venue.as_str(),
            p.instrument_class.category(),
            p.symbol,
            p.depends_on,
            p.filled,
            p.tp_opened,
            p.finished,
            p.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            body,
        ],
    )?;
    Ok(())
}

fn read(conn: &Connection, id: &str) -> Result<Option<Position>, StoreError> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM positions WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
        .transpose()
}

/// `WHERE` clause and bound values for a filter.
fn where_clause(filter: &PositionFilter) -> (String, Vec<Value>) {
    let mut terms = Vec::new();
    let mut values = Vec::new();
    let mut push = |column: &str, value: Value| {
        terms.push(format!("{column} = ?"));
        values.push(value);
    };

    if let Some(v) = filter.owner_id {
        push("owner_id", Value::Integer(v));
    }
    if let Some(v) = filter.kind {
        push("kind", Value::Text(v.as_str().into()));
    }
    if let Some(v) = filter.venue {
        push("venue", Value::Text(v.as_str().into()));
    }
    if let Some(v) = filter.instrument_class {
        push("instrument_class", Value::Text(v.category().into()));
    }
    if let Some(v) = &filter.symbol {
        push("symbol", Value::Text(v.clone()));
    }
    if let Some(v) = &filter.depends_on {
        push("depends_on", Value::Text(v.clone()));
    }
    if let Some(v) = filter.filled {
        push("filled", Value::Integer(v.into()));
    }
    if let Some(v) = filter.tp_opened {
        push("tp_opened", Value::Integer(v.into()));
    }
    if let Some(v) = filter.finished {
        push("finished", Value::Integer(v.into()));
    }

    if terms.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", terms.join(" AND ")), values)
    }
}

#[async_trait]
impl PositionStore for SqlitePositionStore {
    async fn upsert(&self, position: Position) -> Result<(), StoreError> {
        self.with_conn(move |conn| write(conn, &position)).await
    }

    async fn update(&self, id: &str, patch: PositionPatch) -> Result<Position, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut position = read(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            patch.apply(&mut position);
            write(&tx, &position)?;
            tx.commit()?;
            Ok(position)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Position>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| read(conn, &id)).await
    }

    async fn query(&self, filter: &PositionFilter) -> Result<Vec<Position>, StoreError> {
        let (clause, values) = where_clause(filter);
        self.with_conn(move |conn| {
            let sql = format!("SELECT body FROM positions{clause} ORDER BY created_at, id");
            let mut stmt = conn.prepare(&sql)?;
            let bodies = stmt
                .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            bodies
                .iter()
                .map(|b| serde_json::from_str(b).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM positions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn merge_averaging(
        &self,
        anchor_id: &str,
        averaging_id: &str,
    ) -> Result<Position, StoreError> {
        let anchor_id = anchor_id.to_string();
        let averaging_id = averaging_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let averaging = read(&tx, &averaging_id)?
                .ok_or_else(|| StoreError::NotFound(averaging_id.clone()))?;
            if averaging.kind != PositionKind::Averaging
                || averaging.depends_on.as_deref() != Some(anchor_id.as_str())
                || !averaging.filled
            {
                return Err(StoreError::Invalid {
                    id: averaging_id,
                    reason: format!("not a filled averaging record of {anchor_id}"),
                });
            }
            let anchor =
                read(&tx, &anchor_id)?.ok_or_else(|| StoreError::NotFound(anchor_id.clone()))?;

            let merged = anchor.merged_with(&averaging);
            write(&tx, &merged)?;
            tx.execute("DELETE FROM positions WHERE id = ?1", params![averaging_id])?;
            tx.commit()?;

            tracing::debug!(
                anchor_id = %anchor_id,
                averaging_id = %averaging_id,
                avg_price = %merged.avg_price,
                "Averaging merged into anchor"
            );
            Ok(merged)
        })
        .await
    }
}
