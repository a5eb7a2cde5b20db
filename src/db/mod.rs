pub mod schema;

use crate::shared::utils::{create_pool, DbPool};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Text;
use log::{error, info, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseId {
    Hospital,
    Warehouse,
}

impl DatabaseId {
    pub const ALL: [DatabaseId; 2] = [DatabaseId::Hospital, DatabaseId::Warehouse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::Warehouse => "warehouse",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Hospital => "hospital database",
            Self::Warehouse => "warehouse database",
        }
    }

    /// Name the expert tools report, e.g. `hospital_db`.
    pub fn catalog_name(&self) -> &'static str {
        match self {
            Self::Hospital => "hospital_db",
            Self::Warehouse => "warehouse_db",
        }
    }
}

impl std::fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatabaseId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hospital" | "hospital_db" | "hospitaldb" => Ok(Self::Hospital),
            "warehouse" | "warehouse_db" | "warehousedb" => Ok(Self::Warehouse),
            other => Err(DbError::UnknownDatabase(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Unsupported target database: {0}")]
    UnknownDatabase(String),
    #[error("Database connection error: {0}")]
    Pool(String),
    #[error("SQL execution failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Malformed row returned by database: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Database worker failed: {0}")]
    Join(String),
}

/// Process-wide handle on the database unqualified questions run against.
///
/// Cloning shares the same slot. Readers take a snapshot with [`ActiveDatabase::get`] and carry
/// it through the request, so a concurrent switch only affects requests that start afterwards.
#[derive(Debug, Clone)]
pub struct ActiveDatabase {
    slot: Arc<RwLock<DatabaseId>>,
}

impl ActiveDatabase {
    pub fn new(initial: DatabaseId) -> Self {
        Self {
            slot: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> DatabaseId {
        *self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn switch(&self, target: DatabaseId) -> DatabaseId {
        let mut guard = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *guard != target {
            info!("Switching active database: {} -> {}", *guard, target);
        }
        *guard = target;
        target
    }
}

impl Default for ActiveDatabase {
    fn default() -> Self {
        Self::new(DatabaseId::Hospital)
    }
}

/// Rows returned by one statement. Each row is a JSON object keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub rows: Vec<Value>,
    pub affected: usize,
}

impl QueryRows {
    pub fn from_rows(rows: Vec<Value>) -> Self {
        Self { rows, affected: 0 }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Text handed to the narrator.
    pub fn describe(&self) -> String {
        if !self.rows.is_empty() {
            format!(
                "Found {} records: {}",
                self.rows.len(),
                Value::Array(self.rows.clone())
            )
        } else if self.affected > 0 {
            format!("Statement affected {} rows", self.affected)
        } else {
            "The query returned no rows".to_string()
        }
    }
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, database: DatabaseId, statement: &str) -> Result<QueryRows, DbError>;
}

#[derive(Debug, QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Text)]
    data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub status: String,
    pub error: Option<String>,
}

/// Runs `SELECT 1` against every database, keyed by database name.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn test_connections(&self) -> BTreeMap<String, ConnectionStatus>;
}

/// One r2d2 pool per database.
#[derive(Clone)]
pub struct DatabaseManager {
    hospital: DbPool,
    warehouse: DbPool,
}

impl DatabaseManager {
    pub fn new(hospital: DbPool, warehouse: DbPool) -> Self {
        Self {
            hospital,
            warehouse,
        }
    }

    pub fn connect(
        hospital_url: &str,
        warehouse_url: &str,
        pool_size: u32,
    ) -> Result<Self, DbError> {
        let hospital = create_pool(hospital_url, pool_size).map_err(|e| DbError::Pool(e.to_string()))?;
        let warehouse =
            create_pool(warehouse_url, pool_size).map_err(|e| DbError::Pool(e.to_string()))?;
        Ok(Self::new(hospital, warehouse))
    }

    pub fn pool(&self, database: DatabaseId) -> &DbPool {
        match database {
            DatabaseId::Hospital => &self.hospital,
            DatabaseId::Warehouse => &self.warehouse,
        }
    }
}

#[async_trait]
impl ConnectionProbe for DatabaseManager {
    async fn test_connections(&self) -> BTreeMap<String, ConnectionStatus> {
        let mut results = BTreeMap::new();
        for database in DatabaseId::ALL {
            let pool = self.pool(database).clone();
            let outcome = tokio::task::spawn_blocking(move || -> Result<(), DbError> {
                let mut conn = pool.get().map_err(|e| DbError::Pool(e.to_string()))?;
                sql_query("SELECT 1").execute(&mut conn)?;
                Ok(())
            })
            .await
            .map_err(|e| DbError::Join(e.to_string()))
            .and_then(|r| r);

            let status = match outcome {
                Ok(()) => ConnectionStatus {
                    status: "connected".to_string(),
                    error: None,
                },
                Err(e) => ConnectionStatus {
                    status: "failed".to_string(),
                    error: Some(e.to_string()),
                },
            };
            results.insert(database.to_string(), status);
        }
        results
    }
}

fn returns_rows(statement: &str) -> bool {
    let head = statement.trim_start().to_ascii_uppercase();
    head.starts_with("SELECT") || head.starts_with("WITH")
}

fn strip_terminator(statement: &str) -> &str {
    statement.trim().trim_end_matches(';').trim_end()
}

fn run_statement(conn: &mut PgConnection, statement: &str) -> Result<QueryRows, DbError> {
    let body = strip_terminator(statement);
    conn.transaction::<QueryRows, DbError, _>(|conn| {
        if returns_rows(body) {
            let wrapped = format!("SELECT row_to_json(q)::text AS data FROM ({body}) q");
            trace!("Executing wrapped statement: {wrapped}");
            let raw: Vec<JsonRow> = sql_query(&wrapped).load(conn)?;
            let rows = raw
                .into_iter()
                .map(|r| serde_json::from_str::<Value>(&r.data))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(QueryRows::from_rows(rows))
        } else {
            let affected = sql_query(body).execute(conn)?;
            Ok(QueryRows {
                rows: Vec::new(),
                affected,
            })
        }
    })
}

#[async_trait]
impl SqlExecutor for DatabaseManager {
    async fn execute(&self, database: DatabaseId, statement: &str) -> Result<QueryRows, DbError> {
        let pool = self.pool(database).clone();
        let statement = statement.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| DbError::Pool(e.to_string()))?;
            run_statement(&mut conn, &statement)
        })
        .await
        .map_err(|e| DbError::Join(e.to_string()))?;

        if let Err(e) = &result {
            error!("Statement failed on {database}: {e}");
        }
        result
    }
}
