//! Database location, connection pool and schema migrations.

pub mod write_actor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};

use inventra_core::tables::SCHEMA_VERSION;
use inventra_core::Result;

use crate::errors::StorageError;

pub use write_actor::WriteHandle;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const DEFAULT_DB_FILE_NAME: &str = "inventra.db";
const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Where the database lives and how connections to it are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: String,
    pub db_file_name: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reads `INVENTRA_DATA_DIR` and `INVENTRA_DB_POOL_SIZE`, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var("INVENTRA_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            config.data_dir = dir;
        }
        if let Some(size) = std::env::var("INVENTRA_DB_POOL_SIZE")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|size| *size > 0)
        {
            config.pool_size = size;
        }
        config
    }

    pub fn db_path(&self) -> String {
        Path::new(&self.data_dir)
            .join(&self.db_file_name)
            .to_string_lossy()
            .to_string()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Pragmas applied to every pooled connection when it is opened.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
}

impl ::r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Makes sure the data directory exists and returns the database path.
pub fn init(config: &StoreConfig) -> Result<String> {
    std::fs::create_dir_all(&config.data_dir).map_err(StorageError::from)?;
    let db_path = config.db_path();
    debug!("Using database at {}", db_path);
    Ok(db_path)
}

/// Builds the pool. The writer keeps one connection for itself, so the
/// pool always holds at least two.
pub fn create_pool(db_path: &str, config: &StoreConfig) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(config.pool_size.max(2))
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

#[derive(QueryableByName)]
struct UserVersionRow {
    #[diesel(sql_type = diesel::sql_types::Integer)]
    user_version: i32,
}

pub fn schema_version(conn: &mut SqliteConnection) -> Result<i32> {
    let row = diesel::sql_query("PRAGMA user_version")
        .get_result::<UserVersionRow>(conn)
        .map_err(StorageError::from)?;
    Ok(row.user_version)
}

/// Applies pending migrations and records [`SCHEMA_VERSION`].
///
/// Migrations only create missing tables, so existing rows survive an
/// upgrade. A database written by a newer build is refused.
pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;

    let found = schema_version(&mut conn)?;
    if found > SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        }
        .into());
    }

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!(
            "Applied {} migration(s), schema version {} -> {}",
            applied.len(),
            found,
            SCHEMA_VERSION
        );
    }

    if found != SCHEMA_VERSION {
        diesel::sql_query(format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut conn)
            .map_err(StorageError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_config() -> StoreConfig {
        let dir = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        StoreConfig::new(dir)
    }

    #[test]
    fn migrations_record_schema_version() {
        let config = temp_config();
        let db_path = init(&config).expect("init db");
        run_migrations(&db_path).expect("migrate db");

        let pool = create_pool(&db_path, &config).expect("create pool");
        let mut conn = get_connection(&pool).expect("conn");
        assert_eq!(schema_version(&mut conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let config = temp_config();
        let db_path = init(&config).expect("init db");
        run_migrations(&db_path).expect("first run");
        run_migrations(&db_path).expect("second run");
    }

    #[test]
    fn newer_schema_is_refused() {
        let config = temp_config();
        let db_path = init(&config).expect("init db");
        run_migrations(&db_path).expect("migrate db");

        let mut conn = SqliteConnection::establish(&db_path).expect("connect");
        diesel::sql_query(format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))
            .execute(&mut conn)
            .expect("bump version");

        let err = run_migrations(&db_path).expect_err("too new");
        assert!(err.is_storage_unavailable());
    }

    #[test]
    fn upgrade_from_first_version_keeps_rows() {
        let config = temp_config();
        let db_path = init(&config).expect("init db");
        let mut conn = SqliteConnection::establish(&db_path).expect("connect");
        conn.batch_execute(
            "CREATE TABLE customers (id TEXT NOT NULL PRIMARY KEY, payload TEXT NOT NULL, sync_status TEXT, sync_error TEXT);
             INSERT INTO customers (id, payload) VALUES ('c1', '{\"id\":\"c1\",\"name\":\"Ali\"}');
             PRAGMA user_version = 1;",
        )
        .expect("seed v1 database");
        drop(conn);

        run_migrations(&db_path).expect("upgrade");

        let mut conn = SqliteConnection::establish(&db_path).expect("connect");
        assert_eq!(schema_version(&mut conn).expect("version"), SCHEMA_VERSION);
        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }
        let row = diesel::sql_query("SELECT COUNT(*) AS count FROM customers")
            .get_result::<CountRow>(&mut conn)
            .expect("count");
        assert_eq!(row.count, 1);
        diesel::sql_query("SELECT id FROM purchase_orders")
            .execute(&mut conn)
            .expect("new table exists");
    }

    #[test]
    fn env_overrides_pool_size() {
        std::env::set_var("INVENTRA_DB_POOL_SIZE", "7");
        let config = StoreConfig::from_env();
        std::env::remove_var("INVENTRA_DB_POOL_SIZE");
        assert_eq!(config.pool_size, 7);
        assert_eq!(config.db_file_name, DEFAULT_DB_FILE_NAME);
    }
}
