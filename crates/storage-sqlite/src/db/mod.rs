//! Connection pool, migrations, and the serialized write actor.
//!
//! Reads go through the r2d2 pool; every mutation goes through the
//! write actor so SQLite sees a single writer.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use ledgerline_core::errors::{DatabaseError, Result};

use crate::errors::StorageError;

pub mod write_actor;

pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILE_NAME: &str = "ledgerline.db";

/// Ensure the database file exists under `app_data_dir` and return its path.
/// WAL is set once here; it persists in the database file.
pub fn init(app_data_dir: &str) -> Result<String> {
    let db_path = get_db_path(app_data_dir);
    if let Some(parent) = Path::new(&db_path).parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DatabaseError::Internal(format!("Failed to create database directory: {e}"))
        })?;
    }

    let mut conn = establish(&db_path)?;
    conn.batch_execute("PRAGMA journal_mode = WAL;")
        .map_err(|e| DatabaseError::Internal(format!("Failed to enable WAL mode: {e}")))?;

    info!("Database initialized at {}", db_path);
    Ok(db_path)
}

pub fn get_db_path(app_data_dir: &str) -> String {
    Path::new(app_data_dir)
        .join(DB_FILE_NAME)
        .to_string_lossy()
        .to_string()
}

pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = establish(db_path)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(SqliteCustomizer))
        .build(manager)
        .map_err(|e| DatabaseError::Pool(e.to_string()))?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &Arc<DbPool>) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

fn establish(db_path: &str) -> Result<SqliteConnection> {
    Ok(SqliteConnection::establish(db_path)
        .map_err(|e| DatabaseError::Internal(format!("Failed to open database: {e}")))?)
}

#[derive(Debug)]
struct SqliteCustomizer;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqliteCustomizer {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}
