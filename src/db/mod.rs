//! Content store: images, channels, stickers and usage log

pub mod channel;
pub mod image;
mod schema;
pub mod session;
pub mod sticker;
pub mod trigram;
pub mod usage;

use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::{Error, Result};

static SQLITE_VEC_INIT: Once = Once::new();

/// Make `vec_*` functions available on every connection opened afterwards
///
/// Idempotent. Pool constructors call it before opening anything.
#[allow(unsafe_code)]
pub(crate) fn register_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite-vec exports `sqlite3_vec_init` as an extension entry
        // point; the transmute only restores the signature that
        // `sqlite3_auto_extension` expects.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                unsafe extern "C" fn(
                    *mut rusqlite::ffi::sqlite3,
                    *mut *mut i8,
                    *const rusqlite::ffi::sqlite3_api_routines,
                ) -> i32,
            >(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

pub use channel::{Channel, SourceLink};
pub use image::{Image, ImageHit};
pub use schema::SCHEMA_VERSION;
pub use session::DbSession;
pub use sticker::StickerSet;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Per-connection setup: pragmas and custom SQL functions
fn prepare_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA foreign_keys = ON;",
    )?;
    trigram::register(conn)
}

/// Open the on-disk store at `path` and bring its schema up to date
///
/// # Errors
///
/// Returns error if the file cannot be opened or a migration fails
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(prepare_connection);
    let pool = migrate(
        Pool::builder()
            .max_size(16)
            .connection_timeout(Duration::from_secs(10)),
        manager,
    )?;
    tracing::info!(version = SCHEMA_VERSION, "database ready");
    Ok(pool)
}

/// In-memory store for tests
///
/// # Errors
///
/// Returns error if the schema cannot be created
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(prepare_connection);
    // One connection that never expires: the database lives and dies with it
    migrate(
        Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None),
        manager,
    )
}

fn migrate(
    builder: r2d2::Builder<SqliteConnectionManager>,
    manager: SqliteConnectionManager,
) -> Result<DbPool> {
    register_sqlite_vec();
    let pool = builder
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;
    let conn = connect(&pool)?;
    schema::init(&conn)?;
    drop(conn);
    Ok(pool)
}

/// Check out a connection for a short read outside any session
///
/// # Errors
///
/// Returns error if the pool is exhausted
pub fn connect(pool: &DbPool) -> Result<DbConn> {
    pool.get().map_err(|e| Error::Database(e.to_string()))
}
