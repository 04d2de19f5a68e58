//! Transactional session scoped to one event or one job
//!
//! A session checks out a pooled connection and opens a transaction on
//! first use, so events that never touch the store hold no connection.
//! It is committed explicitly; dropping an uncommitted session rolls back.
//! Store access goes through [`DbSession::with`] so the connection guard
//! can never be held across an `.await`. A deferred transaction that has
//! read cannot safely write after an `.await`; such writes go through their
//! own short statement on the pool instead.

use std::sync::{Mutex, PoisonError};

use rusqlite::Connection;

use super::{DbConn, DbPool};
use crate::{Error, Result};

/// Lazily started transaction on a pooled connection
pub struct DbSession {
    pool: DbPool,
    conn: Mutex<Option<DbConn>>,
}

impl DbSession {
    /// Session over `pool`; nothing is checked out yet
    #[must_use]
    pub fn new(pool: &DbPool) -> Self {
        Self {
            pool: pool.clone(),
            conn: Mutex::new(None),
        }
    }

    /// True once the transaction has begun
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run store operations inside the transaction, beginning it if needed
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a database error if no connection is
    /// available, `BEGIN` fails, or the lock is poisoned
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|_| Error::Database("session connection poisoned".to_string()))?;
        let conn = match &mut *slot {
            Some(conn) => conn,
            empty => {
                let conn = super::connect(&self.pool)?;
                conn.execute_batch("BEGIN")?;
                empty.insert(conn)
            }
        };
        f(&**conn)
    }

    /// Commit the transaction; a session never used commits nothing
    ///
    /// # Errors
    ///
    /// Returns error if `COMMIT` fails; the transaction is then rolled back on drop
    pub fn commit(self) -> Result<()> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|_| Error::Database("session connection poisoned".to_string()))?;
        if let Some(conn) = slot.as_ref() {
            conn.execute_batch("COMMIT")?;
        }
        *slot = None;
        Ok(())
    }

    /// Roll back explicitly
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        let slot = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Some(conn) = slot.take() else {
            return;
        };
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "session rollback failed");
        } else {
            tracing::debug!("session rolled back");
        }
    }
}
