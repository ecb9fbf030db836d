pub mod keys;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use keys::{StorageKey, UserField};
pub use store::Store;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Runs `f` against the typed store inside a single SQLite transaction.
    /// The transaction commits only if `f` returns `Ok`.
    pub fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Store<'_>) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction().map_err(anyhow::Error::from)?;
        let out = f(&Store::new(&tx))?;
        tx.commit().map_err(anyhow::Error::from)?;
        Ok(out)
    }

    /// Read-only access to the typed store.
    pub fn read<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Store<'_>) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&Store::new(&conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let key = StorageKey::SecurityLog;

        let res: Result<()> = db.transaction(|store| {
            store.set_raw(&key, "[]")?;
            Err(anyhow!("boom"))
        });
        assert!(res.is_err());

        let raw = db.with_conn(|conn| queries::kv_get(conn, &key.to_string())).unwrap();
        assert_eq!(raw, None);
    }

    #[test]
    fn file_backed_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viviana.db");

        {
            let db = Database::open(&path).unwrap();
            db.transaction(|store| store.set_raw(&StorageKey::WebhookLog, "[]")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let raw = db
            .read(|store| store.get_raw(&StorageKey::WebhookLog))
            .unwrap();
        assert_eq!(raw.as_deref(), Some("[]"));
    }
}
