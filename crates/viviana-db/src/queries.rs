use crate::models::KvRow;
use anyhow::Result;
use rusqlite::Connection;

pub fn kv_get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn kv_set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        (key, value),
    )?;
    Ok(())
}

/// Returns true if a row was removed.
pub fn kv_remove(conn: &Connection, key: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
    Ok(n > 0)
}

pub fn kv_keys_with_prefix(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;

    let keys = stmt
        .query_map(rusqlite::params![prefix, prefix.len() as i64], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(keys)
}

pub fn kv_rows_with_prefix(conn: &Connection, prefix: &str) -> Result<Vec<KvRow>> {
    let mut stmt = conn.prepare(
        "SELECT key, value, updated_at FROM kv_store WHERE substr(key, 1, ?2) = ?1 ORDER BY key",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![prefix, prefix.len() as i64], |row| {
            Ok(KvRow {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn set_overwrites_existing_value() {
        let db = Database::open_in_memory().unwrap();
        let value = db
            .with_conn(|conn| {
                kv_set(conn, "VIVIANA_X", "1")?;
                kv_set(conn, "VIVIANA_X", "2")?;
                kv_get(conn, "VIVIANA_X")
            })
            .unwrap();
        assert_eq!(value.as_deref(), Some("2"));
    }

    #[test]
    fn prefix_scan_does_not_treat_underscore_as_wildcard() {
        let db = Database::open_in_memory().unwrap();
        let rows = db
            .with_conn(|conn| {
                kv_set(conn, "VIVIANA_PAYMENT_a", "{}")?;
                kv_set(conn, "VIVIANA_PAYMENTXb", "{}")?;
                kv_set(conn, "VIVIANA_USERS", "{}")?;
                kv_rows_with_prefix(conn, "VIVIANA_PAYMENT_")
            })
            .unwrap();

        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["VIVIANA_PAYMENT_a"]);
        assert!(!rows[0].updated_at.is_empty());
    }

    #[test]
    fn remove_reports_whether_key_existed() {
        let db = Database::open_in_memory().unwrap();
        let (first, second) = db
            .with_conn(|conn| {
                kv_set(conn, "k", "v")?;
                Ok((kv_remove(conn, "k")?, kv_remove(conn, "k")?))
            })
            .unwrap();
        assert!(first);
        assert!(!second);
    }
}
