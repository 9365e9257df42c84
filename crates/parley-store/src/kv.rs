use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        get_value(self.conn(), key)
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        set_value(self.conn(), key, value)
    }

    pub fn delete_value(&self, key: &str) -> Result<bool> {
        delete_value(self.conn(), key)
    }
}

pub(crate) fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

pub(crate) fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub(crate) fn delete_value(conn: &Connection, key: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn set_get_overwrite_delete() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_value("theme").unwrap(), None);

        db.set_value("theme", "dark").unwrap();
        db.set_value("theme", "light").unwrap();
        assert_eq!(db.get_value("theme").unwrap().as_deref(), Some("light"));

        assert!(db.delete_value("theme").unwrap());
        assert!(!db.delete_value("theme").unwrap());
        assert_eq!(db.get_value("theme").unwrap(), None);
    }
}
