// SQLite-backed record source

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags};

use swapfix_recon::config::is_identifier;
use swapfix_recon::{ColumnMapping, Record, RecordSource, SourceError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One table in a SQLite database, projected through a [`ColumnMapping`].
///
/// Every column is read back as text so the record parsers see the same
/// shape regardless of the declared column type.
pub struct SqliteSource {
    conn: Connection,
    label: String,
    fetch_sql: String,
    update_sql: String,
    count_sql: String,
}

impl SqliteSource {
    /// Open an existing database file. The file is never created.
    pub fn open(path: &Path, table: &str, columns: &ColumnMapping) -> Result<Self, SourceError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            SourceError::Unavailable(format!("failed to open {}: {}", path.display(), e))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;

        let label = format!("sqlite {} ({})", path.display(), table);
        Self::build(conn, label, table, columns)
    }

    /// Wrap an already-open connection (in-memory databases, tests).
    pub fn from_connection(
        conn: Connection,
        table: &str,
        columns: &ColumnMapping,
    ) -> Result<Self, SourceError> {
        let label = format!("sqlite ({})", table);
        Self::build(conn, label, table, columns)
    }

    fn build(
        conn: Connection,
        label: String,
        table: &str,
        columns: &ColumnMapping,
    ) -> Result<Self, SourceError> {
        for name in [
            table,
            columns.id.as_str(),
            columns.code.as_str(),
            columns.stored_date.as_str(),
            columns.trusted_timestamp.as_str(),
        ] {
            if !is_identifier(name) {
                return Err(SourceError::Unavailable(format!(
                    "invalid identifier '{}'",
                    name
                )));
            }
        }

        let t = quote(table);
        let id = quote(&columns.id);
        let stored = quote(&columns.stored_date);
        let trusted = quote(&columns.trusted_timestamp);

        // Order by instant, not by text: `julianday` handles `T`/space
        // separators, `Z` and `+HH:MM`; the fallbacks cover `+HH` and
        // unparseable zones.
        let instant = format!(
            "COALESCE(julianday({trusted}), julianday({trusted} || ':00'), \
             julianday(substr({trusted}, 1, 19)))"
        );
        let fetch_sql = format!(
            "SELECT CAST({id} AS TEXT), CAST({code} AS TEXT), \
             CAST({stored} AS TEXT), CAST({trusted} AS TEXT) \
             FROM {t} ORDER BY {instant} DESC, {id} LIMIT ?1",
            code = quote(&columns.code),
        );
        // Match on the same text projection the fetch hands out as the id.
        let update_sql = format!("UPDATE {t} SET {stored} = ?1 WHERE CAST({id} AS TEXT) = ?2");
        let count_sql = format!("SELECT COUNT(*) FROM {t} WHERE {stored} = ?1");

        // Fail at construction, not mid-run, when the table or a column
        // is missing.
        conn.prepare(&fetch_sql).map_err(|e| {
            SourceError::Unavailable(format!(
                "table '{}' does not match column mapping: {}",
                table, e
            ))
        })?;

        Ok(Self {
            conn,
            label,
            fetch_sql,
            update_sql,
            count_sql,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordSource for SqliteSource {
    fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>, SourceError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&self.fetch_sql).map_err(unavailable)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(unavailable)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, code, stored, trusted) = row.map_err(unavailable)?;
            let Some(id) = id else {
                log::warn!("{}: skipping row with NULL id", self.label);
                continue;
            };
            records.push(Record::from_raw(
                id,
                code.unwrap_or_default(),
                stored.as_deref(),
                trusted.as_deref(),
            ));
        }
        Ok(records)
    }

    fn update_stored_date(&mut self, id: &str, new_date: NaiveDate) -> Result<(), SourceError> {
        let value = new_date.format("%Y-%m-%d").to_string();
        let changed = self
            .conn
            .execute(&self.update_sql, params![value, id])
            .map_err(|e| SourceError::Rejected {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        if changed == 0 {
            return Err(SourceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn count_matching(&self, date: NaiveDate) -> Result<u64, SourceError> {
        let value = date.format("%Y-%m-%d").to_string();
        let count: i64 = self
            .conn
            .query_row(&self.count_sql, params![value], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(count.max(0) as u64)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn unavailable(e: rusqlite::Error) -> SourceError {
    SourceError::Unavailable(e.to_string())
}
