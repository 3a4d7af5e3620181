pub mod models;
pub mod queries;

use rusqlite::Connection;
use rusqlite::types::Value;
use std::path::Path;
use thiserror::Error;

use models::{AUDIO_FEATURE, DESTINATION_DDL, LIKED_SONG};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("No such table: {0}")]
    UnknownTable(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.migrate()?;
        Ok(())
    }

    /// Only tables that outlive a reload are migrated; the destination
    /// tables are rebuilt by [`Database::recreate_tables`].
    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.migrate_v1()?;
        }
        if version < 2 {
            self.migrate_v2()?;
        }

        self.conn.pragma_update(None, "user_version", 2)?;
        Ok(())
    }

    /// V1: audio features, keyed by catalog track id
    fn migrate_v1(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "
                CREATE TABLE IF NOT EXISTS {AUDIO_FEATURE} (
                    track_id          TEXT PRIMARY KEY,
                    acousticness      REAL NOT NULL CHECK (acousticness BETWEEN 0 AND 1),
                    danceability      REAL NOT NULL CHECK (danceability BETWEEN 0 AND 1),
                    duration_ms       INTEGER NOT NULL CHECK (duration_ms >= 0),
                    energy            REAL NOT NULL CHECK (energy BETWEEN 0 AND 1),
                    instrumentalness  REAL NOT NULL CHECK (instrumentalness BETWEEN 0 AND 1),
                    key               TEXT NOT NULL,
                    mode              TEXT NOT NULL,
                    liveness          REAL NOT NULL CHECK (liveness BETWEEN 0 AND 1),
                    loudness          REAL NOT NULL,
                    speechiness       REAL NOT NULL CHECK (speechiness BETWEEN 0 AND 1),
                    tempo             REAL NOT NULL,
                    time_signature    INTEGER NOT NULL,
                    valence           REAL NOT NULL CHECK (valence BETWEEN 0 AND 1),
                    extracted_at      TEXT NOT NULL,
                    loaded_at         TEXT NOT NULL DEFAULT (datetime('now'))
                ) STRICT;
                "
            ))
            .map_err(|e| DbError::Migration(format!("{AUDIO_FEATURE}: {e}")))?;
        Ok(())
    }

    /// V2: the user's saved tracks
    fn migrate_v2(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "
                CREATE TABLE IF NOT EXISTS {LIKED_SONG} (
                    track_id      TEXT PRIMARY KEY,
                    type          TEXT NOT NULL,
                    artist_name   TEXT NOT NULL,
                    album_name    TEXT NOT NULL,
                    track_name    TEXT NOT NULL,
                    track_number  INTEGER NOT NULL CHECK (track_number >= 0),
                    duration      TEXT,
                    release_date  TEXT,
                    popularity    INTEGER NOT NULL CHECK (popularity BETWEEN 0 AND 100),
                    added_at      TEXT,
                    external_url  TEXT NOT NULL,
                    extracted_at  TEXT NOT NULL,
                    loaded_at     TEXT NOT NULL DEFAULT (datetime('now'))
                ) STRICT;
                "
            ))
            .map_err(|e| DbError::Migration(format!("{LIKED_SONG}: {e}")))?;
        Ok(())
    }

    /// Drop and recreate every destination table. Any DDL failure is returned
    /// as-is; the caller must not load into a half-built schema.
    pub fn recreate_tables(&self) -> Result<()> {
        for (table, ddl) in DESTINATION_DDL {
            self.conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
            self.conn.execute_batch(ddl)?;
            log::debug!("Recreated table {table}");
        }
        Ok(())
    }

    /// Column names of `table` in declaration order, without the surrogate `id`.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let all: Vec<String> = stmt
            .query_map([table], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if all.is_empty() {
            return Err(DbError::UnknownTable(table.to_string()));
        }
        Ok(all.into_iter().filter(|c| c != "id").collect())
    }

    /// Insert one row. `columns` and `values` must line up.
    pub fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: Vec<Value>,
    ) -> Result<usize> {
        let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names.join(", "),
            placeholders.join(", ")
        );
        let count = self.conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(count)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
