use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::types::Value;
use thiserror::Error;

use crate::db::models::DESTINATION_TABLES;
use crate::db::{Database, DbError};
use crate::resolver::{ResolvedRecord, Resolver};
use crate::source::SourceRecord;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("column '{column}' of table {table} has no source field")]
    MissingField { table: String, column: String },
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Uniqueness key for one record within one file. The ordinal keeps it
/// unique even when the same song appears twice.
pub fn track_tag(record: &SourceRecord) -> String {
    format!(
        "{:03} | {} | {} | {:02}-{}",
        record.ordinal,
        record.artist_name,
        record.album_title,
        record.track_number,
        record.track_title
    )
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub tag: String,
    /// Insert result per destination table, in load order.
    pub tables: Vec<(String, bool)>,
    /// Set when identifiers could not be resolved; nothing was inserted.
    pub resolve_error: Option<String>,
}

impl RecordOutcome {
    pub fn succeeded(&self) -> bool {
        self.resolve_error.is_none() && self.tables.iter().all(|(_, ok)| *ok)
    }

    pub fn table(&self, name: &str) -> Option<bool> {
        self.tables.iter().find(|(t, _)| t == name).map(|(_, ok)| *ok)
    }
}

/// Per-record results of one load call, in input order.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub records: Vec<RecordOutcome>,
}

impl LoadOutcome {
    /// True when every record loaded into every table. Vacuously true for
    /// an empty batch.
    pub fn all_succeeded(&self) -> bool {
        self.records.iter().all(RecordOutcome::succeeded)
    }

    pub fn get(&self, tag: &str) -> Option<&RecordOutcome> {
        self.records.iter().find(|r| r.tag == tag)
    }

    /// `(track_tag, succeeded)` pairs.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, bool)> {
        self.records.iter().map(|r| (r.tag.as_str(), r.succeeded()))
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| !r.succeeded()).count()
    }
}

/// Resolves identifiers for source records and splits each record across
/// the destination tables.
pub struct RecordLoader<'a> {
    db: &'a Database,
    resolver: &'a Resolver<'a>,
}

impl<'a> RecordLoader<'a> {
    pub fn new(db: &'a Database, resolver: &'a Resolver<'a>) -> Self {
        Self { db, resolver }
    }

    /// Load a batch. Failures are recorded per record and table; the batch
    /// always runs to the end.
    pub fn load(&self, records: &[SourceRecord], extracted_at: &str) -> LoadOutcome {
        // Columns are discovered from the store, not assumed
        let tables: Vec<(&str, Option<Vec<String>>)> = DESTINATION_TABLES
            .iter()
            .map(|&table| match self.db.table_columns(table) {
                Ok(cols) => (table, Some(cols)),
                Err(e) => {
                    log::error!("Cannot read columns of {table}: {e}");
                    (table, None)
                }
            })
            .collect();

        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} records {msg}",
            )
            .unwrap()
            .progress_chars("##-"),
        );

        let mut outcome = LoadOutcome::default();
        for record in records {
            let tag = track_tag(record);
            pb.set_message(record.track_title.clone());

            let resolved = match self.resolver.resolve_record(record) {
                Ok(resolved) => resolved,
                Err(e) => {
                    log::error!("Unable to resolve '{tag}': {e}");
                    outcome.records.push(RecordOutcome {
                        tag,
                        tables: Vec::new(),
                        resolve_error: Some(e.to_string()),
                    });
                    pb.inc(1);
                    continue;
                }
            };

            let mut results = Vec::with_capacity(tables.len());
            for (table, columns) in &tables {
                let ok = match columns {
                    Some(columns) => match self.insert(table, columns, &resolved, extracted_at) {
                        Ok(1) => true,
                        Ok(n) => {
                            log::error!("{table} insert affected {n} rows: {tag}");
                            false
                        }
                        Err(e) => {
                            log::error!("table: {table} track: '{tag}': {e}");
                            false
                        }
                    },
                    None => false,
                };
                results.push((table.to_string(), ok));
            }

            outcome.records.push(RecordOutcome { tag, tables: results, resolve_error: None });
            pb.inc(1);
        }

        pb.finish_and_clear();
        outcome
    }

    fn insert(
        &self,
        table: &str,
        columns: &[String],
        resolved: &ResolvedRecord<'_>,
        extracted_at: &str,
    ) -> Result<usize, LoadError> {
        let values = row_values(table, columns, resolved, extracted_at)?;
        Ok(self.db.insert_row(table, columns, values)?)
    }
}

fn text(v: &Option<String>) -> Value {
    v.clone().map_or(Value::Null, Value::Text)
}

fn int(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Integer)
}

fn real(v: Option<f64>) -> Value {
    v.map_or(Value::Null, Value::Real)
}

/// Value of one destination column for a resolved record, or `None` when
/// the record has no such field.
fn column_value(column: &str, resolved: &ResolvedRecord<'_>, extracted_at: &str) -> Option<Value> {
    let r = resolved.record;
    let value = match column {
        "artist_id" => Value::Text(resolved.artist_id().to_string()),
        "album_id" => Value::Text(resolved.album_id().to_string()),
        "track_id" => Value::Text(resolved.track_id().to_string()),
        "etl_ts" => Value::Text(extracted_at.to_string()),

        "artist_name" => Value::Text(r.artist_name.clone()),
        "album_title" => Value::Text(r.album_title.clone()),
        "track_title" => Value::Text(r.track_title.clone()),
        "track_number" => Value::Integer(i64::from(r.track_number)),

        "composer" => text(&r.composer),
        "conductor" => text(&r.conductor),
        "year" => int(r.year),
        "album_gain" => real(r.album_gain),
        "album_art" => text(&r.album_art),
        "track_length" => text(&r.track_length),
        "rating" => text(&r.rating),
        "comment" => text(&r.comment),
        "track_gain" => real(r.track_gain),
        "bitrate" => int(r.bitrate),
        "sampling_rate" => int(r.sampling_rate),
        "music_genre" => text(&r.music_genre),
        "genre_in_dict" => text(&r.genre_in_dict),
        "file_size" => int(r.file_size),
        "readable_size" => text(&r.readable_size),
        "file_ext" => text(&r.file_ext),
        "encoder" => text(&r.encoder),
        "file_name" => text(&r.file_name),
        "path_len" => int(r.path_len),
        "last_modified" => text(&r.last_modified),
        "encoding" => text(&r.encoding),
        "hash" => text(&r.hash),
        _ => return None,
    };
    Some(value)
}

/// The ordered subset of the record that `table` stores.
fn row_values(
    table: &str,
    columns: &[String],
    resolved: &ResolvedRecord<'_>,
    extracted_at: &str,
) -> Result<Vec<Value>, LoadError> {
    columns
        .iter()
        .map(|column| {
            column_value(column, resolved, extracted_at).ok_or_else(|| LoadError::MissingField {
                table: table.to_string(),
                column: column.clone(),
            })
        })
        .collect()
}
