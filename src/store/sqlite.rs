use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use slide_model::Slide;
use tracing::{debug, info, warn};

use super::SlideStore;
use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw column values before they are trusted as a [`Slide`].
struct SlideRow {
    name: String,
    start_ms: i64,
    end_ms: i64,
    span: Option<i64>,
    duration: i64,
    rank: i64,
}

impl SlideRow {
    const COLUMNS: &'static str = "name, start_ms, end_ms, span, duration, rank";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            start_ms: row.get(1)?,
            end_ms: row.get(2)?,
            span: row.get(3)?,
            duration: row.get(4)?,
            rank: row.get(5)?,
        })
    }

    fn into_slide(self) -> Option<Slide> {
        let start = DateTime::<Utc>::from_timestamp_millis(self.start_ms)?;
        let end = DateTime::<Utc>::from_timestamp_millis(self.end_ms)?;
        let duration = u32::try_from(self.duration).ok()?;
        Some(Slide {
            name: self.name,
            start,
            end,
            span: self.span,
            duration,
            rank: self.rank,
        })
    }
}

/// Durable store backed by a single SQLite table.
///
/// WAL mode plus a busy timeout lets the publisher and `osmoctl` share the
/// database file from separate processes.
pub struct SqliteSlideStore {
    conn: Mutex<Connection>,
}

impl SqliteSlideStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(path = %path.display(), journal_mode = %mode, "opened slide database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Creates the schema. Safe to call on every startup.
fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS slides (
            name        TEXT PRIMARY KEY NOT NULL,
            start_ms    INTEGER NOT NULL,
            end_ms      INTEGER NOT NULL,
            span        INTEGER,
            duration    INTEGER NOT NULL,
            rank        INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );",
    )
}

impl SlideStore for SqliteSlideStore {
    fn add(&self, slide: Slide) -> Result<(), StoreError> {
        slide.validate()?;
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO slides
             (name, start_ms, end_ms, span, duration, rank, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                slide.name,
                slide.start.timestamp_millis(),
                slide.end.timestamp_millis(),
                slide.span,
                i64::from(slide.duration),
                slide.rank,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(slide.name));
        }
        debug!(name = %slide.name, "slide added");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM slides WHERE name = ?1", [name])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        debug!(name, "slide removed");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Slide>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM slides WHERE name = ?1", SlideRow::COLUMNS),
                [name],
                SlideRow::from_row,
            )
            .optional()?;
        Ok(row.and_then(SlideRow::into_slide))
    }

    fn snapshot(&self) -> Result<Vec<Slide>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM slides ORDER BY name",
            SlideRow::COLUMNS
        ))?;
        let rows = stmt.query_map([], SlideRow::from_row)?;

        let mut slides = Vec::new();
        for row in rows {
            match row {
                Ok(row) => {
                    let name = row.name.clone();
                    match row.into_slide() {
                        Some(slide) => slides.push(slide),
                        None => warn!(%name, "skipping slide with out-of-range fields"),
                    }
                }
                Err(err) => warn!(error = %err, "skipping undecodable slide row"),
            }
        }
        Ok(slides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn add_get_remove() {
        let store = SqliteSlideStore::open_in_memory().unwrap();
        let now = Utc::now();
        let slide = Slide::new("a.jpg", now, now + ChronoDuration::hours(1), 5, 2)
            .unwrap()
            .with_span(Some(5));
        store.add(slide.clone()).unwrap();

        let stored = store.get("a.jpg").unwrap().expect("stored slide");
        assert_eq!(stored.span, Some(5));
        assert_eq!(stored.rank, 2);
        assert_eq!(stored.start.timestamp_millis(), slide.start.timestamp_millis());

        store.remove("a.jpg").unwrap();
        assert!(store.get("a.jpg").unwrap().is_none());
        assert!(matches!(store.remove("a.jpg"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let store = SqliteSlideStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .add(Slide::new("good.jpg", now, now + ChronoDuration::hours(1), 5, 1).unwrap())
            .unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO slides (name, start_ms, end_ms, span, duration, rank, created_at)
                 VALUES ('negative.jpg', 0, 1000, NULL, -5, 1, 'x'),
                        ('text.jpg', 'soon', 1000, NULL, 5, 1, 'x')",
                [],
            )
            .unwrap();
        }
        let names: Vec<String> = store
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["good.jpg"]);
    }
}
