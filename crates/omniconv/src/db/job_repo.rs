//! Job repository — CRUD operations for the `jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database. Columns mirror the `JobRecord`
/// fields exactly; nothing else is persisted.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub filename: String,
    pub source_format: String,
    pub destination_format: String,
    pub input_hash: String,
    pub status: String,
    pub progress: i64,
    pub output_path: Option<String>,
    pub error: Option<String>,
    pub method_used: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            source_format: row.get("source_format")?,
            destination_format: row.get("destination_format")?,
            input_hash: row.get("input_hash")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            output_path: row.get("output_path")?,
            error: row.get("error")?,
            method_used: row.get("method_used")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a job row, replacing any existing row with the same id.
pub fn upsert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, filename, source_format, destination_format, input_hash,
             status, progress, output_path, error, method_used, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 progress = excluded.progress,
                 output_path = excluded.output_path,
                 error = excluded.error,
                 method_used = excluded.method_used,
                 updated_at = excluded.updated_at",
            params![
                job.id,
                job.filename,
                job.source_format,
                job.destination_format,
                job.input_hash,
                job.status,
                job.progress,
                job.output_path,
                job.error,
                job.method_used,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes a job row. Returns whether a row existed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

/// All job rows, newest first.
pub fn list_all(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY created_at DESC")?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            filename: "report.pdf".to_string(),
            source_format: "pdf".to_string(),
            destination_format: "txt".to_string(),
            input_hash: "abc".to_string(),
            status: "pending".to_string(),
            progress: 0,
            output_path: None,
            error: None,
            method_used: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &sample_row("j1")).unwrap();

        let row = find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.filename, "report.pdf");
        assert_eq!(row.status, "pending");
        assert_eq!(row.progress, 0);

        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_updates_existing() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &sample_row("j1")).unwrap();

        let mut updated = sample_row("j1");
        updated.status = "completed".to_string();
        updated.progress = 100;
        updated.output_path = Some("/out/j1.txt".to_string());
        updated.method_used = Some("pdftotext".to_string());
        upsert(&db, &updated).unwrap();

        let row = find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.progress, 100);
        assert_eq!(row.output_path.as_deref(), Some("/out/j1.txt"));
        assert_eq!(row.method_used.as_deref(), Some("pdftotext"));

        let count: u64 = count_by_status(&db, "completed").unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_delete() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &sample_row("j1")).unwrap();

        assert!(delete(&db, "j1").unwrap());
        assert!(find_by_id(&db, "j1").unwrap().is_none());
        // Idempotent.
        assert!(!delete(&db, "j1").unwrap());
    }

    #[test]
    fn test_list_all_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let mut old = sample_row("old");
        old.created_at = "2026-01-01T00:00:00+00:00".to_string();
        let mut new = sample_row("new");
        new.created_at = "2026-02-01T00:00:00+00:00".to_string();
        upsert(&db, &old).unwrap();
        upsert(&db, &new).unwrap();

        let rows = list_all(&db).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "new");
        assert_eq!(rows[1].id, "old");
    }

    #[test]
    fn test_count_by_status() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &sample_row("a")).unwrap();
        upsert(&db, &sample_row("b")).unwrap();
        let mut done = sample_row("c");
        done.status = "completed".to_string();
        upsert(&db, &done).unwrap();

        assert_eq!(count_by_status(&db, "pending").unwrap(), 2);
        assert_eq!(count_by_status(&db, "completed").unwrap(), 1);
        assert_eq!(count_by_status(&db, "error").unwrap(), 0);
    }
}
