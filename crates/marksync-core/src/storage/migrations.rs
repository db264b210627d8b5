//! Store schema migrations.
//!
//! Migrations are versioned and applied automatically when the store is
//! opened. The `schema_version` table tracks the current version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version. Increment this when adding a migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the store to the current version.
///
/// # Errors
/// Returns an error if a migration fails; earlier migrations stay applied.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Current schema version; 0 for a fresh store.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: marks and the sync queue.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS marks (
            id               TEXT PRIMARY KEY,
            student_id       TEXT,
            subject_id       TEXT,
            academic_year_id TEXT,
            term_id          TEXT,
            class_id         TEXT,
            synced           INTEGER,
            body             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_queue (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            status    TEXT,
            timestamp INTEGER,
            mark_id   TEXT,
            body      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_marks_student_id ON marks(student_id);
        CREATE INDEX IF NOT EXISTS idx_marks_subject_id ON marks(subject_id);
        CREATE INDEX IF NOT EXISTS idx_marks_academic_year_id ON marks(academic_year_id);
        CREATE INDEX IF NOT EXISTS idx_marks_term_id ON marks(term_id);
        CREATE INDEX IF NOT EXISTS idx_marks_class_id ON marks(class_id);
        CREATE INDEX IF NOT EXISTS idx_marks_synced ON marks(synced);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_mark_id ON sync_queue(mark_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: reference-data caches for offline forms.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS students (
            id       TEXT PRIMARY KEY,
            class_id TEXT,
            body     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS classes (
            id               TEXT PRIMARY KEY,
            academic_year_id TEXT,
            body             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subjects (
            id   TEXT PRIMARY KEY,
            tier TEXT,
            body TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_students_class_id ON students(class_id);
        CREATE INDEX IF NOT EXISTS idx_classes_academic_year_id ON classes(academic_year_id);
        CREATE INDEX IF NOT EXISTS idx_subjects_tier ON subjects(tier);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: archive table for compacted queue entries.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_queue_archive (
            id          INTEGER PRIMARY KEY,
            body        TEXT NOT NULL,
            archived_at TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()?;
    Ok(())
}
