use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "schoolcal.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_year_calendars(
            id TEXT PRIMARY KEY,
            academic_year INTEGER NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // position 1 = first semester, 2 = second semester.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semester_calendars(
            id TEXT PRIMARY KEY,
            calendar_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            starts_at TEXT NOT NULL,
            ends_at TEXT NOT NULL,
            weeks_count INTEGER NOT NULL DEFAULT 0,
            working_weeks_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(calendar_id) REFERENCES academic_year_calendars(id),
            UNIQUE(calendar_id, position)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_events(
            id TEXT PRIMARY KEY,
            calendar_id TEXT NOT NULL,
            owner TEXT NOT NULL,
            semester_id TEXT,
            event_type TEXT NOT NULL,
            name TEXT NOT NULL,
            starts_at TEXT NOT NULL,
            ends_at TEXT NOT NULL,
            FOREIGN KEY(calendar_id) REFERENCES academic_year_calendars(id),
            FOREIGN KEY(semester_id) REFERENCES semester_calendars(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_events_calendar ON school_events(calendar_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS study_classes(
            id TEXT PRIMARY KEY,
            school_unit_id TEXT NOT NULL,
            academic_year INTEGER NOT NULL,
            class_grade INTEGER NOT NULL,
            class_letter TEXT NOT NULL,
            track TEXT NOT NULL,
            UNIQUE(school_unit_id, academic_year, class_grade, class_letter)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_study_classes_school ON study_classes(school_unit_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            full_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES study_classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;
    ensure_students_behavior_grade(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            semester INTEGER NOT NULL,
            grade INTEGER NOT NULL,
            taken_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_catalog_grades_student ON catalog_grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_absences(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            semester INTEGER NOT NULL,
            taken_at TEXT NOT NULL,
            is_founded INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_catalog_absences_student ON catalog_absences(student_id)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

// Workspaces created before behavior grades were tracked lack the column.
fn ensure_students_behavior_grade(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "behavior_grade")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN behavior_grade INTEGER NOT NULL DEFAULT 10",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
