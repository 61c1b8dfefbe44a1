use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("campus.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            id_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            section TEXT NOT NULL,
            year TEXT NOT NULL,
            semester TEXT NOT NULL DEFAULT 'sem1',
            roll_no TEXT NOT NULL,
            phone TEXT,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    // Early workspaces predate the semester column. Add and default it.
    ensure_students_semester(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section_year ON students(section, year)",
        [],
    )?;

    // subjects.semester is the bare digit form ('1'/'2'); attendance and
    // marks store the 'sem1'/'sem2' form. Lookups must not mix the two.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            year TEXT NOT NULL,
            semester TEXT NOT NULL,
            UNIQUE(name, year, semester),
            UNIQUE(code, year, semester)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            subject TEXT NOT NULL,
            status TEXT NOT NULL,
            section TEXT NOT NULL,
            year TEXT NOT NULL,
            semester TEXT NOT NULL,
            UNIQUE(student_id, date, subject),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_sem ON attendance(student_id, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            assessment_type TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            date TEXT,
            semester TEXT NOT NULL,
            UNIQUE(student_id, subject, assessment_type, semester),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            subject TEXT NOT NULL,
            section TEXT NOT NULL,
            year TEXT NOT NULL,
            semester TEXT NOT NULL,
            questions TEXT NOT NULL,
            deadline TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_cohort ON quizzes(section, year, semester)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz_attempts(
            id TEXT PRIMARY KEY,
            quiz_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            answers TEXT NOT NULL,
            score REAL NOT NULL,
            evaluated INTEGER NOT NULL DEFAULT 1,
            submitted_at TEXT NOT NULL,
            UNIQUE(quiz_id, student_id),
            FOREIGN KEY(quiz_id) REFERENCES quizzes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_attempts_student ON quiz_attempts(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            student_id TEXT,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_student ON notifications(student_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_semester(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "semester")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN semester TEXT NOT NULL DEFAULT 'sem1'",
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
