use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_section, normalize_semester, normalize_year};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn student_json(r: &rusqlite::Row<'_>) -> Result<serde_json::Value, rusqlite::Error> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "idNumber": r.get::<_, String>(1)?,
        "name": r.get::<_, String>(2)?,
        "email": r.get::<_, String>(3)?,
        "section": r.get::<_, String>(4)?,
        "year": r.get::<_, String>(5)?,
        "semester": r.get::<_, String>(6)?,
        "rollNo": r.get::<_, String>(7)?,
        "phone": r.get::<_, Option<String>>(8)?,
        "active": r.get::<_, i64>(9)? != 0,
    }))
}

const STUDENT_COLS: &str =
    "id, id_number, name, email, section, year, semester, roll_no, phone, active";

pub fn load_student(
    conn: &Connection,
    student_id: &str,
) -> Result<Option<serde_json::Value>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLS),
        [student_id],
        |r| student_json(r),
    )
    .optional()
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "email")?.trim().to_ascii_lowercase();
    let id_number = get_required_str(params, "idNumber")?;
    let roll_no = get_required_str(params, "rollNo")?;
    let section = normalize_section(&get_required_str(params, "section")?);
    let year = normalize_year(&get_required_str(params, "year")?);
    let semester = match get_opt_str(params, "semester") {
        Some(raw) => normalize_semester(&raw)
            .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?,
        None => crate::normalize::Semester::Sem1,
    };
    let name = match get_opt_str(params, "name") {
        Some(n) => n,
        None => email.split('@').next().unwrap_or("").to_string(),
    };
    let phone = get_opt_str(params, "phone");

    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE email = ? OR id_number = ?",
            (&email, &id_number),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr {
            code: "conflict",
            message: "Email or ID Number already exists".to_string(),
            details: None,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, id_number, name, email, section, year, semester, roll_no, phone, active)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        (
            &id,
            &id_number,
            &name,
            &email,
            &section,
            &year,
            semester.as_sem_str(),
            &roll_no,
            &phone,
        ),
    )?;
    let student = load_student(conn, &id)?
        .ok_or_else(|| HandlerErr::not_found("student not found after insert"))?;
    Ok(json!({ "message": "Student created", "student": student }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut sql = format!("SELECT {} FROM students WHERE 1=1", STUDENT_COLS);
    let mut args: Vec<String> = Vec::new();
    if let Some(section) = get_opt_str(params, "section") {
        sql.push_str(" AND section = ?");
        args.push(normalize_section(&section));
    }
    if let Some(year) = get_opt_str(params, "year") {
        sql.push_str(" AND year = ?");
        args.push(normalize_year(&year));
    }
    if let Some(search) = get_opt_str(params, "search") {
        sql.push_str(" AND (roll_no LIKE ? OR phone LIKE ? OR name LIKE ?)");
        let pattern = format!("%{}%", search);
        args.push(pattern.clone());
        args.push(pattern.clone());
        args.push(pattern);
    }
    sql.push_str(" ORDER BY roll_no");

    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| student_json(r))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "students": students }))
}

fn students_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student =
        load_student(conn, &student_id)?.ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let existing = load_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let section = get_opt_str(params, "section")
        .map(|s| normalize_section(&s))
        .unwrap_or_else(|| existing["section"].as_str().unwrap_or_default().to_string());
    let year = get_opt_str(params, "year")
        .map(|s| normalize_year(&s))
        .unwrap_or_else(|| existing["year"].as_str().unwrap_or_default().to_string());
    let semester = match get_opt_str(params, "semester") {
        Some(raw) => normalize_semester(&raw)
            .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?
            .as_sem_str()
            .to_string(),
        None => existing["semester"].as_str().unwrap_or("sem1").to_string(),
    };
    let name = get_opt_str(params, "name")
        .unwrap_or_else(|| existing["name"].as_str().unwrap_or_default().to_string());
    let roll_no = get_opt_str(params, "rollNo")
        .unwrap_or_else(|| existing["rollNo"].as_str().unwrap_or_default().to_string());
    let phone = get_opt_str(params, "phone")
        .or_else(|| existing["phone"].as_str().map(|s| s.to_string()));

    conn.execute(
        "UPDATE students
         SET name = ?, section = ?, year = ?, semester = ?, roll_no = ?, phone = ?
         WHERE id = ?",
        (&name, &section, &year, &semester, &roll_no, &phone, &student_id),
    )?;
    let student = load_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "message": "Student updated", "student": student }))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [&student_id])?;
    tx.execute("DELETE FROM marks WHERE student_id = ?", [&student_id])?;
    tx.execute(
        "DELETE FROM quiz_attempts WHERE student_id = ?",
        [&student_id],
    )?;
    tx.execute(
        "DELETE FROM notifications WHERE student_id = ?",
        [&student_id],
    )?;
    let n = tx.execute("DELETE FROM students WHERE id = ?", [&student_id])?;
    tx.commit()?;
    if n == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "message": "Student deleted" }))
}

fn handle(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle(state, req, students_create)),
        "students.list" => Some(handle(state, req, students_list)),
        "students.get" => Some(handle(state, req, students_get)),
        "students.update" => Some(handle(state, req, students_update)),
        "students.delete" => Some(handle(state, req, students_delete)),
        _ => None,
    }
}
