use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_date, normalize_semester, normalize_subject_name};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Upsert on (student, subject, assessmentType, semester). Re-entering
/// marks for the same assessment overwrites the previous entry and flags
/// the response so the caller can surface a warning.
fn marks_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject = normalize_subject_name(&get_required_str(params, "subject")?);
    let assessment_type = get_required_str(params, "assessmentType")?;
    let score = get_required_f64(params, "score")?;
    let max_score = get_required_f64(params, "maxScore")?;
    let semester = normalize_semester(&get_required_str(params, "semester")?)
        .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?;
    let date = match get_opt_str(params, "date") {
        Some(raw) => Some(
            normalize_date(&raw)
                .ok_or_else(|| HandlerErr::bad_params(format!("unrecognized date '{}'", raw)))?
                .format("%Y-%m-%d")
                .to_string(),
        ),
        None => None,
    };

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }

    let existing_id: Option<String> = conn
        .query_row(
            "SELECT id FROM marks
             WHERE student_id = ? AND subject = ? AND assessment_type = ? AND semester = ?",
            (&student_id, &subject, &assessment_type, semester.as_sem_str()),
            |r| r.get(0),
        )
        .optional()?;

    if let Some(mark_id) = existing_id {
        conn.execute(
            "UPDATE marks SET score = ?, max_score = ?, date = ? WHERE id = ?",
            (score, max_score, &date, &mark_id),
        )?;
        return Ok(json!({
            "message": "Warning: Existing marks updated for this student, subject, assessment and semester.",
            "warning": true,
            "markId": mark_id
        }));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO marks(id, student_id, subject, assessment_type, score, max_score, date, semester)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &subject,
            &assessment_type,
            score,
            max_score,
            &date,
            semester.as_sem_str(),
        ),
    )?;
    Ok(json!({ "message": "Marks added successfully", "markId": id }))
}

fn marks_for_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let mut sql = String::from(
        "SELECT id, subject, assessment_type, score, max_score, date, semester
         FROM marks WHERE student_id = ?",
    );
    let mut args: Vec<String> = vec![student_id];
    if let Some(sem_raw) = get_opt_str(params, "semester") {
        let sem = normalize_semester(&sem_raw)
            .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?;
        sql.push_str(" AND semester = ?");
        args.push(sem.as_sem_str().to_string());
    }
    sql.push_str(" ORDER BY subject, assessment_type");

    let mut stmt = conn.prepare(&sql)?;
    let marks = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "assessmentType": r.get::<_, String>(2)?,
                "score": r.get::<_, f64>(3)?,
                "maxScore": r.get::<_, f64>(4)?,
                "date": r.get::<_, Option<String>>(5)?,
                "semester": r.get::<_, String>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "marks": marks }))
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
        "marks.create" => Some(handle(state, req, marks_create)),
        "marks.forStudent" => Some(handle(state, req, marks_for_student)),
        _ => None,
    }
}
