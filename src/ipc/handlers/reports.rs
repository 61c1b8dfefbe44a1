use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_section, normalize_semester, normalize_year};
use rusqlite::Connection;
use serde_json::json;

use super::students::load_student;

fn attendance_counts(
    conn: &Connection,
    student_id: &str,
    semester: Option<&str>,
) -> Result<(i64, i64), rusqlite::Error> {
    match semester {
        Some(sem) => conn.query_row(
            "SELECT COUNT(CASE WHEN status = 'Present' THEN 1 END), COUNT(*)
             FROM attendance WHERE student_id = ? AND semester = ?",
            (student_id, sem),
            |r| Ok((r.get(0)?, r.get(1)?)),
        ),
        None => conn.query_row(
            "SELECT COUNT(CASE WHEN status = 'Present' THEN 1 END), COUNT(*)
             FROM attendance WHERE student_id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        ),
    }
}

fn percentage(presents: i64, total: i64) -> f64 {
    if total > 0 {
        presents as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

fn marks_rows(
    conn: &Connection,
    student_id: &str,
    semester: Option<&str>,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut sql = String::from(
        "SELECT subject, assessment_type, score, max_score, semester
         FROM marks WHERE student_id = ?",
    );
    let mut args: Vec<String> = vec![student_id.to_string()];
    if let Some(sem) = semester {
        sql.push_str(" AND semester = ?");
        args.push(sem.to_string());
    }
    sql.push_str(" ORDER BY subject, assessment_type");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(rusqlite::params_from_iter(args.iter()), |r| {
        Ok(json!({
            "subject": r.get::<_, String>(0)?,
            "assessmentType": r.get::<_, String>(1)?,
            "score": r.get::<_, f64>(2)?,
            "maxScore": r.get::<_, f64>(3)?,
            "semester": r.get::<_, String>(4)?,
        }))
    })
    .and_then(|it| it.collect())
}

/// Quiz attempts joined to their quizzes. `quiz_semester` drops attempts
/// whose quiz belongs to another semester.
fn quiz_rows(
    conn: &Connection,
    student_id: &str,
    quiz_semester: Option<&str>,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut sql = String::from(
        "SELECT q.title, q.subject, a.score, a.submitted_at
         FROM quiz_attempts a JOIN quizzes q ON q.id = a.quiz_id
         WHERE a.student_id = ?",
    );
    let mut args: Vec<String> = vec![student_id.to_string()];
    if let Some(sem) = quiz_semester {
        sql.push_str(" AND q.semester = ?");
        args.push(sem.to_string());
    }
    sql.push_str(" ORDER BY a.submitted_at");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(rusqlite::params_from_iter(args.iter()), |r| {
        Ok(json!({
            "quizTitle": r.get::<_, String>(0)?,
            "subject": r.get::<_, String>(1)?,
            "score": r.get::<_, f64>(2)?,
            "submittedAt": r.get::<_, String>(3)?,
        }))
    })
    .and_then(|it| it.collect())
}

/// Aggregated per-student report: attendance ratio, marks and quiz
/// attempts. Rendering to a document format is the caller's concern.
fn report_student_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = load_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let semester = match get_opt_str(params, "semester") {
        Some(raw) => Some(
            normalize_semester(&raw)
                .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?
                .as_sem_str()
                .to_string(),
        ),
        None => None,
    };

    let (presents, total) = attendance_counts(conn, &student_id, semester.as_deref())?;
    let marks = marks_rows(conn, &student_id, semester.as_deref())?;
    let quizzes = quiz_rows(conn, &student_id, None)?;

    Ok(json!({
        "student": student,
        "attendance": {
            "presents": presents,
            "total": total,
            "percentage": percentage(presents, total)
        },
        "marks": marks,
        "quizzes": quizzes
    }))
}

/// Class-wide report: one row per student in the (section, year) cohort,
/// with attendance, marks and quiz attempts narrowed to the requested
/// semester.
fn report_class_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section = normalize_section(&get_required_str(params, "section")?);
    let year = normalize_year(&get_required_str(params, "year")?);
    let semester = normalize_semester(&get_required_str(params, "semester")?)
        .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?
        .as_sem_str()
        .to_string();

    let mut stmt = conn.prepare(
        "SELECT id, name, email FROM students
         WHERE section = ? AND year = ? ORDER BY roll_no",
    )?;
    let cohort = stmt
        .query_map((&section, &year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut students = Vec::with_capacity(cohort.len());
    for (student_id, name, email) in &cohort {
        let (presents, total) = attendance_counts(conn, student_id, Some(&semester))?;
        let marks = marks_rows(conn, student_id, Some(&semester))?;
        let quizzes = quiz_rows(conn, student_id, Some(&semester))?;
        students.push(json!({
            "studentId": student_id,
            "name": name,
            "email": email,
            "attendance": {
                "presents": presents,
                "total": total,
                "percentage": percentage(presents, total)
            },
            "marks": marks,
            "quizzes": quizzes
        }));
    }

    Ok(json!({
        "section": section,
        "year": year,
        "semester": semester,
        "students": students
    }))
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
        "reports.studentSummary" => Some(handle(state, req, report_student_summary)),
        "reports.classSummary" => Some(handle(state, req, report_class_summary)),
        _ => None,
    }
}
