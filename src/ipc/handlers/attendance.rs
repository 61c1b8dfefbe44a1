use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{
    normalize_date, normalize_section, normalize_semester, normalize_status,
    normalize_subject_name, normalize_year,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Target field values for one attendance record, keyed by
/// (student_id, date, subject). Every write path goes through
/// `upsert_attendance` with this shape so the composite key stays the
/// single source of truth for duplicates.
pub struct AttendanceWrite {
    pub student_id: String,
    pub date: String,
    pub subject: String,
    pub status: String,
    pub section: String,
    pub year: String,
    pub semester: String,
}

pub struct ExistingAttendance {
    pub status: String,
    pub section: String,
    pub year: String,
    pub semester: String,
    pub subject: String,
}

pub fn find_attendance(
    conn: &Connection,
    student_id: &str,
    date: &str,
    subject: &str,
) -> Result<Option<ExistingAttendance>, rusqlite::Error> {
    conn.query_row(
        "SELECT status, section, year, semester, subject
         FROM attendance
         WHERE student_id = ? AND date = ? AND subject = ?",
        (student_id, date, subject),
        |r| {
            Ok(ExistingAttendance {
                status: r.get(0)?,
                section: r.get(1)?,
                year: r.get(2)?,
                semester: r.get(3)?,
                subject: r.get(4)?,
            })
        },
    )
    .optional()
}

pub fn upsert_attendance(conn: &Connection, w: &AttendanceWrite) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO attendance(id, student_id, date, subject, status, section, year, semester)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date, subject) DO UPDATE SET
           status = excluded.status,
           section = excluded.section,
           year = excluded.year,
           semester = excluded.semester",
        (
            Uuid::new_v4().to_string(),
            &w.student_id,
            &w.date,
            &w.subject,
            &w.status,
            &w.section,
            &w.year,
            &w.semester,
        ),
    )?;
    Ok(())
}

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ?",
            [student_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn attendance_mark(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester = get_required_str(params, "semester")?;
    let Some(semester) = normalize_semester(&semester) else {
        return Err(HandlerErr::bad_params("Semester must be sem1 or sem2"));
    };
    let date_raw = get_required_str(params, "date")?;
    let subject = normalize_subject_name(&get_required_str(params, "subject")?);
    if subject.is_empty() {
        return Err(HandlerErr::bad_params("Date and subject are required."));
    }
    let Some(date) = normalize_date(&date_raw) else {
        return Err(HandlerErr::bad_params(format!(
            "unrecognized date '{}'",
            date_raw
        )));
    };
    let date = date.format("%Y-%m-%d").to_string();
    let section = normalize_section(&get_required_str(params, "section")?);
    let year = normalize_year(&get_required_str(params, "year")?);

    if let Some(records) = params.get("records").and_then(|v| v.as_array()) {
        // Bulk marking: one day and subject, many students.
        let tx = conn.unchecked_transaction()?;
        let mut count = 0usize;
        for rec in records {
            let Some(student_id) = rec.get("studentId").and_then(|v| v.as_str()) else {
                return Err(HandlerErr::bad_params("records[].studentId is required"));
            };
            let Some(status_raw) = rec.get("status").and_then(|v| v.as_str()) else {
                return Err(HandlerErr::bad_params("records[].status is required"));
            };
            let Some(status) = normalize_status(status_raw) else {
                return Err(HandlerErr::bad_params(format!(
                    "Invalid status value '{}'. Must be Present or Absent.",
                    status_raw
                )));
            };
            if !student_exists(&tx, student_id)? {
                continue;
            }
            upsert_attendance(
                &tx,
                &AttendanceWrite {
                    student_id: student_id.to_string(),
                    date: date.clone(),
                    subject: subject.clone(),
                    status: status.as_str().to_string(),
                    section: section.clone(),
                    year: year.clone(),
                    semester: semester.as_sem_str().to_string(),
                },
            )?;
            count += 1;
        }
        tx.commit()?;
        return Ok(json!({ "message": "Bulk attendance marked/updated", "count": count }));
    }

    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let status_raw = get_required_str(params, "status")?;
    let Some(status) = normalize_status(&status_raw) else {
        return Err(HandlerErr::bad_params(format!(
            "Invalid status value '{}'. Must be Present or Absent.",
            status_raw
        )));
    };
    upsert_attendance(
        conn,
        &AttendanceWrite {
            student_id: student_id.clone(),
            date: date.clone(),
            subject: subject.clone(),
            status: status.as_str().to_string(),
            section: section.clone(),
            year: year.clone(),
            semester: semester.as_sem_str().to_string(),
        },
    )?;
    Ok(json!({
        "message": "Attendance marked/updated",
        "attendance": {
            "studentId": student_id,
            "date": date,
            "subject": subject,
            "status": status.as_str(),
            "section": section,
            "year": year,
            "semester": semester.as_sem_str()
        }
    }))
}

/// Per-semester presence summary with optional subject/date filters.
/// Caller identity is always an explicit studentId param.
fn attendance_student_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let mut sql = String::from(
        "SELECT date, subject, status, section, year, semester
         FROM attendance WHERE student_id = ?",
    );
    let mut args: Vec<String> = vec![student_id];
    if let Some(sem_raw) = get_opt_str(params, "semester") {
        let Some(sem) = normalize_semester(&sem_raw) else {
            return Err(HandlerErr::bad_params("Semester must be sem1 or sem2"));
        };
        sql.push_str(" AND semester = ?");
        args.push(sem.as_sem_str().to_string());
    }
    if let Some(subject) = get_opt_str(params, "subject") {
        sql.push_str(" AND subject = ?");
        args.push(normalize_subject_name(&subject));
    }
    if let Some(date_raw) = get_opt_str(params, "date") {
        let Some(date) = normalize_date(&date_raw) else {
            return Err(HandlerErr::bad_params(format!(
                "unrecognized date '{}'",
                date_raw
            )));
        };
        sql.push_str(" AND date = ?");
        args.push(date.format("%Y-%m-%d").to_string());
    }
    sql.push_str(" ORDER BY date");

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(json!({
                "date": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
                "section": r.get::<_, String>(3)?,
                "year": r.get::<_, String>(4)?,
                "semester": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let total = records.len();
    let presents = records
        .iter()
        .filter(|r| r.get("status").and_then(|s| s.as_str()) == Some("Present"))
        .count();
    let percentage = if total > 0 {
        presents as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Ok(json!({
        "presents": presents,
        "total": total,
        "percentage": percentage,
        "records": records
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
        "attendance.mark" => Some(handle(state, req, attendance_mark)),
        "attendance.studentSummary" => Some(handle(state, req, attendance_student_summary)),
        _ => None,
    }
}
