use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_flag, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{
    normalize_date, normalize_section, normalize_semester, normalize_status,
    normalize_subject_name, normalize_year, Semester, Status,
};
use crate::sheet::{self, SheetRow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

use super::attendance::{find_attendance, upsert_attendance, AttendanceWrite};
use super::notifications::insert_notification;

/// Fully-normalized target values for one sheet row, plus the external id
/// the diagnostics refer to.
struct RowTarget {
    student_id: String,
    id_number: String,
    date: String,
    subject: String,
    status: Status,
    section: String,
    year: String,
    semester: Semester,
}

impl RowTarget {
    fn write(&self) -> AttendanceWrite {
        AttendanceWrite {
            student_id: self.student_id.clone(),
            date: self.date.clone(),
            subject: self.subject.clone(),
            status: self.status.as_str().to_string(),
            section: self.section.clone(),
            year: self.year.clone(),
            semester: self.semester.as_sem_str().to_string(),
        }
    }
}

/// What one row would do against the persisted record at its composite key.
enum RowOutcome {
    Skip(String),
    Create(RowTarget),
    Update(RowTarget, serde_json::Value),
    NoChange(String),
}

fn find_student_by_id_number(
    conn: &Connection,
    id_number: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM students WHERE id_number = ?",
        [id_number],
        |r| r.get(0),
    )
    .optional()
}

/// Subjects may be referenced by display name or short code; storage always
/// uses the display name so marks and reports aggregate on one spelling.
/// The subjects table keeps semester in digit form.
fn resolve_subject(
    conn: &Connection,
    name_or_code: &str,
    year: &str,
    semester: Semester,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT name FROM subjects
         WHERE (name = ?1 OR code = ?1) AND year = ?2 AND semester = ?3",
        (name_or_code, year, semester.as_digit_str()),
        |r| r.get(0),
    )
    .optional()
}

/// Normalize, resolve and classify one attendance sheet row. A skip reason
/// is terminal for the row; only the first problem found is reported.
fn classify_attendance_row(
    conn: &Connection,
    row: &SheetRow,
    today: NaiveDate,
) -> Result<RowOutcome, rusqlite::Error> {
    let (Some(id_number), Some(date_raw)) = (row.get("ID Number"), row.get("Date")) else {
        return Ok(RowOutcome::Skip(
            "Missing or invalid required fields (check semester value: must be sem1 or sem2)"
                .to_string(),
        ));
    };

    let Some(date) = normalize_date(date_raw) else {
        return Ok(RowOutcome::Skip(format!(
            "Unrecognized date value '{}'",
            date_raw
        )));
    };
    // Evaluated against the actual clock at processing time; attendance for
    // a day that has not happened yet is never importable.
    if date > today {
        return Ok(RowOutcome::Skip(
            "Cannot import attendance for a future date.".to_string(),
        ));
    }

    let status_raw = row.get("Status").unwrap_or("");
    let status = if status_raw.is_empty() {
        None
    } else {
        let s = normalize_status(status_raw);
        if s.is_none() {
            return Ok(RowOutcome::Skip(format!(
                "Invalid status value '{}'. Must be Present or Absent.",
                status_raw
            )));
        }
        s
    };
    let section = row.get("Section").map(normalize_section).unwrap_or_default();
    let year = row.get("Year").map(normalize_year).unwrap_or_default();
    let semester = row.get("Semester").and_then(normalize_semester);
    let subject_raw = row
        .get("Subject")
        .map(normalize_subject_name)
        .unwrap_or_default();

    let (Some(status), Some(semester)) = (status, semester) else {
        return Ok(RowOutcome::Skip(
            "Missing or invalid required fields (check semester value: must be sem1 or sem2)"
                .to_string(),
        ));
    };
    if section.is_empty() || year.is_empty() || subject_raw.is_empty() {
        return Ok(RowOutcome::Skip(
            "Missing or invalid required fields (check semester value: must be sem1 or sem2)"
                .to_string(),
        ));
    }

    let Some(student_id) = find_student_by_id_number(conn, id_number)? else {
        return Ok(RowOutcome::Skip("Student not found".to_string()));
    };

    let Some(subject) = resolve_subject(conn, &subject_raw, &year, semester)? else {
        return Ok(RowOutcome::Skip(format!(
            "Subject '{}' not found for year {} and semester {}",
            subject_raw,
            year,
            semester.as_digit_str()
        )));
    };

    let target = RowTarget {
        student_id,
        id_number: id_number.to_string(),
        date: date.format("%Y-%m-%d").to_string(),
        subject,
        status,
        section,
        year,
        semester,
    };

    let existing = find_attendance(conn, &target.student_id, &target.date, &target.subject)?;
    let Some(existing) = existing else {
        return Ok(RowOutcome::Create(target));
    };

    let same = existing.status == target.status.as_str()
        && existing.section == target.section
        && existing.year == target.year
        && existing.semester == target.semester.as_sem_str()
        && existing.subject == target.subject;
    if same {
        return Ok(RowOutcome::NoChange(target.id_number));
    }

    let changes = json!({
        "from": {
            "status": existing.status,
            "section": existing.section,
            "year": existing.year,
            "semester": existing.semester,
            "subject": existing.subject
        },
        "to": {
            "status": target.status.as_str(),
            "section": target.section,
            "year": target.year,
            "semester": target.semester.as_sem_str(),
            "subject": target.subject
        }
    });
    Ok(RowOutcome::Update(target, changes))
}

fn import_attendance(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path_s = get_required_str(params, "path")?;
    let path = Path::new(&path_s);
    let confirm_update = get_flag(params, "confirmUpdate");

    let rows = match sheet::read_sheet(path) {
        Ok(rows) => rows,
        Err(e) => {
            sheet::discard_sheet(path);
            return Err(HandlerErr {
                code: "parse_failed",
                message: e.to_string(),
                details: Some(json!({ "path": path_s })),
            });
        }
    };
    log::info!("processing {} attendance rows from {}", rows.len(), path_s);

    let today = Utc::now().date_naive();
    let mut created = 0usize;
    let mut updated = 0usize;
    let mut skipped = 0usize;
    let mut errors: Vec<serde_json::Value> = Vec::new();
    let mut to_create: Vec<serde_json::Value> = Vec::new();
    let mut to_update: Vec<serde_json::Value> = Vec::new();
    let mut no_change: Vec<serde_json::Value> = Vec::new();
    let mut notifications: Vec<serde_json::Value> = Vec::new();

    for row in &rows {
        let outcome = match classify_attendance_row(conn, row, today) {
            Ok(v) => v,
            Err(e) => {
                // Row-local database trouble skips the row; the rest of the
                // sheet still gets processed.
                skipped += 1;
                errors.push(json!({ "row": row.number, "reason": e.to_string() }));
                continue;
            }
        };
        match outcome {
            RowOutcome::Skip(reason) => {
                skipped += 1;
                errors.push(json!({ "row": row.number, "reason": reason }));
            }
            RowOutcome::Create(target) => {
                if !confirm_update {
                    to_create.push(json!({ "row": row.number, "idNumber": target.id_number }));
                    continue;
                }
                match upsert_attendance(conn, &target.write()) {
                    Ok(()) => created += 1,
                    Err(e) => {
                        skipped += 1;
                        errors.push(json!({ "row": row.number, "reason": e.to_string() }));
                    }
                }
            }
            RowOutcome::Update(target, changes) => {
                if !confirm_update {
                    to_update.push(json!({
                        "row": row.number,
                        "idNumber": target.id_number,
                        "changes": changes
                    }));
                    continue;
                }
                match upsert_attendance(conn, &target.write()) {
                    Ok(()) => {
                        updated += 1;
                        let message = format!(
                            "Attendance for {} on {} ({}) was updated by import.",
                            target.id_number, target.date, target.subject
                        );
                        let _ = insert_notification(conn, Some(&target.student_id), &message);
                        notifications.push(json!({
                            "row": row.number,
                            "message": "Record already existed and was updated."
                        }));
                    }
                    Err(e) => {
                        skipped += 1;
                        errors.push(json!({ "row": row.number, "reason": e.to_string() }));
                    }
                }
            }
            RowOutcome::NoChange(id_number) => {
                if !confirm_update {
                    no_change.push(json!({ "row": row.number, "idNumber": id_number }));
                }
            }
        }
    }

    sheet::discard_sheet(path);

    if !confirm_update {
        return Ok(json!({
            "status": "dryrun",
            "message": "Duplicates are not possible, but you can update the records or cancel the operation.",
            "duplicatesNotPossible": true,
            "toCreate": to_create,
            "toUpdate": to_update,
            "noChange": no_change,
            "skipped": skipped,
            "errors": errors
        }));
    }

    log::info!(
        "attendance import complete: {} created, {} updated, {} skipped",
        created,
        updated,
        skipped
    );
    Ok(json!({
        "status": "success",
        "message": format!(
            "Attendance import complete: {} created, {} updated, {} skipped.",
            created, updated, skipped
        ),
        "created": created,
        "updated": updated,
        "skipped": skipped,
        "errors": errors,
        "notifications": notifications
    }))
}

fn import_students(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path_s = get_required_str(params, "path")?;
    let path = Path::new(&path_s);

    let rows = match sheet::read_sheet(path) {
        Ok(rows) => rows,
        Err(e) => {
            sheet::discard_sheet(path);
            return Err(HandlerErr {
                code: "parse_failed",
                message: e.to_string(),
                details: Some(json!({ "path": path_s })),
            });
        }
    };
    log::info!("processing {} student rows from {}", rows.len(), path_s);

    let mut created = 0usize;
    let mut skipped = 0usize;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for row in &rows {
        let email = row.get("Email").unwrap_or("").to_ascii_lowercase();
        let name = email.split('@').next().unwrap_or("").to_string();
        let section = row.get("Section").map(normalize_section).unwrap_or_default();
        let year = row.get("Year").map(normalize_year).unwrap_or_default();
        let roll_no = row.get("Roll No").unwrap_or("").to_string();
        let id_number = row.get("ID Number").unwrap_or("").to_string();
        let phone = row.get("Phone").map(|s| s.to_string());
        let semester = match row.get("Semester") {
            Some(raw) => match normalize_semester(raw) {
                Some(s) => s,
                None => {
                    skipped += 1;
                    errors.push(json!({
                        "row": row.number,
                        "reason": format!("Invalid semester value '{}'. Must be sem1 or sem2.", raw)
                    }));
                    continue;
                }
            },
            None => Semester::Sem1,
        };

        if name.is_empty()
            || email.is_empty()
            || section.is_empty()
            || year.is_empty()
            || roll_no.is_empty()
            || id_number.is_empty()
        {
            skipped += 1;
            errors.push(json!({ "row": row.number, "reason": "Missing required fields" }));
            continue;
        }

        let taken: Result<Option<i64>, _> = conn
            .query_row(
                "SELECT 1 FROM students WHERE email = ? OR id_number = ?",
                (&email, &id_number),
                |r| r.get(0),
            )
            .optional();
        match taken {
            Ok(Some(_)) => {
                skipped += 1;
                errors.push(json!({
                    "row": row.number,
                    "reason": "Email or ID Number already exists"
                }));
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                errors.push(json!({ "row": row.number, "reason": e.to_string() }));
                continue;
            }
        }

        let inserted = conn.execute(
            "INSERT INTO students(id, id_number, name, email, section, year, semester, roll_no, phone, active)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
            (
                Uuid::new_v4().to_string(),
                &id_number,
                &name,
                &email,
                &section,
                &year,
                semester.as_sem_str(),
                &roll_no,
                &phone,
            ),
        );
        match inserted {
            Ok(_) => created += 1,
            Err(e) => {
                skipped += 1;
                errors.push(json!({ "row": row.number, "reason": e.to_string() }));
            }
        }
    }

    sheet::discard_sheet(path);

    log::info!(
        "student import complete: {} created, {} skipped",
        created,
        skipped
    );
    Ok(json!({
        "status": "success",
        "message": format!("Import complete: {} created, {} skipped.", created, skipped),
        "created": created,
        "skipped": skipped,
        "errors": errors
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
        "import.attendance" => Some(handle(state, req, import_attendance)),
        "import.students" => Some(handle(state, req, import_students)),
        _ => None,
    }
}
