use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_semester, normalize_subject_name, normalize_year};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn subjects_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = normalize_subject_name(&get_required_str(params, "name")?);
    let code = get_required_str(params, "code")?.trim().to_string();
    if name.is_empty() || code.is_empty() {
        return Err(HandlerErr::bad_params("name and code are required"));
    }
    let year = normalize_year(&get_required_str(params, "year")?);
    let semester = normalize_semester(&get_required_str(params, "semester")?)
        .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?;

    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects
             WHERE (name = ?1 OR code = ?2) AND year = ?3 AND semester = ?4",
            (&name, &code, &year, semester.as_digit_str()),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr {
            code: "conflict",
            message: "Subject already exists for this year and semester".to_string(),
            details: None,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, code, year, semester) VALUES(?, ?, ?, ?, ?)",
        (&id, &name, &code, &year, semester.as_digit_str()),
    )?;
    Ok(json!({
        "subject": {
            "id": id,
            "name": name,
            "code": code,
            "year": year,
            "semester": semester.as_digit_str()
        }
    }))
}

fn subjects_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut sql =
        String::from("SELECT id, name, code, year, semester FROM subjects WHERE 1=1");
    let mut args: Vec<String> = Vec::new();
    if let Some(year) = get_opt_str(params, "year") {
        sql.push_str(" AND year = ?");
        args.push(normalize_year(&year));
    }
    if let Some(sem_raw) = get_opt_str(params, "semester") {
        let sem = normalize_semester(&sem_raw)
            .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?;
        sql.push_str(" AND semester = ?");
        args.push(sem.as_digit_str().to_string());
    }
    sql.push_str(" ORDER BY year, semester, name");

    let mut stmt = conn.prepare(&sql)?;
    let subjects = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "code": r.get::<_, String>(2)?,
                "year": r.get::<_, String>(3)?,
                "semester": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let n = conn.execute("DELETE FROM subjects WHERE id = ?", [&id])?;
    if n == 0 {
        return Err(HandlerErr::not_found("subject not found"));
    }
    Ok(json!({ "ok": true }))
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
        "subjects.create" => Some(handle(state, req, subjects_create)),
        "subjects.list" => Some(handle(state, req, subjects_list)),
        "subjects.delete" => Some(handle(state, req, subjects_delete)),
        _ => None,
    }
}
