use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Insert one notification row. A null studentId means a broadcast to all
/// students. Also used by the attendance importer for overwrite notices.
pub fn insert_notification(
    conn: &Connection,
    student_id: Option<&str>,
    message: &str,
) -> Result<String, rusqlite::Error> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO notifications(id, student_id, message, created_at)
         VALUES(?, ?, ?, ?)",
        (&id, &student_id, message, Utc::now().to_rfc3339()),
    )?;
    Ok(id)
}

fn notification_rows(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, Option<String>>(1)?,
                "message": r.get::<_, String>(2)?,
                "createdAt": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn notifications_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let message = get_required_str(params, "message")?;
    if message.trim().is_empty() {
        return Err(HandlerErr::bad_params("message must not be empty"));
    }
    let student_id = get_opt_str(params, "studentId");
    let id = insert_notification(conn, student_id.as_deref(), message.trim())?;
    Ok(json!({ "id": id }))
}

fn notifications_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let rows = notification_rows(
        conn,
        "SELECT id, student_id, message, created_at
         FROM notifications ORDER BY created_at DESC",
        &[],
    )?;
    Ok(json!({ "notifications": rows }))
}

fn notifications_for_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    // Broadcasts (null student_id) are visible to everyone.
    let rows = notification_rows(
        conn,
        "SELECT id, student_id, message, created_at
         FROM notifications
         WHERE student_id = ? OR student_id IS NULL
         ORDER BY created_at DESC",
        &[&student_id],
    )?;
    Ok(json!({ "notifications": rows }))
}

fn notifications_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let n = conn.execute("DELETE FROM notifications WHERE id = ?", [&id])?;
    if n == 0 {
        return Err(HandlerErr::not_found("notification not found"));
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
        "notifications.create" => Some(handle(state, req, notifications_create)),
        "notifications.list" => Some(handle(state, req, notifications_list)),
        "notifications.forStudent" => Some(handle(state, req, notifications_for_student)),
        "notifications.delete" => Some(handle(state, req, notifications_delete)),
        _ => None,
    }
}
