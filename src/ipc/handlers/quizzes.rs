use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_section, normalize_semester, normalize_year};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct QuizRow {
    id: String,
    title: String,
    subject: String,
    section: String,
    year: String,
    semester: String,
    questions: serde_json::Value,
    deadline: Option<String>,
    is_active: bool,
}

impl QuizRow {
    fn from_row(r: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        let questions_raw: String = r.get(6)?;
        Ok(QuizRow {
            id: r.get(0)?,
            title: r.get(1)?,
            subject: r.get(2)?,
            section: r.get(3)?,
            year: r.get(4)?,
            semester: r.get(5)?,
            questions: serde_json::from_str(&questions_raw)
                .unwrap_or(serde_json::Value::Array(vec![])),
            deadline: r.get(7)?,
            is_active: r.get::<_, i64>(8)? != 0,
        })
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "title": self.title,
            "subject": self.subject,
            "section": self.section,
            "year": self.year,
            "semester": self.semester,
            "questions": self.questions,
            "deadline": self.deadline,
            "isActive": self.is_active
        })
    }
}

const QUIZ_COLS: &str =
    "id, title, subject, section, year, semester, questions, deadline, is_active";

fn load_quiz(conn: &Connection, quiz_id: &str) -> Result<Option<QuizRow>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM quizzes WHERE id = ?", QUIZ_COLS),
        [quiz_id],
        |r| QuizRow::from_row(r),
    )
    .optional()
}

fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Date-only deadlines expire at the end of that day.
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d
            .and_hms_opt(23, 59, 59)
            .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc));
    }
    None
}

/// Validate the questions payload and stamp each question with an id so
/// attempts can reference them stably.
fn prepare_questions(raw: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("questions must be an array"));
    };
    if items.is_empty() {
        return Err(HandlerErr::bad_params("questions must not be empty"));
    }
    let mut out = Vec::with_capacity(items.len());
    for q in items {
        let text = q
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if text.is_empty() {
            return Err(HandlerErr::bad_params("questions[].text is required"));
        }
        let Some(options) = q.get("options").and_then(|v| v.as_array()) else {
            return Err(HandlerErr::bad_params("questions[].options is required"));
        };
        let Some(correct) = q.get("correctOption").and_then(|v| v.as_i64()) else {
            return Err(HandlerErr::bad_params("questions[].correctOption is required"));
        };
        if correct < 0 || correct as usize >= options.len() {
            return Err(HandlerErr::bad_params(
                "questions[].correctOption is out of range",
            ));
        }
        let marks = q.get("marks").and_then(|v| v.as_f64()).unwrap_or(1.0);
        let id = q
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        out.push(json!({
            "id": id,
            "text": text,
            "options": options,
            "correctOption": correct,
            "marks": marks
        }));
    }
    Ok(serde_json::Value::Array(out))
}

fn quizzes_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let title = get_required_str(params, "title")?;
    let subject = get_required_str(params, "subject")?;
    let section = normalize_section(&get_required_str(params, "section")?);
    let year = normalize_year(&get_required_str(params, "year")?);
    let semester = normalize_semester(&get_required_str(params, "semester")?)
        .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?;
    let questions = prepare_questions(
        params
            .get("questions")
            .unwrap_or(&serde_json::Value::Null),
    )?;
    let deadline = get_opt_str(params, "deadline");

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO quizzes(id, title, subject, section, year, semester, questions, deadline, is_active)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1)",
        (
            &id,
            &title,
            &subject,
            &section,
            &year,
            semester.as_sem_str(),
            questions.to_string(),
            &deadline,
        ),
    )?;
    let quiz = load_quiz(conn, &id)?
        .ok_or_else(|| HandlerErr::not_found("quiz not found after insert"))?;
    Ok(json!({ "message": "Quiz created", "quiz": quiz.to_json() }))
}

fn quizzes_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let existing = load_quiz(conn, &id)?.ok_or_else(|| HandlerErr::not_found("quiz not found"))?;

    let title = get_opt_str(params, "title").unwrap_or(existing.title);
    let subject = get_opt_str(params, "subject").unwrap_or(existing.subject);
    let section = get_opt_str(params, "section")
        .map(|s| normalize_section(&s))
        .unwrap_or(existing.section);
    let year = get_opt_str(params, "year")
        .map(|s| normalize_year(&s))
        .unwrap_or(existing.year);
    let semester = match get_opt_str(params, "semester") {
        Some(raw) => normalize_semester(&raw)
            .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?
            .as_sem_str()
            .to_string(),
        None => existing.semester,
    };
    let questions = match params.get("questions") {
        Some(q) if !q.is_null() => prepare_questions(q)?,
        _ => existing.questions,
    };
    let deadline = get_opt_str(params, "deadline").or(existing.deadline);
    let is_active = params
        .get("isActive")
        .and_then(|v| v.as_bool())
        .unwrap_or(existing.is_active);

    conn.execute(
        "UPDATE quizzes
         SET title = ?, subject = ?, section = ?, year = ?, semester = ?,
             questions = ?, deadline = ?, is_active = ?
         WHERE id = ?",
        (
            &title,
            &subject,
            &section,
            &year,
            &semester,
            questions.to_string(),
            &deadline,
            is_active as i64,
            &id,
        ),
    )?;
    let quiz =
        load_quiz(conn, &id)?.ok_or_else(|| HandlerErr::not_found("quiz not found"))?;
    Ok(json!({ "message": "Quiz updated", "quiz": quiz.to_json() }))
}

fn quizzes_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM quiz_attempts WHERE quiz_id = ?", [&id])?;
    let n = tx.execute("DELETE FROM quizzes WHERE id = ?", [&id])?;
    tx.commit()?;
    if n == 0 {
        return Err(HandlerErr::not_found("quiz not found"));
    }
    Ok(json!({ "message": "Quiz deleted" }))
}

fn quizzes_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut sql = format!("SELECT {} FROM quizzes WHERE 1=1", QUIZ_COLS);
    let mut args: Vec<String> = Vec::new();
    if let Some(section) = get_opt_str(params, "section") {
        sql.push_str(" AND section = ?");
        args.push(normalize_section(&section));
    }
    if let Some(year) = get_opt_str(params, "year") {
        sql.push_str(" AND year = ?");
        args.push(normalize_year(&year));
    }
    if let Some(sem_raw) = get_opt_str(params, "semester") {
        let sem = normalize_semester(&sem_raw)
            .ok_or_else(|| HandlerErr::bad_params("Semester must be sem1 or sem2"))?;
        sql.push_str(" AND semester = ?");
        args.push(sem.as_sem_str().to_string());
    }
    if let Some(subject) = get_opt_str(params, "subject") {
        sql.push_str(" AND subject = ?");
        args.push(subject);
    }
    if let Some(active) = params.get("isActive").and_then(|v| v.as_bool()) {
        sql.push_str(" AND is_active = ?");
        args.push(if active { "1".into() } else { "0".into() });
    }
    sql.push_str(" ORDER BY title");

    let mut stmt = conn.prepare(&sql)?;
    let quizzes = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            QuizRow::from_row(r)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "quizzes": quizzes.iter().map(|q| q.to_json()).collect::<Vec<_>>() }))
}

struct StudentCohort {
    section: String,
    year: String,
    semester: String,
}

fn load_cohort(conn: &Connection, student_id: &str) -> Result<StudentCohort, HandlerErr> {
    conn.query_row(
        "SELECT section, year, semester FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(StudentCohort {
                section: r.get(0)?,
                year: r.get(1)?,
                semester: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("Student profile not found"))
}

/// Active quizzes for the student's cohort. Stored values predate the
/// canonical forms in old workspaces, so everything is normalized before
/// filtering.
fn quizzes_available_for(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let cohort = load_cohort(conn, &student_id)?;
    let semester = normalize_semester(&cohort.semester)
        .map(|s| s.as_sem_str().to_string())
        .unwrap_or(cohort.semester);

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM quizzes
         WHERE section = ? AND year = ? AND semester = ? AND is_active = 1
         ORDER BY title",
        QUIZ_COLS
    ))?;
    let quizzes = stmt
        .query_map(
            (
                normalize_section(&cohort.section),
                normalize_year(&cohort.year),
                semester,
            ),
            |r| QuizRow::from_row(r),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "quizzes": quizzes.iter().map(|q| q.to_json()).collect::<Vec<_>>() }))
}

/// All cohort quizzes with a per-student status:
/// Attempted > Missed (deadline passed) > Available.
fn quizzes_with_status(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let cohort = load_cohort(conn, &student_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM quizzes WHERE section = ? AND year = ? ORDER BY title",
        QUIZ_COLS
    ))?;
    let quizzes = stmt
        .query_map(
            (normalize_section(&cohort.section), normalize_year(&cohort.year)),
            |r| QuizRow::from_row(r),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let now = Utc::now();
    let mut out = Vec::with_capacity(quizzes.len());
    for quiz in &quizzes {
        let attempt: Option<(f64, String)> = conn
            .query_row(
                "SELECT score, submitted_at FROM quiz_attempts
                 WHERE quiz_id = ? AND student_id = ?",
                (&quiz.id, &student_id),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let status = if attempt.is_some() {
            "Attempted"
        } else if quiz
            .deadline
            .as_deref()
            .and_then(parse_deadline)
            .map(|d| d < now)
            .unwrap_or(false)
        {
            "Missed"
        } else {
            "Available"
        };
        let mut q = quiz.to_json();
        q["status"] = json!(status);
        q["attempt"] = match attempt {
            Some((score, submitted_at)) => json!({
                "score": score,
                "submittedAt": submitted_at
            }),
            None => serde_json::Value::Null,
        };
        out.push(q);
    }
    Ok(json!({ "quizzes": out }))
}

fn quizzes_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let quiz_id = get_required_str(params, "quizId")?;
    let student_id = get_required_str(params, "studentId")?;
    let answers = params
        .get("answers")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let quiz =
        load_quiz(conn, &quiz_id)?.ok_or_else(|| HandlerErr::not_found("Quiz not found"))?;

    let already: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM quiz_attempts WHERE quiz_id = ? AND student_id = ?",
            (&quiz_id, &student_id),
            |r| r.get(0),
        )
        .optional()?;
    if already.is_some() {
        return Err(HandlerErr {
            code: "already_attempted",
            message: "You have already submitted this quiz.".to_string(),
            details: None,
        });
    }

    let empty = vec![];
    let questions = quiz.questions.as_array().unwrap_or(&empty);
    let mut score = 0.0;
    let mut correct_count = 0usize;
    let mut incorrect_count = 0usize;
    let mut total_marks = 0.0;
    for q in questions {
        let q_id = q.get("id").and_then(|v| v.as_str()).unwrap_or("");
        let q_marks = q.get("marks").and_then(|v| v.as_f64()).unwrap_or(1.0);
        let correct = q.get("correctOption").and_then(|v| v.as_i64());
        total_marks += q_marks;
        let ans = answers
            .iter()
            .find(|a| a.get("questionId").and_then(|v| v.as_str()) == Some(q_id));
        match ans.and_then(|a| a.get("selectedOption").and_then(|v| v.as_i64())) {
            Some(selected) if Some(selected) == correct => {
                score += q_marks;
                correct_count += 1;
            }
            Some(_) => incorrect_count += 1,
            None => {}
        }
    }

    let attempt_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO quiz_attempts(id, quiz_id, student_id, answers, score, evaluated, submitted_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        (
            &attempt_id,
            &quiz_id,
            &student_id,
            serde_json::Value::Array(answers).to_string(),
            score,
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(json!({
        "message": "Quiz submitted",
        "score": score,
        "totalMarks": total_marks,
        "correctCount": correct_count,
        "incorrectCount": incorrect_count,
        "attemptId": attempt_id
    }))
}

fn quizzes_review(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let quiz_id = get_required_str(params, "quizId")?;
    let student_id = get_required_str(params, "studentId")?;
    let quiz =
        load_quiz(conn, &quiz_id)?.ok_or_else(|| HandlerErr::not_found("Not found"))?;
    let attempt: Option<(String, f64)> = conn
        .query_row(
            "SELECT answers, score FROM quiz_attempts WHERE quiz_id = ? AND student_id = ?",
            (&quiz_id, &student_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((answers_raw, score)) = attempt else {
        return Err(HandlerErr::not_found("Not found"));
    };
    let answers: Vec<serde_json::Value> = serde_json::from_str(&answers_raw).unwrap_or_default();

    let empty = vec![];
    let questions = quiz.questions.as_array().unwrap_or(&empty);
    let mut total_marks = 0.0;
    let mut correct_count = 0usize;
    let mut incorrect_count = 0usize;
    let reviewed: Vec<serde_json::Value> = questions
        .iter()
        .map(|q| {
            let q_id = q.get("id").and_then(|v| v.as_str()).unwrap_or("");
            total_marks += q.get("marks").and_then(|v| v.as_f64()).unwrap_or(1.0);
            let submitted = answers
                .iter()
                .find(|a| a.get("questionId").and_then(|v| v.as_str()) == Some(q_id))
                .and_then(|a| a.get("selectedOption").and_then(|v| v.as_i64()));
            let is_correct =
                submitted.is_some() && submitted == q.get("correctOption").and_then(|v| v.as_i64());
            if is_correct {
                correct_count += 1;
            } else if submitted.is_some() {
                incorrect_count += 1;
            }
            let mut out = q.clone();
            out["submittedOption"] = match submitted {
                Some(v) => json!(v),
                None => serde_json::Value::Null,
            };
            out["isCorrect"] = json!(is_correct);
            out
        })
        .collect();

    Ok(json!({
        "quizId": quiz.id,
        "title": quiz.title,
        "questions": reviewed,
        "score": score,
        "totalMarks": total_marks,
        "correctCount": correct_count,
        "incorrectCount": incorrect_count
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
        "quizzes.create" => Some(handle(state, req, quizzes_create)),
        "quizzes.update" => Some(handle(state, req, quizzes_update)),
        "quizzes.delete" => Some(handle(state, req, quizzes_delete)),
        "quizzes.list" => Some(handle(state, req, quizzes_list)),
        "quizzes.availableFor" => Some(handle(state, req, quizzes_available_for)),
        "quizzes.withStatus" => Some(handle(state, req, quizzes_with_status)),
        "quizzes.submit" => Some(handle(state, req, quizzes_submit)),
        "quizzes.review" => Some(handle(state, req, quizzes_review)),
        _ => None,
    }
}
