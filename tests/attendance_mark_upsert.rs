
use serde_json::json;
use test_support::{
    request, request_ok, seed_student, seed_subject, spawn_sidecar, temp_dir, write_sheet,
};

#[test]
fn manual_mark_and_import_share_one_composite_key() {
    let workspace = temp_dir("campusd-mark-upsert");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = seed_student(
        &mut stdin, &mut reader, "2", "N190001", "CSE-01", "E-1", "sem1",
    );
    seed_subject(&mut stdin, &mut reader, "3", "C&LA", "CLA101", "E-1", "1");

    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.mark",
        json!({
            "studentId": student_id,
            "date": "2025-05-01",
            "status": "present",
            "section": "cse-01",
            "year": "e1",
            "semester": "sem1",
            "subject": "C&LA"
        }),
    );
    assert_eq!(
        marked.pointer("/attendance/status").and_then(|v| v.as_str()),
        Some("Present")
    );

    // An import of the same (student, day, subject) sees the manual record.
    let sheet = write_sheet(
        &workspace,
        "a.csv",
        "ID Number,Date,Status,Section,Year,Semester,Subject\n\
         N190001,2025-05-01,present,CSE-01,E-1,sem1,C&LA\n",
    );
    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(dry["noChange"].as_array().map(|a| a.len()), Some(1));

    // Re-marking the same key flips the status in place.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.mark",
        json!({
            "studentId": student_id,
            "date": "2025-05-01",
            "status": "Absent",
            "section": "CSE-01",
            "year": "E-1",
            "semester": "sem1",
            "subject": "C&LA"
        }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.studentSummary",
        json!({ "studentId": student_id }),
    );
    assert_eq!(summary.get("total").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        summary.pointer("/records/0/status").and_then(|v| v.as_str()),
        Some("Absent")
    );
}

#[test]
fn bulk_mark_counts_and_summary_filters() {
    let workspace = temp_dir("campusd-mark-bulk");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let s1 = seed_student(&mut stdin, &mut reader, "2", "N190001", "CSE-01", "E-1", "sem1");
    let s2 = seed_student(&mut stdin, &mut reader, "3", "N190002", "CSE-01", "E-1", "sem1");

    let bulk = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.mark",
        json!({
            "date": "2025-05-01",
            "section": "CSE-01",
            "year": "E-1",
            "semester": "sem1",
            "subject": "C&LA",
            "records": [
                { "studentId": s1, "status": "present" },
                { "studentId": s2, "status": "absent" },
                { "studentId": "no-such-student", "status": "present" }
            ]
        }),
    );
    // Unknown students are quietly dropped from the bulk batch.
    assert_eq!(bulk.get("count").and_then(|v| v.as_i64()), Some(2));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.mark",
        json!({
            "studentId": s1,
            "date": "2025-05-02",
            "status": "present",
            "section": "CSE-01",
            "year": "E-1",
            "semester": "sem2",
            "subject": "C&LA"
        }),
    );

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.studentSummary",
        json!({ "studentId": s1 }),
    );
    assert_eq!(all.get("total").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(all.get("presents").and_then(|v| v.as_i64()), Some(2));

    // Semester filter accepts either wire form.
    let sem1 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.studentSummary",
        json!({ "studentId": s1, "semester": "1" }),
    );
    assert_eq!(sem1.get("total").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        sem1.pointer("/records/0/date").and_then(|v| v.as_str()),
        Some("2025-05-01")
    );

    let day = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.studentSummary",
        json!({ "studentId": s2, "date": "2025-05-01" }),
    );
    assert_eq!(day.get("total").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(day.get("presents").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(day.get("percentage").and_then(|v| v.as_f64()), Some(0.0));
}

#[test]
fn mark_rejects_bad_semester_and_status() {
    let workspace = temp_dir("campusd-mark-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let s1 = seed_student(&mut stdin, &mut reader, "2", "N190001", "CSE-01", "E-1", "sem1");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.mark",
        json!({
            "studentId": s1,
            "date": "2025-05-01",
            "status": "present",
            "section": "CSE-01",
            "year": "E-1",
            "semester": "sem3",
            "subject": "C&LA"
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert!(resp
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .contains("sem1 or sem2"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.mark",
        json!({
            "studentId": s1,
            "date": "2025-05-01",
            "status": "maybe",
            "section": "CSE-01",
            "year": "E-1",
            "semester": "sem1",
            "subject": "C&LA"
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert!(resp
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .contains("Present or Absent"));
}
