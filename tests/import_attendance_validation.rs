
use serde_json::json;
use test_support::{
    request_err, request_ok, seed_student, seed_subject, spawn_sidecar, temp_dir, write_sheet,
};

const SHEET_HEADER: &str = "ID Number,Date,Status,Section,Year,Semester,Subject\n";

fn setup() -> (
    std::process::Child,
    std::process::ChildStdin,
    std::io::BufReader<std::process::ChildStdout>,
    std::path::PathBuf,
    String,
) {
    let workspace = temp_dir("campusd-import-validation");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = seed_student(
        &mut stdin, &mut reader, "s2", "N190001", "CSE-01", "E-1", "sem1",
    );
    seed_subject(&mut stdin, &mut reader, "s3", "C&LA", "CLA101", "E-1", "1");
    (child, stdin, reader, workspace, student_id)
}

fn reason_of(dry: &serde_json::Value, idx: usize) -> String {
    dry["errors"][idx]["reason"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[test]
fn bad_rows_are_skipped_with_reasons_and_row_numbers() {
    let (_child, mut stdin, mut reader, workspace, _student_id) = setup();

    let contents = format!(
        "{}\
         N190001,9999-01-01,present,CSE-01,E-1,sem1,C&LA\n\
         N190001,2025-05-01,maybe,CSE-01,E-1,sem1,C&LA\n\
         N999999,2025-05-01,present,CSE-01,E-1,sem1,C&LA\n\
         N190001,2025-05-01,present,CSE-01,E-1,sem1,Unknown101\n\
         N190001,2025-05-01,present,CSE-01,E-1,3,C&LA\n\
         N190001,not-a-date,present,CSE-01,E-1,sem1,C&LA\n",
        SHEET_HEADER
    );
    let sheet = write_sheet(&workspace, "bad.csv", &contents);
    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy() }),
    );

    // Every row fails yet the preview is still structured.
    assert_eq!(dry.get("status").and_then(|v| v.as_str()), Some("dryrun"));
    assert_eq!(dry.get("skipped").and_then(|v| v.as_i64()), Some(6));
    assert_eq!(dry["errors"].as_array().map(|a| a.len()), Some(6));
    assert_eq!(dry["toCreate"].as_array().map(|a| a.len()), Some(0));

    // First data row is reported as row 2.
    assert_eq!(dry["errors"][0]["row"].as_i64(), Some(2));
    assert_eq!(dry["errors"][5]["row"].as_i64(), Some(7));

    assert!(reason_of(&dry, 0).contains("future date"));
    assert!(reason_of(&dry, 1).contains("Invalid status value 'maybe'"));
    assert_eq!(reason_of(&dry, 2), "Student not found");
    assert!(reason_of(&dry, 3).contains("not found for year E-1 and semester 1"));
    assert!(reason_of(&dry, 4).contains("sem1 or sem2"));
    assert!(reason_of(&dry, 5).contains("Unrecognized date"));
}

#[test]
fn future_date_wins_over_other_bad_fields() {
    let (_child, mut stdin, mut reader, workspace, _student_id) = setup();

    // Unknown student and bad status, but the future date is the reported
    // reason.
    let contents = format!("{}N999999,9999-01-01,maybe,CSE-01,E-1,sem1,C&LA\n", SHEET_HEADER);
    let sheet = write_sheet(&workspace, "future.csv", &contents);
    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(dry.get("skipped").and_then(|v| v.as_i64()), Some(1));
    assert!(reason_of(&dry, 0).contains("future date"));
}

#[test]
fn subject_code_resolves_to_canonical_name() {
    let (_child, mut stdin, mut reader, workspace, student_id) = setup();

    // Reference the subject by its short code; storage uses the name.
    let contents = format!(
        "{}N190001,2025-05-01,present,CSE-01,E-1,sem1,CLA101\n",
        SHEET_HEADER
    );
    let sheet = write_sheet(&workspace, "code.csv", &contents);
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy(), "confirmUpdate": true }),
    );
    assert_eq!(applied.get("created").and_then(|v| v.as_i64()), Some(1));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.studentSummary",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        summary.pointer("/records/0/subject").and_then(|v| v.as_str()),
        Some("C&LA")
    );

    // A later import by display name hits the same composite key.
    let contents = format!(
        "{}N190001,2025-05-01,present,CSE-01,E-1,sem1,C&LA\n",
        SHEET_HEADER
    );
    let sheet = write_sheet(&workspace, "name.csv", &contents);
    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(dry["noChange"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn subject_year_semester_must_match_the_row() {
    let (_child, mut stdin, mut reader, workspace, _student_id) = setup();
    // C&LA exists for (E-1, 1) but not (E-2, 1).
    let contents = format!(
        "{}N190001,2025-05-01,present,CSE-01,E-2,sem1,C&LA\n",
        SHEET_HEADER
    );
    let sheet = write_sheet(&workspace, "wrongyear.csv", &contents);
    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(dry.get("skipped").and_then(|v| v.as_i64()), Some(1));
    assert!(reason_of(&dry, 0).contains("not found for year E-2 and semester 1"));
}

#[test]
fn unreadable_sheet_fails_the_whole_request() {
    let (_child, mut stdin, mut reader, workspace, student_id) = setup();

    let missing = workspace.join("nope.csv");
    let error = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "import.attendance",
        json!({ "path": missing.to_string_lossy(), "confirmUpdate": true }),
    );
    assert_eq!(error["code"].as_str(), Some("parse_failed"));
    assert_eq!(
        error.pointer("/details/path").and_then(|v| v.as_str()),
        Some(missing.to_string_lossy().as_ref())
    );

    // Nothing was written by the failed request.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.studentSummary",
        json!({ "studentId": student_id }),
    );
    assert_eq!(summary.get("total").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn good_and_bad_rows_process_independently() {
    let (_child, mut stdin, mut reader, workspace, student_id) = setup();
    let contents = format!(
        "{}\
         N190001,2025-05-01,present,CSE-01,E-1,sem1,C&LA\n\
         N999999,2025-05-01,present,CSE-01,E-1,sem1,C&LA\n\
         N190001,2025-05-02,absent,CSE-01,E-1,sem1,C&LA\n",
        SHEET_HEADER
    );
    let sheet = write_sheet(&workspace, "mixed.csv", &contents);
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "import.attendance",
        json!({ "path": sheet.to_string_lossy(), "confirmUpdate": "true" }),
    );
    assert_eq!(applied.get("created").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(applied.get("skipped").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(applied["errors"][0]["row"].as_i64(), Some(3));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.studentSummary",
        json!({ "studentId": student_id }),
    );
    assert_eq!(summary.get("total").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(summary.get("presents").and_then(|v| v.as_i64()), Some(1));
}
