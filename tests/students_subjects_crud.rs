
use serde_json::json;
use test_support::{request, request_ok, seed_student, spawn_sidecar, temp_dir};

#[test]
fn student_lifecycle_and_search() {
    let workspace = temp_dir("campusd-students-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let s1 = seed_student(&mut stdin, &mut reader, "2", "N190001", "cse-01", "e1", "sem1");
    let _s2 = seed_student(&mut stdin, &mut reader, "3", "N190002", "CSE-02", "E-2", "sem2");

    // Creation canonicalizes section and year.
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.get",
        json!({ "studentId": s1 }),
    );
    assert_eq!(got.pointer("/student/section").and_then(|v| v.as_str()), Some("CSE-01"));
    assert_eq!(got.pointer("/student/year").and_then(|v| v.as_str()), Some("E-1"));

    // Duplicate id number is rejected.
    let dup = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "email": "other@example.edu",
            "idNumber": "N190001",
            "rollNo": "99",
            "section": "CSE-01",
            "year": "E-1"
        }),
    );
    assert_eq!(dup.pointer("/error/code").and_then(|v| v.as_str()), Some("conflict"));

    // Search matches roll number substrings.
    let found = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "search": "190002" }),
    );
    assert_eq!(found["students"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(
        found.pointer("/students/0/idNumber").and_then(|v| v.as_str()),
        Some("N190002")
    );

    // Partial update keeps unspecified fields.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.update",
        json!({ "studentId": s1, "section": "cse-03", "phone": "1234567890" }),
    );
    assert_eq!(
        updated.pointer("/student/section").and_then(|v| v.as_str()),
        Some("CSE-03")
    );
    assert_eq!(
        updated.pointer("/student/year").and_then(|v| v.as_str()),
        Some("E-1")
    );
    assert_eq!(
        updated.pointer("/student/phone").and_then(|v| v.as_str()),
        Some("1234567890")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.delete",
        json!({ "studentId": s1 }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.get",
        json!({ "studentId": s1 }),
    );
    assert_eq!(gone.pointer("/error/code").and_then(|v| v.as_str()), Some("not_found"));

    let remaining = request_ok(&mut stdin, &mut reader, "10", "students.list", json!({}));
    assert_eq!(remaining["students"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn subjects_store_digit_semester_and_reject_duplicates() {
    let workspace = temp_dir("campusd-subjects-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Semester accepted in either form, stored as the digit.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "C&LA", "code": "CLA101", "year": "e1", "semester": "sem1" }),
    );
    assert_eq!(
        created.pointer("/subject/semester").and_then(|v| v.as_str()),
        Some("1")
    );
    assert_eq!(
        created.pointer("/subject/year").and_then(|v| v.as_str()),
        Some("E-1")
    );

    // Same name, same (year, semester): conflict.
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "C&LA", "code": "OTHER", "year": "E-1", "semester": "1" }),
    );
    assert_eq!(dup.pointer("/error/code").and_then(|v| v.as_str()), Some("conflict"));

    // Same name in a different semester is a separate subject.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "name": "C&LA", "code": "CLA102", "year": "E-1", "semester": "2" }),
    );

    let sem1 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.list",
        json!({ "year": "E-1", "semester": "sem1" }),
    );
    assert_eq!(sem1["subjects"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(
        sem1.pointer("/subjects/0/code").and_then(|v| v.as_str()),
        Some("CLA101")
    );

    let all = request_ok(&mut stdin, &mut reader, "6", "subjects.list", json!({}));
    assert_eq!(all["subjects"].as_array().map(|a| a.len()), Some(2));

    let id = sem1
        .pointer("/subjects/0/id")
        .and_then(|v| v.as_str())
        .expect("subject id")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.delete",
        json!({ "id": id }),
    );
    let all = request_ok(&mut stdin, &mut reader, "8", "subjects.list", json!({}));
    assert_eq!(all["subjects"].as_array().map(|a| a.len()), Some(1));
}
