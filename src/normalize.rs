use chrono::{DateTime, Duration, NaiveDate};

/// Attendance status. Stored capitalized ("Present"/"Absent") to match the
/// historical records this replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "Present",
            Status::Absent => "Absent",
        }
    }
}

/// Semester has two wire forms that must never be mixed in a filter:
/// attendance and marks store the "sem1"/"sem2" form, subjects store the
/// bare digit form ("1"/"2").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semester {
    Sem1,
    Sem2,
}

impl Semester {
    pub fn as_sem_str(&self) -> &'static str {
        match self {
            Semester::Sem1 => "sem1",
            Semester::Sem2 => "sem2",
        }
    }

    pub fn as_digit_str(&self) -> &'static str {
        match self {
            Semester::Sem1 => "1",
            Semester::Sem2 => "2",
        }
    }
}

/// Parse a date-like sheet field down to its calendar day (midnight UTC).
/// Accepts ISO dates, RFC3339 datetimes, slash-separated forms, and
/// spreadsheet serial day numbers.
pub fn normalize_date(input: &str) -> Option<NaiveDate> {
    let t = input.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.naive_utc().date());
    }
    for fmt in ["%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    // Sheets sometimes hand over the raw serial day count (days since
    // 1899-12-30, the spreadsheet epoch). Serials for any date this system
    // cares about are five digits (20000 is 1954, 80000 is 2119); anything
    // outside that window is more likely a stray number, such as a bare
    // year, and is rejected rather than misfiled.
    if let Ok(serial) = t.parse::<f64>() {
        if (20_000.0..80_000.0).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return epoch.checked_add_signed(Duration::days(serial.trunc() as i64));
        }
    }
    None
}

pub fn normalize_status(input: &str) -> Option<Status> {
    match input.trim().to_ascii_lowercase().as_str() {
        "present" => Some(Status::Present),
        "absent" => Some(Status::Absent),
        _ => None,
    }
}

pub fn normalize_section(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Canonical year form is "E-1".."E-4". Historical data carries both "E1"
/// and "E-1"; every boundary runs through here so only the hyphenated form
/// ever reaches a filter or a stored row.
pub fn normalize_year(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let up = stripped.to_ascii_uppercase();
    let b = up.as_bytes();
    if b.len() == 2 && b[0] == b'E' && b[1].is_ascii_digit() {
        return format!("E-{}", &up[1..]);
    }
    up
}

pub fn normalize_semester(input: &str) -> Option<Semester> {
    match input.trim().to_ascii_lowercase().as_str() {
        "sem1" | "1" => Some(Semester::Sem1),
        "sem2" | "2" => Some(Semester::Sem2),
        _ => None,
    }
}

pub fn normalize_subject_name(input: &str) -> String {
    input.trim().to_string()
}
