use std::collections::HashMap;
use std::path::Path;

/// One data row from an uploaded sheet. `number` is the 1-based sheet row
/// including the header, so the first data row reports as row 2 in
/// diagnostics.
pub struct SheetRow {
    pub number: usize,
    fields: HashMap<String, String>,
}

impl SheetRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(&header_key(column)).map(|s| s.as_str())
    }
}

/// Header matching ignores case and internal spacing so "ID Number",
/// "id number" and "IdNumber" all address the same column.
fn header_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn read_sheet(path: &Path) -> anyhow::Result<Vec<SheetRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(header_key).collect();

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let mut fields = HashMap::new();
        for (j, key) in headers.iter().enumerate() {
            if key.is_empty() {
                continue;
            }
            if let Some(v) = rec.get(j) {
                let t = v.trim();
                if !t.is_empty() {
                    fields.insert(key.clone(), t.to_string());
                }
            }
        }
        rows.push(SheetRow {
            number: i + 2,
            fields,
        });
    }
    Ok(rows)
}

/// Remove the spool file after an import. The sheet is a scoped upload;
/// failing to delete it must not fail the request.
pub fn discard_sheet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("could not remove sheet {}: {}", path.display(), e);
    }
}
