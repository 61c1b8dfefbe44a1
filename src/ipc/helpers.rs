use crate::ipc::error::err;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Clients send confirmation flags in whatever shape their form layer
/// produced: true, "true", 1 or "1" all count as confirmed.
pub fn get_flag(params: &serde_json::Value, key: &str) -> bool {
    match params.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            t.eq_ignore_ascii_case("true") || t == "1"
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flag_accepts_boolean_like_shapes() {
        assert!(get_flag(&json!({ "confirmUpdate": true }), "confirmUpdate"));
        assert!(get_flag(&json!({ "confirmUpdate": "true" }), "confirmUpdate"));
        assert!(get_flag(&json!({ "confirmUpdate": 1 }), "confirmUpdate"));
        assert!(get_flag(&json!({ "confirmUpdate": "1" }), "confirmUpdate"));
        assert!(!get_flag(&json!({ "confirmUpdate": false }), "confirmUpdate"));
        assert!(!get_flag(&json!({ "confirmUpdate": "no" }), "confirmUpdate"));
        assert!(!get_flag(&json!({}), "confirmUpdate"));
    }
}
