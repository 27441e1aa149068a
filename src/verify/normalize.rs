//! Defensive decoding of classifier output into a typed [`Verdict`].
//!
//! Field-by-field: nothing in the classifier's JSON is trusted to have the
//! right type. Numbers are coerced then clamped, booleans coerced, reasons
//! stringified and bounded.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};

use super::{VerificationError, Verdict};

pub const MAX_REASONS: usize = 10;
pub const REASON_MAX_CHARS: usize = 200;
pub const SNIPPET_MAX_CHARS: usize = 200;

const INCIDENT_KEYS: &[&str] = &["isIncident", "isFire"];
const INCIDENT_CONF_KEYS: &[&str] = &["incidentConfidence", "fireConfidence"];
const SYNTHETIC_KEYS: &[&str] = &["suspectedSynthetic", "suspectedAIGenerated"];
const SYNTHETIC_CONF_KEYS: &[&str] = &["syntheticConfidence", "aiGenConfidence"];

/// Parse raw classifier content (the assistant message text) into a verdict.
pub fn parse_verdict(raw: &str, model_id: &str) -> Result<Verdict, VerificationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VerificationError::format(
            "classifier returned empty content",
            raw,
        ));
    }
    let obj = decode_object(trimmed)
        .ok_or_else(|| VerificationError::format("classifier output is not a JSON object", raw))?;
    Ok(normalize_object(&obj, model_id))
}

/// Strict parse first; then the outermost `{...}` span, which covers code
/// fences and chatty prefixes.
fn decode_object(s: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(m)) = serde_json::from_str::<Value>(s) {
        return Some(m);
    }
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&s[start..=end]) {
        Ok(Value::Object(m)) => Some(m),
        _ => None,
    }
}

pub fn normalize_object(obj: &Map<String, Value>, model_id: &str) -> Verdict {
    Verdict {
        is_incident: coerce_bool(field(obj, INCIDENT_KEYS)),
        incident_confidence: coerce_confidence(field(obj, INCIDENT_CONF_KEYS)),
        suspected_synthetic: coerce_synthetic_flag(field(obj, SYNTHETIC_KEYS)),
        synthetic_confidence: coerce_confidence(field(obj, SYNTHETIC_CONF_KEYS)),
        reasons: coerce_reasons(obj.get("reasons")),
        model_id: model_id.to_string(),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Anything that isn't a number or numeric string becomes 0.
pub fn coerce_confidence(v: Option<&Value>) -> f64 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    clamp01(n)
}

pub fn coerce_bool(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|x| x != 0.0 && !x.is_nan()),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        _ => false,
    }
}

/// Leans toward the veto: only an explicit negative clears the synthetic flag.
/// Hedged strings ("likely", "uncertain"), objects and arrays count as flagged.
pub fn coerce_synthetic_flag(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "no" | "0"
        ),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        other => coerce_bool(other),
    }
}

pub fn coerce_reasons(v: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .take(MAX_REASONS)
        .map(|item| match item {
            Value::String(s) => clean_reason(s),
            other => clean_reason(&other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Collapse whitespace to single spaces and cap length.
pub fn clean_reason(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    let collapsed = re_ws.replace_all(s.trim(), " ");
    collapsed.chars().take(REASON_MAX_CHARS).collect()
}

/// Diagnostics excerpt of raw upstream output.
pub fn snippet(raw: &str) -> String {
    raw.chars().take(SNIPPET_MAX_CHARS).collect()
}
