//! Tolerant parsing of runtime `--format json` output: falls back from a
//! single `serde_json::from_str` to per-item handling on parse failure.

use serde_json::Value;

/// Parse `text` as either a single JSON array, a single JSON object (wrapped
/// as a one-element array), or JSONL (newline-delimited objects, dropping
/// lines that fail to parse).
pub fn parse_json_or_jsonl(text: &str) -> Vec<Value> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return items;
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return vec![value];
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

/// True iff the record is a runtime-internal builder container.
pub fn is_builder_container(record: &Value) -> bool {
    role_label(record).as_deref() == Some("builder")
}

fn role_label(record: &Value) -> Option<String> {
    let labels = field(record, &["labels", "Labels"])?;
    let labels = labels.as_object()?;
    labels
        .get("com.apple.container.resource.role")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Read a string field tolerant of casing variance, checking the record
/// itself and a nested `configuration` object.
pub fn field<'a>(record: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let obj = record.as_object()?;
    for name in names {
        if let Some(v) = obj.get(*name) {
            return Some(v);
        }
    }
    if let Some(config) = obj.get("configuration").and_then(Value::as_object) {
        for name in names {
            if let Some(v) = config.get(*name) {
                return Some(v);
            }
        }
    }
    None
}

pub fn field_str(record: &Value, names: &[&str]) -> Option<String> {
    field(record, names).and_then(Value::as_str).map(str::to_string)
}

pub fn field_i64(record: &Value, names: &[&str]) -> Option<i64> {
    field(record, names).and_then(Value::as_i64)
}

pub const NAME_FIELDS: &[&str] = &["name", "Name", "Names", "id", "ID"];
pub const STATE_FIELDS: &[&str] = &["state", "State", "status", "Status"];
pub const EXIT_CODE_FIELDS: &[&str] = &["exitCode", "ExitCode"];
pub const STARTED_AT_FIELDS: &[&str] = &["startedAt", "StartedAt", "startedDate"];

/// `Names` (plural, docker-style) may be a JSON array; take the first entry.
pub fn read_name(record: &Value) -> Option<String> {
    if let Some(v) = field(record, NAME_FIELDS) {
        if let Some(s) = v.as_str() {
            return Some(s.trim_start_matches('/').to_string());
        }
        if let Some(arr) = v.as_array() {
            return arr
                .first()
                .and_then(Value::as_str)
                .map(|s| s.trim_start_matches('/').to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_json_array() {
        let items = parse_json_or_jsonl(r#"[{"name":"a"},{"name":"b"}]"#);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn parses_single_object_as_one_element_array() {
        let items = parse_json_or_jsonl(r#"{"name":"a"}"#);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn falls_back_to_jsonl_on_parse_failure() {
        let text = "{\"name\":\"a\"}\n{\"name\":\"b\"}\nnot json\n";
        let items = parse_json_or_jsonl(text);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_vec() {
        assert!(parse_json_or_jsonl("").is_empty());
    }

    #[test]
    fn drops_unparsable_lines() {
        let text = "garbage\n{\"name\":\"a\"}\nmore garbage\n";
        let items = parse_json_or_jsonl(text);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn builder_role_label_is_detected() {
        let record = json!({"name": "x", "labels": {"com.apple.container.resource.role": "builder"}});
        assert!(is_builder_container(&record));
    }

    #[test]
    fn non_builder_label_is_not_detected() {
        let record = json!({"name": "x", "labels": {"com.apple.container.resource.role": "user"}});
        assert!(!is_builder_container(&record));
    }

    #[test]
    fn field_tolerates_casing_variance() {
        let record = json!({"State": "running"});
        assert_eq!(field_str(&record, STATE_FIELDS), Some("running".to_string()));
    }

    #[test]
    fn field_reads_from_nested_configuration() {
        let record = json!({"configuration": {"state": "stopped"}});
        assert_eq!(field_str(&record, STATE_FIELDS), Some("stopped".to_string()));
    }

    #[test]
    fn read_name_handles_names_array_and_strips_leading_slash() {
        let record = json!({"Names": ["/dockgeac_e2e_web_1"]});
        assert_eq!(read_name(&record), Some("dockgeac_e2e_web_1".to_string()));
    }

    #[test]
    fn read_name_handles_plain_name_string() {
        let record = json!({"name": "dockgeac_e2e_web_1"});
        assert_eq!(read_name(&record), Some("dockgeac_e2e_web_1".to_string()));
    }
}
