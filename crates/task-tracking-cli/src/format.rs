//! Output formatting (`spec.md` §6: single-line JSON stdout) and the core
//! `Error` -> process exit-code mapping (§7).

use serde::Serialize;
use task_tracking_core::Error;

pub fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).expect("value always serializes")
    );
}

pub fn print_error(err: &Error) {
    let payload = serde_json::json!({
        "error": err.kind().code(),
        "message": err.message(),
        "details": err.details(),
    });
    println!(
        "{}",
        serde_json::to_string(&payload).expect("payload always serializes")
    );
}

/// Applies `show`'s body-truncation policy (line cap, then char cap) over a
/// task's raw body text, mirroring
/// `examples/original_source/scripts/service.py::show_task`.
pub fn truncate_body(
    text: &str,
    max_chars: Option<usize>,
    max_lines: Option<usize>,
) -> serde_json::Value {
    let mut text = text.to_string();
    let mut truncated = false;

    if let Some(max_lines) = max_lines {
        let mut lines: Vec<&str> = text.split_inclusive('\n').collect();
        if lines.len() > max_lines {
            lines.truncate(max_lines);
            text = lines.concat();
            truncated = true;
        }
    }
    if let Some(max_chars) = max_chars {
        if text.chars().count() > max_chars {
            text = text.chars().take(max_chars).collect();
            truncated = true;
        }
    }

    let mut body = serde_json::json!({ "text": text, "truncated": truncated });
    let obj = body.as_object_mut().expect("constructed as an object");
    if let Some(max_chars) = max_chars {
        obj.insert("max_body_chars".to_string(), serde_json::json!(max_chars));
    }
    if let Some(max_lines) = max_lines {
        obj.insert("max_body_lines".to_string(), serde_json::json!(max_lines));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_lines_then_chars() {
        let body = truncate_body("a\nb\nc\n", None, Some(2));
        assert_eq!(body["text"], "a\nb\n");
        assert_eq!(body["truncated"], true);
    }

    #[test]
    fn passes_through_untruncated_when_within_limits() {
        let body = truncate_body("hello", Some(10), Some(10));
        assert_eq!(body["text"], "hello");
        assert_eq!(body["truncated"], false);
    }

    #[test]
    fn truncates_by_chars() {
        let body = truncate_body("hello world", Some(5), None);
        assert_eq!(body["text"], "hello");
        assert_eq!(body["truncated"], true);
    }
}
