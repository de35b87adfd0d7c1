//! Structural validation of comment payloads coming from outside the process.
//!
//! Payloads are the camelCase JSON a hosted comment backend returns:
//!
//! ```json
//! [{ "id": "…", "page": "/docs/intro", "contextBefore": "say",
//!    "text": "hello world", "contextAfter": "today", "comment": "typo?",
//!    "type": "TEXT", "y": 412, "resolved": false, "user": "ada",
//!    "createdAt": "1700000000" }]
//! ```
//!
//! `id`, `text` and `comment` are required. Backends disagree on scalar
//! encodings, so `createdAt` may be a number or a numeric string and
//! `resolved` a bool or `"true"`/`"false"`.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{Anchor, Comment, CommentKind};

fn invalid(index: usize, msg: impl std::fmt::Display) -> Error {
    Error::Validation(format!("comment #{index}: {msg}"))
}

fn required_str<'a>(obj: &'a Map<String, Value>, index: usize, key: &str) -> Result<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(invalid(index, format!("`{key}` must be a string"))),
        None => Err(invalid(index, format!("missing `{key}`"))),
    }
}

fn optional_str(obj: &Map<String, Value>, index: usize, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(index, format!("`{key}` must be a string"))),
    }
}

fn decode_one(index: usize, value: &Value) -> Result<Comment> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(index, "not an object"))?;

    let id = required_str(obj, index, "id")?;
    if id.is_empty() {
        return Err(invalid(index, "`id` is empty"));
    }
    let text = required_str(obj, index, "text")?;
    let body = required_str(obj, index, "comment")?;

    let y = match obj.get("y") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| invalid(index, "`y` must be a number"))?,
    };

    let kind = match obj.get("type") {
        None | Some(Value::Null) => CommentKind::Text,
        Some(Value::String(s)) => CommentKind::parse(s)
            .ok_or_else(|| invalid(index, format!("unknown comment type `{s}`")))?,
        Some(_) => return Err(invalid(index, "`type` must be a string")),
    };

    let resolved = match obj.get("resolved") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s
            .parse::<bool>()
            .map_err(|_| invalid(index, format!("`resolved` is not a bool: `{s}`")))?,
        Some(_) => return Err(invalid(index, "`resolved` must be a bool")),
    };

    let created_at = match obj.get("createdAt") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| invalid(index, "`createdAt` out of range"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(index, format!("`createdAt` is not numeric: `{s}`")))?,
        Some(_) => return Err(invalid(index, "`createdAt` must be a number")),
    };

    Ok(Comment::from_parts(
        id.to_owned(),
        optional_str(obj, index, "page")?.unwrap_or_default(),
        Anchor::new(
            text,
            optional_str(obj, index, "contextBefore")?.unwrap_or_default(),
            optional_str(obj, index, "contextAfter")?.unwrap_or_default(),
        ),
        body.to_owned(),
        kind,
        optional_str(obj, index, "src")?,
        y,
        resolved,
        optional_str(obj, index, "user")?.unwrap_or_default(),
        created_at,
    ))
}

/// Decodes and validates a JSON array of comments.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the first offending element.
pub fn decode_comments(json: &str) -> Result<Vec<Comment>> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| Error::Validation(format!("invalid JSON: {e}")))?;
    let items = value
        .as_array()
        .ok_or_else(|| Error::Validation("expected an array of comments".into()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, v)| decode_one(i, v))
        .collect()
}

/// Encodes comments in the same shape [`decode_comments`] accepts.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a comment whose `y` is not finite; JSON
/// has no such number and it would not survive a round trip.
pub fn encode_comments(comments: &[Comment]) -> Result<String> {
    if let Some(c) = comments.iter().find(|c| !c.y.is_finite()) {
        return Err(Error::Validation(format!("comment `{}` has a non-finite `y`", c.id)));
    }
    serde_json::to_string_pretty(comments).map_err(|e| Error::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::text_comment;

    #[test]
    fn accepts_loose_scalar_encodings() {
        let json = r#"[{
            "id": "c1", "page": "/docs/intro", "contextBefore": "say",
            "text": "hello world", "contextAfter": "today", "comment": "typo?",
            "y": 412.5, "resolved": "true", "user": "ada", "createdAt": "1700000000"
        }]"#;
        let comments = decode_comments(json).unwrap();
        let c = &comments[0];
        assert_eq!(c.id, "c1");
        assert_eq!(c.anchor(), &Anchor::new("hello world", "say", "today"));
        assert_eq!(c.kind, CommentKind::Text);
        assert_eq!(c.y, 412.5);
        assert!(c.is_resolved());
        assert_eq!(c.created_at, 1_700_000_000);
    }

    #[test]
    fn required_fields_are_enforced() {
        for missing in ["id", "text", "comment"] {
            let mut obj = serde_json::json!({"id": "c1", "text": "t", "comment": "b"});
            obj.as_object_mut().unwrap().remove(missing);
            let err = decode_comments(&Value::Array(vec![obj]).to_string()).unwrap_err();
            assert!(err.to_string().contains(&format!("`{missing}`")), "{err}");
        }
    }

    #[test]
    fn y_must_be_numeric() {
        let err = decode_comments(r#"[{"id":"c1","text":"t","comment":"b","y":"top"}]"#)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn top_level_must_be_an_array() {
        assert!(decode_comments(r#"{"id":"c1"}"#).is_err());
        assert!(decode_comments("not json").is_err());
        assert!(decode_comments("[]").unwrap().is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = decode_comments(r#"[{"id":"c1","text":"t","comment":"b","type":"VIDEO"}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("VIDEO"));
    }

    #[test]
    fn export_is_importable() {
        let mut resolved = text_comment("c2", "more", "some", "text");
        resolved.mark_resolved();
        let comments = vec![text_comment("c1", "hello world", "say", "today"), resolved];
        let json = encode_comments(&comments).unwrap();
        assert!(json.contains("\"contextBefore\""));
        assert!(json.contains("\"type\": \"TEXT\""));
        assert_eq!(decode_comments(&json).unwrap(), comments);
    }

    #[test]
    fn non_finite_y_is_not_exported() {
        let mut lost = text_comment("c1", "hello world", "say", "today");
        lost.y = f64::NAN;
        let err = encode_comments(&[lost]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("c1"));
    }
}
