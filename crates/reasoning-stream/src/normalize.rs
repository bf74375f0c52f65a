//! Maps raw event records onto [`StreamEvent`].
//!
//! Records arrive with camelCase keys already normalized upstream. Mapping is
//! total: a record missing required fields still yields an event (with empty
//! identifiers) so one bad line cannot stall the whole reconstruction.

use serde_json::Value;

use crate::event::{Annotation, ContentKind, EventContent, FileRef, StreamEvent, UrlSource};

/// Normalizes one raw record.
pub fn normalize(raw: &Value) -> StreamEvent {
    StreamEvent {
        source_id: str_field(raw, "sourceId").unwrap_or_default().to_string(),
        source_name: str_field(raw, "sourceName")
            .unwrap_or_default()
            .to_string(),
        content: raw.get("content").and_then(normalize_content),
        is_final: bool_field(raw, "isFinal"),
        reasoning: bool_field(raw, "reasoning"),
    }
}

fn normalize_content(value: &Value) -> Option<EventContent> {
    let kind = str_field(value, "kind").and_then(ContentKind::parse)?;
    let text = str_field(value, "text").unwrap_or_default().to_string();
    let annotations = value
        .get("annotations")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(normalize_annotation).collect())
        .unwrap_or_default();
    Some(EventContent {
        kind,
        text,
        annotations,
    })
}

/// Maps one raw annotation, or `None` when its shape is not recognized.
pub fn normalize_annotation(value: &Value) -> Option<Annotation> {
    let tag = str_field(value, "type")?.to_ascii_lowercase();
    match tag.as_str() {
        "url" => {
            let url = required(value, "url")?;
            Some(Annotation::Url(UrlSource {
                url,
                title: optional(value, "title"),
                content: optional(value, "content"),
                favicon: optional(value, "favicon"),
                cover_image: optional(value, "coverImage"),
                source_domain: optional(value, "sourceDomain"),
                published_at: optional(value, "publishedAt"),
                tags: value
                    .get("tags")
                    .and_then(|v| v.as_array())
                    .map(|tags| {
                        tags.iter()
                            .filter_map(|t| t.as_str())
                            .map(ToOwned::to_owned)
                            .collect()
                    })
                    .unwrap_or_default(),
            }))
        }
        "file" => Some(Annotation::File(FileRef {
            file_id: required(value, "fileId")?,
            file_path: required(value, "filePath")?,
            file_type: required(value, "fileType")?,
        })),
        "reference" => Some(Annotation::Reference {
            ref_id: required(value, "refId")?,
        }),
        _ => None,
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn required(value: &Value, key: &str) -> Option<String> {
    str_field(value, key)
        .filter(|s| !s.trim().is_empty())
        .map(ToOwned::to_owned)
}

fn optional(value: &Value, key: &str) -> Option<String> {
    str_field(value, key).map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_complete_record() {
        let event = normalize(&json!({
            "sourceId": "t1",
            "sourceName": "web_search",
            "isFinal": true,
            "content": {
                "kind": "token",
                "text": "searching",
                "annotations": [
                    {"type": "url", "url": "https://example.com", "title": "Example", "tags": ["a", 3, "b"]}
                ]
            }
        }));
        assert_eq!(event.source_id, "t1");
        assert_eq!(event.source_name, "web_search");
        assert!(event.is_final);
        assert!(!event.reasoning);
        let content = event.content.expect("content");
        assert_eq!(content.kind, ContentKind::Token);
        assert_eq!(content.text, "searching");
        let Annotation::Url(source) = &content.annotations[0] else {
            panic!("expected url annotation");
        };
        assert_eq!(source.title.as_deref(), Some("Example"));
        assert_eq!(source.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_identifiers_become_empty_strings() {
        let event = normalize(&json!({"sourceId": 42, "content": {"kind": "status"}}));
        assert_eq!(event.source_id, "");
        assert_eq!(event.source_name, "");
        let content = event.content.expect("content");
        assert_eq!(content.kind, ContentKind::Status);
        assert_eq!(content.text, "");
    }

    #[test]
    fn non_object_record_still_normalizes() {
        let event = normalize(&json!("garbage"));
        assert_eq!(event.source_id, "");
        assert!(event.content.is_none());
        assert!(!event.is_final);
    }

    #[test]
    fn unknown_content_kind_drops_content() {
        let event = normalize(&json!({
            "sourceId": "a",
            "sourceName": "llm_response",
            "content": {"kind": "heartbeat", "text": "x"}
        }));
        assert!(event.content.is_none());
    }

    #[test]
    fn incomplete_annotations_are_dropped_individually() {
        let event = normalize(&json!({
            "sourceId": "c1",
            "sourceName": "code_interpreter",
            "content": {
                "kind": "message",
                "text": "plot ready",
                "annotations": [
                    {"type": "file", "fileId": "f1", "filePath": "/tmp/plot.png"},
                    {"type": "file", "fileId": "f2", "filePath": "/tmp/a.csv", "fileType": "csv"},
                    {"type": "reference", "refId": ""},
                    {"type": "REFERENCE", "refId": "r9"},
                    {"type": "video", "src": "x"},
                    "not an object"
                ]
            }
        }));
        let annotations = event.content.expect("content").annotations;
        assert_eq!(
            annotations,
            vec![
                Annotation::File(FileRef {
                    file_id: "f2".into(),
                    file_path: "/tmp/a.csv".into(),
                    file_type: "csv".into(),
                }),
                Annotation::Reference {
                    ref_id: "r9".into()
                },
            ]
        );
    }

    #[test]
    fn reasoning_flag_is_read() {
        let event = normalize(&json!({
            "sourceId": "a",
            "sourceName": "llm_response",
            "reasoning": true,
            "content": {"kind": "token", "text": "hmm"}
        }));
        assert!(event.reasoning);
    }
}
