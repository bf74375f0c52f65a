/// Kind of payload carried by an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Incremental text fragment.
    Token,
    /// Whole message text.
    Message,
    /// Progress chatter such as "started search".
    Status,
}

impl ContentKind {
    /// Parses a kind discriminant, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" => Some(Self::Token),
            "message" => Some(Self::Message),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    /// Returns `true` for kinds whose text belongs in a step buffer.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Token | Self::Message)
    }
}

/// Payload of a single event.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventContent {
    pub kind: ContentKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl EventContent {
    /// Creates content without annotations.
    pub fn new(kind: ContentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            annotations: Vec::new(),
        }
    }

    /// Shorthand for a token fragment.
    pub fn token(text: impl Into<String>) -> Self {
        Self::new(ContentKind::Token, text)
    }

    /// Shorthand for a status line.
    pub fn status(text: impl Into<String>) -> Self {
        Self::new(ContentKind::Status, text)
    }

    /// Attaches annotations.
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// One normalized event from the remote process, one per network line.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamEvent {
    /// Stable id of the logical step this event belongs to.
    pub source_id: String,
    /// Tool or channel identifier.
    pub source_name: String,
    pub content: Option<EventContent>,
    /// Last event of this step's current block.
    #[serde(default)]
    pub is_final: bool,
    /// Text belongs to the step's reasoning (`thought`) rather than its output.
    #[serde(default)]
    pub reasoning: bool,
}

impl StreamEvent {
    /// Creates an event with no content.
    pub fn new(source_id: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            content: None,
            is_final: false,
            reasoning: false,
        }
    }

    /// Sets the content.
    pub fn with_content(mut self, content: EventContent) -> Self {
        self.content = Some(content);
        self
    }

    /// Marks the event as reasoning-channel content.
    pub fn reasoning(mut self) -> Self {
        self.reasoning = true;
        self
    }

    /// Returns `true` when the event comes from a main-response channel.
    pub fn is_main_response(&self) -> bool {
        crate::model::is_main_response(&self.source_name)
    }
}

/// Structured metadata attached to event text.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    Url(UrlSource),
    File(FileRef),
    Reference { ref_id: String },
}

/// A web source discovered by a step.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UrlSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl UrlSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// A file produced or read by a step.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRef {
    pub file_id: String,
    pub file_path: String,
    pub file_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_parse_ignores_case() {
        assert_eq!(ContentKind::parse("TOKEN"), Some(ContentKind::Token));
        assert_eq!(ContentKind::parse(" status "), Some(ContentKind::Status));
        assert_eq!(ContentKind::parse("delta"), None);
        assert!(!ContentKind::Status.is_text());
    }

    #[test]
    fn annotation_serializes_with_type_tag() {
        let json = serde_json::to_value(Annotation::Reference {
            ref_id: "mem-1".into(),
        })
        .expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "reference", "ref_id": "mem-1"}));
    }
}
