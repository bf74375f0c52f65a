use crate::event::{Annotation, FileRef, UrlSource};
use crate::model::{self, StepState};

/// Typed output of a step, selected by its tool name.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    WebSearch {
        results: Vec<UrlSource>,
    },
    MemorySearch {
        references: Vec<String>,
    },
    CodeInterpreter {
        answer: String,
        code: String,
        files: Vec<FileRef>,
    },
    /// Fallback for the main response and any unknown tool.
    Text {
        text: String,
    },
}

impl ToolOutput {
    /// Builds the output for `name` from accumulated text and annotations.
    ///
    /// Annotations of a variant the tool does not expect are skipped.
    pub fn build<'a>(
        name: &str,
        output: &str,
        annotations: impl IntoIterator<Item = &'a Annotation>,
    ) -> Self {
        match name {
            model::WEB_SEARCH => ToolOutput::WebSearch {
                results: annotations
                    .into_iter()
                    .filter_map(|a| match a {
                        Annotation::Url(source) => Some(source.clone()),
                        _ => None,
                    })
                    .collect(),
            },
            model::MEMORY_SEARCH => ToolOutput::MemorySearch {
                references: annotations
                    .into_iter()
                    .filter_map(|a| match a {
                        Annotation::Reference { ref_id } => Some(ref_id.clone()),
                        _ => None,
                    })
                    .collect(),
            },
            model::CODE_INTERPRETER => {
                let (answer, code) = split_fenced_code(output);
                ToolOutput::CodeInterpreter {
                    answer,
                    code,
                    files: annotations
                        .into_iter()
                        .filter_map(|a| match a {
                            Annotation::File(file) => Some(file.clone()),
                            _ => None,
                        })
                        .collect(),
                }
            }
            _ => ToolOutput::Text {
                text: output.to_string(),
            },
        }
    }

    /// Returns the plain text of a `Text` output.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolOutput::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Splits ``` fenced blocks out of `text`, returning `(prose, code)`.
///
/// An unterminated fence counts as code, which is what a half-streamed block
/// looks like. A language tag on the opening fence line is dropped.
fn split_fenced_code(text: &str) -> (String, String) {
    let mut prose = Vec::new();
    let mut code = Vec::new();
    for (idx, segment) in text.split("```").enumerate() {
        if idx % 2 == 0 {
            let trimmed = segment.trim();
            if !trimmed.is_empty() {
                prose.push(trimmed);
            }
            continue;
        }
        let body = match segment.split_once('\n') {
            Some((tag, rest)) if is_language_tag(tag.trim()) => rest,
            _ => segment,
        };
        let body = body.trim_matches('\n').trim_end();
        if !body.is_empty() {
            code.push(body);
        }
    }
    (prose.join("\n"), code.join("\n\n"))
}

/// Matches fence info strings such as `python`, `c++` or `objective-c`.
fn is_language_tag(line: &str) -> bool {
    line.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '#' | '.'))
}

/// One reasoning step as seen by consumers.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReasoningStep {
    /// Unique within one response. Main-response steps carry their block
    /// index (`"a1#2"`).
    pub id: String,
    /// Raw `source_id` of the events that built this step.
    pub source_id: String,
    pub name: String,
    pub thought: String,
    pub output: ToolOutput,
    pub state: StepState,
    pub event_messages: Vec<String>,
}

/// Ordered reasoning steps, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentResponse {
    pub steps: Vec<ReasoningStep>,
}

impl AgentResponse {
    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Looks up a step by id.
    pub fn step(&self, id: &str) -> Option<&ReasoningStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Concatenates the output of all main-response steps in order.
    pub fn answer_text(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            if !model::is_main_response(&step.name) {
                continue;
            }
            if let Some(text) = step.output.as_text() {
                out.push_str(text);
            }
        }
        out
    }
}

/// A response frozen at one emission point.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub response: AgentResponse,
    /// Set on the single terminal snapshot of a stream.
    pub is_final: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(u: &str) -> Annotation {
        Annotation::Url(UrlSource::new(u))
    }

    #[test]
    fn web_search_keeps_only_url_annotations() {
        let annotations = vec![
            url("https://a.example"),
            Annotation::Reference {
                ref_id: "r1".into(),
            },
            url("https://b.example"),
        ];
        let output = ToolOutput::build("web_search", "ignored text", &annotations);
        let ToolOutput::WebSearch { results } = output else {
            panic!("expected web search output");
        };
        let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn memory_search_lists_reference_ids() {
        let annotations = vec![
            Annotation::Reference {
                ref_id: "m1".into(),
            },
            url("https://x.example"),
        ];
        assert_eq!(
            ToolOutput::build("memory_search", "", &annotations),
            ToolOutput::MemorySearch {
                references: vec!["m1".into()]
            }
        );
    }

    #[test]
    fn code_interpreter_separates_code_from_answer() {
        let file = FileRef {
            file_id: "f1".into(),
            file_path: "/out/plot.png".into(),
            file_type: "png".into(),
        };
        let annotations = vec![Annotation::File(file.clone()), url("https://x.example")];
        let text = "Running it:\n```python\nprint(1 + 1)\n```\nThe result is 2.";
        assert_eq!(
            ToolOutput::build("code_interpreter", text, &annotations),
            ToolOutput::CodeInterpreter {
                answer: "Running it:\nThe result is 2.".into(),
                code: "print(1 + 1)".into(),
                files: vec![file],
            }
        );
    }

    #[test]
    fn unterminated_fence_is_code_in_progress() {
        let (answer, code) = split_fenced_code("Plan\n```\nx = 1\ny =");
        assert_eq!(answer, "Plan");
        assert_eq!(code, "x = 1\ny =");
    }

    #[test]
    fn code_on_the_fence_line_is_kept() {
        let (_, code) = split_fenced_code("```foo()\nbar\n```");
        assert_eq!(code, "foo()\nbar");
        let (_, code) = split_fenced_code("```x=1\ny=2\n```");
        assert_eq!(code, "x=1\ny=2");
        let (_, code) = split_fenced_code("```c++\nint x;\n```");
        assert_eq!(code, "int x;");
    }

    #[test]
    fn unknown_tool_yields_bare_text() {
        let output = ToolOutput::build("calendar", "3 meetings", &[url("https://x.example")]);
        assert_eq!(output.as_text(), Some("3 meetings"));
    }

    #[test]
    fn answer_text_joins_main_response_steps_only() {
        let step = |id: &str, name: &str, text: &str| ReasoningStep {
            id: id.into(),
            source_id: id.split('#').next().unwrap_or(id).into(),
            name: name.into(),
            thought: String::new(),
            output: ToolOutput::Text { text: text.into() },
            state: StepState::Completed,
            event_messages: Vec::new(),
        };
        let response = AgentResponse {
            steps: vec![
                step("a#1", "llm_response", "Let me check. "),
                step("t1", "calendar", "3 meetings"),
                step("a#2", "raw_response", "You have three."),
            ],
        };
        assert_eq!(response.answer_text(), "Let me check. You have three.");
        assert_eq!(response.step("t1").map(|s| s.name.as_str()), Some("calendar"));
        assert_eq!(response.len(), 3);
    }
}
