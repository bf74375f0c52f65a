use std::fmt;

/// Source names that carry the user-facing answer rather than a tool call.
///
/// Closed list: a name missing here is treated as a tool, never as prose.
pub const MAIN_RESPONSE_NAMES: [&str; 2] = ["llm_response", "raw_response"];

/// Source name of the web search tool.
pub const WEB_SEARCH: &str = "web_search";
/// Source name of the memory search tool.
pub const MEMORY_SEARCH: &str = "memory_search";
/// Source name of the code interpreter tool.
pub const CODE_INTERPRETER: &str = "code_interpreter";

/// Returns `true` when `name` is one of the main-response channels.
pub fn is_main_response(name: &str) -> bool {
    MAIN_RESPONSE_NAMES.contains(&name)
}

/// Lifecycle of one reasoning step.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Started,
    Completed,
    Failed,
}

impl StepState {
    /// Maps tool status text onto a state, if it names one.
    ///
    /// Matching is case-insensitive substring search, with `fail` taking
    /// precedence over the completion words, which take precedence over
    /// `start`.
    pub fn from_status_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("fail") {
            Some(Self::Failed)
        } else if ["complete", "done", "finish"]
            .iter()
            .any(|word| lower.contains(word))
        {
            Some(Self::Completed)
        } else if lower.contains("start") {
            Some(Self::Started)
        } else {
            None
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}
