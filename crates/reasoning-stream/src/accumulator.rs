use std::collections::VecDeque;

use crate::event::Annotation;
use crate::model::StepState;
use crate::output::{ReasoningStep, ToolOutput};

/// Fixed-size sliding window that drops its oldest entry when full.
#[derive(Clone, Debug)]
pub(crate) struct CappedLog<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> CappedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap.min(16)),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Mutable per-step state owned by the builder.
///
/// Text is appended to `*_buf` as events arrive and moved into the canonical
/// strings only when the builder emits.
#[derive(Debug)]
pub(crate) struct StepAccumulator {
    pub id: String,
    source_id: String,
    pub name: String,
    thought: String,
    output: String,
    thought_buf: String,
    output_buf: String,
    state: StepState,
    event_messages: CappedLog<String>,
    annotations: CappedLog<Annotation>,
    dirty: bool,
    rendered: Option<ReasoningStep>,
}

impl StepAccumulator {
    pub fn new(
        id: String,
        source_id: String,
        name: String,
        event_message_cap: usize,
        annotation_cap: usize,
    ) -> Self {
        Self {
            id,
            source_id,
            name,
            thought: String::new(),
            output: String::new(),
            thought_buf: String::new(),
            output_buf: String::new(),
            state: StepState::Started,
            event_messages: CappedLog::new(event_message_cap),
            annotations: CappedLog::new(annotation_cap),
            dirty: false,
            rendered: None,
        }
    }

    /// Replaces the name, returning `true` if it changed.
    pub fn rename(&mut self, name: &str) -> bool {
        if name.is_empty() || self.name == name {
            return false;
        }
        self.name = name.to_string();
        self.rendered = None;
        true
    }

    /// Buffers text. Returns `true` when the step just became dirty.
    pub fn append_text(&mut self, text: &str, reasoning: bool) -> bool {
        if text.is_empty() {
            return false;
        }
        if reasoning {
            self.thought_buf.push_str(text);
        } else {
            self.output_buf.push_str(text);
        }
        let became_dirty = !self.dirty;
        self.dirty = true;
        became_dirty
    }

    pub fn push_annotations(&mut self, annotations: Vec<Annotation>) {
        for annotation in annotations {
            self.annotations.push(annotation);
        }
        self.rendered = None;
    }

    pub fn push_event_message(&mut self, message: String) {
        self.event_messages.push(message);
        self.rendered = None;
    }

    /// Moves to `next`, returning `true` on an actual change. `Failed` is
    /// never left.
    pub fn set_state(&mut self, next: StepState) -> bool {
        if self.state == StepState::Failed || self.state == next {
            return false;
        }
        self.state = next;
        self.rendered = None;
        true
    }

    /// Marks the step completed unless it already failed.
    pub fn complete(&mut self) -> bool {
        self.set_state(StepState::Completed)
    }

    /// Moves buffered text into the canonical strings.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.thought.push_str(&self.thought_buf);
        self.output.push_str(&self.output_buf);
        self.thought_buf.clear();
        self.output_buf.clear();
        self.dirty = false;
        self.rendered = None;
    }

    /// Returns the public view, rebuilding it only after a change.
    pub fn render(&mut self) -> ReasoningStep {
        if let Some(step) = &self.rendered {
            return step.clone();
        }
        let step = ReasoningStep {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            name: self.name.clone(),
            thought: self.thought.clone(),
            output: ToolOutput::build(&self.name, &self.output, self.annotations.iter()),
            state: self.state,
            event_messages: self.event_messages.iter().cloned().collect(),
        };
        self.rendered = Some(step.clone());
        step
    }

    #[cfg(test)]
    pub fn annotation_count(&self) -> usize {
        self.annotations.iter().count()
    }
}
