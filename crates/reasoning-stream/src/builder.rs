//! Stateful reconstruction of reasoning steps from a stream of events.
//!
//! The remote process alternates between main-response bursts (narrative and
//! answer text) and tool bursts. There is no explicit close event for the
//! main channel, so block boundaries decide when a step is finished:
//!
//! - entering a main block completes every step seen so far,
//! - leaving a main block completes the newest main-response step.
//!
//! The same `source_id` may recur across separate main blocks; each burst is
//! its own step, keyed by the id plus the block index.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::accumulator::StepAccumulator;
use crate::config::BuilderConfig;
use crate::errors::ConfigError;
use crate::event::{ContentKind, StreamEvent};
use crate::model::{self, StepState};
use crate::output::{AgentResponse, Snapshot};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum StepKey {
    Tool(String),
    Main { source_id: String, block: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Block {
    None,
    Raw,
    Tools,
}

/// Builds throttled [`Snapshot`]s from [`StreamEvent`]s for one stream.
///
/// Feed events with [`push`](Self::push); it returns a snapshot whenever the
/// emission policy allows one. Call [`finish`](Self::finish) at end of input
/// (also after an upstream failure) to get the single final snapshot.
pub struct ResponseBuilder {
    config: BuilderConfig,
    min_interval: Duration,
    steps: Vec<StepAccumulator>,
    index: HashMap<StepKey, usize>,
    dirty: Vec<usize>,
    block: Block,
    block_index: u64,
    last_emit: Instant,
    buffered_chars: usize,
    force_emit: bool,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    /// Creates a builder with default throttling.
    pub fn new() -> Self {
        Self::starting_at(BuilderConfig::default(), Instant::now())
    }

    /// Creates a builder after validating `config`.
    pub fn with_config(config: BuilderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::starting_at(config, Instant::now()))
    }

    fn starting_at(config: BuilderConfig, now: Instant) -> Self {
        Self {
            min_interval: config.min_emit_interval(),
            config,
            steps: Vec::new(),
            index: HashMap::new(),
            dirty: Vec::new(),
            block: Block::None,
            block_index: 0,
            last_emit: now,
            buffered_chars: 0,
            force_emit: false,
        }
    }

    /// Number of steps seen so far.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Applies one event and returns a snapshot if one is due.
    pub fn push(&mut self, event: StreamEvent) -> Option<Snapshot> {
        self.push_at(event, Instant::now())
    }

    /// Like [`push`](Self::push) with an explicit clock reading.
    pub fn push_at(&mut self, event: StreamEvent, now: Instant) -> Option<Snapshot> {
        self.apply(event);
        if self.should_emit(now) {
            Some(self.emit(now))
        } else {
            None
        }
    }

    /// Instant at which buffered text becomes due under the rate limit.
    ///
    /// `None` while nothing is buffered.
    pub fn flush_deadline(&self) -> Option<Instant> {
        (self.buffered_chars > 0).then(|| self.last_emit + self.min_interval)
    }

    /// Publishes buffered text once its deadline has passed, without waiting
    /// for another event.
    pub fn poll_at(&mut self, now: Instant) -> Option<Snapshot> {
        let due = self.flush_deadline()?;
        if now < due {
            return None;
        }
        Some(self.emit(now))
    }

    /// Completes all open steps and returns the final snapshot.
    pub fn finish(mut self) -> Snapshot {
        self.finalize(Instant::now())
    }

    fn apply(&mut self, event: StreamEvent) {
        let is_main = event.is_main_response();
        self.transition(is_main);
        let idx = self.lookup_or_create(&event, is_main);
        let StreamEvent {
            source_name,
            content,
            reasoning,
            is_final,
            ..
        } = event;

        let step = &mut self.steps[idx];
        if step.rename(&source_name) {
            debug!(step_id = %step.id, name = %step.name, "step renamed");
        }
        let Some(content) = content else {
            return;
        };
        trace!(step_id = %step.id, kind = ?content.kind, is_final, "applying event");

        match content.kind {
            ContentKind::Status if is_main => return,
            kind if kind.is_text() => {
                self.buffered_chars += content.text.chars().count();
                if step.append_text(&content.text, reasoning) {
                    self.dirty.push(idx);
                }
            }
            _ => {
                if !content.text.is_empty() {
                    if let Some(next) = StepState::from_status_text(&content.text)
                        && step.set_state(next)
                    {
                        debug!(step_id = %step.id, state = %next, "step state changed");
                        self.force_emit = true;
                    }
                    step.push_event_message(content.text);
                }
            }
        }

        if !content.annotations.is_empty() {
            self.steps[idx].push_annotations(content.annotations);
            self.force_emit = true;
        }
    }

    fn transition(&mut self, is_main: bool) {
        let next = match (self.block, is_main) {
            (Block::None, true) | (Block::Tools, true) => Block::Raw,
            (Block::None, false) | (Block::Raw, false) => Block::Tools,
            (Block::Raw, true) | (Block::Tools, false) => return,
        };
        match self.block {
            Block::Tools => self.complete_all(),
            Block::Raw => self.complete_latest_main(),
            Block::None => {}
        }
        if next == Block::Raw {
            self.block_index += 1;
        }
        debug!(from = ?self.block, to = ?next, block_index = self.block_index, "block transition");
        self.block = next;
        self.force_emit = true;
    }

    fn complete_all(&mut self) {
        for step in &mut self.steps {
            if step.complete() {
                debug!(step_id = %step.id, "step completed at block boundary");
            }
        }
    }

    fn complete_latest_main(&mut self) {
        if let Some(step) = self
            .steps
            .iter_mut()
            .rev()
            .find(|step| model::is_main_response(&step.name))
            && step.complete()
        {
            debug!(step_id = %step.id, "main response step completed");
        }
    }

    fn lookup_or_create(&mut self, event: &StreamEvent, is_main: bool) -> usize {
        let key = if is_main {
            StepKey::Main {
                source_id: event.source_id.clone(),
                block: self.block_index,
            }
        } else {
            StepKey::Tool(event.source_id.clone())
        };
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }

        let base = if is_main {
            format!("{}#{}", event.source_id, self.block_index)
        } else {
            event.source_id.clone()
        };
        let id = self.unique_id(base);
        debug!(step_id = %id, name = %event.source_name, "new reasoning step");
        let idx = self.steps.len();
        self.steps.push(StepAccumulator::new(
            id,
            event.source_id.clone(),
            event.source_name.clone(),
            self.config.event_message_cap,
            self.config.annotation_cap,
        ));
        self.index.insert(key, idx);
        self.force_emit = true;
        idx
    }

    /// Raw ids may themselves contain `#`, so a generated main id can clash
    /// with a tool id. Later steps get a `~n` suffix.
    fn unique_id(&self, base: String) -> String {
        let mut id = base.clone();
        let mut n = 1;
        while self.steps.iter().any(|step| step.id == id) {
            n += 1;
            id = format!("{base}~{n}");
        }
        id
    }

    fn should_emit(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_emit);
        self.force_emit
            || self.buffered_chars >= self.config.size_threshold
            || elapsed >= self.config.max_interval
            || (elapsed >= self.min_interval && self.buffered_chars > 0)
    }

    fn emit(&mut self, now: Instant) -> Snapshot {
        for idx in self.dirty.drain(..) {
            self.steps[idx].flush();
        }
        let response = AgentResponse {
            steps: self.steps.iter_mut().map(StepAccumulator::render).collect(),
        };
        trace!(
            steps = response.len(),
            buffered_chars = self.buffered_chars,
            forced = self.force_emit,
            "emitting snapshot"
        );
        self.buffered_chars = 0;
        self.last_emit = now;
        self.force_emit = false;
        Snapshot {
            response,
            is_final: false,
        }
    }

    fn finalize(&mut self, now: Instant) -> Snapshot {
        match self.block {
            Block::Raw => self.complete_latest_main(),
            Block::Tools => self.complete_all(),
            Block::None => {}
        }
        for step in &mut self.steps {
            step.complete();
        }
        let mut snapshot = self.emit(now);
        snapshot.is_final = true;
        debug!(steps = snapshot.response.len(), "final snapshot");
        snapshot
    }
}
