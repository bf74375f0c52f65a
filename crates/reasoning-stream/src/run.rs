use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;
use tracing::{Instrument as _, debug, info_span, trace, warn};

use crate::builder::ResponseBuilder;
use crate::config::BuilderConfig;
use crate::errors::{ConfigError, StreamError};
use crate::event::StreamEvent;
use crate::output::{AgentResponse, Snapshot};

/// Handle used to stop reading the event source early.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The driver stops reading input, still emits the final snapshot over
    /// what it has seen, and then reports `StreamError::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Consumer side of a running reconstruction.
///
/// Use `next_snapshot()` for live updates and `finish()` for the outcome.
pub struct ResponseStream {
    stream_id: uuid::Uuid,
    rx: mpsc::Receiver<Snapshot>,
    final_rx: oneshot::Receiver<Result<AgentResponse, StreamError>>,
    abort_handle: AbortHandle,
    saw_final: bool,
}

impl ResponseStream {
    /// Id attached to this stream's log records.
    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    /// Returns a handle that can cancel the stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next snapshot. The last one has `is_final` set.
    ///
    /// Returns `None` once the channel is closed.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        let snapshot = self.rx.recv().await;
        if let Some(Snapshot { is_final: true, .. }) = &snapshot {
            self.saw_final = true;
        }
        snapshot
    }

    /// Drains remaining snapshots and returns the terminal result.
    ///
    /// On an upstream failure or abort the final snapshot has already been
    /// delivered through `next_snapshot()` before the error is returned here.
    pub async fn finish(mut self) -> Result<AgentResponse, StreamError> {
        while !self.saw_final {
            match self.rx.recv().await {
                Some(Snapshot { is_final: true, .. }) => self.saw_final = true,
                Some(_) => {}
                None => break,
            }
        }
        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(StreamError::protocol(format!(
                "reconstruction task {} ended without a final result",
                self.stream_id
            ))),
        }
    }
}

/// Starts reconstructing `events` on a background task.
///
/// Must be called inside a tokio runtime.
pub fn reconstruct<S, E>(events: S, config: BuilderConfig) -> Result<ResponseStream, ConfigError>
where
    S: futures::Stream<Item = Result<StreamEvent, E>> + Send + 'static,
    E: Into<StreamError> + Send + 'static,
{
    let capacity = config.snapshot_buffer_capacity;
    let builder = ResponseBuilder::with_config(config)?;
    let (tx, rx) = mpsc::channel(capacity);
    let (final_tx, final_rx) = oneshot::channel();
    let (abort_tx, abort_rx) = watch::channel(false);

    let stream_id = uuid::Uuid::new_v4();
    let span = info_span!("reconstruct", stream_id = %stream_id);
    tokio::spawn(
        run_task(
            builder,
            Box::pin(events.map(|item| item.map_err(Into::into))),
            tx,
            final_tx,
            abort_rx,
        )
        .instrument(span),
    );

    Ok(ResponseStream {
        stream_id,
        rx,
        final_rx,
        abort_handle: AbortHandle { tx: abort_tx },
        saw_final: false,
    })
}

/// Runs a reconstruction to completion and returns only the final response.
pub async fn collect_final<S, E>(events: S, config: BuilderConfig) -> Result<AgentResponse, StreamError>
where
    S: futures::Stream<Item = Result<StreamEvent, E>> + Send + 'static,
    E: Into<StreamError> + Send + 'static,
{
    let stream = reconstruct(events, config)
        .map_err(|e| StreamError::protocol(format!("cannot start reconstruction: {e}")))?;
    stream.finish().await
}

type EventStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

/// Hands an intermediate snapshot to the consumer without waiting.
///
/// Returns `false` once the receiver is gone.
fn offer(tx: &mpsc::Sender<Snapshot>, snapshot: Snapshot, dropped: &mut u64) -> bool {
    match tx.try_send(snapshot) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            *dropped += 1;
            debug!(dropped = *dropped, "consumer behind, dropping intermediate snapshot");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("snapshot receiver dropped, stopping");
            false
        }
    }
}

async fn run_task(
    mut builder: ResponseBuilder,
    mut events: EventStream,
    tx: mpsc::Sender<Snapshot>,
    final_tx: oneshot::Sender<Result<AgentResponse, StreamError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut dropped = 0_u64;
    let mut abortable = true;
    let outcome = loop {
        let deadline = builder.flush_deadline();
        let flush_at = deadline.map_or_else(time::Instant::now, time::Instant::from_std);
        tokio::select! {
            changed = abort_rx.changed(), if abortable => {
                match changed {
                    Ok(_) if *abort_rx.borrow() => break Err(StreamError::Cancelled),
                    Ok(_) => {}
                    // Every abort handle is gone.
                    Err(_) => abortable = false,
                }
            }
            _ = time::sleep_until(flush_at), if deadline.is_some() => {
                if let Some(snapshot) = builder.poll_at(std::time::Instant::now()) {
                    trace!("publishing buffered text after source went quiet");
                    if !offer(&tx, snapshot, &mut dropped) {
                        return;
                    }
                }
            }
            next = events.next() => {
                match next {
                    Some(Ok(event)) => {
                        if let Some(snapshot) = builder.push(event)
                            && !offer(&tx, snapshot, &mut dropped)
                        {
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, steps = builder.len(), "event source failed, finalizing partial response");
                        break Err(err);
                    }
                    None => break Ok(()),
                }
            }
        }
    };

    let snapshot = builder.finish();
    let response = snapshot.response.clone();
    if tx.send(snapshot).await.is_err() {
        debug!("snapshot receiver dropped before final snapshot");
    }
    debug!(steps = response.len(), dropped, "reconstruction finished");
    let _ = final_tx.send(outcome.map(|()| response));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventContent;
    use crate::model::StepState;
    use futures::StreamExt as _;
    use futures::stream;

    fn token(id: &str, name: &str, text: &str) -> Result<StreamEvent, StreamError> {
        Ok(StreamEvent::new(id, name).with_content(EventContent::token(text)))
    }

    async fn drain(stream: &mut ResponseStream) -> Vec<Snapshot> {
        let mut out = Vec::new();
        while let Some(snapshot) = stream.next_snapshot().await {
            out.push(snapshot);
        }
        out
    }

    #[tokio::test]
    async fn emits_single_final_snapshot_last() {
        let events = stream::iter(vec![
            token("a1", "llm_response", "Looking"),
            token("t1", "web_search", "query"),
            Ok(StreamEvent::new("t1", "web_search")
                .with_content(EventContent::status("completed"))),
            token("a1", "llm_response", "Answer"),
        ]);
        let mut stream = reconstruct(events, BuilderConfig::default()).expect("start");
        let snapshots = drain(&mut stream).await;
        assert_eq!(snapshots.iter().filter(|s| s.is_final).count(), 1);
        let last = snapshots.last().expect("final snapshot");
        assert!(last.is_final);
        assert_eq!(last.response.len(), 3);
        let response = stream.finish().await.expect("finish");
        assert_eq!(&response, &last.response);
        assert_eq!(response.answer_text(), "LookingAnswer");
    }

    #[tokio::test]
    async fn empty_source_still_finishes_with_final_snapshot() {
        let events = stream::iter(Vec::<Result<StreamEvent, StreamError>>::new());
        let mut stream = reconstruct(events, BuilderConfig::default()).expect("start");
        let first = stream.next_snapshot().await.expect("final snapshot");
        assert!(first.is_final);
        assert!(first.response.is_empty());
        assert!(stream.finish().await.expect("finish").is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_finalizes_then_surfaces_error() {
        let events = stream::iter(vec![
            token("t1", "shell", "partial output"),
            Err(StreamError::transport("connection reset")),
            token("t2", "shell", "never seen"),
        ]);
        let mut stream = reconstruct(events, BuilderConfig::default()).expect("start");
        let snapshots = drain(&mut stream).await;
        let last = snapshots.last().expect("final snapshot");
        assert!(last.is_final);
        assert_eq!(last.response.len(), 1);
        assert_eq!(last.response.steps[0].state, StepState::Completed);
        assert_eq!(
            last.response.steps[0].output.as_text(),
            Some("partial output")
        );
        assert!(matches!(
            stream.finish().await,
            Err(StreamError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn abort_drains_to_final_snapshot() {
        let events = stream::iter(vec![token("a1", "llm_response", "partial")])
            .chain(stream::pending());
        let mut stream = reconstruct(events, BuilderConfig::default()).expect("start");
        let first = stream.next_snapshot().await.expect("first snapshot");
        assert!(!first.is_final);

        stream.abort_handle().abort();
        let snapshots = drain(&mut stream).await;
        let last = snapshots.last().expect("final snapshot");
        assert!(last.is_final);
        assert_eq!(last.response.steps[0].state, StepState::Completed);
        assert_eq!(last.response.answer_text(), "partial");
        assert!(matches!(stream.finish().await, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn slow_consumer_loses_intermediate_snapshots_but_not_the_final() {
        let events: Vec<_> = (0..50)
            .map(|i| token(&format!("t{i}"), "shell", "x"))
            .collect();
        let stream = reconstruct(
            stream::iter(events),
            BuilderConfig::default().snapshot_buffer_capacity(1),
        )
        .expect("start");
        let response = stream.finish().await.expect("finish");
        assert_eq!(response.len(), 50);
        assert!(response.steps.iter().all(|s| s.state == StepState::Completed));
    }

    #[tokio::test]
    async fn quiet_source_still_gets_buffered_text_published() {
        let events = stream::iter(vec![
            token("a1", "llm_response", "Hel"),
            token("a1", "llm_response", "lo"),
        ])
        .chain(stream::pending());
        let config = BuilderConfig::default()
            .min_interval(std::time::Duration::from_millis(20))
            .max_interval(std::time::Duration::from_secs(60));
        let mut stream = reconstruct(events, config).expect("start");

        let first = stream.next_snapshot().await.expect("first snapshot");
        assert!(!first.is_final);
        let mut latest = first;
        while latest.response.answer_text() != "Hello" {
            latest = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next_snapshot())
                .await
                .expect("buffered text published without a new event")
                .expect("snapshot");
            assert!(!latest.is_final);
        }

        stream.abort_handle().abort();
        assert!(matches!(stream.finish().await, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_start() {
        let events = stream::iter(Vec::<Result<StreamEvent, StreamError>>::new());
        let result = reconstruct(events, BuilderConfig::default().max_emit_rate(0));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn collect_final_returns_final_response() {
        let events = stream::iter(vec![
            token("a1", "llm_response", "Hello "),
            token("a1", "llm_response", "world"),
        ]);
        let response = collect_final(events, BuilderConfig::default())
            .await
            .expect("collect");
        assert_eq!(response.answer_text(), "Hello world");
    }
}
