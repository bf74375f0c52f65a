//! Reconstructs a live stream of reasoning and tool events into ordered,
//! typed snapshots for display.
//!
//! Events flow transport → [`normalize`] → [`ResponseBuilder`] → consumer.
//! The builder groups events into steps, throttles snapshot emission under
//! heavy token traffic, and always ends with exactly one final snapshot.
//!
//! # Driving a stream
//!
//! ```no_run
//! use reasoning_stream::prelude::*;
//! use reasoning_stream::transport::response_events;
//!
//! # async fn demo(response: reqwest::Response) -> Result<(), StreamError> {
//! let mut stream = reconstruct(response_events(response), BuilderConfig::default())
//!     .map_err(|e| StreamError::protocol(e.to_string()))?;
//!
//! while let Some(snapshot) = stream.next_snapshot().await {
//!     for step in snapshot.response.steps() {
//!         println!("{} [{}] {}", step.id, step.state, step.name);
//!     }
//! }
//! let response = stream.finish().await?;
//! println!("{}", response.answer_text());
//! # Ok(())
//! # }
//! ```
//!
//! # Synchronous use
//!
//! ```
//! use reasoning_stream::{EventContent, ResponseBuilder, StepState, StreamEvent};
//!
//! let mut builder = ResponseBuilder::new();
//! builder.push(StreamEvent::new("t1", "web_search").with_content(EventContent::token("searching")));
//! builder.push(StreamEvent::new("t1", "web_search").with_content(EventContent::status("completed search")));
//! let last = builder.finish();
//! assert!(last.is_final);
//! assert_eq!(last.response.steps[0].state, StepState::Completed);
//! ```

mod accumulator;
/// Stateful step reconstruction and emission throttling.
pub mod builder;
/// Throttling and capacity settings.
pub mod config;
/// Public error types.
pub mod errors;
/// Normalized input events and annotations.
pub mod event;
/// Source names and step states.
pub mod model;
/// Raw record to event mapping.
pub mod normalize;
/// Tracing subscriber setup.
pub mod observability;
/// Snapshot types produced by the builder.
pub mod output;
/// Common imports.
pub mod prelude;
/// Async driver over an event stream.
pub mod run;
/// Newline-delimited JSON body framing.
pub mod transport;

pub use builder::ResponseBuilder;
pub use config::BuilderConfig;
pub use errors::{ConfigError, StreamError};
pub use event::{Annotation, ContentKind, EventContent, FileRef, StreamEvent, UrlSource};
pub use model::{StepState, is_main_response};
pub use normalize::normalize;
pub use output::{AgentResponse, ReasoningStep, Snapshot, ToolOutput};
pub use run::{AbortHandle, ResponseStream, collect_final, reconstruct};
