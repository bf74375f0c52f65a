//! Common imports for consuming a reconstruction.
pub use crate::{
    AbortHandle, AgentResponse, BuilderConfig, ReasoningStep, ResponseBuilder, ResponseStream,
    Snapshot, StepState, StreamError, StreamEvent, ToolOutput, reconstruct,
};
