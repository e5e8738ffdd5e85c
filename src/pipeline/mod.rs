//! Post triage pipeline — decides, generates, dispatches, and records.

pub mod processor;
pub mod types;

pub use processor::{PostProcessor, ProcessorConfig};
pub use types::{PostOutcome, RawPost, SourceClient};
