pub mod api;
pub mod batch;
pub mod cancel;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod export;
pub mod filter;
pub mod logger;
pub mod moderation;
pub mod pipeline;
pub mod rate_limit;
pub mod record;
pub mod result_sink;
pub mod scanner;

pub use api::{GroupApi, HttpGroupApi};
pub use cancel::CancelToken;
pub use moderation::ModerationOutcome;
pub use record::{Candidate, EnrichedRecord, ScanWindow};
