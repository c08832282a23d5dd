pub mod backoff;
pub mod scheduler;
pub mod sync;

pub use backoff::{next_retry_at, retry_delay};
pub use scheduler::{CycleReport, FeedScheduler, PollerConfig};
pub use sync::{PollError, PollOutcome, SourcePoller};
