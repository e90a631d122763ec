//! ドメインモデル（ids, priority, status, metadata, job, errors）

pub mod errors;
pub mod ids;
pub mod job;
pub mod metadata;
pub mod priority;
pub mod state;

pub use self::errors::{ConfigError, ErrorKind, SiftError};
pub use self::ids::JobId;
pub use self::job::{DEFAULT_MAX_RETRIES, Job, Payload};
pub use self::metadata::Metadata;
pub use self::priority::Priority;
pub use self::state::JobStatus;
