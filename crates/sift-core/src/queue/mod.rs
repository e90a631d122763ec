//! キュー本体: 配信順序、遅延可視、リトライ、インメモリエンジン

mod config;
mod heap;
mod priority_queue;
mod retry;
mod scheduled;

pub use config::QueueConfig;
pub use heap::{Comparator, default_comparator};
pub use priority_queue::{NackOutcome, PriorityQueue};
pub use retry::RetryPolicy;
