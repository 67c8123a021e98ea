pub mod retry;

pub use retry::{retry_with_backoff, retry_on_transient, IsTransient, RetryConfig, RetryResult};
