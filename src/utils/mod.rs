//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{calculate_checksum, file_name, has_extension, read_file_content};
pub use retry::{RetryConfig, Retryable, with_retry};
