pub mod error;
pub mod interval;
pub mod logging;
pub mod shutdown;

pub use error::{OncallError, Result, Severity};
pub use interval::parse_interval;
pub use logging::LogFormat;
pub use shutdown::{shutdown_token, sleep_or_cancel};

// Re-export commonly used types
pub use tokio_util::sync::CancellationToken;
