//! Configuration, logging and shared error types for the identity session
//! workspace.

mod config;
mod error;
mod logging;

pub use config::{
    Config, CLIENT_ID_ENV, CLIENT_SECRET_ENV, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogWriter, LOG_FILE_ENV};
