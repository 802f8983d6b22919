//! Sweeps a node's filestore for blocks whose backing file is gone and removes
//! them, unwinding any pin that blocks the removal.

pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pin;
pub mod sweep;
pub mod transport;
pub mod verify;

pub use config::{CleanupConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use sweep::{RemovalOutcome, RemovalStatus, SweepReport, Sweeper};
pub use transport::{ApiTransport, HttpTransport};
pub use verify::{FilestoreStatus, VerificationRecord, VerifyStream};
