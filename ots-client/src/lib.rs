//! OpenTimestamps client library
//!
//! Talks to calendar servers and block explorers, and wraps the core proof
//! logic into stamp, upgrade and verify operations over `.ots` files.

pub mod calendar;
pub mod client;
pub mod config;
pub mod explorer;
pub mod info;
pub mod storage;

pub use calendar::{CalendarClient, HttpCalendar};
pub use client::{OtsClient, RetryConfig};
pub use config::ClientConfig;
pub use explorer::{BlockHeaderSource, EsploraExplorer};

use ots_core::VerificationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Invalid proof: {0}")]
    Proof(#[from] ots_types::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Only {received} of {required} required calendars responded")]
    InsufficientResponses { received: usize, required: usize },
}

pub type Result<T> = std::result::Result<T, ClientError>;
