// pipedrop - ephemeral in-memory file exchange
// One producer uploads a file; any number of consumers stream it live.

#![warn(rust_2018_idioms)]

pub mod server;
pub mod signal;
pub mod storage;

// Re-exports for convenience
pub use storage::{Repository, Slab};

/// Crate version, exposed for the CLI banner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// pipedrop error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("upload already in progress for {0}")]
        AppendClaimed(String),

        #[error("invalid expiration override: {0}")]
        InvalidOverride(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}
