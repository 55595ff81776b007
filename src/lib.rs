pub mod allowlist;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod slack;
pub mod thread;

pub use error::{GateError, Result};
