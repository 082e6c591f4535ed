//! Shared domain types, configuration, and errors for the Orgscout gateway.

pub mod config;
pub mod error;
pub mod types;

pub use config::OrgscoutConfig;
pub use error::{Result, ScoutError};
pub use types::*;
