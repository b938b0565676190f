//! Utilities.
pub mod conf;
pub mod logger;
