pub mod config;
pub mod error;
pub mod structure;
pub mod types;
