//! Command implementations for mdt-config-cli

pub mod get;
pub mod resolve;
pub mod rules;

pub use get::run_get;
pub use resolve::run_resolve;
pub use rules::run_rules;
