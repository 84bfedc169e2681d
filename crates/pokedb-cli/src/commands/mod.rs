//! Command implementations.

pub mod collect;

pub use collect::{CollectOptions, execute as collect};
