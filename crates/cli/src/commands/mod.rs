//! Command implementations

pub mod schedule;
pub mod status;
pub mod validate;
