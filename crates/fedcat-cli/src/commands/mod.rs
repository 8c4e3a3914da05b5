//! CLI command implementations.

pub mod catalogs;
pub mod serve;
pub mod status;
pub mod validate;
