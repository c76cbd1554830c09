//! CLI command implementations.

pub(crate) mod list;
pub(crate) mod query;
pub(crate) mod report;
pub(crate) mod run;
pub(crate) mod schedule;
pub(crate) mod status;
