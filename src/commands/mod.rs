pub mod archive;
pub mod common;
pub mod completions;
pub mod directive;
pub mod init;
pub mod queue;
pub mod resolve;
pub mod signal;
pub mod start;
pub mod status;
pub mod templates;
pub mod unit;
