//! Integration tests for phasegate
//!
//! These tests drive the engine, directive interpreter and planning queue
//! through real `.phasegate/` directories created in temp dirs.

pub mod directive_stream;
pub mod helpers;
pub mod lifecycle;
pub mod queue_claims;
