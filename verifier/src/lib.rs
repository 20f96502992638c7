//! Comparison, correlation and orchestration for FIX log verification.
//!
//! The verifier consumes streams scanned by `fixlab-common` and answers
//! the central question of the harness: did the gateway-under-test emit
//! the exit messages the expected log says it should. It works offline
//! (expected vs. recorded actual) or online (inject entries over a
//! transport, collect actuals within a deadline).

pub mod compare;
pub mod error;
pub mod filter;
pub mod link;
pub mod loader;
pub mod matching;
pub mod normalize;
pub mod offline;
pub mod online;
pub mod scenario;

pub use error::{VerifyError, VerifyResult};
