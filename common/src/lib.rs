//! Shared FIX data model, wire codec and log scanner for the fixlab
//! workspace. Everything here is synchronous and allocation-light; the
//! verifier and simulator crates build on these types.

pub mod codec;
pub mod error;
pub mod scan;
pub mod types;

pub use error::{CodecError, CodecResult, ScanError, ScanResult};
pub use types::entry::LogEntry;
pub use types::message::FixMessage;
pub use types::raw::{Direction, FixRawMessage};
pub use types::session::SessionKey;
