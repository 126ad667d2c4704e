//! Republish core: the pure article ledger.
//!
//! No I/O happens here. The engine wraps [`Ledger`] with file persistence and
//! locking; everything about which status may follow which lives in this crate.
mod ledger;
mod record;
mod status;

pub use ledger::{Decision, Ledger, LedgerError};
pub use record::{ArticleRecord, Transition};
pub use status::ArticleStatus;
