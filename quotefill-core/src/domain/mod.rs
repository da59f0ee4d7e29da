//! Domain types for quotefill

pub mod kind;
pub mod record;
pub mod symbol;

pub use kind::InstrumentKind;
pub use record::{Record, BLANK};
pub use symbol::{normalize, Symbol, SymbolEntry, SymbolError, MIN_CODE_WIDTH};
