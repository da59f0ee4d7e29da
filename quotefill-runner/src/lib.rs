//! Quotefill Runner: worker pool, session orchestration, classification copy.
//!
//! This crate builds on `quotefill-core` to provide:
//! - Bounded per-symbol fan-out with a single sink writer
//! - The `PassRunner` seam and its production `Ingestor`
//! - The session state machine with its error budget and cancellation
//! - Copying snapshots into per-symbol tables, and table maintenance
//! - Session configuration with TOML overrides

pub mod cancel;
pub mod classification;
pub mod config;
pub mod ingest;
pub mod pool;
pub mod session;
pub mod tables;

pub use cancel::CancelToken;
pub use classification::{copy_rows_to_symbol_tables, CopyPlan, CopyReport};
pub use config::{parse_time_of_day, ConfigError, SessionConfig, SessionOverrides};
pub use ingest::{Ingestor, PassError, PassRunner};
pub use pool::{BatchReport, PoolError, SinkFailure, WorkerPool};
pub use session::{
    AlwaysReconfirm, Clock, ErrorBudget, FatalAbort, NoReconfirm, PhaseReport, ReconfirmPolicy,
    SessionError, SessionOrchestrator, SessionPhase, SessionReport, SystemClock,
};
pub use tables::{ensure_symbol_tables, rename_code_only_tables, table_code};
