//! Session state machine.
//!
//! `HistoricalBackfill → IntradayPolling → FinalSnapshot → Classification → Done`,
//! strictly forward. Each phase opens its own sink and releases it on exit.
//! The error budget and the current phase belong to the orchestrator alone
//! and change only between passes.

use std::fmt;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use quotefill_core::{AggregationMode, RowSink, SinkOpener, Symbol, SymbolEntry};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::classification::{copy_rows_to_symbol_tables, CopyPlan};
use crate::config::SessionConfig;
use crate::ingest::{PassError, PassRunner};
use crate::pool::BatchReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    HistoricalBackfill,
    IntradayPolling,
    FinalSnapshot,
    Classification,
    Done,
}

impl SessionPhase {
    pub fn next(self) -> Self {
        match self {
            Self::HistoricalBackfill => Self::IntradayPolling,
            Self::IntradayPolling => Self::FinalSnapshot,
            Self::FinalSnapshot => Self::Classification,
            Self::Classification | Self::Done => Self::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HistoricalBackfill => "historical-backfill",
            Self::IntradayPolling => "intraday-polling",
            Self::FinalSnapshot => "final-snapshot",
            Self::Classification => "classification",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failed polling pass is treated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Remote hosts unreachable; back off and retry, budget untouched.
    #[error("connectivity: {0}")]
    Connectivity(PassError),

    /// Anything else; charged against the error budget.
    #[error("unexpected: {0}")]
    Unknown(PassError),
}

impl From<PassError> for SessionError {
    fn from(e: PassError) -> Self {
        if e.is_connectivity() {
            Self::Connectivity(e)
        } else {
            Self::Unknown(e)
        }
    }
}

/// Terminates the run. Phases after `phase` are not attempted and rows
/// already written by `phase` stay as they are.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fatal abort during {phase}{}: {cause}", at_symbol(.symbol))]
pub struct FatalAbort {
    pub phase: SessionPhase,
    pub symbol: Option<Symbol>,
    #[source]
    pub cause: PassError,
}

fn at_symbol(symbol: &Option<Symbol>) -> String {
    symbol.as_ref().map(|s| format!(" at {s}")).unwrap_or_default()
}

/// Unknown errors tolerated before the run is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    threshold: u32,
    spent: u32,
}

impl ErrorBudget {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            spent: 0,
        }
    }

    /// Record one error. True once the threshold is reached.
    pub fn charge(&mut self) -> bool {
        self.spent = self.spent.saturating_add(1);
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent >= self.threshold
    }

    pub fn spent(&self) -> u32 {
        self.spent
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.spent = 0;
    }
}

/// Wall-clock source for the polling loop.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
    fn sleep(&self, duration: Duration);

    /// Sleep unless `cancel` is already raised. Implementations that block
    /// for real should also wake early once it is raised.
    fn sleep_unless_cancelled(&self, duration: Duration, cancel: &CancelToken) {
        if !cancel.is_cancelled() {
            self.sleep(duration);
        }
    }
}

/// Granularity at which [`SystemClock`] notices a cancel request.
const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn sleep_unless_cancelled(&self, duration: Duration, cancel: &CancelToken) {
        let mut remaining = duration;
        while !remaining.is_zero() && !cancel.is_cancelled() {
            let step = remaining.min(CANCEL_POLL);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

/// Asked once after the first final-snapshot pass whether to run another.
pub trait ReconfirmPolicy {
    fn reconfirm(&self, first: Option<&BatchReport>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconfirm;

impl ReconfirmPolicy for NoReconfirm {
    fn reconfirm(&self, _first: Option<&BatchReport>) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReconfirm;

impl ReconfirmPolicy for AlwaysReconfirm {
    fn reconfirm(&self, _first: Option<&BatchReport>) -> bool {
        true
    }
}

impl<F> ReconfirmPolicy for F
where
    F: Fn(Option<&BatchReport>) -> bool,
{
    fn reconfirm(&self, first: Option<&BatchReport>) -> bool {
        self(first)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: SessionPhase,
    /// Passes attempted, failed ones included.
    pub passes: usize,
    pub failed_passes: usize,
    /// Symbols that came back degraded at least once, in first-seen order.
    pub degraded: Vec<Symbol>,
    pub sink_failures: usize,
}

impl PhaseReport {
    fn new(phase: SessionPhase) -> Self {
        Self {
            phase,
            passes: 0,
            failed_passes: 0,
            degraded: Vec::new(),
            sink_failures: 0,
        }
    }

    fn record(&mut self, batch: &BatchReport) {
        for symbol in &batch.degraded {
            if !self.degraded.contains(symbol) {
                self.degraded.push(symbol.clone());
            }
        }
        self.sink_failures += batch.sink_failures.len();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub phases: Vec<PhaseReport>,
    /// Stopped by the operator; later phases were skipped.
    pub cancelled: bool,
}

impl SessionReport {
    pub fn phase(&self, phase: SessionPhase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

enum PassOutcome {
    Completed(BatchReport),
    Connectivity,
    Failed,
}

pub struct SessionOrchestrator<R, O, C> {
    config: SessionConfig,
    runner: R,
    opener: O,
    clock: C,
    reconfirm: Box<dyn ReconfirmPolicy>,
    cancel: CancelToken,
    phase: SessionPhase,
    budget: ErrorBudget,
}

impl<R, O, C> SessionOrchestrator<R, O, C>
where
    R: PassRunner,
    O: SinkOpener,
    C: Clock,
{
    pub fn new(config: SessionConfig, runner: R, opener: O, clock: C) -> Self {
        let reconfirm: Box<dyn ReconfirmPolicy> = if config.reconfirm_final {
            Box::new(AlwaysReconfirm)
        } else {
            Box::new(NoReconfirm)
        };
        let budget = ErrorBudget::new(config.error_threshold);
        Self {
            config,
            runner,
            opener,
            clock,
            reconfirm,
            cancel: CancelToken::new(),
            phase: SessionPhase::HistoricalBackfill,
            budget,
        }
    }

    pub fn with_reconfirm(mut self, policy: impl ReconfirmPolicy + 'static) -> Self {
        self.reconfirm = Box::new(policy);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Drive every phase to `Done`, or stop at the first fatal abort.
    pub fn run(&mut self, symbols: &[SymbolEntry]) -> Result<SessionReport, FatalAbort> {
        let mut report = SessionReport::default();
        self.phase = SessionPhase::HistoricalBackfill;
        self.budget.reset();
        info!(symbols = symbols.len(), "session started");

        loop {
            if self.phase == SessionPhase::Done {
                break;
            }
            if self.cancel.is_cancelled() {
                warn!(phase = %self.phase, "session cancelled, skipping remaining phases");
                report.cancelled = true;
                self.phase = SessionPhase::Done;
                break;
            }
            info!(phase = %self.phase, "phase started");
            let phase_report = match self.phase {
                SessionPhase::HistoricalBackfill => self.backfill(symbols)?,
                SessionPhase::IntradayPolling => self.poll_until_close(symbols)?,
                SessionPhase::FinalSnapshot => self.final_snapshot(symbols)?,
                SessionPhase::Classification => self.classify(symbols)?,
                SessionPhase::Done => break,
            };
            if !phase_report.degraded.is_empty() {
                let list: Vec<&str> = phase_report.degraded.iter().map(Symbol::as_str).collect();
                warn!(phase = %self.phase, symbols = %list.join(", "), "partially filled");
            }
            info!(phase = %self.phase, passes = phase_report.passes, "phase finished");
            report.phases.push(phase_report);
            self.phase = self.phase.next();
        }

        info!(cancelled = report.cancelled, "session finished");
        Ok(report)
    }

    fn backfill(&mut self, symbols: &[SymbolEntry]) -> Result<PhaseReport, FatalAbort> {
        let mut sink = self.open_sink()?;
        let mut phase = PhaseReport::new(SessionPhase::HistoricalBackfill);
        phase.passes = 1;
        match self.runner.run_pass(AggregationMode::Full, symbols, sink.as_mut()) {
            Ok(batch) => phase.record(&batch),
            Err(cause) => {
                phase.failed_passes = 1;
                self.abandon(sink);
                return Err(self.abort(cause));
            }
        }
        self.release(sink)?;
        Ok(phase)
    }

    fn poll_until_close(&mut self, symbols: &[SymbolEntry]) -> Result<PhaseReport, FatalAbort> {
        let mut sink = self.open_sink()?;
        let mut phase = PhaseReport::new(SessionPhase::IntradayPolling);
        let cutoff = self.config.closing_cutoff;

        loop {
            if self.cancel.is_cancelled() {
                info!("polling interrupted");
                break;
            }
            if self.clock.now().time() >= cutoff {
                info!(%cutoff, "closing cutoff reached");
                break;
            }
            let pause = match self.guarded_pass(symbols, sink.as_mut(), &mut phase) {
                Ok(PassOutcome::Connectivity) => self.config.connectivity_backoff,
                Ok(_) => self.config.poll_interval,
                Err(abort) => {
                    self.abandon(sink);
                    return Err(abort);
                }
            };
            self.clock.sleep_unless_cancelled(pause, &self.cancel);
        }

        self.release(sink)?;
        Ok(phase)
    }

    fn final_snapshot(&mut self, symbols: &[SymbolEntry]) -> Result<PhaseReport, FatalAbort> {
        let mut sink = self.open_sink()?;
        let mut phase = PhaseReport::new(SessionPhase::FinalSnapshot);

        let first = match self.pass_until_reached(symbols, sink.as_mut(), &mut phase) {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                self.release(sink)?;
                return Ok(phase);
            }
            Err(abort) => {
                self.abandon(sink);
                return Err(abort);
            }
        };
        let batch = match &first {
            PassOutcome::Completed(batch) => Some(batch),
            _ => None,
        };
        if self.reconfirm.reconfirm(batch) {
            info!("re-confirming final snapshot");
            if let Err(abort) = self.pass_until_reached(symbols, sink.as_mut(), &mut phase) {
                self.abandon(sink);
                return Err(abort);
            }
        }

        self.release(sink)?;
        Ok(phase)
    }

    /// Repeat a guarded pass, backing off, while the remote hosts are
    /// unreachable. `None` when cancelled before a pass got through.
    fn pass_until_reached(
        &mut self,
        symbols: &[SymbolEntry],
        sink: &mut dyn RowSink,
        phase: &mut PhaseReport,
    ) -> Result<Option<PassOutcome>, FatalAbort> {
        loop {
            match self.guarded_pass(symbols, sink, phase)? {
                PassOutcome::Connectivity => {
                    self.clock
                        .sleep_unless_cancelled(self.config.connectivity_backoff, &self.cancel);
                    if self.cancel.is_cancelled() {
                        info!(phase = %self.phase, "retry interrupted");
                        return Ok(None);
                    }
                }
                outcome => return Ok(Some(outcome)),
            }
        }
    }

    fn classify(&mut self, symbols: &[SymbolEntry]) -> Result<PhaseReport, FatalAbort> {
        let mut sink = self.open_sink()?;
        let mut phase = PhaseReport::new(SessionPhase::Classification);
        phase.passes = 1;
        let plan = CopyPlan::from_config(&self.config);
        match copy_rows_to_symbol_tables(sink.as_mut(), symbols, &plan) {
            Ok(copy) => phase.degraded = copy.unmatched,
            Err(e) => {
                phase.failed_passes = 1;
                self.abandon(sink);
                return Err(self.abort(PassError::Sink(e)));
            }
        }
        self.release(sink)?;
        Ok(phase)
    }

    /// One quote-only pass under the polling error policy.
    fn guarded_pass(
        &mut self,
        symbols: &[SymbolEntry],
        sink: &mut dyn RowSink,
        phase: &mut PhaseReport,
    ) -> Result<PassOutcome, FatalAbort> {
        phase.passes += 1;
        let cause = match self.runner.run_pass(AggregationMode::QuoteOnly, symbols, sink) {
            Ok(batch) => {
                phase.record(&batch);
                return Ok(PassOutcome::Completed(batch));
            }
            Err(cause) => cause,
        };
        phase.failed_passes += 1;

        match SessionError::from(cause) {
            SessionError::Connectivity(cause) => {
                warn!(
                    error = %cause,
                    backoff_secs = self.config.connectivity_backoff.as_secs_f64(),
                    "remote hosts unreachable, backing off"
                );
                Ok(PassOutcome::Connectivity)
            }
            SessionError::Unknown(cause) => {
                if self.budget.charge() {
                    return Err(self.abort(cause));
                }
                warn!(
                    error = %cause,
                    spent = self.budget.spent(),
                    threshold = self.budget.threshold(),
                    "pass failed"
                );
                Ok(PassOutcome::Failed)
            }
        }
    }

    fn open_sink(&self) -> Result<Box<dyn RowSink>, FatalAbort> {
        self.opener
            .open()
            .map_err(|e| self.abort(PassError::Sink(e)))
    }

    fn release(&self, mut sink: Box<dyn RowSink>) -> Result<(), FatalAbort> {
        sink.close().map_err(|e| self.abort(PassError::Sink(e)))
    }

    /// Close without letting a close failure mask the original cause.
    fn abandon(&self, mut sink: Box<dyn RowSink>) {
        if let Err(e) = sink.close() {
            warn!(phase = %self.phase, error = %e, "sink close failed during abort");
        }
    }

    fn abort(&self, cause: PassError) -> FatalAbort {
        let abort = FatalAbort {
            phase: self.phase,
            symbol: cause.symbol().cloned(),
            cause,
        };
        error!(phase = %abort.phase, symbol = ?abort.symbol, error = %abort.cause, "fatal abort");
        abort
    }
}
