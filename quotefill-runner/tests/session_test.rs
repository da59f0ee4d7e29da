//! BDD tests for the session state machine.
//!
//! A scripted pass runner and a simulated clock drive the orchestrator:
//! - polling stops exactly at the cutoff
//! - connectivity errors back off without charging the budget
//! - unknown errors escalate to a fatal abort at the threshold
//! - backfill failure is fatal, cancellation is clean, reconfirmation runs once
//! - the final snapshot rides out connectivity errors like polling does

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use quotefill_core::{
    AggregationMode, FetchError, InstrumentKind, MemoryWorkbook, Record, RowSink, SinkError,
    SymbolEntry,
};
use quotefill_runner::{
    AlwaysReconfirm, BatchReport, CancelToken, Clock, PassError, PassRunner, SessionConfig,
    SessionOrchestrator, SessionPhase,
};

// ── Helpers ──────────────────────────────────────────────────────────

type Scripted = Result<BatchReport, PassError>;

#[derive(Default)]
struct ScriptedRunner {
    full: RefCell<VecDeque<Scripted>>,
    quote: RefCell<VecDeque<Scripted>>,
    calls: RefCell<Vec<AggregationMode>>,
    /// Raised on the n-th quote pass (1-based).
    cancel_on_quote: Option<(usize, CancelToken)>,
}

impl ScriptedRunner {
    fn quote_script(self, script: Vec<Scripted>) -> Self {
        *self.quote.borrow_mut() = script.into();
        self
    }

    fn full_script(self, script: Vec<Scripted>) -> Self {
        *self.full.borrow_mut() = script.into();
        self
    }

    fn count(&self, mode: AggregationMode) -> usize {
        self.calls.borrow().iter().filter(|m| **m == mode).count()
    }
}

impl PassRunner for ScriptedRunner {
    fn run_pass(
        &self,
        mode: AggregationMode,
        symbols: &[SymbolEntry],
        sink: &mut dyn RowSink,
    ) -> Result<BatchReport, PassError> {
        self.calls.borrow_mut().push(mode);
        let scripted = match mode {
            AggregationMode::Full => self.full.borrow_mut().pop_front(),
            AggregationMode::QuoteOnly => self.quote.borrow_mut().pop_front(),
        };
        if mode == AggregationMode::QuoteOnly {
            if let Some((n, token)) = &self.cancel_on_quote {
                if self.count(AggregationMode::QuoteOnly) == *n {
                    token.cancel();
                }
            }
        }
        let result = scripted.unwrap_or_else(|| Ok(BatchReport::default()));
        if result.is_ok() {
            for (i, entry) in symbols.iter().enumerate() {
                let record = Record::blank(entry.symbol.clone(), InstrumentKind::Unknown, ["date"]);
                sink.write_row(i + 2, &record).map_err(PassError::Sink)?;
            }
            sink.flush().map_err(PassError::Sink)?;
        }
        result
    }
}

struct ClockState {
    now: Cell<NaiveDateTime>,
    sleeps: RefCell<Vec<Duration>>,
}

#[derive(Clone)]
struct SimClock(Rc<ClockState>);

impl SimClock {
    fn at(h: u32, m: u32, s: u32) -> Self {
        let day = NaiveDate::from_ymd_opt(2024, 6, 18).unwrap();
        Self(Rc::new(ClockState {
            now: Cell::new(day.and_hms_opt(h, m, s).unwrap()),
            sleeps: RefCell::new(Vec::new()),
        }))
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.0.sleeps.borrow().clone()
    }
}

impl Clock for SimClock {
    fn now(&self) -> NaiveDateTime {
        self.0.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.0.sleeps.borrow_mut().push(duration);
        let next = self.0.now.get() + chrono::Duration::from_std(duration).unwrap();
        self.0.now.set(next);
    }
}

fn symbols() -> Vec<SymbolEntry> {
    SymbolEntry::parse_all(&["0050", "2317"]).unwrap()
}

fn connectivity() -> PassError {
    PassError::Connectivity {
        total: 2,
        cause: FetchError::Unreachable {
            url: "http://fixture/realtime".into(),
            reason: "connection refused".into(),
        },
    }
}

fn unknown(msg: &str) -> PassError {
    PassError::Other(msg.to_string())
}

// ── Polling loop ─────────────────────────────────────────────────────

#[test]
fn bdd_scenario_polling_stops_exactly_at_the_cutoff() {
    // GIVEN a clock 9 seconds before a 13:40 cutoff and a 3 second interval
    let clock = SimClock::at(13, 39, 51);
    let wb = MemoryWorkbook::new("data");
    let mut session =
        SessionOrchestrator::new(SessionConfig::default(), ScriptedRunner::default(), wb.clone(), clock.clone());

    // WHEN the session runs
    let report = session.run(&symbols()).unwrap();

    // THEN exactly three polls happen (13:39:51, :54, :57) before the cutoff
    let intraday = report.phase(SessionPhase::IntradayPolling).unwrap();
    assert_eq!(intraday.passes, 3);
    // AND the final snapshot is the only quote pass after it
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 4);
    assert_eq!(session.runner().count(AggregationMode::Full), 1);
    assert_eq!(session.phase(), SessionPhase::Done);
    assert!(!report.cancelled);
}

#[test]
fn bdd_scenario_no_polling_after_the_cutoff() {
    // GIVEN a session started after the close
    let clock = SimClock::at(14, 0, 0);
    let wb = MemoryWorkbook::new("data");
    let mut session =
        SessionOrchestrator::new(SessionConfig::default(), ScriptedRunner::default(), wb, clock.clone());

    // WHEN it runs
    let report = session.run(&symbols()).unwrap();

    // THEN the polling phase makes no attempts and never sleeps
    assert_eq!(report.phase(SessionPhase::IntradayPolling).unwrap().passes, 0);
    assert!(clock.sleeps().is_empty());
    assert_eq!(report.phases.len(), 4);
}

#[test]
fn bdd_scenario_every_phase_opens_and_releases_its_sink() {
    let wb = MemoryWorkbook::new("data");
    let mut session = SessionOrchestrator::new(
        SessionConfig::default(),
        ScriptedRunner::default(),
        wb.clone(),
        SimClock::at(13, 39, 57),
    );

    session.run(&symbols()).unwrap();

    assert_eq!(wb.opens(), 4);
    assert_eq!(wb.closes(), 4);
}

// ── Error budget ─────────────────────────────────────────────────────

#[test]
fn bdd_scenario_abort_follows_the_second_unknown_error_not_the_connectivity_error() {
    // GIVEN polling passes failing with connectivity, unknown, unknown
    let runner = ScriptedRunner::default().quote_script(vec![
        Err(connectivity()),
        Err(unknown("first")),
        Err(unknown("second")),
        Ok(BatchReport::default()),
    ]);
    let clock = SimClock::at(9, 0, 0);
    let wb = MemoryWorkbook::new("data");
    let mut session = SessionOrchestrator::new(SessionConfig::default(), runner, wb.clone(), clock.clone());

    // WHEN the session runs
    let abort = session.run(&symbols()).unwrap_err();

    // THEN it aborts during polling with the second unknown error attached
    assert_eq!(abort.phase, SessionPhase::IntradayPolling);
    assert_eq!(abort.cause, unknown("second"));
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 3);
    assert_eq!(session.budget().spent(), 2);
    // AND the connectivity failure backed off for 5s, the first unknown for 3s
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5), Duration::from_secs(3)]);
    // AND the polling sink was still released
    assert_eq!(wb.closes(), wb.opens());
}

#[test]
fn bdd_scenario_connectivity_errors_never_exhaust_the_budget() {
    // GIVEN ten connectivity failures in a row
    let runner = ScriptedRunner::default().quote_script((0..10).map(|_| Err(connectivity())).collect());
    let clock = SimClock::at(13, 39, 0);
    let mut session =
        SessionOrchestrator::new(SessionConfig::default(), runner, MemoryWorkbook::new("data"), clock);

    // WHEN the session runs
    let report = session.run(&symbols()).unwrap();

    // THEN polling continues with backoff until the cutoff
    let intraday = report.phase(SessionPhase::IntradayPolling).unwrap();
    // 10 backoffs of 5s reach 13:39:50, then polls at :50 :53 :56 :59
    assert_eq!(intraday.passes, 14);
    assert_eq!(intraday.failed_passes, 10);
    assert_eq!(session.budget().spent(), 0);
}

// ── Backfill ─────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_backfill_failure_is_fatal() {
    // GIVEN a backfill pass that loses its sink
    let runner = ScriptedRunner::default().full_script(vec![Err(PassError::Sink(SinkError::Io(
        "disk full".into(),
    )))]);
    let wb = MemoryWorkbook::new("data");
    let mut session = SessionOrchestrator::new(SessionConfig::default(), runner, wb.clone(), SimClock::at(9, 0, 0));

    // WHEN the session runs
    let abort = session.run(&symbols()).unwrap_err();

    // THEN no later phase is attempted
    assert_eq!(abort.phase, SessionPhase::HistoricalBackfill);
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 0);
    assert_eq!(wb.opens(), 1);
    assert_eq!(wb.closes(), 1);
    assert!(abort.to_string().contains("historical-backfill"));
}

#[test]
fn bdd_scenario_worker_abort_names_the_symbol() {
    let symbol = symbols()[1].symbol.clone();
    let runner = ScriptedRunner::default().full_script(vec![Err(PassError::Worker {
        symbol: symbol.clone(),
    })]);
    let mut session = SessionOrchestrator::new(
        SessionConfig::default(),
        runner,
        MemoryWorkbook::new("data"),
        SimClock::at(9, 0, 0),
    );

    let abort = session.run(&symbols()).unwrap_err();

    assert_eq!(abort.symbol, Some(symbol));
}

// ── Cancellation and reconfirmation ──────────────────────────────────

#[test]
fn bdd_scenario_cancel_exits_polling_and_skips_remaining_phases() {
    // GIVEN an operator who cancels during the second poll
    let token = CancelToken::new();
    let runner = ScriptedRunner {
        cancel_on_quote: Some((2, token.clone())),
        ..ScriptedRunner::default()
    };
    let wb = MemoryWorkbook::new("data");
    let mut session = SessionOrchestrator::new(SessionConfig::default(), runner, wb.clone(), SimClock::at(9, 0, 0))
        .with_cancel(token);

    // WHEN the session runs
    let report = session.run(&symbols()).unwrap();

    // THEN the in-flight poll completes and nothing follows
    assert!(report.cancelled);
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 2);
    assert!(report.phase(SessionPhase::FinalSnapshot).is_none());
    assert!(report.phase(SessionPhase::Classification).is_none());
    assert_eq!(session.phase(), SessionPhase::Done);
    // AND the polling sink was released
    assert_eq!(wb.opens(), 2);
    assert_eq!(wb.closes(), 2);
}

#[test]
fn bdd_scenario_reconfirmation_runs_one_extra_final_pass() {
    let mut session = SessionOrchestrator::new(
        SessionConfig::default(),
        ScriptedRunner::default(),
        MemoryWorkbook::new("data"),
        SimClock::at(15, 0, 0),
    )
    .with_reconfirm(AlwaysReconfirm);

    let report = session.run(&symbols()).unwrap();

    assert_eq!(report.phase(SessionPhase::FinalSnapshot).unwrap().passes, 2);
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 2);
}

#[test]
fn bdd_scenario_final_snapshot_errors_use_the_polling_budget() {
    // GIVEN a budget with one error left when the final snapshot fails
    let runner = ScriptedRunner::default().quote_script(vec![Err(unknown("late"))]);
    let config = SessionConfig {
        error_threshold: 1,
        ..SessionConfig::default()
    };
    let mut session =
        SessionOrchestrator::new(config, runner, MemoryWorkbook::new("data"), SimClock::at(15, 0, 0));

    // WHEN the session runs
    let abort = session.run(&symbols()).unwrap_err();

    // THEN the abort is attributed to the final snapshot
    assert_eq!(abort.phase, SessionPhase::FinalSnapshot);
}

#[test]
fn bdd_scenario_final_snapshot_retries_through_a_connectivity_blip() {
    // GIVEN a session past the cutoff whose first final pass cannot reach the hosts
    let runner = ScriptedRunner::default().quote_script(vec![Err(connectivity()), Ok(BatchReport::default())]);
    let clock = SimClock::at(15, 0, 0);
    let mut session =
        SessionOrchestrator::new(SessionConfig::default(), runner, MemoryWorkbook::new("data"), clock.clone());

    // WHEN the session runs
    let report = session.run(&symbols()).unwrap();

    // THEN the snapshot backs off once and is taken on the second attempt
    let last = report.phase(SessionPhase::FinalSnapshot).unwrap();
    assert_eq!(last.passes, 2);
    assert_eq!(last.failed_passes, 1);
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    // AND the budget is untouched and classification still runs
    assert_eq!(session.budget().spent(), 0);
    assert!(report.phase(SessionPhase::Classification).is_some());
}

#[test]
fn bdd_scenario_reconfirmation_also_retries_connectivity() {
    // GIVEN a reconfirming session whose second final pass hits an outage
    let runner = ScriptedRunner::default().quote_script(vec![
        Ok(BatchReport::default()),
        Err(connectivity()),
        Err(connectivity()),
        Ok(BatchReport::default()),
    ]);
    let clock = SimClock::at(15, 0, 0);
    let mut session =
        SessionOrchestrator::new(SessionConfig::default(), runner, MemoryWorkbook::new("data"), clock.clone())
            .with_reconfirm(AlwaysReconfirm);

    // WHEN the session runs
    let report = session.run(&symbols()).unwrap();

    // THEN the reconfirmation is retried until it gets through
    assert_eq!(report.phase(SessionPhase::FinalSnapshot).unwrap().passes, 4);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5), Duration::from_secs(5)]);
}

#[test]
fn bdd_scenario_cancel_stops_final_snapshot_retries() {
    // GIVEN an operator who cancels while the final snapshot is failing
    let token = CancelToken::new();
    let runner = ScriptedRunner {
        cancel_on_quote: Some((1, token.clone())),
        ..ScriptedRunner::default()
    }
    .quote_script(vec![Err(connectivity())]);
    let clock = SimClock::at(15, 0, 0);
    let wb = MemoryWorkbook::new("data");
    let mut session = SessionOrchestrator::new(SessionConfig::default(), runner, wb.clone(), clock.clone())
        .with_cancel(token);

    // WHEN the session runs
    let report = session.run(&symbols()).unwrap();

    // THEN no backoff is slept, no retry is made and classification is skipped
    assert!(report.cancelled);
    assert!(clock.sleeps().is_empty());
    assert_eq!(session.runner().count(AggregationMode::QuoteOnly), 1);
    assert!(report.phase(SessionPhase::Classification).is_none());
    assert_eq!(wb.opens(), wb.closes());
}

#[test]
fn bdd_scenario_custom_cutoff_from_config() {
    let config = SessionConfig {
        closing_cutoff: NaiveTime::from_hms_opt(9, 0, 6).unwrap(),
        ..SessionConfig::default()
    };
    let mut session = SessionOrchestrator::new(
        config,
        ScriptedRunner::default(),
        MemoryWorkbook::new("data"),
        SimClock::at(9, 0, 0),
    );

    let report = session.run(&symbols()).unwrap();

    assert_eq!(report.phase(SessionPhase::IntradayPolling).unwrap().passes, 2);
}
