//! Scenario runner - executes deterministic scheduling and arbitration scenarios.

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::SimError;
use crate::scenarios::ScenarioId;

use ccre_core::channel::{ChannelValue, FloatCell};
use ccre_core::{
    Behavior, BehaviorArbitrator, BehaviorStatus, BooleanCell, EventOutput, Input, Output,
    NANOS_PER_MILLI,
};
use ccre_env::{TimeSource, VirtualClock};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Control ticks (or job runs) executed
    pub total_ticks: u64,

    /// Final virtual time in milliseconds
    pub final_time_millis: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn errored(scenario: ScenarioId, seed: u64, error: SimError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_ticks: 0,
            final_time_millis: 0,
            failure_reason: Some(format!("setup failed: {}", error)),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Assertions evaluated
    pub checks: u64,

    /// Active-behavior transitions observed
    pub transitions: u64,

    /// Scheduled job runs
    pub jobs_run: u64,

    /// Fixed-rate periods dropped by skippable jobs
    pub periods_skipped: u64,
}

/// Collects assertion outcomes, keeping the first failure.
#[derive(Debug, Default)]
struct Verdict {
    checks: u64,
    failure: Option<String>,
}

impl Verdict {
    fn check(&mut self, ok: bool, describe: impl FnOnce() -> String) {
        self.checks += 1;
        if !ok && self.failure.is_none() {
            let reason = describe();
            warn!("Check failed: {}", reason);
            self.failure = Some(reason);
        }
    }

    fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a runner with default settings and the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            config: SimConfig {
                seed,
                ..Default::default()
            },
        }
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the virtual duration.
    pub fn with_duration(mut self, millis: u64) -> Self {
        self.config.duration_millis = millis;
        self
    }

    /// Sets the control-loop period.
    pub fn with_tick(mut self, millis: u64) -> Self {
        self.config.tick_millis = millis;
        self
    }

    /// Sets the number of behaviors in arbitration scenarios.
    pub fn with_behaviors(mut self, count: usize) -> Self {
        self.config.behaviors = count;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let outcome = self.config.validate().and_then(|()| match scenario {
            ScenarioId::PriorityLadder => self.run_priority_ladder(),
            ScenarioId::OverrideTracking => self.run_override_tracking(),
            ScenarioId::OverloadSkip => self.run_overload_skip(),
            ScenarioId::VariableSpacing => self.run_variable_spacing(),
            ScenarioId::DriveModes => self.run_drive_modes(),
        });

        outcome.unwrap_or_else(|error| ScenarioResult::errored(scenario, self.config.seed, error))
    }

    fn finish(
        &self,
        scenario: ScenarioId,
        ctx: &SimContext,
        total_ticks: u64,
        verdict: Verdict,
        mut metrics: ScenarioMetrics,
    ) -> ScenarioResult {
        metrics.checks = verdict.checks;
        ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: verdict.passed(),
            total_ticks,
            final_time_millis: ctx.now_millis(),
            failure_reason: verdict.failure,
            metrics,
        }
    }

    /// SIM-001: PriorityLadder - random request toggles.
    ///
    /// **Assertion**: after every toggle the active behavior is the
    /// highest-index requester, and the table shows exactly one active row.
    fn run_priority_ladder(&self) -> Result<ScenarioResult, SimError> {
        info!("SIM-001: PriorityLadder - highest requester wins");

        let ctx = SimContext::new(self.config.seed)?;
        let arbitrator = BehaviorArbitrator::new("Ladder")?;
        let mut requests = Vec::with_capacity(self.config.behaviors);
        for i in 0..self.config.behaviors {
            let request = BooleanCell::new(false);
            arbitrator.add_behavior(&format!("rung_{}", i), request.as_input())?;
            requests.push(request);
        }

        let transitions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&transitions);
        arbitrator.on_active_changed(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut verdict = Verdict::default();
        let ticks = self.config.ticks();
        for tick in 0..ticks {
            let rung = ctx.pick(requests.len());
            requests[rung].toggle();

            let expected = requests.iter().rposition(|r| r.get());
            let actual = arbitrator.active().map(|b| b.index());
            verdict.check(actual == expected, || {
                format!("tick {}: active {:?}, expected {:?}", tick, actual, expected)
            });

            let active_rows = arbitrator
                .behaviors()
                .iter()
                .filter(|b| arbitrator.status(b).ok() == Some(BehaviorStatus::Active))
                .count();
            verdict.check(active_rows == usize::from(expected.is_some()), || {
                format!("tick {}: {} active rows", tick, active_rows)
            });

            ctx.advance_millis(self.config.tick_millis);
        }

        debug!("Final table:\n{}", arbitrator.table());
        let metrics = ScenarioMetrics {
            transitions: transitions.load(Ordering::SeqCst),
            ..Default::default()
        };
        info!(
            "✓ PriorityLadder complete: {} ticks, {} transitions",
            ticks, metrics.transitions
        );
        Ok(self.finish(ScenarioId::PriorityLadder, &ctx, ticks, verdict, metrics))
    }

    /// SIM-002: OverrideTracking - arbitrated float with per-behavior overrides.
    ///
    /// Even-indexed behaviors carry an override; odd ones fall back to the
    /// default. Each tick either toggles a request or moves a source.
    /// **Assertion**: the terminal always reads the authoritative source.
    fn run_override_tracking(&self) -> Result<ScenarioResult, SimError> {
        info!("SIM-002: OverrideTracking - terminal follows the authoritative source");

        let ctx = SimContext::new(self.config.seed)?;
        let arbitrator = BehaviorArbitrator::new("Tracking")?;
        let default = FloatCell::new(0.0);
        let channel = arbitrator.arbitrate(default.as_input());

        let mut requests = Vec::new();
        let mut overrides: Vec<Option<FloatCell>> = Vec::new();
        for i in 0..self.config.behaviors {
            let request = BooleanCell::new(false);
            let behavior = arbitrator.add_behavior(&format!("mode_{}", i), request.as_input())?;
            let source = if i % 2 == 0 {
                let source = FloatCell::new(ctx.axis());
                channel.attach(&behavior, source.as_input())?;
                Some(source)
            } else {
                None
            };
            requests.push(request);
            overrides.push(source);
        }

        let mut verdict = Verdict::default();
        let ticks = self.config.ticks();
        for tick in 0..ticks {
            if ctx.chance(0.4) {
                requests[ctx.pick(requests.len())].toggle();
            } else {
                match &overrides[ctx.pick(overrides.len())] {
                    Some(source) => source.set(ctx.axis()),
                    None => default.set(ctx.axis()),
                }
            }

            let expected = arbitrator
                .active()
                .and_then(|b| overrides[b.index()].as_ref().map(|s| s.get()))
                .unwrap_or_else(|| default.get());
            let actual = channel.get();
            verdict.check(actual.same_as(&expected), || {
                format!("tick {}: terminal {} but source reads {}", tick, actual, expected)
            });

            ctx.advance_millis(self.config.tick_millis);
        }

        info!(
            "✓ OverrideTracking complete: {} ticks, {} overrides",
            ticks,
            channel.override_count()
        );
        Ok(self.finish(
            ScenarioId::OverrideTracking,
            &ctx,
            ticks,
            verdict,
            ScenarioMetrics::default(),
        ))
    }

    /// SIM-003: OverloadSkip - fixed-rate jobs whose run time exceeds the period.
    ///
    /// The same overrunning job runs once skippable and once strict, each on
    /// its own virtual clock.
    /// **Assertion**: skippable deadlines stay on the grid just ahead of the
    /// last start; strict deadlines advance by exactly one period per run.
    fn run_overload_skip(&self) -> Result<ScenarioResult, SimError> {
        info!("SIM-003: OverloadSkip - skip vs strict fixed-rate");

        let period = self.config.tick_millis;
        let seed_ctx = SimContext::new(self.config.seed)?;
        let run_time = period + seed_ctx.below(1, 2 * period + 1);
        debug!("  period={}ms run_time={}ms", period, run_time);

        let mut verdict = Verdict::default();
        let mut metrics = ScenarioMetrics::default();

        let skip = self.overrun(true, run_time)?;
        let strict = self.overrun(false, run_time)?;

        for (label, trace) in [("skippable", &skip), ("strict", &strict)] {
            verdict.check(trace.starts.len() >= 2, || {
                format!("{}: only {} runs", label, trace.starts.len())
            });
            verdict.check(trace.starts.first() == Some(&period), || {
                format!("{}: first start {:?}", label, trace.starts.first())
            });
            for pair in trace.starts.windows(2) {
                verdict.check(pair[1] - pair[0] == run_time, || {
                    format!("{}: starts {} -> {} not {}ms apart", label, pair[0], pair[1], run_time)
                });
            }
        }

        let last_start = skip.starts.last().copied().unwrap_or(0);
        verdict.check(skip.pending % period == 0, || {
            format!("skippable: pending deadline {} off the {}ms grid", skip.pending, period)
        });
        verdict.check(skip.pending >= last_start && skip.pending < last_start + period, || {
            format!(
                "skippable: pending deadline {} not within one period after {}",
                skip.pending, last_start
            )
        });

        let strict_runs = strict.starts.len() as u64;
        verdict.check(strict.pending == period * (strict_runs + 1), || {
            format!(
                "strict: pending deadline {} after {} runs of {}ms",
                strict.pending, strict_runs, period
            )
        });
        verdict.check(strict.pending < strict.final_millis, || {
            format!("strict: pending {} should lag final time {}", strict.pending, strict.final_millis)
        });

        let skipped_slots = (skip.pending / period).saturating_sub(1);
        metrics.periods_skipped = skipped_slots.saturating_sub(skip.starts.len() as u64);
        metrics.jobs_run = skip.starts.len() as u64 + strict_runs;
        verdict.check(metrics.periods_skipped > 0, || "skippable job never skipped".to_string());

        info!(
            "✓ OverloadSkip complete: skippable {} runs ({} skipped), strict {} runs",
            skip.starts.len(),
            metrics.periods_skipped,
            strict_runs
        );
        let total = metrics.jobs_run;
        let mut result = self.finish(ScenarioId::OverloadSkip, &seed_ctx, total, verdict, metrics);
        result.final_time_millis = skip.final_millis.max(strict.final_millis);
        Ok(result)
    }

    /// Runs one overrunning fixed-rate job for the configured duration.
    fn overrun(&self, skippable: bool, run_time: u64) -> Result<OverrunTrace, SimError> {
        let ctx = SimContext::new(self.config.seed)?;
        let period = self.config.tick_millis;
        let clock: Arc<VirtualClock> = Arc::clone(ctx.runtime().time());
        let starts = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&starts);
        let job_clock = Arc::clone(&clock);
        ctx.runtime().scheduler().schedule_fixed_rate(
            if skippable { "overrun-skip" } else { "overrun-strict" },
            period * NANOS_PER_MILLI,
            period * NANOS_PER_MILLI,
            skippable,
            move || {
                log.lock().push(job_clock.now_millis());
                job_clock.sleep_for(run_time);
            },
        )?;

        ctx.advance_millis(self.config.duration_millis);

        let pending = ctx
            .runtime()
            .scheduler()
            .snapshot()
            .first()
            .map_or(0, |job| job.deadline_nanos / NANOS_PER_MILLI);
        let starts = starts.lock().clone();
        Ok(OverrunTrace {
            starts,
            pending,
            final_millis: ctx.now_millis(),
        })
    }

    /// SIM-004: VariableSpacing - variable-rate job with random run durations.
    ///
    /// **Assertion**: every gap from the end of one run to the start of the
    /// next equals the period.
    fn run_variable_spacing(&self) -> Result<ScenarioResult, SimError> {
        info!("SIM-004: VariableSpacing - exact gaps after each run");

        let ctx = SimContext::new(self.config.seed)?;
        let period = self.config.tick_millis;
        let clock: Arc<VirtualClock> = Arc::clone(ctx.runtime().time());
        let spans = Arc::new(Mutex::new(Vec::<(u64, u64)>::new()));
        let rng = Mutex::new(ChaCha8Rng::seed_from_u64(self.config.seed ^ 0x5eed));

        let log = Arc::clone(&spans);
        let job_clock = Arc::clone(&clock);
        ctx.runtime()
            .scheduler()
            .schedule_variable_rate("variable", period * NANOS_PER_MILLI, move || {
                let start = job_clock.now_millis();
                let busy = rng.lock().gen_range(0..=2 * period);
                job_clock.sleep_for(busy);
                log.lock().push((start, job_clock.now_millis()));
            })?;

        ctx.advance_millis(self.config.duration_millis);

        let spans = spans.lock().clone();
        let mut verdict = Verdict::default();
        verdict.check(spans.len() >= 2, || format!("only {} runs", spans.len()));
        verdict.check(spans.first().map(|s| s.0) == Some(period), || {
            format!("first run at {:?}, expected {}", spans.first(), period)
        });
        for pair in spans.windows(2) {
            let gap = pair[1].0 - pair[0].1;
            verdict.check(gap == period, || {
                format!("run ended {} and next started {} ({}ms gap)", pair[0].1, pair[1].0, gap)
            });
        }

        let metrics = ScenarioMetrics {
            jobs_run: spans.len() as u64,
            ..Default::default()
        };
        info!("✓ VariableSpacing complete: {} runs", metrics.jobs_run);
        Ok(self.finish(
            ScenarioId::VariableSpacing,
            &ctx,
            metrics.jobs_run,
            verdict,
            metrics,
        ))
    }

    /// SIM-005: DriveModes - Auto and Teleop competing for drive speed.
    ///
    /// A mode timeline turns Auto on, Teleop on, Teleop off, Auto off at the
    /// quarter marks. A joystick job moves the stick every tick and a control
    /// job checks the arbitrated speed.
    /// **Assertion**: speed reads the joystick under Teleop, the auto routine
    /// under Auto, and 0.0 otherwise; exactly four transitions occur.
    fn run_drive_modes(&self) -> Result<ScenarioResult, SimError> {
        info!("SIM-005: DriveModes - Drive / Auto / Teleop");

        let ctx = SimContext::new(self.config.seed)?;
        let runtime = ctx.runtime();
        let scheduler = runtime.scheduler();
        let duration = self.config.duration_millis;

        let drive = BehaviorArbitrator::new("Drive")?;
        let auto_request = BooleanCell::new(false);
        let teleop_request = BooleanCell::new(false);
        let auto = drive.add_behavior("Auto", auto_request.as_input())?;
        let teleop = drive.add_behavior("Teleop", teleop_request.as_input())?;

        let speed = drive.add_float(0.0);
        let auto_speed = FloatCell::new(0.5);
        let joystick = FloatCell::new(0.0);
        speed.attach(&auto, auto_speed.as_input())?;
        speed.attach(&teleop, joystick.as_input())?;

        let transitions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&transitions);
        drive.on_active_changed(Arc::new(move |active: Option<Behavior>| {
            debug!("  mode -> {:?}", active.as_ref().map(|b| b.name().to_string()));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let timeline = [
            (duration / 4, "auto-on", auto_request.set_event(true)),
            (duration / 2, "teleop-on", teleop_request.set_event(true)),
            (duration * 3 / 4, "teleop-off", teleop_request.set_event(false)),
            (duration * 9 / 10, "auto-off", auto_request.set_event(false)),
        ];
        for (at, tag, step) in timeline {
            scheduler.schedule_once(tag, runtime.after_millis(at), move || step.event())?;
        }

        let stick = joystick.clone();
        let rng = Mutex::new(ChaCha8Rng::seed_from_u64(self.config.seed));
        runtime.every_millis("joystick", self.config.tick_millis, move || {
            stick.set(rng.lock().gen_range(-1.0f32..1.0));
        })?;

        let control_ticks = Arc::new(AtomicU64::new(0));
        let mismatches = Arc::new(Mutex::new(Vec::<String>::new()));
        {
            let (speed, auto_speed, joystick) = (speed.clone(), auto_speed.clone(), joystick.clone());
            let (auto_request, teleop_request) = (auto_request.clone(), teleop_request.clone());
            let (ticks, mismatches) = (Arc::clone(&control_ticks), Arc::clone(&mismatches));
            runtime.every_millis("control", self.config.tick_millis, move || {
                let tick = ticks.fetch_add(1, Ordering::SeqCst);
                let expected = if teleop_request.get() {
                    joystick.get()
                } else if auto_request.get() {
                    auto_speed.get()
                } else {
                    0.0
                };
                let actual = speed.get();
                if !actual.same_as(&expected) {
                    mismatches
                        .lock()
                        .push(format!("tick {}: speed {} expected {}", tick, actual, expected));
                }
            })?;
        }

        ctx.advance_millis(duration);

        let mut verdict = Verdict::default();
        let mismatches = mismatches.lock().clone();
        verdict.check(mismatches.is_empty(), || {
            format!("{} mismatches, first: {}", mismatches.len(), mismatches[0])
        });
        let transitions = transitions.load(Ordering::SeqCst);
        verdict.check(transitions == 4, || format!("{} transitions, expected 4", transitions));
        verdict.check(drive.active().is_none(), || "a mode is still active".to_string());
        let ticks = control_ticks.load(Ordering::SeqCst);
        verdict.check(ticks == self.config.ticks(), || {
            format!("{} control ticks, expected {}", ticks, self.config.ticks())
        });

        let metrics = ScenarioMetrics {
            transitions,
            jobs_run: ticks,
            ..Default::default()
        };
        info!("✓ DriveModes complete: {} control ticks", ticks);
        Ok(self.finish(ScenarioId::DriveModes, &ctx, ticks, verdict, metrics))
    }
}

/// Start times and final queue state of one overrun run.
struct OverrunTrace {
    starts: Vec<u64>,
    pending: u64,
    final_millis: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_passes_with_defaults() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        let a = ScenarioRunner::new(7).run(ScenarioId::PriorityLadder);
        let b = ScenarioRunner::new(7).run(ScenarioId::PriorityLadder);
        assert_eq!(a.metrics.transitions, b.metrics.transitions);
        assert_eq!(a.final_time_millis, b.final_time_millis);
    }

    #[test]
    fn test_invalid_config_fails_cleanly() {
        let result = ScenarioRunner::new(1).with_tick(0).run(ScenarioId::DriveModes);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("tick_millis"));
    }

    #[test]
    fn test_drive_modes_counts_ticks() {
        let result = ScenarioRunner::new(3)
            .with_duration(1_000)
            .with_tick(20)
            .run(ScenarioId::DriveModes);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 50);
        assert_eq!(result.metrics.transitions, 4);
    }

    #[test]
    fn test_overload_reports_skips() {
        let result = ScenarioRunner::new(11)
            .with_duration(500)
            .with_tick(10)
            .run(ScenarioId::OverloadSkip);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.periods_skipped > 0);
    }
}
