use ccre_core::{BehaviorArbitrator, BooleanCell, Output, Scheduler, NANOS_PER_MILLI};
use ccre_env::{TimeSource, VirtualClock};
use ccre_sim::scenarios::ScenarioId;
use ccre_sim::ScenarioRunner;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn one_shots_fire_in_deadline_order(deadlines in prop::collection::vec(0u64..200, 1..40)) {
        let clock = VirtualClock::shared();
        let scheduler = Scheduler::driven_by(&clock).unwrap();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for (i, &at) in deadlines.iter().enumerate() {
            let (fired, job_clock) = (fired.clone(), clock.clone());
            scheduler
                .schedule_once(&format!("job{}", i), at * NANOS_PER_MILLI, move || {
                    fired.lock().push((at, i, job_clock.now_millis()));
                })
                .unwrap();
        }
        clock.advance_millis(250);

        let fired = fired.lock().clone();
        prop_assert_eq!(fired.len(), deadlines.len());
        for window in fired.windows(2) {
            // Non-decreasing deadlines; ties keep submission order.
            prop_assert!((window[0].0, window[0].1) < (window[1].0, window[1].1));
        }
        for (deadline, _, at) in &fired {
            prop_assert!(at >= deadline);
        }
    }

    #[test]
    fn highest_requester_is_active(requests in prop::collection::vec(any::<bool>(), 1..12)) {
        let arbitrator = BehaviorArbitrator::new("Prop").unwrap();
        let cells: Vec<BooleanCell> = (0..requests.len()).map(|_| BooleanCell::new(false)).collect();
        for (i, cell) in cells.iter().enumerate() {
            arbitrator.add_behavior(&format!("b{}", i), cell.as_input()).unwrap();
        }
        for (cell, &on) in cells.iter().zip(&requests) {
            cell.set(on);
        }

        let expected = requests.iter().rposition(|&on| on);
        prop_assert_eq!(arbitrator.active().map(|b| b.index()), expected);
    }

    #[test]
    fn arbitration_scenarios_pass_for_any_seed(seed in 1u64..10_000) {
        let runner = ScenarioRunner::new(seed).with_duration(400);
        for scenario in [ScenarioId::PriorityLadder, ScenarioId::OverrideTracking] {
            let result = runner.run(scenario);
            prop_assert!(result.passed, "{} seed={}: {:?}", scenario, seed, result.failure_reason);
        }
    }

    #[test]
    fn variable_spacing_holds_for_any_seed(seed in 1u64..10_000, tick in 5u64..40) {
        let result = ScenarioRunner::new(seed)
            .with_tick(tick)
            .with_duration(tick * 30)
            .run(ScenarioId::VariableSpacing);
        prop_assert!(result.passed, "seed={} tick={}: {:?}", seed, tick, result.failure_reason);
    }
}
