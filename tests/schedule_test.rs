//! Schedule Projector Integration Tests
//!
//! Projects schedules as jmwalletd reports them (7-element arrays) into
//! progress models.
//!
//! Run with: cargo test --test schedule_test -- --nocapture

use jam_sync::schedule::{
    project_schedule, Completion, Destination, DurationSummary, ScheduledTransaction, StepState,
    MIN_STEP_WIDTH_PERCENT,
};
use serde_json::json;

// ============================================================================
// Helper Functions
// ============================================================================

const WAITS: [f64; 8] = [363.52, 59.15, 59.89, 14.61, 47.85, 7.26, 220.48, 3.48];

fn entry(wait_minutes: f64, completed: bool) -> ScheduledTransaction {
    ScheduledTransaction {
        mixdepth: 0,
        amount_fraction: 0.5,
        counterparties: 9,
        destination: Destination::Internal,
        wait_minutes,
        rounding: 16,
        completion: if completed {
            Completion::Confirmed
        } else {
            Completion::Pending
        },
    }
}

fn raw_widths(schedule: &[ScheduledTransaction]) -> Vec<f64> {
    let total: f64 = schedule.iter().map(|tx| tx.wait_minutes * 60.0).sum();
    schedule
        .iter()
        .map(|tx| tx.wait_minutes * 60.0 / total * 100.0)
        .collect()
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_reported_schedule_projection() {
    let reported = json!([
        [0, 0.15, 9, "INTERNAL", 363.52, 16, 1],
        [1, 0.5748023323401029, 9, "INTERNAL", 59.15, 16, 1],
        [2, 0.3, 9, "INTERNAL", 59.89, 16, 1],
        [3, 0.2, 9, "INTERNAL", 14.61, 16, 1],
        [4, 0.0, 9, "INTERNAL", 47.85, 16, 1],
        [0, 0.2, 9, "bcrt1qxl6fwm3lrxtd0f3hzdz5nn2tp6m6mdwhgrvlk4", 7.26, 16, 1],
        [1, 0.0, 9, "bcrt1qm4dnk3l3kr4w9mz0mqpxx2z6gk5f3n4x0ncfmr", 220.48, 16, 1],
        [2, 0.0, 9, "bcrt1q0xnvs6qzjm3ht0wnqc3m5l8ymhv2hk6fq0tmxk", 3.48, 16, 1]
    ]);
    let schedule: Vec<ScheduledTransaction> = serde_json::from_value(reported).unwrap();

    let model = project_schedule(&schedule);

    assert_eq!(model.completed_count, 8);
    assert_eq!(model.steps.len(), 8);
    let expected_total: f64 = WAITS.iter().sum::<f64>() * 60.0;
    assert_close(model.total_wait_seconds, expected_total);

    for (step, raw) in model.steps.iter().zip(raw_widths(&schedule)) {
        assert_close(step.width_percent, raw.max(MIN_STEP_WIDTH_PERCENT));
        assert_eq!(step.state, StepState::Complete);
    }

    // 363.52 of 776.24 minutes
    assert_close(model.steps[0].width_percent, 363.52 / 776.24 * 100.0);
    // 3.48 minutes is well under the floor
    assert_close(model.steps[7].width_percent, MIN_STEP_WIDTH_PERCENT);
    assert_eq!(model.active_index(), None);
    assert_eq!(model.duration_summary(), DurationSummary::Hours(13));
}

#[test]
fn test_raw_widths_sum_to_hundred() {
    let schedules: Vec<Vec<f64>> = vec![
        WAITS.to_vec(),
        vec![1.0],
        vec![0.5, 0.5],
        vec![1000.0, 0.01, 0.01],
        vec![0.0, 5.0, 0.0, 12.5],
    ];

    for waits in schedules {
        let schedule: Vec<_> = waits.iter().map(|w| entry(*w, false)).collect();
        let model = project_schedule(&schedule);

        let sum: f64 = raw_widths(&schedule).iter().sum();
        assert!((sum - 100.0).abs() < 1e-6, "raw widths sum to {}", sum);
        assert!(model
            .steps
            .iter()
            .all(|step| step.width_percent >= MIN_STEP_WIDTH_PERCENT));
    }
}

#[test]
fn test_floors_are_not_renormalized() {
    let schedule = vec![entry(1000.0, false), entry(0.01, false), entry(0.01, false)];
    let model = project_schedule(&schedule);

    let total: f64 = model.steps.iter().map(|s| s.width_percent).sum();
    assert!(total > 100.0);
    assert_eq!(model.steps[1].width_percent, MIN_STEP_WIDTH_PERCENT);
}

#[test]
fn test_single_entry_takes_full_width() {
    let model = project_schedule(&[entry(42.0, false)]);
    assert_close(model.steps[0].width_percent, 100.0);
    assert_eq!(model.steps[0].state, StepState::Active);
    assert_eq!(model.active_index(), Some(0));
}

#[test]
fn test_zero_wait_schedule_uses_floor() {
    let schedule = vec![entry(0.0, true), entry(0.0, false), entry(0.0, false)];
    let model = project_schedule(&schedule);

    assert_eq!(model.total_wait_seconds, 0.0);
    assert!(model
        .steps
        .iter()
        .all(|step| step.width_percent == MIN_STEP_WIDTH_PERCENT));
    assert_eq!(model.duration_summary(), DurationSummary::Seconds(0));
}

#[test]
fn test_completed_count_over_permutations() {
    // Every completion pattern of a 5-entry schedule
    for mask in 0u32..32 {
        let schedule: Vec<_> = (0..5)
            .map(|i| entry(10.0, mask & (1 << i) != 0))
            .collect();
        let model = project_schedule(&schedule);
        assert_eq!(model.completed_count, mask.count_ones() as usize);
    }
}

#[test]
fn test_broadcast_transaction_is_not_completed() {
    let reported = json!([
        [0, 0.1, 9, "INTERNAL", 1.5, 16, 1],
        [1, 0.2, 9, "INTERNAL", 2.5, 16,
         "d2e6e47ad8d2d4bdb6a7e5c23b1b5f8e1b3b5a1a6c6a0e8b9c1f2a3d4e5f6a7b"],
        [2, 0.0, 9, "INTERNAL", 3.5, 16, 0]
    ]);
    let schedule: Vec<ScheduledTransaction> = serde_json::from_value(reported).unwrap();
    assert!(matches!(schedule[1].completion, Completion::Broadcast(_)));

    let model = project_schedule(&schedule);
    assert_eq!(model.completed_count, 1);
    let states: Vec<_> = model.steps.iter().map(|s| s.state).collect();
    assert_eq!(
        states,
        vec![StepState::Complete, StepState::Active, StepState::Pending]
    );
    // 7.5 minutes
    assert_eq!(model.duration_summary(), DurationSummary::Seconds(450));
}

#[test]
fn test_invalid_completion_flag_rejected() {
    let reported = json!([[0, 0.1, 9, "INTERNAL", 1.5, 16, 2]]);
    assert!(serde_json::from_value::<Vec<ScheduledTransaction>>(reported).is_err());
}
