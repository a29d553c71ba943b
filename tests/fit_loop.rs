//! Integration tests for the `fit` run loop
//!
//! Covers the step counter invariants, gradient accumulation, loss-scaler
//! skips, callback dispatch order and data iterator rebuilds.

mod common;

use ajustar::config::{SmoothingConfig, TrainerConfig};
use ajustar::data::VecDataSource;
use ajustar::engine::Module;
use ajustar::precision::Precision;
use ajustar::train::{Callback, EarlyStopping, MonitorMode, SmoothMetrics, Trainer};
use ajustar::Error;
use approx::assert_abs_diff_eq;
use common::*;
use proptest::prelude::*;
use std::sync::atomic::Ordering;

fn compiled(config: TrainerConfig, optimizer: CountingSgd) -> Trainer<Linear, f32> {
    let mut trainer = Trainer::new(Linear::new(0.0, 0.0)).with_config(config).unwrap();
    trainer.compile(mse, Some(Box::new(optimizer)), Vec::new(), Vec::new()).unwrap();
    trainer
}

fn quiet() -> TrainerConfig {
    TrainerConfig::default().with_smoothing(None)
}

// =============================================================================
// Step counters
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_global_step_ends_at_total_minus_one(
        batches in 1usize..7,
        accumulation in 1usize..4,
        epochs in 1usize..4,
    ) {
        let config = quiet().with_grad_accumulation(accumulation);
        let mut trainer = compiled(config, CountingSgd::new(0.0));
        let mut data = VecDataSource::new(ramp(batches));

        let history = trainer.fit(&mut data, None, epochs, Vec::new(), false).unwrap();

        let steps_per_epoch = batches.div_ceil(accumulation);
        prop_assert_eq!(trainer.state().steps_per_epoch, steps_per_epoch);
        prop_assert_eq!(history.steps().len(), epochs * steps_per_epoch);
        prop_assert_eq!(history.last_global_step(), Some(epochs * steps_per_epoch - 1));
        for record in history.steps() {
            prop_assert_eq!(
                record.global_step,
                record.epoch * steps_per_epoch + record.local_step
            );
        }
    }
}

// =============================================================================
// Gradient accumulation
// =============================================================================

#[test]
fn test_accumulation_logs_mean_loss() {
    let optimizer = CountingSgd::new(0.0);
    let updates = optimizer.counter();
    let mut trainer = compiled(quiet().with_grad_accumulation(2), optimizer);
    let mut data = VecDataSource::new(ramp(4));

    let history = trainer.fit(&mut data, None, 1, Vec::new(), false).unwrap();

    // untrained model predicts 0, so each micro-batch loss is y^2
    let losses = history.series("loss");
    assert_eq!(losses.len(), 2);
    assert_abs_diff_eq!(losses[0], (1.0 + 4.0) / 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses[1], (9.0 + 16.0) / 2.0, epsilon = 1e-6);
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[test]
fn test_accumulated_gradient_is_mean_of_micro_batches() {
    let mut trainer = compiled(quiet().with_grad_accumulation(2), CountingSgd::new(0.1));
    let mut data = VecDataSource::new(ramp(2));

    trainer.fit(&mut data, Some(1), 1, Vec::new(), false).unwrap();

    // dL/dw = dL/db = -2y at w = b = 0; mean over y = 1, 2 is -3
    let (w, b) = trainer.module().weights();
    assert_abs_diff_eq!(w, 0.3, epsilon = 1e-6);
    assert_abs_diff_eq!(b, 0.3, epsilon = 1e-6);
}

// =============================================================================
// Loss scaling
// =============================================================================

#[test]
fn test_scaler_skip_holds_schedulers() {
    let optimizer = CountingSgd::new(0.01);
    let updates = optimizer.counter();
    let scheduler = CountingScheduler::new(0.01);
    let scheduled = scheduler.counter();

    let config = quiet().with_precision(Precision::Fp16);
    let mut trainer = Trainer::new(Linear::new(0.0, 0.0)).with_config(config).unwrap();
    trainer.compile(mse, Some(Box::new(optimizer)), vec![Box::new(scheduler)], Vec::new()).unwrap();

    // infinite target overflows the scaled gradient on the first step
    let mut data = VecDataSource::new(vec![(1.0, f32::INFINITY), (1.0, 1.0), (1.0, 2.0)]);
    let history = trainer.fit(&mut data, None, 1, Vec::new(), false).unwrap();

    assert_eq!(history.steps().len(), 3);
    assert_eq!(updates.load(Ordering::SeqCst), 2);
    assert_eq!(scheduled.load(Ordering::SeqCst), 2);

    let engine = trainer.step_engine().unwrap();
    assert_eq!(engine.scaler().unwrap().scale(), 32768.0);
    assert_eq!(engine.schedulers()[0].last_step(), 2);
    let (w, b) = trainer.module().weights();
    assert!(w.is_finite() && b.is_finite());
}

// =============================================================================
// Callbacks
// =============================================================================

#[test]
fn test_user_callbacks_see_smoothed_logs_in_order() {
    let log = events();
    let first = Recorder::new("first", &log);
    let second = Recorder::new("second", &log);
    let seen = second.losses.clone();

    let mut trainer = compiled(quiet(), CountingSgd::new(0.0));
    let mut data = VecDataSource::new(ramp(2));
    let callbacks: Vec<Box<dyn Callback>> =
        vec![Box::new(first), Box::new(SmoothMetrics::new(10)), Box::new(second)];

    let history = trainer.fit(&mut data, None, 1, callbacks, false).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:batch_end@0", "second:batch_end@0", "first:batch_end@1", "second:batch_end@1"]
    );
    // smoother runs before both recorders, history observes the same values
    let seen = seen.lock().unwrap().clone();
    assert_abs_diff_eq!(seen[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(seen[1], 2.5, epsilon = 1e-6);
    assert_eq!(history.series("loss"), seen);
}

#[test]
fn test_smoothing_from_config_applies_without_user_smoother() {
    let config = TrainerConfig::default()
        .with_smoothing(Some(SmoothingConfig { interval: 2, ..Default::default() }));
    let mut trainer = compiled(config, CountingSgd::new(0.0));
    let mut data = VecDataSource::new(ramp(3));

    let history = trainer.fit(&mut data, None, 1, Vec::new(), false).unwrap();

    let losses = history.series("loss");
    assert_abs_diff_eq!(losses[1], 2.5, epsilon = 1e-6);
    // window reset after two steps
    assert_abs_diff_eq!(losses[2], 9.0, epsilon = 1e-6);
}

#[test]
fn test_early_stopping_on_flat_loss() {
    let mut trainer = compiled(quiet(), CountingSgd::new(0.0));
    let mut data = VecDataSource::new(ramp(2));
    let stop = EarlyStopping::new(2, 0.0).monitor("loss", MonitorMode::Min);

    let history = trainer.fit(&mut data, None, 10, vec![Box::new(stop)], false).unwrap();

    // first epoch sets the best value, two more without improvement
    assert_eq!(history.epochs().len(), 3);
    assert_eq!(history.last_global_step(), Some(5));
}

// =============================================================================
// Data iterator rebuilds
// =============================================================================

#[test]
fn test_dataloader_end_once_per_exhaustion() {
    let log = events();
    let mut trainer = compiled(quiet(), CountingSgd::new(0.0));
    let mut data = VecDataSource::new(ramp(2));

    trainer
        .fit(&mut data, Some(3), 2, vec![Box::new(Recorder::new("rec", &log))], false)
        .unwrap();

    assert_eq!(steps_of(&log, "rec", "dataloader_end"), vec![2, 4]);
    assert_eq!(steps_of(&log, "rec", "batch_end"), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_empty_source_fails_after_one_rebuild() {
    let log = events();
    let mut trainer = compiled(quiet(), CountingSgd::new(0.0));
    let mut data: VecDataSource<f32, f32> = VecDataSource::new(Vec::new());

    let err = trainer
        .fit(&mut data, Some(1), 1, vec![Box::new(Recorder::new("rec", &log))], false)
        .unwrap_err();

    assert!(matches!(err, Error::EmptyDataSource { global_step: 0 }));
    assert_eq!(steps_of(&log, "rec", "dataloader_end"), vec![0]);
}

#[test]
fn test_predict_switches_to_eval_mode() {
    let mut trainer = compiled(quiet(), CountingSgd::new(0.0));
    let mut data = VecDataSource::new(ramp(1));
    trainer.fit(&mut data, None, 1, Vec::new(), false).unwrap();
    assert!(trainer.module().is_training());

    let out = trainer.predict(&2.0).unwrap();
    assert_eq!(out.value, 0.0);
    assert!(!trainer.module().is_training());
}
