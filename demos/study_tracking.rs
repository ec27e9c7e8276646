//! Study Tracking Example
//!
//! Runs a small grid search over `(x - 2)^2`, recording every trial as a
//! nested run under one study run. Trials with x >= 3 are pruned.
//!
//! Run with: cargo run --example study_tracking
//! Set RUST_LOG=trueno_track=debug to see the tracking calls.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use trueno_track::experiment::{MemoryTrackingStore, RunStatus};
use trueno_track::study::{Distribution, Study, StudyDirection, Trial};
use trueno_track::{StudyCallback, TrialTracker};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Trueno-Track Study Tracking ===\n");

    let store = Arc::new(MemoryTrackingStore::new());
    let study = Study::new("quadratic", StudyDirection::Minimize).with_user_attr("owner", "demo");

    // -------------------------------------------------------------------------
    // 1. Open the study run that trial runs nest under
    // -------------------------------------------------------------------------
    let study_run = TrialTracker::new(store.clone()).start_study_run(&study)?;
    println!("1. Study run: {}", study_run.run_id());

    let tracker = TrialTracker::builder(store.clone())
        .metric_name("loss")
        .nest_trials(true)
        .tag_study_user_attrs(true)
        .parent_run_id(study_run.run_id())
        .build();

    // -------------------------------------------------------------------------
    // 2. Evaluate trials, logging extra metrics from inside the objective
    // -------------------------------------------------------------------------
    println!("\n2. Running trials...");
    let distribution = Distribution::Uniform {
        low: -5.0,
        high: 5.0,
    };

    for number in 0..9u64 {
        let x = -4.0 + number as f64;
        let mut trial = Trial::new(number);

        let loss = tracker.track_objective(&study, &mut trial, |trial, run| {
            trial.set_param("x", x, distribution.clone());
            run.log_metric_at("distance", (x - 2.0).abs(), 0)?;
            anyhow::Ok((x - 2.0).powi(2))
        })?;

        if x >= 3.0 {
            trial.prune();
        } else {
            trial.complete(loss);
        }
        tracker.on_trial_complete(&study, &trial)?;
        println!("   trial {number}: x = {x:>4.1}, state = {}", trial.state().as_str());
    }

    study_run.end(RunStatus::Finished)?;

    // -------------------------------------------------------------------------
    // 3. Inspect what was recorded
    // -------------------------------------------------------------------------
    println!("\n3. Recorded runs:");
    let experiment = store
        .experiment_by_name(study.name())
        .ok_or_else(|| anyhow::anyhow!("experiment was not created"))?;

    for run in store.runs_for_experiment(experiment.experiment_id()) {
        let loss = store
            .metrics_for_run(run.run_id(), "loss")
            .first()
            .map(|m| m.value());
        println!(
            "   {:<10} status={:<8} nested={:<5} loss={:?} tags={}",
            run.run_name(),
            run.status(),
            run.parent_run_id().is_some(),
            loss,
            run.tags().len(),
        );
    }

    println!("\n=== Done: {} runs in '{}' ===", store.run_count(), study.name());
    Ok(())
}
