//! End-to-end tests for trial tracking against the in-memory backend.

use std::sync::Arc;

use rayon::prelude::*;
use trueno_track::experiment::{MemoryTrackingStore, RunStatus, TrackingClient};
use trueno_track::study::{Distribution, Study, StudyDirection, Trial};
use trueno_track::{
    Error, StudyCallback, TrackerConfig, TrialTracker, RUN_ID_ATTRIBUTE_KEY,
};

fn uniform() -> Distribution {
    Distribution::Uniform {
        low: -10.0,
        high: 10.0,
    }
}

// =============================================================================
// record()
// =============================================================================

#[test]
fn test_record_end_to_end() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());

    let study = Study::new("s1", StudyDirection::Minimize);
    let mut trial = Trial::new(3).with_param("x", 1.5, uniform());
    trial.complete(4.0);

    tracker.record(&study, &trial).unwrap();

    let experiment = store.experiment_by_name("s1").expect("experiment created");
    let runs = store.runs_for_experiment(experiment.experiment_id());
    assert_eq!(runs.len(), 1);

    let run = &runs[0];
    assert_eq!(run.run_name(), "3");
    assert_eq!(run.status(), RunStatus::Finished);
    assert_eq!(run.params()["x"], "1.5");
    assert_eq!(run.tags()["number"], "3");
    assert_eq!(run.tags()["direction"], "MINIMIZE");
    assert_eq!(run.tags()["state"], "COMPLETE");
    assert_eq!(
        run.tags()["x_distribution"],
        "UniformDistribution(high=10.0, low=-10.0)"
    );

    let metrics = store.metrics_for_run(run.run_id(), "value");
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].value(), 4.0);
}

#[test]
fn test_default_config_runs_are_readable() {
    let config = TrackerConfig::default();
    let backend = config.backend().unwrap();
    let store = backend.memory_store().expect("default backend is local").clone();
    let tracker = TrialTracker::from_config_with(&config, backend.client());

    let study = Study::new("s1", StudyDirection::Minimize);
    let mut trial = Trial::new(3).with_param("x", 1.5, uniform());
    trial.complete(4.0);
    tracker.record(&study, &trial).unwrap();

    let experiment = store.experiment_by_name("s1").expect("experiment created");
    let runs = store.runs_for_experiment(experiment.experiment_id());
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_name(), "3");
    assert_eq!(runs[0].params()["x"], "1.5");
    assert_eq!(store.metrics_for_run(runs[0].run_id(), "value")[0].value(), 4.0);
    assert_eq!(tracker.metric_name(), "value");
}

#[test]
fn test_record_one_run_per_trial() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Maximize);

    for number in 0..5 {
        let mut trial = Trial::new(number);
        trial.complete(number as f64);
        tracker.record(&study, &trial).unwrap();
    }

    assert_eq!(store.experiment_count(), 1);
    assert_eq!(store.run_count(), 5);
}

#[test]
fn test_pruned_trial_without_value_logs_nan() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Minimize);

    let mut trial = Trial::new(0);
    trial.prune();
    tracker.record(&study, &trial).unwrap();

    let exp = store.experiment_by_name("s1").unwrap();
    let run = &store.runs_for_experiment(exp.experiment_id())[0];
    assert!(store.metrics_for_run(run.run_id(), "value")[0]
        .value()
        .is_nan());
    assert_eq!(run.tags()["state"], "PRUNED");
}

#[test]
fn test_custom_metric_name() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::builder(store.clone())
        .metric_name("my metric score")
        .build();
    let study = Study::new("s1", StudyDirection::Minimize);
    let mut trial = Trial::new(0);
    trial.complete(0.5);

    tracker.on_trial_complete(&study, &trial).unwrap();

    let exp = store.experiment_by_name("s1").unwrap();
    let run = &store.runs_for_experiment(exp.experiment_id())[0];
    assert_eq!(store.metrics_for_run(run.run_id(), "my metric score").len(), 1);
    assert!(store.metrics_for_run(run.run_id(), "value").is_empty());
}

#[test]
fn test_study_user_attrs_win_when_enabled() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::builder(store.clone())
        .tag_study_user_attrs(true)
        .build();
    let study = Study::new("s1", StudyDirection::Minimize)
        .with_user_attr("x_distribution", "from-study")
        .with_user_attr("dataset", "mnist");

    let mut trial = Trial::new(0).with_param("x", 1.0, uniform());
    trial.set_user_attr("dataset", "cifar");
    trial.complete(1.0);

    tracker.record(&study, &trial).unwrap();

    let exp = store.experiment_by_name("s1").unwrap();
    let run = &store.runs_for_experiment(exp.experiment_id())[0];
    assert_eq!(run.tags()["x_distribution"], "from-study");
    assert_eq!(run.tags()["dataset"], "mnist");
}

#[test]
fn test_long_tags_are_shortened_before_write() {
    let store = Arc::new(MemoryTrackingStore::new().with_max_tag_value_length(64));
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Minimize);

    let mut trial = Trial::new(0);
    trial.set_user_attr("notes", "lorem ipsum ".repeat(40));
    trial.complete(1.0);

    // The store rejects over-long tags, so success means they were shortened
    tracker.record(&study, &trial).unwrap();

    let exp = store.experiment_by_name("s1").unwrap();
    let run = &store.runs_for_experiment(exp.experiment_id())[0];
    assert!(run.tags()["notes"].chars().count() <= 64);
}

#[test]
fn test_deleted_experiment_error_propagates() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Minimize);

    let id = store.get_or_create_experiment("s1").unwrap();
    store.delete_experiment(&id).unwrap();

    let err = tracker.record(&study, &Trial::new(0)).unwrap_err();
    assert!(matches!(err, Error::DeletedExperiment(_)));
    assert_eq!(store.run_count(), 0);
}

#[test]
fn test_unknown_stashed_run_id_propagates() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Minimize);

    let mut trial = Trial::new(0);
    trial.set_system_attr(RUN_ID_ATTRIBUTE_KEY, "does-not-exist");
    trial.complete(1.0);

    let err = tracker.record(&study, &trial).unwrap_err();
    assert!(matches!(err, Error::RunNotFound(id) if id == "does-not-exist"));
}

// =============================================================================
// track_objective()
// =============================================================================

#[test]
fn test_track_objective_then_record_reuses_run() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Minimize);
    let mut trial = Trial::new(7);

    let value = tracker
        .track_objective(&study, &mut trial, |trial, run| {
            // Run ID is stashed before the objective body runs
            let stashed = trial
                .system_attr(RUN_ID_ATTRIBUTE_KEY)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            assert_eq!(stashed.as_deref(), Some(run.run_id()));

            trial.set_param("x", 3.0, uniform());
            run.log_param("power", 2)?;
            run.log_metric("base of metric", 1.0)?;
            Ok::<_, Error>(1.0)
        })
        .unwrap();
    trial.complete(value);

    let stashed = trial
        .system_attr(RUN_ID_ATTRIBUTE_KEY)
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert_eq!(store.get_run(&stashed).unwrap().status(), RunStatus::Finished);

    tracker.record(&study, &trial).unwrap();

    assert_eq!(store.run_count(), 1);
    let run = store.get_run(&stashed).unwrap();
    assert_eq!(run.run_name(), "7");
    assert_eq!(run.status(), RunStatus::Finished);
    assert_eq!(run.params()["power"], "2");
    assert_eq!(run.params()["x"], "3.0");
    assert_eq!(store.metrics_for_run(&stashed, "base of metric").len(), 1);
    assert_eq!(store.metrics_for_run(&stashed, "value")[0].value(), 1.0);
}

#[test]
fn test_track_objective_panic_closes_run() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("s1", StudyDirection::Minimize);
    let mut trial = Trial::new(0);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: Result<(), Error> = tracker.track_objective(&study, &mut trial, |_, _| {
            panic!("objective panicked");
        });
    }));
    assert!(result.is_err());

    let run_id = trial
        .system_attr(RUN_ID_ATTRIBUTE_KEY)
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert_eq!(store.get_run(&run_id).unwrap().status(), RunStatus::Failed);
}

// =============================================================================
// Nesting and concurrency
// =============================================================================

#[test]
fn test_nested_trials_under_study_run() {
    let store = Arc::new(MemoryTrackingStore::new());
    let study = Study::new("s1", StudyDirection::Minimize);

    let parent = TrialTracker::new(store.clone())
        .start_study_run(&study)
        .unwrap();
    let tracker = TrialTracker::builder(store.clone())
        .nest_trials(true)
        .parent_run_id(parent.run_id())
        .build();

    for number in 0..3 {
        let mut trial = Trial::new(number);
        trial.complete(0.1);
        tracker.record(&study, &trial).unwrap();
    }
    let parent_id = parent.run_id().to_string();
    parent.end(RunStatus::Finished).unwrap();

    let exp = store.experiment_by_name("s1").unwrap();
    let runs = store.runs_for_experiment(exp.experiment_id());
    assert_eq!(runs.len(), 4);
    let nested = runs
        .iter()
        .filter(|r| r.parent_run_id() == Some(parent_id.as_str()))
        .count();
    assert_eq!(nested, 3);
}

#[test]
fn test_concurrent_trials_record_independently() {
    let store = Arc::new(MemoryTrackingStore::new());
    let tracker = TrialTracker::new(store.clone());
    let study = Study::new("parallel", StudyDirection::Maximize);

    (0..64u64).into_par_iter().for_each(|number| {
        let mut trial = Trial::new(number).with_param("x", number as f64, uniform());
        trial.complete(number as f64 * 0.5);
        tracker.record(&study, &trial).unwrap();
    });

    assert_eq!(store.experiment_count(), 1);
    assert_eq!(store.run_count(), 64);

    let exp = store.experiment_by_name("parallel").unwrap();
    for run in store.runs_for_experiment(exp.experiment_id()) {
        let number: f64 = run.tags()["number"].parse().unwrap();
        let metrics = store.metrics_for_run(run.run_id(), "value");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value(), number * 0.5);
        assert_eq!(run.run_name(), run.tags()["number"]);
    }
}
