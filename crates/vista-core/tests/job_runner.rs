use std::sync::Arc;
use std::time::Duration;

use vista_core::config::ConfigStore;
use vista_core::error::SetupError;
use vista_core::job::{JobManager, JobState};
use vista_core::pipeline::{STATUS_COMPLETED, STATUS_FAILED, STATUS_STOPPED};

mod support;
use support::{FakeRunner, Fixture, last_progress, log_lines, wait_for_terminal};

#[tokio::test]
async fn full_run_links_persists_and_completes() {
    let fixture = Fixture::new();
    let runner = Arc::new(FakeRunner::new());
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(Arc::clone(&runner))).unwrap();
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;

    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.error, None);
    assert_eq!(
        last_progress(&events),
        Some((100.0, STATUS_COMPLETED.to_string()))
    );

    let agg = &fixture.aggregation;
    assert_eq!(
        std::fs::read_link(agg.join("A")).unwrap(),
        fixture.shows.join("A")
    );
    assert_eq!(
        std::fs::read_link(agg.join("B")).unwrap(),
        fixture.shows.join("B")
    );

    let config = ConfigStore::from_project_root(&fixture.project)
        .load()
        .unwrap();
    assert_eq!(config.media_root_dir.as_deref(), Some(agg.as_path()));

    let server = fixture.project.join("server");
    assert!(server.join("package.json").is_file());
    assert!(server.join("server.js").is_file());
    assert!(runner.called_with("npm"));
    assert!(runner.called_with("--media-root"));
}

#[tokio::test]
async fn progress_percent_never_decreases_on_success() {
    let fixture = Fixture::new();
    let mut manager = JobManager::current();

    let id = manager
        .start(fixture.pipeline(Arc::new(FakeRunner::new())))
        .unwrap();
    let (events, _) = wait_for_terminal(&mut manager, id).await;

    let percents: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            vista_core::protocol::ProgressEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.len(), 9);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
}

#[tokio::test]
async fn missing_requirements_are_skipped_not_fatal() {
    let fixture = Fixture::new();
    let runner = Arc::new(FakeRunner::new());
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(Arc::clone(&runner))).unwrap();
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;

    assert_eq!(snapshot.state, JobState::Completed);
    assert!(!runner.called_with("pip"));
    assert!(
        log_lines(&events)
            .iter()
            .any(|line| line.contains("skipping Python dependencies"))
    );
}

#[tokio::test]
async fn failing_dependency_install_fails_the_job() {
    let fixture = Fixture::new();
    fixture.write_requirements();
    let runner = Arc::new(FakeRunner::new().failing_on("pip install", 1));
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(Arc::clone(&runner))).unwrap();
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;

    assert_eq!(snapshot.state, JobState::Failed);
    let error = snapshot.error.unwrap();
    assert!(error.contains("install-requirements"), "{error}");
    assert!(error.contains("exited with code 1"), "{error}");
    assert_eq!(
        last_progress(&events),
        Some((100.0, STATUS_FAILED.to_string()))
    );
    assert!(!runner.called_with("npm"));
    assert!(!fixture.aggregation.exists());
}

#[tokio::test]
async fn missing_venv_interpreter_stops_everything_after_it() {
    let fixture = Fixture::new();
    let runner = Arc::new(FakeRunner::new().without_venv_python());
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(Arc::clone(&runner))).unwrap();
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;

    assert_eq!(snapshot.state, JobState::Failed);
    let logs = log_lines(&events);
    let last = logs.last().unwrap();
    assert!(last.starts_with("ERROR: create-environment failed"), "{last}");
    assert!(last.contains("Virtual environment interpreter not found"));

    assert_eq!(runner.calls().len(), 1);
    assert!(!fixture.aggregation.exists());
    assert!(!ConfigStore::from_project_root(&fixture.project)
        .config_path()
        .exists());
}

#[tokio::test]
async fn panicking_step_fails_the_job_with_an_error_line() {
    let fixture = Fixture::new();
    let runner = Arc::new(FakeRunner::new().panicking_on("npm install"));
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(Arc::clone(&runner))).unwrap();
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;

    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.error.unwrap().contains("fake runner blew up"));
    let logs = log_lines(&events);
    let last = logs.last().unwrap();
    assert!(last.starts_with("ERROR: setup job panicked"), "{last}");
    assert_eq!(
        last_progress(&events),
        Some((100.0, STATUS_FAILED.to_string()))
    );
}

#[tokio::test]
async fn second_start_conflicts_without_disturbing_the_first() {
    let fixture = Fixture::new();
    let slow = Arc::new(FakeRunner::new().with_delay(Duration::from_millis(50)));
    let mut manager = JobManager::current();

    let first = manager.start(fixture.pipeline(Arc::clone(&slow))).unwrap();
    let err = manager
        .start(fixture.pipeline(Arc::new(FakeRunner::new())))
        .unwrap_err();

    assert!(matches!(err, SetupError::Conflict { active } if active == first.as_u64()));
    assert_eq!(manager.current_job(), Some(first));

    let (_, snapshot) = wait_for_terminal(&mut manager, first).await;
    assert_eq!(snapshot.state, JobState::Completed);
}

#[tokio::test]
async fn release_frees_the_slot_for_a_new_job() {
    let fixture = Fixture::new();
    let mut manager = JobManager::current();

    let first = manager
        .start(fixture.pipeline(Arc::new(FakeRunner::new())))
        .unwrap();
    wait_for_terminal(&mut manager, first).await;

    let released = manager.release(first).unwrap();
    assert_eq!(released.state, JobState::Completed);
    assert_eq!(manager.current_job(), None);
    assert!(manager.poll(first).is_empty());

    let second = manager
        .start(fixture.pipeline(Arc::new(FakeRunner::new())))
        .unwrap();
    assert_ne!(first, second);
    let (events, snapshot) = wait_for_terminal(&mut manager, second).await;
    assert_eq!(snapshot.state, JobState::Completed);

    // Links from the first run are left alone on the second.
    assert!(
        log_lines(&events)
            .iter()
            .any(|line| line.contains("Linked 0 folder(s)"))
    );
}

#[tokio::test]
async fn active_job_cannot_be_released() {
    let fixture = Fixture::new();
    let slow = Arc::new(FakeRunner::new().with_delay(Duration::from_millis(50)));
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(slow)).unwrap();

    assert!(manager.release(id).is_none());
    assert_eq!(manager.current_job(), Some(id));
    wait_for_terminal(&mut manager, id).await;
}

#[tokio::test]
async fn stop_skips_remaining_steps() {
    let fixture = Fixture::new();
    let slow = Arc::new(FakeRunner::new().with_delay(Duration::from_millis(100)));
    let mut manager = JobManager::current();

    let id = manager.start(fixture.pipeline(Arc::clone(&slow))).unwrap();
    assert!(manager.stop(id));
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;

    assert_eq!(snapshot.state, JobState::Stopped);
    assert_eq!(
        last_progress(&events),
        Some((100.0, STATUS_STOPPED.to_string()))
    );
    assert!(!slow.called_with("npm"));
    assert!(!fixture.aggregation.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn link_failures_are_warnings_not_a_failed_job() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    let agg = &fixture.aggregation;
    std::fs::create_dir(agg).unwrap();
    std::fs::set_permissions(agg, std::fs::Permissions::from_mode(0o555)).unwrap();
    // Permission bits do not bind a privileged user.
    if std::fs::write(agg.join(".writable"), "").is_ok() {
        return;
    }

    let mut manager = JobManager::current();
    let id = manager
        .start(fixture.pipeline(Arc::new(FakeRunner::new())))
        .unwrap();
    let (events, snapshot) = wait_for_terminal(&mut manager, id).await;
    std::fs::set_permissions(agg, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(snapshot.state, JobState::Completed);
    let warnings: Vec<_> = log_lines(&events)
        .into_iter()
        .filter(|line| line.starts_with("[warn] Failed to link"))
        .collect();
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert!(
        log_lines(&events)
            .iter()
            .any(|line| line.contains("(0 skipped, 2 failed)"))
    );
}
