//! Falsification Tests: Category D - Start Sequencing (F060-F079)
//!
//! # Toyota Way: Heijunka (平準化)
//! `start` launches the same levelled batch every time, or nothing at all.

use std::path::PathBuf;
use std::time::Duration;

use phd_core::{
    DaemonRegistry, Origin, RemoteRecord, Signal, SpawnOutput, StartOutcome, StopRequest,
    SupervisorError,
};
use phd_test::{NoopDaemon, Scripted, SupervisorTestHarness};

fn started(outcome: StartOutcome) -> phd_core::StartReport {
    match outcome {
        StartOutcome::Started(report) => report,
        StartOutcome::AlreadyRunning { running } => {
            panic!("expected a start, daemons already running: {running:?}")
        }
    }
}

/// F060: Live daemons block the start with exit code 1
#[tokio::test]
async fn f060_already_running_blocks_start() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 100, &[("1", "TriggerDaemon")]).unwrap();
    harness.processes.spawn(100);

    let outcome = harness.supervisor.start(false).await.unwrap();

    assert_eq!(outcome.exit_code(), 1, "F060 FALSIFIED: started on top of live daemons");
    assert_eq!(harness.spawner.count(), 0);
    assert_eq!(harness.leases.calls(), 0, "F060 FALSIFIED: leases touched");
}

/// F061: Stale PID files do not block the start
#[tokio::test]
async fn f061_stale_pid_files_do_not_block() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 100, &[]).unwrap();

    let outcome = harness.supervisor.start(false).await.unwrap();
    assert_eq!(outcome.exit_code(), 0, "F061 FALSIFIED: dead overseer blocked start");
}

/// F062: Daemons known only to the shared registry count as running
#[tokio::test]
async fn f062_remote_daemons_block_start() {
    let harness = SupervisorTestHarness::builder()
        .with_remote(vec![RemoteRecord::new("42").with_host("web02")])
        .build()
        .unwrap();

    let outcome = harness.supervisor.start(false).await.unwrap();
    assert!(matches!(outcome, StartOutcome::AlreadyRunning { .. }), "F062 FALSIFIED");
}

/// F063: start launches the baseline daemons, then N taskmasters, in order
#[tokio::test]
async fn f063_start_launches_levelled_batch() {
    let harness = SupervisorTestHarness::builder()
        .with_config(|config| config.start_taskmasters = 2)
        .build()
        .unwrap();

    let report = started(harness.supervisor.start(true).await.unwrap());

    let classes: Vec<String> = harness
        .spawner
        .records()
        .iter()
        .map(|r| r.config()["daemons"][0]["class"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        classes,
        vec![
            "RepositoryPullLocalDaemon",
            "GarbageCollectorDaemon",
            "TriggerDaemon",
            "TaskmasterDaemon",
            "TaskmasterDaemon",
        ],
        "F063 FALSIFIED: wrong batch"
    );
    assert!(harness.spawner.records().iter().all(|r| r.config()["daemonize"] == true));
    assert_eq!(report.launched.len(), 5);
    assert_eq!(report.log_file, harness.dirs.log_dir().join("daemons.log"));
    assert!(harness.dirs.log_dir().is_dir(), "F063 FALSIFIED: log directory not prepared");
}

/// F064: Leases are freed unless --keep-leases
#[tokio::test]
async fn f064_leases_freed_unless_kept() {
    let harness = SupervisorTestHarness::builder()
        .with_active_leases(7)
        .build()
        .unwrap();

    let report = started(harness.supervisor.start(true).await.unwrap());
    assert_eq!(report.freed_leases, None);
    assert_eq!(harness.leases.active(), 7, "F064 FALSIFIED: --keep-leases ignored");

    let report = started(harness.supervisor.start(false).await.unwrap());
    assert_eq!(report.freed_leases, Some(7));
    assert_eq!(harness.leases.active(), 0);
}

/// F065: One failed launch does not abort the rest of the batch
#[tokio::test]
async fn f065_failed_launch_does_not_abort_batch() {
    let harness = SupervisorTestHarness::builder()
        .with_config(|config| config.start_taskmasters = 1)
        .build()
        .unwrap();
    harness
        .spawner
        .push_output(SpawnOutput::success(""))
        .push(Scripted::SpawnFailure("exec format error".into()));

    let report = started(harness.supervisor.start(true).await.unwrap());

    assert_eq!(harness.spawner.count(), 4, "F065 FALSIFIED: batch aborted");
    assert_eq!(report.launched.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].daemon, "GarbageCollectorDaemon");
}

/// F066: A daemon missing from the registry fails alone
#[tokio::test]
async fn f066_unknown_daemon_fails_alone() {
    let registry = DaemonRegistry::new()
        .with("TriggerDaemon", || Box::new(NoopDaemon::new("TriggerDaemon")))
        .with("TaskmasterDaemon", || Box::new(NoopDaemon::new("TaskmasterDaemon")));
    let harness = SupervisorTestHarness::builder()
        .with_registry(registry)
        .with_config(|config| config.start_taskmasters = 1)
        .build()
        .unwrap();

    let report = started(harness.supervisor.start(true).await.unwrap());

    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, SupervisorError::Ambiguity { .. })));
    assert_eq!(report.launched.len(), 2);
}

/// F067: An unusable log directory stops the start before any launch
#[tokio::test]
async fn f067_unusable_log_directory_is_fatal() {
    let harness = SupervisorTestHarness::builder()
        .with_config(|config| config.log_directory = PathBuf::from("/dev/null/phd-log"))
        .build()
        .unwrap();

    let err = harness.supervisor.start(true).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Configuration(_)), "F067 FALSIFIED: got {err:?}");
    assert_eq!(harness.spawner.count(), 0);
}

/// F068: restart stops everything, then starts
#[tokio::test]
async fn f068_restart_stops_then_starts() {
    let harness = SupervisorTestHarness::builder()
        .with_config(|config| config.start_taskmasters = 0)
        .build()
        .unwrap();
    let path = harness.dirs.write_overseer("daemon.a", 100, &[]).unwrap();
    harness.processes.spawn(100).exit_after(100, Signal::Int, Duration::from_secs(1));

    let report = harness
        .supervisor
        .restart(&StopRequest::new(Duration::from_secs(15)).with_pids(["100"]), true)
        .await
        .unwrap();

    assert_eq!(report.stop.targeted, vec![100]);
    assert!(!path.exists());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(harness.spawner.count(), 3, "F068 FALSIFIED: start half did not run");
}

/// F069: status reports local and remote daemons with liveness
#[tokio::test]
async fn f069_status_lists_local_and_remote() {
    let harness = SupervisorTestHarness::builder()
        .with_remote(vec![
            RemoteRecord::new("1"),
            RemoteRecord::new("9").with_pid(900).with_class("TaskmasterDaemon"),
        ])
        .build()
        .unwrap();
    harness.dirs.write_overseer("daemon.a", 100, &[("1", "TriggerDaemon")]).unwrap();
    harness.dirs.write_overseer("daemon.b", 101, &[("2", "TaskmasterDaemon")]).unwrap();
    harness.processes.spawn(100);

    let status = harness.supervisor.status().await.unwrap();

    assert_eq!(status.len(), 3, "F069 FALSIFIED: {status:?}");
    assert_eq!(status[0].pid, Some(100));
    assert!(status[0].running);
    assert_eq!(status[0].origin, Origin::Local);
    assert!(!status[1].running, "F069 FALSIFIED: dead overseer reported running");
    assert_eq!(status[2].log_id.as_deref(), Some("9"));
    assert_eq!(status[2].origin, Origin::Remote);
    assert!(status[2].pid_file.is_none());
    assert_eq!(harness.remote.queries(), vec![vec!["1".to_string(), "2".to_string()]]);
}

/// F070: An I/O failure talking to one launcher does not abort the batch
#[tokio::test]
async fn f070_io_failure_does_not_abort_batch() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness
        .spawner
        .push(Scripted::IoFailure("wait failed".into()));

    let report = started(harness.supervisor.start(true).await.unwrap());

    assert_eq!(harness.spawner.count(), 7, "F070 FALSIFIED: batch aborted");
    assert_eq!(report.launched.len(), 6);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].daemon, "RepositoryPullLocalDaemon");
    assert!(matches!(report.failures[0].error, SupervisorError::Io(_)));
}
