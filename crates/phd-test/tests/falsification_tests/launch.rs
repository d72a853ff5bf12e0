//! Falsification Tests: Category C - Launching (F040-F059)
//!
//! # Toyota Way: Jidoka (自働化)
//! A launch either reaches a running overseer or stops with a precise error.

use phd_core::{LaunchOutcome, LaunchRequest, RunAs, SpawnOutput, SupervisorError};
use phd_test::{Scripted, SpawnMode, SupervisorTestHarness};

fn harness_as(required: &str, current: &str) -> SupervisorTestHarness {
    let required = required.to_string();
    SupervisorTestHarness::builder()
        .with_current_user(current)
        .with_config(move |config| config.user = Some(required))
        .build()
        .unwrap()
}

// =============================================================================
// F040-F049: Environment and identity checks
// =============================================================================

/// F040: An unusable PID directory fails the launch before anything is spawned
#[tokio::test]
async fn f040_unusable_pid_directory_spawns_nothing() {
    let harness = SupervisorTestHarness::new().unwrap();
    let pid_dir = harness.dirs.pid_dir();
    std::fs::remove_dir(&pid_dir).unwrap();
    std::fs::write(&pid_dir, "not a directory").unwrap();

    let err = harness
        .supervisor
        .launch(&LaunchRequest::new("GarbageCollector"))
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Configuration(_)), "F040 FALSIFIED: got {err:?}");
    assert_eq!(harness.spawner.count(), 0, "F040 FALSIFIED: a process was spawned");
}

/// F041: An ambiguous name spawns nothing
#[tokio::test]
async fn f041_ambiguous_name_spawns_nothing() {
    let harness = SupervisorTestHarness::new().unwrap();
    let err = harness
        .supervisor
        .launch(&LaunchRequest::new("Daemon"))
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Ambiguity { .. }), "F041 FALSIFIED: got {err:?}");
    assert_eq!(harness.spawner.count(), 0);
}

/// F042: Debug launches under the wrong user are refused
#[tokio::test]
async fn f042_debug_under_wrong_user_is_refused() {
    let harness = harness_as("phd", "root");
    let err = harness
        .supervisor
        .launch(&LaunchRequest::new("trigger").debug(true))
        .await
        .unwrap_err();

    match err {
        SupervisorError::UserMismatch { required, current } => {
            assert_eq!(required, "phd");
            assert_eq!(current, "root");
        }
        other => panic!("F042 FALSIFIED: got {other:?}"),
    }
    assert_eq!(harness.spawner.count(), 0);
}

/// F043: --as-current-user bypasses the user check
#[tokio::test]
async fn f043_as_current_user_bypasses_check() {
    let harness = harness_as("phd", "root");
    let outcome = harness
        .supervisor
        .launch(&LaunchRequest::new("trigger").debug(true).as_current_user(true))
        .await
        .unwrap();

    assert!(matches!(outcome, LaunchOutcome::Foreground { exit_code: 0, .. }));
    assert!(!harness.spawner.records()[0].elevated());
}

/// F044: The configured user matching the current one needs no sudo
#[tokio::test]
async fn f044_matching_user_is_not_elevated() {
    let harness = harness_as("phd", "phd");
    harness.supervisor.launch(&LaunchRequest::new("trigger")).await.unwrap();
    assert!(!harness.spawner.records()[0].elevated(), "F044 FALSIFIED: sudo used needlessly");
}

// =============================================================================
// F050-F059: Spawning and the elevation retry
// =============================================================================

/// F050: A detached launch hands the overseer a complete configuration
#[tokio::test]
async fn f050_detached_launch_payload() {
    let harness = SupervisorTestHarness::builder()
        .with_config(|config| config.trace = true)
        .build()
        .unwrap();

    let outcome = harness
        .supervisor
        .launch(&LaunchRequest::new("taskmaster").with_argv(vec!["--queue".into(), "a".into()]))
        .await
        .unwrap();
    assert_eq!(outcome.daemon().name(), "TaskmasterDaemon");

    let record = &harness.spawner.records()[0];
    assert_eq!(record.mode, SpawnMode::Detached);
    assert_eq!(record.invocation.program, "./phd-daemon");
    assert_eq!(record.invocation.args, vec!["--trace"]);
    assert_eq!(record.invocation.cwd, harness.supervisor.config().overseer.script_dir);

    let config = record.config();
    assert_eq!(config["daemonize"], true);
    assert_eq!(
        config["log"],
        harness.dirs.log_dir().join("daemons.log").to_string_lossy().into_owned()
    );
    assert_eq!(config["piddir"], harness.dirs.pid_dir().to_string_lossy().into_owned());
    assert_eq!(config["daemons"][0]["class"], "TaskmasterDaemon");
    assert_eq!(config["daemons"][0]["argv"][1], "a");
}

/// F051: A debug launch runs in the foreground with tracing and no daemonize
#[tokio::test]
async fn f051_debug_launch_runs_in_foreground() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness
        .supervisor
        .launch(&LaunchRequest::new("trigger").debug(true))
        .await
        .unwrap();

    let record = &harness.spawner.records()[0];
    assert_eq!(record.mode, SpawnMode::Foreground);
    assert_eq!(record.invocation.args, vec!["--trace", "--verbose"]);
    let config = record.config();
    assert!(config.get("daemonize").is_none(), "F051 FALSIFIED: debug overseer daemonizes");
    assert!(config.get("log").is_none());
}

/// F052: sudo's "password is required" with a zero exit still triggers the retry
#[tokio::test]
async fn f052_password_quirk_retries_once_without_sudo() {
    let harness = harness_as("phd", "operator");
    harness
        .spawner
        .push_output(SpawnOutput::success("sudo: a password is required\n"));

    let outcome = harness.supervisor.launch(&LaunchRequest::new("trigger")).await.unwrap();

    let records = harness.spawner.records();
    assert_eq!(records.len(), 2, "F052 FALSIFIED: expected exactly one retry");
    assert!(records[0].elevated());
    assert_eq!(records[0].invocation.args[..4], ["-En", "-u", "phd", "--"]);
    assert!(!records[1].elevated());
    assert!(matches!(
        outcome,
        LaunchOutcome::Detached { run_as: RunAs::CurrentUser, fell_back: true, .. }
    ));
}

/// F053: A failed retry propagates; there is no third attempt
#[tokio::test]
async fn f053_failed_retry_propagates() {
    let harness = harness_as("phd", "operator");
    harness
        .spawner
        .push(Scripted::SpawnFailure("sudo: not found".into()))
        .push_output(SpawnOutput::failure(1, "overseer crashed"));

    let err = harness
        .supervisor
        .launch(&LaunchRequest::new("trigger"))
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Spawn(_)), "F053 FALSIFIED: got {err:?}");
    assert_eq!(harness.spawner.count(), 2, "F053 FALSIFIED: wrong number of attempts");
}

/// F054: A launch without elevation is not retried
#[tokio::test]
async fn f054_plain_failure_is_not_retried() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.spawner.push_output(SpawnOutput::failure(2, "bad config"));

    let err = harness
        .supervisor
        .launch(&LaunchRequest::new("trigger"))
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Spawn(ref m) if m.contains("bad config")));
    assert_eq!(harness.spawner.count(), 1);
}

/// F055: A successful elevated launch stays elevated
#[tokio::test]
async fn f055_elevated_success() {
    let harness = harness_as("phd", "operator");
    let outcome = harness.supervisor.launch(&LaunchRequest::new("trigger")).await.unwrap();

    assert!(matches!(
        outcome,
        LaunchOutcome::Detached { ref run_as, fell_back: false, .. } if *run_as == RunAs::User("phd".into())
    ));
    assert_eq!(harness.spawner.count(), 1);
}
