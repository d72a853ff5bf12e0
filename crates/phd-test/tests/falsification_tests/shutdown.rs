//! Falsification Tests: Category B - Shutdown Escalation (F010-F039)
//!
//! # Toyota Way: Jidoka (自働化)
//! Each tier must finish before the next one starts, and nothing but the
//! targeted overseers may ever be signalled.

use std::sync::Arc;
use std::time::Duration;

use phd_core::{
    OverseerConfig, Pid, ProcessTable, ShutdownCoordinator, Signal, StopPhase, StopRequest,
    SupervisorError,
};
use phd_test::{FakeProcessTable, ManualClock, SupervisorTestHarness};
use proptest::prelude::*;

const GRACE: Duration = Duration::from_secs(15);

fn coordinator() -> (Arc<ManualClock>, Arc<FakeProcessTable>, ShutdownCoordinator) {
    let clock = Arc::new(ManualClock::new());
    let processes = Arc::new(FakeProcessTable::new(Arc::clone(&clock)));
    let coordinator = ShutdownCoordinator::new(
        processes.clone(),
        clock.clone(),
        OverseerConfig::default(),
    );
    (clock, processes, coordinator)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// =============================================================================
// F010-F019: End-to-end stops
// =============================================================================

/// F010: Two daemons that honour SIGINT are stopped without escalation
#[tokio::test]
async fn f010_graceful_stop_removes_pid_files() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 100, &[("1", "TaskmasterDaemon")]).unwrap();
    harness.dirs.write_overseer("daemon.b", 101, &[("2", "TriggerDaemon")]).unwrap();
    for pid in [100, 101] {
        harness.processes.spawn(pid).exit_after(pid, Signal::Int, Duration::from_secs(2));
    }

    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();

    assert!(report.survivors.is_empty(), "F010 FALSIFIED: survivors {:?}", report.survivors);
    assert_eq!(report.removed_pid_files.len(), 2);
    assert!(harness.dirs.pid_files().unwrap().is_empty(), "F010 FALSIFIED: PID files left behind");
    assert!(!harness.processes.was_sent(Signal::Term), "F010 FALSIFIED: SIGTERM sent");
    assert!(!harness.processes.was_sent(Signal::Kill), "F010 FALSIFIED: SIGKILL sent");
    assert!(
        harness.clock.elapsed() < Duration::from_secs(3),
        "F010 FALSIFIED: waited {:?} for processes that exited after 2s",
        harness.clock.elapsed()
    );
    assert_eq!(report.exit_code(), 0);
}

/// F011: SIGKILL is not confirmed, so its target is reported as a survivor
#[tokio::test]
async fn f011_sigkill_target_counts_as_survivor() {
    let harness = SupervisorTestHarness::new().unwrap();
    let path = harness.dirs.write_overseer("daemon.a", 200, &[]).unwrap();
    harness.processes.spawn(200);

    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();

    assert_eq!(report.survivors, vec![200], "F011 FALSIFIED: survivors {:?}", report.survivors);
    assert_eq!(
        harness.processes.signals_to(200),
        vec![Signal::Int, Signal::Term, Signal::Kill]
    );
    assert!(!harness.processes.is_alive(200), "fake process should be dead after SIGKILL");
    assert!(path.exists(), "F011 FALSIFIED: survivor's PID file was removed");
    assert!(report.removed_pid_files.is_empty());
}

/// F012: Each tier waits out its own window before the next starts
#[tokio::test]
async fn f012_escalation_tiers_do_not_overlap() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 300, &[]).unwrap();
    harness.processes.spawn(300);

    let grace = Duration::from_secs(4);
    let report = harness.supervisor.stop(&StopRequest::new(grace)).await.unwrap();

    let sent = harness.processes.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].at, Duration::ZERO);
    assert!(sent[1].at >= grace, "F012 FALSIFIED: SIGTERM at {:?}", sent[1].at);
    assert!(
        sent[2].at >= sent[1].at + Duration::from_secs(15),
        "F012 FALSIFIED: SIGKILL at {:?}, SIGTERM at {:?}",
        sent[2].at,
        sent[1].at
    );
    assert_eq!(
        report.phases,
        vec![
            StopPhase::Idle,
            StopPhase::Resolving,
            StopPhase::Signaling(Signal::Int),
            StopPhase::Signaling(Signal::Term),
            StopPhase::Signaling(Signal::Kill),
            StopPhase::Reconciling,
            StopPhase::Done,
        ]
    );
}

/// F013: A zero grace period skips SIGINT
#[tokio::test]
async fn f013_zero_grace_skips_sigint() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 400, &[]).unwrap();
    harness.processes.spawn(400).exit_after(400, Signal::Term, Duration::from_millis(500));

    let report = harness
        .supervisor
        .stop(&StopRequest::new(Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(harness.processes.signals_to(400), vec![Signal::Term]);
    assert!(report.survivors.is_empty());
}

/// F014: --force with --gently fails before anything is signalled
#[tokio::test]
async fn f014_force_and_gently_is_usage_error() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 500, &[]).unwrap();
    harness.processes.spawn(500);

    let err = harness
        .supervisor
        .stop(&StopRequest::new(GRACE).force(true).gently(true))
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Usage(_)), "F014 FALSIFIED: got {err:?}");
    assert!(harness.processes.sent().is_empty(), "F014 FALSIFIED: signals were sent");
}

/// F015: PID 0 is never passed to the signalling primitive
#[tokio::test]
async fn f015_pid_zero_never_signalled() {
    let harness = SupervisorTestHarness::new().unwrap();
    let zero = harness.dirs.write_overseer("daemon.zero", 0, &[]).unwrap();
    harness.dirs.write_overseer("daemon.a", 600, &[]).unwrap();
    harness.processes.spawn(600).exit_after(600, Signal::Int, Duration::ZERO);

    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();

    assert!(
        harness.processes.sent().iter().all(|s| s.pid != 0),
        "F015 FALSIFIED: PID 0 was signalled"
    );
    assert_eq!(report.targeted, vec![600]);
    assert!(zero.exists());
}

/// F016: Invalid and unknown PID arguments are reported and skipped
#[tokio::test]
async fn f016_bad_pid_arguments_are_soft() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 700, &[]).unwrap();
    harness.dirs.write_overseer("daemon.b", 701, &[]).unwrap();
    harness.processes.spawn(700).exit_after(700, Signal::Int, Duration::ZERO);
    harness.processes.spawn(701);

    let report = harness
        .supervisor
        .stop(&StopRequest::new(GRACE).with_pids(["abc", "999", "700", "0"]))
        .await
        .unwrap();

    assert_eq!(report.invalid_pids, vec!["abc"]);
    assert_eq!(report.unknown_pids, vec![999, 0]);
    assert_eq!(report.targeted, vec![700]);
    assert!(harness.processes.signals_to(701).is_empty(), "F016 FALSIFIED: untargeted PID signalled");
    assert_eq!(harness.dirs.pid_files().unwrap(), vec!["daemon.b"]);
}

/// F017: Only bad PID arguments means nothing to kill, and success
#[tokio::test]
async fn f017_no_valid_targets_is_success() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 800, &[]).unwrap();
    harness.processes.spawn(800);

    let report = harness
        .supervisor
        .stop(&StopRequest::new(GRACE).with_pids(["12", "x"]))
        .await
        .unwrap();

    assert!(report.targeted.is_empty());
    assert!(harness.processes.sent().is_empty());
    assert_eq!(report.exit_code(), 0);
}

/// F018: A PID file removed by a concurrent stop is not an error
#[tokio::test]
async fn f018_pid_file_removal_is_idempotent() {
    let harness = SupervisorTestHarness::new().unwrap();
    let path = harness.dirs.write_overseer("daemon.a", 900, &[]).unwrap();
    phd_core::pidfile::remove(&path).unwrap();
    phd_core::pidfile::remove(&path).unwrap();
    assert!(!path.exists());
}

/// F019: Several records in one PID file remove it once
#[tokio::test]
async fn f019_shared_pid_file_removed_once() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness
        .dirs
        .write_overseer("daemon.a", 1000, &[("1", "TaskmasterDaemon"), ("2", "TaskmasterDaemon")])
        .unwrap();
    harness.processes.spawn(1000).exit_after(1000, Signal::Int, Duration::from_secs(1));

    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();

    assert_eq!(report.removed_pid_files.len(), 1, "F019 FALSIFIED: {:?}", report.removed_pid_files);
    assert_eq!(harness.processes.signals_to(1000), vec![Signal::Int]);
}

// =============================================================================
// F020-F029: Rogue processes
// =============================================================================

/// F020: With no PID files, stop scans for rogues and reports "nothing" only if none
#[tokio::test]
async fn f020_empty_stop_scans_for_rogues() {
    let harness = SupervisorTestHarness::new().unwrap();
    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();
    assert!(report.nothing_running);
    assert!(report.rogue.is_some(), "F020 FALSIFIED: rogue scan skipped");

    harness.processes.spawn_command(1100, "php ./phd-daemon");
    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();
    assert!(!report.nothing_running, "F020 FALSIFIED: rogue ignored");
    let rogue = report.rogue.unwrap();
    assert_eq!(rogue.found.len(), 1);
    assert!(!rogue.stopped);
    assert!(harness.processes.sent().is_empty(), "F020 FALSIFIED: rogue signalled without --force");
}

/// F021: --gently skips the rogue scan
#[tokio::test]
async fn f021_gently_skips_rogues() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.processes.spawn_command(1200, "php ./phd-daemon");

    let report = harness
        .supervisor
        .stop(&StopRequest::new(GRACE).gently(true))
        .await
        .unwrap();

    assert!(report.rogue.is_none());
    assert!(report.nothing_running);
}

/// F022: --force escalates against rogues
#[tokio::test]
async fn f022_force_stops_rogues() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.processes.spawn_command(1300, "php ./phd-daemon --trace");
    harness.processes.exit_after(1300, Signal::Int, Duration::from_millis(200));
    harness.processes.spawn_command(1301, "/usr/sbin/sshd -D");

    let report = harness
        .supervisor
        .stop(&StopRequest::new(GRACE).force(true))
        .await
        .unwrap();

    let rogue = report.rogue.unwrap();
    assert!(rogue.stopped);
    assert!(rogue.survivors.is_empty());
    assert_eq!(harness.processes.signals_to(1300), vec![Signal::Int]);
    assert!(harness.processes.signals_to(1301).is_empty(), "F022 FALSIFIED: non-overseer signalled");
}

/// F023: Rogues that cannot be signalled are reported as survivors
#[tokio::test]
async fn f023_unstoppable_rogues_survive() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.processes.spawn_command(1400, "php ./phd-daemon").deny_signals(1400);

    let report = harness
        .supervisor
        .stop(&StopRequest::new(GRACE).force(true))
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.rogue.unwrap().survivors, vec![1400]);
}

/// F024: Tracked overseers are never rogues
#[tokio::test]
async fn f024_tracked_processes_are_not_rogue() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.dirs.write_overseer("daemon.a", 1500, &[]).unwrap();
    harness.processes.spawn_command(1500, "php ./phd-daemon");
    harness.processes.ignore_everything(1500);

    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();

    assert!(report.rogue.unwrap().is_empty(), "F024 FALSIFIED: tracked overseer reported rogue");
}

/// F025: A failed process scan after signalling is reported, not thrown
#[tokio::test]
async fn f025_scan_failure_keeps_stop_report() {
    let harness = SupervisorTestHarness::new().unwrap();
    let path = harness.dirs.write_overseer("daemon.a", 1600, &[]).unwrap();
    harness
        .processes
        .spawn(1600)
        .exit_after(1600, Signal::Int, Duration::from_secs(1))
        .fail_scans("cannot run ps");

    let report = harness
        .supervisor
        .stop(&StopRequest::new(GRACE))
        .await
        .expect("F025 FALSIFIED: stop failed after signals were sent");

    assert_eq!(report.targeted, vec![1600]);
    assert!(report.survivors.is_empty());
    assert_eq!(report.removed_pid_files, vec![path.clone()]);
    assert!(!path.exists());
    let rogue = report.rogue.as_ref().unwrap();
    assert!(rogue.found.is_empty());
    assert!(rogue.scan_error.as_deref().unwrap().contains("cannot run ps"));
    assert_eq!(report.phases.last(), Some(&StopPhase::Done));
}

/// F026: A failed scan with nothing tracked does not claim nothing is running
#[tokio::test]
async fn f026_scan_failure_without_pid_files() {
    let harness = SupervisorTestHarness::new().unwrap();
    harness.processes.fail_scans("cannot run ps");

    let report = harness.supervisor.stop(&StopRequest::new(GRACE)).await.unwrap();

    assert!(!report.nothing_running, "F026 FALSIFIED: unscanned host reported empty");
    assert!(report.rogue.unwrap().scan_error.is_some());
}

// =============================================================================
// F030-F039: Escalation properties
// =============================================================================

proptest! {
    /// F030: Processes that exit within the grace period never see SIGTERM or SIGKILL
    #[test]
    fn f030_prompt_exits_never_escalate(
        pids in proptest::collection::btree_set(1u32..100_000, 1..8),
        grace_secs in 1u64..30,
        delays in proptest::collection::vec(0u64..1_000_000, 8),
    ) {
        let (_clock, processes, coordinator) = coordinator();
        let grace = Duration::from_secs(grace_secs);
        // The last liveness check happens one poll interval before the deadline.
        let last_check = grace.as_millis() as u64 - 100;
        for (i, &pid) in pids.iter().enumerate() {
            let delay = Duration::from_millis(delays[i] % (last_check + 1));
            processes.spawn(pid).exit_after(pid, Signal::Int, delay);
        }
        let pids: Vec<Pid> = pids.into_iter().collect();

        let survivors = block_on(coordinator.send_stop_signals(&pids, grace));

        prop_assert!(survivors.is_empty());
        prop_assert!(!processes.was_sent(Signal::Term));
        prop_assert!(!processes.was_sent(Signal::Kill));
    }

    /// F031: Processes that never exit get all three signals and all survive
    #[test]
    fn f031_stubborn_processes_get_every_tier(
        pids in proptest::collection::btree_set(1u32..100_000, 1..8),
        grace_secs in 0u64..30,
    ) {
        let (_clock, processes, coordinator) = coordinator();
        for &pid in &pids {
            processes.spawn(pid).ignore_everything(pid);
        }
        let pids: Vec<Pid> = pids.into_iter().collect();

        let survivors = block_on(coordinator.send_stop_signals(&pids, Duration::from_secs(grace_secs)));

        prop_assert_eq!(&survivors, &pids);
        let expected = if grace_secs == 0 {
            vec![Signal::Term, Signal::Kill]
        } else {
            vec![Signal::Int, Signal::Term, Signal::Kill]
        };
        for &pid in &pids {
            prop_assert_eq!(processes.signals_to(pid), expected.clone());
        }
    }

    /// F032: PID 0 is filtered out of any input set
    #[test]
    fn f032_pid_zero_filtered(
        mut pids in proptest::collection::vec(0u32..50, 1..10),
    ) {
        pids.push(0);
        let (_clock, processes, coordinator) = coordinator();
        for &pid in pids.iter().filter(|&&p| p != 0) {
            processes.spawn(pid);
        }

        let survivors = block_on(coordinator.send_stop_signals(&pids, Duration::from_secs(1)));

        prop_assert!(processes.sent().iter().all(|s| s.pid != 0));
        prop_assert!(!survivors.contains(&0));
    }
}
