// Examples are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! phd Supervisor Example
//!
//! A small operator CLI over the supervisor, with four demo daemons
//! registered.
//!
//! # Usage
//!
//! ```bash
//! # Launch the standard set
//! cargo run --example phd -- start
//!
//! # Stop everything, waiting up to 5s for SIGINT before escalating
//! cargo run --example phd -- stop --graceful 5
//!
//! # Run one daemon in the foreground with tracing
//! cargo run --example phd -- debug trigger --as-current-user
//! ```
//!
//! Set `PHD_CONFIG` to a TOML file to override the defaults, and
//! `RUST_LOG=debug` for more detail.

use std::time::Duration;

use async_trait::async_trait;
use phd::prelude::*;
use tracing_subscriber::EnvFilter;

/// Demo daemon that idles until stopped.
struct IdleDaemon {
    name: &'static str,
}

#[async_trait]
impl Daemon for IdleDaemon {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&mut self, argv: &[String]) -> phd::core::Result<()> {
        tracing::info!(daemon = self.name, ?argv, "idling");
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }
}

fn registry() -> DaemonRegistry {
    let mut registry = DaemonRegistry::new();
    for name in [
        "RepositoryPullLocalDaemon",
        "GarbageCollectorDaemon",
        "TriggerDaemon",
        "TaskmasterDaemon",
    ] {
        registry.register(name, move || Box::new(IdleDaemon { name }));
    }
    registry
}

fn usage() {
    println!("phd Supervisor Example");
    println!();
    println!("Usage: phd <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  start [--keep-leases]                         Launch the standard daemons");
    println!("  stop [PID...] [--graceful N] [--force|--gently]");
    println!("                                                Stop daemons");
    println!("  restart [--graceful N] [--force|--gently] [--keep-leases]");
    println!("                                                Stop, then start");
    println!("  status                                        Show known daemons");
    println!("  list                                          List available daemons");
    println!("  launch <DAEMON> [ARGV...]                     Launch one daemon");
    println!("  debug <DAEMON> [ARGV...] [--as-current-user]  Run one daemon in the foreground");
}

/// Parsed stop options plus the remaining positional arguments.
fn stop_request(args: &[String], grace: Duration) -> anyhow::Result<(StopRequest, Vec<String>)> {
    let mut request = StopRequest::new(grace);
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--graceful" => {
                let secs: u64 = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--graceful needs a number of seconds"))?
                    .parse()?;
                request.grace_period = Duration::from_secs(secs);
            }
            "--force" => request = request.force(true),
            "--gently" => request = request.gently(true),
            _ => rest.push(arg.clone()),
        }
    }
    Ok((request, rest))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        usage();
        std::process::exit(1);
    };
    if command == "--help" || command == "-h" {
        usage();
        return Ok(());
    }

    let config = match std::env::var_os("PHD_CONFIG") {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };
    let grace = config.grace_period;
    let supervisor = unix_supervisor(config).registry(registry()).build()?;

    let rest = &args[1..];
    let keep_leases = rest.iter().any(|a| a == "--keep-leases");
    let positional: Vec<String> = rest
        .iter()
        .filter(|a| *a != "--keep-leases")
        .cloned()
        .collect();

    let code = match command {
        "start" => supervisor.start(keep_leases).await?.exit_code(),
        "stop" => {
            let (request, pids) = stop_request(&positional, grace)?;
            let report = supervisor.stop(&request.with_pids(pids)).await?;
            for pid in &report.survivors {
                println!("Process {pid} did not exit.");
            }
            report.exit_code()
        }
        "restart" => {
            let (request, _) = stop_request(&positional, grace)?;
            supervisor.restart(&request, keep_leases).await?.exit_code()
        }
        "status" => {
            let entries = supervisor.status().await?;
            if entries.is_empty() {
                println!("There are no running daemons.");
            }
            println!("{:<8} {:<6} {:<28} {:<8}", "PID", "ID", "DAEMON", "STATE");
            for entry in entries {
                println!(
                    "{:<8} {:<6} {:<28} {:<8}",
                    entry.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                    entry.log_id.as_deref().unwrap_or("-"),
                    entry.class.as_deref().unwrap_or("-"),
                    if entry.running { "running" } else { "dead" },
                );
            }
            0
        }
        "list" => {
            for name in supervisor.list_available()? {
                println!("{name}");
            }
            0
        }
        "launch" | "debug" => {
            let debug = command == "debug";
            let as_current_user = positional.iter().any(|a| a == "--as-current-user");
            let mut words = positional.into_iter().filter(|a| a != "--as-current-user");
            let Some(daemon) = words.next() else {
                anyhow::bail!("{command} needs a daemon name; try 'phd list'");
            };
            let request = LaunchRequest::new(daemon)
                .with_argv(words.collect())
                .debug(debug)
                .as_current_user(as_current_user);
            match supervisor.launch(&request).await? {
                LaunchOutcome::Foreground { exit_code, .. } => exit_code,
                LaunchOutcome::Detached { .. } => 0,
            }
        }
        other => {
            eprintln!("unknown command '{other}'");
            usage();
            1
        }
    };

    std::process::exit(code);
}
