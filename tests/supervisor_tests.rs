//! End-to-end supervision scenarios driven through real child processes.

use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;

use launch::{
    collect_secrets, Config, DefaultLoggerConfig, InternalLogger, LogManager, LoggingConfig,
    ProcessSpec, ProcessesConfig, SignalReplicator, Supervisor,
};

fn devnull() -> LoggingConfig {
    LoggingConfig {
        engine: "devnull".to_string(),
        process_name: "test".to_string(),
        ..LoggingConfig::default()
    }
}

fn shell_proc(name: &str, script: &str) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        command: "/bin/sh".to_string(),
        arguments: vec!["-c".to_string(), script.to_string()],
        logging_config: devnull(),
        termination_timeout_seconds: 5,
        ..ProcessSpec::default()
    }
}

async fn build_supervisor(processes: ProcessesConfig) -> (Supervisor, SignalReplicator) {
    let mut manager = LogManager::new(DefaultLoggerConfig::default());
    manager
        .start(&processes, &devnull())
        .await
        .expect("log manager should start");
    let manager = Arc::new(manager);
    let pmlogger = InternalLogger::new(devnull(), Arc::clone(&manager));
    let replicator = SignalReplicator::new();
    let supervisor = Supervisor::new(processes, manager, pmlogger, replicator.clone());
    (supervisor, replicator)
}

#[tokio::test]
async fn init_failure_stops_the_sequence() {
    let processes = ProcessesConfig {
        init_processes: vec![
            shell_proc("first", "exit 0"),
            shell_proc("second", "exit 1"),
            shell_proc("third", "exit 0"),
        ],
        ..ProcessesConfig::default()
    };
    let (supervisor, _replicator) = build_supervisor(processes).await;

    let err = supervisor.run_inits().await.unwrap_err();
    assert!(err.to_string().contains("second"));

    let states = supervisor.exit_states();
    assert_eq!(states.len(), 2, "the third init must never spawn");
    assert_eq!(states[0].name, "first");
    assert_eq!(states[0].exit_code, 0);
    assert_eq!(states[1].name, "second");
    assert_ne!(states[1].exit_code, 0);
}

#[tokio::test]
async fn main_exit_cascades_termination_to_siblings() {
    let processes = ProcessesConfig {
        main_processes: vec![
            shell_proc("short", "sleep 1; exit 0"),
            shell_proc("long", "sleep 30"),
        ],
        ..ProcessesConfig::default()
    };
    let (supervisor, _replicator) = build_supervisor(processes).await;

    let mut report = supervisor.run_mains().await;
    let json = tokio::time::timeout(Duration::from_secs(15), report.recv())
        .await
        .expect("mains should all terminate well before the timeout")
        .expect("the report channel delivers exactly one message");

    let states = supervisor.exit_states();
    assert_eq!(states.len(), 2);
    let short = states.iter().find(|s| s.name == "short").unwrap();
    assert_eq!(short.exit_code, 0);
    let long = states.iter().find(|s| s.name == "long").unwrap();
    assert_ne!(long.exit_code, 0, "the sibling must have been terminated");

    assert!(json.contains(r#""name":"short""#));
    assert!(json.contains(r#""name":"long""#));
}

#[tokio::test]
async fn stubborn_main_is_force_killed_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawns");
    let mut spec = shell_proc(
        "stubborn",
        &format!(
            "echo spawn >> {}; trap '' TERM; sleep 15",
            marker.display()
        ),
    );
    spec.termination_timeout_seconds = 1;
    spec.restart_count = 3;

    let processes = ProcessesConfig {
        main_processes: vec![spec],
        ..ProcessesConfig::default()
    };
    let (supervisor, replicator) = build_supervisor(processes).await;

    let mut report = supervisor.run_mains().await;
    // Let the shell install its trap before the signal lands.
    tokio::time::sleep(Duration::from_millis(500)).await;
    replicator.send(Signal::SIGTERM);

    tokio::time::timeout(Duration::from_secs(8), report.recv())
        .await
        .expect("force kill should fire about a second after the TERM")
        .expect("report must arrive");

    let states = supervisor.exit_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].exit_code, 9, "the child should die on SIGKILL");

    // TERM relay latches block_restarts; the budget must not be spent.
    let spawns = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(spawns.lines().count(), 1);
}

#[tokio::test]
async fn restart_budget_bounds_spawn_count() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("attempts");
    let mut spec = shell_proc("flaky", &format!("echo run >> {}; exit 1", marker.display()));
    spec.restart_count = 2;

    let processes = ProcessesConfig {
        main_processes: vec![spec],
        ..ProcessesConfig::default()
    };
    let (supervisor, _replicator) = build_supervisor(processes).await;

    let mut report = supervisor.run_mains().await;
    tokio::time::timeout(Duration::from_secs(10), report.recv())
        .await
        .expect("a failing process with a small budget finishes quickly")
        .expect("report must arrive");

    // Budget of N allows the first run plus N restarts.
    let attempts = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(attempts.lines().count(), 3);

    // One terminal exit state, not one per attempt.
    let states = supervisor.exit_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].exit_code, 1);
}

#[tokio::test]
async fn zero_restart_count_means_no_restart() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("attempts");
    let spec = shell_proc("once", &format!("echo run >> {}; exit 1", marker.display()));
    // restart_count stays 0.

    let processes = ProcessesConfig {
        main_processes: vec![spec],
        ..ProcessesConfig::default()
    };
    let (supervisor, _replicator) = build_supervisor(processes).await;

    let mut report = supervisor.run_mains().await;
    tokio::time::timeout(Duration::from_secs(5), report.recv())
        .await
        .expect("single failing run finishes quickly")
        .expect("report must arrive");

    let attempts = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(attempts.lines().count(), 1);
}

#[tokio::test]
async fn secrets_resolve_in_the_second_render() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("launch.yaml");
    std::fs::write(
        &config_path,
        r#"
processes:
  secret_processes:
    - name: injector
      command: echo
      arguments: ['{"LAUNCH_IT_SECRET_K": "V"}']
  main_processes:
    - name: consumer
      command: /bin/sh
      arguments: ["-c", 'echo {{ env "LAUNCH_IT_SECRET_K" }}']
"#,
    )
    .unwrap();

    std::env::remove_var("LAUNCH_IT_SECRET_K");

    // First render: the secret is not in the environment yet.
    let first = Config::load(&config_path).unwrap();
    assert_eq!(first.processes.main_processes[0].arguments[1], "echo ");

    let mut manager = LogManager::new(DefaultLoggerConfig::default());
    manager
        .start(&ProcessesConfig::default(), &devnull())
        .await
        .unwrap();
    let pmlogger = InternalLogger::new(devnull(), Arc::new(manager));
    collect_secrets(&first.processes.secret_processes, &pmlogger)
        .await
        .unwrap();

    // Second render sees the exported value.
    let second = Config::load(&config_path).unwrap();
    assert_eq!(second.processes.main_processes[0].arguments[1], "echo V");
}

#[tokio::test]
async fn replicator_registrations_follow_process_lifecycles() {
    let processes = ProcessesConfig {
        main_processes: vec![
            shell_proc("a", "sleep 1"),
            shell_proc("b", "sleep 1"),
        ],
        ..ProcessesConfig::default()
    };
    let (supervisor, replicator) = build_supervisor(processes).await;

    let mut report = supervisor.run_mains().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(replicator.subscriber_count(), 2);

    tokio::time::timeout(Duration::from_secs(10), report.recv())
        .await
        .expect("both mains finish fast")
        .expect("report must arrive");
    assert_eq!(replicator.subscriber_count(), 0);
}
