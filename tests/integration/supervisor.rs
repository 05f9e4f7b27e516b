#[path = "common/mod.rs"]
mod common;

use std::time::Duration;

use mcpbridge::{error::SupervisorError, supervisor::Supervisor};
use tempfile::tempdir;
use tokio::{sync::oneshot, time::Instant};

#[tokio::test]
async fn failing_servers_do_not_affect_the_others() {
    let temp = tempdir().expect("failed to create tempdir");
    let ready_pid = temp.path().join("ready.pid");
    let silent_pid = temp.path().join("silent.pid");

    let config = common::config(
        vec![
            common::sh("announcer", &common::ready_script(&ready_pid)),
            common::sh(
                "silent",
                &format!("echo $$ > '{}'; exec sleep 30", silent_pid.display()),
            ),
            common::command("missing", "mcpbridge-no-such-command", &[]),
            common::sh("crasher", "echo 'failed to boot' >&2; exit 2"),
        ],
        common::settings(1),
    );
    let mut supervisor = Supervisor::with_translator(config, common::native());

    let report = supervisor.start_all().await;
    assert_eq!(report.started, vec!["announcer".to_string(), "silent".to_string()]);
    assert_eq!(report.attempted(), 4);

    let mut failed: Vec<_> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["crasher", "missing"]);

    assert_eq!(supervisor.running().len(), 2);
    assert!(supervisor.server_mut("missing").is_none());

    let ready = common::wait_for_pid_file(&ready_pid);
    let silent = common::wait_for_pid_file(&silent_pid);

    assert_eq!(supervisor.shutdown(), 2);
    assert!(supervisor.running().is_empty());

    common::wait_for_process_exit(ready);
    common::wait_for_process_exit(silent);
}

#[tokio::test]
async fn run_without_servers_is_an_error() {
    let mut supervisor =
        Supervisor::with_translator(common::config(vec![], common::settings(1)), common::native());

    let result = supervisor.run(std::future::pending()).await;
    assert!(matches!(
        result,
        Err(SupervisorError::NoServersStarted { attempted: 0 })
    ));
}

#[tokio::test]
async fn run_fails_when_every_server_fails() {
    let config = common::config(
        vec![
            common::command("missing", "mcpbridge-no-such-command", &[]),
            common::sh("crasher", "exit 1"),
        ],
        common::settings(1),
    );
    let mut supervisor = Supervisor::with_translator(config, common::native());

    let err = supervisor
        .run(std::future::pending())
        .await
        .expect_err("no server can start");
    assert!(matches!(err, SupervisorError::NoServersStarted { attempted: 2 }));
    assert!(err.to_string().contains("No servers could be started"));
}

#[tokio::test]
async fn run_terminates_servers_once_shutdown_resolves() {
    let temp = tempdir().expect("failed to create tempdir");
    let pid_file = temp.path().join("server.pid");

    let config = common::config(
        vec![common::sh("announcer", &common::ready_script(&pid_file))],
        common::settings(5),
    );
    let mut supervisor = Supervisor::with_translator(config, common::native());

    let (tx, rx) = oneshot::channel::<()>();
    let trigger = {
        let pid_file = pid_file.clone();
        async move {
            let pid = tokio::task::spawn_blocking(move || common::wait_for_pid_file(&pid_file))
                .await
                .expect("pid watcher panicked");
            tx.send(()).expect("supervisor stopped listening");
            pid
        }
    };

    let (result, pid) = tokio::join!(
        supervisor.run(async {
            let _ = rx.await;
        }),
        trigger
    );

    assert_eq!(result.expect("run should succeed"), 1);
    assert!(supervisor.running().is_empty());
    common::wait_for_process_exit(pid);
}

#[tokio::test]
async fn servers_start_concurrently() {
    let servers = (0..3)
        .map(|index| common::command(&format!("silent-{index}"), "sleep", &["30"]))
        .collect();
    let mut supervisor =
        Supervisor::with_translator(common::config(servers, common::settings(1)), common::native());

    let started = Instant::now();
    let report = supervisor.start_all().await;
    let elapsed = started.elapsed();

    assert_eq!(report.started.len(), 3);
    assert!(
        elapsed < Duration::from_millis(2500),
        "three 1s readiness timeouts should overlap, took {elapsed:?}"
    );

    let pids: Vec<u32> = supervisor.running().values().map(|server| server.pid()).collect();
    assert_eq!(supervisor.shutdown(), 3);
    for pid in pids {
        common::wait_for_process_exit(pid);
    }
}
