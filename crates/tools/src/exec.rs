//! Shell execution with cooperative cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use rh_domain::CancelToken;

/// Default hard cap on one shell command.
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run a shell command, returning combined stdout/stderr.
///
/// The child is polled every 100 ms: a set cancel token or an elapsed
/// timeout kills it immediately. Spawn failures, timeouts, and
/// interruptions all come back as textual results.
pub async fn execute_shell(
    command: &str,
    cwd: Option<&Path>,
    timeout: Duration,
    cancel: &CancelToken,
) -> String {
    if cancel.is_cancelled() {
        return "[System]: Command execution was interrupted by user.".to_owned();
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return format!("[System Error]: failed to spawn command: {e}"),
    };

    let output = Arc::new(Mutex::new(String::new()));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, output.clone()));
    }

    let started = tokio::time::Instant::now();
    loop {
        if cancel.is_cancelled() {
            let _ = child.kill().await;
            return "[System]: Command execution was interrupted by user.".to_owned();
        }
        if started.elapsed() > timeout {
            let _ = child.kill().await;
            return format!("[Error]: Command timed out after {}s.", timeout.as_secs());
        }
        match child.try_wait() {
            Ok(Some(_status)) => break,
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => return format!("[System Error]: waiting for command failed: {e}"),
        }
    }

    for reader in readers {
        let _ = reader.await;
    }

    let captured = output.lock().trim_end().to_owned();
    if captured.is_empty() {
        "[System]: Command executed successfully (no visual output).".to_owned()
    } else {
        captured
    }
}

fn spawn_reader(
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    output: Arc<Mutex<String>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buf = output.lock();
            buf.push_str(&line);
            buf.push('\n');
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = execute_shell(
            "echo visible; echo hidden 1>&2",
            None,
            SHELL_TIMEOUT,
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("visible"));
        assert!(out.contains("hidden"));
    }

    #[tokio::test]
    async fn silent_success_reports_system_notice() {
        let out = execute_shell("true", None, SHELL_TIMEOUT, &CancelToken::new()).await;
        assert!(out.contains("[System]"));
    }

    #[tokio::test]
    async fn respects_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "x").unwrap();
        let out = execute_shell("ls", Some(tmp.path()), SHELL_TIMEOUT, &CancelToken::new()).await;
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let started = std::time::Instant::now();
        let out = execute_shell(
            "sleep 30",
            None,
            Duration::from_millis(300),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancel_interrupts_within_a_poll_slice() {
        let cancel = CancelToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel2.cancel();
        });

        let started = std::time::Instant::now();
        let out = execute_shell("sleep 30", None, SHELL_TIMEOUT, &cancel).await;
        assert!(out.contains("interrupted"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn pre_cancelled_token_skips_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = execute_shell("echo never", None, SHELL_TIMEOUT, &cancel).await;
        assert!(out.contains("interrupted"));
        assert!(!out.contains("never"));
    }
}
