//! Out-of-process skill execution.
//!
//! Entrypoints run in the skill's own directory with combined
//! stdout/stderr capture, a 4-minute wall-clock cap, and a cancel token
//! polled every 100 ms.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use rh_domain::CancelToken;

/// Hard wall-clock cap on one skill invocation.
pub const SKILL_TIMEOUT: Duration = Duration::from_secs(240);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run a skill entrypoint with JSON arguments flattened to `--key value`
/// pairs. Any failure comes back as a textual `[Error]` result so the
/// model can adapt; only the transport around the loop treats errors as
/// fatal.
pub async fn run_entrypoint(
    skill_dir: &Path,
    entrypoint: &str,
    args: &serde_json::Value,
    cancel: &CancelToken,
) -> String {
    let entry_path = skill_dir.join(entrypoint);
    if !entry_path.exists() {
        return format!("[Error]: Entrypoint '{entrypoint}' not found in skill directory.");
    }

    let mut cmd = interpreter_for(entrypoint, &entry_path);
    cmd.current_dir(skill_dir);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    if let Some(map) = args.as_object() {
        for (key, value) in map {
            cmd.arg(format!("--{key}"));
            match value {
                serde_json::Value::String(s) => cmd.arg(s),
                other => cmd.arg(other.to_string()),
            };
        }
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return format!("[Error]: Failed to spawn entrypoint: {e}"),
    };

    // Readers merge both pipes into one buffer, line by line.
    let output = Arc::new(Mutex::new(String::new()));
    let mut reader_tasks = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        reader_tasks.push(spawn_reader(stdout, output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        reader_tasks.push(spawn_reader(stderr, output.clone()));
    }

    let started = tokio::time::Instant::now();
    let status = loop {
        if cancel.is_cancelled() {
            let _ = child.kill().await;
            return "[System]: Skill execution cancelled.".to_owned();
        }
        if started.elapsed() > SKILL_TIMEOUT {
            let _ = child.kill().await;
            return format!(
                "[Error]: Skill execution timed out after {}s.",
                SKILL_TIMEOUT.as_secs()
            );
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => return format!("[Error]: Waiting for skill process failed: {e}"),
        }
    };

    for task in reader_tasks {
        let _ = task.await;
    }

    let captured = output.lock().trim().to_owned();
    if captured.is_empty() {
        if status.success() {
            "Skill executed successfully (no output).".to_owned()
        } else {
            format!("[Error]: Skill exited with status {status} and no output.")
        }
    } else if status.success() {
        captured
    } else {
        format!("[Error]: Skill exited with status {status}.\n{captured}")
    }
}

fn interpreter_for(entrypoint: &str, entry_path: &Path) -> Command {
    if entrypoint.ends_with(".py") {
        let mut cmd = Command::new("python3");
        cmd.arg(entry_path);
        cmd
    } else if entrypoint.ends_with(".sh") {
        let mut cmd = Command::new("sh");
        cmd.arg(entry_path);
        cmd
    } else {
        Command::new(entry_path)
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
