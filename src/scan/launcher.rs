//! Process launcher — runs the engine for a task in its own OS process.
//!
//! Starting a scan:
//! 1. merges the requested options into the task (forced options re-applied),
//! 2. allocates a fresh working directory and records it on the task,
//! 3. spawns the engine with that directory as its cwd, the options as JSON on
//!    stdin and in `options.json`, stdout piped into the task's output buffer
//!    and stderr lines piped into the task's log buffer,
//! 4. hands the child to a reaper that records the exit code.
//!
//! A merged option set and a new working directory stay in place even when the
//! spawn fails; the task simply needs another start.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::capture::CaptureChannel;
use super::lifecycle::{allocate_working_dir, remove_working_dir};
use super::state::ScanHandle;
use crate::error::{Error, FilesystemError, Result};
use crate::task::{OptionValue, TaskId, TaskRegistry};

/// Environment variable carrying the task identity into the worker.
pub const ENV_TASK_ID: &str = "SCANCTL_TASK_ID";
/// Environment variable carrying the working directory into the worker.
pub const ENV_OUTPUT_DIR: &str = "SCANCTL_OUTPUT_DIR";
/// File written into the working directory with the resolved options.
pub const OPTIONS_FILE: &str = "options.json";

/// Read size for the stdout pump.
const READ_CHUNK: usize = 8 * 1024;

/// Whether this platform can run workers as separate processes.
const PROCESS_ISOLATION: bool = cfg!(any(unix, windows));

/// The external engine command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Spawns one isolated worker process per scan.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    engine: EngineCommand,
    scratch_root: Option<PathBuf>,
    blocking: bool,
    // Live workers, including those of tasks no longer in the registry.
    running: Arc<AtomicUsize>,
}

impl ProcessLauncher {
    pub fn new(engine: EngineCommand) -> Self {
        Self {
            engine,
            scratch_root: None,
            blocking: false,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of workers that have been spawned and not yet reaped.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Allocate working directories under `root` instead of the OS temp dir.
    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = Some(root);
        self
    }

    /// Make `start` wait for the worker to exit before returning.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Start a scan for `id` with `requested` options merged in.
    ///
    /// Returns once the worker is running (or, in blocking mode, once it has exited).
    pub async fn start<I>(&self, registry: &TaskRegistry, id: &TaskId, requested: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, OptionValue)>,
    {
        let (scan, capture) = registry
            .with_task(id, |t| (t.scan.clone(), t.capture.clone()))
            .await?;

        let Some(previous) = scan.try_begin().await else {
            return Err(Error::ScanInProgress(id.clone()));
        };

        let prepared = self.prepare(registry, id, requested).await;
        let (workdir, options_json) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                scan.restore(previous).await;
                return Err(e);
            }
        };

        let child = match self.spawn(id, &workdir, options_json) {
            Ok(child) => child,
            Err(e) => {
                scan.restore(previous).await;
                return Err(e);
            }
        };

        info!(task_id = %id, pid = ?child.id(), engine = %self.engine.program, "Scan started");
        self.running.fetch_add(1, Ordering::SeqCst);
        let reaper = spawn_reaper(id.clone(), child, capture, scan, Arc::clone(&self.running));

        if self.blocking {
            if let Err(e) = reaper.await {
                error!(task_id = %id, error = %e, "Scan reaper task failed");
            }
        }
        Ok(())
    }

    /// Merge options, allocate the working directory, write the options file.
    ///
    /// Returns the directory and the serialized options handed to the worker.
    async fn prepare<I>(
        &self,
        registry: &TaskRegistry,
        id: &TaskId,
        requested: I,
    ) -> Result<(PathBuf, String)>
    where
        I: IntoIterator<Item = (String, OptionValue)>,
    {
        let workdir = allocate_working_dir(self.scratch_root.as_deref())?;
        let schema = registry.schema();
        let assigned = registry
            .update(id, |task| {
                task.options.merge(requested, schema);
                // Replaces any previous directory without deleting it.
                task.working_dir = Some(workdir.clone());
                task.options.clone()
            })
            .await;
        let options = match assigned {
            Ok(options) => options,
            Err(e) => {
                // The task was destroyed in the meantime.
                remove_working_dir(&workdir).await?;
                return Err(e);
            }
        };

        debug!(task_id = %id, "Working directory allocated");

        let json = serde_json::to_string_pretty(&options).unwrap_or_else(|_| "{}".to_string());
        tokio::fs::write(workdir.join(OPTIONS_FILE), &json)
            .await
            .map_err(FilesystemError::WriteInput)?;

        Ok((workdir, json))
    }

    fn spawn(&self, id: &TaskId, workdir: &Path, options_json: String) -> Result<Child> {
        if !PROCESS_ISOLATION {
            return Err(Error::IsolationUnavailable {
                reason: "this platform cannot spawn worker processes".to_string(),
            });
        }

        let mut command = Command::new(&self.engine.program);
        command
            .args(&self.engine.args)
            .current_dir(workdir)
            .env(ENV_TASK_ID, id.as_str())
            .env(ENV_OUTPUT_DIR, workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = command.spawn().map_err(|e| {
            warn!(task_id = %id, engine = %self.engine.program, error = %e, "Failed to spawn worker");
            Error::IsolationUnavailable {
                reason: format!("worker could not be spawned ({})", e.kind()),
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let task_id = id.clone();
            tokio::spawn(async move {
                // Engines that ignore stdin may exit before reading it.
                if let Err(e) = stdin.write_all(options_json.as_bytes()).await {
                    debug!(task_id = %task_id, error = %e, "Worker did not read its options");
                }
            });
        }

        Ok(child)
    }
}

/// Pump the worker's pipes into the capture buffers and record its exit.
fn spawn_reaper(
    id: TaskId,
    mut child: Child,
    capture: CaptureChannel,
    scan: ScanHandle,
    running: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    let stdout_pump = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump_output(out, capture.clone())));
    let stderr_pump = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump_log(err, capture)));

    tokio::spawn(async move {
        let returncode = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                error!(task_id = %id, error = %e, "Failed to wait for worker");
                None
            }
        };

        // Drain whatever the worker wrote before exiting.
        for pump in [stdout_pump, stderr_pump].into_iter().flatten() {
            if let Err(e) = pump.await {
                warn!(task_id = %id, error = %e, "Capture pump failed");
            }
        }

        scan.finish(returncode).await;
        running.fetch_sub(1, Ordering::SeqCst);
        info!(task_id = %id, returncode = ?returncode, "Scan finished");
    })
}

async fn pump_output<R>(mut reader: R, capture: CaptureChannel)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => capture.write_output(&buf[..n]).await,
            Err(e) => {
                debug!(error = %e, "Worker stdout closed");
                break;
            }
        }
    }
}

async fn pump_log<R>(reader: R, capture: CaptureChannel)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                // Engines echo raw target content; keep reading past invalid UTF-8.
                let text = String::from_utf8_lossy(&line);
                capture
                    .push_log_line(text.trim_end_matches(|c| c == '\n' || c == '\r'))
                    .await;
            }
            Err(e) => {
                debug!(error = %e, "Worker stderr closed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::scan::capture::DEFAULT_CAPTURE_LIMIT;
    use crate::scan::state::ScanStatus;
    use crate::task::{AdminAuthority, OptionSchema};

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn registry() -> TaskRegistry {
        TaskRegistry::new(
            &AdminAuthority::generate(),
            Arc::new(OptionSchema::builtin()),
            DEFAULT_CAPTURE_LIMIT,
        )
    }

    fn shell(script: &str, scratch: &TempDir) -> ProcessLauncher {
        ProcessLauncher::new(EngineCommand::new("sh").with_args(["-c", script]))
            .with_scratch_root(scratch.path().to_path_buf())
    }

    fn no_options() -> Vec<(String, OptionValue)> {
        Vec::new()
    }

    async fn wait_terminated(scan: &ScanHandle) {
        tokio::time::timeout(TEST_TIMEOUT, async {
            while scan.is_running().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scan did not finish");
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr_separately() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = shell("echo scanning; echo '[INFO] testing' >&2", &scratch).blocking(true);

        launcher.start(&registry, &id, no_options()).await.unwrap();

        let task = registry.get(&id).await.unwrap();
        assert_eq!(task.capture.drain_output().await, "scanning\n");
        assert_eq!(task.capture.drain_log().await, "[INFO] testing\n");
        let report = task.scan.report().await;
        assert_eq!(report.status, ScanStatus::Terminated);
        assert_eq!(report.returncode, Some(0));
    }

    #[tokio::test]
    async fn invalid_utf8_on_stderr_does_not_stop_the_log() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = shell(
            r"echo first >&2; printf 'payload \377\376 here\n' >&2; echo after >&2; echo done",
            &scratch,
        )
        .blocking(true);

        launcher.start(&registry, &id, no_options()).await.unwrap();

        let task = registry.get(&id).await.unwrap();
        assert_eq!(
            task.capture.drain_log().await,
            "first\npayload \u{FFFD}\u{FFFD} here\nafter\n"
        );
        assert_eq!(task.capture.drain_output().await, "done\n");
        assert_eq!(task.scan.report().await.returncode, Some(0));
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn worker_sees_task_identity_workdir_and_options() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = shell(
            r#"echo "$SCANCTL_TASK_ID"; pwd -P; test "$(pwd -P)" = "$(cd "$SCANCTL_OUTPUT_DIR" && pwd -P)" && echo same; cat; test -f options.json && echo file"#,
            &scratch,
        )
        .blocking(true);

        launcher
            .start(
                &registry,
                &id,
                [("url".to_string(), OptionValue::from("http://example.test/a.php?id=1"))],
            )
            .await
            .unwrap();

        let task = registry.get(&id).await.unwrap();
        let output = task.capture.drain_output().await;
        let workdir = task.working_dir.clone().unwrap();

        assert!(output.starts_with(&format!("{id}\n")));
        assert!(output.contains("same\n"));
        assert!(output.contains("\"url\": \"http://example.test/a.php?id=1\""));
        assert!(output.contains("\"batch\": true"));
        assert!(output.ends_with("file\n"));
        assert!(workdir.starts_with(scratch.path()));
        assert_eq!(
            task.options.get("url"),
            Some(&OptionValue::from("http://example.test/a.php?id=1"))
        );
    }

    #[tokio::test]
    async fn non_blocking_start_returns_while_worker_runs() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = shell("read line; echo done", &scratch);

        // `read` consumes the first options line, so the worker exits right after.
        launcher.start(&registry, &id, no_options()).await.unwrap();
        let task = registry.get(&id).await.unwrap();
        wait_terminated(&task.scan).await;
        assert_eq!(task.capture.drain_output().await, "done\n");
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = shell("sleep 2", &scratch);

        launcher.start(&registry, &id, no_options()).await.unwrap();
        let err = launcher.start(&registry, &id, no_options()).await.unwrap_err();
        assert!(matches!(err, Error::ScanInProgress(_)));

        let task = registry.get(&id).await.unwrap();
        wait_terminated(&task.scan).await;
    }

    #[tokio::test]
    async fn each_start_allocates_a_new_directory() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = shell("true", &scratch).blocking(true);

        launcher.start(&registry, &id, no_options()).await.unwrap();
        let first = registry.get(&id).await.unwrap().working_dir.unwrap();
        launcher.start(&registry, &id, no_options()).await.unwrap();
        let second = registry.get(&id).await.unwrap().working_dir.unwrap();

        assert_ne!(first, second);
        // the previous directory is not deleted
        assert!(first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn spawn_failure_is_explicit_and_keeps_merged_state() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        let launcher = ProcessLauncher::new(EngineCommand::new("/nonexistent/scan-engine"))
            .with_scratch_root(scratch.path().to_path_buf());

        let err = launcher
            .start(&registry, &id, [("level".to_string(), OptionValue::Integer(3))])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IsolationUnavailable { .. }));
        assert!(!err.to_string().contains("/nonexistent"));

        let task = registry.get(&id).await.unwrap();
        assert_eq!(task.options.get("level"), Some(&OptionValue::Integer(3)));
        assert!(task.working_dir.unwrap().is_dir());
        assert_eq!(task.scan.report().await.status, ScanStatus::NotRunning);
    }

    #[tokio::test]
    async fn unknown_task_is_rejected() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let err = shell("true", &scratch)
            .start(&registry, &TaskId::from("missing"), no_options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTask(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_recorded() {
        let scratch = TempDir::new().unwrap();
        let registry = registry();
        let id = registry.create().await;
        shell("exit 3", &scratch)
            .blocking(true)
            .start(&registry, &id, no_options())
            .await
            .unwrap();
        let report = registry.get(&id).await.unwrap().scan.report().await;
        assert_eq!(report.returncode, Some(3));
    }

    #[tokio::test]
    async fn concurrent_tasks_keep_their_own_output() {
        let scratch = TempDir::new().unwrap();
        let registry = Arc::new(registry());
        let launcher = shell(
            r#"i=0; while [ $i -lt 20 ]; do echo "out $SCANCTL_TASK_ID"; echo "log $SCANCTL_TASK_ID" >&2; i=$((i+1)); done"#,
            &scratch,
        )
        .blocking(true);

        let a = registry.create().await;
        let b = registry.create().await;
        let (ra, rb) = tokio::join!(
            launcher.start(&registry, &a, no_options()),
            launcher.start(&registry, &b, no_options())
        );
        ra.unwrap();
        rb.unwrap();

        for (id, other) in [(&a, &b), (&b, &a)] {
            let task = registry.get(id).await.unwrap();
            let out = task.capture.drain_output().await;
            let log = task.capture.drain_log().await;
            assert_eq!(out.lines().count(), 20);
            assert_eq!(log.lines().count(), 20);
            assert!(!out.contains(other.as_str()));
            assert!(!log.contains(other.as_str()));
        }
    }
}
