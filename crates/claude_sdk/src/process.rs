use std::{
    collections::BTreeMap,
    fmt,
    io,
    path::{Path, PathBuf},
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf},
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AbortError, ClaudeError, ProcessError};

/// Everything needed to run the CLI once.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Written to the child's stdin, which is then closed. `None` attaches stdin to null.
    pub stdin: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// Layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Cancelling this token kills the child.
    pub cancel: CancellationToken,
}

impl Invocation {
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
            stdin: None,
            working_dir: None,
            env: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.working_dir.as_ref() {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

/// Readable stdout of a running CLI process.
#[async_trait]
pub trait ProcessOutput: AsyncRead + Send + Unpin {
    /// Closes the pipe and reaps the process.
    ///
    /// Reports a non-zero exit as [`ProcessError`] and a kill caused by cancellation as
    /// [`AbortError`]. Calling it again after it returned is a no-op.
    async fn close(&mut self) -> Result<(), ClaudeError>;
}

/// Output of a CLI run that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Stdout followed by stderr.
    pub fn combined(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        combined.extend_from_slice(&self.stdout);
        combined.extend_from_slice(&self.stderr);
        combined
    }
}

/// Runs CLI invocations. [`ProcessExecutor`] is the real implementation; tests substitute
/// scripted ones through [`crate::ClaudeClientBuilder::executor`].
#[async_trait]
pub trait CommandExecutor: fmt::Debug + Send + Sync {
    /// Runs to completion and returns the captured output.
    async fn execute(&self, invocation: Invocation) -> Result<CommandOutput, ClaudeError>;

    /// Starts the process and hands back its stdout; stderr is captured for error reporting.
    async fn execute_stream(
        &self,
        invocation: Invocation,
    ) -> Result<Box<dyn ProcessOutput>, ClaudeError>;
}

type StdinTask = JoinHandle<Result<(), ClaudeError>>;

/// Spawns the CLI with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    mirror_stderr: bool,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo the child's stderr to this process's stderr while capturing it.
    pub fn mirror_stderr(mut self, enabled: bool) -> Self {
        self.mirror_stderr = enabled;
        self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, invocation: Invocation) -> Result<CommandOutput, ClaudeError> {
        let mut command = invocation.command();
        let mut child = spawn_with_retry(&mut command, &invocation.binary)?;
        debug!(binary = ?invocation.binary, pid = ?child.id(), "spawned claude");

        let stdout = child.stdout.take().ok_or(ClaudeError::MissingStdout)?;
        let stderr = child.stderr.take().ok_or(ClaudeError::MissingStderr)?;
        let stdout_task = tokio::spawn(tee_stream(stdout, false));
        let stderr_task = tokio::spawn(tee_stream(stderr, self.mirror_stderr));
        let stdin_task = spawn_stdin(&mut child, invocation.stdin)?;

        let status = tokio::select! {
            biased;
            () = invocation.cancel.cancelled() => {
                stdout_task.abort();
                stderr_task.abort();
                if let Some(task) = stdin_task {
                    task.abort();
                }
                child.kill().await.map_err(ClaudeError::Wait)?;
                debug!(binary = ?invocation.binary, "killed cancelled claude process");
                return Err(AbortError::default().into());
            }
            status = child.wait() => status.map_err(ClaudeError::Wait)?,
        };

        if let Some(task) = stdin_task {
            join(task).await??;
        }
        let output = CommandOutput {
            stdout: join(stdout_task).await?.map_err(ClaudeError::StdoutRead)?,
            stderr: join(stderr_task).await?.map_err(ClaudeError::StderrRead)?,
        };

        if !status.success() {
            let err =
                ProcessError::from_status(status, String::from_utf8_lossy(&output.combined()));
            debug!(
                binary = ?invocation.binary,
                exit_code = err.exit_code,
                "claude exited non-zero"
            );
            return Err(err.into());
        }

        if !output.stderr.is_empty() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr), "claude wrote to stderr");
        }
        debug!(binary = ?invocation.binary, bytes = output.stdout.len(), "received claude output");
        Ok(output)
    }

    async fn execute_stream(
        &self,
        invocation: Invocation,
    ) -> Result<Box<dyn ProcessOutput>, ClaudeError> {
        let mut command = invocation.command();
        let mut child = spawn_with_retry(&mut command, &invocation.binary)?;
        debug!(binary = ?invocation.binary, pid = ?child.id(), "spawned streaming claude");

        let stdout = child.stdout.take().ok_or(ClaudeError::MissingStdout)?;
        let stderr = child.stderr.take().ok_or(ClaudeError::MissingStderr)?;
        let stderr_task = tokio::spawn(tee_stream(stderr, self.mirror_stderr));
        let stdin_task = spawn_stdin(&mut child, invocation.stdin)?;

        Ok(Box::new(ProcessStream {
            stdout: Some(stdout),
            child,
            stdin_task,
            stderr_task: Some(stderr_task),
            cancel: invocation.cancel,
            closed: false,
        }))
    }
}

/// Stdout of a streaming child plus everything needed to reap it.
pub struct ProcessStream {
    stdout: Option<ChildStdout>,
    child: Child,
    stdin_task: Option<StdinTask>,
    stderr_task: Option<JoinHandle<io::Result<Vec<u8>>>>,
    cancel: CancellationToken,
    closed: bool,
}

impl ProcessStream {
    async fn kill(&mut self) -> Result<(), ClaudeError> {
        if let Some(task) = self.stdin_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        let pid = self.child.id();
        self.child.kill().await.map_err(ClaudeError::Wait)?;
        debug!(pid = ?pid, "killed cancelled claude process");
        Err(AbortError::default().into())
    }
}

impl fmt::Debug for ProcessStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessStream")
            .field("pid", &self.child.id())
            .field("closed", &self.closed)
            .finish()
    }
}

impl AsyncRead for ProcessStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().stdout.as_mut() {
            Some(stdout) => Pin::new(stdout).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

#[async_trait]
impl ProcessOutput for ProcessStream {
    async fn close(&mut self) -> Result<(), ClaudeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        drop(self.stdout.take());

        let status = if self.cancel.is_cancelled() {
            match self.child.try_wait().map_err(ClaudeError::Wait)? {
                Some(status) => status,
                None => return self.kill().await,
            }
        } else {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.kill().await,
                status = self.child.wait() => status.map_err(ClaudeError::Wait)?,
            }
        };

        if let Some(task) = self.stdin_task.take() {
            join(task).await??;
        }
        let stderr = match self.stderr_task.take() {
            Some(task) => join(task).await?.map_err(ClaudeError::StderrRead)?,
            None => Vec::new(),
        };

        if !status.success() {
            let err = ProcessError::from_status(status, String::from_utf8_lossy(&stderr));
            debug!(exit_code = err.exit_code, "streaming claude exited non-zero");
            return Err(err.into());
        }
        Ok(())
    }
}

/// Feeds `input` to the child from its own task so a child that never drains stdin cannot
/// stall the caller past cancellation.
fn spawn_stdin(
    child: &mut Child,
    input: Option<String>,
) -> Result<Option<StdinTask>, ClaudeError> {
    let Some(input) = input else {
        return Ok(None);
    };
    let stdin = child.stdin.take().ok_or_else(|| {
        ClaudeError::StdinWrite(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "missing stdin pipe",
        ))
    })?;
    Ok(Some(tokio::spawn(write_stdin(stdin, input))))
}

async fn write_stdin(mut stdin: ChildStdin, input: String) -> Result<(), ClaudeError> {
    // The child may exit without reading its input; that is not a write failure.
    let tolerate_broken_pipe = |result: io::Result<()>| match result {
        Err(source) if source.kind() != io::ErrorKind::BrokenPipe => {
            Err(ClaudeError::StdinWrite(source))
        }
        _ => Ok(()),
    };
    tolerate_broken_pipe(stdin.write_all(input.as_bytes()).await)?;
    tolerate_broken_pipe(stdin.shutdown().await)?;
    Ok(())
}

async fn join<T>(task: JoinHandle<T>) -> Result<T, ClaudeError> {
    task.await.map_err(|e| ClaudeError::Join(e.to_string()))
}

/// Collects everything `reader` yields, echoing it to this process's stderr when `mirror` is set.
pub(crate) async fn tee_stream<R>(mut reader: R, mirror: bool) -> Result<Vec<u8>, io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut console = tokio::io::stderr();
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if mirror {
            console.write_all(&chunk[..n]).await?;
            console.flush().await?;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(buffer)
}

pub(crate) fn spawn_with_retry(command: &mut Command, binary: &Path) -> Result<Child, ClaudeError> {
    let mut backoff = Duration::from_millis(2);
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                // ETXTBSY: the binary was written moments ago and is still open for writing.
                let is_busy = source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    attempt += 1;
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(ClaudeError::Spawn {
                    binary: binary.to_path_buf(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_applies_dir_env_and_stdin_mode() {
        let mut invocation = Invocation::new("claude", vec!["--print".to_string()]);
        invocation.working_dir = Some(PathBuf::from("/tmp"));
        invocation
            .env
            .insert("DISABLE_AUTOUPDATER".to_string(), "1".to_string());

        let command = invocation.command();
        let std_command = command.as_std();
        assert_eq!(std_command.get_program(), "claude");
        assert_eq!(
            std_command.get_args().collect::<Vec<_>>(),
            vec![std::ffi::OsStr::new("--print")]
        );
        assert_eq!(std_command.get_current_dir(), Some(Path::new("/tmp")));
        assert!(std_command
            .get_envs()
            .any(|(k, v)| k == "DISABLE_AUTOUPDATER" && v == Some(std::ffi::OsStr::new("1"))));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = ProcessExecutor::new()
            .execute(Invocation::new(
                "/definitely/not/a/real/claude-binary",
                Vec::new(),
            ))
            .await
            .unwrap_err();
        match err {
            ClaudeError::Spawn { binary, source } => {
                assert_eq!(binary, PathBuf::from("/definitely/not/a/real/claude-binary"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tee_stream_collects_everything() {
        let data = vec![b'x'; 10_000];
        let out = tee_stream(&data[..], false).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn tee_stream_mirrors_on_a_current_thread_runtime() {
        let out = tee_stream(&b"warn: mirrored\n"[..], true).await.unwrap();
        assert_eq!(out, b"warn: mirrored\n");
    }

    #[test]
    fn combined_output_puts_stdout_first() {
        let output = CommandOutput {
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
        };
        assert_eq!(output.combined(), b"out\nerr\n");
    }
}
