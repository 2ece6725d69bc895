//! Process launch and concurrent stream draining.
//!
//! [`ProcessRunner::launch`] starts the tool and immediately spawns:
//!
//! ```text
//! ┌──────────────┐   stdin payload   ┌───────────┐
//! │ writer task  │──────────────────▶│           │──stdout──▶ reader task ─▶ BoundedBuffer (1 MiB)
//! └──────────────┘                   │   child   │
//!                                    │           │──stderr──▶ reader task ─▶ BoundedBuffer (64 KiB)
//!                                    └───────────┘
//! ```
//!
//! All three tasks run concurrently with each other and with the exit wait
//! in [`LifecycleController`](super::LifecycleController).  Draining only
//! one pipe, or draining after exit, lets a child that fills the other OS
//! pipe buffer block forever.
//!
//! On Unix the child leads its own process group so the whole tree can be
//! signalled at once; on Windows `taskkill /T` walks the tree.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::buffer::{BoundedBuffer, CapturedOutput};
use super::error::RewriteError;
use super::invocation::InvocationSpec;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const READ_CHUNK_BYTES: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// ProcessRunner
// ---------------------------------------------------------------------------

/// Launches tool processes with bounded output capture.
#[derive(Debug)]
pub struct ProcessRunner {
    stdout_cap: usize,
    stderr_cap: usize,
    spawned: AtomicUsize,
}

impl ProcessRunner {
    pub fn new(stdout_cap: usize, stderr_cap: usize) -> Self {
        Self {
            stdout_cap,
            stderr_cap,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Number of processes successfully started so far.
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Start the process described by `spec` and begin draining its output.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`RewriteError::Configuration`] when the process cannot be started.
    pub fn launch(&self, spec: &InvocationSpec) -> Result<RunningProcess, RewriteError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let child = cmd.spawn().map_err(|e| {
            RewriteError::Configuration(format!(
                "cannot start rewrite tool {}: {e}",
                spec.program.display()
            ))
        })?;
        self.spawned.fetch_add(1, Ordering::Relaxed);

        let pid = child.id();
        log::debug!("runner: started {} (pid {pid:?})", spec.program.display());

        // From here on the process is owned by `process`; any early return
        // drops it, which kills the tree.
        let mut process = RunningProcess {
            child,
            pid,
            stdout: None,
            stderr: None,
            stdin: None,
            stdout_cap: self.stdout_cap,
            stderr_cap: self.stderr_cap,
            reaped: false,
        };

        let stdout = process
            .child
            .stdout
            .take()
            .ok_or_else(|| RewriteError::Unexpected("child stdout was not captured".into()))?;
        let stderr = process
            .child
            .stderr
            .take()
            .ok_or_else(|| RewriteError::Unexpected("child stderr was not captured".into()))?;

        process.stdout = Some(tokio::spawn(drain(
            stdout,
            BoundedBuffer::new(self.stdout_cap),
            "stdout",
        )));
        process.stderr = Some(tokio::spawn(drain(
            stderr,
            BoundedBuffer::new(self.stderr_cap),
            "stderr",
        )));

        if let (Some(mut pipe), Some(payload)) = (process.child.stdin.take(), spec.stdin.clone()) {
            process.stdin = Some(tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&payload).await {
                    // The tool may exit without reading all of its input.
                    log::debug!("runner: stdin write stopped: {e}");
                }
                // Dropping `pipe` closes the child's stdin.
            }));
        }

        Ok(process)
    }
}

/// Copy `reader` into `sink` until EOF, discarding whatever exceeds the cap.
async fn drain<R>(mut reader: R, mut sink: BoundedBuffer, stream: &'static str) -> BoundedBuffer
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.push(&chunk[..n]),
            Err(e) => {
                log::debug!("runner: {stream} reader stopped: {e}");
                break;
            }
        }
    }
    if sink.is_truncated() {
        log::warn!(
            "runner: {stream} exceeded {} bytes, {} bytes dropped",
            sink.capacity(),
            sink.dropped()
        );
    }
    sink
}

// ---------------------------------------------------------------------------
// RunningProcess
// ---------------------------------------------------------------------------

/// A launched tool process and its I/O tasks.
///
/// Dropping an un-reaped `RunningProcess` kills the whole process tree and
/// aborts the I/O tasks, so a cancelled or panicking caller cannot leak it.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Option<JoinHandle<BoundedBuffer>>,
    stderr: Option<JoinHandle<BoundedBuffer>>,
    stdin: Option<JoinHandle<()>>,
    stdout_cap: usize,
    stderr_cap: usize,
    reaped: bool,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` once the exit status has been collected.
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    /// Wait for the child to exit.  Cancel-safe; repeated calls after exit
    /// return the same status.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status)
    }

    /// Kill the process and every descendant.
    ///
    /// The group signal goes first; a direct kill follows for platforms or
    /// cases where the group could not be reached.  Already-exited processes
    /// are not an error.
    pub fn kill_tree(&mut self) -> io::Result<()> {
        let group = match self.pid {
            Some(pid) => kill_process_tree(pid),
            None => Ok(()),
        };
        if !self.reaped {
            match self.child.start_kill() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => return Err(e),
            }
        }
        group
    }

    /// Join the writer and both readers.  Cancel-safe: a task is only
    /// forgotten after it has been joined.
    pub async fn collect_output(&mut self) -> CapturedOutput {
        if let Some(writer) = self.stdin.as_mut() {
            if let Err(e) = writer.await {
                log::debug!("runner: stdin writer task failed: {e}");
            }
            self.stdin = None;
        }
        let stdout = join_reader(&mut self.stdout, self.stdout_cap).await;
        let stderr = join_reader(&mut self.stderr, self.stderr_cap).await;
        CapturedOutput { stdout, stderr }
    }
}

async fn join_reader(slot: &mut Option<JoinHandle<BoundedBuffer>>, cap: usize) -> BoundedBuffer {
    let Some(handle) = slot.as_mut() else {
        return BoundedBuffer::new(cap);
    };
    let joined = handle.await;
    *slot = None;
    match joined {
        Ok(buffer) => buffer,
        Err(e) => {
            log::warn!("runner: output reader task failed: {e}");
            BoundedBuffer::new(cap)
        }
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        if !self.reaped {
            if let Err(e) = self.kill_tree() {
                log::warn!("runner: could not kill process tree {:?}: {e}", self.pid);
            }
        }
        for task in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            task.abort();
        }
        if let Some(task) = self.stdin.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Process tree termination
// ---------------------------------------------------------------------------

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_process_tree(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// `taskkill /T /F` the tree rooted at `pid`.  Blocks briefly.
#[cfg(windows)]
fn kill_process_tree(pid: u32) -> io::Result<()> {
    use std::os::windows::process::CommandExt;

    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()?;
    // 128: no such process.
    if status.success() || status.code() == Some(128) {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("taskkill exited with {status}"),
        ))
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_process_tree(_pid: u32) -> io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
