use std::io::{self, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::super::ffmpeg::{spawn_stderr_reader, StderrHints};
use super::super::model::{
    CaptureInvocation, ProcessExit, FFMPEG_QUIT_COMMAND, PROCESS_EXIT_POLL_INTERVAL,
    STDERR_DRAIN_TIMEOUT,
};

/// Handle to one running capture process.
pub trait CaptureProcess {
    fn id(&self) -> u32;

    /// Non-blocking liveness check.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Sends the interactive quit command and closes stdin.
    fn request_quit(&mut self) -> io::Result<()>;

    /// Waits at most `timeout` for the process to exit.
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ProcessExit>>;

    /// Forcibly terminates and reaps the process.
    fn kill(&mut self) -> io::Result<()>;

    fn stderr_hints(&self) -> Vec<String> {
        Vec::new()
    }
}

pub trait CaptureSpawner {
    type Process: CaptureProcess;

    fn spawn(&self, invocation: &CaptureInvocation) -> io::Result<Self::Process>;
}

/// Spawns capture processes as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegSpawner;

impl CaptureSpawner for FfmpegSpawner {
    type Process = ChildProcess;

    fn spawn(&self, invocation: &CaptureInvocation) -> io::Result<ChildProcess> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        ChildProcess::spawn(command)
    }
}

pub struct ChildProcess {
    child: Child,
    exit: Option<ProcessExit>,
    stderr_hints: StderrHints,
    stderr_thread: Option<thread::JoinHandle<()>>,
}

impl ChildProcess {
    /// Spawns `command` with stdin piped, stdout discarded and stderr drained on a
    /// reader thread.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id();
        let (stderr_hints, stderr_thread) = match child.stderr.take() {
            Some(stderr) => {
                let (hints, handle) = spawn_stderr_reader(stderr, pid);
                (hints, Some(handle))
            }
            None => (StderrHints::default(), None),
        };

        Ok(Self {
            child,
            exit: None,
            stderr_hints,
            stderr_thread,
        })
    }

    fn record_exit(&mut self, status: std::process::ExitStatus) -> ProcessExit {
        let exit = ProcessExit::from(status);
        self.exit = Some(exit);
        self.reap_stderr_thread();
        exit
    }

    /// Joins the stderr reader only once it has finished. A descendant that inherited
    /// the pipe can keep it open long after the child itself is gone.
    fn reap_stderr_thread(&mut self) {
        let finished = self
            .stderr_thread
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if !finished {
            return;
        }

        if let Some(handle) = self.stderr_thread.take() {
            if let Err(error) = handle.join() {
                tracing::warn!("Failed to join FFmpeg stderr thread: {error:?}");
            }
        }
    }

    fn wait_for_stderr_drain(&self) {
        let Some(handle) = self.stderr_thread.as_ref() else {
            return;
        };

        let started_at = Instant::now();
        while !handle.is_finished() && started_at.elapsed() < STDERR_DRAIN_TIMEOUT {
            thread::sleep(PROCESS_EXIT_POLL_INTERVAL);
        }
    }
}

impl CaptureProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }

        match self.child.try_wait()? {
            Some(status) => Ok(Some(self.record_exit(status))),
            None => Ok(None),
        }
    }

    fn request_quit(&mut self) -> io::Result<()> {
        if let Some(mut stdin) = self.child.stdin.take() {
            stdin.write_all(FFMPEG_QUIT_COMMAND)?;
            stdin.flush()?;
        }
        Ok(())
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ProcessExit>> {
        let started_at = Instant::now();
        loop {
            if let Some(exit) = self.try_wait()? {
                return Ok(Some(exit));
            }

            let elapsed = started_at.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }

            thread::sleep(PROCESS_EXIT_POLL_INTERVAL.min(timeout - elapsed));
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }

        self.child.kill()?;
        let status = self.child.wait()?;
        self.record_exit(status);
        Ok(())
    }

    fn stderr_hints(&self) -> Vec<String> {
        if self.exit.is_some() {
            self.wait_for_stderr_drain();
        }

        self.stderr_hints
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        match self.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(pid = self.child.id(), "Killing capture process on release");
                if let Err(error) = self.kill() {
                    tracing::warn!("Failed to kill capture process on release: {error}");
                }
            }
            Err(error) => {
                tracing::warn!("Failed to check capture process on release: {error}");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}
