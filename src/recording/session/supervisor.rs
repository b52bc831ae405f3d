use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use super::super::ffmpeg::build_capture_invocation;
use super::super::model::{
    ProcessExit, ProcessPoll, ProcessState, StopOutcome, FFMPEG_QUIT_ACK_TIMEOUT,
    FFMPEG_STOP_TIMEOUT,
};
use super::process::{CaptureProcess, CaptureSpawner};
use crate::error::{RecorderError, RecorderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    /// Wait after writing the quit command.
    pub quit_ack: Duration,
    /// Additional wait for the process to exit before it is killed.
    pub exit: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            quit_ack: FFMPEG_QUIT_ACK_TIMEOUT,
            exit: FFMPEG_STOP_TIMEOUT,
        }
    }
}

/// One in-flight capture process and the file it writes.
pub struct CaptureSession<P> {
    output_path: PathBuf,
    started_at: DateTime<FixedOffset>,
    process: P,
    state: ProcessState,
}

impl<P: CaptureProcess> CaptureSession<P> {
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn started_at(&self) -> DateTime<FixedOffset> {
        self.started_at
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    pub fn stderr_hints(&self) -> Vec<String> {
        self.process.stderr_hints()
    }

    pub fn process(&self) -> &P {
        &self.process
    }
}

pub struct ProcessSupervisor<S> {
    spawner: S,
    timeouts: StopTimeouts,
}

impl<S: CaptureSpawner> ProcessSupervisor<S> {
    pub fn new(spawner: S) -> Self {
        Self::with_timeouts(spawner, StopTimeouts::default())
    }

    pub fn with_timeouts(spawner: S, timeouts: StopTimeouts) -> Self {
        Self { spawner, timeouts }
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn start(
        &self,
        capture_program: &Path,
        source_url: &str,
        output_path: PathBuf,
        started_at: DateTime<FixedOffset>,
    ) -> RecorderResult<CaptureSession<S::Process>> {
        let invocation = build_capture_invocation(capture_program, source_url, &output_path);
        let command_line = invocation.command_line();

        tracing::info!(command = %command_line, "Starting FFmpeg");

        let process = self
            .spawner
            .spawn(&invocation)
            .map_err(|source| RecorderError::Spawn {
                program: capture_program.to_path_buf(),
                source,
            })?;

        tracing::info!(
            pid = process.id(),
            output_path = %output_path.display(),
            "Recording to {}",
            output_path.display()
        );

        Ok(CaptureSession {
            output_path,
            started_at,
            process,
            state: ProcessState::Running,
        })
    }

    pub fn poll(&self, session: &mut CaptureSession<S::Process>) -> ProcessPoll {
        match session.process.try_wait() {
            Ok(Some(exit)) => ProcessPoll::Exited(exit),
            Ok(None) => ProcessPoll::Running,
            Err(error) => {
                tracing::error!(
                    pid = session.process.id(),
                    "Failed while checking FFmpeg process status: {error}"
                );
                ProcessPoll::Running
            }
        }
    }

    /// Quit, wait, then kill. Every wait is bounded so this always returns.
    pub fn stop(&self, session: &mut CaptureSession<S::Process>) -> StopOutcome {
        if session.state == ProcessState::Stopped {
            return StopOutcome::AlreadyStopped;
        }

        if let ProcessPoll::Exited(exit) = self.poll(session) {
            session.state = ProcessState::Stopped;
            return StopOutcome::AlreadyExited(exit);
        }

        session.state = ProcessState::StoppingGraceful;
        let pid = session.process.id();

        // A write failure usually means the process died after the poll above;
        // the bounded waits below notice that.
        if let Err(error) = session.process.request_quit() {
            tracing::debug!(pid, "Failed to send quit command to FFmpeg: {error}");
        }

        let graceful_exit = self
            .wait_for_exit(session, self.timeouts.quit_ack)
            .or_else(|| self.wait_for_exit(session, self.timeouts.exit));

        if let Some(exit) = graceful_exit {
            session.state = ProcessState::Stopped;
            tracing::info!(pid, %exit, "FFmpeg stopped");
            return StopOutcome::Exited(exit);
        }

        if let Err(error) = session.process.kill() {
            tracing::warn!(pid, "Failed to force-stop FFmpeg process: {error}");
        }
        session.state = ProcessState::Stopped;
        tracing::warn!(pid, "Process forcefully terminated after timeout");
        StopOutcome::ForceKilled
    }

    fn wait_for_exit(
        &self,
        session: &mut CaptureSession<S::Process>,
        timeout: Duration,
    ) -> Option<ProcessExit> {
        match session.process.wait_timeout(timeout) {
            Ok(exit) => exit,
            Err(error) => {
                tracing::warn!(
                    pid = session.process.id(),
                    "Failed while waiting for FFmpeg to exit: {error}"
                );
                None
            }
        }
    }
}
