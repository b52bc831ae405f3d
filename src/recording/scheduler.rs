use std::mem;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::model::{
    ProcessPoll, ProcessState, SchedulerConfig, SchedulerExit, SchedulerStats, SegmentEnd,
    StopOutcome, Tick, IDLE_POLL_INTERVAL, RECORDING_POLL_INTERVAL, STOP_SIGNAL_POLL_INTERVAL,
};
use super::segments::build_segment_output_path;
use super::session::{CaptureSession, CaptureSpawner, ProcessSupervisor};
use crate::clock::Clock;

enum SchedulerState<P> {
    Idle,
    Recording(CaptureSession<P>),
    Finished,
}

/// Decides, one tick at a time, whether to wait, start a capture segment, keep it
/// running, or stop.
pub struct RecordingScheduler<C, S: CaptureSpawner> {
    config: SchedulerConfig,
    clock: C,
    supervisor: ProcessSupervisor<S>,
    state: SchedulerState<S::Process>,
    stats: SchedulerStats,
}

impl<C: Clock, S: CaptureSpawner> RecordingScheduler<C, S> {
    pub fn new(config: SchedulerConfig, clock: C, supervisor: ProcessSupervisor<S>) -> Self {
        Self {
            config,
            clock,
            supervisor,
            state: SchedulerState::Idle,
            stats: SchedulerStats::default(),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SchedulerState::Recording(_))
    }

    pub fn process_state(&self) -> ProcessState {
        match &self.state {
            SchedulerState::Recording(session) => session.state(),
            _ => ProcessState::NotStarted,
        }
    }

    pub fn active_session(&self) -> Option<&CaptureSession<S::Process>> {
        match &self.state {
            SchedulerState::Recording(session) => Some(session),
            _ => None,
        }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<S> {
        &self.supervisor
    }

    /// Runs until the window finishes (with exit enabled) or a stop is requested.
    /// A closed stop channel counts as a stop request.
    pub fn run(&mut self, stop_rx: &mut mpsc::Receiver<()>) -> SchedulerExit {
        let exit = loop {
            if stop_requested(stop_rx) {
                break SchedulerExit::StopRequested;
            }

            match self.tick() {
                Tick::Finished => break SchedulerExit::WindowFinished,
                Tick::Sleep(duration) => {
                    if self.pause(duration, stop_rx) {
                        break SchedulerExit::StopRequested;
                    }
                }
            }
        };

        if exit == SchedulerExit::StopRequested {
            tracing::info!("Stop requested");
            self.shutdown();
        }

        let stats = self.stats;
        tracing::info!(
            segments_started = stats.segments_started,
            early_exits = stats.early_exits,
            spawn_failures = stats.spawn_failures,
            force_kills = stats.force_kills,
            "Recorder finished"
        );

        exit
    }

    /// Stops the active segment, if any, and finishes the scheduler.
    pub fn shutdown(&mut self) {
        if let SchedulerState::Recording(mut session) =
            mem::replace(&mut self.state, SchedulerState::Finished)
        {
            self.end_segment(&mut session, SegmentEnd::Shutdown);
        }
    }

    pub fn tick(&mut self) -> Tick {
        let now = self.clock.now();

        match mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Finished => {
                self.state = SchedulerState::Finished;
                Tick::Finished
            }
            SchedulerState::Idle => self.tick_idle(now),
            SchedulerState::Recording(session) => self.tick_recording(now, session),
        }
    }

    fn tick_idle(&mut self, now: DateTime<FixedOffset>) -> Tick {
        let window = self.config.window;

        if window.is_past_end(now) {
            if self.config.exit_at_window_end {
                tracing::info!("Recording period finished. Exiting");
                self.state = SchedulerState::Finished;
                return Tick::Finished;
            }

            tracing::info!(
                end = %window.end(),
                "Recording period is over; waiting for recording period"
            );
            return Tick::Sleep(IDLE_POLL_INTERVAL);
        }

        if window.is_before_start(now) {
            tracing::info!(
                start = %window.start(),
                starts_in_secs = (window.start() - now).num_seconds(),
                "Waiting for recording period"
            );
            return Tick::Sleep(IDLE_POLL_INTERVAL);
        }

        let output_path = build_segment_output_path(
            &self.config.output_directory,
            &self.config.filename_prefix,
            now,
        );

        match self.supervisor.start(
            &self.config.capture_program,
            &self.config.source_url,
            output_path,
            now,
        ) {
            Ok(session) => {
                self.stats.segments_started += 1;
                self.state = SchedulerState::Recording(session);
            }
            Err(error) => {
                self.stats.spawn_failures += 1;
                tracing::error!(
                    spawn_failures = self.stats.spawn_failures,
                    "{error}; retrying while the recording period is open"
                );
            }
        }

        Tick::Sleep(RECORDING_POLL_INTERVAL)
    }

    fn tick_recording(
        &mut self,
        now: DateTime<FixedOffset>,
        mut session: CaptureSession<S::Process>,
    ) -> Tick {
        // Process death is checked before the window so a crash is never reported
        // as a normal period end.
        let segment_end = match self.supervisor.poll(&mut session) {
            ProcessPoll::Exited(exit) => Some(SegmentEnd::ExitedEarly(exit)),
            ProcessPoll::Running if !self.config.window.in_window(now) => {
                Some(SegmentEnd::WindowEnded)
            }
            ProcessPoll::Running => None,
        };

        match segment_end {
            None => {
                self.state = SchedulerState::Recording(session);
                Tick::Sleep(RECORDING_POLL_INTERVAL)
            }
            Some(end) => {
                self.end_segment(&mut session, end);
                Tick::Sleep(Duration::ZERO)
            }
        }
    }

    fn end_segment(&mut self, session: &mut CaptureSession<S::Process>, end: SegmentEnd) {
        let pid = session.pid();
        let output_path = session.output_path().display().to_string();
        let recorded_secs = (self.clock.now() - session.started_at()).num_seconds();

        match end {
            SegmentEnd::ExitedEarly(exit) => {
                self.stats.early_exits += 1;
                let stderr_hints = session.stderr_hints();
                if !stderr_hints.is_empty() {
                    let joined_hints = stderr_hints.join(" | ");
                    tracing::warn!(pid, ffmpeg_stderr = %joined_hints, "FFmpeg stderr details");
                }
                tracing::warn!(
                    pid,
                    %exit,
                    output_path = %output_path,
                    recorded_secs,
                    "FFmpeg process exited early"
                );
            }
            SegmentEnd::WindowEnded => {
                tracing::info!(
                    pid,
                    output_path = %output_path,
                    recorded_secs,
                    "Recording period ended"
                );
            }
            SegmentEnd::Shutdown => {
                tracing::info!(
                    pid,
                    output_path = %output_path,
                    recorded_secs,
                    "Stopping recording"
                );
            }
        }

        if self.supervisor.stop(session) == StopOutcome::ForceKilled {
            self.stats.force_kills += 1;
        }
    }

    /// Sleeps for `duration` in short slices, returning early when a stop is requested.
    fn pause(&self, duration: Duration, stop_rx: &mut mpsc::Receiver<()>) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            let slice = remaining.min(STOP_SIGNAL_POLL_INTERVAL);
            self.clock.sleep(slice);
            remaining -= slice;

            if stop_requested(stop_rx) {
                return true;
            }
        }
        false
    }
}

impl<C, S: CaptureSpawner> Drop for RecordingScheduler<C, S> {
    fn drop(&mut self) {
        if let SchedulerState::Recording(session) = &mut self.state {
            tracing::warn!(pid = session.pid(), "Scheduler dropped while recording");
            self.supervisor.stop(session);
        }
    }
}

fn stop_requested(stop_rx: &mut mpsc::Receiver<()>) -> bool {
    match stop_rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}
