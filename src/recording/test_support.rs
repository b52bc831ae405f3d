//! Deterministic stand-ins for the wall clock and FFmpeg used by unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};

use super::model::{CaptureInvocation, ProcessExit};
use super::session::{CaptureProcess, CaptureSpawner};
use crate::clock::Clock;

pub(crate) struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn starting_at(rfc3339: &str) -> Arc<Self> {
        let now = DateTime::parse_from_rfc3339(rfc3339).unwrap();
        Arc::new(Self {
            now: Mutex::new(now),
            slept: Mutex::new(Duration::ZERO),
        })
    }

    pub(crate) fn current(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }

    pub(crate) fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + TimeDelta::from_std(duration).unwrap();
    }

    fn advance_to(&self, instant: DateTime<FixedOffset>) {
        let mut now = self.now.lock().unwrap();
        if instant > *now {
            *now = instant;
        }
    }

    /// Total time spent in `Clock::sleep`.
    pub(crate) fn slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.current()
    }

    fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum QuitBehavior {
    /// Exits with code 0 this long after receiving `q`.
    ExitAfter(Duration),
    Ignore,
    /// Writing `q` fails while the process keeps running.
    BrokenPipe,
    /// The process dies with the given code as `q` is written.
    DieWithBrokenPipe(i32),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessPlan {
    pub(crate) exit_after: Option<(Duration, i32)>,
    pub(crate) on_quit: QuitBehavior,
}

impl Default for ProcessPlan {
    fn default() -> Self {
        Self {
            exit_after: None,
            on_quit: QuitBehavior::ExitAfter(Duration::ZERO),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SpawnPlan {
    Fail,
    Run(ProcessPlan),
}

/// What a scripted process had been through when it was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReleasedProcess {
    pub(crate) pid: u32,
    pub(crate) quit_requests: u32,
    pub(crate) killed: bool,
}

pub(crate) type ReleaseLog = Arc<Mutex<Vec<ReleasedProcess>>>;

pub(crate) struct ScriptedSpawner {
    clock: Arc<ManualClock>,
    released: ReleaseLog,
    launches: Mutex<Vec<CaptureInvocation>>,
    queued: Mutex<VecDeque<SpawnPlan>>,
    fallback: Mutex<SpawnPlan>,
    next_pid: Mutex<u32>,
}

impl ScriptedSpawner {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            released: ReleaseLog::default(),
            launches: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(SpawnPlan::Run(ProcessPlan::default())),
            next_pid: Mutex::new(4100),
        }
    }

    pub(crate) fn launches(&self) -> Vec<CaptureInvocation> {
        self.launches.lock().unwrap().clone()
    }

    /// Shared log that outlives the spawner and every process it handed out.
    pub(crate) fn release_log(&self) -> ReleaseLog {
        Arc::clone(&self.released)
    }

    pub(crate) fn queue(&self, plan: SpawnPlan) {
        self.queued.lock().unwrap().push_back(plan);
    }

    /// Plan used once the queue is empty.
    pub(crate) fn set_fallback(&self, plan: SpawnPlan) {
        *self.fallback.lock().unwrap() = plan;
    }

    pub(crate) fn fail_next_spawn(&self) {
        self.queue(SpawnPlan::Fail);
    }

    pub(crate) fn exit_after_next(&self, after: Duration, code: i32) {
        self.queue(SpawnPlan::Run(ProcessPlan {
            exit_after: Some((after, code)),
            ..ProcessPlan::default()
        }));
    }

    pub(crate) fn quit_takes_next(&self, duration: Duration) {
        self.queue_quit_behavior(QuitBehavior::ExitAfter(duration));
    }

    pub(crate) fn ignore_quit_next(&self) {
        self.queue_quit_behavior(QuitBehavior::Ignore);
    }

    pub(crate) fn break_stdin_next(&self) {
        self.queue_quit_behavior(QuitBehavior::BrokenPipe);
    }

    pub(crate) fn die_on_quit_next(&self, code: i32) {
        self.queue_quit_behavior(QuitBehavior::DieWithBrokenPipe(code));
    }

    fn queue_quit_behavior(&self, on_quit: QuitBehavior) {
        self.queue(SpawnPlan::Run(ProcessPlan {
            on_quit,
            ..ProcessPlan::default()
        }));
    }
}

impl CaptureSpawner for ScriptedSpawner {
    type Process = ScriptedProcess;

    fn spawn(&self, invocation: &CaptureInvocation) -> io::Result<ScriptedProcess> {
        self.launches.lock().unwrap().push(invocation.clone());

        let plan = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| *self.fallback.lock().unwrap());

        let plan = match plan {
            SpawnPlan::Fail => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "No such file or directory (os error 2)",
                ))
            }
            SpawnPlan::Run(plan) => plan,
        };

        let pid = {
            let mut next_pid = self.next_pid.lock().unwrap();
            *next_pid += 1;
            *next_pid
        };

        let now = self.clock.current();
        let (exits_at, exit_code) = match plan.exit_after {
            Some((after, code)) => (Some(now + TimeDelta::from_std(after).unwrap()), code),
            None => (None, 0),
        };

        Ok(ScriptedProcess {
            clock: Arc::clone(&self.clock),
            released: Arc::clone(&self.released),
            pid,
            exits_at,
            exit_code,
            on_quit: plan.on_quit,
            quit_requests: 0,
            killed: false,
        })
    }
}

pub(crate) struct ScriptedProcess {
    clock: Arc<ManualClock>,
    released: ReleaseLog,
    pid: u32,
    exits_at: Option<DateTime<FixedOffset>>,
    exit_code: i32,
    on_quit: QuitBehavior,
    quit_requests: u32,
    killed: bool,
}

impl ScriptedProcess {
    pub(crate) fn killed(&self) -> bool {
        self.killed
    }

    pub(crate) fn quit_requests(&self) -> u32 {
        self.quit_requests
    }

    fn exit_by(&mut self, instant: DateTime<FixedOffset>, code: i32) {
        match self.exits_at {
            Some(existing) if existing <= instant => {}
            _ => {
                self.exits_at = Some(instant);
                self.exit_code = code;
            }
        }
    }
}

impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        if let Ok(mut released) = self.released.lock() {
            released.push(ReleasedProcess {
                pid: self.pid,
                quit_requests: self.quit_requests,
                killed: self.killed,
            });
        }
    }
}

impl CaptureProcess for ScriptedProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        if self.killed {
            return Ok(Some(ProcessExit { code: None }));
        }

        match self.exits_at {
            Some(exits_at) if exits_at <= self.clock.current() => Ok(Some(ProcessExit {
                code: Some(self.exit_code),
            })),
            _ => Ok(None),
        }
    }

    fn request_quit(&mut self) -> io::Result<()> {
        self.quit_requests += 1;
        let now = self.clock.current();

        match self.on_quit {
            QuitBehavior::ExitAfter(duration) => {
                self.exit_by(now + TimeDelta::from_std(duration).unwrap(), 0);
                Ok(())
            }
            QuitBehavior::Ignore => Ok(()),
            QuitBehavior::BrokenPipe => Err(io::ErrorKind::BrokenPipe.into()),
            QuitBehavior::DieWithBrokenPipe(code) => {
                self.exit_by(now, code);
                Err(io::ErrorKind::BrokenPipe.into())
            }
        }
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ProcessExit>> {
        if let Some(exit) = self.try_wait()? {
            return Ok(Some(exit));
        }

        let deadline = self.clock.current() + TimeDelta::from_std(timeout).unwrap();
        match self.exits_at {
            Some(exits_at) if exits_at <= deadline => {
                self.clock.advance_to(exits_at);
                self.try_wait()
            }
            _ => {
                self.clock.advance_to(deadline);
                Ok(None)
            }
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed = true;
        Ok(())
    }

    fn stderr_hints(&self) -> Vec<String> {
        match self.exits_at {
            Some(exits_at) if !self.killed && exits_at <= self.clock.current() => {
                vec!["rtsp://camera/stream: Connection refused".to_string()]
            }
            _ => Vec::new(),
        }
    }
}
