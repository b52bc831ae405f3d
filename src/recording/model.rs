use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::window::RecordingWindow;

pub const DEFAULT_CAPTURE_PROGRAM: &str = "ffmpeg";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "recs";
pub const OUTPUT_EXTENSION: &str = "mp4";
pub const FILENAME_TIME_FORMAT: &str = "%d-%m-%Y.%H-%M-%S";
/// FFmpeg `-timeout` for the network input, in microseconds.
pub const CAPTURE_NETWORK_TIMEOUT_US: &str = "5000000";
pub const FFMPEG_QUIT_COMMAND: &[u8] = b"q\n";

pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const RECORDING_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const STOP_SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const FFMPEG_QUIT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
pub const FFMPEG_STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROCESS_EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
pub const MAX_STDERR_HINTS: usize = 32;
/// How long an exit report waits for the stderr reader to drain the pipe.
pub const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub window: RecordingWindow,
    pub source_url: String,
    pub capture_program: PathBuf,
    pub output_directory: PathBuf,
    pub filename_prefix: String,
    pub exit_at_window_end: bool,
}

/// Fully resolved argv for one capture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CaptureInvocation {
    /// Human-readable rendering for logs; non-UTF-8 bytes are replaced.
    pub fn command_line(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPoll {
    Running,
    Exited(ProcessExit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    StoppingGraceful,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was already stopped; nothing was done.
    AlreadyStopped,
    /// The process had exited before the quit command was sent.
    AlreadyExited(ProcessExit),
    /// The process exited after the quit command, within the bounded waits.
    Exited(ProcessExit),
    ForceKilled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    ExitedEarly(ProcessExit),
    WindowEnded,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Sleep(Duration),
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    WindowFinished,
    StopRequested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub segments_started: u32,
    pub early_exits: u32,
    pub spawn_failures: u32,
    pub force_kills: u32,
}
