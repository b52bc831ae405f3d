mod process;
mod supervisor;

pub use process::{CaptureProcess, CaptureSpawner, ChildProcess, FfmpegSpawner};
pub use supervisor::{CaptureSession, ProcessSupervisor, StopTimeouts};
