mod ffmpeg;
mod model;
mod scheduler;
mod segments;
mod session;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::clock::SystemClock;

pub use model::{
    CaptureInvocation, ProcessExit, ProcessPoll, ProcessState, SchedulerConfig, SchedulerExit,
    SchedulerStats, SegmentEnd, StopOutcome, Tick, DEFAULT_CAPTURE_PROGRAM,
    DEFAULT_OUTPUT_DIRECTORY, FFMPEG_QUIT_ACK_TIMEOUT, FFMPEG_STOP_TIMEOUT, IDLE_POLL_INTERVAL,
    RECORDING_POLL_INTERVAL,
};
pub use scheduler::RecordingScheduler;
pub use session::{
    CaptureProcess, CaptureSession, CaptureSpawner, ChildProcess, FfmpegSpawner,
    ProcessSupervisor, StopTimeouts,
};

/// Drives the scheduler on a blocking thread until the window finishes or Ctrl-C is
/// pressed. Ctrl-C goes through the same stop path as the end of the window.
pub async fn record_until_finished(config: SchedulerConfig) -> anyhow::Result<SchedulerExit> {
    tracing::info!(
        source_url = %config.source_url,
        capture_program = %config.capture_program.display(),
        output_directory = %config.output_directory.display(),
        filename_prefix = %config.filename_prefix,
        start = %config.window.start(),
        end = %config.window.end(),
        exit_at_window_end = config.exit_at_window_end,
        "Using recording settings"
    );

    let (stop_tx, mut stop_rx) = mpsc::channel(1);

    let mut recording_task = tokio::task::spawn_blocking(move || {
        let supervisor = ProcessSupervisor::new(FfmpegSpawner);
        let mut scheduler = RecordingScheduler::new(config, SystemClock, supervisor);
        scheduler.run(&mut stop_rx)
    });

    let interrupted = tokio::select! {
        result = &mut recording_task => {
            return result.context("recording task failed");
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("Ctrl-C received; stopping recorder");
                true
            }
            Err(error) => {
                tracing::warn!("Failed to listen for Ctrl-C: {error}");
                false
            }
        },
    };

    if interrupted {
        if let Err(error) = stop_tx.send(()).await {
            tracing::warn!("Failed to send stop signal to recording task: {error}");
        }
    }

    let exit = recording_task.await.context("recording task failed")?;
    drop(stop_tx);
    Ok(exit)
}
