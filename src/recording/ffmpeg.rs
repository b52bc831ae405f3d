use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use super::model::{CaptureInvocation, CAPTURE_NETWORK_TIMEOUT_US, MAX_STDERR_HINTS};

/// `<exe> -hide_banner -loglevel error -y -timeout 5000000 -rtsp_transport tcp -i <url> -c copy <output>`
pub(crate) fn build_capture_invocation(
    capture_program: &Path,
    source_url: &str,
    output_path: &Path,
) -> CaptureInvocation {
    let args = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-timeout",
        CAPTURE_NETWORK_TIMEOUT_US,
        "-rtsp_transport",
        "tcp",
        "-i",
        source_url,
        "-c",
        "copy",
    ]
    .into_iter()
    .map(OsString::from)
    .chain(std::iter::once(output_path.as_os_str().to_os_string()))
    .collect();

    CaptureInvocation {
        program: capture_program.to_path_buf(),
        args,
    }
}

pub(crate) type StderrHints = Arc<Mutex<Vec<String>>>;

/// Drains FFmpeg stderr so the pipe never fills, logging each line and keeping the
/// first few as hints for the early-exit report.
pub(crate) fn spawn_stderr_reader<R>(
    stderr: R,
    pid: u32,
) -> (StderrHints, thread::JoinHandle<()>)
where
    R: Read + Send + 'static,
{
    let stderr_hints: StderrHints = Arc::new(Mutex::new(Vec::new()));
    let stderr_hints_for_thread = Arc::clone(&stderr_hints);

    let handle = thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(content) => {
                    let trimmed = content.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    tracing::warn!(pid, "ffmpeg: {trimmed}");
                    if let Ok(mut hints) = stderr_hints_for_thread.lock() {
                        if hints.len() < MAX_STDERR_HINTS {
                            hints.push(trimmed.to_string());
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(pid, "Failed to read FFmpeg stderr: {error}");
                    break;
                }
            }
        }
    });

    (stderr_hints, handle)
}
