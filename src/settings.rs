use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, TimeDelta};
use clap::Parser;

use crate::error::{RecorderError, RecorderResult};
use crate::recording::{SchedulerConfig, DEFAULT_CAPTURE_PROGRAM, DEFAULT_OUTPUT_DIRECTORY};
use crate::window::{parse_timestamp, RecordingWindow};

const DEFAULT_WINDOW_SECS: i64 = 60 * 60;

#[derive(Parser, Debug)]
#[command(author, version, about = "Timed RTSP recorder using FFmpeg", long_about = None)]
pub struct Cli {
    /// Start time (format: dd/mm/yyyy hh:mm:ss ±zzzz) [default: now]
    #[arg(long = "start", visible_alias = "ts", value_name = "TIME")]
    pub start: Option<String>,

    /// End time (format: dd/mm/yyyy hh:mm:ss ±zzzz) [default: one hour from now]
    #[arg(long = "end", visible_alias = "te", value_name = "TIME")]
    pub end: Option<String>,

    /// FFmpeg command
    #[arg(short = 'c', long = "cmd", default_value = DEFAULT_CAPTURE_PROGRAM)]
    pub cmd: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "output", default_value = DEFAULT_OUTPUT_DIRECTORY)]
    pub output: PathBuf,

    /// RTSP stream URL
    #[arg(short = 'i', long = "url")]
    pub url: String,

    /// Output filename prefix
    #[arg(short = 'n', long = "prefix")]
    pub prefix: String,

    /// Exit when the recording period ends (default)
    #[arg(short = 'd', long = "exit", overrides_with = "no_exit")]
    pub exit: bool,

    /// Keep waiting after the recording period ends
    #[arg(long = "no-exit", overrides_with = "exit")]
    pub no_exit: bool,
}

impl Cli {
    /// Resolves the recording window and defaults; `now` fills in a missing start.
    pub fn into_config(self, now: DateTime<FixedOffset>) -> RecorderResult<SchedulerConfig> {
        let start = match &self.start {
            Some(value) => parse_timestamp(value)?,
            None => now,
        };
        let end = match &self.end {
            Some(value) => parse_timestamp(value)?,
            None => now + TimeDelta::seconds(DEFAULT_WINDOW_SECS),
        };

        Ok(SchedulerConfig {
            window: RecordingWindow::new(start, end)?,
            source_url: self.url,
            capture_program: self.cmd,
            output_directory: self.output,
            filename_prefix: self.prefix,
            exit_at_window_end: !self.no_exit,
        })
    }
}

pub fn ensure_output_dir(path: &Path) -> RecorderResult<()> {
    std::fs::create_dir_all(path).map_err(|source| RecorderError::DirectoryCreation {
        path: path.to_path_buf(),
        source,
    })
}
