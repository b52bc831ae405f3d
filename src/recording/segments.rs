use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use super::model::{FILENAME_TIME_FORMAT, OUTPUT_EXTENSION};

/// `{directory}/{prefix}.{dd-mm-yyyy.hh-mm-ss}.mp4`, stamped in the offset of `now`.
///
/// Paths only differ at one-second resolution. Two segments started within the same
/// second would share a name, which the scheduler never does because a segment lives
/// through at least one recording poll before it can end.
pub(crate) fn build_segment_output_path(
    output_directory: &Path,
    prefix: &str,
    now: DateTime<FixedOffset>,
) -> PathBuf {
    let timestamp = now.format(FILENAME_TIME_FORMAT);
    output_directory.join(format!("{prefix}.{timestamp}.{OUTPUT_EXTENSION}"))
}
