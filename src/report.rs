use std::path::{Path, PathBuf};

use serde::Serialize;
use time::{macros::format_description, OffsetDateTime};
use tracing::info;

use crate::ProbeError;

/// A JSON document describing one diagnostic run.
#[derive(Serialize, Debug)]
pub struct Report<T> {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub tool: &'static str,
    pub version: &'static str,
    pub purpose: String,
    pub body: T,
}

impl<T: Serialize> Report<T> {
    pub fn new(purpose: impl Into<String>, body: T) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            purpose: purpose.into(),
            body,
        }
    }
}

/// Write `report` to `<dir>/<prefix>_<YYYYMMDD_HHMMSS>.json` and return the path.
/// A numeric suffix is appended when a report from the same second already exists.
pub fn write_report<T: Serialize>(
    dir: &Path,
    prefix: &str,
    report: &Report<T>,
) -> Result<PathBuf, ProbeError> {
    std::fs::create_dir_all(dir)?;

    let stamp = report
        .timestamp
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .map_err(|err| ProbeError::Io(std::io::Error::other(err)))?;

    let mut path = dir.join(format!("{prefix}_{stamp}.json"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{prefix}_{stamp}_{n}.json"));
        n += 1;
    }

    std::fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    info!(path = %path.display(), "report written");

    Ok(path)
}
