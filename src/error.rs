use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("arc index {index} is out of range for a topology with {arc_count} arcs")]
    ArcIndexOutOfRange { index: i64, arc_count: usize },

    #[error("invalid request body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("bad request - missing data in body")]
    NoData,

    #[error("missing mandatory field(s): [{}]", .0.join(" "))]
    MissingFields(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("png converter `{}` exited with {status}: {stderr}", .executable.display())]
    ConverterFailed {
        executable: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("png converter `{}` did not finish within {timeout:?}", .executable.display())]
    ConverterTimeout {
        executable: PathBuf,
        timeout: Duration,
    },

    #[error("unable to rasterize svg: {0}")]
    Rasterize(String),
}

pub type Result<T> = std::result::Result<T, MapError>;
