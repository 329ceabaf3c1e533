use thiserror::Error;

use crate::timer::CaptureMode;

/// Failures of the heat timer itself. None of them change timer state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HeatError {
    #[error("no valid entries to save: capture and assign at least one time")]
    NoValidEntries,
    #[error("operation needs {expected} mode, timer runs in {actual} mode")]
    WrongMode {
        expected: CaptureMode,
        actual: CaptureMode,
    },
    #[error("swimmer {0} is not part of this heat")]
    UnknownSwimmer(String),
    #[error("lap {0} has not been captured")]
    UnknownLap(usize),
    #[error("heat already finalized; reset or start a new heat")]
    Finalized,
}

/// Rejections while assembling a heat before timing starts
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SetupError {
    #[error("select at least one swimmer")]
    EmptyRoster,
    #[error("{selected} swimmers selected, a heat takes at most {max}")]
    TooManySwimmers { selected: usize, max: usize },
    #[error("select a distance")]
    MissingDistance,
    #[error("unknown distance {0}")]
    UnknownDistance(String),
    #[error("unknown stroke {0}")]
    UnknownStroke(String),
    #[error("swimmer {0} is not selected")]
    SwimmerNotSelected(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error - {0}")]
    Database(#[from] rusqlite::Error),
    #[error("encoding error - {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("export error - {0}")]
    Export(#[from] csv::Error),
    #[error("io error - {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid stored date {0}")]
    InvalidDate(String),
}

/// Failure of the save hand-off: either nothing to save, or the sink refused it
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Heat(#[from] HeatError),
    #[error("heat not saved - {0}")]
    Store(#[from] StoreError),
}
