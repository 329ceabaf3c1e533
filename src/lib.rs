// Library surface for the CLI, headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod heat;
pub mod result;
pub mod runtime;
pub mod session;
pub mod store;
pub mod time_format;
pub mod timer;

pub use error::{HeatError, SaveError, SetupError, StoreError};
pub use heat::{HeatConfiguration, HeatPreset, HeatSetup};
pub use result::{HeatEntry, HeatResult, StoredHeat};
pub use time_format::format_time;
pub use timer::{CaptureMode, FeedbackKey, HeatTimer, TimerPhase};
