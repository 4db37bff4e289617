pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{Config, EngineConfig};
pub use error::{ClientError, ScoutError};
pub use events::{ProgressEvent, ProgressSink};
pub use types::*;
