use thiserror::Error;

/// Errors surfaced by the light dispatch surface.
///
/// Everything except [`LightError::NotApplied`] is raised before any network
/// I/O happens and is never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LightError {
    #[error("invalid colors: {0}")]
    InvalidColors(String),

    #[error("{name} must be between 0 and {max}, got {value}")]
    InvalidRange {
        name: &'static str,
        value: i64,
        max: i64,
    },

    #[error("preset name required for Preset mode")]
    MissingPresetName,

    #[error("preset '{0}' not found")]
    PresetNotFound(String),

    #[error("colors required for Custom mode")]
    MissingColors,

    #[error("at least one target zone is required")]
    NoZones,

    #[error("zone {0} is not managed by this controller")]
    UnknownZone(u8),

    /// The command was superseded, timed out or was rejected by the controller.
    #[error("command was not applied by the controller")]
    NotApplied,
}

impl LightError {
    /// Not applied is what every superseded call in a burst resolves with,
    /// so it is part of normal operation.
    pub fn is_routine(&self) -> bool {
        matches!(self, LightError::NotApplied)
    }
}

pub type LightResult<T> = Result<T, LightError>;
