use thiserror::Error;

/// Failures reported by the navigation controller and its widgets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlsError {
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("invalid {pad} pad layout: {reason}")]
    InvalidLayout { pad: &'static str, reason: String },
    #[error("hit testing is enabled but no scene has been attached")]
    SceneNotAttached,
    #[error("malformed controls configuration: {0}")]
    ConfigFormat(String),
}

pub type Result<T, E = ControlsError> = std::result::Result<T, E>;
