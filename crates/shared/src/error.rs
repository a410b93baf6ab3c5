use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::LayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidOrder,
    UnknownLayer,
    UnsupportedProjectSource,
    UnsafeProjectName,
    UnknownFormat,
    NoProject,
    LoadFailed,
    SearchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("invalid layer order: {reason}")]
    InvalidOrder { reason: String },
    #[error("unknown layer {id}")]
    UnknownLayer { id: LayerId },
    #[error("unsupported project source: {kind}")]
    UnsupportedProjectSource { kind: String },
    #[error("unsafe project name '{name}'")]
    UnsafeProjectName { name: String },
    #[error("unknown format file: {file}")]
    UnknownFormat { file: String },
    #[error("no project loaded")]
    NoProject,
}

impl ShellError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ShellError::InvalidOrder { .. } => ErrorCode::InvalidOrder,
            ShellError::UnknownLayer { .. } => ErrorCode::UnknownLayer,
            ShellError::UnsupportedProjectSource { .. } => ErrorCode::UnsupportedProjectSource,
            ShellError::UnsafeProjectName { .. } => ErrorCode::UnsafeProjectName,
            ShellError::UnknownFormat { .. } => ErrorCode::UnknownFormat,
            ShellError::NoProject => ErrorCode::NoProject,
        }
    }

    /// Text shown to the user when this error surfaces as a notification.
    pub fn user_message(&self) -> String {
        match self {
            ShellError::UnsafeProjectName { .. } => "Specified project name is wrong.".to_string(),
            ShellError::UnknownFormat { file } => format!("Unknown format file: {file}"),
            ShellError::NoProject => "No project".to_string(),
            other => other.to_string(),
        }
    }
}

/// Payload of a blocking user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl UserNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&ShellError> for UserNotice {
    fn from(value: &ShellError) -> Self {
        Self {
            code: value.code(),
            message: value.user_message(),
        }
    }
}

impl From<ShellError> for UserNotice {
    fn from(value: ShellError) -> Self {
        Self::from(&value)
    }
}
