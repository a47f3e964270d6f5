use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while resolving, compiling or executing a render.
///
/// Every variant is fatal for the render that produced it; nothing here is
/// retried automatically.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("probe failed for {}: {reason}", path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("invalid timeline: {0}")]
    InvalidTimeline(String),

    #[error("media engine exited with {status}: {diagnostic}")]
    EngineExecution { status: String, diagnostic: String },

    #[error("media engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RenderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidTimeline(msg.into())
    }

    pub fn probe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Engine stderr for execution failures, untouched.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::EngineExecution { diagnostic, .. } => Some(diagnostic.as_str()),
            _ => None,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            RenderError::invalid("x")
                .to_string()
                .starts_with("invalid timeline:")
        );
        assert!(
            RenderError::InputNotFound(PathBuf::from("a.mp4"))
                .to_string()
                .contains("a.mp4")
        );
        assert!(
            RenderError::probe("b.wav", "bad output")
                .to_string()
                .contains("probe failed for b.wav")
        );
    }

    #[test]
    fn diagnostic_is_passed_through() {
        let err = RenderError::EngineExecution {
            status: "exit status: 1".into(),
            diagnostic: "  [xfade] offset < 0\n".into(),
        };
        assert_eq!(err.diagnostic(), Some("  [xfade] offset < 0\n"));
        assert_eq!(RenderError::invalid("x").diagnostic(), None);
    }
}
