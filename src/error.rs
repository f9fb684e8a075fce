use std::path::PathBuf;
use thiserror::Error;

/// Trajectory animation error types
#[derive(Error, Debug)]
pub enum AnimeError {
    #[error("Bad input data in {source_name}: {reason}")]
    DataFormat { source_name: String, reason: String },

    #[error("Frame index {index} out of range (trajectory has {len} samples)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Velocity undefined at sample {index}: zero time delta")]
    DivisionUndefined { index: usize },

    #[error("Cannot write output {}: {reason}", path.display())]
    OutputWrite { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Render failed: {0}")]
    Render(String),
}

impl AnimeError {
    pub fn data_format(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        AnimeError::DataFormat {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn output_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnimeError::OutputWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_input() {
        let err = AnimeError::data_format("run_01.csv", "missing column pose_x");
        let msg = err.to_string();
        assert!(msg.contains("run_01.csv"));
        assert!(msg.contains("pose_x"));
    }

    #[test]
    fn test_output_write_names_the_path() {
        let msg = AnimeError::output_write("/nope/out", "missing").to_string();
        assert!(msg.contains("/nope/out"));
        assert!(msg.contains("missing"));
    }
}
