use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read manifest '{}': {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid manifest JSON: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid manifest: {message}")]
  Invalid { message: String },
}

impl ConfigError {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::Invalid {
      message: message.into(),
    }
  }
}
