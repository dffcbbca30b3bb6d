
use serde::{ Serialize, Deserialize };

use std::fs;
use std::path::Path;

use crate::error::Error;

pub const DEFAULT_ADDR: &str = "127.0.0.1:7373";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Address the server listens on.
  pub addr: String,
  /// Connections served at the same time. Each open connection holds one
  /// worker until it closes; further connections are accepted but wait.
  pub workers: usize,
  /// Threads polling pending replies. Bounds threads only, not how many
  /// pending replies may be outstanding.
  pub settle_workers: usize,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      addr: DEFAULT_ADDR.to_string(),
      workers: 4,
      settle_workers: 2,
    }
  }
}

impl Config {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
      .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    Self::parse(&contents)
  }

  pub fn parse(contents: &str) -> Result<Self, Error> {
    let config: Config = serde_json::from_str(contents)
      .map_err(|e| Error::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), Error> {
    if self.workers == 0 {
      return Err(Error::Config("workers must be at least 1".to_string()));
    }
    if self.settle_workers == 0 {
      return Err(Error::Config("settle_workers must be at least 1".to_string()));
    }
    if self.addr.is_empty() {
      return Err(Error::Config("addr must not be empty".to_string()));
    }
    Ok(())
  }
}
