
use serde::{ Serialize, Deserialize };
use thiserror::Error;

use std::fmt::Display;
use std::io;

#[derive(Error, Debug)]
pub enum Error {
  #[error("invalid method '{0}'")]
  InvalidMethod(String),

  #[error("argument {index} of '{method}' is invalid: {reason}")]
  InvalidArguments {
    method: String,
    index: usize,
    reason: String,
  },

  /// Error returned by the invoked method itself, kept as-is.
  #[error(transparent)]
  Raised(Box<dyn std::error::Error + Send + Sync + 'static>),

  #[error("result of '{method}' could not be encoded: {source}")]
  Encode {
    method: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("pending result was dropped before it settled")]
  Abandoned,

  #[error("no handler registered on channel '{0}'")]
  NoHandler(String),

  #[error("channel '{0}' already has a handler")]
  AlreadyRegistered(String),

  #[error("magic number mismatched: {0:#x}")]
  MagicMismatch(i32),

  #[error("client is not available")]
  ClientNotAvailable,

  #[error("remote call failed: {0}")]
  Remote(Fault),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error(transparent)]
  Io(#[from] io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub fn raised<E>(error: E) -> Self
  where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Error::Raised(error.into())
  }

  pub fn invalid_argument(method: &str, index: usize, reason: impl Display) -> Self {
    Error::InvalidArguments {
      method: method.to_string(),
      index,
      reason: reason.to_string(),
    }
  }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
  InvalidMethod,
  InvalidArguments,
  Raised,
  NoHandler,
  Internal,
}

/// Wire image of a failed call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Fault {
  pub kind: FaultKind,
  pub message: String,
}

impl Fault {
  pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
    Fault { kind, message: message.into() }
  }
}

impl Display for Fault {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}: {}", self.kind, self.message)
  }
}

impl From<&Error> for Fault {
  fn from(error: &Error) -> Self {
    let kind = match error {
      Error::InvalidMethod(_) => FaultKind::InvalidMethod,
      Error::InvalidArguments { .. } => FaultKind::InvalidArguments,
      Error::Raised(_) => FaultKind::Raised,
      Error::NoHandler(_) => FaultKind::NoHandler,
      Error::Remote(fault) => return fault.clone(),
      _ => FaultKind::Internal,
    };
    Fault::new(kind, error.to_string())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[derive(Error, Debug)]
  #[error("boom")]
  struct Boom;

  #[test]
  fn test_raised_keeps_identity() {
    let error = Error::raised(Boom);
    assert_eq!(error.to_string(), "boom");
    match error {
      Error::Raised(inner) => assert!(inner.downcast_ref::<Boom>().is_some()),
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn test_fault_kinds() {
    let fault = Fault::from(&Error::InvalidMethod("noSuchMethod".to_string()));
    assert_eq!(fault.kind, FaultKind::InvalidMethod);
    assert_eq!(fault.message, "invalid method 'noSuchMethod'");

    let fault = Fault::from(&Error::raised(Boom));
    assert_eq!(fault, Fault::new(FaultKind::Raised, "boom"));

    let fault = Fault::from(&Error::Abandoned);
    assert_eq!(fault.kind, FaultKind::Internal);
  }

  #[test]
  fn test_remote_fault_passes_through() {
    let original = Fault::new(FaultKind::NoHandler, "no handler registered on channel 'x'");
    assert_eq!(Fault::from(&Error::Remote(original.clone())), original);
  }
}
