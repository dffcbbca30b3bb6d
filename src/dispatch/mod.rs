//! The method dispatcher.
//!
//! A target type exposes a fixed whitelist of methods through [`RemoteCall`],
//! normally derived with [`remote`](crate::remote). [`Dispatcher`] turns a
//! method name and a positional argument list into one call on that target.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use std::fmt::{ Debug, Display };
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;
use crate::pending::Reply;

/// The closed set of operation tags a target exposes.
pub trait MethodName: Copy + Eq + Hash + Debug + Display + FromStr<Err = Error> + Send + Sync + 'static {
  const ALL: &'static [Self];

  fn as_str(&self) -> &'static str;
}

pub trait RemoteCall: Send + Sync {
  type Method: MethodName;

  fn invoke(&self, method: Self::Method, args: Vec<Value>) -> Result<Reply, Error>;
}

/// Decodes the argument at `index`; a missing argument decodes from `null`.
pub fn decode_arg<T: DeserializeOwned>(method: &str, index: usize, arg: Option<Value>) -> Result<T, Error> {
  serde_json::from_value(arg.unwrap_or(Value::Null))
    .map_err(|e| Error::invalid_argument(method, index, e))
}

pub struct Dispatcher<T: RemoteCall> {
  target: Arc<T>,
}

impl<T: RemoteCall> Dispatcher<T> {
  pub fn new(target: Arc<T>) -> Self {
    Dispatcher { target }
  }

  pub fn target(&self) -> &Arc<T> {
    &self.target
  }

  pub fn methods(&self) -> impl Iterator<Item = &'static str> {
    T::Method::ALL.iter().map(|method| method.as_str())
  }

  pub fn dispatch(&self, method: &str, args: Vec<Value>) -> Result<Reply, Error> {
    let method = match method.parse::<T::Method>() {
      Ok(method) => method,
      Err(e) => {
        debug!(method, "rejected call to unknown method");
        return Err(e);
      }
    };
    debug!(%method, args = args.len(), "dispatching");
    self.target.invoke(method, args)
  }
}

impl<T: RemoteCall> Clone for Dispatcher<T> {
  fn clone(&self) -> Self {
    Dispatcher { target: Arc::clone(&self.target) }
  }
}
