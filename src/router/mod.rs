
use serde_json::Value;
use tracing::{ debug, info };

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{ Dispatcher, RemoteCall };
use crate::error::Error;
use crate::pending::Reply;

/// Request handler bound to one channel.
pub trait Handler: Send + Sync {
  fn handle(&self, method: &str, args: Vec<Value>) -> Result<Reply, Error>;
}

impl<T: RemoteCall> Handler for Dispatcher<T> {
  fn handle(&self, method: &str, args: Vec<Value>) -> Result<Reply, Error> {
    self.dispatch(method, args)
  }
}

impl<F> Handler for F
where
  F: Fn(&str, Vec<Value>) -> Result<Reply, Error> + Send + Sync {
  fn handle(&self, method: &str, args: Vec<Value>) -> Result<Reply, Error> {
    self(method, args)
  }
}

/// Channel name to handler table. Each channel holds at most one handler.
#[derive(Default)]
pub struct Router {
  handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
  pub fn new() -> Self {
    Router::default()
  }

  pub fn handle<H: Handler + 'static>(&mut self, channel: &str, handler: H) -> Result<(), Error> {
    if self.handlers.contains_key(channel) {
      return Err(Error::AlreadyRegistered(channel.to_string()));
    }
    info!(channel, "handler registered");
    self.handlers.insert(channel.to_string(), Arc::new(handler));
    Ok(())
  }

  pub fn is_handled(&self, channel: &str) -> bool {
    self.handlers.contains_key(channel)
  }

  pub fn route(&self, channel: &str, method: &str, args: Vec<Value>) -> Result<Reply, Error> {
    match self.handlers.get(channel) {
      Some(handler) => handler.handle(method, args),
      None => {
        debug!(channel, method, "no handler for channel");
        Err(Error::NoHandler(channel.to_string()))
      }
    }
  }
}
