//! Results that settle after the dispatcher has already returned.
//!
//! A target method that cannot answer synchronously hands back a [`Pending`]
//! and keeps the matching [`Resolver`]. The dispatcher passes the `Pending`
//! through untouched; the transport drives it and relays the outcome.

use futures::channel::oneshot;
use futures::future::{ BoxFuture, FutureExt };
use serde::Serialize;
use serde_json::Value;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ Context, Poll };

use crate::error::Error;

pub struct Pending {
  inner: BoxFuture<'static, Result<Value, Error>>,
}

impl Pending {
  pub fn new<F>(future: F) -> Self
  where
    F: Future<Output = Result<Value, Error>> + Send + 'static {
    Pending { inner: future.boxed() }
  }

  pub fn ready(value: Value) -> Self {
    Pending::new(futures::future::ready(Ok(value)))
  }
}

impl Future for Pending {
  type Output = Result<Value, Error>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.inner.as_mut().poll(cx)
  }
}

impl fmt::Debug for Pending {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Pending")
  }
}

/// Settle-once handle for a [`Pending`] created by [`deferred`].
///
/// Dropping a resolver without settling it settles the pending value with
/// [`Error::Abandoned`].
#[derive(Debug)]
pub struct Resolver {
  sender: oneshot::Sender<Result<Value, Error>>,
}

impl Resolver {
  pub fn resolve<T: Serialize>(self, value: T) {
    let settled = serde_json::to_value(value).map_err(Error::from);
    self.settle(settled);
  }

  pub fn reject<E>(self, error: E)
  where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>> {
    self.settle(Err(Error::raised(error)));
  }

  pub fn settle(self, result: Result<Value, Error>) {
    // the receiving side may already be gone, nobody is waiting then
    let _ = self.sender.send(result);
  }
}

pub fn deferred() -> (Resolver, Pending) {
  let (sender, receiver) = oneshot::channel();
  let pending = Pending::new(receiver.map(|settled| match settled {
    Ok(result) => result,
    Err(oneshot::Canceled) => Err(Error::Abandoned),
  }));
  (Resolver { sender }, pending)
}

/// What an invocation hands back to the transport.
#[derive(Debug)]
pub enum Reply {
  Ready(Value),
  Pending(Pending),
}

impl Reply {
  pub fn encode<T: Serialize>(method: &str, value: T) -> Result<Self, Error> {
    serde_json::to_value(value)
      .map(Reply::Ready)
      .map_err(|source| Error::Encode { method: method.to_string(), source })
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, Reply::Pending(_))
  }

  pub async fn settle(self) -> Result<Value, Error> {
    match self {
      Reply::Ready(value) => Ok(value),
      Reply::Pending(pending) => pending.await,
    }
  }
}

impl From<Value> for Reply {
  fn from(value: Value) -> Self {
    Reply::Ready(value)
  }
}

impl From<Pending> for Reply {
  fn from(pending: Pending) -> Self {
    Reply::Pending(pending)
  }
}
