
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{ debug, warn };

use std::io::{ BufReader, BufWriter };
use std::net::{ Shutdown, TcpStream, ToSocketAddrs };
use std::sync::{ Arc, Mutex, MutexGuard };
use std::sync::mpsc::{ self, Sender, Receiver };
use std::collections::HashMap;
use std::thread;

use crate::codec::*;
use crate::error::Error;

type Connection = Codec<BufReader<TcpStream>, BufWriter<TcpStream>>;
type Outcome = Result<Value, Error>;

struct Shared {
  codec: Connection,
  seq: Mutex<usize>,
  pending: Mutex<HashMap<usize, Sender<Outcome>>>,
  shutdown: Mutex<bool>,
}

/// Caller side of the transport.
///
/// Calls are matched to replies by sequence number, so replies that settle
/// out of order still reach the right caller.
pub struct Client {
  shared: Arc<Shared>,
  stream: TcpStream,
  receiver: Option<thread::JoinHandle<()>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Client {
  pub fn dial<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
    let stream = TcpStream::connect(addr)?;
    let codec = Codec::bind(stream.try_clone()?)?;
    codec.encode(&Message::new(MAGIC_NUMBER))?;

    let shared = Arc::new(Shared {
      codec,
      seq: Mutex::new(1),
      pending: Mutex::new(HashMap::new()),
      shutdown: Mutex::new(false),
    });

    let receiver = {
      let shared = Arc::clone(&shared);
      thread::Builder::new()
        .name("frpc-client".to_string())
        .spawn(move || Self::recv(&shared))?
    };

    Ok(Client { shared, stream, receiver: Some(receiver) })
  }

  pub fn is_available(&self) -> bool {
    !*locked(&self.shared.shutdown)
  }

  /// Sends one call and waits for its reply.
  pub fn call<T: DeserializeOwned>(&self, channel: &str, method: &str, args: Vec<Value>) -> Result<T, Error> {
    let outcome = self
      .call_async(channel, method, args)?
      .recv()
      .map_err(|_| Error::ClientNotAvailable)?;
    Ok(serde_json::from_value(outcome?)?)
  }

  /// Sends one call; the reply arrives on the returned receiver.
  pub fn call_async(&self, channel: &str, method: &str, args: Vec<Value>) -> Result<Receiver<Outcome>, Error> {
    let (tx, rx) = mpsc::channel::<Outcome>();
    let seq = self.register_call(tx)?;
    let header = Header::new(channel.to_string(), method.to_string(), seq, None);
    debug!(seq, channel, method, "sending call");

    if let Err(e) = self.shared.codec.encode(&(header, Body::new(Value::Array(args)))) {
      locked(&self.shared.pending).remove(&seq);
      return Err(e);
    }
    Ok(rx)
  }

  fn register_call(&self, sender: Sender<Outcome>) -> Result<usize, Error> {
    // checked under the pending lock so a call cannot slip in after termination
    let mut pending = locked(&self.shared.pending);
    if !self.is_available() {
      return Err(Error::ClientNotAvailable);
    }
    let mut seq = locked(&self.shared.seq);
    let current = *seq;
    *seq += 1;
    pending.insert(current, sender);
    Ok(current)
  }

  fn recv(shared: &Shared) {
    loop {
      match shared.codec.decode::<Packet>() {
        Ok(Some((header, body))) => {
          let sender = locked(&shared.pending).remove(&header.seq);
          match sender {
            Some(sender) => {
              let outcome = match header.error {
                Some(fault) => Err(Error::Remote(fault)),
                None => Ok(body.contents),
              };
              // the caller may have stopped waiting
              let _ = sender.send(outcome);
            }
            None => warn!(seq = header.seq, "reply for unknown call"),
          }
        }
        Ok(None) => {
          debug!("server closed connection");
          break;
        }
        Err(e) => {
          warn!(error = %e, "failed to read reply");
          break;
        }
      }
    }
    Self::terminate_calls(shared);
  }

  fn terminate_calls(shared: &Shared) {
    let mut pending = locked(&shared.pending);
    *locked(&shared.shutdown) = true;
    for (_, sender) in pending.drain() {
      let _ = sender.send(Err(Error::ClientNotAvailable));
    }
  }
}

impl Drop for Client {
  fn drop(&mut self) {
    let _ = self.stream.shutdown(Shutdown::Both);
    if let Some(receiver) = self.receiver.take() {
      let _ = receiver.join();
    }
  }
}
