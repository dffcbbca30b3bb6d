
pub mod thread_pool;

use futures::executor::ThreadPool as Executor;
use serde_json::Value;
use tracing::{ debug, error, info, warn };

use std::io::{ BufReader, BufWriter };
use std::net::{ SocketAddr, TcpListener, TcpStream };
use std::sync::Arc;
use std::sync::atomic::{ AtomicUsize, Ordering };

use thread_pool::ThreadPool;
use crate::codec::*;
use crate::config::Config;
use crate::error::{ Error, Fault };
use crate::pending::Reply;
use crate::router::Router;

type Connection = Codec<BufReader<TcpStream>, BufWriter<TcpStream>>;

/// Serves a [`Router`] over TCP.
///
/// Each connection occupies one worker of the connection pool for its whole
/// lifetime and is served in arrival order; once every worker is busy, new
/// connections wait until one closes. Pending replies are polled on the
/// settle executor and written whenever they complete, so a later ready reply
/// may overtake them.
pub struct Server {
  router: Arc<Router>,
  connections: ThreadPool,
  settlers: Executor,
  active: Arc<AtomicUsize>,
  workers: usize,
}

impl Server {
  pub fn new(router: Router, config: &Config) -> Result<Self, Error> {
    config.validate()?;
    let settlers = Executor::builder()
      .pool_size(config.settle_workers)
      .name_prefix("frpc-settle-")
      .create()?;
    Ok(Server {
      router: Arc::new(router),
      connections: ThreadPool::new("frpc-conn", config.workers)?,
      settlers,
      active: Arc::new(AtomicUsize::new(0)),
      workers: config.workers,
    })
  }

  pub fn bind(addr: &str) -> Result<(TcpListener, SocketAddr), Error> {
    let listener = TcpListener::bind(addr)?;
    let local = listener.local_addr()?;
    Ok((listener, local))
  }

  pub fn run(&self, addr: &str) -> Result<(), Error> {
    let (listener, local) = Self::bind(addr)?;
    info!(%local, "listening");
    self.serve(listener)
  }

  pub fn serve(&self, listener: TcpListener) -> Result<(), Error> {
    for stream in listener.incoming() {
      match stream {
        Ok(stream) => {
          let busy = self.active.fetch_add(1, Ordering::SeqCst);
          if busy >= self.workers {
            warn!(busy, workers = self.workers, "all connection workers busy, connection queued");
          }
          let router = Arc::clone(&self.router);
          let settlers = self.settlers.clone();
          let active = Arc::clone(&self.active);
          self.connections.execute(move || {
            let peer = stream.peer_addr().ok();
            if let Err(e) = Self::connect(stream, router, settlers) {
              warn!(?peer, error = %e, "connection closed with error");
            }
            active.fetch_sub(1, Ordering::SeqCst);
          })?;
        }
        Err(e) => {
          error!(error = %e, "failed to accept connection");
        }
      }
    }
    Ok(())
  }

  fn connect(stream: TcpStream, router: Arc<Router>, settlers: Executor) -> Result<(), Error> {
    let codec = Codec::bind(stream)?;
    let message: Message = match codec.decode()? {
      Some(message) => message,
      None => return Ok(()),
    };
    if message.magic_number != MAGIC_NUMBER {
      return Err(Error::MagicMismatch(message.magic_number));
    }
    debug!("handshake accepted");
    Self::serve_connection(Arc::new(codec), &router, &settlers)
  }

  fn serve_connection(codec: Arc<Connection>, router: &Router, settlers: &Executor) -> Result<(), Error> {
    while let Some((header, body)) = codec.decode::<Packet>()? {
      let args = match body.contents {
        Value::Array(args) => args,
        Value::Null => Vec::new(),
        other => vec![other],
      };

      match router.route(&header.channel, &header.method, args) {
        Ok(Reply::Ready(value)) => Self::respond(&codec, &header, Ok(value))?,
        Ok(Reply::Pending(pending)) => {
          let codec = Arc::clone(&codec);
          settlers.spawn_ok(async move {
            let settled = pending.await;
            if let Err(e) = Self::respond(&codec, &header, settled) {
              warn!(seq = header.seq, error = %e, "failed to write settled reply");
            }
          });
        }
        Err(e) => Self::respond(&codec, &header, Err(e))?,
      }
    }
    debug!("peer closed connection");
    Ok(())
  }

  fn respond(codec: &Connection, request: &Header, result: Result<Value, Error>) -> Result<(), Error> {
    let (header, body) = match result {
      Ok(value) => (request.reply(None), Body::new(value)),
      Err(e) => {
        debug!(channel = %request.channel, method = %request.method, error = %e, "call failed");
        (request.reply(Some(Fault::from(&e))), Body::new(Value::Null))
      }
    };
    codec.encode(&(header, body))
  }
}
