// frame-host: serves one frame on the web frame method channel.
//
// Usage: frame-host [config.json]
//
// Scripts sent through executeJavaScript are evaluated as JSON literals.

use frpc::config::Config;
use frpc::error::Error;
use frpc::frame::{ self, Frame, script::ScriptQueue };
use frpc::router::Router;
use frpc::server::Server;
use serde_json::Value;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{ error, info };
use tracing_subscriber::EnvFilter;

const SCRIPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

mod exit_codes {
  pub const CONFIG_ERROR: i32 = 1;
  pub const SERVER_ERROR: i32 = 2;
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();

  let config = match std::env::args().nth(1) {
    Some(path) => match Config::load(&path) {
      Ok(config) => config,
      Err(e) => {
        error!("Failed to load configuration: {}", e);
        process::exit(exit_codes::CONFIG_ERROR);
      }
    },
    None => Config::default(),
  };

  if let Err(e) = run(config) {
    error!("Server stopped: {}", e);
    process::exit(exit_codes::SERVER_ERROR);
  }
}

fn run(config: Config) -> Result<(), Error> {
  let scripts = Arc::new(ScriptQueue::new());
  let frame = Arc::new(Frame::new(1, scripts.clone()));

  let mut router = Router::new();
  frame::init(&mut router, frame)?;

  thread::Builder::new().name("frame-scripts".to_string()).spawn(move || loop {
    scripts.drain(|_, source| {
      serde_json::from_str::<Value>(&source.code).map_err(|e| Error::raised(format!("SyntaxError: {e}")))
    });
    thread::sleep(SCRIPT_POLL_INTERVAL);
  })?;

  info!("Starting frame host v{}", env!("CARGO_PKG_VERSION"));
  Server::new(router, &config)?.run(&config.addr)
}
