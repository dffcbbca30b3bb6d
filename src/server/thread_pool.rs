
use tracing::{ debug, trace };

use std::io;
use std::thread;
use std::sync::mpsc::{ channel, Sender, Receiver };
use std::sync::{ Arc, Mutex };

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named worker threads fed from one job queue.
pub struct ThreadPool {
  workers: Vec<Worker>,
  sender: Option<Sender<Job>>,
}

impl ThreadPool {
  pub fn new(name: &str, size: usize) -> io::Result<Self> {
    if size == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "thread pool needs at least one worker"));
    }
    let mut workers = Vec::with_capacity(size);
    let (sender, receiver) = channel();
    let receiver = Arc::new(Mutex::new(receiver));
    for id in 0..size {
      let worker = Worker::new(format!("{name}-{id}"), Arc::clone(&receiver))?;
      workers.push(worker);
    }
    Ok(ThreadPool { workers, sender: Some(sender) })
  }

  pub fn size(&self) -> usize {
    self.workers.len()
  }

  pub fn execute<T>(&self, f: T) -> io::Result<()>
  where
    T: FnOnce() + Send + 'static {
    let sender = self.sender.as_ref().ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
    sender
      .send(Box::new(f))
      .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "thread pool has shut down"))
  }
}

impl Drop for ThreadPool {
  fn drop(&mut self) {
    drop(self.sender.take());
    for worker in &mut self.workers {
      if let Some(thread) = worker.thread.take() {
        debug!(worker = %worker.name, "shutting down");
        if thread.join().is_err() {
          debug!(worker = %worker.name, "worker panicked");
        }
      }
    }
  }
}

struct Worker {
  thread: Option<thread::JoinHandle<()>>,
  name: String,
}

impl Worker {
  fn new(name: String, receiver: Arc<Mutex<Receiver<Job>>>) -> io::Result<Self> {
    let thread = thread::Builder::new().name(name.clone()).spawn(move || {
      loop {
        let result = match receiver.lock() {
          Ok(receiver) => receiver.recv(),
          Err(_) => break,
        };
        match result {
          Ok(job) => {
            trace!("running job");
            job();
          }
          Err(_) => break,
        }
      }
    })?;

    Ok(Worker { thread: Some(thread), name })
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::mpsc;

  #[test]
  fn test_thread_pool() {
    let pool = ThreadPool::new("test", 4).unwrap();
    assert_eq!(pool.size(), 4);

    let (tx, rx) = mpsc::channel();
    for i in 0..8 {
      let tx = tx.clone();
      pool.execute(move || tx.send(i).unwrap()).unwrap();
    }
    let mut seen: Vec<i32> = rx.iter().take(8).collect();
    seen.sort();
    assert_eq!(seen, (0..8).collect::<Vec<_>>());
  }

  #[test]
  fn test_empty_pool_is_refused() {
    assert!(ThreadPool::new("test", 0).is_err());
  }

  #[test]
  fn test_drop_waits_for_jobs() {
    let done = Arc::new(Mutex::new(0));
    {
      let pool = ThreadPool::new("test", 2).unwrap();
      for _ in 0..4 {
        let done = Arc::clone(&done);
        pool.execute(move || *done.lock().unwrap() += 1).unwrap();
      }
    }
    assert_eq!(*done.lock().unwrap(), 4);
  }
}
