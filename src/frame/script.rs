
use serde::{ Serialize, Deserialize };
use serde_json::Value;

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::Error;
use crate::pending::Resolver;

/// World id of the page's own script context.
pub const MAIN_WORLD_ID: i32 = 0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WebSource {
  pub code: String,
  #[serde(default)]
  pub url: Option<String>,
}

#[derive(Debug)]
pub struct ScriptJob {
  pub world_id: i32,
  pub sources: Vec<WebSource>,
  pub user_gesture: bool,
  pub resolver: Resolver,
}

/// Evaluates scripts for a frame and settles each job's resolver.
pub trait ScriptRunner: Send + Sync {
  fn run(&self, job: ScriptJob);
}

/// Holds jobs until the owner drains them.
#[derive(Default)]
pub struct ScriptQueue {
  jobs: Mutex<VecDeque<ScriptJob>>,
}

impl ScriptQueue {
  pub fn new() -> Self {
    ScriptQueue::default()
  }

  pub fn len(&self) -> usize {
    self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Evaluates every queued job in submission order; a job's result is the
  /// result of its last source.
  pub fn drain<F>(&self, mut eval: F) -> usize
  where
    F: FnMut(i32, &WebSource) -> Result<Value, Error> {
    let jobs: Vec<_> = self.jobs.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect();
    let count = jobs.len();
    for job in jobs {
      let mut result = Ok(Value::Null);
      for source in &job.sources {
        result = eval(job.world_id, source);
        if result.is_err() {
          break;
        }
      }
      job.resolver.settle(result);
    }
    count
  }
}

impl ScriptRunner for ScriptQueue {
  fn run(&self, job: ScriptJob) {
    self.jobs.lock().unwrap_or_else(|e| e.into_inner()).push_back(job);
  }
}
