//! The frame-scoped API object served on [`RENDERER_WEB_FRAME_METHOD`].

pub mod script;

use serde::{ Serialize, Deserialize };
use thiserror::Error;

use std::collections::{ BTreeMap, HashMap };
use std::sync::{ Arc, Mutex, MutexGuard };

use crate::dispatch::Dispatcher;
use crate::error::Error as RpcError;
use crate::messages::RENDERER_WEB_FRAME_METHOD;
use crate::pending::{ deferred, Pending };
use crate::router::Router;
use script::{ ScriptJob, ScriptRunner, WebSource, MAIN_WORLD_ID };

/// Each zoom level step scales the zoom factor by this much.
pub const ZOOM_FACTOR_STEP: f64 = 1.2;

pub fn zoom_level_to_factor(level: f64) -> f64 {
  ZOOM_FACTOR_STEP.powf(level)
}

pub fn zoom_factor_to_level(factor: f64) -> f64 {
  factor.ln() / ZOOM_FACTOR_STEP.ln()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
  #[error("zoom factor must be a positive number, got {0}")]
  InvalidZoomFactor(f64),
  #[error("invalid visual zoom limits: min {min}, max {max}")]
  InvalidZoomLimits { min: f64, max: f64 },
  #[error("no style sheet inserted under key '{0}'")]
  UnknownStyleSheet(String),
  #[error("world id must be at least 1, got {0}")]
  InvalidWorldId(i32),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CssOrigin {
  #[default]
  Author,
  User,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertCssOptions {
  #[serde(default)]
  pub css_origin: Option<CssOrigin>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
  pub css: String,
  pub origin: CssOrigin,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IsolatedWorldInfo {
  #[serde(default)]
  pub security_origin: Option<String>,
  #[serde(default)]
  pub csp: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsageDetails {
  pub count: u64,
  pub size: u64,
  pub live_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
  pub images: MemoryUsageDetails,
  pub scripts: MemoryUsageDetails,
  pub css_style_sheets: MemoryUsageDetails,
  pub xsl_style_sheets: MemoryUsageDetails,
  pub fonts: MemoryUsageDetails,
  pub other: MemoryUsageDetails,
}

struct FrameState {
  zoom_level: f64,
  visual_zoom_limits: (f64, f64),
  style_sheets: BTreeMap<String, StyleSheet>,
  next_style_sheet: u64,
  text: String,
  worlds: HashMap<i32, IsolatedWorldInfo>,
  scripts_run: u64,
  cache_clears: u64,
}

impl Default for FrameState {
  fn default() -> Self {
    FrameState {
      zoom_level: 0.0,
      visual_zoom_limits: (1.0, 1.0),
      style_sheets: BTreeMap::new(),
      next_style_sheet: 1,
      text: String::new(),
      worlds: HashMap::new(),
      scripts_run: 0,
      cache_clears: 0,
    }
  }
}

pub struct Frame {
  routing_id: u32,
  state: Mutex<FrameState>,
  scripts: Arc<dyn ScriptRunner>,
}

impl Frame {
  pub fn new(routing_id: u32, scripts: Arc<dyn ScriptRunner>) -> Self {
    Frame { routing_id, state: Mutex::new(FrameState::default()), scripts }
  }

  pub fn routing_id(&self) -> u32 {
    self.routing_id
  }

  pub fn text(&self) -> String {
    self.state().text.clone()
  }

  pub fn style_sheet(&self, key: &str) -> Option<StyleSheet> {
    self.state().style_sheets.get(key).cloned()
  }

  pub fn visual_zoom_limits(&self) -> (f64, f64) {
    self.state().visual_zoom_limits
  }

  pub fn world_info(&self, world_id: i32) -> Option<IsolatedWorldInfo> {
    self.state().worlds.get(&world_id).cloned()
  }

  pub fn cache_clears(&self) -> u64 {
    self.state().cache_clears
  }

  fn state(&self) -> MutexGuard<'_, FrameState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn submit(&self, world_id: i32, sources: Vec<WebSource>, user_gesture: bool) -> Pending {
    let (resolver, pending) = deferred();
    self.state().scripts_run += sources.len() as u64;
    self.scripts.run(ScriptJob { world_id, sources, user_gesture, resolver });
    pending
  }
}

#[crate::remote]
impl Frame {
  pub fn set_zoom_factor(&self, factor: f64) -> Result<(), FrameError> {
    if !(factor > 0.0 && factor.is_finite()) {
      return Err(FrameError::InvalidZoomFactor(factor));
    }
    self.state().zoom_level = zoom_factor_to_level(factor);
    Ok(())
  }

  pub fn get_zoom_factor(&self) -> f64 {
    zoom_level_to_factor(self.state().zoom_level)
  }

  pub fn set_zoom_level(&self, level: f64) {
    self.state().zoom_level = level;
  }

  pub fn get_zoom_level(&self) -> f64 {
    self.state().zoom_level
  }

  pub fn set_visual_zoom_level_limits(&self, minimum_level: f64, maximum_level: f64) -> Result<(), FrameError> {
    if !(minimum_level > 0.0 && maximum_level.is_finite()) || minimum_level > maximum_level {
      return Err(FrameError::InvalidZoomLimits { min: minimum_level, max: maximum_level });
    }
    self.state().visual_zoom_limits = (minimum_level, maximum_level);
    Ok(())
  }

  /// Returns the key for [`Frame::remove_inserted_css`].
  #[rpc(name = "insertCSS")]
  pub fn insert_css(&self, css: String, options: Option<InsertCssOptions>) -> String {
    let origin = options.and_then(|options| options.css_origin).unwrap_or_default();
    let mut state = self.state();
    let key = format!("{}-{}", self.routing_id, state.next_style_sheet);
    state.next_style_sheet += 1;
    state.style_sheets.insert(key.clone(), StyleSheet { css, origin });
    key
  }

  #[rpc(name = "removeInsertedCSS")]
  pub fn remove_inserted_css(&self, key: String) -> Result<(), FrameError> {
    match self.state().style_sheets.remove(&key) {
      Some(_) => Ok(()),
      None => Err(FrameError::UnknownStyleSheet(key)),
    }
  }

  pub fn insert_text(&self, text: String) {
    self.state().text.push_str(&text);
  }

  pub fn execute_java_script(&self, code: String, user_gesture: Option<bool>) -> Pending {
    let source = WebSource { code, url: None };
    self.submit(MAIN_WORLD_ID, vec![source], user_gesture.unwrap_or(false))
  }

  pub fn execute_java_script_in_isolated_world(
    &self,
    world_id: i32,
    scripts: Vec<WebSource>,
    user_gesture: Option<bool>,
  ) -> Result<Pending, FrameError> {
    if world_id < 1 {
      return Err(FrameError::InvalidWorldId(world_id));
    }
    Ok(self.submit(world_id, scripts, user_gesture.unwrap_or(false)))
  }

  pub fn set_isolated_world_info(&self, world_id: i32, info: IsolatedWorldInfo) -> Result<(), FrameError> {
    if world_id < 1 {
      return Err(FrameError::InvalidWorldId(world_id));
    }
    self.state().worlds.insert(world_id, info);
    Ok(())
  }

  pub fn get_resource_usage(&self) -> ResourceUsage {
    let state = self.state();
    let css_size = state.style_sheets.values().map(|sheet| sheet.css.len() as u64).sum();
    ResourceUsage {
      css_style_sheets: MemoryUsageDetails {
        count: state.style_sheets.len() as u64,
        size: css_size,
        live_size: css_size,
      },
      scripts: MemoryUsageDetails {
        count: state.scripts_run,
        ..MemoryUsageDetails::default()
      },
      ..ResourceUsage::default()
    }
  }

  pub fn clear_cache(&self) {
    self.state().cache_clears += 1;
  }
}

/// Serves `frame` on [`RENDERER_WEB_FRAME_METHOD`]. Call once during startup;
/// a second call fails with [`RpcError::AlreadyRegistered`].
pub fn init(router: &mut Router, frame: Arc<Frame>) -> Result<(), RpcError> {
  router.handle(RENDERER_WEB_FRAME_METHOD, Dispatcher::new(frame))
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::dispatch::MethodName;
  use futures::executor::block_on;
  use script::ScriptQueue;
  use serde_json::{ json, Value };

  fn frame() -> (Arc<Frame>, Arc<ScriptQueue>) {
    let queue = Arc::new(ScriptQueue::new());
    (Arc::new(Frame::new(1, queue.clone())), queue)
  }

  fn served() -> (Router, Arc<Frame>, Arc<ScriptQueue>) {
    let (frame, queue) = frame();
    let mut router = Router::new();
    init(&mut router, frame.clone()).unwrap();
    (router, frame, queue)
  }

  fn call(router: &Router, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
    block_on(router.route(RENDERER_WEB_FRAME_METHOD, method, args)?.settle())
  }

  #[test]
  fn test_set_zoom_level() {
    let (router, frame, _) = served();
    assert_eq!(call(&router, "setZoomLevel", vec![json!(2.0)]).unwrap(), Value::Null);
    assert_eq!(frame.get_zoom_level(), 2.0);
    assert_eq!(call(&router, "getZoomLevel", vec![]).unwrap(), json!(frame.get_zoom_level()));
  }

  #[test]
  fn test_no_such_method() {
    let (router, frame, _) = served();
    let err = call(&router, "noSuchMethod", vec![json!(1), json!(2)]).unwrap_err();
    assert!(matches!(err, RpcError::InvalidMethod(ref name) if name == "noSuchMethod"));
    assert_eq!(frame.get_zoom_level(), 0.0);
    assert_eq!(frame.text(), "");
  }

  #[test]
  fn test_init_twice_is_refused() {
    let (mut router, frame, _) = served();
    assert!(matches!(init(&mut router, frame), Err(RpcError::AlreadyRegistered(_))));
  }

  #[test]
  fn test_zoom_factor_and_level_agree() {
    let (frame, _) = frame();
    frame.set_zoom_level(1.0);
    assert!((frame.get_zoom_factor() - 1.2).abs() < 1e-9);

    frame.set_zoom_factor(1.44).unwrap();
    assert!((frame.get_zoom_level() - 2.0).abs() < 1e-9);

    assert_eq!(frame.set_zoom_factor(0.0), Err(FrameError::InvalidZoomFactor(0.0)));
    assert!((frame.get_zoom_level() - 2.0).abs() < 1e-9);
  }

  #[test]
  fn test_raised_frame_error_surfaces() {
    let (router, frame, _) = served();
    let err = call(&router, "setZoomFactor", vec![json!(-1.0)]).unwrap_err();
    assert_eq!(err.to_string(), FrameError::InvalidZoomFactor(-1.0).to_string());
    match err {
      RpcError::Raised(inner) => {
        assert_eq!(inner.downcast_ref::<FrameError>(), Some(&FrameError::InvalidZoomFactor(-1.0)));
      }
      other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(frame.get_zoom_level(), 0.0);
  }

  #[test]
  fn test_visual_zoom_limits() {
    let (router, frame, _) = served();
    call(&router, "setVisualZoomLevelLimits", vec![json!(1.0), json!(3.0)]).unwrap();
    assert_eq!(frame.visual_zoom_limits(), (1.0, 3.0));
    assert!(call(&router, "setVisualZoomLevelLimits", vec![json!(3.0), json!(1.0)]).is_err());
    assert_eq!(
      frame.set_visual_zoom_level_limits(1.0, f64::INFINITY),
      Err(FrameError::InvalidZoomLimits { min: 1.0, max: f64::INFINITY })
    );
    assert_eq!(frame.visual_zoom_limits(), (1.0, 3.0));
  }

  #[test]
  fn test_insert_and_remove_css() {
    let (router, frame, _) = served();
    let key = call(&router, "insertCSS", vec![json!("body { color: red }")]).unwrap();
    let key = key.as_str().unwrap().to_string();
    assert_eq!(frame.style_sheet(&key).unwrap().origin, CssOrigin::Author);

    let user = call(&router, "insertCSS", vec![json!("p {}"), json!({ "cssOrigin": "user" })]).unwrap();
    let user = user.as_str().unwrap().to_string();
    assert_ne!(key, user);
    assert_eq!(frame.style_sheet(&user).unwrap().origin, CssOrigin::User);

    let usage = frame.get_resource_usage();
    assert_eq!(usage.css_style_sheets.count, 2);
    assert_eq!(usage.css_style_sheets.size, ("body { color: red }".len() + "p {}".len()) as u64);

    call(&router, "removeInsertedCSS", vec![json!(key)]).unwrap();
    assert!(frame.style_sheet(&key).is_none());
    let err = call(&router, "removeInsertedCSS", vec![json!(key)]).unwrap_err();
    assert_eq!(err.to_string(), format!("no style sheet inserted under key '{key}'"));
  }

  #[test]
  fn test_insert_text_and_clear_cache() {
    let (router, frame, _) = served();
    call(&router, "insertText", vec![json!("hello ")]).unwrap();
    call(&router, "insertText", vec![json!("frame")]).unwrap();
    call(&router, "clearCache", vec![]).unwrap();
    assert_eq!(frame.text(), "hello frame");
    assert_eq!(frame.cache_clears(), 1);
  }

  #[test]
  fn test_execute_java_script_is_pending() {
    let (router, _, queue) = served();
    let reply = router.route(RENDERER_WEB_FRAME_METHOD, "executeJavaScript", vec![json!("40 + 2")]).unwrap();
    assert!(reply.is_pending());
    assert_eq!(queue.len(), 1);

    let drained = queue.drain(|world_id, source| {
      assert_eq!(world_id, MAIN_WORLD_ID);
      assert_eq!(source.code, "40 + 2");
      Ok(json!(42))
    });
    assert_eq!(drained, 1);
    assert_eq!(block_on(reply.settle()).unwrap(), json!(42));
  }

  #[test]
  fn test_isolated_world_scripts() {
    let (router, frame, queue) = served();
    let sources = json!([{ "code": "1" }, { "code": "2", "url": "app://two.js" }]);
    let reply = router
      .route(RENDERER_WEB_FRAME_METHOD, "executeJavaScriptInIsolatedWorld", vec![json!(5), sources, json!(true)])
      .unwrap();

    queue.drain(|world_id, source| {
      assert_eq!(world_id, 5);
      Ok(json!(source.code.parse::<i64>().unwrap()))
    });
    assert_eq!(block_on(reply.settle()).unwrap(), json!(2));
    assert_eq!(frame.get_resource_usage().scripts.count, 2);

    let err = call(&router, "executeJavaScriptInIsolatedWorld", vec![json!(0), json!([])]).unwrap_err();
    assert!(matches!(err, RpcError::Raised(_)));
    assert!(queue.is_empty());
  }

  #[test]
  fn test_rejected_script() {
    let (router, _, queue) = served();
    let reply = router.route(RENDERER_WEB_FRAME_METHOD, "executeJavaScript", vec![json!("throw 1")]).unwrap();
    queue.drain(|_, _| Err(RpcError::raised("Uncaught 1")));
    let err = block_on(reply.settle()).unwrap_err();
    assert_eq!(err.to_string(), "Uncaught 1");
  }

  #[test]
  fn test_isolated_world_info() {
    let (router, frame, _) = served();
    let info = json!({ "securityOrigin": "app://x", "name": "extension" });
    call(&router, "setIsolatedWorldInfo", vec![json!(3), info]).unwrap();
    let stored = frame.world_info(3).unwrap();
    assert_eq!(stored.security_origin.as_deref(), Some("app://x"));
    assert_eq!(stored.name.as_deref(), Some("extension"));
    assert!(stored.csp.is_none());
  }

  #[test]
  fn test_whitelist() {
    let names: Vec<_> = FrameMethod::ALL.iter().map(|method| method.as_str()).collect();
    assert_eq!(names, vec![
      "setZoomFactor",
      "getZoomFactor",
      "setZoomLevel",
      "getZoomLevel",
      "setVisualZoomLevelLimits",
      "insertCSS",
      "removeInsertedCSS",
      "insertText",
      "executeJavaScript",
      "executeJavaScriptInIsolatedWorld",
      "setIsolatedWorldInfo",
      "getResourceUsage",
      "clearCache",
    ]);
  }

  #[test]
  fn test_wrong_argument_type() {
    let (router, frame, _) = served();
    let err = call(&router, "setZoomLevel", vec![json!("big")]).unwrap_err();
    assert!(matches!(err, RpcError::InvalidArguments { index: 0, .. }));
    assert_eq!(frame.get_zoom_level(), 0.0);
  }

  #[test]
  fn test_resource_usage_wire_shape() {
    let (router, _, _) = served();
    let usage = call(&router, "getResourceUsage", vec![]).unwrap();
    assert_eq!(usage["cssStyleSheets"], json!({ "count": 0, "size": 0, "liveSize": 0 }));
  }
}
