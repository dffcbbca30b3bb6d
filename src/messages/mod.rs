
/// Channel carrying `(method, ...args)` calls against the frame of the serving process.
pub const RENDERER_WEB_FRAME_METHOD: &str = "RENDERER_WEB_FRAME_METHOD";
