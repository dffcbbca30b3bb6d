
/// Builds a positional argument list for a remote call.
///
/// ```
/// let args = frpc::args![2.0, "text", { "cssOrigin": "user" }];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
  () => {
    ::std::vec::Vec::<$crate::__private::Value>::new()
  };
  ($($arg: tt),+ $(,)?) => {
    vec![$($crate::__private::serde_json::json!($arg)),+]
  };
}

#[cfg(test)]
mod test {
  use serde_json::json;

  #[test]
  fn test_args() {
    assert!(args![].is_empty());
    assert_eq!(args![2.0], vec![json!(2.0)]);
    assert_eq!(args!["a", 1, null, [1, 2]], vec![json!("a"), json!(1), json!(null), json!([1, 2])]);
  }
}
