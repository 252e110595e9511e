use std::error::Error as StdError;

fn assert_error_impl<T: StdError + Send + Sync + 'static>() {}

#[test]
fn error_implements_std_error() {
    assert_error_impl::<rsroyale::error::Error>();
}
