//! Panicking shorthand for tests and command-line glue.

use crate::error::Result;

/// Unwraps a pipeline result, panicking with the error's message.
pub trait MustExt<T> {
    /// Returns the value or panics with the error message.
    fn must(self) -> T;
}

impl<T> MustExt<T> for Result<T> {
    #[track_caller]
    fn must(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn must_returns_the_value() {
        let ok: Result<u8> = Ok(3);
        assert_eq!(ok.must(), 3);
    }

    #[test]
    #[should_panic(expected = "entmut: Project not found")]
    fn must_panics_with_the_error_message() {
        let err: Result<u8> = Err(Error::not_found("Project"));
        err.must();
    }
}
