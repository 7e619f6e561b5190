//! Untyped error helpers.

use std::fmt::Display;

/// A type-erased error.
///
/// Used wherever a caller only needs to propagate or report a failure, and has no use for matching on a specific
/// error variant. Typed errors (see the `snafu`-based error enums across the workspace) convert into it via `?`.
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaluates to [`GenericError`], and can be constructed from a string literal, a format string
/// (with arguments accepted, in the same order as `std::format!`), or a value which implements `Debug` and `Display`.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

/// Extension methods for attaching context to a fallible result.
///
/// Mirrors `anyhow::Context`, but under distinct method names so that it can be imported alongside
/// `snafu::ResultExt` without the two colliding.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wraps the error value with additional context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wraps the error value with additional context that is only evaluated if an error occurred.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_source() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk on fire"));
        let err = result.error_context("failed to read trace file").unwrap_err();
        assert_eq!(err.to_string(), "failed to read trace file");
        assert_eq!(err.root_cause().to_string(), "disk on fire");
    }

    #[test]
    fn macro_formats() {
        let err = generic_error!("bad value: {}", 42);
        assert_eq!(err.to_string(), "bad value: 42");
    }
}
