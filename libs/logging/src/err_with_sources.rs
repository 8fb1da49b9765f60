use std::{error::Error as StdError, fmt};

/// Renders an error together with its full `source()` chain, colon-separated, for a single
/// log line instead of a bare `Display` that drops everything but the outermost message.
pub struct ErrorWithSources<'a>(&'a (dyn StdError + 'static));

impl fmt::Display for ErrorWithSources<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }

        Ok(())
    }
}

pub fn err_with_src(error: &(dyn StdError + 'static)) -> ErrorWithSources<'_> {
    ErrorWithSources(error)
}

#[cfg(test)]
mod tests {
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("inner")]
    struct Inner;

    #[test]
    fn chains_every_source() {
        let error = Outer(Inner);
        assert_eq!(err_with_src(&error).to_string(), "outer: inner");
    }

    #[test]
    fn renders_a_sourceless_error_alone() {
        let error = Inner;
        assert_eq!(err_with_src(&error).to_string(), "inner");
    }
}
