use nom::error::{ContextError, ParseError};
use std::fmt;

/// Whether a parse failure is a plain syntax error or a construct we
/// recognize but intentionally do not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailureKind {
    Syntax,
    Unsupported,
}

#[derive(Debug, PartialEq)]
pub struct OpenCypherParsingError<'a> {
    pub kind: ParseFailureKind,
    pub errors: Vec<(&'a str, String)>,
}

impl<'a> OpenCypherParsingError<'a> {
    pub fn new(input: &'a str, message: impl Into<String>) -> Self {
        OpenCypherParsingError {
            kind: ParseFailureKind::Syntax,
            errors: vec![(input, message.into())],
        }
    }

    /// An error for a construct that parses but is not implemented.
    pub fn unsupported(input: &'a str, construct: impl Into<String>) -> Self {
        OpenCypherParsingError {
            kind: ParseFailureKind::Unsupported,
            errors: vec![(input, construct.into())],
        }
    }

    /// Wrap into the `nom::Err::Failure` variant so that `alt` does not
    /// backtrack over it.
    pub fn fail(self) -> nom::Err<Self> {
        nom::Err::Failure(self)
    }
}

impl<'a> ParseError<&'a str> for OpenCypherParsingError<'a> {
    fn from_error_kind(input: &'a str, _kind: nom::error::ErrorKind) -> Self {
        OpenCypherParsingError::new(input, "unable to parse")
    }

    fn append(input: &'a str, _kind: nom::error::ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, "unable to parse".to_string()));
        other
    }
}

impl<'a> ContextError<&'a str> for OpenCypherParsingError<'a> {
    fn add_context(input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ctx.to_string()));
        other
    }
}

impl fmt::Display for OpenCypherParsingError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (input, ctx) in &self.errors {
            writeln!(f, "{}: {}", ctx, input)?;
        }
        Ok(())
    }
}

impl<'a> From<nom::error::Error<&'a str>> for OpenCypherParsingError<'a> {
    fn from(err: nom::error::Error<&'a str>) -> Self {
        OpenCypherParsingError::new(err.input, "unable to parse")
    }
}
