use std::{fmt::Display, path::PathBuf};

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::location::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
    ReachedEnd,
    UnknownToken,
    ExpectedOneOf(Vec<String>),
    InvalidAssignTarget,
    TrailingInput,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{error}")]
    Parse { error: ParseError, span: Span },

    // An unquote target evaluated to something with no literal or expression form
    #[error("cannot unquote a value of kind '{kind}': it has no literal form")]
    Unquote { kind: String },

    #[error("cyclic expansion: {}", chain.join(" -> "))]
    CyclicExpansion { chain: Vec<String> },

    #[error("capture '{capture}' must produce a meta() expression in meta mode, got {found}")]
    InvalidMetaExpr { capture: String, found: String },

    #[error("{message}")]
    Computation { message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Error raised while loading the given session file
    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        source: Box<Error>,
    },
}

impl Error {
    pub fn parse(error: ParseError, span: Span) -> Error {
        Error::Parse { error, span }
    }

    pub fn computation(message: impl Into<String>) -> Error {
        Error::Computation { message: message.into() }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            Error::Parse { span, .. } => Some(span),
            Error::InFile { source, .. } => source.span(),
            _ => None,
        }
    }

    // Render the error against the source text it came from. Errors without a span
    // render as their message alone.
    pub fn report(&self, file_name: &str, source: &str) -> String {
        let error = match self {
            Error::InFile { source, .. } => source.as_ref(),
            other => other,
        };

        let Some(span) = error.span() else {
            return format!("Error: {}", error);
        };

        let mut buffer = Vec::new();
        let written = Report::build(ReportKind::Error, file_name, span.start)
            .with_config(Config::default().with_color(false))
            .with_message(error.to_string())
            .with_label(Label::new((file_name, span.clone())).with_message(error.label()))
            .finish()
            .write((file_name, Source::from(source)), &mut buffer);

        match written {
            Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => format!("Error: {}", error),
        }
    }

    fn label(&self) -> String {
        match self {
            Error::Parse { error: ParseError::ReachedEnd, .. } => String::from("input ends here"),
            Error::Parse { .. } => String::from("here"),
            other => other.to_string(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ParseError::*;

        match self {
            ReachedEnd => write!(f, "Reached end of input"),
            UnknownToken => write!(f, "Encountered unknown token"),
            ExpectedOneOf(items) => {
                if items.len() == 1 {
                    write!(f, "Expected {}", items[0])
                } else {
                    write!(f, "Expected one of {}", items.join(", "))
                }
            },
            InvalidAssignTarget => write!(f, "Only a name can be assigned to"),
            TrailingInput => write!(f, "Expected a single expression"),
        }
    }
}
