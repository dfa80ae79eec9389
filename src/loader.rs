//! Session files.
//!
//! A session file is a list of top-level statements run against a session:
//!
//! ```text
//! data <- capture({
//!   "Load the data"
//!   read.csv(..(input$file))
//! }, binding = "df")
//! checked <- capture_guarded({ stopifnot(input$n > 0) }, { meta({ head(..(data()), ..(input$n)) }) })
//! setup <- quote({ library(ggplot2) })
//! ```
//!
//! `capture(...)` and `capture_guarded(...)` declare captures labelled with the
//! name they are assigned to. Every other statement is evaluated, and its
//! assignments become globals.

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{
    ast::{Arg, Expr},
    capture::CaptureDecl,
    error::Error,
    eval::Mode,
    parser::parse,
    session::Session,
    value::Value,
};

pub const FILE_EXTENSION: &str = ".meta";

// Run every statement of `source`, returning the labels it declared
pub fn load_source(session: &mut Session, source: &str) -> Result<Vec<String>, Error> {
    let mut labels = Vec::new();

    for statement in parse(source)? {
        let (name, value) = match &statement {
            Expr::Call { fun, args } if fun == "<-" => match (statement.assigned_name(), args.get(1)) {
                (Some(name), Some(value)) => (Some(name.to_owned()), &value.value),
                _ => (None, &statement),
            },
            _ => (None, &statement),
        };

        match (name, value) {
            (Some(label), Expr::Call { fun, args }) if fun == "capture" || fun == "capture_guarded" => {
                let decl = declaration(session, &label, fun, args)?;
                session.declare(decl);
                log::debug!("declared capture '{}'", label);
                labels.push(label);
            }
            (Some(name), value) => {
                let value = session.evaluate(value, Mode::Value)?;
                session.set_global(name, value);
            }
            (None, statement) => {
                session.evaluate(statement, Mode::Value)?;
            }
        }
    }

    Ok(labels)
}

// Load a session file, or every session file under a directory in file name order
pub fn load_path(session: &mut Session, path: &Path) -> Result<Vec<String>, Error> {
    let mut labels = Vec::new();

    if path.is_file() {
        labels.extend(load_file(session, path)?);
        return Ok(labels);
    }

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|error| Error::Io {
            path: path.to_path_buf(),
            source: error.into(),
        })?;

        let is_session_file = entry
            .file_name()
            .to_str()
            .map(|name| name.ends_with(FILE_EXTENSION))
            .unwrap_or(false);

        if entry.file_type().is_file() && is_session_file {
            labels.extend(load_file(session, entry.path())?);
        }
    }

    Ok(labels)
}

fn load_file(session: &mut Session, path: &Path) -> Result<Vec<String>, Error> {
    let source = read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("loading {}", path.display());
    load_source(session, &source).map_err(|error| Error::InFile {
        path: PathBuf::from(path),
        source: Box::new(error),
    })
}

fn declaration(session: &Session, label: &str, fun: &str, args: &[Arg]) -> Result<CaptureDecl, Error> {
    let mut blocks = Vec::new();
    let mut binding = None;
    let mut params = Vec::new();

    for arg in args {
        match arg.name.as_deref() {
            None => blocks.push(arg.value.clone()),
            Some("binding") => match session.evaluate(&arg.value, Mode::Value)? {
                Value::Str(name) => binding = Some(name),
                other => return Err(Error::computation(format!("binding must be a string, got {}", other.kind()))),
            },
            Some("params") => {
                let value = session.evaluate(&arg.value, Mode::Value)?;
                for param in value.elements().unwrap_or_default() {
                    match param {
                        Value::Str(param) => params.push(param),
                        other => return Err(Error::computation(format!("params must be strings, got {}", other.kind()))),
                    }
                }
            }
            Some(other) => return Err(Error::computation(format!("unused argument '{}' to {}()", other, fun))),
        }
    }

    let decl = match (fun, blocks.as_slice()) {
        ("capture", [body]) => CaptureDecl::new(label, body.clone()),
        ("capture_guarded", [guard, factory]) => CaptureDecl::guarded(label, guard.clone(), factory.clone()),
        ("capture", _) => return Err(Error::computation(format!("capture '{}' needs exactly one block", label))),
        _ => {
            return Err(Error::computation(format!(
                "capture '{}' needs a guard block and a factory block",
                label
            )))
        }
    };

    let decl = decl.params(params);
    Ok(match binding {
        Some(binding) => decl.binding(binding),
        None => decl,
    })
}
