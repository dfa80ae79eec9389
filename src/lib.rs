pub mod ast;
pub mod builtins;
pub mod capture;
pub mod comment;
pub mod deparse;
pub mod error;
pub mod eval;
pub mod expand;
pub mod input;
pub mod lexer;
pub mod literal;
pub mod loader;
pub mod location;
pub mod parser;
pub mod program;
pub mod resolver;
pub mod session;
pub mod value;

pub use ast::Expr;
pub use capture::{Capture, CaptureDecl};
pub use error::Error;
pub use eval::Mode;
pub use expand::{expand_chain, ExpansionContext, Root};
pub use input::{InputSource, MapInputs};
pub use program::{Program, Statement, StatementKind};
pub use session::{CaptureId, Session};
pub use value::{CaptureHandle, Quoted, Value};
