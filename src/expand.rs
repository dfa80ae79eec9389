use std::{collections::HashMap, rc::Rc};

use crate::{
    ast::{Block, Expr, Lit, Stmt},
    capture::Capture,
    comment::annotate,
    error::Error,
    program::{Program, Statement},
    resolver::{Expand, Resolver},
    session::{CaptureId, Session},
    value::{identical, CaptureHandle, Env, Quoted, Value},
};

const GENERATED_PREFIX: &str = "var";

// Words the lexer never reads as names
const RESERVED: [&str; 7] = ["if", "else", "TRUE", "FALSE", "NULL", "Inf", "NaN"];

// Something to expand: a capture invoked with arguments, or a tree of setup code
pub enum Root {
    Capture(CaptureHandle),
    // Markers resolve against the session's globals
    Expr(Rc<Expr>),
    Quoted(Quoted),
}

impl From<&Rc<Capture>> for Root {
    fn from(capture: &Rc<Capture>) -> Root {
        Root::Capture(capture.handle(Vec::new()))
    }
}

impl From<Rc<Capture>> for Root {
    fn from(capture: Rc<Capture>) -> Root {
        Root::Capture(capture.handle(Vec::new()))
    }
}

impl From<CaptureHandle> for Root {
    fn from(handle: CaptureHandle) -> Root {
        Root::Capture(handle)
    }
}

impl From<Expr> for Root {
    fn from(expr: Expr) -> Root {
        Root::Expr(Rc::new(expr))
    }
}

impl From<Quoted> for Root {
    fn from(quoted: Quoted) -> Root {
        Root::Quoted(quoted)
    }
}

#[derive(Clone)]
pub enum Substitution {
    // Called with the arguments of the replaced invocation
    Factory(Rc<dyn Fn(&[Value]) -> CaptureHandle>),
    // Tree used in place of the capture's own, markers evaluated with the
    // capture's parameters bound
    Expr(Rc<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum EntryState {
    InProgress,
    Expanded,
}

// One expanded (or expanding) invocation. Invocations of the same capture with
// different arguments produce different code and get an entry each.
#[derive(Clone, Debug)]
struct Entry {
    id: CaptureId,
    args: Vec<Value>,
    name: String,
    state: EntryState,
}

// Remembers which captures were already turned into code and under which
// name, so expanding several results, or expanding in several calls, emits
// every shared step once.
#[derive(Default)]
pub struct ExpansionContext {
    entries: im::Vector<Entry>,
    names: im::HashSet<String>,
    substitutions: HashMap<CaptureId, Substitution>,
}

impl ExpansionContext {
    pub fn new() -> ExpansionContext {
        ExpansionContext::default()
    }

    // Use the capture returned by `factory` whenever `capture` is expanded in this
    // context. Has no effect once `capture` was expanded here.
    pub fn substitute<F>(&mut self, capture: &Capture, factory: F)
    where
        F: Fn(&[Value]) -> CaptureHandle + 'static,
    {
        self.register(capture, Substitution::Factory(Rc::new(factory)));
    }

    pub fn substitute_expr(&mut self, capture: &Capture, expr: Expr) {
        self.register(capture, Substitution::Expr(Rc::new(annotate(expr))));
    }

    fn register(&mut self, capture: &Capture, substitution: Substitution) {
        if self.is_expanded(capture.id()) {
            log::warn!("capture '{}' is already expanded, its substitution will not be used", capture.label());
        }
        self.substitutions.insert(capture.id(), substitution);
    }

    // Name the capture's first expansion in this context was assigned to
    pub fn name_of(&self, id: CaptureId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id && entry.state == EntryState::Expanded)
            .map(|entry| entry.name.as_str())
    }

    pub fn is_expanded(&self, id: CaptureId) -> bool {
        self.name_of(id).is_some()
    }

    // Expand `roots` in order into one program. Steps expanded by earlier calls on
    // this context are referenced by name instead of emitted again. On error the
    // context is left as it was before the call.
    pub fn expand<I, R>(&mut self, session: &Session, roots: I) -> Result<Program, Error>
    where
        I: IntoIterator<Item = R>,
        R: Into<Root>,
    {
        let entries = self.entries.clone();
        let names = self.names.clone();

        let mut expander = Expander {
            ctx: self,
            session,
            statements: Vec::new(),
            stack: Vec::new(),
        };

        let mut result = Ok(());
        for root in roots {
            result = expander.root(root.into());
            if result.is_err() {
                break;
            }
        }

        let statements = expander.statements;
        match result {
            Ok(()) => Ok(Program::new(statements)),
            Err(error) => {
                log::debug!("expansion failed, rolling back: {}", error);
                self.entries = entries;
                self.names = names;
                Err(error)
            }
        }
    }

    fn find(&self, id: CaptureId, args: &[Value]) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id && identical(&entry.args, args))
    }

    fn reserve_name(&mut self, capture: &Capture) -> String {
        let binding = capture.binding().filter(|binding| {
            let valid = is_identifier(binding);
            if !valid {
                log::warn!("binding '{}' of capture '{}' is not a valid name", binding, capture.label());
            }
            valid
        });
        let preferred = binding.or_else(|| Some(capture.label()).filter(|label| is_identifier(label)));

        let name = match preferred {
            Some(name) if !self.names.contains(name) => name.to_owned(),
            Some(name) => self.fresh_name(name),
            None => self.fresh_name(GENERATED_PREFIX),
        };

        self.names.insert(name.clone());
        name
    }

    fn fresh_name(&self, prefix: &str) -> String {
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", prefix, n);
            if !self.names.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

// Expand roots with a context of their own
pub fn expand_chain<I, R>(session: &Session, roots: I) -> Result<Program, Error>
where
    I: IntoIterator<Item = R>,
    R: Into<Root>,
{
    ExpansionContext::new().expand(session, roots)
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !RESERVED.contains(&name)
}

// State of a single `expand` call
struct Expander<'a> {
    ctx: &'a mut ExpansionContext,
    session: &'a Session,
    statements: Vec<Statement>,
    // Captures currently being expanded, outermost first
    stack: Vec<(CaptureId, String)>,
}

impl Expander<'_> {
    fn root(&mut self, root: Root) -> Result<(), Error> {
        match root {
            Root::Capture(handle) => {
                let expanded = self
                    .ctx
                    .find(handle.capture.id(), &handle.args)
                    .filter(|entry| entry.state == EntryState::Expanded)
                    .map(|entry| entry.name.clone());

                match expanded {
                    Some(name) => {
                        log::debug!("capture '{}' already expanded as '{}'", handle.capture.label(), name);
                        self.statements.push(Statement::reference(name));
                    }
                    None => {
                        self.expand_handle(&handle)?;
                    }
                }
                Ok(())
            }
            Root::Expr(expr) => {
                let env = self.session.globals().clone();
                self.literal_root(&expr, &env)
            }
            Root::Quoted(quoted) => self.literal_root(&quoted.expr, &quoted.env),
        }
    }

    // Setup code goes in as top-level statements, a block contributing one
    // statement per statement it holds
    fn literal_root(&mut self, expr: &Expr, env: &Env) -> Result<(), Error> {
        let annotated = annotate(expr.clone());
        let resolved = if annotated.contains_unquote() {
            let session = self.session;
            Resolver::new(session, self).resolve(&annotated, env)?
        } else {
            annotated
        };

        let (stmts, trailing) = match resolved {
            Expr::Block(Block { stmts, trailing }) => (stmts, trailing),
            other => (vec![Stmt::new(other)], Vec::new()),
        };

        let start = self.statements.len();
        for stmt in stmts {
            let statement = Statement::expr(stmt.expr).with_comments(stmt.comments);
            if self.statements.contains(&statement) {
                continue;
            }
            if let Some(name) = statement.assigned_name() {
                self.ctx.names.insert(name.to_owned());
            }
            self.statements.push(statement);
        }

        if self.statements.len() > start {
            if let Some(last) = self.statements.last_mut() {
                last.trailing.extend(trailing);
            }
        }

        Ok(())
    }

    fn quote(&self, handle: &CaptureHandle) -> Result<Quoted, Error> {
        let capture = &handle.capture;
        match self.ctx.substitutions.get(&capture.id()) {
            Some(Substitution::Factory(factory)) => {
                let replacement = factory(handle.args.as_slice());
                log::debug!(
                    "capture '{}' substituted by '{}'",
                    capture.label(),
                    replacement.capture.label()
                );
                replacement.capture.quote(self.session, &replacement.args)
            }
            Some(Substitution::Expr(expr)) => {
                log::debug!("capture '{}' substituted by a fixed tree", capture.label());
                Ok(Quoted {
                    expr: expr.clone(),
                    env: capture.environment(self.session, &handle.args)?,
                    meta: true,
                })
            }
            None => capture.quote(self.session, &handle.args),
        }
    }
}

impl Expand for Expander<'_> {
    fn expand_handle(&mut self, handle: &CaptureHandle) -> Result<String, Error> {
        let capture = &handle.capture;

        if let Some(entry) = self.ctx.find(capture.id(), &handle.args) {
            if entry.state == EntryState::Expanded {
                return Ok(entry.name.clone());
            }

            let start = self.stack.iter().rposition(|(id, _)| *id == capture.id()).unwrap_or(0);
            let mut chain: Vec<String> = self.stack[start..].iter().map(|(_, label)| label.clone()).collect();
            chain.push(capture.label().to_owned());
            return Err(Error::CyclicExpansion { chain });
        }

        // Reserve the name first so dependencies never take it
        let name = self.ctx.reserve_name(capture);
        self.ctx.entries.push_back(Entry {
            id: capture.id(),
            args: handle.args.clone(),
            name: name.clone(),
            state: EntryState::InProgress,
        });
        self.stack.push((capture.id(), capture.label().to_owned()));
        log::debug!("expanding capture '{}' as '{}'", capture.label(), name);

        let quoted = self.quote(handle)?;
        let session = self.session;
        let body = Resolver::new(session, self).resolve(&quoted.expr, &quoted.env)?;

        self.stack.pop();
        self.statements.push(assignment(&name, body));
        for entry in self.ctx.entries.iter_mut() {
            if entry.id == capture.id() && identical(&entry.args, &handle.args) {
                entry.state = EntryState::Expanded;
            }
        }

        Ok(name)
    }
}

// `name <- body`. A single-statement block is unwrapped; otherwise the block's
// leading comments move up to the assignment.
fn assignment(name: &str, body: Expr) -> Statement {
    match body {
        Expr::Block(mut block) if block.stmts.len() == 1 => {
            let stmt = block.stmts.remove(0);
            let mut statement = Statement::assign(name, stmt.expr).with_comments(stmt.comments);
            statement.trailing = block.trailing;
            statement
        }
        Expr::Block(block) if block.stmts.is_empty() => {
            Statement::assign(name, Expr::Lit(Lit::Null)).with_comments(block.trailing)
        }
        Expr::Block(mut block) => {
            let comments = std::mem::take(&mut block.stmts[0].comments);
            Statement::assign(name, Expr::Block(block)).with_comments(comments)
        }
        other => Statement::assign(name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("plot_data"));
        assert!(is_identifier("df.2"));
        assert!(!is_identifier("2df"));
        assert!(!is_identifier("plot data"));
        assert!(!is_identifier("TRUE"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn single_statement_blocks_are_unwrapped() {
        let body = crate::parser::parse_block("{ x + 1 }").unwrap();
        assert_eq!(assignment("y", body).to_expr().to_string(), "y <- x + 1");
    }

    #[test]
    fn leading_comment_moves_to_the_assignment() {
        let body = annotate(crate::parser::parse_block("{ \"load\"; a <- 1; a * 2 }").unwrap());
        let statement = assignment("y", body);

        assert_eq!(statement.comments, vec![String::from("load")]);
        assert_eq!(statement.to_expr().to_string(), "y <- {\n  a <- 1\n  a * 2\n}");
    }

    #[test]
    fn generated_names_count_up() {
        let mut session = Session::new();
        let first = session.capture("plot data", "{ 1 }").unwrap();
        let second = session.capture("other data", "{ 2 }").unwrap();
        let third = session.capture("x", "{ 3 }").unwrap();
        let fourth = session.declare(crate::capture::CaptureDecl::new("y", Expr::block(Vec::new())).binding("x"));

        let mut ctx = ExpansionContext::new();
        assert_eq!(ctx.reserve_name(&first), "var_1");
        assert_eq!(ctx.reserve_name(&second), "var_2");
        assert_eq!(ctx.reserve_name(&third), "x");
        assert_eq!(ctx.reserve_name(&fourth), "x_1");
    }
}
