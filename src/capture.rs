use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    ast::Expr,
    comment::annotate,
    error::Error,
    eval::{Evaluator, InputRead, Mode},
    session::{CaptureId, Session},
    value::{identical, CaptureHandle, Env, Quoted, Value},
};

pub enum CaptureKind {
    Plain {
        body: Rc<Expr>,
    },
    // The guard runs for its effect in value mode only. The factory yields the value
    // in value mode and a `meta()` expression in meta mode.
    Guarded {
        guard: Rc<Expr>,
        factory: Rc<Expr>,
    },
}

// Everything needed to declare a capture, see `Session::declare`.
pub struct CaptureDecl {
    label: String,
    binding: Option<String>,
    params: Vec<String>,
    kind: CaptureKind,
}

impl CaptureDecl {
    pub fn new(label: impl Into<String>, body: Expr) -> CaptureDecl {
        CaptureDecl {
            label: label.into(),
            binding: None,
            params: Vec::new(),
            kind: CaptureKind::Plain { body: Rc::new(body) },
        }
    }

    pub fn guarded(label: impl Into<String>, guard: Expr, factory: Expr) -> CaptureDecl {
        CaptureDecl {
            label: label.into(),
            binding: None,
            params: Vec::new(),
            kind: CaptureKind::Guarded {
                guard: Rc::new(guard),
                factory: Rc::new(factory),
            },
        }
    }

    // Variable name the capture's result should be assigned to in generated code
    pub fn binding(mut self, name: impl Into<String>) -> CaptureDecl {
        self.binding = Some(name.into());
        self
    }

    pub fn params<I, S>(mut self, params: I) -> CaptureDecl
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }
}

struct Memo {
    args: Vec<Value>,
    reads: Vec<InputRead>,
    value: Value,
}

impl Memo {
    fn is_valid(&self, session: &Session, args: &[Value]) -> bool {
        identical(&self.args, args) && self.reads.iter().all(|read| session.read_input(&read.name).identical(&read.value))
    }
}

pub struct Capture {
    id: CaptureId,
    label: String,
    binding: Option<String>,
    params: Vec<String>,
    kind: CaptureKind,
    memo: RefCell<Option<Memo>>,
    running: Cell<bool>,
}

impl Capture {
    pub(crate) fn new(id: CaptureId, decl: CaptureDecl) -> Capture {
        let annotated = |expr: Rc<Expr>| Rc::new(annotate(Rc::try_unwrap(expr).unwrap_or_else(|shared| (*shared).clone())));

        let kind = match decl.kind {
            CaptureKind::Plain { body } => CaptureKind::Plain { body: annotated(body) },
            CaptureKind::Guarded { guard, factory } => CaptureKind::Guarded {
                guard: annotated(guard),
                factory: annotated(factory),
            },
        };

        Capture {
            id,
            label: decl.label,
            binding: decl.binding,
            params: decl.params,
            kind,
            memo: RefCell::new(None),
            running: Cell::new(false),
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn kind(&self) -> &CaptureKind {
        &self.kind
    }

    pub fn handle(self: &Rc<Self>, args: Vec<Value>) -> CaptureHandle {
        CaptureHandle { capture: self.clone(), args }
    }

    // Run the block and return its value, reusing the previous result while the
    // arguments and every input it read are unchanged
    pub fn as_value(&self, session: &Session, args: &[Value]) -> Result<Value, Error> {
        self.evaluate_tracked(session, args).map(|(value, _)| value)
    }

    // Value plus the inputs it depends on, so callers can fold them into their own
    // dependencies
    pub(crate) fn evaluate_tracked(&self, session: &Session, args: &[Value]) -> Result<(Value, Vec<InputRead>), Error> {
        if self.running.get() {
            return Err(Error::computation(format!("capture '{}' depends on its own value", self.label)));
        }

        if let Some(memo) = self.memo.borrow().as_ref() {
            if memo.is_valid(session, args) {
                log::trace!("capture '{}' reused its cached value", self.label);
                return Ok((memo.value.clone(), memo.reads.clone()));
            }
        }

        log::debug!("evaluating capture '{}'", self.label);
        self.running.set(true);
        let result = self.run(session, args);
        self.running.set(false);

        let (value, reads) = result?;
        *self.memo.borrow_mut() = Some(Memo {
            args: args.to_vec(),
            reads: reads.clone(),
            value: value.clone(),
        });

        Ok((value, reads))
    }

    fn run(&self, session: &Session, args: &[Value]) -> Result<(Value, Vec<InputRead>), Error> {
        let mut env = self.environment(session, args)?;
        let mut evaluator = Evaluator::new(session, Mode::Value);

        let value = match &self.kind {
            CaptureKind::Plain { body } => evaluator.eval(body, &mut env)?,
            CaptureKind::Guarded { guard, factory } => {
                evaluator.eval(guard, &mut env)?;
                evaluator.eval(factory, &mut env)?
            }
        };

        Ok((value, evaluator.into_reads()))
    }

    // The tree with its unquote markers intact. Plain captures hand out their
    // declared tree; guarded ones evaluate their factory in meta mode.
    pub fn as_expr(&self, session: &Session) -> Result<Rc<Expr>, Error> {
        match &self.kind {
            CaptureKind::Plain { body } => Ok(body.clone()),
            CaptureKind::Guarded { .. } => self.quote(session, &[]).map(|quoted| quoted.expr),
        }
    }

    // The tree together with the bindings its unquote markers are evaluated in
    pub fn quote(&self, session: &Session, args: &[Value]) -> Result<Quoted, Error> {
        let mut env = self.environment(session, args)?;

        match &self.kind {
            CaptureKind::Plain { body } => Ok(Quoted {
                expr: body.clone(),
                env,
                meta: true,
            }),
            CaptureKind::Guarded { factory, .. } => {
                let mut evaluator = Evaluator::new(session, Mode::Meta);
                match evaluator.eval(factory, &mut env)? {
                    Value::Quoted(quoted) if quoted.meta => Ok(quoted),
                    other => Err(Error::InvalidMetaExpr {
                        capture: self.label.clone(),
                        found: other.kind(),
                    }),
                }
            }
        }
    }

    // Forget the cached value
    pub fn invalidate(&self) {
        self.memo.borrow_mut().take();
    }

    // Globals plus the parameters bound to `args`
    pub(crate) fn environment(&self, session: &Session, args: &[Value]) -> Result<Env, Error> {
        if args.len() != self.params.len() {
            return Err(Error::computation(format!(
                "capture '{}' takes {} argument(s) but {} were given",
                self.label,
                self.params.len(),
                args.len()
            )));
        }

        let mut env = session.globals().clone();
        for (param, arg) in self.params.iter().zip(args) {
            env.insert(param.clone(), arg.clone());
        }

        Ok(env)
    }
}
