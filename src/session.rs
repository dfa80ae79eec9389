use std::{collections::HashMap, ops::Index, rc::Rc};

use crate::{
    builtins::{self, Builtin, CallArgs},
    capture::{Capture, CaptureDecl},
    error::Error,
    eval::{Evaluator, Mode},
    input::{InputSource, MapInputs},
    parser::parse_block,
    ast::Expr,
    value::{Env, Value},
};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CaptureId(pub usize);

// Everything an interactive application sets up before anything is expanded: the
// bindings blocks can see, the functions they can call and the captures they can
// invoke by label.
pub struct Session {
    globals: Env,
    builtins: HashMap<String, Builtin>,
    inputs: Rc<dyn InputSource>,
    // Indexed by CaptureIds, detached captures included
    captures: Vec<Rc<Capture>>,
    // Maps capture label to the capture a block reaches by calling that label
    capture_ids: HashMap<String, CaptureId>,
}

impl Session {
    pub fn new() -> Session {
        Session::with_inputs(Rc::new(MapInputs::new()))
    }

    pub fn with_inputs(inputs: Rc<dyn InputSource>) -> Session {
        let mut session = Session {
            globals: Env::new(),
            builtins: HashMap::new(),
            inputs,
            captures: Vec::new(),
            capture_ids: HashMap::new(),
        };
        builtins::install(&mut session);
        session
    }

    pub fn inputs(&self) -> &Rc<dyn InputSource> {
        &self.inputs
    }

    // Current value of an input, NULL when the source does not know it
    pub fn read_input(&self, name: &str) -> Value {
        self.inputs.read(name).unwrap_or(Value::Null)
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn globals(&self) -> &Env {
        &self.globals
    }

    pub fn define_builtin<F>(&mut self, name: impl Into<String>, builtin: F)
    where
        F: Fn(&CallArgs) -> Result<Value, String> + 'static,
    {
        self.builtins.insert(name.into(), Rc::new(builtin));
    }

    pub fn builtin(&self, name: &str) -> Option<&Builtin> {
        self.builtins.get(name)
    }

    // Register a capture that blocks can invoke by its label
    pub fn declare(&mut self, decl: CaptureDecl) -> Rc<Capture> {
        let capture = self.declare_detached(decl);

        if let Some(previous) = self.capture_ids.insert(capture.label().to_owned(), capture.id()) {
            log::warn!(
                "capture '{}' redeclared, calls now reach {:?} instead of {:?}",
                capture.label(),
                capture.id(),
                previous
            );
        }

        capture
    }

    // Register a capture that has an identity but cannot be invoked by label, used
    // as a substitution target
    pub fn declare_detached(&mut self, decl: CaptureDecl) -> Rc<Capture> {
        let id = CaptureId(self.captures.len());
        let capture = Rc::new(Capture::new(id, decl));
        self.captures.push(capture.clone());
        capture
    }

    pub fn capture(&mut self, label: &str, source: &str) -> Result<Rc<Capture>, Error> {
        Ok(self.declare(CaptureDecl::new(label, parse_block(source)?)))
    }

    pub fn capture_with_guard(&mut self, label: &str, guard: &str, factory: &str) -> Result<Rc<Capture>, Error> {
        Ok(self.declare(CaptureDecl::guarded(label, parse_block(guard)?, parse_block(factory)?)))
    }

    pub fn lookup(&self, label: &str) -> Option<Rc<Capture>> {
        self.capture_ids.get(label).map(|id| self[id].clone())
    }

    // Captures reachable by label, in declaration order
    pub fn captures(&self) -> Vec<Rc<Capture>> {
        let mut ids: Vec<&CaptureId> = self.capture_ids.values().collect();
        ids.sort();
        ids.into_iter().map(|id| self[id].clone()).collect()
    }

    // Evaluate an expression against the globals
    pub fn evaluate(&self, expr: &Expr, mode: Mode) -> Result<Value, Error> {
        let mut env = self.globals.clone();
        Evaluator::new(self, mode).eval(expr, &mut env)
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

impl Index<&CaptureId> for Session {
    type Output = Rc<Capture>;

    fn index(&self, index: &CaptureId) -> &Self::Output {
        &self.captures[index.0]
    }
}
