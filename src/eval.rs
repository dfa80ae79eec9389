use std::rc::Rc;

use crate::{
    ast::{Arg, Block, Expr, Lit},
    builtins::CallArgs,
    capture::Capture,
    comment::annotate,
    error::Error,
    session::Session,
    value::{Env, Quoted, Value},
};

// What evaluation produces for the two forms that care. Value mode runs captures
// and evaluates `meta()` blocks; meta mode turns capture calls into handles and
// `meta()` blocks into quoted trees.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Value,
    Meta,
}

// An input read during evaluation and the value it had
#[derive(Clone, Debug, PartialEq)]
pub struct InputRead {
    pub name: String,
    pub value: Value,
}

pub struct Evaluator<'s> {
    session: &'s Session,
    mode: Mode,
    reads: Vec<InputRead>,
}

impl<'s> Evaluator<'s> {
    pub fn new(session: &'s Session, mode: Mode) -> Evaluator<'s> {
        Evaluator {
            session,
            mode,
            reads: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    // Inputs read so far, including reads made by captures this evaluation ran
    pub fn into_reads(self) -> Vec<InputRead> {
        self.reads
    }

    pub fn eval(&mut self, expr: &Expr, env: &mut Env) -> Result<Value, Error> {
        match expr {
            Expr::Lit(lit) => Ok(literal(lit)),
            Expr::Sym(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| Error::computation(format!("object '{}' not found", name))),
            Expr::Block(block) => self.eval_block(block, env),
            // Outside of resolution a marker is just its inner expression
            Expr::Unquote(inner) => self.eval(inner, env),
            Expr::Call { fun, args } => self.eval_call(fun, args, env),
        }
    }

    fn eval_block(&mut self, block: &Block, env: &mut Env) -> Result<Value, Error> {
        let mut result = Value::Null;
        for stmt in &block.stmts {
            result = self.eval(&stmt.expr, env)?;
        }
        Ok(result)
    }

    fn eval_call(&mut self, fun: &str, args: &[Arg], env: &mut Env) -> Result<Value, Error> {
        match fun {
            "<-" => {
                let [target, value] = args else {
                    return Err(Error::computation("'<-' needs a name and a value"));
                };
                let Expr::Sym(name) = &target.value else {
                    return Err(Error::computation("invalid assignment target"));
                };
                let value = self.eval(&value.value, env)?;
                env.insert(name.clone(), value.clone());
                Ok(value)
            }
            "if" => {
                let (cond, then) = match args {
                    [cond, then, ..] if args.len() <= 3 => (cond, then),
                    _ => return Err(Error::computation("malformed 'if'")),
                };
                if self.condition(&cond.value, env)? {
                    self.eval(&then.value, env)
                } else {
                    match args.get(2) {
                        Some(otherwise) => self.eval(&otherwise.value, env),
                        None => Ok(Value::Null),
                    }
                }
            }
            "&&" | "||" => {
                let [left, right] = args else {
                    return Err(Error::computation(format!("'{}' takes 2 operands", fun)));
                };
                let left = self.condition(&left.value, env)?;
                if (fun == "&&") != left {
                    return Ok(Value::Logical(left));
                }
                Ok(Value::Logical(self.condition(&right.value, env)?))
            }
            "quote" => Ok(Value::Quoted(self.quote(fun, args, env, false)?)),
            "meta" => match self.mode {
                Mode::Meta => Ok(Value::Quoted(self.quote(fun, args, env, true)?)),
                Mode::Value => {
                    let [body] = args else {
                        return Err(Error::computation("meta() takes 1 argument"));
                    };
                    self.eval(&body.value, env)
                }
            },
            "$" => self.eval_field(args, env),
            _ => {
                let mut items = Vec::with_capacity(args.len());
                for arg in args {
                    items.push((arg.name.clone(), self.eval(&arg.value, env)?));
                }
                let call_args = CallArgs::new(items);

                if let Some(capture) = self.session.lookup(fun) {
                    return self.invoke(&capture, call_args);
                }

                match self.session.builtin(fun) {
                    Some(builtin) => builtin(&call_args).map_err(Error::computation),
                    None => Err(Error::computation(format!("could not find function \"{}\"", fun))),
                }
            }
        }
    }

    fn quote(&self, fun: &str, args: &[Arg], env: &Env, meta: bool) -> Result<Quoted, Error> {
        match args {
            [body] if body.name.is_none() => Ok(Quoted {
                expr: Rc::new(annotate(body.value.clone())),
                env: env.clone(),
                meta,
            }),
            _ => Err(Error::computation(format!("{}() takes 1 argument", fun))),
        }
    }

    fn condition(&mut self, expr: &Expr, env: &mut Env) -> Result<bool, Error> {
        match self.eval(expr, env)? {
            Value::Null => Err(Error::computation("argument is of length zero")),
            Value::Vector(_) => Err(Error::computation("the condition has length > 1")),
            value => value
                .as_bool()
                .ok_or_else(|| Error::computation(format!("argument is not interpretable as logical: {}", value.kind()))),
        }
    }

    // `object$field`. An unbound `input` on the left reads the session's inputs.
    fn eval_field(&mut self, args: &[Arg], env: &mut Env) -> Result<Value, Error> {
        let [object, field] = args else {
            return Err(Error::computation("'$' takes an object and a field name"));
        };
        let Expr::Sym(field) = &field.value else {
            return Err(Error::computation("invalid field name after '$'"));
        };

        if matches!(&object.value, Expr::Sym(name) if name == "input") && !env.contains_key("input") {
            let value = self.session.read_input(field);
            self.record(InputRead { name: field.clone(), value: value.clone() });
            return Ok(value);
        }

        match self.eval(&object.value, env)? {
            Value::List(items) => Ok(items
                .into_iter()
                .find(|(name, _)| name.as_deref() == Some(field.as_str()))
                .map(|(_, value)| value)
                .unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(Error::computation(format!("$ operator is invalid for a {}", other.kind()))),
        }
    }

    fn invoke(&mut self, capture: &Rc<Capture>, call_args: CallArgs) -> Result<Value, Error> {
        let args = match_params(capture, call_args)?;

        match self.mode {
            Mode::Value => {
                let (value, reads) = capture.evaluate_tracked(self.session, &args)?;
                for read in reads {
                    self.record(read);
                }
                Ok(value)
            }
            Mode::Meta => Ok(Value::Handle(capture.handle(args))),
        }
    }

    fn record(&mut self, read: InputRead) {
        if !self.reads.iter().any(|seen| seen.name == read.name) {
            self.reads.push(read);
        }
    }
}

fn literal(lit: &Lit) -> Value {
    match lit {
        Lit::Null => Value::Null,
        Lit::Bool(b) => Value::Logical(*b),
        Lit::Int(n) => Value::Integer(*n),
        Lit::Double(n) => Value::Double(*n),
        Lit::Str(s) => Value::Str(s.clone()),
    }
}

// Order call arguments by the capture's parameters: named ones first, the rest
// fill the remaining slots left to right
fn match_params(capture: &Capture, call_args: CallArgs) -> Result<Vec<Value>, Error> {
    let params = capture.params();
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    let mut positional = Vec::new();

    for (name, value) in call_args.items {
        match name {
            Some(name) => {
                let Some(index) = params.iter().position(|param| *param == name) else {
                    return Err(Error::computation(format!(
                        "capture '{}' has no parameter '{}'",
                        capture.label(),
                        name
                    )));
                };
                if slots[index].replace(value).is_some() {
                    return Err(Error::computation(format!(
                        "formal argument '{}' of capture '{}' matched by multiple actual arguments",
                        name,
                        capture.label()
                    )));
                }
            }
            None => positional.push(value),
        }
    }

    let mut positional = positional.into_iter();
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        *slot = positional.next();
    }
    if positional.next().is_some() {
        return Err(Error::computation(format!(
            "capture '{}' takes {} argument(s)",
            capture.label(),
            params.len()
        )));
    }

    slots
        .into_iter()
        .zip(params)
        .map(|(slot, param)| {
            slot.ok_or_else(|| {
                Error::computation(format!("argument '{}' of capture '{}' is missing", param, capture.label()))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{input::MapInputs, parser::parse_expr};

    fn eval_in(session: &Session, source: &str, mode: Mode) -> Result<Value, Error> {
        session.evaluate(&parse_expr(source).unwrap(), mode)
    }

    #[test]
    fn blocks_assign_and_return_last_value() {
        let session = Session::new();
        assert_eq!(
            eval_in(&session, "{ x <- 2; y <- x * 3L; y + 1L }", Mode::Value).unwrap(),
            Value::Double(7.0)
        );
    }

    #[test]
    fn if_picks_a_branch() {
        let session = Session::new();
        assert_eq!(eval_in(&session, "if (1 > 2) \"a\" else \"b\"", Mode::Value).unwrap(), Value::str("b"));
        assert_eq!(eval_in(&session, "if (FALSE) 1", Mode::Value).unwrap(), Value::Null);
    }

    #[test]
    fn short_circuit_skips_right_operand() {
        let session = Session::new();
        assert_eq!(eval_in(&session, "FALSE && stop(\"boom\")", Mode::Value).unwrap(), Value::Logical(false));
        assert_eq!(eval_in(&session, "TRUE || stop(\"boom\")", Mode::Value).unwrap(), Value::Logical(true));
    }

    #[test]
    fn missing_object_and_function() {
        let session = Session::new();
        match eval_in(&session, "nope + 1", Mode::Value) {
            Err(Error::Computation { message }) => assert_eq!(message, "object 'nope' not found"),
            other => panic!("unexpected {:?}", other),
        }
        match eval_in(&session, "nope()", Mode::Value) {
            Err(Error::Computation { message }) => assert_eq!(message, "could not find function \"nope\""),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn input_reads_are_recorded_once() {
        let inputs = Rc::new(MapInputs::new());
        inputs.set("year", Value::Integer(2020));
        let session = Session::with_inputs(inputs);

        let mut evaluator = Evaluator::new(&session, Mode::Value);
        let mut env = session.globals().clone();
        let value = evaluator
            .eval(&parse_expr("input$year + input$year").unwrap(), &mut env)
            .unwrap();

        assert_eq!(value, Value::Integer(4040));
        assert_eq!(
            evaluator.into_reads(),
            vec![InputRead { name: String::from("year"), value: Value::Integer(2020) }]
        );
    }

    #[test]
    fn list_fields() {
        let session = Session::new();
        assert_eq!(eval_in(&session, "list(a = 1, b = \"x\")$b", Mode::Value).unwrap(), Value::str("x"));
        assert_eq!(eval_in(&session, "list(a = 1)$missing", Mode::Value).unwrap(), Value::Null);
    }

    #[test]
    fn meta_depends_on_mode() {
        let mut session = Session::new();
        session.set_global("n", Value::Integer(3));

        assert_eq!(eval_in(&session, "meta({ n + 1L })", Mode::Value).unwrap(), Value::Integer(4));
        match eval_in(&session, "meta({ n + 1L })", Mode::Meta).unwrap() {
            Value::Quoted(quoted) => {
                assert_eq!(quoted.expr.to_string(), "{\n  n + 1L\n}");
                assert_eq!(quoted.env.get("n"), Some(&Value::Integer(3)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn only_meta_marks_the_expression_to_capture() {
        let session = Session::new();
        for (source, meta) in [("meta({ 1 })", true), ("quote({ 1 })", false)] {
            match eval_in(&session, source, Mode::Meta).unwrap() {
                Value::Quoted(quoted) => assert_eq!(quoted.meta, meta, "{}", source),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn quote_never_evaluates() {
        let session = Session::new();
        match eval_in(&session, "quote(stop(\"x\"))", Mode::Value).unwrap() {
            Value::Quoted(quoted) => assert_eq!(*quoted.expr, Expr::call("stop", vec![Expr::str("x")])),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn capture_calls_depend_on_mode() {
        let mut session = Session::new();
        session.capture("double", "{ x * 2L }").unwrap();
        session.declare(
            crate::capture::CaptureDecl::new("scaled", parse_expr("{ x * k }").unwrap()).params(["x", "k"]),
        );
        session.set_global("x", Value::Integer(21));

        assert_eq!(eval_in(&session, "double()", Mode::Value).unwrap(), Value::Integer(42));
        assert_eq!(eval_in(&session, "scaled(k = 3L, 2L)", Mode::Value).unwrap(), Value::Integer(6));

        match eval_in(&session, "scaled(1L, 2L)", Mode::Meta).unwrap() {
            Value::Handle(handle) => {
                assert_eq!(handle.capture.label(), "scaled");
                assert_eq!(handle.args, vec![Value::Integer(1), Value::Integer(2)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn capture_arguments_are_checked() {
        let mut session = Session::new();
        session.declare(crate::capture::CaptureDecl::new("f", parse_expr("{ a }").unwrap()).params(["a"]));

        assert!(eval_in(&session, "f()", Mode::Value).is_err());
        assert!(eval_in(&session, "f(1, 2)", Mode::Value).is_err());
        assert!(eval_in(&session, "f(b = 1)", Mode::Value).is_err());

        match eval_in(&session, "f(a = 1, a = 2)", Mode::Value) {
            Err(Error::Computation { message }) => {
                assert_eq!(message, "formal argument 'a' of capture 'f' matched by multiple actual arguments")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
