use crate::{
    ast::{Arg, Block, Expr, Stmt},
    error::Error,
    eval::{Evaluator, Mode},
    literal,
    session::Session,
    value::{CaptureHandle, Env, Value},
};

// Whatever decides which name a capture handle reached by an unquote marker is
// spliced in as. The expansion context implements this to hoist and share
// captured steps.
pub trait Expand {
    fn expand_handle(&mut self, handle: &CaptureHandle) -> Result<String, Error>;
}

// Replaces every unquote marker of a tree with the code its inner expression
// stands for.
pub struct Resolver<'a, E: Expand + ?Sized> {
    session: &'a Session,
    expander: &'a mut E,
}

impl<'a, E: Expand + ?Sized> Resolver<'a, E> {
    pub fn new(session: &'a Session, expander: &'a mut E) -> Resolver<'a, E> {
        Resolver { session, expander }
    }

    // Resolve `expr`, evaluating its markers in `env`. The result holds no markers.
    pub fn resolve(&mut self, expr: &Expr, env: &Env) -> Result<Expr, Error> {
        match expr {
            Expr::Lit(_) | Expr::Sym(_) => Ok(expr.clone()),
            Expr::Call { fun, args } => {
                let args = args
                    .iter()
                    .map(|arg| {
                        Ok(Arg {
                            name: arg.name.clone(),
                            value: self.resolve(&arg.value, env)?,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(Expr::Call { fun: fun.clone(), args })
            }
            Expr::Block(block) => self.resolve_block(block, env).map(Expr::Block),
            Expr::Unquote(inner) => self.resolve_unquote(inner, env),
        }
    }

    fn resolve_block(&mut self, block: &Block, env: &Env) -> Result<Block, Error> {
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            stmts.push(Stmt {
                comments: stmt.comments.clone(),
                expr: self.resolve(&stmt.expr, env)?,
            });
        }

        Ok(Block {
            stmts,
            trailing: block.trailing.clone(),
        })
    }

    fn resolve_unquote(&mut self, inner: &Expr, env: &Env) -> Result<Expr, Error> {
        // Assignments made inside a marker stay inside it
        let mut scope = env.clone();
        let value = Evaluator::new(self.session, Mode::Meta).eval(inner, &mut scope)?;

        match value {
            Value::Handle(handle) => self.expander.expand_handle(&handle).map(Expr::Sym),
            // Quoted code is spliced in after its own markers are resolved
            Value::Quoted(quoted) => self.resolve(&quoted.expr, &quoted.env),
            other => literal::to_expr(&other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{input::MapInputs, parser::parse_expr};
    use std::rc::Rc;

    // Splices every handle in as its capture's label
    struct ByLabel(Vec<String>);

    impl Expand for ByLabel {
        fn expand_handle(&mut self, handle: &CaptureHandle) -> Result<String, Error> {
            self.0.push(handle.capture.label().to_owned());
            Ok(handle.capture.label().to_owned())
        }
    }

    fn resolve(session: &Session, source: &str) -> Result<Expr, Error> {
        let mut expander = ByLabel(Vec::new());
        Resolver::new(session, &mut expander).resolve(&parse_expr(source).unwrap(), session.globals())
    }

    #[test]
    fn plain_values_become_literals() {
        let inputs = Rc::new(MapInputs::new());
        inputs.set("pkg", Value::str("ggplot2"));
        let mut session = Session::with_inputs(inputs);
        session.set_global("days", Value::Double(365.0));

        let resolved = resolve(&session, "{ library(..(input$pkg)); x <- ..(days) * 2 }").unwrap();
        assert_eq!(resolved.to_string(), "{\n  library(\"ggplot2\")\n  x <- 365 * 2\n}");
    }

    #[test]
    fn code_outside_markers_is_copied() {
        let session = Session::new();
        let expr = parse_expr("{ x <- f(y); x$z }").unwrap();
        let mut expander = ByLabel(Vec::new());
        assert_eq!(Resolver::new(&session, &mut expander).resolve(&expr, session.globals()).unwrap(), expr);
    }

    #[test]
    fn handles_go_through_the_expander() {
        let mut session = Session::new();
        session.capture("data", "{ read() }").unwrap();

        let mut expander = ByLabel(Vec::new());
        let expr = parse_expr("summary(..(data()))").unwrap();
        let resolved = Resolver::new(&session, &mut expander).resolve(&expr, session.globals()).unwrap();

        assert_eq!(resolved.to_string(), "summary(data)");
        assert_eq!(expander.0, vec![String::from("data")]);
    }

    #[test]
    fn quoted_code_is_spliced_and_resolved() {
        let mut session = Session::new();
        session.set_global("n", Value::Integer(3));
        let step = session.evaluate(&parse_expr("quote(head(x, ..(n)))").unwrap(), Mode::Value).unwrap();
        session.set_global("step", step);

        assert_eq!(resolve(&session, "..(step) + 1").unwrap().to_string(), "head(x, 3L) + 1");
    }

    #[test]
    fn host_objects_cannot_be_unquoted() {
        let mut session = Session::new();
        session.set_global("plot", Value::opaque("ggplot", ()));

        match resolve(&session, "print(..(plot))") {
            Err(Error::Unquote { kind }) => assert_eq!(kind, "ggplot"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failing_markers_report_the_computation_error() {
        let session = Session::new();
        match resolve(&session, "f(..(stop(\"no data\")))") {
            Err(Error::Computation { message }) => assert_eq!(message, "no data"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
