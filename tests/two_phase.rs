use std::rc::Rc;

use metascript::{
    error::Error,
    expand::{expand_chain, ExpansionContext},
    input::MapInputs,
    session::Session,
    value::Value,
};

fn session(n: i64) -> Session {
    let inputs = Rc::new(MapInputs::new());
    inputs.set("n", Value::Integer(n));
    Session::with_inputs(inputs)
}

#[test]
fn value_mode_runs_guard_then_factory() {
    let mut session = session(3);
    session.capture("data", "{ 1:10 }").unwrap();
    let top = session
        .capture_with_guard(
            "top",
            "{ stopifnot(input$n > 0) }",
            "{ meta({ head(..(data()), ..(input$n)) }) }",
        )
        .unwrap();

    assert_eq!(
        top.as_value(&session, &[]).unwrap(),
        Value::Vector(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    );
}

#[test]
fn guard_never_reaches_generated_code() {
    let mut session = session(3);
    session.capture("data", "{ 1:10 }").unwrap();
    let top = session
        .capture_with_guard(
            "top",
            "{ stopifnot(input$n > 0) }",
            "{ meta({ head(..(data()), ..(input$n)) }) }",
        )
        .unwrap();

    let program = expand_chain(&session, [&top]).unwrap();
    assert_eq!(program.to_string(), "data <- 1:10\ntop <- head(data, 3L)\n");
    assert!(!program.to_string().contains("stopifnot"));
}

#[test]
fn failing_guard_only_affects_value_mode() {
    let mut session = session(0);
    let top = session
        .capture_with_guard("top", "{ stopifnot(input$n > 0) }", "{ meta({ seq_len(..(input$n)) }) }")
        .unwrap();

    match top.as_value(&session, &[]) {
        Err(Error::Computation { message }) => assert_eq!(message, "condition 1 is not all TRUE"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(expand_chain(&session, [&top]).unwrap().to_string(), "top <- seq_len(0L)\n");
}

#[test]
fn factory_locals_are_visible_to_markers() {
    let mut session = session(4);
    let sized = session
        .capture_with_guard(
            "sized",
            "{ TRUE }",
            "{ rows <- input$n * 2L; meta({\n  \"Sample rows\"\n  sample(..(rows))\n}) }",
        )
        .unwrap();

    let program = expand_chain(&session, [&sized]).unwrap();
    assert_eq!(program.to_string(), "# Sample rows\nsized <- sample(8L)\n");
}

#[test]
fn factory_must_produce_meta_code() {
    let mut session = session(1);
    let plain = session.capture_with_guard("plain", "{ TRUE }", "{ 42 }").unwrap();

    assert_eq!(plain.as_value(&session, &[]).unwrap(), Value::Double(42.0));

    match plain.as_expr(&session) {
        Err(Error::InvalidMetaExpr { capture, found }) => {
            assert_eq!(capture, "plain");
            assert_eq!(found, "double");
        }
        other => panic!("unexpected {:?}", other),
    }

    let mut ctx = ExpansionContext::new();
    assert!(matches!(
        ctx.expand(&session, [&plain]),
        Err(Error::InvalidMetaExpr { .. })
    ));
    assert!(!ctx.is_expanded(plain.id()));
}

#[test]
fn plain_quote_is_not_meta_code() {
    let mut session = session(1);
    let quoted = session
        .capture_with_guard("quoted", "{ TRUE }", "{ quote({ seq_len(..(input$n)) }) }")
        .unwrap();

    match quoted.as_expr(&session) {
        Err(Error::InvalidMetaExpr { capture, found }) => {
            assert_eq!(capture, "quoted");
            assert_eq!(found, "quoted expression");
        }
        other => panic!("unexpected {:?}", other),
    }
}
