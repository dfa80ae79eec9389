use std::{collections::HashSet, rc::Rc};

use metascript::{
    capture::{Capture, CaptureDecl},
    error::Error,
    eval::Mode,
    expand::{expand_chain, ExpansionContext, Root},
    input::MapInputs,
    literal,
    parser::{parse_block, parse_expr},
    program::StatementKind,
    session::Session,
    value::{Date, Value},
};

struct Pipeline {
    session: Session,
    data: Rc<Capture>,
    top: Rc<Capture>,
    summary: Rc<Capture>,
}

fn pipeline() -> Pipeline {
    let inputs = Rc::new(MapInputs::new());
    inputs.set("n", Value::Integer(5));

    let mut session = Session::with_inputs(inputs);
    let data = session
        .capture("data", "{\n  \"Load the data\"\n  read.csv(\"data.csv\")\n}")
        .unwrap();
    let top = session.capture("top", "{ head(..(data()), ..(input$n)) }").unwrap();
    let summary = session.capture("summary", "{ summary(..(data())) }").unwrap();

    Pipeline { session, data, top, summary }
}

#[test]
fn dependencies_are_hoisted_before_their_users() {
    let p = pipeline();
    let program = expand_chain(&p.session, [&p.top]).unwrap();

    assert_eq!(
        program.to_string(),
        "# Load the data\ndata <- read.csv(\"data.csv\")\ntop <- head(data, 5L)\n"
    );
}

#[test]
fn repeated_root_is_emitted_once() {
    let p = pipeline();
    let once = expand_chain(&p.session, [&p.data]).unwrap();
    let twice = expand_chain(&p.session, [&p.data, &p.data]).unwrap();

    assert_eq!(twice.len(), 2);
    assert_eq!(twice.statements()[0], once.statements()[0]);
    assert_eq!(twice.statements()[1].kind, StatementKind::Reference(String::from("data")));
}

#[test]
fn shared_dependency_is_emitted_once_per_batch() {
    let p = pipeline();
    let program = expand_chain(&p.session, [&p.top, &p.summary]).unwrap();

    assert_eq!(program.assigned_names(), vec!["data", "top", "summary"]);
    assert_eq!(program.statements()[2].to_expr().to_string(), "summary <- summary(data)");
}

#[test]
fn context_is_shared_across_calls() {
    let p = pipeline();
    let mut ctx = ExpansionContext::new();

    let first = ctx.expand(&p.session, [&p.top]).unwrap();
    assert_eq!(first.assigned_names(), vec!["data", "top"]);
    assert_eq!(ctx.name_of(p.data.id()), Some("data"));

    let second = ctx.expand(&p.session, [&p.summary]).unwrap();
    assert_eq!(second.to_string(), "summary <- summary(data)\n");

    let third = ctx.expand(&p.session, [&p.top]).unwrap();
    assert_eq!(third.to_string(), "top\n");
}

#[test]
fn every_name_is_assigned_before_it_is_used() {
    let mut p = pipeline();
    let report = p
        .session
        .capture("report", "{ list(..(top()), ..(summary())) }")
        .unwrap();
    let program = expand_chain(&p.session, [&report, &p.summary]).unwrap();

    let all: HashSet<&str> = program.assigned_names().into_iter().collect();
    let mut assigned = HashSet::new();
    for statement in program.statements() {
        for symbol in statement.to_expr().free_symbols() {
            if all.contains(symbol.as_str()) {
                assert!(assigned.contains(&symbol), "{} used before it is assigned in\n{}", symbol, program);
            }
        }
        if let Some(name) = statement.assigned_name() {
            assigned.insert(name.to_owned());
        }
    }
    assert_eq!(program.assigned_names(), vec!["data", "top", "summary", "report"]);
}

#[test]
fn unquoted_values_round_trip_through_code() {
    let values = vec![
        Value::str("ggplot2"),
        Value::Double(365.0),
        Value::Double(-2.5),
        Value::Double(f64::INFINITY),
        Value::Integer(-3),
        Value::Logical(true),
        Value::Null,
        Value::Date(Date { year: 2024, month: 1, day: 31 }),
        Value::Vector(vec![Value::Integer(1), Value::Integer(2)]),
        Value::Vector(vec![Value::str("a"), Value::str("b\n\"c\"")]),
        Value::List(vec![(Some(String::from("a")), Value::Double(1.0)), (None, Value::str("b"))]),
    ];

    let fresh = Session::new();
    for value in values {
        let code = literal::to_expr(&value).unwrap().to_string();
        let back = fresh.evaluate(&parse_expr(&code).unwrap(), Mode::Value).unwrap();
        assert_eq!(back, value, "{} did not round trip", code);
    }
}

#[test]
fn unquoted_values_appear_as_literals() {
    let mut session = Session::new();
    session.set_global("pkg", Value::str("ggplot2"));
    session.set_global("days", Value::Double(365.0));
    let setup = session.capture("setup", "{ library(..(pkg)); window <- ..(days) }").unwrap();

    let program = expand_chain(&session, [&setup]).unwrap();
    assert_eq!(
        program.to_string(),
        "setup <- {\n  library(\"ggplot2\")\n  window <- 365\n}\n"
    );
}

#[test]
fn integer_range_limits_round_trip_through_code() {
    let fresh = Session::new();
    for value in [Value::Integer(i64::MIN), Value::Integer(i64::MIN + 1), Value::Integer(i64::MAX)] {
        let code = literal::to_expr(&value).unwrap().to_string();
        let back = fresh.evaluate(&parse_expr(&code).unwrap(), Mode::Value).unwrap();
        assert_eq!(back, value, "{} did not round trip", code);
    }
}

#[test]
fn nan_arguments_share_one_expansion() {
    let mut session = Session::new();
    session.declare(CaptureDecl::new("step", parse_block("{ f(..(x)) }").unwrap()).params(["x"]));
    let user = session
        .capture("user", "{ g(..(step(NaN)), ..(step(NaN)), ..(step(0)), ..(step(-0))) }")
        .unwrap();

    let program = expand_chain(&session, [&user]).unwrap();
    assert_eq!(
        program.to_string(),
        "step <- f(NaN)\nstep_1 <- f(0)\nstep_2 <- f(-0)\nuser <- g(step, step, step_1, step_2)\n"
    );
}

#[test]
fn substitution_is_scoped_to_its_context() {
    let p = pipeline();

    let mut cached = ExpansionContext::new();
    cached.substitute_expr(&p.data, parse_block("{ readRDS(\"cache.rds\") }").unwrap());
    let mut plain = ExpansionContext::new();

    let with_cache = cached.expand(&p.session, [&p.top]).unwrap();
    let without = plain.expand(&p.session, [&p.top]).unwrap();

    assert_eq!(with_cache.to_string(), "data <- readRDS(\"cache.rds\")\ntop <- head(data, 5L)\n");
    assert_eq!(
        without.to_string(),
        "# Load the data\ndata <- read.csv(\"data.csv\")\ntop <- head(data, 5L)\n"
    );
}

#[test]
fn substitution_factory_gets_the_invocation_arguments() {
    let mut session = Session::new();
    let scaled = session.declare(CaptureDecl::new("scaled", parse_block("{ ..(x) * 2 }").unwrap()).params(["x"]));
    let mock = session.declare_detached(
        CaptureDecl::new("mock", parse_block("{ fake(..(rows)) }").unwrap()).params(["rows"]),
    );

    let mut ctx = ExpansionContext::new();
    let factory_mock = mock.clone();
    ctx.substitute(&scaled, move |args| factory_mock.handle(args.to_vec()));

    let program = ctx
        .expand(&session, [scaled.handle(vec![Value::Integer(7)])])
        .unwrap();
    assert_eq!(program.to_string(), "scaled <- fake(7L)\n");

    // The substitute stays out of value mode
    assert_eq!(scaled.as_value(&session, &[Value::Integer(7)]).unwrap(), Value::Double(14.0));
}

#[test]
fn different_arguments_get_their_own_names() {
    let mut session = Session::new();
    let scaled = session.declare(CaptureDecl::new("scaled", parse_block("{ ..(x) * 2 }").unwrap()).params(["x"]));
    let both = session
        .capture("both", "{ c(..(scaled(1L)), ..(scaled(2L)), ..(scaled(1L))) }")
        .unwrap();

    let program = expand_chain(&session, [&both]).unwrap();
    assert_eq!(
        program.to_string(),
        "scaled <- 1L * 2\nscaled_1 <- 2L * 2\nboth <- c(scaled, scaled_1, scaled)\n"
    );
    assert!(scaled.as_value(&session, &[]).is_err());
}

#[test]
fn cycles_are_reported_and_rolled_back() {
    let mut session = Session::new();
    let a = session.capture("a", "{ ..(b()) + 1 }").unwrap();
    let b = session.capture("b", "{ ..(a()) * 2 }").unwrap();
    let standalone = session.declare(CaptureDecl::new("other", parse_block("{ 1 }").unwrap()).binding("a"));
    let ok = session.capture("ok", "{ 0 }").unwrap();

    let mut ctx = ExpansionContext::new();
    ctx.expand(&session, [&ok]).unwrap();

    match ctx.expand(&session, [&a]) {
        Err(Error::CyclicExpansion { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(ctx.expand(&session, [&b]), Err(Error::CyclicExpansion { .. })));

    assert!(!ctx.is_expanded(a.id()));
    assert!(!ctx.is_expanded(b.id()));
    assert!(ctx.is_expanded(ok.id()));

    // The name reserved by the failed call is free again
    let program = ctx.expand(&session, [&standalone]).unwrap();
    assert_eq!(program.to_string(), "a <- 1\n");
}

#[test]
fn failed_call_discards_its_statements() {
    let p = pipeline();
    let mut session = p.session;
    session.set_global("plot", Value::opaque("ggplot", ()));
    let broken = session.capture("broken", "{ print(..(plot)) }").unwrap();

    let mut ctx = ExpansionContext::new();
    match ctx.expand(&session, [&p.top, &broken]) {
        Err(Error::Unquote { kind }) => assert_eq!(kind, "ggplot"),
        other => panic!("unexpected {:?}", other),
    }

    assert!(!ctx.is_expanded(p.data.id()));
    assert_eq!(ctx.expand(&session, [&p.top]).unwrap().assigned_names(), vec!["data", "top"]);
}

#[test]
fn comments_are_carried_not_evaluated() {
    let mut session = Session::new();
    let step = session.capture("step", "{\n  \"step one\"\n  compute(1)\n}").unwrap();
    let long = session
        .capture("long", "{ \"first\"; a <- 1; \"second\"; a + 1 }")
        .unwrap();

    let program = expand_chain(&session, [&step, &long]).unwrap();
    let pairs = program.pairs();

    assert_eq!(pairs[0].0.as_deref(), Some("step one"));
    assert_eq!(pairs[0].1.to_string(), "step <- compute(1)");
    assert!(!program.statements().iter().any(|s| s.to_expr().to_string().contains("\"step one\"")));

    assert_eq!(
        program.to_string(),
        "# step one\nstep <- compute(1)\n# first\nlong <- {\n  a <- 1\n  # second\n  a + 1\n}\n"
    );
}

#[test]
fn literal_roots_are_flattened_in_place() {
    let p = pipeline();
    let setup = parse_block("{ \"Packages\"; library(readr); library(dplyr) }").unwrap();

    let roots = vec![Root::from(setup), Root::from(&p.top)];
    let program = expand_chain(&p.session, roots).unwrap();

    assert_eq!(
        program.to_string(),
        "# Packages\nlibrary(readr)\nlibrary(dplyr)\n# Load the data\ndata <- read.csv(\"data.csv\")\ntop <- head(data, 5L)\n"
    );
}

#[test]
fn literal_roots_reserve_their_names() {
    let p = pipeline();
    let setup = parse_block("{ data <- 1 }").unwrap();

    let program = expand_chain(&p.session, vec![Root::from(setup), Root::from(&p.top)]).unwrap();
    assert_eq!(program.assigned_names(), vec!["data", "data_1", "top"]);
    assert_eq!(program.statements()[2].to_expr().to_string(), "top <- head(data_1, 5L)");
}
