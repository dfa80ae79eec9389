use std::{fs::read_to_string, path::Path, process::ExitCode, rc::Rc};

use clap::Parser as _;
use metascript::{
    error::Error,
    eval::Mode,
    expand::{ExpansionContext, Root},
    input::MapInputs,
    loader::load_path,
    parser::parse_expr,
    session::Session,
    value::Value,
};

#[derive(clap::Parser, Debug)]
struct Args {
    // Session file, or a directory of them
    #[arg(help = "Session file or directory")]
    src: String,

    #[arg(short, long = "input", value_name = "NAME=EXPR", help = "Set an input before anything runs")]
    inputs: Vec<String>,

    #[arg(short, long, value_name = "LABEL", help = "Expand a capture (or a global holding quoted code)")]
    expand: Vec<String>,

    #[arg(short, long, value_name = "LABEL", help = "Print the value of a capture")]
    value: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", render(&error));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let inputs = Rc::new(MapInputs::new());
    let mut session = Session::with_inputs(inputs.clone());

    for assignment in &args.inputs {
        let (name, value) = parse_input(&session, assignment)?;
        inputs.set(name, value);
    }

    let labels = load_path(&mut session, Path::new(&args.src))?;

    for label in &args.value {
        let capture = session
            .lookup(label)
            .ok_or_else(|| Error::computation(format!("no capture labelled '{}'", label)))?;
        println!("{}", capture.as_value(&session, &[])?);
    }

    let targets = if args.expand.is_empty() && args.value.is_empty() {
        labels
    } else {
        args.expand.clone()
    };
    if targets.is_empty() {
        return Ok(());
    }

    let roots = targets
        .iter()
        .map(|label| root(&session, label))
        .collect::<Result<Vec<_>, Error>>()?;
    let program = ExpansionContext::new().expand(&session, roots)?;
    print!("{}", program);

    Ok(())
}

fn root(session: &Session, label: &str) -> Result<Root, Error> {
    if let Some(capture) = session.lookup(label) {
        return Ok(Root::from(capture));
    }

    match session.global(label) {
        Some(Value::Quoted(quoted)) => Ok(Root::from(quoted.clone())),
        Some(other) => Err(Error::computation(format!(
            "'{}' holds a {}, not quoted code",
            label,
            other.kind()
        ))),
        None => Err(Error::computation(format!("no capture labelled '{}'", label))),
    }
}

// `name=expr`, the expression evaluated against an empty session
fn parse_input(session: &Session, assignment: &str) -> Result<(String, Value), Error> {
    let Some((name, source)) = assignment.split_once('=') else {
        return Err(Error::computation(format!("expected NAME=EXPR, got '{}'", assignment)));
    };

    let value = session.evaluate(&parse_expr(source)?, Mode::Value)?;
    Ok((name.trim().to_owned(), value))
}

fn render(error: &Error) -> String {
    match error {
        Error::InFile { path, source } if source.span().is_some() => match read_to_string(path) {
            Ok(text) => source.report(&path.display().to_string(), &text),
            Err(_) => format!("Error: {}", error),
        },
        other => format!("Error: {}", other),
    }
}
