//! Functions every session starts with. Operators are functions too, so `a + b`
//! dispatches to the `+` entry here. Hosts add their own with
//! `Session::define_builtin`.

use std::{cmp::Ordering, rc::Rc};

use crate::{
    session::Session,
    value::{format_double, Date, Value},
};

pub type Builtin = Rc<dyn Fn(&CallArgs) -> Result<Value, String>>;

// Evaluated arguments of a call, in the order they were written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
    pub items: Vec<(Option<String>, Value)>,
}

impl CallArgs {
    pub fn new(items: Vec<(Option<String>, Value)>) -> CallArgs {
        CallArgs { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn positional(&self) -> Vec<&Value> {
        self.items.iter().filter(|(name, _)| name.is_none()).map(|(_, value)| value).collect()
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|(arg_name, _)| arg_name.as_deref() == Some(name))
            .map(|(_, value)| value)
    }

    // Argument matched by name first, else the `index`th unnamed one
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.named(name).or_else(|| self.positional().get(index).copied())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.items.iter().map(|(_, value)| value)
    }
}

const MAX_SEQUENCE: usize = 10_000_000;

pub fn install(session: &mut Session) {
    for op in ["+", "-", "*", "/", "^"] {
        session.define_builtin(op, move |args| arithmetic(op, args));
    }
    for op in ["==", "!=", "<", ">", "<=", ">="] {
        session.define_builtin(op, move |args| {
            let (a, b) = binary(op, args)?;
            elementwise(a, b, |x, y| compare(op, x, y))
        });
    }
    for op in ["&", "&&"] {
        session.define_builtin(op, move |args| logical(op, args, |x, y| x && y));
    }
    for op in ["|", "||"] {
        session.define_builtin(op, move |args| logical(op, args, |x, y| x || y));
    }
    session.define_builtin("!", |args| {
        let x = unary("!", args)?;
        map_elements(x, |item| match item.as_bool() {
            Some(b) => Ok(Value::Logical(!b)),
            None => Err(String::from("invalid argument type for '!'")),
        })
    });
    session.define_builtin(":", sequence);

    session.define_builtin("c", |args| {
        let mut items = Vec::new();
        for value in args.values() {
            items.extend(value.elements().ok_or_else(|| format!("c() cannot combine a {}", value.kind()))?);
        }
        Value::combine(items)
    });
    session.define_builtin("list", |args| Ok(Value::List(args.items.clone())));
    session.define_builtin("length", |args| {
        let length = match unary("length", args)? {
            Value::Null => 0,
            Value::Vector(items) => items.len(),
            Value::List(items) => items.len(),
            _ => 1,
        };
        Ok(Value::Integer(length as i64))
    });
    session.define_builtin("sum", |args| {
        let items = numeric_elements("sum", args)?;
        if items.iter().all(is_integral) {
            items
                .iter()
                .try_fold(0i64, |acc, item| acc.checked_add(as_integer(item)))
                .map(Value::Integer)
                .ok_or_else(|| String::from("integer overflow in sum()"))
        } else {
            Ok(Value::Double(items.iter().filter_map(Value::as_f64).sum()))
        }
    });
    session.define_builtin("mean", |args| {
        let items = numeric_elements("mean", args)?;
        let total: f64 = items.iter().filter_map(Value::as_f64).sum();
        Ok(Value::Double(total / items.len() as f64))
    });
    session.define_builtin("min", |args| extreme("min", args, Ordering::Less));
    session.define_builtin("max", |args| extreme("max", args, Ordering::Greater));
    session.define_builtin("round", |args| {
        let x = args.arg(0, "x").ok_or("round() needs an argument")?;
        let digits = match args.arg(1, "digits") {
            Some(digits) => digits.as_f64().ok_or("digits must be numeric")?,
            None => 0.0,
        };
        let scale = 10f64.powf(digits);
        map_elements(x, |item| match item {
            Value::Integer(_) | Value::Logical(_) => Ok(Value::Integer(as_integer(item))),
            Value::Double(n) => Ok(Value::Double((n * scale).round() / scale)),
            other => Err(format!("non-numeric argument to round(): {}", other.kind())),
        })
    });

    session.define_builtin("paste", |args| {
        let sep = match args.named("sep") {
            Some(sep) => sep.to_string(),
            None => String::from(" "),
        };
        paste(args, &sep)
    });
    session.define_builtin("paste0", |args| paste(args, ""));
    session.define_builtin("toupper", |args| map_strings("toupper", args, |s| s.to_uppercase()));
    session.define_builtin("tolower", |args| map_strings("tolower", args, |s| s.to_lowercase()));
    session.define_builtin("nchar", |args| {
        map_elements(unary("nchar", args)?, |item| Ok(Value::Integer(item.to_string().chars().count() as i64)))
    });
    session.define_builtin("format", |args| Ok(Value::Str(unary("format", args)?.to_string())));

    session.define_builtin("as.character", |args| {
        map_elements(unary("as.character", args)?, |item| Ok(Value::Str(item.to_string())))
    });
    session.define_builtin("as.numeric", |args| {
        map_elements(unary("as.numeric", args)?, |item| match item {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| format!("cannot convert \"{}\" to a number", s)),
            other => other
                .as_f64()
                .map(Value::Double)
                .ok_or_else(|| format!("cannot convert a {} to a number", other.kind())),
        })
    });
    session.define_builtin("as.integer", |args| {
        map_elements(unary("as.integer", args)?, |item| match item {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("cannot convert \"{}\" to an integer", s))
                .and_then(truncate),
            Value::Integer(_) | Value::Logical(_) => Ok(Value::Integer(as_integer(item))),
            other => other
                .as_f64()
                .ok_or_else(|| format!("cannot convert a {} to an integer", other.kind()))
                .and_then(truncate),
        })
    });
    session.define_builtin("as.Date", |args| {
        map_elements(unary("as.Date", args)?, |item| match item {
            Value::Date(date) => Ok(Value::Date(*date)),
            Value::Str(s) => Date::parse(s)
                .map(Value::Date)
                .ok_or_else(|| format!("\"{}\" is not a YYYY-MM-DD date", s)),
            other => Err(format!("cannot convert a {} to a Date", other.kind())),
        })
    });

    session.define_builtin("is.null", |args| Ok(Value::Logical(matches!(unary("is.null", args)?, Value::Null))));
    session.define_builtin("identity", |args| Ok(unary("identity", args)?.clone()));
    session.define_builtin("seq_len", |args| {
        let n = unary("seq_len", args)?.as_f64().ok_or("seq_len() needs a number")?;
        if n < 0.0 || n as usize > MAX_SEQUENCE {
            return Err(format!("invalid length {} for seq_len()", n));
        }
        Value::combine((1..=n as i64).map(Value::Integer).collect())
    });
    session.define_builtin("head", |args| {
        let x = args.arg(0, "x").ok_or("head() needs an argument")?;
        let n = match args.arg(1, "n") {
            Some(n) => n.as_f64().ok_or("n must be numeric")?.max(0.0) as usize,
            None => 6,
        };
        match x {
            Value::List(items) => Ok(Value::List(items.iter().take(n).cloned().collect())),
            other => {
                let items = other.elements().ok_or_else(|| format!("head() cannot take a {}", other.kind()))?;
                Value::combine(items.into_iter().take(n).collect())
            }
        }
    });

    session.define_builtin("stop", |args| {
        let message: Vec<String> = args.values().map(|value| value.to_string()).collect();
        Err(message.concat())
    });
    session.define_builtin("stopifnot", |args| {
        for (i, value) in args.values().enumerate() {
            let holds = value
                .elements()
                .map(|items| items.iter().all(|item| item.as_bool() == Some(true)))
                .unwrap_or(false);
            if !holds {
                return Err(format!("condition {} is not all TRUE", i + 1));
            }
        }
        Ok(Value::Null)
    });
}

fn unary<'a>(name: &str, args: &'a CallArgs) -> Result<&'a Value, String> {
    match args.items.as_slice() {
        [(_, value)] => Ok(value),
        _ => Err(format!("{}() takes 1 argument but {} were given", name, args.len())),
    }
}

fn binary<'a>(op: &str, args: &'a CallArgs) -> Result<(&'a Value, &'a Value), String> {
    match args.items.as_slice() {
        [(_, a), (_, b)] => Ok((a, b)),
        _ => Err(format!("operator '{}' takes 2 operands but {} were given", op, args.len())),
    }
}

// Apply `op` pairwise, recycling the shorter operand
fn elementwise(a: &Value, b: &Value, op: impl Fn(&Value, &Value) -> Result<Value, String>) -> Result<Value, String> {
    let left = a.elements().ok_or_else(|| format!("non-atomic operand: {}", a.kind()))?;
    let right = b.elements().ok_or_else(|| format!("non-atomic operand: {}", b.kind()))?;
    if left.is_empty() || right.is_empty() {
        return Ok(Value::Null);
    }

    let len = left.len().max(right.len());
    if len % left.len() != 0 || len % right.len() != 0 {
        return Err(String::from("longer object length is not a multiple of shorter object length"));
    }

    let items = (0..len)
        .map(|i| op(&left[i % left.len()], &right[i % right.len()]))
        .collect::<Result<Vec<_>, _>>()?;
    Value::combine(items)
}

fn map_elements(x: &Value, op: impl Fn(&Value) -> Result<Value, String>) -> Result<Value, String> {
    let items = x.elements().ok_or_else(|| format!("non-atomic argument: {}", x.kind()))?;
    Value::combine(items.iter().map(op).collect::<Result<Vec<_>, _>>()?)
}

fn is_integral(value: &Value) -> bool {
    matches!(value, Value::Integer(_) | Value::Logical(_))
}

// Only meaningful for integral values, see `is_integral`
fn as_integer(value: &Value) -> i64 {
    match value {
        Value::Integer(n) => *n,
        Value::Logical(b) => *b as i64,
        _ => 0,
    }
}

// `as.integer` on a double. `i64::MAX as f64` rounds up to 2^63, so that bound is exclusive.
fn truncate(n: f64) -> Result<Value, String> {
    let n = n.trunc();
    if n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Ok(Value::Integer(n as i64))
    } else {
        Err(format!("{} is out of the integer range", format_double(n)))
    }
}

fn arithmetic(op: &'static str, args: &CallArgs) -> Result<Value, String> {
    if op == "-" {
        if let [(_, x)] = args.items.as_slice() {
            return map_elements(x, |item| match item {
                Value::Integer(_) | Value::Logical(_) => as_integer(item)
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| String::from("integer overflow")),
                Value::Double(n) => Ok(Value::Double(-n)),
                other => Err(format!("invalid argument to unary operator: {}", other.kind())),
            });
        }
    }

    let (a, b) = binary(op, args)?;
    elementwise(a, b, |x, y| {
        if is_integral(x) && is_integral(y) {
            let (m, n) = (as_integer(x), as_integer(y));
            let exact = match op {
                "+" => Some(m.checked_add(n)),
                "-" => Some(m.checked_sub(n)),
                "*" => Some(m.checked_mul(n)),
                _ => None,
            };
            if let Some(result) = exact {
                return result.map(Value::Integer).ok_or_else(|| String::from("integer overflow"));
            }
        }

        let m = x.as_f64().ok_or_else(|| format!("non-numeric argument to '{}': {}", op, x.kind()))?;
        let n = y.as_f64().ok_or_else(|| format!("non-numeric argument to '{}': {}", op, y.kind()))?;
        Ok(Value::Double(match op {
            "+" => m + n,
            "-" => m - n,
            "*" => m * n,
            "/" => m / n,
            _ => m.powf(n),
        }))
    })
}

fn compare(op: &str, x: &Value, y: &Value) -> Result<Value, String> {
    let ordering = match (x, y) {
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => Some(x.to_string().cmp(&y.to_string())),
        _ => {
            let a = x.as_f64().ok_or_else(|| format!("cannot compare a {}", x.kind()))?;
            let b = y.as_f64().ok_or_else(|| format!("cannot compare a {}", y.kind()))?;
            a.partial_cmp(&b)
        }
    };

    let result = match (op, ordering) {
        ("!=", None) => true,
        (_, None) => false,
        ("==", Some(ord)) => ord == Ordering::Equal,
        ("!=", Some(ord)) => ord != Ordering::Equal,
        ("<", Some(ord)) => ord == Ordering::Less,
        (">", Some(ord)) => ord == Ordering::Greater,
        ("<=", Some(ord)) => ord != Ordering::Greater,
        (_, Some(ord)) => ord != Ordering::Less,
    };

    Ok(Value::Logical(result))
}

fn logical(op: &str, args: &CallArgs, combine: impl Fn(bool, bool) -> bool) -> Result<Value, String> {
    let (a, b) = binary(op, args)?;
    elementwise(a, b, |x, y| match (x.as_bool(), y.as_bool()) {
        (Some(p), Some(q)) => Ok(Value::Logical(combine(p, q))),
        _ => Err(format!("operations are possible only for logical or numeric types, not '{}'", op)),
    })
}

fn sequence(args: &CallArgs) -> Result<Value, String> {
    let (a, b) = binary(":", args)?;
    let from = a.as_f64().ok_or("':' needs numeric bounds")?;
    let to = b.as_f64().ok_or("':' needs numeric bounds")?;
    if !from.is_finite() || !to.is_finite() || (to - from).abs() as usize > MAX_SEQUENCE {
        return Err(format!("invalid sequence {}:{}", from, to));
    }

    let step = if to >= from { 1.0 } else { -1.0 };
    let count = ((to - from) * step).floor() as usize + 1;
    let items = (0..count).map(|i| from + step * i as f64);

    if from.fract() == 0.0 {
        Value::combine(items.map(|n| Value::Integer(n as i64)).collect())
    } else {
        Value::combine(items.map(Value::Double).collect())
    }
}

fn numeric_elements(name: &str, args: &CallArgs) -> Result<Vec<Value>, String> {
    let mut items = Vec::new();
    for value in args.values() {
        for item in value.elements().ok_or_else(|| format!("{}() cannot use a {}", name, value.kind()))? {
            if item.as_f64().is_none() {
                return Err(format!("invalid 'type' ({}) of argument to {}()", item.kind(), name));
            }
            items.push(item);
        }
    }
    Ok(items)
}

fn extreme(name: &str, args: &CallArgs, wanted: Ordering) -> Result<Value, String> {
    let items = numeric_elements(name, args)?;
    let mut best: Option<&Value> = None;
    for item in &items {
        best = match best {
            Some(current) if item.as_f64().partial_cmp(&current.as_f64()) != Some(wanted) => Some(current),
            _ => Some(item),
        };
    }

    match best {
        Some(best) if items.iter().all(is_integral) => Ok(Value::Integer(as_integer(best))),
        Some(best) => Ok(Value::Double(best.as_f64().unwrap_or(f64::NAN))),
        None => Err(format!("no non-missing arguments to {}()", name)),
    }
}

// Vectorized over the unnamed arguments, recycling shorter ones. A `collapse`
// argument joins the results into one string.
fn paste(args: &CallArgs, sep: &str) -> Result<Value, String> {
    let mut columns = Vec::new();
    for value in args.positional() {
        let items = value.elements().ok_or_else(|| format!("cannot paste a {}", value.kind()))?;
        if !items.is_empty() {
            columns.push(items);
        }
    }

    let len = columns.iter().map(Vec::len).max().unwrap_or(0);
    let pasted: Vec<String> = (0..len)
        .map(|i| {
            columns
                .iter()
                .map(|column| column[i % column.len()].to_string())
                .collect::<Vec<_>>()
                .join(sep)
        })
        .collect();

    match args.named("collapse") {
        Some(collapse) => Ok(Value::Str(pasted.join(&collapse.to_string()))),
        None => Value::combine(pasted.into_iter().map(Value::Str).collect()),
    }
}

fn map_strings(name: &str, args: &CallArgs, op: impl Fn(&str) -> String) -> Result<Value, String> {
    map_elements(unary(name, args)?, |item| match item {
        Value::Str(s) => Ok(Value::Str(op(s))),
        other => Err(format!("{}() needs character input, got {}", name, other.kind())),
    })
}
