use std::{any::Any, fmt::{self, Debug, Display}, rc::Rc};

use crate::{ast::Expr, capture::Capture};

// Bindings visible to an evaluation. Persistent, so every capture invocation can
// start from a cheap copy of the globals.
pub type Env = im::HashMap<String, Value>;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Logical(bool),
    Integer(i64),
    Double(f64),
    Str(String),
    Date(Date),
    // Atomic vector of two or more scalars of one kind, see `combine`
    Vector(Vec<Value>),
    List(Vec<(Option<String>, Value)>),
    Quoted(Quoted),
    Handle(CaptureHandle),
    Opaque(Opaque),
}

// A quoted tree together with the bindings its unquote markers are evaluated in.
#[derive(Clone)]
pub struct Quoted {
    pub expr: Rc<Expr>,
    pub env: Env,
    // Set by `meta()` and by captures: the tree is the expression to capture
    pub meta: bool,
}

// What invoking a capture yields in meta mode.
#[derive(Clone)]
pub struct CaptureHandle {
    pub capture: Rc<Capture>,
    pub args: Vec<Value>,
}

// Host object without a literal form, plots and connections for example.
#[derive(Clone)]
pub struct Opaque {
    pub type_name: String,
    pub data: Rc<dyn Any>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Value {
    pub fn str(value: impl Into<String>) -> Value {
        Value::Str(value.into())
    }

    pub fn opaque<T: Any>(type_name: impl Into<String>, data: T) -> Value {
        Value::Opaque(Opaque {
            type_name: type_name.into(),
            data: Rc::new(data),
        })
    }

    pub fn kind(&self) -> String {
        match self {
            Value::Null => String::from("NULL"),
            Value::Logical(_) => String::from("logical"),
            Value::Integer(_) => String::from("integer"),
            Value::Double(_) => String::from("double"),
            Value::Str(_) => String::from("character"),
            Value::Date(_) => String::from("Date"),
            Value::Vector(items) => match items.first() {
                Some(item) => format!("{} vector", item.kind()),
                None => String::from("vector"),
            },
            Value::List(_) => String::from("list"),
            Value::Quoted(_) => String::from("quoted expression"),
            Value::Handle(_) => String::from("capture handle"),
            Value::Opaque(opaque) => opaque.type_name.clone(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Logical(_) | Value::Integer(_) | Value::Double(_) | Value::Str(_) | Value::Date(_)
        )
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Logical(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Integer(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            Value::Integer(n) => Some(*n != 0),
            Value::Double(n) if !n.is_nan() => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    // Elements of an atomic value: nothing for NULL, one for a scalar
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Null => Some(Vec::new()),
            Value::Vector(items) => Some(items.clone()),
            scalar if scalar.is_scalar() => Some(vec![scalar.clone()]),
            _ => None,
        }
    }

    // Build an atomic value from scalars: NULL when empty, the scalar itself for one
    // element, otherwise a vector coerced to the widest kind present.
    pub fn combine(items: Vec<Value>) -> Result<Value, String> {
        let rank = |value: &Value| match value {
            Value::Logical(_) => Ok(0),
            Value::Integer(_) => Ok(1),
            Value::Double(_) => Ok(2),
            Value::Str(_) => Ok(3),
            Value::Date(_) => Ok(4),
            other => Err(format!("cannot combine a value of kind '{}'", other.kind())),
        };

        let widest = items.iter().map(rank).try_fold(0, |acc, rank| rank.map(|r| acc.max(r)))?;
        let has_date = items.iter().any(|item| matches!(item, Value::Date(_)));
        if has_date && items.iter().any(|item| !matches!(item, Value::Date(_))) {
            return Err(String::from("cannot combine dates with other kinds"));
        }

        let mut coerced: Vec<Value> = items.into_iter().map(|item| item.coerce(widest)).collect();
        match coerced.len() {
            0 => Ok(Value::Null),
            1 => Ok(coerced.remove(0)),
            _ => Ok(Value::Vector(coerced)),
        }
    }

    fn coerce(self, rank: u8) -> Value {
        match (rank, self) {
            (1, Value::Logical(b)) => Value::Integer(b as i64),
            (2, Value::Logical(b)) => Value::Double(if b { 1.0 } else { 0.0 }),
            (2, Value::Integer(n)) => Value::Double(n as f64),
            (3, value @ (Value::Logical(_) | Value::Integer(_) | Value::Double(_))) => Value::Str(value.to_string()),
            (_, value) => value,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Logical(a), Value::Logical(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Quoted(a), Value::Quoted(b)) => a.expr == b.expr,
            (Value::Handle(a), Value::Handle(b)) => a.capture.id() == b.capture.id() && a.args == b.args,
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(&a.data, &b.data),
            _ => false,
        }
    }
}

impl Value {
    // Equality for identity keys such as capture arguments and memoized input
    // reads. Unlike `==`, every NaN matches every other NaN, and `0` and `-0`
    // stay apart because their literal forms differ.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
            (Value::Vector(a), Value::Vector(b)) => identical(a, b),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|((m, x), (n, y))| m == n && x.identical(y))
            }
            (Value::Handle(a), Value::Handle(b)) => a.capture.id() == b.capture.id() && identical(&a.args, &b.args),
            _ => self == other,
        }
    }
}

pub fn identical(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
}

// Plain rendering used by `paste` and the command line. Code literals come from
// `literal::to_expr` instead.
impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Logical(true) => write!(f, "TRUE"),
            Value::Logical(false) => write!(f, "FALSE"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", format_double(*n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(date) => write!(f, "{}", date),
            Value::Vector(items) => {
                let items: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "{}", items.join(" "))
            }
            Value::List(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|(name, item)| match name {
                        Some(name) => format!("{} = {}", name, item),
                        None => item.to_string(),
                    })
                    .collect();
                write!(f, "list({})", items.join(", "))
            }
            Value::Quoted(quoted) => write!(f, "{}", quoted.expr),
            Value::Handle(handle) => write!(f, "<capture {}>", handle.capture.label()),
            Value::Opaque(opaque) => write!(f, "<{}>", opaque.type_name),
        }
    }
}

pub fn format_double(n: f64) -> String {
    if n.is_nan() {
        String::from("NaN")
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "Inf" } else { "-Inf" })
    } else {
        format!("{}", n)
    }
}

impl Debug for Quoted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Quoted").field(&self.expr).finish()
    }
}

impl Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("capture", &self.capture.label())
            .field("args", &self.args)
            .finish()
    }
}

impl Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({})", self.type_name)
    }
}

impl Date {
    // Parse an ISO `YYYY-MM-DD` date
    pub fn parse(text: &str) -> Option<Date> {
        let mut parts = text.trim().splitn(3, '-');
        let year = parts.next()?.parse::<i32>().ok()?;
        let month_part = parts.next()?;
        let day_part = parts.next()?;
        if month_part.len() != 2 || day_part.len() != 2 {
            return None;
        }

        let month = month_part.parse::<u32>().ok()?;
        let day = day_part.parse::<u32>().ok()?;
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return None;
        }

        Some(Date { year, month, day })
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 31,
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}
