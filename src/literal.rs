//! Canonical code forms for runtime values.
//!
//! Every value kind that can be unquoted has exactly one literal form here, and
//! evaluating that form in a fresh session gives back an equal value:
//!
//! | value                  | code                                   |
//! |------------------------|----------------------------------------|
//! | NULL                   | `NULL`                                 |
//! | logical                | `TRUE`, `FALSE`                        |
//! | integer                | `5L`, `-5L`, and `-9223372036854775807L - 1L` for the minimum |
//! | double                 | `365`, `0.5`, `-2.5`, `Inf`, `-Inf`, `NaN` |
//! | character              | `"text"` with `\\`, `\"`, `\n`, `\t`, `\r` escaped |
//! | Date                   | `as.Date("2024-01-31")`                |
//! | vector                 | `c(1, 2, 3)`                           |
//! | list                   | `list(a = 1, "b")`                     |
//!
//! Quoted expressions and capture handles are spliced by the resolver and never
//! reach this module as literals. Host objects have no form.

use crate::{
    ast::{Arg, Expr, Lit},
    error::Error,
    value::Value,
};

pub fn to_expr(value: &Value) -> Result<Expr, Error> {
    match value {
        Value::Null => Ok(Expr::Lit(Lit::Null)),
        Value::Logical(b) => Ok(Expr::Lit(Lit::Bool(*b))),
        // The magnitude of the minimum does not fit a literal
        Value::Integer(i64::MIN) => Ok(Expr::call(
            "-",
            vec![negate(Expr::Lit(Lit::Int(i64::MAX))), Expr::Lit(Lit::Int(1))],
        )),
        Value::Integer(n) if *n < 0 => Ok(negate(Expr::Lit(Lit::Int(-n)))),
        Value::Integer(n) => Ok(Expr::Lit(Lit::Int(*n))),
        Value::Double(n) if *n < 0.0 => Ok(negate(Expr::Lit(Lit::Double(-n)))),
        Value::Double(n) => Ok(Expr::Lit(Lit::Double(*n))),
        Value::Str(s) => Ok(Expr::str(s.clone())),
        Value::Date(date) => Ok(Expr::call("as.Date", vec![Expr::str(date.to_string())])),
        Value::Vector(items) => Ok(Expr::call(
            "c",
            items.iter().map(to_expr).collect::<Result<Vec<_>, _>>()?,
        )),
        Value::List(items) => Ok(Expr::Call {
            fun: String::from("list"),
            args: items
                .iter()
                .map(|(name, item)| {
                    Ok(Arg {
                        name: name.clone(),
                        value: to_expr(item)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?,
        }),
        Value::Quoted(_) | Value::Handle(_) | Value::Opaque(_) => Err(Error::Unquote { kind: value.kind() }),
    }
}

fn negate(expr: Expr) -> Expr {
    Expr::call("-", vec![expr])
}
