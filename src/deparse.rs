use std::fmt::{self, Display};

use crate::{
    ast::{Arg, Block, Expr, Lit},
    expand::is_identifier,
    parser::{infix_precedence, prefix_precedence, Precedence},
    value::format_double,
};

const INDENT: &str = "  ";

// Turns trees back into script text that parses to the same tree.
pub struct Deparser {
    out: String,
    indent: usize,
}

impl Deparser {
    pub fn new() -> Deparser {
        Deparser { out: String::new(), indent: 0 }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    // Write comment lines, each followed by a newline at the current indentation
    pub fn comments(&mut self, comments: &[String]) {
        for comment in comments {
            for line in comment.lines() {
                if line.is_empty() {
                    self.out.push('#');
                } else {
                    self.out.push_str("# ");
                    self.out.push_str(line);
                }
                self.newline();
            }
        }
    }

    pub fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(literal) => self.literal(literal),
            Expr::Sym(name) => self.name(name),
            Expr::Call { fun, args } => self.call(fun, args),
            Expr::Block(block) => self.block(block),
            Expr::Unquote(inner) => {
                self.out.push_str("..(");
                self.expr(inner);
                self.out.push(')');
            }
        }
    }

    fn literal(&mut self, literal: &Lit) {
        match literal {
            Lit::Null => self.out.push_str("NULL"),
            Lit::Bool(true) => self.out.push_str("TRUE"),
            Lit::Bool(false) => self.out.push_str("FALSE"),
            Lit::Int(n) => self.out.push_str(&format!("{}L", n)),
            Lit::Double(n) => self.out.push_str(&format_double(*n)),
            Lit::Str(s) => self.out.push_str(&quote_string(s)),
        }
    }

    fn block(&mut self, block: &Block) {
        if block.stmts.is_empty() && block.trailing.is_empty() {
            self.out.push_str("{}");
            return;
        }

        self.out.push('{');
        self.indent += 1;
        for stmt in &block.stmts {
            self.newline();
            self.comments(&stmt.comments);
            self.expr(&stmt.expr);
        }
        if !block.trailing.is_empty() {
            self.newline();
            self.comments(&block.trailing);
            // Drop the indentation written after the last comment line
            let trimmed = self.out.trim_end_matches(INDENT).len();
            self.out.truncate(trimmed);
            self.out.pop();
        }
        self.indent -= 1;
        self.newline();
        self.out.push('}');
    }

    // Operators and other non-identifiers are backticked
    fn name(&mut self, name: &str) {
        if is_identifier(name) {
            self.out.push_str(name);
        } else {
            self.out.push('`');
            self.out.push_str(name);
            self.out.push('`');
        }
    }

    fn call(&mut self, fun: &str, args: &[Arg]) {
        let positional = args.iter().all(|arg| arg.name.is_none());

        match (fun, args) {
            ("$", [object, field]) if positional => {
                if let Expr::Sym(name) = &field.value {
                    self.operand(&object.value, operand_precedence(&object.value).is_some());
                    self.out.push('$');
                    self.out.push_str(name);
                    return;
                }
            }
            ("if", [cond, texpr, rest @ ..]) if positional && rest.len() <= 1 => {
                self.out.push_str("if (");
                self.expr(&cond.value);
                self.out.push_str(") ");
                self.expr(&texpr.value);
                if let Some(fexpr) = rest.first() {
                    self.out.push_str(" else ");
                    self.expr(&fexpr.value);
                }
                return;
            }
            (_, [operand]) if positional => {
                if let Some(Precedence::Prefix(r_bp)) = prefix_precedence(fun) {
                    self.out.push_str(fun);
                    let parens = match operand_precedence(&operand.value) {
                        Some(Precedence::Infix(l_bp, _)) => l_bp < r_bp,
                        Some(Precedence::Prefix(0)) => true,
                        _ => false,
                    };
                    self.operand(&operand.value, parens);
                    return;
                }
            }
            (_, [lhs, rhs]) if positional => {
                if let Some(Precedence::Infix(l_bp, r_bp)) = infix_precedence(fun) {
                    let left_parens = match operand_precedence(&lhs.value) {
                        Some(Precedence::Infix(_, child_r)) | Some(Precedence::Prefix(child_r)) => child_r <= l_bp,
                        None => false,
                    };
                    let right_parens = match operand_precedence(&rhs.value) {
                        Some(Precedence::Infix(child_l, _)) => child_l < r_bp,
                        Some(Precedence::Prefix(child_r)) => child_r < r_bp,
                        None => false,
                    };

                    self.operand(&lhs.value, left_parens);
                    if fun == "^" || fun == ":" {
                        self.out.push_str(fun);
                    } else {
                        self.out.push(' ');
                        self.out.push_str(fun);
                        self.out.push(' ');
                    }
                    self.operand(&rhs.value, right_parens);
                    return;
                }
            }
            _ => (),
        }

        self.name(fun);

        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            if let Some(name) = &arg.name {
                self.name(name);
                self.out.push_str(" = ");
            }
            self.expr(&arg.value);
        }
        self.out.push(')');
    }

    fn operand(&mut self, expr: &Expr, parens: bool) {
        if parens {
            self.out.push('(');
            self.expr(expr);
            self.out.push(')');
        } else {
            self.expr(expr);
        }
    }
}

impl Default for Deparser {
    fn default() -> Deparser {
        Deparser::new()
    }
}

// How tightly an expression holds together when it appears as an operand. `if`
// reports the loosest prefix power so it is always parenthesized there.
fn operand_precedence(expr: &Expr) -> Option<Precedence> {
    match expr {
        Expr::Lit(Lit::Int(n)) if *n < 0 => prefix_precedence("-"),
        Expr::Lit(Lit::Double(n)) if n.is_sign_negative() && !n.is_nan() => prefix_precedence("-"),
        Expr::Call { fun, .. } if fun == "if" => Some(Precedence::Prefix(0)),
        Expr::Call { fun, args } if args.iter().all(|arg| arg.name.is_none()) => match args.len() {
            1 => prefix_precedence(fun),
            2 => infix_precedence(fun),
            _ => None,
        },
        _ => None,
    }
}

pub fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for ch in s.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

pub fn deparse(expr: &Expr) -> String {
    let mut deparser = Deparser::new();
    deparser.expr(expr);
    deparser.finish()
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", deparse(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{comment::annotate, parser::{parse_block, parse_expr}};

    fn round_trip(source: &str) -> String {
        let expr = parse_expr(source).unwrap();
        let text = deparse(&expr);
        assert_eq!(parse_expr(&text).unwrap(), expr, "deparsed as {}", text);
        text
    }

    #[test]
    fn operators_keep_needed_parentheses() {
        assert_eq!(round_trip("(a + b) * c"), "(a + b) * c");
        assert_eq!(round_trip("a - (b - c)"), "a - (b - c)");
        assert_eq!(round_trip("a - b - c"), "a - b - c");
        assert_eq!(round_trip("(a ^ b) ^ c"), "(a^b)^c");
        assert_eq!(round_trip("a ^ b ^ c"), "a^b^c");
        assert_eq!(round_trip("(-a) ^ 2"), "(-a)^2");
        assert_eq!(round_trip("-a ^ 2"), "-a^2");
        assert_eq!(round_trip("1:n"), "1:n");
    }

    #[test]
    fn calls_and_access() {
        assert_eq!(round_trip("paste0('x', sep = \"\")"), "paste0(\"x\", sep = \"\")");
        assert_eq!(round_trip("input$year > 2000"), "input$year > 2000");
        assert_eq!(round_trip("if (a) 1 else 2"), "if (a) 1 else 2");
        assert_eq!(round_trip("(if (a) 1 else 2) + 1"), "(if (a) 1 else 2) + 1");
        assert_eq!(round_trip("..(n) * 2"), "..(n) * 2");
    }

    #[test]
    fn operators_outside_their_usual_shape_are_backticked() {
        let three = Expr::call("-", vec![Expr::Sym(String::from("a")), Expr::Sym(String::from("b")), Expr::Sym(String::from("c"))]);
        let text = deparse(&three);
        assert_eq!(text, "`-`(a, b, c)");
        assert_eq!(parse_expr(&text).unwrap(), three);

        assert_eq!(round_trip("`if`(a)"), "`if`(a)");
        assert_eq!(round_trip("`+`(x = 1, 2)"), "`+`(x = 1, 2)");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(round_trip(r#""say \"hi\"\n""#), r#""say \"hi\"\n""#);
    }

    #[test]
    fn blocks_print_comments_and_indent() {
        let block = annotate(parse_block("{\n\"first\"\nx <- 1\nf(x)\n\"last\"\n}").unwrap());
        assert_eq!(deparse(&block), "{\n  # first\n  x <- 1\n  f(x)\n  # last\n}");
    }

    #[test]
    fn nested_blocks_indent_further() {
        let block = parse_block("{ local({ y }) }").unwrap();
        assert_eq!(deparse(&block), "{\n  local({\n    y\n  })\n}");
    }

    #[test]
    fn negative_literals_are_operands() {
        let expr = Expr::call("^", vec![Expr::Lit(Lit::Double(-2.0)), Expr::Lit(Lit::Double(2.0))]);
        assert_eq!(deparse(&expr), "(-2)^2");
    }
}
