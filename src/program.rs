use std::fmt::{self, Display};

use crate::{ast::Expr, deparse::Deparser};

#[derive(Clone, Debug, PartialEq)]
pub enum StatementKind {
    Assign { name: String, expr: Expr },
    Expr(Expr),
    // Bare use of a name assigned earlier, emitted when a root was already expanded
    Reference(String),
}

// One top-level statement of a generated script
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub comments: Vec<String>,
    pub kind: StatementKind,
    // Comment lines printed after the statement
    pub trailing: Vec<String>,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Statement {
        Statement {
            comments: Vec::new(),
            kind,
            trailing: Vec::new(),
        }
    }

    pub fn assign(name: impl Into<String>, expr: Expr) -> Statement {
        Statement::new(StatementKind::Assign { name: name.into(), expr })
    }

    pub fn expr(expr: Expr) -> Statement {
        Statement::new(StatementKind::Expr(expr))
    }

    pub fn reference(name: impl Into<String>) -> Statement {
        Statement::new(StatementKind::Reference(name.into()))
    }

    pub fn with_comments(mut self, comments: Vec<String>) -> Statement {
        self.comments = comments;
        self
    }

    pub fn assigned_name(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Assign { name, .. } => Some(name),
            StatementKind::Expr(expr) => expr.assigned_name(),
            StatementKind::Reference(_) => None,
        }
    }

    pub fn to_expr(&self) -> Expr {
        match &self.kind {
            StatementKind::Assign { name, expr } => Expr::assign(name.clone(), expr.clone()),
            StatementKind::Expr(expr) => expr.clone(),
            StatementKind::Reference(name) => Expr::Sym(name.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Program {
        Program { statements }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    // (comment, statement) pairs for a renderer, comment lines joined by newlines
    pub fn pairs(&self) -> Vec<(Option<String>, Expr)> {
        self.statements
            .iter()
            .map(|statement| {
                let comment = if statement.comments.is_empty() {
                    None
                } else {
                    Some(statement.comments.join("\n"))
                };
                (comment, statement.to_expr())
            })
            .collect()
    }

    pub fn assigned_names(&self) -> Vec<&str> {
        self.statements.iter().filter_map(Statement::assigned_name).collect()
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            let mut deparser = Deparser::new();
            deparser.comments(&statement.comments);
            deparser.expr(&statement.to_expr());
            writeln!(f, "{}", deparser.finish())?;

            let mut deparser = Deparser::new();
            deparser.comments(&statement.trailing);
            write!(f, "{}", deparser.finish())?;
        }
        Ok(())
    }
}
