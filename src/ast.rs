// Expression trees for the script language. Trees are immutable once a capture
// has been declared, captures hold them behind an Rc and share subtrees freely.

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit(Lit),
    Sym(String),
    // Operators are calls too, `a + b` is `+`(a, b) and `if` is `if`(cond, then, else)
    Call {
        fun: String,
        args: Vec<Arg>,
    },
    Block(Block),
    // `..(inner)`, evaluated and spliced in when the surrounding tree is resolved
    Unquote(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

// A statement inside a block with the comments the comment carrier attached to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub comments: Vec<String>,
    pub expr: Expr,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    // Comments that were not followed by any statement
    pub trailing: Vec<String>,
}

impl Expr {
    pub fn sym(name: impl Into<String>) -> Expr {
        Expr::Sym(name.into())
    }

    pub fn str(value: impl Into<String>) -> Expr {
        Expr::Lit(Lit::Str(value.into()))
    }

    pub fn call(fun: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            fun: fun.into(),
            args: args.into_iter().map(Arg::positional).collect(),
        }
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Expr {
        Expr::call("<-", vec![Expr::Sym(name.into()), value])
    }

    pub fn block(exprs: Vec<Expr>) -> Expr {
        Expr::Block(Block::from_exprs(exprs))
    }

    // Name bound by a top-level `name <- value` expression
    pub fn assigned_name(&self) -> Option<&str> {
        match self {
            Expr::Call { fun, args } if fun == "<-" && args.len() == 2 => match &args[0].value {
                Expr::Sym(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn contains_unquote(&self) -> bool {
        match self {
            Expr::Lit(_) | Expr::Sym(_) => false,
            Expr::Unquote(_) => true,
            Expr::Call { args, .. } => args.iter().any(|arg| arg.value.contains_unquote()),
            Expr::Block(block) => block.stmts.iter().any(|stmt| stmt.expr.contains_unquote()),
        }
    }

    // Collect every symbol read by this tree, in order of first appearance. The
    // callee of a call and the field name on the right of `$` are not reads.
    pub fn free_symbols(&self) -> Vec<String> {
        let mut symbols = Vec::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, symbols: &mut Vec<String>) {
        match self {
            Expr::Lit(_) => (),
            Expr::Sym(name) => {
                if !symbols.contains(name) {
                    symbols.push(name.clone());
                }
            }
            Expr::Call { fun, args } if fun == "$" => {
                if let Some(object) = args.first() {
                    object.value.collect_symbols(symbols);
                }
            }
            Expr::Call { fun, args } if fun == "<-" => {
                if let Some(value) = args.get(1) {
                    value.value.collect_symbols(symbols);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.value.collect_symbols(symbols);
                }
            }
            Expr::Block(block) => {
                for stmt in &block.stmts {
                    stmt.expr.collect_symbols(symbols);
                }
            }
            Expr::Unquote(inner) => inner.collect_symbols(symbols),
        }
    }
}

impl Arg {
    pub fn positional(value: Expr) -> Arg {
        Arg { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Expr) -> Arg {
        Arg { name: Some(name.into()), value }
    }
}

impl Stmt {
    pub fn new(expr: Expr) -> Stmt {
        Stmt { comments: Vec::new(), expr }
    }
}

impl Block {
    pub fn from_exprs(exprs: Vec<Expr>) -> Block {
        Block {
            stmts: exprs.into_iter().map(Stmt::new).collect(),
            trailing: Vec::new(),
        }
    }
}
