//! Comment carrier.
//!
//! A string literal standing alone as a block statement is documentation, not
//! code: it becomes a comment on the next real statement of the same block, or a
//! trailing note of the block when nothing follows it. String literals anywhere
//! else (call arguments, assigned values) are left alone.

use crate::ast::{Arg, Block, Expr, Lit, Stmt};

pub fn annotate(expr: Expr) -> Expr {
    match expr {
        Expr::Block(block) => Expr::Block(annotate_block(block)),
        Expr::Call { fun, args } => Expr::Call {
            fun,
            args: args
                .into_iter()
                .map(|arg| Arg { name: arg.name, value: annotate(arg.value) })
                .collect(),
        },
        Expr::Unquote(inner) => Expr::Unquote(Box::new(annotate(*inner))),
        other => other,
    }
}

fn annotate_block(block: Block) -> Block {
    let mut stmts = Vec::with_capacity(block.stmts.len());
    let mut pending: Vec<String> = Vec::new();

    for stmt in block.stmts {
        match annotate(stmt.expr) {
            Expr::Lit(Lit::Str(text)) => {
                pending.extend(stmt.comments);
                pending.push(text);
            }
            expr => {
                let mut comments = stmt.comments;
                comments.append(&mut pending);
                stmts.push(Stmt { comments, expr });
            }
        }
    }

    let mut trailing = pending;
    trailing.extend(block.trailing);

    Block { stmts, trailing }
}
