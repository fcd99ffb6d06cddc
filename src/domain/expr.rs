//! Expression AST.
//!
//! The arithmetic language custom fields and alert conditions are written in
//! once their variable references have been rewritten to bound symbols:
//! - `Number`: a literal (constants such as `PI` are folded at parse time)
//! - `Symbol`: a bound variable
//! - `Unary` / `Binary`: operators; comparisons and logic yield 1 or 0
//! - `Conditional`: `cond ? a : b`
//! - `Call`: a built-in function such as `max(a, b)`

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }
}

/// Collect every distinct symbol an expression reads.
pub fn extract_symbols(expr: &Expr) -> Vec<&str> {
    let mut symbols = Vec::new();
    collect_symbols(expr, &mut symbols);
    symbols
}

fn collect_symbols<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Symbol(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name.as_str());
            }
        }
        Expr::Unary { operand, .. } => collect_symbols(operand, out),
        Expr::Binary { left, right, .. } => {
            collect_symbols(left, out);
            collect_symbols(right, out);
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            collect_symbols(condition, out);
            collect_symbols(then, out);
            collect_symbols(otherwise, out);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_symbols(arg, out);
            }
        }
    }
}
