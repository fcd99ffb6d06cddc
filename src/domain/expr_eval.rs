//! Expression evaluation.
//!
//! # Evaluation Semantics
//!
//! - Symbols read the [`Bindings`] produced by the variable resolver
//! - Comparisons and logic yield `1.0` or `0.0`; a value is true when it is
//!   finite and non-zero
//! - `and` / `or` short-circuit, `?:` and `if()` only evaluate the taken branch
//! - Division or remainder by zero is a fault
//! - [`evaluate_finite`] rejects any non-finite final value

use crate::domain::entity::NameIndex;
use crate::domain::error::{EvalError, FormulaError, ParseError};
use crate::domain::expr::{BinaryOp, Expr, UnaryOp};
use crate::domain::expr_parser;
use crate::domain::formula::{placeholders, resolve, Bindings};
use crate::domain::value::{FieldMap, Snapshot};

const EPSILON: f64 = 1e-9;

/// Names accepted by [`Expr::Call`], for diagnostics.
pub const FUNCTIONS: &[&str] = &[
    "abs", "sqrt", "cbrt", "exp", "ln", "log", "log10", "log2", "floor", "ceil", "round", "trunc",
    "sign", "sin", "cos", "tan", "min", "max", "pow", "if",
];

pub fn truthy(value: f64) -> bool {
    value.is_finite() && value != 0.0
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(v) => Ok(*v),
        Expr::Symbol(name) => bindings
            .get(name)
            .ok_or_else(|| EvalError::UnknownSymbol(name.clone())),
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, bindings)?;
            Ok(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Plus => v,
                UnaryOp::Not => flag(!truthy(v)),
            })
        }
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, bindings),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if truthy(evaluate(condition, bindings)?) {
                evaluate(then, bindings)
            } else {
                evaluate(otherwise, bindings)
            }
        }
        Expr::Call { name, args } => evaluate_call(name, args, bindings),
    }
}

fn evaluate_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    bindings: &Bindings,
) -> Result<f64, EvalError> {
    match op {
        BinaryOp::And => {
            if !truthy(evaluate(left, bindings)?) {
                return Ok(0.0);
            }
            Ok(flag(truthy(evaluate(right, bindings)?)))
        }
        BinaryOp::Or => {
            if truthy(evaluate(left, bindings)?) {
                return Ok(1.0);
            }
            Ok(flag(truthy(evaluate(right, bindings)?)))
        }
        _ => {
            let l = evaluate(left, bindings)?;
            let r = evaluate(right, bindings)?;
            apply(op, l, r)
        }
    }
}

fn apply(op: BinaryOp, l: f64, r: f64) -> Result<f64, EvalError> {
    Ok(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            l / r
        }
        BinaryOp::Rem => {
            if r == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            l % r
        }
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Eq => flag((l - r).abs() < EPSILON),
        BinaryOp::Ne => flag((l - r).abs() >= EPSILON),
        BinaryOp::Lt => flag(l < r),
        BinaryOp::Le => flag(l <= r),
        BinaryOp::Gt => flag(l > r),
        BinaryOp::Ge => flag(l >= r),
        BinaryOp::And => flag(truthy(l) && truthy(r)),
        BinaryOp::Or => flag(truthy(l) || truthy(r)),
    })
}

fn arity(name: &str, expected: &str, found: usize) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected: expected.to_string(),
        found,
    }
}

fn evaluate_call(name: &str, args: &[Expr], bindings: &Bindings) -> Result<f64, EvalError> {
    match name {
        "if" => {
            let [condition, then, otherwise] = args else {
                return Err(arity(name, "3", args.len()));
            };
            if truthy(evaluate(condition, bindings)?) {
                evaluate(then, bindings)
            } else {
                evaluate(otherwise, bindings)
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(arity(name, "at least 1", 0));
            }
            let mut acc = evaluate(&args[0], bindings)?;
            for arg in &args[1..] {
                let v = evaluate(arg, bindings)?;
                acc = if name == "min" { acc.min(v) } else { acc.max(v) };
            }
            Ok(acc)
        }
        "pow" => {
            let [base, exponent] = args else {
                return Err(arity(name, "2", args.len()));
            };
            Ok(evaluate(base, bindings)?.powf(evaluate(exponent, bindings)?))
        }
        _ => {
            let unary: fn(f64) -> f64 = match name {
                "abs" => f64::abs,
                "sqrt" => f64::sqrt,
                "cbrt" => f64::cbrt,
                "exp" => f64::exp,
                "ln" | "log" => f64::ln,
                "log10" => f64::log10,
                "log2" => f64::log2,
                "floor" => f64::floor,
                "ceil" => f64::ceil,
                "round" => f64::round,
                "trunc" => f64::trunc,
                "sign" => sign,
                "sin" => f64::sin,
                "cos" => f64::cos,
                "tan" => f64::tan,
                _ => return Err(EvalError::UnknownFunction(name.to_string())),
            };
            let [arg] = args else {
                return Err(arity(name, "1", args.len()));
            };
            Ok(unary(evaluate(arg, bindings)?))
        }
    }
}

// f64::signum maps 0.0 to 1.0.
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Evaluate, treating a non-finite final value as a fault.
pub fn evaluate_finite(expr: &Expr, bindings: &Bindings) -> Result<f64, EvalError> {
    let value = evaluate(expr, bindings)?;
    if !value.is_finite() {
        return Err(EvalError::NonFinite);
    }
    Ok(value)
}

/// Syntax and name check of raw formula text, with every variable bound to 0.
pub fn validate_formula(formula: &str) -> Result<(), FormulaError> {
    let resolved = placeholders(formula);
    let expr = expr_parser::parse(&resolved.formula)?;
    check(&expr, &resolved.bindings)?;
    Ok(())
}

/// A formula parsed once and evaluated against many entities.
///
/// Rewriting is deterministic in the formula text, so every successful
/// resolution produces the same symbol names and the parsed tree can be reused.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    source: String,
    expr: Result<Expr, ParseError>,
}

impl CompiledFormula {
    pub fn compile(source: &str) -> Self {
        let expr = expr_parser::parse(&placeholders(source).formula);
        Self {
            source: source.to_string(),
            expr,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.expr.as_ref().err()
    }

    /// `None` when a variable is missing or not numeric; otherwise the
    /// evaluation outcome.
    pub fn evaluate(
        &self,
        current: &FieldMap,
        all: &Snapshot,
        index: &NameIndex,
    ) -> Option<Result<f64, FormulaError>> {
        let resolved = resolve(&self.source, current, all, index)?;
        Some(match &self.expr {
            Ok(expr) => evaluate_finite(expr, &resolved.bindings).map_err(FormulaError::from),
            Err(e) => Err(FormulaError::Parse(e.clone())),
        })
    }
}

/// Check that an expression only calls known functions with the right arity
/// and only reads symbols present in `bindings`, without evaluating it.
pub fn check(expr: &Expr, bindings: &Bindings) -> Result<(), EvalError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Symbol(name) => match bindings.get(name) {
            Some(_) => Ok(()),
            None => Err(EvalError::UnknownSymbol(name.clone())),
        },
        Expr::Unary { operand, .. } => check(operand, bindings),
        Expr::Binary { left, right, .. } => {
            check(left, bindings)?;
            check(right, bindings)
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            check(condition, bindings)?;
            check(then, bindings)?;
            check(otherwise, bindings)
        }
        Expr::Call { name, args } => {
            let expected = match name.as_str() {
                "min" | "max" if args.is_empty() => Some("at least 1"),
                "min" | "max" => None,
                "pow" if args.len() != 2 => Some("2"),
                "if" if args.len() != 3 => Some("3"),
                "pow" | "if" => None,
                n if FUNCTIONS.contains(&n) && args.len() != 1 => Some("1"),
                n if FUNCTIONS.contains(&n) => None,
                _ => return Err(EvalError::UnknownFunction(name.clone())),
            };
            if let Some(expected) = expected {
                return Err(arity(name, expected, args.len()));
            }
            args.iter().try_for_each(|arg| check(arg, bindings))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::FieldValue;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn evaluate_formula(text: &str, bindings: &Bindings) -> Result<f64, FormulaError> {
        let expr = expr_parser::parse(text)?;
        Ok(evaluate_finite(&expr, bindings)?)
    }

    fn eval(text: &str) -> Result<f64, FormulaError> {
        evaluate_formula(text, &Bindings::default())
    }

    fn eval_ok(text: &str) -> f64 {
        eval(text).unwrap()
    }

    fn bound(formula: &str, pairs: &[(&str, f64)]) -> crate::domain::formula::Resolved {
        let current: FieldMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), (*v).into()))
            .collect();
        crate::domain::formula::resolve(
            formula,
            &current,
            &Default::default(),
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_relative_eq!(eval_ok("1 + 2 * 3"), 7.0);
        assert_relative_eq!(eval_ok("(1 + 2) * 3"), 9.0);
        assert_relative_eq!(eval_ok("10 - 4 - 3"), 3.0);
        assert_relative_eq!(eval_ok("2 ^ 3 ^ 2"), 512.0);
        assert_relative_eq!(eval_ok("-2 ^ 2"), -4.0);
        assert_relative_eq!(eval_ok("7 % 4"), 3.0);
    }

    #[test]
    fn comparisons_yield_flags() {
        assert_eq!(eval_ok("3 > 2"), 1.0);
        assert_eq!(eval_ok("3 < 2"), 0.0);
        assert_eq!(eval_ok("0.1 + 0.2 == 0.3"), 1.0);
        assert_eq!(eval_ok("1 != 1"), 0.0);
        assert_eq!(eval_ok("2 >= 2 and 2 <= 2"), 1.0);
    }

    #[test]
    fn logic_short_circuits() {
        // The right side would divide by zero if evaluated.
        assert_eq!(eval_ok("0 and 1 / 0"), 0.0);
        assert_eq!(eval_ok("1 or 1 / 0"), 1.0);
        assert_eq!(eval_ok("not 0"), 1.0);
        assert_eq!(eval_ok("!5"), 0.0);
    }

    #[test]
    fn conditionals_are_lazy() {
        assert_eq!(eval_ok("1 ? 2 : 1 / 0"), 2.0);
        assert_eq!(eval_ok("if(0, 1 / 0, 3)"), 3.0);
    }

    #[test]
    fn division_by_zero_is_fault() {
        assert_eq!(eval("1 / 0"), Err(FormulaError::Eval(EvalError::DivisionByZero)));
        assert_eq!(eval("1 % 0"), Err(FormulaError::Eval(EvalError::DivisionByZero)));
    }

    #[test]
    fn non_finite_result_is_fault() {
        assert_eq!(eval("sqrt(-1)"), Err(FormulaError::Eval(EvalError::NonFinite)));
        assert_eq!(eval("10 ^ 400"), Err(FormulaError::Eval(EvalError::NonFinite)));
    }

    #[test]
    fn functions() {
        assert_relative_eq!(eval_ok("abs(-3)"), 3.0);
        assert_relative_eq!(eval_ok("max(1, 5, 3)"), 5.0);
        assert_relative_eq!(eval_ok("min(4, -2)"), -2.0);
        assert_relative_eq!(eval_ok("pow(2, 10)"), 1024.0);
        assert_relative_eq!(eval_ok("log10(1000)"), 3.0);
        assert_relative_eq!(eval_ok("log(E)"), 1.0);
        assert_relative_eq!(eval_ok("round(2.5)"), 3.0);
        assert_relative_eq!(eval_ok("cos(PI)"), -1.0);
        assert_eq!(eval_ok("sign(0)"), 0.0);
        assert_eq!(eval_ok("sign(-0.5)"), -1.0);
    }

    #[test]
    fn unknown_function_and_arity() {
        assert_eq!(
            eval("foo(1)"),
            Err(FormulaError::Eval(EvalError::UnknownFunction("foo".into())))
        );
        assert!(matches!(
            eval("abs(1, 2)"),
            Err(FormulaError::Eval(EvalError::Arity { found: 2, .. }))
        ));
        assert!(matches!(
            eval("max()"),
            Err(FormulaError::Eval(EvalError::Arity { found: 0, .. }))
        ));
    }

    #[test]
    fn unknown_symbol() {
        assert_eq!(
            eval("x + 1"),
            Err(FormulaError::Eval(EvalError::UnknownSymbol("x".into())))
        );
    }

    #[test]
    fn parse_error_surfaces() {
        assert!(matches!(eval("1 +"), Err(FormulaError::Parse(_))));
    }

    #[test]
    fn evaluates_resolved_formula() {
        let resolved = bound("[price] * [volume] / 100", &[("price", 12.5), ("volume", 400.0)]);
        assert_relative_eq!(
            evaluate_formula(&resolved.formula, &resolved.bindings).unwrap(),
            50.0
        );
    }

    #[test]
    fn check_accepts_valid_placeholder_formula() {
        let resolved = placeholders("max([a], {X}[b]) / 2 > 1 ? [a] : 0");
        let expr = expr_parser::parse(&resolved.formula).unwrap();
        assert!(check(&expr, &resolved.bindings).is_ok());
    }

    #[test]
    fn check_reports_unknown_function_without_evaluating() {
        let resolved = placeholders("[a] / 0 + nope([a])");
        let expr = expr_parser::parse(&resolved.formula).unwrap();
        assert_eq!(
            check(&expr, &resolved.bindings),
            Err(EvalError::UnknownFunction("nope".into()))
        );
    }

    #[test]
    fn check_reports_bare_identifier() {
        let expr = expr_parser::parse("price + 1").unwrap();
        assert_eq!(
            check(&expr, &Bindings::default()),
            Err(EvalError::UnknownSymbol("price".into()))
        );
    }

    #[test]
    fn validate_formula_reports_each_kind() {
        assert!(validate_formula("[price] / {Index}[price] > 1").is_ok());
        assert!(matches!(validate_formula("[price] +"), Err(FormulaError::Parse(_))));
        assert!(matches!(
            validate_formula("avg([price])"),
            Err(FormulaError::Eval(EvalError::UnknownFunction(_)))
        ));
        assert!(matches!(
            validate_formula("price * 2"),
            Err(FormulaError::Eval(EvalError::UnknownSymbol(_)))
        ));
    }

    #[test]
    fn compiled_formula_reused_across_entities() {
        let compiled = CompiledFormula::compile("[price] * {Index}[weight]");
        let mut all = Snapshot::new();
        let mut index_fields = FieldMap::new();
        index_fields.insert("weight".into(), FieldValue::Number(2.0));
        all.insert("Index".into(), index_fields);
        let index = NameIndex::build(["Index"]);

        for price in [1.0, 2.5] {
            let mut current = FieldMap::new();
            current.insert("price".into(), FieldValue::Number(price));
            let value = compiled.evaluate(&current, &all, &index).unwrap().unwrap();
            assert_relative_eq!(value, price * 2.0);
        }
        assert!(compiled.evaluate(&FieldMap::new(), &all, &index).is_none());
    }

    #[test]
    fn compiled_formula_with_syntax_error_faults_once_resolved() {
        let compiled = CompiledFormula::compile("[a] +");
        assert!(compiled.parse_error().is_some());
        let mut current = FieldMap::new();
        current.insert("a".into(), FieldValue::Number(1.0));
        let outcome = compiled
            .evaluate(&current, &Snapshot::new(), &NameIndex::default())
            .unwrap();
        assert!(matches!(outcome, Err(FormulaError::Parse(_))));
    }

    proptest! {
        #[test]
        fn addition_matches_f64(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let resolved = bound("[a] + [b]", &[("a", a), ("b", b)]);
            let value = evaluate_formula(&resolved.formula, &resolved.bindings).unwrap();
            prop_assert!((value - (a + b)).abs() < 1e-6);
        }

        #[test]
        fn comparison_is_always_flag(a in -1e3f64..1e3, b in -1e3f64..1e3) {
            let resolved = bound("[a] > [b]", &[("a", a), ("b", b)]);
            let value = evaluate_formula(&resolved.formula, &resolved.bindings).unwrap();
            prop_assert!(value == 0.0 || value == 1.0);
        }
    }
}
