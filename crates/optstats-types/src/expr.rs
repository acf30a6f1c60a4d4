//! Minimal predicate trees and their evaluation.
//!
//! Only what statistics-driven estimation needs: column references,
//! constants, comparisons, boolean connectives, `IS NULL`, `IN` and a
//! volatile `rand()`. Evaluation follows SQL three-valued logic; boolean
//! results are `Int(1)`, `Int(0)` or `Null`.

use std::fmt::Write as _;

use optstats_error::{Result, StatsError};
use serde::{Deserialize, Serialize};

use crate::collate::Collation;
use crate::datum::Datum;
use crate::field_type::FieldType;

/// A column reference inside an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExprColumn {
    /// Schema column id.
    pub id: i64,
    /// Plan-wide unique id; statistics collections derived for a plan are
    /// keyed by it.
    pub unique_id: i64,
    /// Offset of the value in an evaluation row.
    pub index: usize,
    pub ret_type: FieldType,
    pub name: String,
}

impl ExprColumn {
    #[must_use]
    pub fn new(id: i64, unique_id: i64, name: &str, ret_type: FieldType) -> Self {
        Self {
            id,
            unique_id,
            index: 0,
            ret_type,
            name: name.to_owned(),
        }
    }

    #[must_use]
    pub const fn at(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `<=>`: equality where NULL equals NULL.
    NullEq,
}

impl CompareOp {
    const fn func_name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::NullEq => "nulleq",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(ExprColumn),
    /// Reference to a column of an outer query block, bound to its current
    /// value.
    Correlated { column: ExprColumn, value: Datum },
    Constant(Datum),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    In { expr: Box<Expr>, list: Vec<Expr> },
    /// `rand()`, volatile.
    Rand,
}

const TRUE: Datum = Datum::Int(1);
const FALSE: Datum = Datum::Int(0);

fn bool_datum(b: bool) -> Datum {
    if b { TRUE } else { FALSE }
}

impl Expr {
    #[must_use]
    pub const fn col(column: ExprColumn) -> Self {
        Self::Column(column)
    }

    #[must_use]
    pub fn lit(value: impl Into<Datum>) -> Self {
        Self::Constant(value.into())
    }

    #[must_use]
    pub fn cmp(op: CompareOp, left: Self, right: Self) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn eq(left: Self, right: Self) -> Self {
        Self::cmp(CompareOp::Eq, left, right)
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn not(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    #[must_use]
    pub fn is_null(inner: Self) -> Self {
        Self::IsNull(Box::new(inner))
    }

    #[must_use]
    pub fn in_list(expr: Self, list: Vec<Self>) -> Self {
        Self::In {
            expr: Box::new(expr),
            list,
        }
    }

    /// Evaluate against a row, resolving columns by [`ExprColumn::index`].
    ///
    /// # Errors
    ///
    /// Fails when a column offset is outside the row or operands are
    /// incomparable.
    pub fn eval(&self, row: &[Datum]) -> Result<Datum> {
        self.eval_with(&|c: &ExprColumn| {
            row.get(c.index).cloned().ok_or_else(|| {
                StatsError::eval(format!(
                    "column {} at offset {} is outside a row of {}",
                    c.name,
                    c.index,
                    row.len()
                ))
            })
        })
    }

    /// Evaluate with every column reference bound to `value`.
    ///
    /// # Errors
    ///
    /// Fails when operands are incomparable.
    pub fn eval_single(&self, value: &Datum) -> Result<Datum> {
        self.eval_with(&|_: &ExprColumn| Ok(value.clone()))
    }

    fn eval_with(&self, resolve: &dyn Fn(&ExprColumn) -> Result<Datum>) -> Result<Datum> {
        match self {
            Self::Column(c) => resolve(c),
            Self::Correlated { value, .. } | Self::Constant(value) => Ok(value.clone()),
            Self::Rand => Ok(Datum::Float(rand::random::<f64>())),
            Self::Compare { op, left, right } => {
                let collation = self.collation();
                let l = left.eval_with(resolve)?;
                let r = right.eval_with(resolve)?;
                compare_values(*op, &l, &r, collation)
            }
            Self::And(a, b) => {
                let l = a.eval_with(resolve)?.to_bool()?;
                if l == Some(false) {
                    return Ok(FALSE);
                }
                match (l, b.eval_with(resolve)?.to_bool()?) {
                    (_, Some(false)) => Ok(FALSE),
                    (Some(true), Some(true)) => Ok(TRUE),
                    _ => Ok(Datum::Null),
                }
            }
            Self::Or(a, b) => {
                let l = a.eval_with(resolve)?.to_bool()?;
                if l == Some(true) {
                    return Ok(TRUE);
                }
                match (l, b.eval_with(resolve)?.to_bool()?) {
                    (_, Some(true)) => Ok(TRUE),
                    (Some(false), Some(false)) => Ok(FALSE),
                    _ => Ok(Datum::Null),
                }
            }
            Self::Not(inner) => Ok(match inner.eval_with(resolve)?.to_bool()? {
                Some(b) => bool_datum(!b),
                None => Datum::Null,
            }),
            Self::IsNull(inner) => Ok(bool_datum(inner.eval_with(resolve)?.is_null())),
            Self::In { expr, list } => {
                let collation = self.collation();
                let v = expr.eval_with(resolve)?;
                if v.is_null() {
                    return Ok(Datum::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = item.eval_with(resolve)?;
                    if candidate.is_null() {
                        saw_null = true;
                    } else if v.compare(&candidate, collation)?.is_eq() {
                        return Ok(TRUE);
                    }
                }
                Ok(if saw_null { Datum::Null } else { FALSE })
            }
        }
    }

    /// Collation of the first column operand, binary without one.
    fn collation(&self) -> Collation {
        let mut found = None;
        self.visit(&mut |e| {
            if found.is_none() {
                if let Self::Column(c) | Self::Correlated { column: c, .. } = e {
                    found = Some(c.ret_type.collation);
                }
            }
        });
        found.unwrap_or_default()
    }

    fn visit(&self, f: &mut dyn FnMut(&Self)) {
        f(self);
        match self {
            Self::Column(_) | Self::Correlated { .. } | Self::Constant(_) | Self::Rand => {}
            Self::Compare { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Self::Not(inner) | Self::IsNull(inner) => inner.visit(f),
            Self::In { expr, list } => {
                expr.visit(f);
                for item in list {
                    item.visit(f);
                }
            }
        }
    }

    /// Whether evaluation can observe or change state outside the row.
    #[must_use]
    pub fn has_mutable_effects(&self) -> bool {
        let mut volatile = false;
        self.visit(&mut |e| volatile |= matches!(e, Self::Rand));
        volatile
    }

    /// Render as the function-call syntax used in cardinality traces, e.g.
    /// `` `eq`(a, 1) ``.
    ///
    /// # Errors
    ///
    /// Correlated columns cannot be rendered.
    pub fn to_trace_string(&self) -> Result<String> {
        let mut out = String::new();
        self.write_trace(&mut out)?;
        Ok(out)
    }

    fn write_trace(&self, out: &mut String) -> Result<()> {
        let call = |out: &mut String, name: &str, args: &[&Self]| -> Result<()> {
            let _ = write!(out, "`{name}`(");
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                arg.write_trace(out)?;
            }
            out.push(')');
            Ok(())
        };
        match self {
            Self::Column(c) => out.push_str(&c.name),
            Self::Correlated { column, .. } => {
                return Err(StatsError::eval(format!(
                    "tracing correlated column {} is not supported",
                    column.name
                )));
            }
            Self::Constant(v) => write_literal(out, v),
            Self::Rand => out.push_str("`rand`()"),
            Self::Compare { op, left, right } => call(out, op.func_name(), &[&**left, &**right])?,
            Self::And(a, b) => call(out, "and", &[&**a, &**b])?,
            Self::Or(a, b) => call(out, "or", &[&**a, &**b])?,
            Self::Not(inner) => call(out, "not", &[&**inner])?,
            Self::IsNull(inner) => call(out, "isnull", &[&**inner])?,
            Self::In { expr, list } => {
                let mut args: Vec<&Self> = Vec::with_capacity(list.len() + 1);
                args.push(&**expr);
                args.extend(list.iter());
                call(out, "in", &args)?;
            }
        }
        Ok(())
    }
}

fn write_literal(out: &mut String, v: &Datum) {
    match v {
        Datum::String(s) => {
            let _ = write!(out, "'{}'", s.replace('\'', "''"));
        }
        Datum::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => {
                let _ = write!(out, "'{}'", s.replace('\'', "''"));
            }
            Err(_) => {
                let _ = write!(out, "{v}");
            }
        },
        _ => {
            let _ = write!(out, "{v}");
        }
    }
}

fn compare_values(op: CompareOp, l: &Datum, r: &Datum, collation: Collation) -> Result<Datum> {
    if op == CompareOp::NullEq {
        return Ok(match (l.is_null(), r.is_null()) {
            (true, true) => TRUE,
            (true, false) | (false, true) => FALSE,
            (false, false) => bool_datum(l.compare(r, collation)?.is_eq()),
        });
    }
    if l.is_null() || r.is_null() {
        return Ok(Datum::Null);
    }
    let ord = l.compare(r, collation)?;
    Ok(bool_datum(match op {
        CompareOp::Eq | CompareOp::NullEq => ord.is_eq(),
        CompareOp::Ne => ord.is_ne(),
        CompareOp::Lt => ord.is_lt(),
        CompareOp::Le => ord.is_le(),
        CompareOp::Gt => ord.is_gt(),
        CompareOp::Ge => ord.is_ge(),
    }))
}

/// Evaluate the conjunction of `filters` over a single-column batch and
/// return one selected flag per value. Every column reference is bound to the
/// batch value.
///
/// # Errors
///
/// Propagates the first evaluation failure.
pub fn vectorized_filter(filters: &[Expr], values: &[Datum]) -> Result<Vec<bool>> {
    let mut selected = Vec::with_capacity(values.len());
    for value in values {
        let mut keep = true;
        for filter in filters {
            if filter.eval_single(value)?.to_bool()? != Some(true) {
                keep = false;
                break;
            }
        }
        selected.push(keep);
    }
    Ok(selected)
}

/// Distinct column references of `filters`, deduplicated by unique id, in
/// first-seen order. Correlated references are not included.
#[must_use]
pub fn extract_columns(filters: &[Expr]) -> Vec<&ExprColumn> {
    let mut out: Vec<&ExprColumn> = Vec::new();
    for filter in filters {
        collect_columns(filter, &mut out);
    }
    out
}

fn collect_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a ExprColumn>) {
    match expr {
        Expr::Column(c) => {
            if !out.iter().any(|seen| seen.unique_id == c.unique_id) {
                out.push(c);
            }
        }
        Expr::Correlated { .. } | Expr::Constant(_) | Expr::Rand => {}
        Expr::Compare { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_columns(a, out);
            collect_columns(b, out);
        }
        Expr::Not(inner) | Expr::IsNull(inner) => collect_columns(inner, out),
        Expr::In { expr, list } => {
            collect_columns(expr, out);
            for item in list {
                collect_columns(item, out);
            }
        }
    }
}

/// Whether any filter references an outer-scope column.
#[must_use]
pub fn contains_correlated(filters: &[Expr]) -> bool {
    filters.iter().any(|f| {
        let mut found = false;
        f.visit(&mut |e| found |= matches!(e, Expr::Correlated { .. }));
        found
    })
}
