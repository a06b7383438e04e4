//! Update computation model.
//!
//! An update computation is a small scalar AST with two symbolic row inputs:
//! the *incoming* row being written and the *existing* row already stored.
//! Callers declare the tree through the builder constructors below; the
//! dialect compilers render it recursively into engine-specific SQL, so
//! arithmetic like `existing + incoming` runs inside the database rather
//! than against a stale host-side snapshot.
//!
//! ```
//! use upsertql::Expr;
//!
//! // visits = visits + EXCLUDED.visits
//! let bump = Expr::existing("visits").add(Expr::incoming("visits"));
//!
//! // only overwrite newer data
//! let guard = Expr::incoming("updated_at").gt(Expr::existing("updated_at"));
//! # let _ = (bump, guard);
//! ```

use crate::error::{UpsertError, UpsertResult};
use crate::schema::TableSchema;
use crate::value::Value;

/// Binary operator of an update computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// SQL spelling of this operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }
}

/// Scalar computation over the incoming and existing rows.
///
/// Invariant: the only column references in a tree are [`Expr::Incoming`]
/// and [`Expr::Existing`]; every leaf resolves against the schema before
/// compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal constant, bound as a statement parameter.
    Value(Value),
    /// Column of the incoming row being written.
    Incoming(String),
    /// Column of the row already stored in the database.
    Existing(String),
    /// Binary arithmetic, comparison or logical operator.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// NULL test on the inner expression.
    IsNull(Box<Expr>),
    /// Ternary conditional, rendered as `CASE WHEN`.
    Case {
        when: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Literal constant.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    /// Reference to a column of the incoming row.
    pub fn incoming(column: impl Into<String>) -> Self {
        Expr::Incoming(column.into())
    }

    /// Reference to a column of the existing stored row.
    pub fn existing(column: impl Into<String>) -> Self {
        Expr::Existing(column.into())
    }

    /// Ternary conditional: `CASE WHEN when THEN then ELSE otherwise END`.
    pub fn case(when: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Case {
            when: Box::new(when),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// NULL test: `expr IS NULL`.
    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    fn binary(self, op: BinOp, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    /// `self + rhs`
    pub fn add(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Add, rhs)
    }

    /// `self - rhs`
    pub fn sub(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Sub, rhs)
    }

    /// `self * rhs`
    pub fn mul(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Mul, rhs)
    }

    /// `self / rhs`
    pub fn div(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Div, rhs)
    }

    /// `self % rhs`
    pub fn rem(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Rem, rhs)
    }

    /// `self = rhs`
    pub fn eq(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Eq, rhs)
    }

    /// `self <> rhs`
    pub fn ne(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Ge, rhs)
    }

    /// `self AND rhs`
    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::And, rhs)
    }

    /// `self OR rhs`
    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinOp::Or, rhs)
    }

    /// Whether any subtree references the incoming or existing row.
    pub fn references_rows(&self) -> bool {
        match self {
            Expr::Value(_) => false,
            Expr::Incoming(_) | Expr::Existing(_) => true,
            Expr::Binary { lhs, rhs, .. } => lhs.references_rows() || rhs.references_rows(),
            Expr::IsNull(inner) => inner.references_rows(),
            Expr::Case {
                when,
                then,
                otherwise,
            } => when.references_rows() || then.references_rows() || otherwise.references_rows(),
        }
    }

    /// Number of literal leaves, i.e. statement parameters this tree binds.
    pub(crate) fn bind_count(&self) -> usize {
        match self {
            Expr::Value(_) => 1,
            Expr::Incoming(_) | Expr::Existing(_) => 0,
            Expr::Binary { lhs, rhs, .. } => lhs.bind_count() + rhs.bind_count(),
            Expr::IsNull(inner) => inner.bind_count(),
            Expr::Case {
                when,
                then,
                otherwise,
            } => when.bind_count() + then.bind_count() + otherwise.bind_count(),
        }
    }

    /// Evaluate constant subtrees eagerly on the host side.
    ///
    /// Any subtree free of row references collapses to a single literal
    /// where the operand types allow it; combinations the host cannot
    /// evaluate are left to the database. Division or remainder by a zero
    /// constant is rejected here rather than at the server.
    pub fn fold(self) -> UpsertResult<Expr> {
        Ok(match self {
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.fold()?;
                let rhs = rhs.fold()?;
                if let (Expr::Value(a), Expr::Value(b)) = (&lhs, &rhs) {
                    if let Some(v) = eval_binary(op, a, b)? {
                        return Ok(Expr::Value(v));
                    }
                }
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            Expr::IsNull(inner) => {
                let inner = inner.fold()?;
                if let Expr::Value(v) = &inner {
                    return Ok(Expr::Value(Value::Bool(v.is_null())));
                }
                Expr::IsNull(Box::new(inner))
            }
            Expr::Case {
                when,
                then,
                otherwise,
            } => {
                let when = when.fold()?;
                let then = then.fold()?;
                let otherwise = otherwise.fold()?;
                if let Expr::Value(Value::Bool(cond)) = when {
                    return Ok(if cond { then } else { otherwise });
                }
                Expr::Case {
                    when: Box::new(when),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                }
            }
            leaf => leaf,
        })
    }

    /// Check every column reference against the schema.
    pub(crate) fn resolve(&self, schema: &dyn TableSchema) -> UpsertResult<()> {
        match self {
            Expr::Value(_) => Ok(()),
            Expr::Incoming(col) | Expr::Existing(col) => {
                if schema.column(col).is_none() {
                    return Err(UpsertError::unknown_column(schema.name(), col.clone()));
                }
                Ok(())
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.resolve(schema)?;
                rhs.resolve(schema)
            }
            Expr::IsNull(inner) => inner.resolve(schema),
            Expr::Case {
                when,
                then,
                otherwise,
            } => {
                when.resolve(schema)?;
                then.resolve(schema)?;
                otherwise.resolve(schema)
            }
        }
    }
}

fn eval_binary(op: BinOp, a: &Value, b: &Value) -> UpsertResult<Option<Value>> {
    use BinOp::*;
    let v = match (op, a, b) {
        // Overflowing integer arithmetic is left unfolded for the database.
        (Add, Value::Int(a), Value::Int(b)) => return Ok(a.checked_add(*b).map(Value::Int)),
        (Sub, Value::Int(a), Value::Int(b)) => return Ok(a.checked_sub(*b).map(Value::Int)),
        (Mul, Value::Int(a), Value::Int(b)) => return Ok(a.checked_mul(*b).map(Value::Int)),
        (Div | Rem, Value::Int(_), Value::Int(0)) => {
            return Err(UpsertError::unsupported_expression(
                "division by a zero constant",
            ));
        }
        (Div, Value::Int(a), Value::Int(b)) => return Ok(a.checked_div(*b).map(Value::Int)),
        (Rem, Value::Int(a), Value::Int(b)) => return Ok(a.checked_rem(*b).map(Value::Int)),
        (Add, Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Sub, Value::Float(a), Value::Float(b)) => Value::Float(a - b),
        (Mul, Value::Float(a), Value::Float(b)) => Value::Float(a * b),
        (Div, Value::Float(a), Value::Float(b)) => Value::Float(a / b),
        (And, Value::Bool(a), Value::Bool(b)) => Value::Bool(*a && *b),
        (Or, Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
        (Eq, a, b) if !a.is_null() && !b.is_null() => Value::Bool(a == b),
        (Ne, a, b) if !a.is_null() && !b.is_null() => Value::Bool(a != b),
        (Lt, Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
        (Le, Value::Int(a), Value::Int(b)) => Value::Bool(a <= b),
        (Gt, Value::Int(a), Value::Int(b)) => Value::Bool(a > b),
        (Ge, Value::Int(a), Value::Int(b)) => Value::Bool(a >= b),
        _ => return Ok(None),
    };
    Ok(Some(v))
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Value(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Value(v.into())
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Value(v.into())
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Value(v.into())
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Value(v.into())
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Value(v.into())
    }
}

/// How matched rows are updated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UpdateAction {
    /// No update clause: insert if absent, leave the stored row untouched.
    Nothing,
    /// Every non-key insert column takes the incoming value.
    #[default]
    AllNonKey,
    /// Explicit per-column computations.
    Set(Vec<(String, Expr)>),
}

/// Full update behaviour: action plus an optional per-row guard.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateSpec {
    /// Update action for matched rows.
    pub action: UpdateAction,
    /// Boolean predicate; when false for a matched row, the update is
    /// suppressed for that row only.
    pub guard: Option<Expr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    #[test]
    fn folds_constant_arithmetic() {
        let e = Expr::value(2).add(Expr::value(3)).mul(Expr::value(4));
        assert_eq!(e.fold().unwrap(), Expr::Value(Value::Int(20)));
    }

    #[test]
    fn folds_around_row_references() {
        let e = Expr::existing("visits").add(Expr::value(1).add(Expr::value(2)));
        let folded = e.fold().unwrap();
        assert_eq!(
            folded,
            Expr::existing("visits").add(Expr::value(3)),
        );
    }

    #[test]
    fn folds_constant_case() {
        let e = Expr::case(
            Expr::value(1).lt(Expr::value(2)),
            Expr::value("yes"),
            Expr::value("no"),
        );
        assert_eq!(e.fold().unwrap(), Expr::Value(Value::Text("yes".into())));
    }

    #[test]
    fn leaves_overflowing_arithmetic_to_the_database() {
        let e = Expr::value(i64::MAX).add(Expr::value(1i64));
        assert!(matches!(e.fold().unwrap(), Expr::Binary { .. }));
        let e = Expr::value(i64::MIN).div(Expr::value(-1i64));
        assert!(matches!(e.fold().unwrap(), Expr::Binary { .. }));
    }

    #[test]
    fn rejects_constant_division_by_zero() {
        let err = Expr::value(1).div(Expr::value(0)).fold().unwrap_err();
        assert!(matches!(err, UpsertError::UnsupportedExpression(_)));
    }

    #[test]
    fn leaves_mixed_types_to_the_database() {
        let e = Expr::value(1).add(Expr::value("x"));
        assert!(matches!(e.fold().unwrap(), Expr::Binary { .. }));
    }

    #[test]
    fn resolve_checks_columns() {
        let t = Table::new("t").column("a");
        assert!(Expr::incoming("a").resolve(&t).is_ok());
        let err = Expr::existing("nope").resolve(&t).unwrap_err();
        assert!(matches!(err, UpsertError::UnknownColumn { .. }));
    }

    #[test]
    fn bind_count_counts_literal_leaves() {
        let e = Expr::existing("a").add(Expr::value(1)).gt(Expr::value(2));
        assert_eq!(e.bind_count(), 2);
    }
}
