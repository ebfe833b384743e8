//! Expression trees lowered into generated functions.

use std::ops::{Add, Mul, Neg, Not, Sub};

use serde::{Deserialize, Serialize};

/// An expression tree node.
///
/// Every expression evaluates to an `i64`. Comparisons and logical operators
/// produce `0` or `1`; any non-zero value counts as true.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum Expr {
    Int(i64),
    /// Value of a packed parameter. Float parameters are truncated to `i64`,
    /// handles yield their address.
    Arg(usize),
    /// Reads the `i64` at `buffer[index]` where `buffer` is a handle parameter.
    Load {
        buffer: usize,
        index: Box<Expr>,
    },
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Abs(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),

    If {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    Min(Box<Expr>, Box<Expr>),

    Max(Box<Expr>, Box<Expr>),

    /// Calls the host callback registered on the owning module under `slot`.
    /// Evaluates to the callback's return value.
    Callback {
        slot: u32,
        arg: Box<Expr>,
    },
}

impl Expr {
    // Constructors for common expressions

    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn bool(value: bool) -> Self {
        Expr::Int(value as i64)
    }

    pub fn arg(idx: usize) -> Self {
        Expr::Arg(idx)
    }

    pub fn load(buffer: usize, index: Expr) -> Self {
        Expr::Load {
            buffer,
            index: Box::new(index),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::Eq(Box::new(left), Box::new(right))
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Expr::Ne(Box::new(left), Box::new(right))
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Expr::Lt(Box::new(left), Box::new(right))
    }

    pub fn le(left: Expr, right: Expr) -> Self {
        Expr::Le(Box::new(left), Box::new(right))
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Expr::Gt(Box::new(left), Box::new(right))
    }

    pub fn ge(left: Expr, right: Expr) -> Self {
        Expr::Ge(Box::new(left), Box::new(right))
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    pub fn abs(expr: Expr) -> Self {
        Expr::Abs(Box::new(expr))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::Add(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(left: Expr, right: Expr) -> Self {
        Expr::Sub(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(left: Expr, right: Expr) -> Self {
        Expr::Mul(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(expr: Expr) -> Self {
        Expr::Neg(Box::new(expr))
    }

    pub fn if_then_else(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }

    pub fn min(left: Expr, right: Expr) -> Self {
        Expr::Min(Box::new(left), Box::new(right))
    }

    pub fn max(left: Expr, right: Expr) -> Self {
        Expr::Max(Box::new(left), Box::new(right))
    }

    pub fn callback(slot: u32, arg: Expr) -> Self {
        Expr::Callback {
            slot,
            arg: Box::new(arg),
        }
    }

    /// Calls `visit` on this node and every sub-expression, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        use Expr::*;
        match self {
            Int(_) | Arg(_) => {}
            Load { index, .. } => index.walk(visit),
            Not(e) | Abs(e) | Neg(e) => e.walk(visit),
            Callback { arg, .. } => arg.walk(visit),
            Eq(l, r) | Ne(l, r) | Lt(l, r) | Le(l, r) | Gt(l, r) | Ge(l, r) | And(l, r)
            | Or(l, r) | Add(l, r) | Sub(l, r) | Mul(l, r) | Min(l, r) | Max(l, r) => {
                l.walk(visit);
                r.walk(visit);
            }
            If {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.walk(visit);
                then_expr.walk(visit);
                else_expr.walk(visit);
            }
        }
    }

    /// Returns true if evaluating this expression calls back into the host.
    pub fn uses_callbacks(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e, Expr::Callback { .. }));
        found
    }
}

// Implement std::ops traits for operator syntax

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        Expr::Not(Box::new(self))
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output {
        Expr::Neg(Box::new(self))
    }
}
