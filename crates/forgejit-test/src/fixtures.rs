//! Function definitions used across the test suites.
//!
//! Every exported fixture writes its result to `out[0]`, where `out` is the
//! first parameter, a handle to an `i64` buffer.

use forgejit_core::{ArgKind, Expr, FunctionDef, Stmt};

/// Callback slot the lifecycle initializer reports to.
pub const SLOT_LOAD: u32 = 10;
/// Callback slot the lifecycle finalizer reports to.
pub const SLOT_UNLOAD: u32 = 11;
/// Callback slot `notify` calls with its argument.
pub const SLOT_NOTIFY: u32 = 0;
/// Callback slot `transform` calls with its argument.
pub const SLOT_TRANSFORM: u32 = 1;

fn store_out(value: Expr) -> Stmt {
    Stmt::store(0, Expr::int(0), value)
}

/// `sum_into(out, a, b)`: `out[0] = a + b`. A one-function unit.
pub fn sum_into() -> Vec<FunctionDef> {
    vec![sum_into_def()]
}

fn sum_into_def() -> FunctionDef {
    FunctionDef::new(
        "sum_into",
        vec![ArgKind::Handle, ArgKind::Int, ArgKind::Int],
    )
    .with_stmt(store_out(Expr::arg(1) + Expr::arg(2)))
}

/// A unit of small integer functions. `sum_into` is the entry.
///
/// - `sum_into(out, a, b)`: `a + b`
/// - `clamp(out, x, lo, hi)`: `x` limited to `[lo, hi]`
/// - `sign(out, x)`: `-1`, `0` or `1`
/// - `truncate(out, x: float)`: `x` rounded toward zero
/// - `accumulate(buf, i, x)`: `buf[i] += x`
pub fn arithmetic_unit() -> Vec<FunctionDef> {
    vec![
        sum_into_def(),
        FunctionDef::new(
            "clamp",
            vec![ArgKind::Handle, ArgKind::Int, ArgKind::Int, ArgKind::Int],
        )
        .with_stmt(store_out(Expr::max(
            Expr::arg(2),
            Expr::min(Expr::arg(1), Expr::arg(3)),
        ))),
        FunctionDef::new("sign", vec![ArgKind::Handle, ArgKind::Int]).with_stmt(store_out(
            Expr::if_then_else(
                Expr::lt(Expr::arg(1), Expr::int(0)),
                Expr::int(-1),
                Expr::if_then_else(Expr::eq(Expr::arg(1), Expr::int(0)), Expr::int(0), Expr::int(1)),
            ),
        )),
        FunctionDef::new("truncate", vec![ArgKind::Handle, ArgKind::Float])
            .with_stmt(store_out(Expr::arg(1))),
        FunctionDef::new(
            "accumulate",
            vec![ArgKind::Handle, ArgKind::Int, ArgKind::Int],
        )
        .with_stmt(Stmt::store(
            0,
            Expr::arg(1),
            Expr::load(0, Expr::arg(1)) + Expr::arg(2),
        )),
    ]
}

/// `count` functions `f0 .. f{count-1}`, where `fi(out)` writes `i`.
pub fn numbered_unit(count: usize) -> Vec<FunctionDef> {
    (0..count)
        .map(|i| {
            FunctionDef::new(format!("f{i}"), vec![ArgKind::Handle])
                .with_stmt(store_out(Expr::int(i as i64)))
        })
        .collect()
}

/// Functions that call back into the host.
///
/// - `notify(x)`: calls slot [`SLOT_NOTIFY`] with `x`, discards the result
/// - `transform(out, x)`: `out[0] = callback[SLOT_TRANSFORM](x) * 2`
pub fn callback_unit() -> Vec<FunctionDef> {
    vec![
        FunctionDef::new("notify", vec![ArgKind::Int])
            .with_stmt(Stmt::eval(Expr::callback(SLOT_NOTIFY, Expr::arg(0)))),
        FunctionDef::new("transform", vec![ArgKind::Handle, ArgKind::Int]).with_stmt(store_out(
            Expr::callback(SLOT_TRANSFORM, Expr::arg(1)) * Expr::int(2),
        )),
    ]
}

/// `sum_into` plus an initializer reporting `1` to [`SLOT_LOAD`] and a
/// finalizer reporting `1` to [`SLOT_UNLOAD`].
pub fn lifecycle_unit() -> Vec<FunctionDef> {
    vec![
        sum_into_def(),
        FunctionDef::initializer(
            "on_load",
            vec![Stmt::eval(Expr::callback(SLOT_LOAD, Expr::int(1)))],
        ),
        FunctionDef::finalizer(
            "on_unload",
            vec![Stmt::eval(Expr::callback(SLOT_UNLOAD, Expr::int(1)))],
        ),
    ]
}
