//! Cranelift lowering for one function definition.
//!
//! All expression values are `i64`. Booleans are 0 or 1. Handles are widened to
//! `i64` when loaded and narrowed back to the pointer type for memory access.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::immediates::Imm64;
use cranelift_codegen::ir::types::{F64, I32, I64};
use cranelift_codegen::ir::{
    Block, ExtFuncData, ExternalName, FuncRef, Function, GlobalValue, GlobalValueData, InstBuilder,
    MemFlags, Type, UserExternalName, UserFuncName, Value,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use forgejit_core::{ArgKind, Expr, FunctionDef, Stmt};

use crate::error::{ModuleError, Result};
use crate::runtime::{ARG_ERROR_COUNT, ARG_ERROR_TYPE_CODE};
use crate::unit::{UnitContext, ARG_ERROR_INDEX, CALLBACK_INDEX, CTX_DATA_INDEX};

/// Namespaces `cranelift-module` resolves user external names in.
const FUNCTION_NAMESPACE: u32 = 0;
const DATA_NAMESPACE: u32 = 1;

struct Env<'a> {
    function: &'a str,
    args: Vec<Value>,
    pointer: Type,
    callback: FuncRef,
    context_slot: Option<GlobalValue>,
}

/// Lowers `def`, declared at `index` in `unit`, into a Cranelift function.
pub(crate) fn lower(
    def: &FunctionDef,
    index: u32,
    unit: &UnitContext,
    pointer: Type,
) -> Result<Function> {
    let mut func = Function::with_name_signature(
        UserFuncName::user(FUNCTION_NAMESPACE, index),
        unit.packed_signature().clone(),
    );
    let arg_error = import_function(&mut func, unit, ARG_ERROR_INDEX);
    let callback = import_function(&mut func, unit, CALLBACK_INDEX);
    let context_slot = unit
        .has_context_slot()
        .then(|| import_data(&mut func, CTX_DATA_INDEX));

    let mut func_ctx = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut func, &mut func_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);

        // (values, type_codes, num_args)
        let params = builder.block_params(entry).to_vec();
        let (values, type_codes, num_args) = (params[0], params[1], params[2]);

        let expected = iconst_i32(&mut builder, def.params.len() as i32);
        let count_ok = builder.ins().icmp(IntCC::Equal, num_args, expected);
        let mut next = builder.create_block();
        let fail = builder.create_block();
        builder.ins().brif(count_ok, next, &[], fail, &[]);
        report_arg_error(&mut builder, fail, arg_error, ARG_ERROR_COUNT, -1, expected, num_args);

        for (i, kind) in def.params.iter().enumerate() {
            builder.switch_to_block(next);
            let actual = builder
                .ins()
                .load(I32, MemFlags::trusted(), type_codes, (i * 4) as i32);
            let wanted = iconst_i32(&mut builder, kind.type_code().as_i32());
            let tag_ok = builder.ins().icmp(IntCC::Equal, actual, wanted);
            let following = builder.create_block();
            let fail = builder.create_block();
            builder.ins().brif(tag_ok, following, &[], fail, &[]);
            report_arg_error(
                &mut builder,
                fail,
                arg_error,
                ARG_ERROR_TYPE_CODE,
                i as i32,
                wanted,
                actual,
            );
            next = following;
        }

        builder.switch_to_block(next);
        let args = def
            .params
            .iter()
            .enumerate()
            .map(|(i, kind)| load_arg(&mut builder, values, i, *kind, pointer))
            .collect();

        let env = Env {
            function: &def.name,
            args,
            pointer,
            callback,
            context_slot,
        };
        for stmt in &def.body {
            emit_stmt(&mut builder, stmt, &env)?;
        }

        let ok = iconst_i32(&mut builder, 0);
        builder.ins().return_(&[ok]);
        builder.seal_all_blocks();
        builder.finalize();
    }

    Ok(func)
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn import_function(func: &mut Function, unit: &UnitContext, index: usize) -> FuncRef {
    let decl = &unit.functions()[index];
    let signature = func.import_signature(decl.signature.clone());
    let name = func.declare_imported_user_function(UserExternalName::new(
        FUNCTION_NAMESPACE,
        index as u32,
    ));
    func.import_function(ExtFuncData {
        name: ExternalName::user(name),
        signature,
        colocated: false,
    })
}

fn import_data(func: &mut Function, index: usize) -> GlobalValue {
    let name =
        func.declare_imported_user_function(UserExternalName::new(DATA_NAMESPACE, index as u32));
    func.create_global_value(GlobalValueData::Symbol {
        name: ExternalName::user(name),
        offset: Imm64::new(0),
        colocated: false,
        tls: false,
    })
}

// ---------------------------------------------------------------------------
// Prologue
// ---------------------------------------------------------------------------

fn report_arg_error(
    builder: &mut FunctionBuilder,
    block: Block,
    hook: FuncRef,
    kind: i32,
    index: i32,
    expected: Value,
    actual: Value,
) {
    builder.switch_to_block(block);
    let kind = iconst_i32(builder, kind);
    let index = iconst_i32(builder, index);
    let call = builder.ins().call(hook, &[kind, index, expected, actual]);
    let status = builder.inst_results(call)[0];
    builder.ins().return_(&[status]);
}

fn load_arg(
    builder: &mut FunctionBuilder,
    values: Value,
    index: usize,
    kind: ArgKind,
    pointer: Type,
) -> Value {
    let flags = MemFlags::trusted();
    let offset = (index * 8) as i32;
    match kind {
        ArgKind::Int => builder.ins().load(I64, flags, values, offset),
        ArgKind::Float => {
            let f = builder.ins().load(F64, flags, values, offset);
            builder.ins().fcvt_to_sint_sat(I64, f)
        }
        ArgKind::Handle => {
            let p = builder.ins().load(pointer, flags, values, offset);
            widen(builder, pointer, p)
        }
    }
}

// ---------------------------------------------------------------------------
// Statements and expressions
// ---------------------------------------------------------------------------

fn emit_stmt(builder: &mut FunctionBuilder, stmt: &Stmt, env: &Env) -> Result<()> {
    match stmt {
        Stmt::Store {
            buffer,
            index,
            value,
        } => {
            let addr = element_address(builder, *buffer, index, env)?;
            let v = emit_expr(builder, value, env)?;
            builder.ins().store(MemFlags::new(), v, addr, 0);
        }
        Stmt::Eval(expr) => {
            emit_expr(builder, expr, env)?;
        }
    }
    Ok(())
}

/// Emit Cranelift IR for an expression.
fn emit_expr(builder: &mut FunctionBuilder, expr: &Expr, env: &Env) -> Result<Value> {
    use Expr::*;
    let value = match expr {
        Int(n) => builder.ins().iconst(I64, *n),
        Arg(i) => env.args[*i],
        Load { buffer, index } => {
            let addr = element_address(builder, *buffer, index, env)?;
            builder.ins().load(I64, MemFlags::new(), addr, 0)
        }

        Eq(l, r) => icmp_op(builder, IntCC::Equal, l, r, env)?,
        Ne(l, r) => icmp_op(builder, IntCC::NotEqual, l, r, env)?,
        Lt(l, r) => icmp_op(builder, IntCC::SignedLessThan, l, r, env)?,
        Le(l, r) => icmp_op(builder, IntCC::SignedLessThanOrEqual, l, r, env)?,
        Gt(l, r) => icmp_op(builder, IntCC::SignedGreaterThan, l, r, env)?,
        Ge(l, r) => icmp_op(builder, IntCC::SignedGreaterThanOrEqual, l, r, env)?,

        And(l, r) => {
            let l = truthy(builder, l, env)?;
            let r = truthy(builder, r, env)?;
            builder.ins().band(l, r)
        }
        Or(l, r) => {
            let l = truthy(builder, l, env)?;
            let r = truthy(builder, r, env)?;
            builder.ins().bor(l, r)
        }
        Not(inner) => {
            let v = truthy(builder, inner, env)?;
            let one = builder.ins().iconst(I64, 1);
            builder.ins().bxor(v, one)
        }

        Add(l, r) => bin_op(builder, |b, a, c| b.ins().iadd(a, c), l, r, env)?,
        Sub(l, r) => bin_op(builder, |b, a, c| b.ins().isub(a, c), l, r, env)?,
        Mul(l, r) => bin_op(builder, |b, a, c| b.ins().imul(a, c), l, r, env)?,
        Neg(inner) => {
            let v = emit_expr(builder, inner, env)?;
            builder.ins().ineg(v)
        }
        Abs(inner) => {
            let v = emit_expr(builder, inner, env)?;
            let neg = builder.ins().ineg(v);
            let zero = builder.ins().iconst(I64, 0);
            let is_neg = builder.ins().icmp(IntCC::SignedLessThan, v, zero);
            builder.ins().select(is_neg, neg, v)
        }

        Min(l, r) => select_op(builder, IntCC::SignedLessThan, l, r, env)?,
        Max(l, r) => select_op(builder, IntCC::SignedGreaterThan, l, r, env)?,

        // Branches may call back into the host, so only the taken one runs.
        If {
            cond,
            then_expr,
            else_expr,
        } => {
            let c = emit_expr(builder, cond, env)?;
            let then_block = builder.create_block();
            let else_block = builder.create_block();
            let merge = builder.create_block();
            builder.append_block_param(merge, I64);
            builder.ins().brif(c, then_block, &[], else_block, &[]);

            builder.switch_to_block(then_block);
            let t = emit_expr(builder, then_expr, env)?;
            builder.ins().jump(merge, &[t]);

            builder.switch_to_block(else_block);
            let e = emit_expr(builder, else_expr, env)?;
            builder.ins().jump(merge, &[e]);

            builder.switch_to_block(merge);
            builder.block_params(merge)[0]
        }

        Callback { slot, arg } => {
            let Some(context_slot) = env.context_slot else {
                return Err(ModuleError::Codegen {
                    function: env.function.to_string(),
                    reason: "callback without a context slot".to_string(),
                });
            };
            let addr = builder.ins().symbol_value(env.pointer, context_slot);
            let context = builder.ins().load(I64, MemFlags::trusted(), addr, 0);
            let slot = builder.ins().iconst(I32, i64::from(*slot));
            let arg = emit_expr(builder, arg, env)?;
            let call = builder.ins().call(env.callback, &[context, slot, arg]);
            builder.inst_results(call)[0]
        }
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Address of `buffer[index]` for an `i64` buffer.
fn element_address(
    builder: &mut FunctionBuilder,
    buffer: usize,
    index: &Expr,
    env: &Env,
) -> Result<Value> {
    let base = env.args[buffer];
    let idx = emit_expr(builder, index, env)?;
    let offset = builder.ins().imul_imm(idx, 8);
    let addr = builder.ins().iadd(base, offset);
    Ok(narrow(builder, env.pointer, addr))
}

fn truthy(builder: &mut FunctionBuilder, expr: &Expr, env: &Env) -> Result<Value> {
    let v = emit_expr(builder, expr, env)?;
    let zero = builder.ins().iconst(I64, 0);
    let cmp = builder.ins().icmp(IntCC::NotEqual, v, zero);
    Ok(builder.ins().uextend(I64, cmp))
}

fn icmp_op(
    builder: &mut FunctionBuilder,
    cc: IntCC,
    left: &Expr,
    right: &Expr,
    env: &Env,
) -> Result<Value> {
    let l = emit_expr(builder, left, env)?;
    let r = emit_expr(builder, right, env)?;
    let cmp = builder.ins().icmp(cc, l, r);
    Ok(builder.ins().uextend(I64, cmp))
}

fn bin_op(
    builder: &mut FunctionBuilder,
    op: impl FnOnce(&mut FunctionBuilder, Value, Value) -> Value,
    left: &Expr,
    right: &Expr,
    env: &Env,
) -> Result<Value> {
    let l = emit_expr(builder, left, env)?;
    let r = emit_expr(builder, right, env)?;
    Ok(op(builder, l, r))
}

fn select_op(
    builder: &mut FunctionBuilder,
    cc: IntCC,
    left: &Expr,
    right: &Expr,
    env: &Env,
) -> Result<Value> {
    let l = emit_expr(builder, left, env)?;
    let r = emit_expr(builder, right, env)?;
    let cmp = builder.ins().icmp(cc, l, r);
    Ok(builder.ins().select(cmp, l, r))
}

/// `iconst` for `i32`; Cranelift wants narrow immediates zero-extended.
fn iconst_i32(builder: &mut FunctionBuilder, value: i32) -> Value {
    builder.ins().iconst(I32, i64::from(value as u32))
}

fn widen(builder: &mut FunctionBuilder, pointer: Type, value: Value) -> Value {
    if pointer == I64 {
        value
    } else {
        builder.ins().uextend(I64, value)
    }
}

fn narrow(builder: &mut FunctionBuilder, pointer: Type, value: Value) -> Value {
    if pointer == I64 {
        value
    } else {
        builder.ins().ireduce(pointer, value)
    }
}
