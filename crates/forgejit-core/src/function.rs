//! Function definitions handed to the code generator.

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::expr::Expr;
use crate::type_code::TypeCode;

/// Symbols starting with this prefix belong to the backend runtime.
pub const RESERVED_PREFIX: &str = "__forgejit";

/// Declared kind of a packed parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ArgKind {
    Int,
    Float,
    Handle,
}

impl ArgKind {
    /// Tag the caller must pass for a parameter of this kind.
    pub fn type_code(self) -> TypeCode {
        match self {
            ArgKind::Int => TypeCode::Int,
            ArgKind::Float => TypeCode::Float,
            ArgKind::Handle => TypeCode::Handle,
        }
    }
}

/// How the unit uses a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FunctionRole {
    /// Callable by the host through a packed function handle.
    #[default]
    Exported,
    /// Runs once, right after the unit is linked for execution.
    Initializer,
    /// Runs once, when the owning module is torn down.
    Finalizer,
}

/// A statement in a function body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum Stmt {
    /// Writes `value` to `buffer[index]`, where `buffer` is a handle parameter
    /// pointing at `i64` elements.
    Store {
        buffer: usize,
        index: Expr,
        value: Expr,
    },
    /// Evaluates an expression for its side effects.
    Eval(Expr),
}

impl Stmt {
    pub fn store(buffer: usize, index: Expr, value: Expr) -> Self {
        Stmt::Store {
            buffer,
            index,
            value,
        }
    }

    pub fn eval(expr: Expr) -> Self {
        Stmt::Eval(expr)
    }

    fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Store { index, value, .. } => vec![index, value],
            Stmt::Eval(expr) => vec![expr],
        }
    }
}

/// A function ready to be lowered into a code unit.
///
/// Every function is generated with the packed signature
/// `(values, type_codes, num_args) -> status`; `params` fixes the count and
/// tags the generated prologue checks before running `body`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<ArgKind>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub role: FunctionRole,
}

impl FunctionDef {
    /// Creates an exported function with an empty body.
    pub fn new(name: impl Into<String>, params: Vec<ArgKind>) -> Self {
        Self {
            name: name.into(),
            params,
            body: Vec::new(),
            role: FunctionRole::Exported,
        }
    }

    /// Creates an initializer.
    pub fn initializer(name: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            body,
            role: FunctionRole::Initializer,
        }
    }

    /// Creates a finalizer.
    pub fn finalizer(name: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            body,
            role: FunctionRole::Finalizer,
        }
    }

    /// Appends a statement.
    pub fn with_stmt(mut self, stmt: Stmt) -> Self {
        self.body.push(stmt);
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Returns true if any statement calls back into the host.
    pub fn uses_callbacks(&self) -> bool {
        self.body
            .iter()
            .flat_map(Stmt::exprs)
            .any(Expr::uses_callbacks)
    }

    /// Checks that every parameter reference is in range and that loads and
    /// stores go through handle parameters.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        if self.name.starts_with(RESERVED_PREFIX) {
            return Err(DefinitionError::ReservedName(self.name.clone()));
        }
        if self.role != FunctionRole::Exported && !self.params.is_empty() {
            return Err(DefinitionError::LifecycleParams(self.name.clone()));
        }

        for stmt in &self.body {
            if let Stmt::Store { buffer, .. } = stmt {
                self.check_handle(*buffer)?;
            }
            for expr in stmt.exprs() {
                let mut result = Ok(());
                expr.walk(&mut |e| {
                    if result.is_err() {
                        return;
                    }
                    result = match e {
                        Expr::Arg(index) => self.check_param(*index).map(|_| ()),
                        Expr::Load { buffer, .. } => self.check_handle(*buffer),
                        _ => Ok(()),
                    };
                });
                result?;
            }
        }
        Ok(())
    }

    fn check_param(&self, index: usize) -> Result<ArgKind, DefinitionError> {
        self.params
            .get(index)
            .copied()
            .ok_or_else(|| DefinitionError::ParamOutOfRange {
                function: self.name.clone(),
                index,
                arity: self.params.len(),
            })
    }

    fn check_handle(&self, index: usize) -> Result<(), DefinitionError> {
        match self.check_param(index)? {
            ArgKind::Handle => Ok(()),
            kind => Err(DefinitionError::NotAHandle {
                function: self.name.clone(),
                index,
                kind,
            }),
        }
    }
}

/// Checks every definition and rejects duplicate names.
pub fn validate_all(defs: &[FunctionDef]) -> Result<(), DefinitionError> {
    let mut seen = std::collections::HashSet::new();
    for def in defs {
        def.validate()?;
        if !seen.insert(def.name.as_str()) {
            return Err(DefinitionError::Duplicate(def.name.clone()));
        }
    }
    Ok(())
}
