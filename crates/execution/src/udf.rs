//! Scalar function registry and invocation contract.
//!
//! Functions are registered as named overloads keyed by their exact argument
//! types. Lookup never widens or casts: `eq(Int64, Float64)` does not match
//! `eq(Int64, Int64)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use arrow::array::ArrayRef;
use arrow_schema::DataType;
use rill_common::{CallSiteId, PlanNodeId, QueryId, Result, RillError};

/// Where a function is being invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionContext {
    pub query_id: QueryId,
    pub node_id: PlanNodeId,
    pub call_site: CallSiteId,
}

/// Runtime scalar function contract.
pub trait ScalarFunction: Send + Sync {
    /// Stable lowercase function name (`eq`, `add`).
    fn name(&self) -> &str;
    /// Exact argument types this overload accepts.
    fn arg_types(&self) -> &[DataType];
    /// Type of the returned array.
    fn return_type(&self) -> DataType;
    /// Batch-wise invocation. `args` are aligned arrays of equal length; the
    /// result must have the same length.
    fn invoke(&self, ctx: &FunctionContext, args: &[ArrayRef]) -> Result<ArrayRef>;
}

type InvokeFn = dyn Fn(&FunctionContext, &[ArrayRef]) -> Result<ArrayRef> + Send + Sync;

/// Closure-backed [`ScalarFunction`].
pub struct FnScalarFunction {
    name: String,
    arg_types: Vec<DataType>,
    return_type: DataType,
    f: Box<InvokeFn>,
}

impl FnScalarFunction {
    pub fn new<F>(
        name: impl Into<String>,
        arg_types: Vec<DataType>,
        return_type: DataType,
        f: F,
    ) -> Self
    where
        F: Fn(&FunctionContext, &[ArrayRef]) -> Result<ArrayRef> + Send + Sync + 'static,
    {
        Self {
            name: name.into().to_ascii_lowercase(),
            arg_types,
            return_type,
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for FnScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnScalarFunction")
            .field("name", &self.name)
            .field("arg_types", &self.arg_types)
            .field("return_type", &self.return_type)
            .finish()
    }
}

impl ScalarFunction for FnScalarFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn arg_types(&self) -> &[DataType] {
        &self.arg_types
    }

    fn return_type(&self) -> DataType {
        self.return_type.clone()
    }

    fn invoke(&self, ctx: &FunctionContext, args: &[ArrayRef]) -> Result<ArrayRef> {
        (self.f)(ctx, args)
    }
}

type OverloadMap = HashMap<String, Vec<Arc<dyn ScalarFunction>>>;

/// Named overloads of scalar functions, shared by every query of a process.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<OverloadMap>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the builtin comparison, boolean and
    /// arithmetic functions.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        crate::builtins::register_builtins(&registry)?;
        Ok(registry)
    }

    /// Add an overload.
    ///
    /// # Errors
    /// `AlreadyExists` when an overload with the same name and argument types
    /// is already registered.
    pub fn register(&self, function: Arc<dyn ScalarFunction>) -> Result<()> {
        let name = function.name().to_ascii_lowercase();
        let mut functions = self
            .functions
            .write()
            .expect("function registry lock poisoned");
        let overloads = functions.entry(name.clone()).or_default();
        if overloads
            .iter()
            .any(|f| f.arg_types() == function.arg_types())
        {
            return Err(RillError::AlreadyExists(format!(
                "function {name}({}) is already registered",
                format_types(function.arg_types())
            )));
        }
        overloads.push(function);
        Ok(())
    }

    /// Exact-signature lookup.
    pub fn lookup(&self, name: &str, arg_types: &[DataType]) -> Result<Arc<dyn ScalarFunction>> {
        let name = name.to_ascii_lowercase();
        self.functions
            .read()
            .expect("function registry lock poisoned")
            .get(&name)
            .and_then(|overloads| overloads.iter().find(|f| f.arg_types() == arg_types))
            .cloned()
            .ok_or_else(|| {
                RillError::NotFound(format!(
                    "no function {name}({}) is registered",
                    format_types(arg_types)
                ))
            })
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .functions
            .read()
            .expect("function registry lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("names", &self.names())
            .finish()
    }
}

pub(crate) fn format_types(types: &[DataType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
