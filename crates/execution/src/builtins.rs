//! Builtin scalar functions backed by Arrow compute kernels.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Datum};
use arrow::compute::kernels::{
    boolean::{and_kleene, not, or_kleene},
    cmp::{eq, gt, gt_eq, lt, lt_eq, neq},
    numeric::{add, mul, sub},
};
use arrow::error::ArrowError;
use arrow_schema::DataType;
use rill_common::{Result, RillError};

use crate::udf::{FnScalarFunction, FunctionRegistry};

type CmpKernel = fn(&dyn Datum, &dyn Datum) -> std::result::Result<BooleanArray, ArrowError>;
type ArithKernel = fn(&dyn Datum, &dyn Datum) -> std::result::Result<ArrayRef, ArrowError>;
type BoolKernel = fn(&BooleanArray, &BooleanArray) -> std::result::Result<BooleanArray, ArrowError>;

/// Register `eq ne lt le gt ge`, `and or not` and `add subtract multiply`.
pub fn register_builtins(registry: &FunctionRegistry) -> Result<()> {
    let cmp: [(&str, CmpKernel); 6] = [
        ("eq", eq),
        ("ne", neq),
        ("lt", lt),
        ("le", lt_eq),
        ("gt", gt),
        ("ge", gt_eq),
    ];
    for (name, kernel) in cmp {
        let mut types = vec![DataType::Int64, DataType::Float64, DataType::Utf8];
        if name == "eq" || name == "ne" {
            types.push(DataType::Boolean);
        }
        for t in types {
            registry.register(Arc::new(FnScalarFunction::new(
                name,
                vec![t.clone(), t],
                DataType::Boolean,
                move |_, args| {
                    check_arity(name, args, 2)?;
                    let out = kernel(&args[0], &args[1])
                        .map_err(|e| RillError::Execution(format!("{name} failed: {e}")))?;
                    Ok(Arc::new(out) as ArrayRef)
                },
            )))?;
        }
    }

    let arith: [(&str, ArithKernel); 3] = [("add", add), ("subtract", sub), ("multiply", mul)];
    for (name, kernel) in arith {
        for t in [DataType::Int64, DataType::Float64] {
            registry.register(Arc::new(FnScalarFunction::new(
                name,
                vec![t.clone(), t.clone()],
                t,
                move |_, args| {
                    check_arity(name, args, 2)?;
                    kernel(&args[0], &args[1])
                        .map_err(|e| RillError::Execution(format!("{name} failed: {e}")))
                },
            )))?;
        }
    }

    let logic: [(&str, BoolKernel); 2] = [("and", and_kleene), ("or", or_kleene)];
    for (name, kleene) in logic {
        registry.register(Arc::new(FnScalarFunction::new(
            name,
            vec![DataType::Boolean, DataType::Boolean],
            DataType::Boolean,
            move |_, args| {
                check_arity(name, args, 2)?;
                let out = kleene(as_bool(name, &args[0])?, as_bool(name, &args[1])?)
                    .map_err(|e| RillError::Execution(format!("{name} failed: {e}")))?;
                Ok(Arc::new(out) as ArrayRef)
            },
        )))?;
    }

    registry.register(Arc::new(FnScalarFunction::new(
        "not",
        vec![DataType::Boolean],
        DataType::Boolean,
        |_, args| {
            check_arity("not", args, 1)?;
            let out = not(as_bool("not", &args[0])?)
                .map_err(|e| RillError::Execution(format!("not failed: {e}")))?;
            Ok(Arc::new(out) as ArrayRef)
        },
    )))?;

    Ok(())
}

fn check_arity(name: &str, args: &[ArrayRef], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(RillError::InvalidArgument(format!(
            "{name} expects {expected} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn as_bool<'a>(name: &str, arr: &'a ArrayRef) -> Result<&'a BooleanArray> {
    arr.as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| {
            RillError::InvalidArgument(format!(
                "{name} expects boolean input, got {}",
                arr.data_type()
            ))
        })
}
