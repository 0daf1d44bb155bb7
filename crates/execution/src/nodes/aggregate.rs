use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder,
};
use arrow_schema::DataType;
use rill_common::{Result, RillError};

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::plan::{AggregateExpr, AggregateFunction};
use crate::row_batch::{RowBatch, RowDescriptor};

/// Hashable group-key / min-max value. Floats hash by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Value {
    Null,
    Int64(i64),
    Float64Bits(u64),
    Utf8(String),
    Boolean(bool),
}

impl Value {
    fn read(arr: &ArrayRef, row: usize) -> Result<Value> {
        if arr.is_null(row) {
            return Ok(Value::Null);
        }
        Ok(match arr.data_type() {
            DataType::Int64 => Value::Int64(downcast::<Int64Array>(arr)?.value(row)),
            DataType::Float64 => Value::float(downcast::<Float64Array>(arr)?.value(row)),
            DataType::Utf8 => Value::Utf8(downcast::<StringArray>(arr)?.value(row).to_string()),
            DataType::Boolean => Value::Boolean(downcast::<BooleanArray>(arr)?.value(row)),
            other => {
                return Err(RillError::Execution(format!(
                    "unsupported aggregate value type {other}"
                )));
            }
        })
    }

    /// `-0.0` groups with `0.0` and every NaN with every other NaN.
    fn float(v: f64) -> Value {
        let v = if v == 0.0 {
            0.0
        } else if v.is_nan() {
            f64::NAN
        } else {
            v
        };
        Value::Float64Bits(v.to_bits())
    }

    /// `true` when `self` should replace `current` for min (`less`) or max.
    fn beats(&self, current: &Value, less: bool) -> bool {
        let ord = match (self, current) {
            (Value::Int64(a), Value::Int64(b)) => a.partial_cmp(b),
            (Value::Float64Bits(a), Value::Float64Bits(b)) => {
                f64::from_bits(*a).partial_cmp(&f64::from_bits(*b))
            }
            (Value::Utf8(a), Value::Utf8(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            _ => None,
        };
        match ord {
            Some(std::cmp::Ordering::Less) => less,
            Some(std::cmp::Ordering::Greater) => !less,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum AggState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Min(Option<Value>),
    Max(Option<Value>),
}

impl AggState {
    fn new(func: AggregateFunction, input: Option<&DataType>) -> Self {
        match (func, input) {
            (AggregateFunction::Count, _) => AggState::Count(0),
            (AggregateFunction::Sum, Some(DataType::Float64)) => AggState::SumFloat(None),
            (AggregateFunction::Sum, _) => AggState::SumInt(None),
            (AggregateFunction::Min, _) => AggState::Min(None),
            (AggregateFunction::Max, _) => AggState::Max(None),
        }
    }

    fn update(&mut self, column: Option<&ArrayRef>, row: usize) -> Result<()> {
        let Some(arr) = column else {
            if let AggState::Count(n) = self {
                *n += 1;
            }
            return Ok(());
        };
        if arr.is_null(row) {
            return Ok(());
        }
        match self {
            AggState::Count(n) => *n += 1,
            AggState::SumInt(acc) => {
                let v = downcast::<Int64Array>(arr)?.value(row);
                let next = acc.unwrap_or(0).checked_add(v).ok_or_else(|| {
                    RillError::Execution("sum overflowed Int64".to_string())
                })?;
                *acc = Some(next);
            }
            AggState::SumFloat(acc) => {
                *acc = Some(acc.unwrap_or(0.0) + downcast::<Float64Array>(arr)?.value(row));
            }
            AggState::Min(cur) => update_extreme(cur, arr, row, true)?,
            AggState::Max(cur) => update_extreme(cur, arr, row, false)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Accumulators {
    states: Vec<AggState>,
}

/// Blocking group-by over one input.
///
/// Groups accumulate until a batch carrying end-of-window or end-of-stream
/// arrives; then one batch of finalized groups (keys first, then aggregates,
/// in first-seen group order) is emitted and the state is reset.
pub struct AggregateNode {
    group_by: Vec<usize>,
    aggregates: Vec<AggregateExpr>,
    input_types: Vec<DataType>,
    groups: HashMap<Vec<Value>, usize>,
    order: Vec<(Vec<Value>, Accumulators)>,
}

impl AggregateNode {
    pub fn new(group_by: Vec<usize>, aggregates: Vec<AggregateExpr>) -> Self {
        Self {
            group_by,
            aggregates,
            input_types: Vec::new(),
            groups: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn output_descriptor(&self, input: &RowDescriptor) -> Result<RowDescriptor> {
        let mut types = Vec::with_capacity(self.group_by.len() + self.aggregates.len());
        for &idx in &self.group_by {
            let t = input.type_at(idx).ok_or_else(|| {
                RillError::InvalidArgument(format!("group key {idx} out of range for {input}"))
            })?;
            if !matches!(
                t,
                DataType::Int64 | DataType::Float64 | DataType::Utf8 | DataType::Boolean
            ) {
                return Err(RillError::InvalidArgument(format!(
                    "group key {idx} has unsupported type {t}"
                )));
            }
            types.push(t.clone());
        }
        for agg in &self.aggregates {
            let input_type = match agg.column {
                Some(idx) => Some(input.type_at(idx).ok_or_else(|| {
                    RillError::InvalidArgument(format!(
                        "{} argument {idx} out of range for {input}",
                        agg.func.name()
                    ))
                })?),
                None => None,
            };
            let out = match (agg.func, input_type) {
                (AggregateFunction::Count, _) => DataType::Int64,
                (AggregateFunction::Sum, Some(t @ (DataType::Int64 | DataType::Float64))) => {
                    t.clone()
                }
                (
                    AggregateFunction::Min | AggregateFunction::Max,
                    Some(
                        t @ (DataType::Int64 | DataType::Float64 | DataType::Utf8 | DataType::Boolean),
                    ),
                ) => t.clone(),
                (func, Some(t)) => {
                    return Err(RillError::InvalidArgument(format!(
                        "{} does not support {t}",
                        func.name()
                    )));
                }
                (func, None) => {
                    return Err(RillError::InvalidArgument(format!(
                        "{} requires an argument column",
                        func.name()
                    )));
                }
            };
            types.push(out);
        }
        Ok(RowDescriptor::new(types))
    }

    fn new_accumulators(&self) -> Accumulators {
        Accumulators {
            states: self
                .aggregates
                .iter()
                .map(|a| AggState::new(a.func, a.column.and_then(|c| self.input_types.get(c))))
                .collect(),
        }
    }

    fn accumulate(&mut self, batch: &RowBatch) -> Result<()> {
        for row in 0..batch.num_rows() {
            let key = self
                .group_by
                .iter()
                .map(|&idx| Value::read(batch.column(idx), row))
                .collect::<Result<Vec<_>>>()?;
            let slot = match self.groups.get(&key) {
                Some(&slot) => slot,
                None => {
                    let slot = self.order.len();
                    let acc = self.new_accumulators();
                    self.groups.insert(key.clone(), slot);
                    self.order.push((key, acc));
                    slot
                }
            };
            let acc = &mut self.order[slot].1;
            for (state, agg) in acc.states.iter_mut().zip(&self.aggregates) {
                state.update(agg.column.map(|c| batch.column(c)), row)?;
            }
        }
        Ok(())
    }

    fn finish_window(&mut self, ctx: &NodeContext, end_of_stream: bool) -> Result<RowBatch> {
        if self.order.is_empty() && self.group_by.is_empty() {
            let acc = self.new_accumulators();
            self.order.push((Vec::new(), acc));
        }
        let groups = std::mem::take(&mut self.order);
        self.groups.clear();

        let out = &ctx.output_descriptor;
        let mut columns = Vec::with_capacity(out.len());
        for (k, _) in self.group_by.iter().enumerate() {
            let values = groups.iter().map(|(key, _)| &key[k]);
            columns.push(build_values(&out.types()[k], values)?);
        }
        for a in 0..self.aggregates.len() {
            let t = &out.types()[self.group_by.len() + a];
            let states = groups.iter().map(|(_, acc)| &acc.states[a]);
            columns.push(build_states(t, states)?);
        }
        RowBatch::try_new(out.clone(), groups.len(), columns, true, end_of_stream)
    }
}

impl ExecNode for AggregateNode {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn init(&mut self, ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        ctx.expect_inputs(self.name(), 1)?;
        let produced = self.output_descriptor(&ctx.input_descriptors[0])?;
        ctx.expect_output(self.name(), &produced)?;
        self.input_types = ctx.input_descriptors[0].types().to_vec();
        Ok(())
    }

    fn open(&mut self, _ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        self.groups.clear();
        self.order.clear();
        Ok(())
    }

    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        _state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        self.accumulate(&batch)?;
        if batch.end_of_window() || batch.end_of_stream() {
            return self.finish_window(ctx, batch.end_of_stream()).map(Some);
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.groups.clear();
        self.order.clear();
        Ok(())
    }
}

fn update_extreme(cur: &mut Option<Value>, arr: &ArrayRef, row: usize, less: bool) -> Result<()> {
    let v = Value::read(arr, row)?;
    let replace = match cur.as_ref() {
        None => true,
        Some(c) => v.beats(c, less),
    };
    if replace {
        *cur = Some(v);
    }
    Ok(())
}

fn downcast<T: 'static>(arr: &ArrayRef) -> Result<&T> {
    arr.as_any().downcast_ref::<T>().ok_or_else(|| {
        RillError::Execution(format!("unexpected array type {}", arr.data_type()))
    })
}

fn build_values<'a>(t: &DataType, values: impl Iterator<Item = &'a Value>) -> Result<ArrayRef> {
    Ok(match t {
        DataType::Int64 => {
            let mut b = Int64Builder::new();
            for v in values {
                match v {
                    Value::Int64(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Float64 => {
            let mut b = Float64Builder::new();
            for v in values {
                match v {
                    Value::Float64Bits(x) => b.append_value(f64::from_bits(*x)),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Utf8 => {
            let mut b = StringBuilder::new();
            for v in values {
                match v {
                    Value::Utf8(x) => b.append_value(x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::new();
            for v in values {
                match v {
                    Value::Boolean(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        other => {
            return Err(RillError::Execution(format!(
                "cannot build aggregate column of type {other}"
            )));
        }
    })
}

fn build_states<'a>(
    t: &DataType,
    states: impl Iterator<Item = &'a AggState>,
) -> Result<ArrayRef> {
    let states = states.collect::<Vec<_>>();
    match t {
        DataType::Int64
            if states
                .iter()
                .all(|s| matches!(s, AggState::Count(_) | AggState::SumInt(_))) =>
        {
            let mut b = Int64Builder::with_capacity(states.len());
            for s in states {
                match s {
                    AggState::Count(n) => b.append_value(*n),
                    AggState::SumInt(v) => b.append_option(*v),
                    _ => b.append_null(),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Float64 if states.iter().all(|s| matches!(s, AggState::SumFloat(_))) => {
            let mut b = Float64Builder::with_capacity(states.len());
            for s in states {
                if let AggState::SumFloat(v) = s {
                    b.append_option(*v);
                }
            }
            Ok(Arc::new(b.finish()))
        }
        _ => {
            let null = Value::Null;
            build_values(
                t,
                states.into_iter().map(|s| match s {
                    AggState::Min(Some(v)) | AggState::Max(Some(v)) => v,
                    _ => &null,
                }),
            )
        }
    }
}
