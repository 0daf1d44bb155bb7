//! Typed row batches and their descriptors.
//!
//! A [`RowBatch`] is the unit of data exchange between operators: equal-length
//! Arrow columns addressed by position, plus the end-of-window / end-of-stream
//! flow flags. Column names are resolved upstream and never reach this layer.

use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, new_empty_array};
use arrow::compute::filter;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_schema::{DataType, Field, Schema};
use rill_common::{Result, RillError};
use serde::{Deserialize, Serialize};

/// Ordered, immutable list of column value types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowDescriptor {
    types: Vec<DataType>,
}

impl RowDescriptor {
    pub fn new(types: Vec<DataType>) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn type_at(&self, index: usize) -> Option<&DataType> {
        self.types.get(index)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Two descriptors can exchange batches iff their type sequences match exactly.
    pub fn is_compatible(&self, other: &RowDescriptor) -> bool {
        self.types == other.types
    }
}

impl From<Vec<DataType>> for RowDescriptor {
    fn from(types: Vec<DataType>) -> Self {
        Self::new(types)
    }
}

impl fmt::Display for RowDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, t) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, "]")
    }
}

/// Equal-length typed columns plus flow-control flags.
///
/// Invariants, checked at construction and after every mutation:
/// - every column holds exactly `num_rows` values;
/// - column `i` has type `descriptor.types()[i]`;
/// - a batch never holds more columns than its descriptor.
///
/// A batch is *complete* once it holds one column per descriptor entry; only
/// complete batches may be pushed into a node.
#[derive(Debug, Clone)]
pub struct RowBatch {
    descriptor: RowDescriptor,
    num_rows: usize,
    columns: Vec<ArrayRef>,
    end_of_window: bool,
    end_of_stream: bool,
}

impl RowBatch {
    /// Build a complete batch in one step.
    ///
    /// # Errors
    /// `InvalidArgument` when the column count, a column length or a column type
    /// disagrees with `descriptor` / `num_rows`.
    pub fn try_new(
        descriptor: RowDescriptor,
        num_rows: usize,
        columns: Vec<ArrayRef>,
        end_of_window: bool,
        end_of_stream: bool,
    ) -> Result<Self> {
        if columns.len() != descriptor.len() {
            return Err(RillError::InvalidArgument(format!(
                "batch has {} columns, descriptor {descriptor} expects {}",
                columns.len(),
                descriptor.len()
            )));
        }
        let mut batch = Self::with_capacity(descriptor, num_rows, end_of_window, end_of_stream);
        for col in columns {
            batch.add_column(col)?;
        }
        Ok(batch)
    }

    /// Start an incomplete batch; fill it with [`RowBatch::add_column`].
    pub fn with_capacity(
        descriptor: RowDescriptor,
        num_rows: usize,
        end_of_window: bool,
        end_of_stream: bool,
    ) -> Self {
        let columns = Vec::with_capacity(descriptor.len());
        Self {
            descriptor,
            num_rows,
            columns,
            end_of_window,
            end_of_stream,
        }
    }

    /// Complete zero-row batch, typically a terminal batch carrying only flags.
    pub fn empty(descriptor: RowDescriptor, end_of_window: bool, end_of_stream: bool) -> Self {
        let columns = descriptor.types().iter().map(new_empty_array).collect();
        Self {
            descriptor,
            num_rows: 0,
            columns,
            end_of_window,
            end_of_stream,
        }
    }

    /// Append the next column.
    ///
    /// # Errors
    /// `InvalidArgument` if the batch is already complete, or the column's
    /// length or type does not match.
    pub fn add_column(&mut self, column: ArrayRef) -> Result<()> {
        let idx = self.columns.len();
        let expected = self.descriptor.type_at(idx).ok_or_else(|| {
            RillError::InvalidArgument(format!(
                "cannot add column {idx}: batch with descriptor {} is already complete",
                self.descriptor
            ))
        })?;
        if column.len() != self.num_rows {
            return Err(RillError::InvalidArgument(format!(
                "column {idx} has {} rows, batch expects {}",
                column.len(),
                self.num_rows
            )));
        }
        if column.data_type() != expected {
            return Err(RillError::InvalidArgument(format!(
                "column {idx} has type {}, descriptor expects {expected}",
                column.data_type()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.columns.len() == self.descriptor.len()
    }

    pub fn descriptor(&self) -> &RowDescriptor {
        &self.descriptor
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column at `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds, like [`RecordBatch::column`].
    pub fn column(&self, index: usize) -> &ArrayRef {
        &self.columns[index]
    }

    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    pub fn end_of_window(&self) -> bool {
        self.end_of_window
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Same data, new flags.
    pub fn with_flags(mut self, end_of_window: bool, end_of_stream: bool) -> Self {
        self.end_of_window = end_of_window;
        self.end_of_stream = end_of_stream;
        self
    }

    /// Zero-copy view of `len` rows starting at `offset`. Flags are carried
    /// over unchanged.
    pub fn slice(&self, offset: usize, len: usize) -> Result<RowBatch> {
        if offset.checked_add(len).map_or(true, |end| end > self.num_rows) {
            return Err(RillError::InvalidArgument(format!(
                "slice {offset}+{len} out of range for {} rows",
                self.num_rows
            )));
        }
        Ok(RowBatch {
            descriptor: self.descriptor.clone(),
            num_rows: len,
            columns: self.columns.iter().map(|c| c.slice(offset, len)).collect(),
            end_of_window: self.end_of_window,
            end_of_stream: self.end_of_stream,
        })
    }

    /// Keep rows whose `mask` bit is set, in original order. Null mask bits drop
    /// the row. Flags are carried over unchanged.
    pub fn filter(&self, mask: &BooleanArray) -> Result<RowBatch> {
        if mask.len() != self.num_rows {
            return Err(RillError::InvalidArgument(format!(
                "selection vector has {} entries, batch has {} rows",
                mask.len(),
                self.num_rows
            )));
        }
        let selected = mask.true_count();
        let columns = self
            .columns
            .iter()
            .map(|c| {
                filter(c.as_ref(), mask)
                    .map_err(|e| RillError::Execution(format!("filter kernel failed: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        RowBatch::try_new(
            self.descriptor.clone(),
            selected,
            columns,
            self.end_of_window,
            self.end_of_stream,
        )
    }

    /// Convert to an Arrow record batch with synthetic `col{i}` field names.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        if !self.is_complete() {
            return Err(RillError::InvalidArgument(
                "cannot convert an incomplete batch".to_string(),
            ));
        }
        let fields = self
            .descriptor
            .types()
            .iter()
            .enumerate()
            .map(|(i, t)| Field::new(format!("col{i}"), t.clone(), true))
            .collect::<Vec<_>>();
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows));
        RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            self.columns.clone(),
            &options,
        )
        .map_err(|e| RillError::Execution(format!("record batch build failed: {e}")))
    }

    /// Wrap an Arrow record batch; the descriptor is taken from its schema.
    pub fn from_record_batch(
        batch: &RecordBatch,
        end_of_window: bool,
        end_of_stream: bool,
    ) -> Result<RowBatch> {
        let descriptor = RowDescriptor::new(
            batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.data_type().clone())
                .collect(),
        );
        RowBatch::try_new(
            descriptor,
            batch.num_rows(),
            batch.columns().to_vec(),
            end_of_window,
            end_of_stream,
        )
    }
}

impl PartialEq for RowBatch {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && self.num_rows == other.num_rows
            && self.end_of_window == other.end_of_window
            && self.end_of_stream == other.end_of_stream
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.to_data() == b.to_data())
    }
}
