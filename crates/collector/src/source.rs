use rill_common::Result;
use rill_execution::{RowBatch, RowDescriptor};

/// A pollable producer of metric rows.
///
/// Every `poll` returns one complete batch shaped like `descriptor()`, with
/// both flow flags cleared. Callers decide where windows and streams end.
pub trait MetricSource: Send {
    fn name(&self) -> &str;
    fn descriptor(&self) -> RowDescriptor;
    fn poll(&mut self) -> Result<RowBatch>;
}
