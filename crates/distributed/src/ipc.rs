//! Arrow IPC stream encoding of row batches.
//!
//! Flow flags are not part of the payload; they travel next to it in the
//! envelope.

use std::io::Cursor;

use rill_common::{Result, RillError};
use rill_execution::RowBatch;

/// Encode one batch as a single-message Arrow IPC stream.
pub fn encode_row_batch(batch: &RowBatch) -> Result<Vec<u8>> {
    let rb = batch.to_record_batch()?;
    let mut out = Vec::<u8>::new();
    {
        let mut writer = arrow::ipc::writer::StreamWriter::try_new(&mut out, rb.schema().as_ref())
            .map_err(|e| RillError::Execution(format!("ipc writer init failed: {e}")))?;
        writer
            .write(&rb)
            .map_err(|e| RillError::Execution(format!("ipc write failed: {e}")))?;
        writer
            .finish()
            .map_err(|e| RillError::Execution(format!("ipc finish failed: {e}")))?;
    }
    Ok(out)
}

/// Decode a payload produced by [`encode_row_batch`] and set the given flags.
pub fn decode_row_batch(bytes: &[u8], end_of_window: bool, end_of_stream: bool) -> Result<RowBatch> {
    let reader = arrow::ipc::reader::StreamReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| RillError::InvalidArgument(format!("ipc reader init failed: {e}")))?;
    let mut batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RillError::InvalidArgument(format!("ipc read failed: {e}")))?;
    if batches.len() != 1 {
        return Err(RillError::InvalidArgument(format!(
            "expected one batch in ipc payload, found {}",
            batches.len()
        )));
    }
    let rb = batches.remove(0);
    RowBatch::from_record_batch(&rb, end_of_window, end_of_stream)
}
