use std::thread;
use std::time::Duration;

use rill_common::Result;
use rill_execution::{BatchGenerator, RowBatch, RowDescriptor};
use tracing::trace;

use crate::source::MetricSource;

/// Polls a [`MetricSource`] a fixed number of times as a graph source.
///
/// Every poll is its own window; the last one also ends the stream.
pub struct MetricSourceGenerator {
    source: Box<dyn MetricSource>,
    polls: usize,
    emitted: usize,
    interval: Option<Duration>,
}

impl MetricSourceGenerator {
    pub fn new(source: Box<dyn MetricSource>, polls: usize) -> Self {
        Self {
            source,
            polls,
            emitted: 0,
            interval: None,
        }
    }

    /// Sleep `interval` between two polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn remaining(&self) -> usize {
        self.polls - self.emitted
    }
}

impl BatchGenerator for MetricSourceGenerator {
    fn descriptor(&self) -> RowDescriptor {
        self.source.descriptor()
    }

    fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        if self.emitted >= self.polls {
            return Ok(None);
        }
        if self.emitted > 0 {
            if let Some(interval) = self.interval {
                thread::sleep(interval);
            }
        }
        let batch = self.source.poll()?;
        self.emitted += 1;
        let last = self.emitted == self.polls;
        trace!(
            source = self.source.name(),
            poll = self.emitted,
            rows = batch.num_rows(),
            "metric source polled"
        );
        Ok(Some(batch.with_flags(true, last)))
    }
}
