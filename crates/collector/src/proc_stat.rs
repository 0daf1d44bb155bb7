use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::{ArrayRef, Float64Array, TimestampNanosecondArray};
use arrow_schema::{DataType, TimeUnit};
use rill_common::{Result, RillError};
use rill_execution::{RowBatch, RowDescriptor};
use tracing::debug;

use crate::source::MetricSource;

/// Counters on the aggregate `cpu` line, after the label.
const CPU_STAT_FIELDS: usize = 10;
const USER_IDX: usize = 0;
const IDLE_IDX: usize = 3;
const IOWAIT_IDX: usize = 4;

/// Cumulative jiffies from one read of the aggregate `cpu` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    /// idle + iowait
    pub idle: u64,
    /// Everything that is neither user nor idle.
    pub system: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Parse a `cpu  user nice system idle iowait irq softirq steal guest guest_nice` line.
    ///
    /// # Errors
    /// `InvalidArgument` unless the line is labelled `cpu` and carries exactly
    /// ten unsigned counters.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("cpu") => {}
            Some(other) => {
                return Err(RillError::InvalidArgument(format!(
                    "proc stat line starts with '{other}', expected 'cpu'"
                )));
            }
            None => {
                return Err(RillError::InvalidArgument(
                    "proc stat returned no data".to_string(),
                ));
            }
        }
        let fields = parts
            .map(|p| {
                p.parse::<u64>().map_err(|e| {
                    RillError::InvalidArgument(format!("proc stat field '{p}' is not a counter: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if fields.len() != CPU_STAT_FIELDS {
            return Err(RillError::InvalidArgument(format!(
                "proc stat cpu line has {} fields, expected {CPU_STAT_FIELDS}",
                fields.len()
            )));
        }
        let total = fields
            .iter()
            .try_fold(0u64, |acc, &v| acc.checked_add(v))
            .ok_or_else(|| RillError::InvalidArgument("proc stat counters overflow".to_string()))?;
        let user = fields[USER_IDX];
        let idle = fields[IDLE_IDX] + fields[IOWAIT_IDX];
        Ok(Self {
            user,
            idle,
            system: total - user - idle,
            total,
        })
    }

    /// Percentages of the interval between `prev` and `self`.
    /// A zero-length interval reports 0% everywhere.
    pub fn usage_since(&self, prev: &CpuTimes, timestamp_ns: i64) -> CpuUsage {
        let delta_total = self.total as f64 - prev.total as f64;
        let percent = |now: u64, before: u64| {
            if delta_total == 0.0 {
                0.0
            } else {
                (now as f64 - before as f64) * 100.0 / delta_total
            }
        };
        CpuUsage {
            timestamp_ns,
            system_percent: percent(self.system, prev.system),
            user_percent: percent(self.user, prev.user),
            idle_percent: percent(self.idle, prev.idle),
        }
    }
}

/// One CPU usage sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuUsage {
    /// Wall-clock nanoseconds since the unix epoch.
    pub timestamp_ns: i64,
    pub system_percent: f64,
    pub user_percent: f64,
    pub idle_percent: f64,
}

/// CPU usage from the first line of `/proc/stat`.
///
/// Construction takes a baseline reading, so the first poll reports usage
/// since the source was created.
#[derive(Debug)]
pub struct ProcStatSource {
    path: PathBuf,
    prev: CpuTimes,
}

impl ProcStatSource {
    /// # Errors
    /// `NotFound` if `path` cannot be read, `InvalidArgument` if its first line
    /// is malformed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let prev = read_cpu_times(&path)?;
        debug!(path = %path.display(), total = prev.total, "proc stat baseline read");
        Ok(Self { path, prev })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the counters again and report usage since the previous read.
    pub fn poll_usage(&mut self) -> Result<CpuUsage> {
        let now = read_cpu_times(&self.path)?;
        let usage = now.usage_since(&self.prev, now_ns()?);
        self.prev = now;
        Ok(usage)
    }

    pub fn usage_descriptor() -> RowDescriptor {
        RowDescriptor::new(vec![
            DataType::Timestamp(TimeUnit::Nanosecond, None),
            DataType::Float64,
            DataType::Float64,
            DataType::Float64,
        ])
    }
}

impl MetricSource for ProcStatSource {
    fn name(&self) -> &str {
        "proc_stat"
    }

    fn descriptor(&self) -> RowDescriptor {
        Self::usage_descriptor()
    }

    fn poll(&mut self) -> Result<RowBatch> {
        let usage = self.poll_usage()?;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampNanosecondArray::from(vec![usage.timestamp_ns])),
            Arc::new(Float64Array::from(vec![usage.system_percent])),
            Arc::new(Float64Array::from(vec![usage.user_percent])),
            Arc::new(Float64Array::from(vec![usage.idle_percent])),
        ];
        RowBatch::try_new(Self::usage_descriptor(), 1, columns, false, false)
    }
}

fn read_cpu_times(path: &Path) -> Result<CpuTimes> {
    let content = fs::read_to_string(path).map_err(|e| {
        RillError::NotFound(format!("unable to read {}: {e}", path.display()))
    })?;
    CpuTimes::parse(content.lines().next().unwrap_or_default())
}

fn now_ns() -> Result<i64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| RillError::Execution(format!("system clock before unix epoch: {e}")))?;
    i64::try_from(since_epoch.as_nanos())
        .map_err(|_| RillError::Execution("timestamp overflows i64 nanoseconds".to_string()))
}

#[cfg(test)]
mod tests {
    use super::{CpuTimes, ProcStatSource};
    use rill_common::RillError;

    #[test]
    fn parses_user_idle_and_system() {
        let t = CpuTimes::parse("cpu  10 1 2 50 5 1 1 0 0 0").expect("parse");
        assert_eq!(t.user, 10);
        assert_eq!(t.idle, 55);
        assert_eq!(t.total, 70);
        assert_eq!(t.system, 5);
    }

    #[test]
    fn rejects_wrong_field_count_and_garbage() {
        for line in [
            "cpu 1 2 3",
            "cpu 1 2 3 4 5 6 7 8 9 10 11",
            "cpu 1 2 x 4 5 6 7 8 9 10",
            "cpu0 1 2 3 4 5 6 7 8 9 10",
            "",
        ] {
            let err = CpuTimes::parse(line).expect_err(line);
            assert!(matches!(err, RillError::InvalidArgument(_)), "{line}: {err}");
        }
    }

    #[test]
    fn zero_interval_reports_zero_percent() {
        let t = CpuTimes::parse("cpu 1 2 3 4 5 6 7 8 9 10").expect("parse");
        let usage = t.usage_since(&t, 7);
        assert_eq!(usage.timestamp_ns, 7);
        assert_eq!(usage.system_percent, 0.0);
        assert_eq!(usage.user_percent, 0.0);
        assert_eq!(usage.idle_percent, 0.0);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ProcStatSource::new("/nonexistent/rill/proc/stat").expect_err("missing");
        assert!(matches!(err, RillError::NotFound(_)));
    }
}
