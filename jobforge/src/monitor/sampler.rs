//! System resource sampling.
//!
//! On Linux, CPU utilization comes from busy/total deltas between
//! successive `/proc/stat` readings and memory utilization from
//! `/proc/meminfo`. Other platforms return no samples; the sampling loop
//! simply skips its pass.

use std::sync::Mutex;

/// One system resource sample, both values in percent (0–100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSample {
    /// CPU busy percentage since the previous sample.
    pub cpu_usage: f64,
    /// Memory in use as a percentage of total.
    pub memory_usage: f64,
}

/// Stateful sampler; keeps the previous CPU counters so utilization can be
/// computed as a delta.
pub struct SystemSampler {
    last_cpu: Mutex<Option<CpuTimes>>,
}

#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl SystemSampler {
    /// Creates a sampler with no baseline yet.
    pub fn new() -> Self {
        Self {
            last_cpu: Mutex::new(None),
        }
    }

    /// Takes a sample.
    ///
    /// Returns `None` on the first call (CPU deltas need a baseline) and on
    /// platforms without `/proc`.
    pub fn sample(&self) -> Option<SystemSample> {
        let current = read_cpu_times()?;
        let memory_usage = read_memory_usage()?;

        let mut last = self.last_cpu.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last.replace(current);
        let previous = previous?;

        let total_delta = current.total.saturating_sub(previous.total);
        if total_delta == 0 {
            return None;
        }
        let busy_delta = current.busy.saturating_sub(previous.busy);
        let cpu_usage = (busy_delta as f64 / total_delta as f64 * 100.0).clamp(0.0, 100.0);

        Some(SystemSample {
            cpu_usage,
            memory_usage,
        })
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat` into busy/total jiffies.
#[cfg(target_os = "linux")]
fn read_cpu_times() -> Option<CpuTimes> {
    let content = std::fs::read_to_string("/proc/stat").ok()?;
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }

    // user nice system idle iowait irq softirq steal ...
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().sum();
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_times() -> Option<CpuTimes> {
    tracing::debug!("CPU sampling unsupported on this platform");
    None
}

/// Parses `/proc/meminfo` into a used-memory percentage.
#[cfg(target_os = "linux")]
fn read_memory_usage() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;

    let field = |name: &str| -> Option<u64> {
        content
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
    };

    let total = field("MemTotal:")?;
    if total == 0 {
        return None;
    }
    let available = field("MemAvailable:").unwrap_or(0);
    let used = total.saturating_sub(available);
    Some((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

#[cfg(not(target_os = "linux"))]
fn read_memory_usage() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_has_no_baseline() {
        let sampler = SystemSampler::new();
        // First call establishes the CPU baseline (or the platform has no
        // /proc at all); either way no sample is produced yet.
        let _ = sampler.sample();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_second_sample_in_range() {
        let sampler = SystemSampler::new();
        let _ = sampler.sample();
        std::thread::sleep(std::time::Duration::from_millis(50));

        if let Some(sample) = sampler.sample() {
            assert!((0.0..=100.0).contains(&sample.cpu_usage));
            assert!((0.0..=100.0).contains(&sample.memory_usage));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_memory_usage() {
        if let Some(usage) = read_memory_usage() {
            assert!((0.0..=100.0).contains(&usage));
        }
    }
}
