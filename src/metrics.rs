//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use objpool::{Pool, PoolConfig};
///
/// let pool = Pool::from_fn(|| 0u32, PoolConfig::new().with_min_idle(1)).unwrap();
///
/// let obj = pool.get_object().unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_borrowed, 1);
/// assert_eq!(metrics.active_objects, 1);
/// pool.return_object(obj).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolMetrics {
    /// Objects created by the factory
    pub total_created: usize,

    /// Objects destroyed, for any reason
    pub total_destroyed: usize,

    /// Successful checkouts
    pub total_borrowed: usize,

    /// Objects put back into the idle queue
    pub total_returned: usize,

    /// Objects removed by the idle sweep
    pub total_evicted: usize,

    /// Acquisitions that failed with no idle space
    pub exhausted_events: usize,

    /// Factory destroy hooks that reported an error
    pub destroy_failures: usize,

    /// Objects currently checked out
    pub active_objects: usize,

    /// Objects currently idle
    pub idle_objects: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum pool capacity
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_evicted".to_string(), self.total_evicted.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("destroy_failures".to_string(), self.destroy_failures.to_string());
        metrics.insert("active_objects".to_string(), self.active_objects.to_string());
        metrics.insert("idle_objects".to_string(), self.idle_objects.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use objpool::{Pool, PoolConfig};
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::from_fn(String::new, PoolConfig::default()).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("buffers", Some(&tags));
    /// assert!(output.contains("objpool_objects_idle{pool=\"buffers\",service=\"api\"} 2"));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("objpool_objects_active", "Objects currently checked out", metrics.active_objects as f64),
            ("objpool_objects_idle", "Objects currently idle", metrics.idle_objects as f64),
            ("objpool_capacity", "Maximum number of live objects", metrics.capacity as f64),
        ];
        for (name, help, value) in gauges {
            Self::write_metric(&mut output, name, help, "gauge", &labels, &value.to_string());
        }
        Self::write_metric(
            &mut output,
            "objpool_utilization",
            "Pool utilization ratio",
            "gauge",
            &labels,
            &format!("{:.2}", metrics.utilization),
        );

        let counters = [
            ("objpool_objects_created_total", "Objects created", metrics.total_created),
            ("objpool_objects_destroyed_total", "Objects destroyed", metrics.total_destroyed),
            ("objpool_objects_borrowed_total", "Objects checked out", metrics.total_borrowed),
            ("objpool_objects_returned_total", "Objects returned to the idle queue", metrics.total_returned),
            ("objpool_objects_evicted_total", "Objects evicted by the idle sweep", metrics.total_evicted),
            ("objpool_events_exhausted_total", "Acquisitions that found no idle space", metrics.exhausted_events),
            ("objpool_destroy_failures_total", "Failed destroy hooks", metrics.destroy_failures),
        ];
        for (name, help, value) in counters {
            Self::write_metric(&mut output, name, help, "counter", &labels, &value.to_string());
        }

        output
    }

    fn write_metric(output: &mut String, name: &str, help: &str, kind: &str, labels: &str, value: &str) {
        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} {}", name, kind);
        let _ = writeln!(output, "{}{{{}}} {}", name, labels, value);
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub borrowed: AtomicUsize,
    pub returned: AtomicUsize,
    pub evicted: AtomicUsize,
    pub exhausted: AtomicUsize,
    pub destroy_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active: usize, idle: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: self.created.load(Ordering::Relaxed),
            total_destroyed: self.destroyed.load(Ordering::Relaxed),
            total_borrowed: self.borrowed.load(Ordering::Relaxed),
            total_returned: self.returned.load(Ordering::Relaxed),
            total_evicted: self.evicted.load(Ordering::Relaxed),
            exhausted_events: self.exhausted.load(Ordering::Relaxed),
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
            active_objects: active,
            idle_objects: idle,
            utilization,
            capacity,
        }
    }
}
