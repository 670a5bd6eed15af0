//! One-hot status emission.

use std::collections::HashMap;
use std::sync::Mutex;

use prometheus::GaugeVec;

/// Fixed status enumeration published for pipelines and jobs.
pub const STATUSES: [&str; 7] = [
    "running", "pending", "success", "failed", "canceled", "skipped", "manual",
];

/// Last status published per label combination.
///
/// Statuses outside [`STATUSES`] (`created`, `preparing`, ...) are only
/// known through this memory, so it is what clears them once they are stale.
#[derive(Debug, Default)]
pub struct StatusMemory {
    last: Mutex<HashMap<Vec<String>, String>>,
}

impl StatusMemory {
    /// Record `current` for `base` and return the status it replaces, if any.
    pub fn replace(&self, base: &[&str], current: &str) -> Option<String> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let key: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        last.insert(key, current.to_string())
            .filter(|previous| previous != current)
    }
}

/// Set `current` to 1 for the label combination `base` and clear every other
/// enumerated status: zeroed in dense mode, removed from the registry in
/// sparse mode. A `previous` status outside the enumeration is removed in
/// both modes. `base` must hold every label except the trailing `status`.
pub fn emit_status(
    vec: &GaugeVec,
    base: &[&str],
    current: &str,
    previous: Option<&str>,
    sparse: bool,
) {
    let mut labels: Vec<&str> = Vec::with_capacity(base.len() + 1);
    labels.extend_from_slice(base);
    labels.push(current);

    for status in STATUSES {
        if status == current {
            continue;
        }
        if let Some(last) = labels.last_mut() {
            *last = status;
        }
        if sparse {
            // absent series are fine
            let _ = vec.remove_label_values(&labels);
        } else {
            vec.with_label_values(&labels).set(0.0);
        }
    }

    if let Some(previous) = previous.filter(|p| *p != current && !STATUSES.contains(p)) {
        if let Some(last) = labels.last_mut() {
            *last = previous;
        }
        let _ = vec.remove_label_values(&labels);
    }

    if let Some(last) = labels.last_mut() {
        *last = current;
    }
    vec.with_label_values(&labels).set(1.0);
}

#[cfg(test)]
mod tests {
    use prometheus::core::Collector;
    use prometheus::Opts;

    use super::*;

    fn status_vec() -> GaugeVec {
        GaugeVec::new(Opts::new("status", "test"), &["project", "ref", "status"]).unwrap()
    }

    fn value(vec: &GaugeVec, status: &str) -> Option<f64> {
        vec.get_metric_with_label_values(&["p", "main", status])
            .ok()
            .map(|g| g.get())
    }

    fn series_count(vec: &GaugeVec) -> usize {
        vec.collect().iter().map(|f| f.get_metric().len()).sum()
    }

    /// Statuses currently at 1, without creating any series.
    fn hot(vec: &GaugeVec) -> Vec<String> {
        vec.collect()
            .iter()
            .flat_map(|f| f.get_metric().iter())
            .filter(|m| m.get_gauge().get_value() == 1.0)
            .filter_map(|m| {
                m.get_label()
                    .iter()
                    .find(|l| l.get_name() == "status")
                    .map(|l| l.get_value().to_string())
            })
            .collect()
    }

    fn emit(vec: &GaugeVec, memory: &StatusMemory, status: &str, sparse: bool) {
        let previous = memory.replace(&["p", "main"], status);
        emit_status(vec, &["p", "main"], status, previous.as_deref(), sparse);
    }

    #[test]
    fn dense_zeroes_the_other_statuses() {
        let vec = status_vec();
        emit_status(&vec, &["p", "main"], "failed", None, false);
        assert_eq!(series_count(&vec), 7);
        assert_eq!(value(&vec, "failed"), Some(1.0));
        for s in STATUSES.iter().filter(|s| **s != "failed") {
            assert_eq!(value(&vec, s), Some(0.0), "status {s}");
        }
    }

    #[test]
    fn sparse_removes_the_other_statuses() {
        let vec = status_vec();
        emit_status(&vec, &["p", "main"], "failed", None, false);
        emit_status(&vec, &["p", "main"], "failed", None, true);
        assert_eq!(series_count(&vec), 1);
        assert_eq!(value(&vec, "failed"), Some(1.0));
    }

    #[test]
    fn transition_moves_the_hot_flag() {
        let vec = status_vec();
        emit_status(&vec, &["p", "main"], "running", None, false);
        emit_status(&vec, &["p", "main"], "success", Some("running"), false);
        assert_eq!(value(&vec, "running"), Some(0.0));
        assert_eq!(value(&vec, "success"), Some(1.0));
    }

    #[test]
    fn unlisted_status_is_hot_until_replaced() {
        for sparse in [false, true] {
            let vec = status_vec();
            let memory = StatusMemory::default();

            emit(&vec, &memory, "created", sparse);
            assert_eq!(hot(&vec), vec!["created".to_string()], "sparse={sparse}");

            emit(&vec, &memory, "running", sparse);
            assert_eq!(hot(&vec), vec!["running".to_string()], "sparse={sparse}");

            emit(&vec, &memory, "success", sparse);
            assert_eq!(hot(&vec), vec!["success".to_string()], "sparse={sparse}");

            let expected = if sparse { 1 } else { STATUSES.len() };
            assert_eq!(series_count(&vec), expected, "sparse={sparse}");
        }
    }

    #[test]
    fn unlisted_to_unlisted_keeps_one_hot() {
        let vec = status_vec();
        let memory = StatusMemory::default();
        emit(&vec, &memory, "created", false);
        emit(&vec, &memory, "waiting_for_resource", false);
        emit(&vec, &memory, "preparing", false);
        assert_eq!(hot(&vec), vec!["preparing".to_string()]);
        assert_eq!(series_count(&vec), STATUSES.len() + 1);
    }

    #[test]
    fn memory_reports_only_changes() {
        let memory = StatusMemory::default();
        assert_eq!(memory.replace(&["p", "main"], "created"), None);
        assert_eq!(memory.replace(&["p", "main"], "created"), None);
        assert_eq!(memory.replace(&["p", "main"], "running"), Some("created".to_string()));
        assert_eq!(memory.replace(&["p", "dev"], "running"), None);
    }
}
