use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dag::Dag;
use crate::error::{Result, SimError};
use crate::metrics::MetricsSnapshot;

/// Cluster resource currently in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utilization {
    pub cpus: i64,
    pub ram: i64,
}

/// Append-only log of deep-copied simulation snapshots keyed by clock time.
/// A snapshot is recorded at `t = -1` before the first round runs, then once
/// per completed round thereafter, so a UI can scrub through the run.
#[derive(Debug, Default)]
pub struct History {
    messages: BTreeMap<i64, Vec<String>>,
    dags: BTreeMap<i64, IndexMap<String, Dag>>,
    utilization: BTreeMap<i64, Utilization>,
    metrics: BTreeMap<i64, MetricsSnapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(
        &mut self,
        t: i64,
        messages: Vec<String>,
        dags: IndexMap<String, Dag>,
        utilization: Utilization,
        metrics: MetricsSnapshot,
    ) {
        self.messages.insert(t, messages);
        self.dags.insert(t, dags);
        self.utilization.insert(t, utilization);
        self.metrics.insert(t, metrics);
    }

    pub fn get(&self, t: i64) -> Result<(&[String], &IndexMap<String, Dag>, Utilization)> {
        let messages = self.messages.get(&t).ok_or(SimError::TimeNotFound(t))?;
        let dags = self.dags.get(&t).ok_or(SimError::TimeNotFound(t))?;
        let utilization = *self.utilization.get(&t).ok_or(SimError::TimeNotFound(t))?;
        Ok((messages, dags, utilization))
    }

    pub fn metrics(&self, t: i64) -> Result<&MetricsSnapshot> {
        self.metrics.get(&t).ok_or(SimError::TimeNotFound(t))
    }

    /// Recorded times in ascending order.
    pub fn times(&self) -> impl Iterator<Item = i64> + '_ {
        self.messages.keys().copied()
    }

    /// Number of recorded snapshots, including the `t = -1` initial one.
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_of_unrecorded_time_errors() {
        let history = History::new();
        assert!(matches!(history.get(0), Err(SimError::TimeNotFound(0))));
    }

    #[test]
    fn times_are_returned_in_ascending_order() {
        let mut history = History::new();
        for t in [5, -1, 2] {
            history.add_event(t, vec![], IndexMap::new(), Utilization::default(), MetricsSnapshot::default());
        }
        assert_eq!(history.times().collect::<Vec<_>>(), vec![-1, 2, 5]);
    }

    #[test]
    fn recorded_time_round_trips() {
        let mut history = History::new();
        let utilization = Utilization { cpus: 4, ram: 8 };
        history.add_event(0, vec!["hello".to_string()], IndexMap::new(), utilization, MetricsSnapshot::default());
        let (messages, dags, got) = history.get(0).unwrap();
        assert_eq!(messages, ["hello".to_string()]);
        assert!(dags.is_empty());
        assert_eq!(got, utilization);
    }
}
