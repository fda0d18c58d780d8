use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dag::Dag;

/// Sentinel for an undefined value (no finished task to compute from).
const UNDEFINED: f64 = -1.0;
/// Sentinel for an unbounded value (a task that never finished).
const UNBOUNDED: f64 = 9999.0;

fn sentinel(value: f64) -> f64 {
    if value.is_nan() {
        UNDEFINED
    } else if value.is_infinite() {
        UNBOUNDED
    } else {
        value
    }
}

/// How a set of per-task values collapses into one figure. Selectable from
/// the CLI rather than passed as a closure, so the choice can be recorded
/// and serialized alongside a run's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Min,
    Max,
    Sum,
    Identity,
}

impl Reducer {
    /// Reduces a sequence of values. An empty sequence is undefined and
    /// reduces to `NaN`, translated to the `-1` sentinel by callers at their
    /// public boundary.
    pub fn reduce(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Sum => values.iter().sum(),
            Reducer::Identity => values[0],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompletionInterval {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub preemptions: u32,
    pub queue_time: i64,
    pub completion: Option<CompletionInterval>,
}

/// A deep, point-in-time copy of accumulated metrics data, suitable for
/// storing in [`History`](crate::history::History) and querying later
/// without holding a live [`MetricsAccumulator`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    arrivals: HashMap<String, i64>,
    tasks: HashMap<String, HashMap<String, TaskMetrics>>,
}

impl MetricsSnapshot {
    fn raw_local_makespan(&self, user: &str) -> f64 {
        let Some(arrival) = self.arrivals.get(user) else {
            return f64::NAN;
        };
        let max_end = self
            .tasks
            .get(user)
            .into_iter()
            .flat_map(|t| t.values())
            .filter_map(|m| m.completion.map(|c| c.end))
            .max();
        match max_end {
            Some(end) => (end - arrival) as f64,
            None => f64::NAN,
        }
    }

    fn raw_local_jct(&self, user: &str, reducer: Reducer) -> f64 {
        let values: Vec<f64> = self
            .tasks
            .get(user)
            .into_iter()
            .flat_map(|t| t.values())
            .filter_map(|m| m.completion.map(|c| (c.end - c.start) as f64))
            .collect();
        reducer.reduce(&values)
    }

    fn raw_local_queuing_time(&self, user: &str, reducer: Reducer) -> f64 {
        let values: Vec<f64> = self
            .tasks
            .get(user)
            .into_iter()
            .flat_map(|t| t.values())
            .map(|m| m.queue_time as f64)
            .collect();
        reducer.reduce(&values)
    }

    /// Makespan for a single user: time from arrival to its last finished
    /// task, or the undefined sentinel if none have finished.
    pub fn local_makespan(&self, user: &str) -> f64 {
        sentinel(self.raw_local_makespan(user))
    }

    /// Makespan across all users, reduced by `reducer`.
    pub fn global_makespan(&self, reducer: Reducer) -> f64 {
        let values: Vec<f64> = self.arrivals.keys().map(|u| self.raw_local_makespan(u)).collect();
        sentinel(reducer.reduce(&values))
    }

    /// Job completion time for a single user's tasks, reduced by `reducer`.
    pub fn local_jct(&self, user: &str, reducer: Reducer) -> f64 {
        sentinel(self.raw_local_jct(user, reducer))
    }

    /// JCT across all users: each user's JCT (via `local_reducer`) is
    /// itself reduced by `global_reducer`.
    pub fn global_jct(&self, local_reducer: Reducer, global_reducer: Reducer) -> f64 {
        let values: Vec<f64> =
            self.arrivals.keys().map(|u| self.raw_local_jct(u, local_reducer)).collect();
        sentinel(global_reducer.reduce(&values))
    }

    /// Total time tasks spent READY-but-not-RUNNING for a single user.
    pub fn local_queuing_time(&self, user: &str, reducer: Reducer) -> f64 {
        sentinel(self.raw_local_queuing_time(user, reducer))
    }

    pub fn global_queuing_time(&self, local_reducer: Reducer, global_reducer: Reducer) -> f64 {
        let values: Vec<f64> = self
            .arrivals
            .keys()
            .map(|u| self.raw_local_queuing_time(u, local_reducer))
            .collect();
        sentinel(global_reducer.reduce(&values))
    }

    pub fn preemptions(&self, user: &str, label: &str) -> u32 {
        self.tasks.get(user).and_then(|t| t.get(label)).map(|m| m.preemptions).unwrap_or(0)
    }
}

/// Accumulates per-task metrics as a run progresses. Every mutator is
/// invoked from the scheduler's round loop; `snapshot()` yields the
/// point-in-time [`MetricsSnapshot`] recorded into history each round.
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    state: MetricsSnapshot,
}

impl MetricsAccumulator {
    pub fn new(dags: &IndexMap<String, Dag>) -> Self {
        let mut arrivals = HashMap::new();
        let mut tasks = HashMap::new();
        for (user, dag) in dags {
            arrivals.insert(user.clone(), dag.arrival_time);
            let per_task = dag.tasks.keys().map(|label| (label.clone(), TaskMetrics::default())).collect();
            tasks.insert(user.clone(), per_task);
        }
        Self { state: MetricsSnapshot { arrivals, tasks } }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.clone()
    }

    fn task_metrics_mut(&mut self, user: &str, label: &str) -> Option<&mut TaskMetrics> {
        self.state.tasks.get_mut(user).and_then(|t| t.get_mut(label))
    }

    pub fn store_preemption(&mut self, user: &str, label: &str) {
        if let Some(m) = self.task_metrics_mut(user, label) {
            m.preemptions += 1;
        }
    }

    /// Adds the time between `ready_time` and `now` to a task's cumulative
    /// queue time. Called on every admission, including re-admission after
    /// a preemption.
    pub fn store_task_queue_time(&mut self, user: &str, label: &str, now: i64, ready_time: i64) {
        if let Some(m) = self.task_metrics_mut(user, label) {
            m.queue_time += now - ready_time;
        }
    }

    pub fn store_task_finish_time(&mut self, user: &str, label: &str, start: i64, end: i64) {
        if let Some(m) = self.task_metrics_mut(user, label) {
            m.completion = Some(CompletionInterval { start, end });
        }
    }

    pub fn local_makespan(&self, user: &str) -> f64 {
        self.state.local_makespan(user)
    }

    pub fn global_makespan(&self, reducer: Reducer) -> f64 {
        self.state.global_makespan(reducer)
    }

    pub fn local_jct(&self, user: &str, reducer: Reducer) -> f64 {
        self.state.local_jct(user, reducer)
    }

    pub fn global_jct(&self, local_reducer: Reducer, global_reducer: Reducer) -> f64 {
        self.state.global_jct(local_reducer, global_reducer)
    }

    pub fn local_queuing_time(&self, user: &str, reducer: Reducer) -> f64 {
        self.state.local_queuing_time(user, reducer)
    }

    pub fn global_queuing_time(&self, local_reducer: Reducer, global_reducer: Reducer) -> f64 {
        self.state.global_queuing_time(local_reducer, global_reducer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_of_empty_sequence_is_nan() {
        assert!(Reducer::Mean.reduce(&[]).is_nan());
    }

    #[test]
    fn mean_reduce() {
        assert_eq!(Reducer::Mean.reduce(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn local_makespan_with_no_finished_tasks_is_undefined_sentinel() {
        let mut arrivals = HashMap::new();
        arrivals.insert("alice".to_string(), 0);
        let mut tasks = HashMap::new();
        tasks.insert("alice".to_string(), HashMap::from([("t".to_string(), TaskMetrics::default())]));
        let snapshot = MetricsSnapshot { arrivals, tasks };
        assert_eq!(snapshot.local_makespan("alice"), UNDEFINED);
    }

    #[test]
    fn local_makespan_uses_last_finish_minus_arrival() {
        let mut arrivals = HashMap::new();
        arrivals.insert("alice".to_string(), 3);
        let mut per_task = HashMap::new();
        per_task.insert(
            "t".to_string(),
            TaskMetrics { preemptions: 0, queue_time: 0, completion: Some(CompletionInterval { start: 3, end: 10 }) },
        );
        let mut tasks = HashMap::new();
        tasks.insert("alice".to_string(), per_task);
        let snapshot = MetricsSnapshot { arrivals, tasks };
        assert_eq!(snapshot.local_makespan("alice"), 7.0);
    }
}
