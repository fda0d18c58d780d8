use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Scheduling discipline. All four priority-based variants share the same
/// enqueue/admission machinery in [`super::Scheduler`]; they differ only in
/// `priority_key` and, for `PreemptivePriority`, in whether a lower-priority
/// running task may be evicted to admit a higher-priority one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Fcfs,
    Priority,
    PreemptivePriority,
    SmallestServiceFirst,
    ShortestJobFirst,
}

impl PolicyKind {
    pub fn preempts(self) -> bool {
        matches!(self, PolicyKind::PreemptivePriority)
    }

    /// Ready-queue ordering key. [`crate::queue::OrderedPriorityQueue::get`]
    /// always returns the maximum key, so policies favoring "smaller" tasks
    /// negate their natural measure.
    pub fn priority_key(self, task: &Task) -> i64 {
        match self {
            PolicyKind::Fcfs => 0,
            PolicyKind::Priority | PolicyKind::PreemptivePriority => task.priority.unwrap_or(0),
            PolicyKind::SmallestServiceFirst => {
                let priority = task.priority.unwrap_or(1);
                -(priority * task.cpus * task.ram)
            }
            PolicyKind::ShortestJobFirst => -task.duration,
        }
    }

    fn priority_display_default(self) -> i64 {
        match self {
            PolicyKind::SmallestServiceFirst => 1,
            _ => 0,
        }
    }

    /// Message recorded into history when a task is added to the ready
    /// queue. FCFS and SJF have no meaningful notion of a displayed
    /// priority, so they mention only duration.
    pub fn ready_message(self, user: &str, label: &str, task: &Task) -> String {
        match self {
            PolicyKind::Fcfs | PolicyKind::ShortestJobFirst => {
                format!("Added {user} task {label} to ready queue with duration {}", task.duration)
            }
            _ => format!(
                "Added {user} task {label} to ready queue with priority {} and duration {}",
                task.priority.unwrap_or(self.priority_display_default()),
                task.duration
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;

    fn task(priority: Option<i64>, cpus: i64, ram: i64, duration: i64) -> Task {
        Task::from_spec(
            "alice",
            &TaskSpec { label: "t".into(), duration, cpus, ram, priority, dependencies: vec![] },
        )
        .unwrap()
    }

    #[test]
    fn fcfs_priority_is_always_zero() {
        assert_eq!(PolicyKind::Fcfs.priority_key(&task(Some(9), 1, 1, 1)), 0);
    }

    #[test]
    fn smallest_service_first_negates_the_product() {
        let t = task(Some(2), 3, 4, 1);
        assert_eq!(PolicyKind::SmallestServiceFirst.priority_key(&t), -(2 * 3 * 4));
    }

    #[test]
    fn smallest_service_first_defaults_missing_priority_to_one() {
        let t = task(None, 2, 3, 1);
        assert_eq!(PolicyKind::SmallestServiceFirst.priority_key(&t), -(2 * 3));
    }

    #[test]
    fn shortest_job_first_negates_duration() {
        let t = task(None, 1, 1, 7);
        assert_eq!(PolicyKind::ShortestJobFirst.priority_key(&t), -7);
    }
}
