use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Declarative task definition, one entry under a user's `tasks` map in the
/// YAML input schema.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub label: String,
    pub duration: i64,
    #[serde(default = "default_resource")]
    pub cpus: i64,
    #[serde(default = "default_resource")]
    pub ram: i64,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_resource() -> i64 {
    1
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Unset,
    Ready,
    Blocked,
    Running,
    Preempted,
    Finished,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Unset => "UNSET",
            TaskStatus::Ready => "READY",
            TaskStatus::Blocked => "BLOCKED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Preempted => "PREEMPTED",
            TaskStatus::Finished => "FINISHED",
        };
        write!(f, "{s}")
    }
}

/// A task's identity, resource demand, and runtime state within one user's
/// DAG. `runtime` accumulates wall-clock ticks actually spent RUNNING, so it
/// survives preemption correctly: `runtime <= duration` always, and a
/// FINISHED task has `runtime >= duration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within a cluster: `"<user>,<label>"`.
    pub id: String,
    pub label: String,
    pub duration: i64,
    pub cpus: i64,
    pub ram: i64,
    pub dependencies: IndexSet<String>,
    pub priority: Option<i64>,
    pub status: TaskStatus,
    pub ready_time: Option<i64>,
    pub start: Option<i64>,
    /// Clock time this task was last admitted into RUNNING; `None` while
    /// not running. Used to accumulate `runtime` on the next completion or
    /// preemption sweep.
    pub prev_runtime: Option<i64>,
    pub runtime: i64,
    pub end: Option<i64>,
}

impl Task {
    /// Builds an UNSET task from a parsed spec. Rejects a blank label or a
    /// non-positive duration/cpus/ram up front so bad input is caught at
    /// construction rather than deadlocking the run later.
    pub fn from_spec(user: &str, spec: &TaskSpec) -> Result<Self> {
        if spec.label.trim().is_empty() {
            return Err(SimError::MalformedSpec(format!(
                "user '{user}': task label must not be blank"
            )));
        }
        if spec.duration <= 0 {
            return Err(SimError::MalformedSpec(format!(
                "user '{user}' task '{}': duration must be a positive integer",
                spec.label
            )));
        }
        if spec.cpus <= 0 || spec.ram <= 0 {
            return Err(SimError::MalformedSpec(format!(
                "user '{user}' task '{}': cpus and ram must be positive integers",
                spec.label
            )));
        }

        Ok(Task {
            id: format!("{user},{}", spec.label),
            label: spec.label.clone(),
            duration: spec.duration,
            cpus: spec.cpus,
            ram: spec.ram,
            dependencies: spec.dependencies.iter().cloned().collect(),
            priority: spec.priority,
            status: TaskStatus::Unset,
            ready_time: None,
            start: None,
            prev_runtime: None,
            runtime: 0,
            end: None,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.status == TaskStatus::Finished
    }
}
