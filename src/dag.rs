use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::task::{Task, TaskSpec};

/// One user's declarative DAG, as parsed from the `users` map of the YAML
/// input schema.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arrival_time: i64,
    pub tasks: IndexMap<String, TaskSpec>,
}

/// Rehydratable projection of a [`Dag`]'s nodes and edges, used to replay a
/// previously recorded run without re-parsing the original YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSnapshot {
    pub user: String,
    pub name: String,
    pub arrival_time: i64,
    pub nodes: Vec<Task>,
    pub edges: Vec<(String, String)>,
}

/// A single user's tasks, keyed by label in declaration order, plus the
/// dependency edges between them.
#[derive(Debug, Clone, Serialize)]
pub struct Dag {
    pub user: String,
    pub name: String,
    pub arrival_time: i64,
    pub tasks: IndexMap<String, Task>,
    /// `(dependency_label, dependent_label)` pairs, kept for rendering.
    pub edges: Vec<(String, String)>,
}

impl Dag {
    /// Builds a DAG from a parsed spec. Every dependency must name a task
    /// declared in the same DAG, and the resulting dependency graph must be
    /// acyclic.
    pub fn from_spec(user: &str, spec: &UserSpec) -> Result<Self> {
        let mut tasks = IndexMap::new();
        for task_spec in spec.tasks.values() {
            let task = Task::from_spec(user, task_spec)?;
            tasks.insert(task.label.clone(), task);
        }

        let mut edges = Vec::new();
        for (label, task) in &tasks {
            for dep in &task.dependencies {
                if !tasks.contains_key(dep) {
                    return Err(SimError::MalformedSpec(format!(
                        "user '{user}' task '{label}' depends on unknown task '{dep}'"
                    )));
                }
                edges.push((dep.clone(), label.clone()));
            }
        }

        let dag = Self {
            user: user.to_string(),
            name: spec.name.clone(),
            arrival_time: spec.arrival_time,
            tasks,
            edges,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    /// Rehydrates a DAG from a previously recorded snapshot.
    pub fn from_snapshot(snapshot: DagSnapshot) -> Result<Self> {
        let mut tasks = IndexMap::new();
        for task in snapshot.nodes {
            tasks.insert(task.label.clone(), task);
        }
        for (dep, label) in &snapshot.edges {
            if !tasks.contains_key(label) || !tasks.contains_key(dep) {
                return Err(SimError::MalformedSpec(format!(
                    "snapshot edge ({dep}, {label}) references an unknown task"
                )));
            }
        }

        let dag = Self {
            user: snapshot.user,
            name: snapshot.name,
            arrival_time: snapshot.arrival_time,
            tasks,
            edges: snapshot.edges,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    /// Projects this DAG into its serializable node/edge form.
    pub fn to_snapshot(&self) -> DagSnapshot {
        DagSnapshot {
            user: self.user.clone(),
            name: self.name.clone(),
            arrival_time: self.arrival_time,
            nodes: self.tasks.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    pub fn task(&self, label: &str) -> Option<&Task> {
        self.tasks.get(label)
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(Task::is_finished)
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit<'a>(
            label: &'a str,
            tasks: &'a IndexMap<String, Task>,
            marks: &mut IndexMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(label) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => {
                    return Err(SimError::MalformedSpec(format!(
                        "dependency cycle detected at task '{label}'"
                    )));
                }
                None => {}
            }
            marks.insert(label, Mark::InProgress);
            for dep in &tasks[label].dependencies {
                visit(dep.as_str(), tasks, marks)?;
            }
            marks.insert(label, Mark::Done);
            Ok(())
        }

        let mut marks = IndexMap::new();
        for label in self.tasks.keys() {
            visit(label.as_str(), &self.tasks, &mut marks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;

    fn task_spec(label: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            label: label.to_string(),
            duration: 3,
            cpus: 1,
            ram: 1,
            priority: None,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn rejects_unknown_dependency() {
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task_spec("a", &["ghost"]));
        let spec = UserSpec { name: "u".into(), arrival_time: 0, tasks };
        assert!(Dag::from_spec("alice", &spec).is_err());
    }

    #[test]
    fn rejects_dependency_cycle() {
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task_spec("a", &["b"]));
        tasks.insert("b".to_string(), task_spec("b", &["a"]));
        let spec = UserSpec { name: "u".into(), arrival_time: 0, tasks };
        assert!(Dag::from_spec("alice", &spec).is_err());
    }

    #[test]
    fn snapshot_round_trip_preserves_nodes_edges_and_statuses() {
        use crate::task::TaskStatus;

        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task_spec("a", &[]));
        tasks.insert("b".to_string(), task_spec("b", &["a"]));
        let spec = UserSpec { name: "u".into(), arrival_time: 2, tasks };
        let mut dag = Dag::from_spec("alice", &spec).unwrap();

        // Drive task "a" partway through its lifecycle so the snapshot
        // round trip is exercised on more than the initial UNSET status.
        dag.tasks.get_mut("a").unwrap().status = TaskStatus::Running;
        dag.tasks.get_mut("b").unwrap().status = TaskStatus::Blocked;

        let snapshot = dag.to_snapshot();
        let restored = Dag::from_snapshot(snapshot).unwrap();

        assert_eq!(restored.tasks.len(), dag.tasks.len());
        assert_eq!(restored.edges, dag.edges);
        assert_eq!(restored.arrival_time, dag.arrival_time);
        assert_eq!(restored.tasks["a"].status, TaskStatus::Running);
        assert_eq!(restored.tasks["b"].status, TaskStatus::Blocked);
    }
}
