pub mod config;
pub mod dag;
pub mod error;
pub mod history;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod task;

pub use config::{load_configs_dir, ClusterSpec, SimulationConfig};
pub use dag::{Dag, DagSnapshot, UserSpec};
pub use error::{Result, SimError};
pub use history::{History, Utilization};
pub use metrics::{MetricsAccumulator, MetricsSnapshot, Reducer};
pub use queue::OrderedPriorityQueue;
pub use scheduler::{PolicyKind, Scheduler};
pub use task::{Task, TaskSpec, TaskStatus};
