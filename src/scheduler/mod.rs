pub mod policy;

use indexmap::{IndexMap, IndexSet};

pub use policy::PolicyKind;

use crate::config::ClusterSpec;
use crate::dag::{Dag, DagSnapshot, UserSpec};
use crate::error::Result;
use crate::history::{History, Utilization};
use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
use crate::task::TaskStatus;

/// Drives every user's DAG to completion (or deadlock) under one scheduling
/// policy. Each call to [`Scheduler::perform_round`] runs one full round of
/// the discrete-event loop: completion sweep, eligibility sweep, enqueue,
/// admission (with preemption where the policy allows it), snapshot, clock
/// advance.
pub struct Scheduler {
    policy: PolicyKind,
    cluster: ClusterSpec,
    utilization: Utilization,
    dags: IndexMap<String, Dag>,
    time: i64,
    messages: Vec<String>,
    history: History,
    metrics: MetricsAccumulator,
    /// `(user, label)` keys of currently RUNNING tasks, in admission order.
    running: IndexSet<(String, String)>,
    ready: crate::queue::OrderedPriorityQueue<(String, String)>,
}

impl Scheduler {
    /// Builds a scheduler from parsed YAML user specs.
    pub fn new(policy: PolicyKind, cluster: ClusterSpec, users: &IndexMap<String, UserSpec>) -> Result<Self> {
        let mut dags = IndexMap::new();
        for (user, spec) in users {
            dags.insert(user.clone(), Dag::from_spec(user, spec)?);
        }
        Self::from_dags(policy, cluster, dags)
    }

    /// Rehydrates a scheduler from previously recorded DAG snapshots, for
    /// replaying a run without re-parsing the original YAML.
    pub fn from_snapshots(
        policy: PolicyKind,
        cluster: ClusterSpec,
        snapshots: IndexMap<String, DagSnapshot>,
    ) -> Result<Self> {
        let mut dags = IndexMap::new();
        for (user, snapshot) in snapshots {
            dags.insert(user.clone(), Dag::from_snapshot(snapshot)?);
        }
        Self::from_dags(policy, cluster, dags)
    }

    fn from_dags(policy: PolicyKind, cluster: ClusterSpec, dags: IndexMap<String, Dag>) -> Result<Self> {
        let metrics = MetricsAccumulator::new(&dags);
        let mut scheduler = Self {
            policy,
            cluster,
            utilization: Utilization::default(),
            dags,
            time: 0,
            messages: Vec::new(),
            history: History::new(),
            metrics,
            running: IndexSet::new(),
            ready: crate::queue::OrderedPriorityQueue::new(),
        };
        scheduler.snapshot_at(-1);
        Ok(scheduler)
    }

    /// Runs rounds until no task is running and no future arrival remains.
    pub fn run(&mut self) {
        while !self.perform_round() {}
    }

    /// Runs exactly one round, returning `true` once the simulation has
    /// nothing left to do (terminal state, possibly deadlocked).
    pub fn perform_round(&mut self) -> bool {
        tracing::debug!(time = self.time, "beginning scheduling round");
        self.completion_sweep();
        let newly_ready = self.eligibility_sweep();
        self.enqueue(newly_ready);
        self.admission_loop();
        self.snapshot();
        let finished = self.advance_clock();
        tracing::debug!(time = self.time, finished, "completed scheduling round");
        finished
    }

    pub fn now(&self) -> i64 {
        self.time
    }

    pub fn is_complete(&self) -> bool {
        self.dags.values().all(Dag::is_complete)
    }

    pub fn history(&self, t: i64) -> Result<(&[String], &IndexMap<String, Dag>, Utilization)> {
        self.history.get(t)
    }

    pub fn metrics_at(&self, t: i64) -> Result<&MetricsSnapshot> {
        self.history.metrics(t)
    }

    pub fn times(&self) -> impl Iterator<Item = i64> + '_ {
        self.history.times()
    }

    /// Number of recorded history snapshots, including the pre-run one.
    pub fn snapshot_count(&self) -> usize {
        self.history.len()
    }

    fn task_mut(&mut self, user: &str, label: &str) -> &mut crate::task::Task {
        self.dags.get_mut(user).and_then(|d| d.tasks.get_mut(label)).expect("task exists")
    }

    fn log(&mut self, message: String) {
        tracing::trace!(time = self.time, %message, "scheduler message");
        self.messages.push(message);
    }

    /// Advances `runtime` on every RUNNING task and retires those that have
    /// now run for at least their declared duration.
    fn completion_sweep(&mut self) {
        let now = self.time;
        let keys: Vec<(String, String)> = self.running.iter().cloned().collect();
        for (user, label) in keys {
            let finished = {
                let task = self.task_mut(&user, &label);
                let prev = task.prev_runtime.expect("running task has prev_runtime");
                task.runtime += now - prev;
                // Close out this round's accounting window regardless of
                // whether the task finishes, so a preemption later in this
                // same round (or a later round) never re-counts [prev, now).
                task.prev_runtime = Some(now);
                task.runtime >= task.duration
            };
            if !finished {
                continue;
            }

            let (start, cpus, ram) = {
                let task = self.task_mut(&user, &label);
                task.status = TaskStatus::Finished;
                task.end = Some(now);
                task.prev_runtime = None;
                (task.start.expect("finished task has a start time"), task.cpus, task.ram)
            };
            self.utilization.cpus -= cpus;
            self.utilization.ram -= ram;
            self.metrics.store_task_finish_time(&user, &label, start, now);
            self.running.shift_remove(&(user.clone(), label.clone()));
            self.log(format!("Finished user: {user} task: {label} at time={now}"));
        }
    }

    /// Recomputes READY/BLOCKED status for every arrived, not-yet-finished
    /// task whose status isn't already READY, returning those that just
    /// became READY this round.
    fn eligibility_sweep(&mut self) -> Vec<(String, String)> {
        let now = self.time;
        let mut newly_ready = Vec::new();
        for (user, dag) in self.dags.iter_mut() {
            if dag.arrival_time > now {
                continue;
            }
            let labels: Vec<String> = dag.tasks.keys().cloned().collect();
            for label in labels {
                if matches!(
                    dag.task(&label).expect("label came from this dag's keys").status,
                    TaskStatus::Ready | TaskStatus::Running | TaskStatus::Preempted | TaskStatus::Finished
                ) {
                    continue;
                }
                let deps_satisfied = dag
                    .task(&label)
                    .expect("label came from this dag's keys")
                    .dependencies
                    .iter()
                    .all(|dep| dag.task(dep).map(crate::task::Task::is_finished).unwrap_or(false));

                let task = dag.tasks.get_mut(&label).expect("label came from this dag's keys");
                if deps_satisfied {
                    task.status = TaskStatus::Ready;
                    task.ready_time = Some(now);
                    newly_ready.push((user.clone(), label.clone()));
                } else {
                    task.status = TaskStatus::Blocked;
                }
            }
        }
        newly_ready
    }

    fn enqueue(&mut self, newly_ready: Vec<(String, String)>) {
        for (user, label) in newly_ready {
            let task = self.dags[&user].task(&label).expect("enqueued task exists");
            let key = self.policy.priority_key(task);
            let message = self.policy.ready_message(&user, &label, task);
            self.ready.put((user.clone(), label.clone()), key);
            self.log(message);
        }
    }

    /// Admits ready tasks while the cluster has room, preempting
    /// lower-priority running tasks first when the policy allows it. Stops
    /// at the first ready task that cannot be admitted (head-of-line
    /// blocking), leaving the rest queued for a later round.
    fn admission_loop(&mut self) {
        loop {
            let (user, label) = match self.ready.peek() {
                Ok(head) => head.clone(),
                Err(_) => break,
            };
            if self.try_admit(&user, &label) {
                let _ = self.ready.get();
                continue;
            }
            if self.policy.preempts() && self.attempt_preemption(&user, &label) {
                let _ = self.ready.get();
                continue;
            }
            break;
        }
    }

    fn try_admit(&mut self, user: &str, label: &str) -> bool {
        let task = self.dags[user].task(label).expect("ready task exists");
        if self.utilization.cpus + task.cpus > self.cluster.cpus {
            return false;
        }
        if self.utilization.ram + task.ram > self.cluster.ram {
            return false;
        }
        self.admit(user, label);
        true
    }

    fn admit(&mut self, user: &str, label: &str) {
        let now = self.time;
        let (cpus, ram, ready_time) = {
            let task = self.task_mut(user, label);
            let ready_time = task.ready_time.unwrap_or(now);
            if task.start.is_none() {
                task.start = Some(now);
            }
            task.status = TaskStatus::Running;
            task.prev_runtime = Some(now);
            (task.cpus, task.ram, ready_time)
        };
        self.metrics.store_task_queue_time(user, label, now, ready_time);
        self.utilization.cpus += cpus;
        self.utilization.ram += ram;
        self.running.insert((user.to_string(), label.to_string()));
        self.log(format!("Scheduled {user} task {label} with {cpus} cpus and {ram} ram"));
    }

    fn preempt(&mut self, user: &str, label: &str) {
        let now = self.time;
        let (cpus, ram, priority) = {
            let task = self.task_mut(user, label);
            // The completion sweep earlier this round already advanced
            // runtime through `now`, so this is a no-op in practice; it's
            // kept so `preempt` is correct even if called outside that
            // ordering.
            let prev = task.prev_runtime.expect("running task has prev_runtime");
            task.runtime += now - prev;
            task.status = TaskStatus::Preempted;
            task.prev_runtime = None;
            // Marks the start of a fresh wait window so the next admission's
            // queue-time contribution covers only the time since this
            // preemption, not all the way back to the task's first arrival.
            task.ready_time = Some(now);
            (task.cpus, task.ram, task.priority.unwrap_or(0))
        };
        self.running.shift_remove(&(user.to_string(), label.to_string()));
        self.utilization.cpus -= cpus;
        self.utilization.ram -= ram;
        self.metrics.store_preemption(user, label);
        self.log(format!("Pre-empting user {user} task {label} with priority: {priority}"));

        // A preempted task goes straight back into the ready queue with its
        // original priority; it stays PREEMPTED (rather than cycling back
        // through READY) so the eligibility sweep doesn't re-evaluate and
        // re-enqueue it a second time before it is re-admitted.
        let task = self.dags[user].task(label).expect("preempted task exists");
        let key = self.policy.priority_key(task);
        self.ready.put((user.to_string(), label.to_string()), key);
    }

    /// Walks running tasks from lowest to highest priority, evicting just
    /// enough of them to fit `(user, label)`. Aborts as soon as a candidate
    /// at or above the target's priority is reached, since everything
    /// after it in the ascending walk is no weaker a candidate either.
    fn attempt_preemption(&mut self, user: &str, label: &str) -> bool {
        let target_task = self.dags[user].task(label).expect("ready task exists");
        let target = self.policy.priority_key(target_task);
        let mut candidates: Vec<(i64, (String, String))> = self
            .running
            .iter()
            .map(|(u, l)| {
                let key = self.policy.priority_key(self.dags[u].task(l).expect("running task exists"));
                (key, (u.clone(), l.clone()))
            })
            .collect();
        candidates.sort_by_key(|(priority, _)| *priority);

        let mut released_cpus = 0;
        let mut released_ram = 0;
        let mut victims = Vec::new();
        for (priority, key) in candidates {
            if priority >= target {
                break;
            }
            let (victim_user, victim_label) = &key;
            let victim = self.dags[victim_user].task(victim_label).expect("running task exists");
            released_cpus += victim.cpus;
            released_ram += victim.ram;
            victims.push(key);

            let free_cpus = self.cluster.cpus - self.utilization.cpus + released_cpus;
            let free_ram = self.cluster.ram - self.utilization.ram + released_ram;
            let wanted = self.dags[user].task(label).expect("ready task exists");
            if free_cpus >= wanted.cpus && free_ram >= wanted.ram {
                for (victim_user, victim_label) in &victims {
                    self.preempt(victim_user, victim_label);
                }
                // `(user, label)` is still the ready queue's head at this
                // point; the caller's admission loop pops it right after
                // this call returns.
                self.admit(user, label);
                return true;
            }
        }
        false
    }

    fn snapshot(&mut self) {
        self.snapshot_at(self.time);
    }

    fn snapshot_at(&mut self, t: i64) {
        self.history.add_event(
            t,
            self.messages.clone(),
            self.dags.clone(),
            self.utilization,
            self.metrics.snapshot(),
        );
    }

    /// Jumps the clock to the earliest of: the next running task's
    /// estimated finish time, or the next user's arrival. Returns `true`
    /// (terminal) when neither exists.
    fn advance_clock(&mut self) -> bool {
        let next_finish = self
            .running
            .iter()
            .map(|(u, l)| {
                let task = self.dags[u].task(l).expect("running task exists");
                self.time + (task.duration - task.runtime)
            })
            .min();
        let next_arrival =
            self.dags.values().map(|d| d.arrival_time).filter(|&t| t > self.time).min();

        match [next_finish, next_arrival].into_iter().flatten().min() {
            Some(t) => {
                self.time = t;
                false
            }
            None => true,
        }
    }
}
