use clustersim::{PolicyKind, Scheduler, SimulationConfig};

fn load(path: &str) -> SimulationConfig {
    SimulationConfig::from_file(path).expect("fixture should parse")
}

#[test]
fn single_task_runs_to_completion_with_expected_metrics() {
    let config = load("fixtures/single_task.yml");
    let mut scheduler = Scheduler::new(PolicyKind::Fcfs, config.cluster, &config.users).unwrap();
    scheduler.run();

    assert_eq!(scheduler.now(), 10);
    assert!(scheduler.is_complete());

    let metrics = scheduler.metrics_at(10).unwrap();
    assert_eq!(metrics.local_makespan("alice"), 7.0);
    assert_eq!(metrics.local_jct("alice", clustersim::Reducer::Identity), 7.0);
    assert_eq!(metrics.local_queuing_time("alice", clustersim::Reducer::Sum), 0.0);
}

#[test]
fn oversized_task_deadlocks_without_ever_running() {
    let config = load("fixtures/oversized_task.yml");
    let mut scheduler = Scheduler::new(PolicyKind::Fcfs, config.cluster, &config.users).unwrap();
    scheduler.run();

    assert_eq!(scheduler.now(), 0);
    assert!(!scheduler.is_complete());

    let (_, dags, utilization) = scheduler.history(0).unwrap();
    assert_eq!(utilization.cpus, 0);
    assert_eq!(dags["alice"].tasks["too_big"].status, clustersim::TaskStatus::Ready);
}

#[test]
fn fcfs_runs_four_independent_tasks_concurrently_then_their_dependents() {
    let config = load("fixtures/fcfs_dag.yml");
    let mut scheduler = Scheduler::new(PolicyKind::Fcfs, config.cluster, &config.users).unwrap();

    assert!(!scheduler.perform_round());
    assert_eq!(scheduler.now(), 5);

    assert!(!scheduler.perform_round());
    assert_eq!(scheduler.now(), 8);

    assert!(scheduler.perform_round());
    assert_eq!(scheduler.now(), 8);
    assert!(scheduler.is_complete());

    // t=-1 (pre-run), 0, 5, 8
    assert_eq!(scheduler.times().collect::<Vec<_>>(), vec![-1, 0, 5, 8]);
}

#[test]
fn preemptive_priority_evicts_the_low_priority_task_for_the_high_priority_one() {
    let config = load("fixtures/preemptive_priority_dag.yml");
    let mut scheduler =
        Scheduler::new(PolicyKind::PreemptivePriority, config.cluster, &config.users).unwrap();

    assert!(!scheduler.perform_round());
    assert_eq!(scheduler.now(), 3);

    assert!(!scheduler.perform_round());
    assert_eq!(scheduler.now(), 7);
    let (_, dags, _) = scheduler.history(3).unwrap();
    assert_eq!(dags["alice"].tasks["low"].status, clustersim::TaskStatus::Preempted);

    assert!(!scheduler.perform_round());
    assert_eq!(scheduler.now(), 14);

    assert!(scheduler.perform_round());
    assert_eq!(scheduler.now(), 14);
    assert!(scheduler.is_complete());

    let metrics = scheduler.metrics_at(14).unwrap();
    assert_eq!(metrics.local_makespan("alice"), 14.0);
    assert_eq!(metrics.local_makespan("bob"), 4.0);
    assert_eq!(metrics.local_queuing_time("alice", clustersim::Reducer::Sum), 4.0);
    assert_eq!(metrics.local_queuing_time("bob", clustersim::Reducer::Sum), 0.0);
    assert_eq!(metrics.preemptions("alice", "low"), 1);
    assert_eq!(metrics.preemptions("bob", "high"), 0);
}

#[test]
fn non_preemptive_priority_lets_the_low_priority_task_run_to_completion_first() {
    let config = load("fixtures/preemptive_priority_dag.yml");
    let mut scheduler = Scheduler::new(PolicyKind::Priority, config.cluster, &config.users).unwrap();
    scheduler.run();

    // With no preemption, bob's high-priority task has to wait for alice's
    // task to finish at t=10, then runs for its own duration of 4.
    assert_eq!(scheduler.now(), 14);
    assert!(scheduler.is_complete());
}
