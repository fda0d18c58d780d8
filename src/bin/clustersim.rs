use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clustersim::{PolicyKind, Reducer, Scheduler, SimulationConfig};
use tracing_subscriber::EnvFilter;

/// Load a YAML cluster/users/tasks spec, run it to completion under a
/// chosen scheduling policy, and print the outcome.
#[derive(Parser, Debug)]
#[command(name = "clustersim", version, about)]
struct Cli {
    /// Path to a YAML simulation config (cluster + users + tasks).
    #[arg(long, env = "CLUSTERSIM_CONFIG", default_value = "fixtures/single_task.yml")]
    config: PathBuf,

    /// Scheduling policy to run.
    #[arg(long, value_enum, default_value = "fcfs")]
    policy: PolicyKind,

    /// Reducer applied when collapsing per-task/per-user figures into a
    /// summary number.
    #[arg(long, value_enum, default_value = "mean")]
    reducer: Reducer,

    /// Print every recorded history snapshot instead of just the summary.
    #[arg(long)]
    history: bool,

    /// Query a single recorded time instead of running to completion.
    #[arg(long)]
    at: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = SimulationConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let mut scheduler = Scheduler::new(cli.policy, config.cluster, &config.users)
        .context("failed to construct scheduler from config")?;

    if let Some(t) = cli.at {
        scheduler.run();
        print_snapshot(&scheduler, t)?;
        return Ok(());
    }

    scheduler.run();

    if cli.history {
        for t in scheduler.times().collect::<Vec<_>>() {
            print_snapshot(&scheduler, t)?;
        }
        return Ok(());
    }

    let now = scheduler.now();
    let (_, dags, _) = scheduler.history(now).context("missing terminal history snapshot")?;
    let metrics = scheduler.metrics_at(now).context("missing terminal history snapshot")?;
    println!("policy: {:?}", cli.policy);
    println!("finished at t={now} (complete={})", scheduler.is_complete());
    println!("recorded {} history snapshots", scheduler.snapshot_count());
    println!("global makespan ({:?}): {:.2}", cli.reducer, metrics.global_makespan(cli.reducer));
    println!(
        "global JCT ({0:?}/{0:?}): {1:.2}",
        cli.reducer,
        metrics.global_jct(cli.reducer, cli.reducer)
    );
    println!(
        "global queuing time ({0:?}/{0:?}): {1:.2}",
        cli.reducer,
        metrics.global_queuing_time(cli.reducer, cli.reducer)
    );

    for (user, dag) in dags {
        for label in dag.tasks.keys() {
            let preemptions = metrics.preemptions(user, label);
            if preemptions > 0 {
                println!("preemptions for {user} task {label}: {preemptions}");
            }
        }
    }

    Ok(())
}

fn print_snapshot(scheduler: &Scheduler, t: i64) -> anyhow::Result<()> {
    let (messages, dags, utilization) = scheduler.history(t)?;
    let payload = serde_json::json!({
        "time": t,
        "messages": messages,
        "dags": dags,
        "utilization": utilization,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
