mod activities;
mod pool;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use activities::{ChargeCard, Odds, ReleaseQuota, ReserveSeat};
use pool::WorkPool;
use rewind_core::impls::{InMemoryProcessStore, JsonFileProcessStore};
use rewind_core::ports::ProcessStore;
use rewind_core::{
    ActivityFailure, ActivityParameters, CorrelationId, ErrorKind, ManagerBuilder, ManagerConfig,
    Process, ProcessError, ProcessManager, ProcessResult, ProcessState,
};

/// Runs many four-step sagas with randomly failing steps and samples the outcome.
#[derive(Debug, Parser)]
#[command(name = "rewind", version)]
struct Args {
    /// Number of sagas to run.
    #[arg(long, default_value_t = 10_000)]
    processes: usize,

    /// Sagas running at the same time.
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Keep process records as JSON files here instead of in memory.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Manager configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Probability that a forward step fails.
    #[arg(long, default_value_t = 0.01)]
    forward_failure: f64,

    /// Probability that a compensation fails.
    #[arg(long, default_value_t = 0.01)]
    backward_failure: f64,

    /// Follow every n-th saga until it settles.
    #[arg(long, default_value_t = 1000)]
    sample_every: usize,

    /// Pause between sample reports, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    report_interval_ms: u64,
}

/// Shared step implementations handed to every saga.
struct Steps {
    odds: Odds,
    quota: ReleaseQuota,
    seat: ReserveSeat,
    card: ChargeCard,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ManagerConfig::from_json(&json).context("invalid manager config")?
        }
        None => ManagerConfig::default(),
    };

    let store: Arc<dyn ProcessStore> = match &args.store_dir {
        Some(dir) => Arc::new(
            JsonFileProcessStore::open(dir)
                .await
                .with_context(|| format!("opening store at {}", dir.display()))?,
        ),
        None => Arc::new(InMemoryProcessStore::new()),
    };
    println!(
        "Backing store: {}",
        args.store_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );

    let odds = Odds {
        forward_failure: args.forward_failure,
        backward_failure: args.backward_failure,
    };
    let manager = ManagerBuilder::new(store)
        .with_config(config)
        .register_with(ReleaseQuota { odds })?
        .register_with(ReserveSeat { odds })?
        .register_with(ChargeCard { odds })?
        .build()?;
    manager.start().await?;

    let steps = Arc::new(Steps {
        odds,
        quota: ReleaseQuota { odds },
        seat: ReserveSeat { odds },
        card: ChargeCard { odds },
    });

    let ids: Vec<CorrelationId> = (0..args.processes)
        .map(|_| CorrelationId::new(Ulid::new().to_string()))
        .collect();
    let mut samples: Vec<CorrelationId> = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| args.sample_every > 0 && i % args.sample_every == 0)
        .map(|(_, cid)| cid.clone())
        .collect();

    let pool = WorkPool::new(args.workers);
    let producer = {
        let pool = pool.clone();
        let manager = manager.clone();
        tokio::spawn(async move {
            for cid in ids {
                let manager = manager.clone();
                let steps = Arc::clone(&steps);
                pool.submit(async move { run_saga(manager, steps, cid).await })
                    .await;
            }
        })
    };

    let report_interval = Duration::from_millis(args.report_interval_ms);
    let mut tally: HashMap<ProcessState, usize> = HashMap::new();
    loop {
        // every saga has run once both are done; report one last time
        let drained = producer.is_finished() && pool.is_empty();
        println!("\nProcess result samples: {}", samples.len());
        report_samples(&manager, &mut samples, &mut tally).await?;
        if drained {
            break;
        }
        sleep(report_interval).await;
    }
    producer.await?;
    pool.join().await;
    if !samples.is_empty() {
        println!("{} samples still unsettled (left to the sweeper)", samples.len());
    }

    println!("\nSampled outcomes: {tally:?}");
    if !manager.stop().await {
        warn!("stopped with open processes");
    }
    Ok(())
}

/// One saga: four steps, then `finished()`.
async fn run_saga(manager: ProcessManager, steps: Arc<Steps>, cid: CorrelationId) {
    let mut process = match manager.new_process(cid.clone()).await {
        Ok(process) => process,
        Err(e) => {
            warn!(correlation_id = %cid, error = %e, "could not open process");
            return;
        }
    };

    match book(&mut process, &steps).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::SagaFailure => {
            debug!(correlation_id = %cid, error = %e, "saga failed");
        }
        Err(e) => {
            warn!(correlation_id = %cid, error = %e, "process failure");
            if let Err(e) = process.failed().await {
                warn!(correlation_id = %cid, error = %e, "could not compensate, left to the sweeper");
            }
        }
    }
}

async fn book(process: &mut Process, steps: &Steps) -> Result<(), ProcessError> {
    let forward_failure = steps.odds.forward_failure;
    let check_in = move |_: &ActivityParameters, _: &mut ProcessResult| -> Result<(), ActivityFailure> {
        if rand::random::<f64>() < forward_failure {
            return Err(ActivityFailure::new("check-in: simulated failure"));
        }
        Ok(())
    };
    let take_quota = |params: &ActivityParameters, result: &mut ProcessResult| -> Result<(), ActivityFailure> {
        let arg2 = params.get_as::<i64>("arg2").ok_or("arg2 missing")?;
        result.add(10 * arg2);
        Ok(())
    };

    let mut params = ActivityParameters::new();
    params.put("arg1", "param1");
    process.execute_forward_only(&check_in, params.clone()).await?;

    params.put("arg2", 42);
    process
        .execute_with(&take_quota, &steps.quota, params.clone())
        .await?;

    params.put("arg3", true);
    process.execute(&steps.seat, params.clone()).await?;

    params.put("arg4", 22.0 / 7.0);
    process.execute(&steps.card, params).await?;

    process.finished().await
}

/// Print settled samples and drop them; failed ones are reset as a fake retry.
async fn report_samples(
    manager: &ProcessManager,
    samples: &mut Vec<CorrelationId>,
    tally: &mut HashMap<ProcessState, usize>,
) -> anyhow::Result<()> {
    let mut pending = Vec::with_capacity(samples.len());
    for cid in samples.drain(..) {
        let Some(state) = manager.get_process_status(&cid).await? else {
            pending.push(cid);
            continue;
        };
        let mut line = format!("correlation_id=\"{cid}\" state={state}");
        match state {
            ProcessState::New | ProcessState::Progressing => {
                pending.push(cid);
                continue;
            }
            ProcessState::Successful => {
                if let Some(result) = manager.get_process_result(&cid).await? {
                    for fragment in result.iter() {
                        line.push_str(&format!(" {{{fragment}}}"));
                    }
                }
            }
            ProcessState::Compensated | ProcessState::CompensationFailed => {
                let reset = manager.reset_process(&cid).await?;
                line.push_str(if reset { " (was reset)" } else { " (was NOT reset)" });
            }
        }
        *tally.entry(state).or_default() += 1;
        println!("{line}");
    }
    *samples = pending;
    info!(open = samples.len(), "samples reported");
    Ok(())
}
