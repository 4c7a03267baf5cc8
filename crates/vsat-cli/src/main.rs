//! VSAT CLI - run demo tasks through a worker pool and inspect a result store.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vsat_worker::{Config, Context, ResultRecord, StoreError, TaskArgs, TaskUuid, WorkerPool};

mod tasks;

use tasks::DemoTasks;

/// VSAT CLI - task dispatch demo and result store inspection
#[derive(Parser)]
#[command(name = "vsat")]
#[command(about = "Run tasks on a local worker pool backed by a file result store", long_about = None)]
struct Cli {
    /// Result store root directory
    #[arg(long, env = "VSAT_RESULT_ROOT")]
    root: Option<PathBuf>,

    /// Number of workers in the pool (at least 1)
    #[arg(short, long, env = "VSAT_WORKERS")]
    workers: Option<NonZeroUsize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Multiply two integers on the pool
    Multiply {
        a: i64,
        b: i64,
    },

    /// Square 0..count on the pool and verify the results
    Square {
        /// Number of tasks to dispatch
        #[arg(short, long, default_value = "1000")]
        count: i64,
    },

    /// Dispatch a task that always fails
    Fail {
        /// Failure message
        message: String,
    },

    /// List records in the store
    List,

    /// Show one record without consuming it
    State {
        /// Task UUID
        task_uuid: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::from_env();
    if let Some(root) = cli.root {
        config.store.root = root;
    }
    if let Some(workers) = cli.workers {
        config.num_workers = workers.get();
    }

    let ctx = Context::from_config(&config).await?;
    let demo = tasks::register_all(&ctx);

    info!(
        root = %config.store.root.display(),
        workers = config.num_workers,
        "Opened result store"
    );

    match cli.command {
        Commands::Multiply { a, b } => {
            multiply(&ctx, &demo, &config, a, b).await?;
        }
        Commands::Square { count } => {
            square(&ctx, &demo, &config, count).await?;
        }
        Commands::Fail { message } => {
            fail(&ctx, &demo, &config, message).await?;
        }
        Commands::List => {
            list(&ctx).await?;
        }
        Commands::State { task_uuid } => {
            state(&ctx, &task_uuid).await?;
        }
    }

    Ok(())
}

async fn start_pool(
    ctx: &Arc<Context>,
    config: &Config,
) -> Result<Arc<WorkerPool>, Box<dyn std::error::Error>> {
    let pool = ctx.init_pool(config.num_workers);
    pool.start().await?;
    Ok(pool)
}

async fn stop_pool(pool: &WorkerPool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let summary = pool.stop(config.stop_timeout).await?;
    info!(
        exited = summary.exited,
        timed_out = summary.timed_out,
        "Worker pool stopped"
    );
    Ok(())
}

async fn multiply(
    ctx: &Arc<Context>,
    demo: &DemoTasks,
    config: &Config,
    a: i64,
    b: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = start_pool(ctx, config).await?;

    let handle = demo.multiply.dispatch(TaskArgs::positional([a, b])).await?;
    println!("Dispatched {}", handle.task_uuid());

    let value = handle.wait().await?;
    println!("{a} * {b} = {value}");

    stop_pool(&pool, config).await
}

async fn square(
    ctx: &Arc<Context>,
    demo: &DemoTasks,
    config: &Config,
    count: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = start_pool(ctx, config).await?;
    let started = Instant::now();

    let mut handles = Vec::with_capacity(count.max(0) as usize);
    for y in 0..count {
        handles.push(demo.square.dispatch(TaskArgs::positional([y])).await?);
    }

    let mut actual = HashSet::with_capacity(handles.len());
    for handle in &handles {
        let value = handle.wait().await?;
        let square = value
            .as_i64()
            .ok_or_else(|| format!("task {} returned a non-integer: {value}", handle.task_uuid()))?;
        actual.insert(square);
    }

    stop_pool(&pool, config).await?;

    let expected: HashSet<i64> = (0..count).map(|y| y * y).collect();
    if actual != expected {
        return Err(format!(
            "result mismatch: {} distinct results, expected {}",
            actual.len(),
            expected.len()
        )
        .into());
    }

    println!(
        "Squared {} values on {} workers in {} ms",
        count,
        pool.worker_count(),
        started.elapsed().as_millis()
    );
    Ok(())
}

async fn fail(
    ctx: &Arc<Context>,
    demo: &DemoTasks,
    config: &Config,
    message: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = start_pool(ctx, config).await?;

    let handle = demo.fail.dispatch(TaskArgs::positional([message])).await?;
    let outcome = handle.wait().await;

    stop_pool(&pool, config).await?;

    match outcome {
        Err(StoreError::TaskFailed { task_uuid, failure }) => {
            println!("Task {task_uuid} failed:");
            println!("  Kind:       {}", failure.kind);
            println!("  Message:    {}", failure.message);
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(value) => Err(format!("task was expected to fail but returned {value}").into()),
    }
}

async fn list(ctx: &Arc<Context>) -> Result<(), Box<dyn std::error::Error>> {
    let ids = ctx.store().list().await?;

    println!("Records ({}):", ids.len());
    println!("{:<36}  {:<8}  {:<20}  {}", "ID", "STATE", "UPDATED", "TASK");
    println!("{}", "-".repeat(80));

    for id in ids {
        // Another process may consume a record between listing and loading.
        match ctx.store().load(&id).await {
            Ok(record) => println!(
                "{:<36}  {:<8}  {:<20}  {}",
                record.task_uuid,
                record.state,
                format_timestamp(&record.updated_at),
                record.task_name
            ),
            Err(StoreError::InvalidTask(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

async fn state(ctx: &Arc<Context>, task_uuid: &str) -> Result<(), Box<dyn std::error::Error>> {
    let task_uuid = TaskUuid::parse(task_uuid)?;
    let record = ctx.store().load(&task_uuid).await?;
    print_record(&record);
    Ok(())
}

fn print_record(record: &ResultRecord) {
    println!("  ID:         {}", record.task_uuid);
    println!("  Task:       {}", record.task_name);
    println!("  State:      {}", record.state);
    println!("  Created:    {}", format_timestamp(&record.created_at));
    println!("  Updated:    {}", format_timestamp(&record.updated_at));
    println!("  Args:       {}", serde_json::Value::from(record.args.clone()));
    if !record.kwargs.is_empty() {
        println!("  Kwargs:     {}", serde_json::Value::Object(record.kwargs.clone()));
    }
    if record.is_terminal() {
        println!("  Result:     {}", record.result);
    }
}

fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
