use anyhow::{bail, Context, Result};
use hop::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use hop::cli::output::*;
use hop::cli::{Cli, Command};
use hop::core::config::PipelineConfig;
use hop::core::Task;
use hop::execution::{ChannelSink, EventBus, Scheduler};
use hop::persistence::{spawn_recorder, RunStore, SqliteRunStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd, &cli)?,
        Command::History(cmd) => show_history(cmd, &cli).await?,
    }

    Ok(())
}

fn db_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.db {
        Some(path) => Ok(path.clone()),
        None => SqliteRunStore::default_path(),
    }
}

async fn open_store(cli: &Cli) -> Result<Arc<dyn RunStore>> {
    let path = db_path(cli)?;
    debug!("Opening run history at {}", path.display());
    Ok(Arc::new(SqliteRunStore::new(&path).await?))
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let path = PipelineConfig::resolve(&cli.pipelines_dir, &cmd.pipeline)?;
    let config = PipelineConfig::from_file(&path).context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.id).bold());
    if let Some(schedule) = &config.schedule {
        println!("{} Schedule {} is ignored for manual runs", WARN, style(schedule).dim());
    }

    let pipeline = config.to_pipeline()?;

    let bus = Arc::new(EventBus::new());
    let reporter = Arc::new(ConsoleReporter::new(pipeline.len(), !cmd.quiet));
    {
        let reporter = reporter.clone();
        bus.add_handler(move |event| reporter.handle(event));
    }

    // Set up persistence
    let recorder = if cmd.no_history {
        None
    } else {
        let store = open_store(cli).await?;
        let (sink, rx) = ChannelSink::channel();
        bus.add_sink(sink);
        Some(spawn_recorder(store, rx))
    };

    let scheduler = Scheduler::with_processes(bus.clone());
    println!();
    let report = scheduler.run_pipeline(&pipeline).await?;

    // Dropping the last bus handle closes the recorder's channel
    drop(scheduler);
    drop(bus);
    if let Some(recorder) = recorder {
        recorder.await.context("Run recorder panicked")?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&report.run_id.to_string()[..8]).dim()
        );
    }

    let elapsed = report
        .ended_at
        .signed_duration_since(report.started_at)
        .to_std()
        .unwrap_or_default();

    if report.is_success() {
        println!(
            "\n{} {} completed {} in {}",
            CHECK,
            style(&pipeline.id).bold(),
            style("successfully").green(),
            format_duration(elapsed)
        );
    } else {
        println!("\n{} {} {}", CROSS, style(&pipeline.id).bold(), style("failed").red());
        for (task_id, err) in report.failed_tasks() {
            error!("Task '{}': {}", task_id, err);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand, cli: &Cli) -> Result<()> {
    let result = PipelineConfig::resolve(&cli.pipelines_dir, &cmd.pipeline)
        .and_then(PipelineConfig::from_file)
        .and_then(|config| {
            let pipeline = config.to_pipeline()?;
            let order = pipeline.execution_order();
            Ok((pipeline, order))
        });

    if cmd.json {
        let value = match &result {
            Ok((pipeline, order)) => json!({
                "valid": true,
                "id": pipeline.id,
                "fail_fast": pipeline.fail_fast,
                "schedule": pipeline.schedule,
                "tasks": pipeline.tasks().iter().map(|t| t.as_ref()).collect::<Vec<&Task>>(),
                "order": order,
            }),
            Err(e) => json!({ "valid": false, "error": format!("{:#}", e) }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        if result.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("{} Validating pipeline...", INFO);
    match result {
        Ok((pipeline, order)) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  ID: {}", style(&pipeline.id).bold());
            println!("  Tasks: {}", style(pipeline.len()).cyan());
            println!("  Fail fast: {}", style(pipeline.fail_fast).cyan());
            println!("\n  Execution order:");
            for (i, task) in order.iter().filter_map(|id| pipeline.task(id)).enumerate() {
                println!(
                    "    {}. {} {}",
                    i + 1,
                    style(&task.id).cyan(),
                    style(task.display_name()).dim()
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Pipeline configuration is invalid:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn find_run_id(store: &dyn RunStore, id: &str) -> Result<Uuid> {
    if let Ok(run_id) = Uuid::parse_str(id) {
        return Ok(run_id);
    }

    // Accept the short prefixes printed by `run` and `history`
    let matches: Vec<Uuid> = store
        .list_runs(None, usize::MAX)
        .await?
        .into_iter()
        .map(|run| run.id)
        .filter(|run_id| run_id.to_string().starts_with(id))
        .collect();

    match matches.as_slice() {
        [run_id] => Ok(*run_id),
        [] => bail!("No run matches '{}'", id),
        _ => bail!("Run ID prefix '{}' is ambiguous", id),
    }
}

async fn show_history(cmd: &HistoryCommand, cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;

    if let Some(id) = &cmd.run {
        return show_run(store.as_ref(), id, cmd.json).await;
    }

    let runs = store.list_runs(cmd.pipeline.as_deref(), cmd.limit).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No run history found", INFO);
        return Ok(());
    }

    println!("{} Run history:", INFO);
    for run in &runs {
        println!("  {}", format_run(run));
    }

    Ok(())
}

async fn show_run(store: &dyn RunStore, id: &str, as_json: bool) -> Result<()> {
    let run_id = find_run_id(store, id).await?;
    let Some(run) = store.load_run(run_id).await? else {
        bail!("Run {} not found", run_id);
    };
    let task_runs = store.task_runs(run_id).await?;

    let mut logs = Vec::with_capacity(task_runs.len());
    for task_run in &task_runs {
        logs.push(store.logs(task_run.id).await?);
    }

    if as_json {
        let tasks: Vec<_> = task_runs
            .iter()
            .zip(&logs)
            .map(|(task_run, lines)| json!({ "task_run": task_run, "logs": lines }))
            .collect();
        let value = json!({ "run": run, "tasks": tasks });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", format_run(&run));
    for (task_run, lines) in task_runs.iter().zip(&logs) {
        println!("  {}", format_task_run(task_run));
        for line in lines {
            println!("  {}", format_log_line(&task_run.task_id, line.level, &line.message));
        }
    }

    Ok(())
}
