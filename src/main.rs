use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use stagegate_blueprint::WorkflowBlueprint;
use stagegate_engine::{Engine, EngineConfig};
use stagegate_relay::{ActivitySignal, SignalRelay};
use stagegate_scheduler::LogNotifier;
use stagegate_store::{SqliteStore, Store};

const DATABASE_FILE: &str = "stagegate.db";

/// Stagegate - staged approval workflows driven by external signals
#[derive(Parser)]
#[command(name = "stagegate")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.stagegate)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log level, overridden by RUST_LOG
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  /// Emit logs as JSON
  #[arg(long, global = true)]
  json_logs: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Start a run of a blueprint and relay signals from stdin until it completes
  ///
  /// Signals are JSON lines: {"instanceId": "...", "activityCode": "...", "approvalStatus": 1}
  Run {
    /// Path to the blueprint file (JSON)
    blueprint_file: PathBuf,

    /// Instance id to use instead of a generated one
    #[arg(long)]
    id: Option<String>,

    /// Time between polls, in milliseconds
    #[arg(long, default_value_t = 50_000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,
  },

  /// Resume every unfinished run and relay signals from stdin until they complete
  Resume {
    /// Time between polls, in milliseconds
    #[arg(long, default_value_t = 50_000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,
  },

  /// Print the stored snapshot of a run
  Status {
    /// The instance id
    instance_id: String,
  },

  /// Validate a blueprint file
  Validate {
    /// Path to the blueprint file (JSON)
    blueprint_file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level, cli.json_logs);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".stagegate"),
  };

  match cli.command {
    Some(Commands::Run {
      blueprint_file,
      id,
      poll_interval_ms,
    }) => block_on(run_blueprint(
      blueprint_file,
      id,
      poll_interval(poll_interval_ms),
      data_dir,
    )),
    Some(Commands::Resume { poll_interval_ms }) => {
      block_on(resume_runs(poll_interval(poll_interval_ms), data_dir))
    }
    Some(Commands::Status { instance_id }) => block_on(print_status(instance_id, data_dir)),
    Some(Commands::Validate { blueprint_file }) => block_on(validate_blueprint(blueprint_file)),
    None => {
      println!("stagegate - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing(level: &str, json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let subscriber = tracing_subscriber::registry().with(filter);

  // stdout carries command output, logs go to stderr
  if json {
    subscriber
      .with(fmt::layer().json().with_writer(std::io::stderr))
      .init();
  } else {
    subscriber
      .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
      .init();
  }
}

fn block_on(future: impl Future<Output = Result<()>>) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  let result = rt.block_on(future);
  // Don't wait for the blocking stdin read.
  rt.shutdown_background();
  result
}

fn poll_interval(millis: u64) -> Duration {
  Duration::from_millis(millis)
}

async fn open_store(data_dir: &Path) -> Result<Arc<dyn Store>> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let path = data_dir.join(DATABASE_FILE);
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open database: {}", path.display()))?;
  Ok(Arc::new(store))
}

async fn load_blueprint(path: &Path) -> Result<WorkflowBlueprint> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read blueprint file: {}", path.display()))?;

  WorkflowBlueprint::from_json_str(&content)
    .with_context(|| format!("invalid blueprint file: {}", path.display()))
}

fn create_engine(poll_interval: Duration, store: Arc<dyn Store>) -> Engine<LogNotifier> {
  let config = EngineConfig {
    poll_interval,
    ..EngineConfig::default()
  };
  Engine::with_notifier(config, store, LogNotifier)
}

/// Relay signals read as JSON lines from stdin until stdin closes.
fn spawn_signal_reader(relay: SignalRelay) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
      let line = match lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => break,
        Err(e) => {
          warn!(error = %e, "stdin_read_failed");
          break;
        }
      };

      let line = line.trim();
      if line.is_empty() {
        continue;
      }

      let signal = match ActivitySignal::from_json_str(line) {
        Ok(signal) => signal,
        Err(e) => {
          warn!(error = %e, "signal_rejected");
          continue;
        }
      };

      if let Err(e) = relay.relay_confirmed(&signal).await {
        warn!(
          instance_id = %signal.instance_id,
          activity_code = %signal.activity_code,
          error = %e,
          "signal_rejected"
        );
      }
    }
  })
}

async fn run_blueprint(
  blueprint_file: PathBuf,
  id: Option<String>,
  poll_interval: Duration,
  data_dir: PathBuf,
) -> Result<()> {
  let blueprint = Arc::new(load_blueprint(&blueprint_file).await?);
  eprintln!("Loaded blueprint: {}", blueprint.workflow_type);

  let store = open_store(&data_dir).await?;
  let engine = create_engine(poll_interval, store);

  let id = match id {
    Some(id) => {
      engine
        .start_with_id(&id, blueprint)
        .await
        .context("failed to start run")?;
      id
    }
    None => engine.start(blueprint).await.context("failed to start run")?,
  };
  eprintln!("Started run: {}", id);

  let reader = spawn_signal_reader(engine.relay());

  let wait = engine.wait(&id);
  tokio::pin!(wait);
  let outcome = tokio::select! {
    outcome = &mut wait => outcome.context("run failed")?,
    _ = tokio::signal::ctrl_c() => {
      // The pending wait owns the run task, so it is the one to await.
      engine.shutdown().await;
      let _ = wait.await;
      reader.abort();
      bail!("interrupted; resume the run with `stagegate resume`");
    }
  };
  reader.abort();

  for message in &outcome.messages {
    eprintln!("{}", message);
  }

  let snapshot = engine.status(&id).await.context("failed to load final snapshot")?;
  println!("{}", serde_json::to_string_pretty(&snapshot)?);

  Ok(())
}

async fn resume_runs(poll_interval: Duration, data_dir: PathBuf) -> Result<()> {
  let store = open_store(&data_dir).await?;
  let engine = create_engine(poll_interval, store);

  let ids = engine.restore().await.context("failed to restore runs")?;
  if ids.is_empty() {
    eprintln!("No unfinished runs.");
    return Ok(());
  }
  eprintln!("Resumed {} run(s)", ids.len());

  let reader = spawn_signal_reader(engine.relay());
  let waits = futures::future::join_all(ids.iter().map(|id| engine.wait(id)));
  tokio::pin!(waits);

  let results = tokio::select! {
    results = &mut waits => results,
    _ = tokio::signal::ctrl_c() => {
      engine.shutdown().await;
      let _ = waits.await;
      reader.abort();
      bail!("interrupted; unfinished runs remain stored");
    }
  };
  reader.abort();

  let mut failed = 0;
  for (id, result) in ids.iter().zip(results) {
    match result {
      Ok(outcome) => {
        info!(instance_id = %id, polls = outcome.polls, "run_finished");
        eprintln!("Run {} completed", id);
      }
      Err(e) => {
        failed += 1;
        eprintln!("Run {} failed: {}", id, e);
      }
    }
  }

  if failed > 0 {
    bail!("{} run(s) failed", failed);
  }
  Ok(())
}

async fn print_status(instance_id: String, data_dir: PathBuf) -> Result<()> {
  let store = open_store(&data_dir).await?;
  let snapshot = store
    .load_instance(&instance_id)
    .await
    .with_context(|| format!("failed to load run: {}", instance_id))?;

  println!("{}", serde_json::to_string_pretty(&snapshot)?);
  Ok(())
}

async fn validate_blueprint(blueprint_file: PathBuf) -> Result<()> {
  let blueprint = load_blueprint(&blueprint_file).await?;

  println!(
    "Valid blueprint: {} ({} stages, {} activities)",
    blueprint.workflow_type,
    blueprint.stages.len(),
    blueprint.activity_count()
  );
  for stage in &blueprint.stages {
    println!("  {} ({} activities)", stage.name, stage.activities.len());
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_poll_interval_defaults_to_fifty_seconds() {
    let cli = Cli::try_parse_from(["stagegate", "resume"]).unwrap();
    assert!(matches!(
      cli.command,
      Some(Commands::Resume {
        poll_interval_ms: 50_000
      })
    ));
  }

  #[test]
  fn test_zero_poll_interval_is_rejected() {
    assert!(Cli::try_parse_from(["stagegate", "resume", "--poll-interval-ms", "0"]).is_err());
    assert!(
      Cli::try_parse_from(["stagegate", "run", "flow.json", "--poll-interval-ms", "0"]).is_err()
    );
    assert!(
      Cli::try_parse_from(["stagegate", "run", "flow.json", "--poll-interval-ms", "1"]).is_ok()
    );
  }
}
