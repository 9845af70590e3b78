use clap::{Arg, ArgAction, ArgMatches, Command};
use nppes_sync::config::Targets;
use nppes_sync::logging::{init_logging, LogConfig};
use nppes_sync::release::{locate_data_file, release_dir_name};
use nppes_sync::store::{AppwriteStore, MemoryStore};
use nppes_sync::{
    AppwriteConfig, BulkDeleter, DocumentStore, LogRefreshHook, Provisioner, RunOutcome, SyncRun,
    Tuning,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn cli() -> Command {
    Command::new("npi-sync")
        .about("Load the NPPES provider file into the document store")
        .subcommand_required(true)
        .arg(
            Arg::new("memory")
                .long("memory")
                .global(true)
                .help("Use an in-process store instead of Appwrite (dry run)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("run")
                .about("Provision, dedup and import (skipped once the dataset is initialized)")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .help("CSV file or unpacked release directory (default: downloads/<current release>)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("parallel-batches")
                        .long("parallel-batches")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("chunk-delay-ms")
                        .long("chunk-delay-ms")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("dead-letter")
                        .long("dead-letter")
                        .help("Write natural keys of failed writes to this file")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(Command::new("provision").about("Create or repair the provider collection schema"))
        .subcommand(Command::new("wipe").about("Delete every provider document (rate limited)"))
        .subcommand(
            Command::new("prune-attributes")
                .about("Remove attributes from the provider collection")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .action(ArgAction::Append)
                        .required(true),
                ),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    let logging = LogConfig::from_env(default_level).and_then(|c| init_logging(&c));
    if let Err(e) = logging {
        eprintln!("npi-sync: {e}");
        return ExitCode::FAILURE;
    }

    match dispatch(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("npi-sync: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<()> {
    let store: Arc<dyn DocumentStore> = if matches.get_flag("memory") {
        warn!("using in-memory store; nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(AppwriteStore::new(&AppwriteConfig::from_env()?)?)
    };
    let targets = Targets::from_env();

    match matches.subcommand() {
        Some(("run", sub)) => run(store, targets, sub).await,
        Some(("provision", _)) => {
            let report = SyncRun::new(store, targets, Tuning::default())
                .provision()
                .await?;
            info!(
                passes = report.passes,
                created = report.created.len(),
                existing = report.existing.len(),
                "provisioning done"
            );
            Ok(())
        }
        Some(("wipe", _)) => {
            let tuning = Tuning::default();
            let report = BulkDeleter::new(&*store, tuning.delete)
                .delete_all(&targets.database_id, &targets.collection_id)
                .await?;
            if report.failed > 0 {
                anyhow::bail!(
                    "{} documents could not be deleted (first: {})",
                    report.failed,
                    report.failed_ids.first().map(String::as_str).unwrap_or_default()
                );
            }
            Ok(())
        }
        Some(("prune-attributes", sub)) => {
            let names = sub.get_many::<String>("name").into_iter().flatten();
            let report = Provisioner::new(&*store, &targets.database_id, Tuning::default().provision)
                .prune_attributes(&targets.collection_id, names)
                .await;
            info!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "attribute pruning done"
            );
            Ok(())
        }
        _ => unreachable!("subcommand_required"),
    }
}

async fn run(store: Arc<dyn DocumentStore>, targets: Targets, sub: &ArgMatches) -> anyhow::Result<()> {
    let mut tuning = Tuning::default();
    if let Some(&n) = sub.get_one::<usize>("batch-size") {
        tuning.writer.batch_size = n;
    }
    if let Some(&n) = sub.get_one::<usize>("parallel-batches") {
        tuning.writer.max_parallel_batches = n;
    }
    if let Some(&n) = sub.get_one::<usize>("chunk-size") {
        tuning.writer.chunk_size = n;
    }
    if let Some(&ms) = sub.get_one::<u64>("chunk-delay-ms") {
        tuning.writer.chunk_delay = Duration::from_millis(ms);
    }

    let path = match sub.get_one::<PathBuf>("path") {
        Some(p) => p.clone(),
        None => Path::new("downloads").join(release_dir_name(chrono::Local::now().date_naive())),
    };
    let path = if path.is_dir() {
        locate_data_file(&path).await?
    } else {
        path
    };

    let sync = SyncRun::new(store, targets, tuning);
    let source = sync.source(&path);
    match sync.execute(&source, &LogRefreshHook).await? {
        RunOutcome::AlreadyInitialized => {}
        RunOutcome::Imported { ingest, .. } => {
            if let Some(dead_letter) = sub.get_one::<PathBuf>("dead-letter") {
                ingest.write.write_dead_letter(dead_letter).await?;
            }
        }
    }
    Ok(())
}
