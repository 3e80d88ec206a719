use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use chrono::Local;
use hevc_queue::config::{BatchSetting, Config};
use hevc_queue::engine::probe::{ProbeTool, classify};
use hevc_queue::engine::session::{Session, SessionOptions, SessionOutcome};
use hevc_queue::engine::worker::{ConversionWorker, retry_failed};
use hevc_queue::engine::{self, DiscoveredFile, Encoder, FfmpegEncoder, QueueStore, TranscodeJob};
use hevc_queue::summary::{RunSummary, StatusCounts};
use std::path::Path;
use std::process::ExitCode;
use tracing::error;

/// Build the run configuration: file, then environment, then flags.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    config
        .apply_env_vars()
        .context("Invalid environment configuration")?;

    if let Some(dir) = &cli.directory {
        config.scan.root = dir.clone();
    }
    if let Some(batch) = &cli.batch {
        config.queue.batch = Some(BatchSetting::Text(batch.clone()));
    }
    if cli.persist {
        config.queue.persist = true;
    }
    if let Some(db) = &cli.db {
        config.queue.persist = true;
        config.queue.db_path = Some(db.clone());
    }
    if let Some(schema) = &cli.schema {
        config.queue.schema_path = schema.clone();
    }
    if cli.no_transcode {
        config.encoder.transcode = false;
    }
    if cli.delete {
        config.encoder.delete_originals = true;
    }
    if cli.retry_failed {
        config.queue.retry_failed = true;
    }
    if cli.debug {
        config.logging.debug = true;
    }
    if let Some(log_file) = &cli.log_file {
        config.logging.log_file = Some(log_file.clone());
    }
    Ok(config)
}

pub fn run(cli: Cli) -> ExitCode {
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = engine::init_logging(config.logging.debug, config.logging.log_file.as_deref())
    {
        eprintln!("Warning: {:#}", e);
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(&config),
        Commands::Scan => handle_scan(&config),
        Commands::DryRun => handle_dry_run(&config),
        Commands::Status { json } => handle_status(&config, json),
        Commands::Retry => handle_retry(&config),
        Commands::Probe { file } => handle_probe(&config, &file),
        Commands::CheckTools => handle_check_tools(&config),
        Commands::InitConfig => handle_init_config(cli.config.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        root: config.scan.root.clone(),
        persist: config.queue.persist,
        batch: config.batch_text(),
        transcode: config.encoder.transcode,
        delete_originals: config.encoder.delete_originals,
        retry_failed: config.queue.retry_failed,
        target_tag: config.encoder.codec_tag.clone(),
    }
}

fn open_store(config: &Config) -> Result<QueueStore> {
    let store = if config.queue.persist {
        QueueStore::open_durable(&config.db_path(), &config.queue.schema_path)?
    } else {
        QueueStore::open_ephemeral(&config.queue.schema_path)?
    };
    Ok(store)
}

fn print_summary(summary: &RunSummary) {
    for line in summary.lines() {
        println!("{}", line);
    }
}

fn handle_run(config: &Config) -> Result<ExitCode> {
    let store = open_store(config)?;
    let probe = config.metadata_probe();
    let encoder = FfmpegEncoder::new(config.encoder_settings());
    let tag_writer = config.tag_writer();

    let session = Session {
        store: &store,
        probe: probe.as_ref(),
        encoder: &encoder,
        tag_writer: &tag_writer,
        options: session_options(config),
    };

    let outcome = session.run()?;
    print_summary(outcome.summary());
    if let SessionOutcome::Retagged { retag, .. } = &outcome {
        println!(
            "Metadata: {} updated, {} failed, {} not MP4.",
            retag.updated, retag.failed, retag.not_mp4
        );
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_scan(config: &Config) -> Result<ExitCode> {
    println!("Scanning directory: {}", config.scan.root.display());
    let files = engine::scan(&config.scan.root)?;
    let probe = config.metadata_probe();

    let total = files.len();
    for file in files {
        let disposition = classify(&file, probe.as_ref(), &config.encoder.codec_tag);
        println!(
            "- {} [convert={}, status={}]",
            file.full_path().display(),
            disposition.convert,
            disposition.status
        );
    }
    println!("Total files: {}", total);
    Ok(ExitCode::SUCCESS)
}

fn handle_dry_run(config: &Config) -> Result<ExitCode> {
    // A durable queue that already has records is read as-is; otherwise the
    // tree is scanned into a throwaway queue so nothing durable is written.
    let durable = if config.queue.persist {
        let store = QueueStore::open_durable(&config.db_path(), &config.queue.schema_path)?;
        (store.count()? > 0).then_some(store)
    } else {
        None
    };
    let store = match durable {
        Some(store) => store,
        None => QueueStore::open_ephemeral(&config.queue.schema_path)?,
    };

    let probe = config.metadata_probe();
    let encoder = FfmpegEncoder::new(config.encoder_settings());
    let tag_writer = config.tag_writer();
    let session = Session {
        store: &store,
        probe: probe.as_ref(),
        encoder: &encoder,
        tag_writer: &tag_writer,
        options: SessionOptions {
            persist: !store.is_ephemeral(),
            ..session_options(config)
        },
    };
    session.populate()?;

    let limit = engine::resolve_batch_limit(config.batch_text().as_deref());
    let batch = store.select_batch(limit)?;
    if batch.is_empty() {
        println!("No video files to transcode.");
        return Ok(ExitCode::SUCCESS);
    }

    for record in &batch {
        if let Some(job) = TranscodeJob::for_record(record) {
            println!("{}", encoder.describe(&job));
        }
    }
    println!("Total jobs: {}", batch.len());
    Ok(ExitCode::SUCCESS)
}

fn handle_status(config: &Config, json: bool) -> Result<ExitCode> {
    let store = QueueStore::open_durable(&config.db_path(), &config.queue.schema_path)?;
    let counts = StatusCounts::load(&store)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("Queue: {}", store.db_path().display());
        println!("{}", counts);
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_retry(config: &Config) -> Result<ExitCode> {
    let store = QueueStore::open_durable(&config.db_path(), &config.queue.schema_path)?;
    let encoder = FfmpegEncoder::new(config.encoder_settings());
    let worker = ConversionWorker::new(&store, &encoder, config.encoder.delete_originals);

    let started_at = Local::now();
    let report = retry_failed(&store, &worker)?;
    if report.attempted == 0 {
        println!("No failed video files to retry.");
    }
    print_summary(&RunSummary::new(
        started_at,
        StatusCounts::load(&store)?,
        report,
    ));
    Ok(ExitCode::SUCCESS)
}

fn handle_probe(config: &Config, file: &Path) -> Result<ExitCode> {
    let file = file
        .canonicalize()
        .with_context(|| format!("Cannot access '{}'", file.display()))?;
    let (Some(parent), Some(name)) = (file.parent(), file.file_name()) else {
        anyhow::bail!("'{}' is not a file path", file.display());
    };
    let discovered = DiscoveredFile::new(
        parent.to_string_lossy().into_owned(),
        name.to_string_lossy().into_owned(),
    );

    let probe = config.metadata_probe();
    let disposition = classify(&discovered, probe.as_ref(), &config.encoder.codec_tag);
    println!("File: {}", file.display());
    println!("Convert: {}", disposition.convert);
    println!("Status: {}", disposition.status);
    Ok(ExitCode::SUCCESS)
}

fn handle_check_tools(config: &Config) -> Result<ExitCode> {
    let mut missing = false;
    let mut report = |name: &str, required: bool, version: Result<String>| match version {
        Ok(version) => println!("{} found: {}", name, version),
        Err(e) => {
            eprintln!("{}: {:#}", name, e);
            missing |= required;
        }
    };

    report(
        "ffmpeg",
        config.encoder.transcode,
        engine::ffmpeg_version(&config.encoder.ffmpeg),
    );
    report(
        "ffprobe",
        config.probe.tool == ProbeTool::Ffprobe,
        engine::ffprobe_version(&config.probe.ffprobe),
    );
    // exiftool also writes tags in the metadata-only pass
    report(
        "exiftool",
        config.probe.tool == ProbeTool::Exiftool || !config.encoder.transcode,
        engine::exiftool_version(&config.probe.exiftool),
    );

    Ok(if missing {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn handle_init_config(path: Option<&Path>) -> Result<ExitCode> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    if path.exists() {
        Config::load(Some(&path))?;
        println!("Config loaded successfully from {}", path.display());
    } else {
        Config::default().save(&path)?;
        println!("Default config saved to {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}
