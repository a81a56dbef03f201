use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser as _;
use tokio::io::AsyncBufReadExt as _;
use webtextextract::app::{Extraction, Orchestrator};
use webtextextract::backend::{ExtractionBackend, HttpBackend};
use webtextextract::cli::{Cli, Command, ExtractArgs, HistoryCommand, WatchArgs};
use webtextextract::config::Config;
use webtextextract::kv_store::{KeyValueStore, LocalFsKeyValueStore};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    webtextextract::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    if let Command::Detect(args) = &cli.command {
        match webtextextract::pattern::detect(&args.url) {
            Some(pattern) => {
                let json = serde_json::to_string_pretty(&pattern).context("serialize pattern")?;
                println!("{json}");
            }
            None => {
                tracing::debug!(
                    url = %args.url,
                    rules = ?webtextextract::pattern::rule_names(),
                    "no rule matched"
                );
                println!("no pattern");
            }
        }
        return Ok(());
    }

    let mut config = Config::from_env().context("load config")?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(?config, "loaded config");

    let store: Arc<dyn KeyValueStore> = Arc::new(LocalFsKeyValueStore::new(&config.data_dir));
    let backend: Arc<dyn ExtractionBackend> = Arc::new(
        HttpBackend::new(&config.backend_url, config.request_timeout)
            .context("build backend client")?,
    );
    let orchestrator = Orchestrator::open(&config, backend, store).await;

    match cli.command {
        Command::Detect(_) => {}
        Command::Extract(args) => {
            prepare(&orchestrator, &args);
            let extraction = orchestrator.extract_input().await.context("extract")?;
            print_extraction(&extraction);
        }
        Command::Next(args) => {
            prepare(&orchestrator, &args);
            let extraction = orchestrator.navigate(1).await.context("next")?;
            print_extraction(&extraction);
        }
        Command::Prev(args) => {
            prepare(&orchestrator, &args);
            let extraction = orchestrator.navigate(-1).await.context("prev")?;
            print_extraction(&extraction);
        }
        Command::Step(args) => {
            prepare(&orchestrator, &args.extract);
            let extraction = orchestrator.navigate(args.delta).await.context("step")?;
            print_extraction(&extraction);
        }
        Command::Follow(args) => {
            prepare(&orchestrator, &args.extract);
            let extraction = orchestrator
                .follow(args.direction.into())
                .await
                .context("follow")?;
            print_extraction(&extraction);
        }
        Command::History {
            command: HistoryCommand::List,
        } => {
            for entry in orchestrator.history().await {
                println!("{}\t{}\t{}", entry.chapter, entry.url, entry.timestamp);
            }
        }
        Command::History {
            command: HistoryCommand::Clear,
        } => {
            orchestrator.clear_history().await.context("history clear")?;
        }
        Command::Saved => {
            for saved in orchestrator.saved_content().await.context("saved")? {
                println!("{}\t{}\t{}", saved.timestamp, saved.title, saved.url);
            }
        }
        Command::Watch(args) => {
            watch(&orchestrator, &args).await.context("watch")?;
        }
    }

    Ok(())
}

fn prepare(orchestrator: &Arc<Orchestrator>, args: &ExtractArgs) {
    if let Some(url) = &args.url {
        orchestrator.set_input(url);
    }
    orchestrator.set_force_mode(args.force);
}

fn print_extraction(extraction: &Extraction) {
    tracing::info!(
        url = %extraction.url,
        chapter = %extraction.chapter,
        words = extraction.word_count(),
        "chapter ready"
    );
    println!("{}", extraction.text);
}

async fn watch(orchestrator: &Arc<Orchestrator>, args: &WatchArgs) -> anyhow::Result<()> {
    orchestrator.set_force_mode(args.force);
    orchestrator.set_auto_extract(true);
    let mut extractions = orchestrator.subscribe_extractions();
    let mut status = orchestrator.subscribe_status();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                let line = line.trim();
                let delta = match line {
                    "" => continue,
                    ":next" => 1,
                    ":prev" => -1,
                    url => {
                        orchestrator.set_input(url);
                        continue;
                    }
                };
                if let Err(err) = orchestrator.navigate(delta).await {
                    tracing::warn!(kind = err.kind(), %err, "navigate failed");
                }
            }
            Ok(extraction) = extractions.recv() => print_extraction(&extraction),
        }
    }

    // Stdin closed: run whatever the timer was still waiting on.
    let pending = orchestrator.auto_extract_pending();
    orchestrator.set_auto_extract(false);
    tokio::task::yield_now().await;
    // Every way out of a busy state reports a status.
    while orchestrator.state().is_busy() {
        if status.changed().await.is_err() {
            break;
        }
    }
    if pending {
        if let Err(err) = orchestrator.extract_input().await {
            tracing::warn!(kind = err.kind(), %err, "extract failed");
        }
    }
    while let Ok(extraction) = extractions.try_recv() {
        print_extraction(&extraction);
    }

    Ok(())
}
