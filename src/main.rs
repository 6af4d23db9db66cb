use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use humantime::parse_rfc3339;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use osmo::broadcast::BroadcastHub;
use osmo::clock::SystemClock;
use osmo::config::Configuration;
use osmo::tasks;
use slide_model::Action;

#[derive(Debug, Parser)]
#[command(
    name = "osmo",
    version,
    about = "Publishes the currently active signage slides"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Print what the next cycle would announce and exit
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Evaluate the dry run at this RFC 3339 instant instead of now
    #[arg(long = "now", value_name = "RFC3339", requires = "dry_run")]
    now: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        dry_run,
        now,
    } = Args::parse();

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    let store = cfg.store.open()?;

    if dry_run {
        let now = match now {
            Some(ts) => DateTime::<Utc>::from(
                parse_rfc3339(&ts).context("failed to parse --now")?,
            ),
            None => Utc::now(),
        };
        let slides = store.snapshot().context("failed to read slides")?;
        println!("# dry run at {}", now.to_rfc3339());
        match slide_model::next_action(now, &slides) {
            Action::Idle => {
                let idle = cfg.publisher.idle_interval;
                println!("{} (idle {idle:?})", osmo::EMPTY_SENTINEL);
            }
            Action::Rotate(active) => {
                for slide in active {
                    println!("{:>6}s  rank {:>3}  {}", slide.duration, slide.rank, slide.name);
                }
            }
        }
        return Ok(());
    }

    let hub = BroadcastHub::new(cfg.broadcast.capacity);
    let cancel = CancellationToken::new();

    // Ctrl-D/Ctrl-C cancel the pipeline
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sink = Vec::new();
            match io::stdin().read_to_end(&mut sink) {
                Ok(_) => tracing::info!("stdin closed; initiating shutdown"),
                Err(err) => tracing::warn!("stdin watcher failed: {err}"),
            }
            cancel.cancel();
        });
    } else {
        tracing::debug!("stdin is not a terminal; skipping shutdown watcher");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        received = sigterm.recv() => {
                            if received.is_some() {
                                tracing::info!("SIGTERM received; initiating shutdown");
                                cancel.cancel();
                            }
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();

    // Subscriber server (optional)
    if let Some(addr) = cfg.broadcast.listen {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind subscriber server on {addr}"))?;
        tasks.spawn({
            let hub = hub.clone();
            let request_timeout = cfg.broadcast.request_timeout;
            let cancel = cancel.clone();
            async move {
                tasks::subscribers::run(listener, hub, request_timeout, cancel)
                    .await
                    .context("subscriber server failed")
            }
        });
    } else {
        tracing::info!("broadcast.listen not set; announcements stay in-process");
    }

    // Publisher
    tasks.spawn({
        let store = store.clone();
        let broadcaster = Arc::new(hub.clone());
        let options = cfg.publisher.clone();
        let cancel = cancel.clone();
        async move {
            tasks::publisher::run(store, broadcaster, Arc::new(SystemClock), options, cancel)
                .await
                .context("publisher task failed")
        }
    });

    // Drain JoinSet; the first task to stop takes the rest down with it
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
        cancel.cancel();
    }

    Ok(())
}
