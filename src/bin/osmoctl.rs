//! Administrative client for the slide store.
//!
//! Records and removes slides and answers state queries; it never schedules
//! or publishes anything itself.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use humantime::parse_rfc3339_weak;
use tracing_subscriber::EnvFilter;

use osmo::config::Configuration;
use slide_model::{Slide, SlideState, SortKey};

/// Input format of the admin date-time picker, interpreted in local time.
const PICKER_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Parser)]
#[command(name = "osmoctl", version, about = "Manage scheduled signage slides")]
struct Cli {
    /// Path to YAML config (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Schedule a new slide
    Add {
        /// Asset file name; also the slide's unique key
        name: String,
        /// Window start (RFC 3339, unix seconds, or "YYYY-MM-DD HH:MM" local)
        #[arg(long, value_parser = parse_instant)]
        start: DateTime<Utc>,
        /// Window end, exclusive
        #[arg(long, value_parser = parse_instant)]
        end: DateTime<Utc>,
        /// Seconds on screen per rotation
        #[arg(long, allow_negative_numbers = true)]
        duration: i64,
        /// Lower ranks are shown first
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        rank: i64,
        #[arg(long)]
        span: Option<i64>,
    },
    /// Remove a scheduled slide
    Remove { name: String },
    /// List slides in a state
    List {
        #[arg(long, default_value = "all")]
        state: SlideState,
        #[arg(long, default_value = "start")]
        sort: SortKey,
        /// Evaluate states at this instant instead of now
        #[arg(long, value_parser = parse_instant)]
        now: Option<DateTime<Utc>>,
        #[arg(long)]
        json: bool,
    },
    /// Names of the slides active now, in rotation order
    Current {
        #[arg(long, value_parser = parse_instant)]
        now: Option<DateTime<Utc>>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    }
    .validated()
    .context("invalid configuration values")?;
    let store = cfg.store.open()?;

    match cli.command {
        Command::Add {
            name,
            start,
            end,
            duration,
            rank,
            span,
        } => {
            if !cfg.admin.allows(&name) {
                bail!(
                    "only these file extensions are allowed: {}",
                    cfg.admin.valid_extensions.join(", ")
                );
            }
            let slide = Slide::new(name, start, end, duration, rank)?.with_span(span);
            let name = slide.name.clone();
            store
                .add(slide)
                .with_context(|| format!("failed to create slide {name:?}"))?;
            println!("created slide {name:?}");
        }
        Command::Remove { name } => {
            store
                .remove(&name)
                .with_context(|| format!("failed to delete slide {name:?}"))?;
            println!("deleted slide {name:?}");
        }
        Command::List {
            state,
            sort,
            now,
            json,
        } => {
            let now = now.unwrap_or_else(Utc::now);
            let slides = store.slides_in_state_at(state, Some(sort), now)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&slides)?);
            } else {
                print_table(&slides, now);
            }
        }
        Command::Current { now, json } => {
            let names = store.current_at(now.unwrap_or_else(Utc::now))?;
            if json {
                println!("{}", serde_json::to_string(&names)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
    }

    Ok(())
}

fn print_table(slides: &[Slide], now: DateTime<Utc>) {
    if slides.is_empty() {
        println!("(no slides)");
        return;
    }
    for slide in slides {
        let marker = if slide.is_active_at(now) { '*' } else { ' ' };
        let span = slide
            .span
            .map_or_else(|| "-".to_string(), |span| span.to_string());
        println!(
            "{marker} {:<32} {}  {}  {:>5}s  rank {:>3}  span {}",
            slide.name,
            slide.start.with_timezone(&Local).format(PICKER_FORMAT),
            slide.end.with_timezone(&Local).format(PICKER_FORMAT),
            slide.duration,
            slide.rank,
            span,
        );
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, PICKER_FORMAT) {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .with_context(|| format!("{raw:?} does not exist in the local timezone"));
    }
    if let Ok(time) = parse_rfc3339_weak(raw) {
        return Ok(DateTime::<Utc>::from(time));
    }
    if let Ok(secs) = raw.parse::<f64>() {
        if secs.is_finite() {
            let millis = (secs * 1000.0).round() as i64;
            if let Some(at) = DateTime::<Utc>::from_timestamp_millis(millis) {
                return Ok(at);
            }
        }
    }
    bail!("unrecognised time {raw:?}; use RFC 3339, unix seconds, or \"{PICKER_FORMAT}\"")
}
