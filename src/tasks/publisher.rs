use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use slide_model::{Action, EMPTY_SENTINEL};
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::Broadcaster;
use crate::clock::Clock;
use crate::config::PublisherOptions;
use crate::store::SlideStore;

/// Announces the active slides, in rank order, forever.
///
/// Rules:
/// - Each cycle starts from a fresh store snapshot; nothing carries over.
/// - With nothing active, publish the empty sentinel once and wait
///   `idle_interval` before looking again.
/// - Otherwise publish each active slide and hold it for its full duration.
///   The cycle's list is fixed once chosen; store edits apply next cycle.
/// - Store and publish failures are logged and never end the loop.
/// - Every wait races `cancel`, so shutdown never waits out a long slide.
#[instrument(skip_all, fields(channel = %options.channel))]
pub async fn run(
    store: Arc<dyn SlideStore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    options: PublisherOptions,
    cancel: CancellationToken,
) -> Result<()> {
    info!(idle_interval = ?options.idle_interval, "publisher started");

    while !cancel.is_cancelled() {
        let now = clock.now();
        let action = match store.snapshot() {
            Ok(slides) => Some(slide_model::next_action(now, &slides)),
            Err(err) => {
                warn!(error = %err, transport = err.is_transport(), "slide query failed; retrying");
                None
            }
        };
        let Some(action) = action else {
            if !hold(options.idle_interval, &cancel).await {
                break;
            }
            continue;
        };

        match action {
            Action::Idle => {
                info!(
                    wait_secs = options.idle_interval.as_secs_f64(),
                    "no active slides"
                );
                announce(broadcaster.as_ref(), &options.channel, EMPTY_SENTINEL);
                if !hold(options.idle_interval, &cancel).await {
                    break;
                }
            }
            Action::Rotate(slides) => {
                debug!(count = slides.len(), "starting rotation");
                for slide in slides {
                    info!(name = %slide.name, duration_secs = slide.duration, "publishing slide");
                    announce(broadcaster.as_ref(), &options.channel, &slide.name);
                    if !hold(slide.hold(), &cancel).await {
                        info!("cancel received; exiting publisher");
                        return Ok(());
                    }
                }
            }
        }
    }

    info!("cancel received; exiting publisher");
    Ok(())
}

fn announce(broadcaster: &dyn Broadcaster, channel: &str, message: &str) {
    match broadcaster.publish(channel, message) {
        Ok(reached) => debug!(message, reached, "announced"),
        Err(err) => warn!(message, error = %err, "publish failed; continuing"),
    }
}

/// Sleeps for `wait` unless cancelled first. Returns `false` on cancellation.
async fn hold(wait: Duration, cancel: &CancellationToken) -> bool {
    select! {
        _ = cancel.cancelled() => false,
        _ = sleep(wait) => true,
    }
}
