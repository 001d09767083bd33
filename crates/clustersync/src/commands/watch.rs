//! `watch` command: follow the live alert channel and print every bus event.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;

use clustersync_core::{
    AlertSeverity, BusEvent, CredentialSource, EventBus, LiveEventClient, LiveHandlers,
    LiveOptions, SessionCredentials, Topic, WebSocketTransport,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output::{self, Tone, paint};

use super::snapshot;

// ── Event rendering ──────────────────────────────────────────────────

fn event_json(event: &BusEvent) -> Value {
    let topic = event.topic().to_string();
    match event {
        BusEvent::Updated {
            refresh_id,
            fetched_at,
        } => json!({
            "topic": topic,
            "refresh_id": refresh_id.to_string(),
            "fetched_at": fetched_at.to_rfc3339(),
        }),
        BusEvent::RefreshFailed { refresh_id, error } => json!({
            "topic": topic,
            "refresh_id": refresh_id.to_string(),
            "error": error.to_string(),
        }),
        BusEvent::Connected => json!({ "topic": topic }),
        BusEvent::Disconnected { reason } | BusEvent::AuthRejected { reason } => {
            json!({ "topic": topic, "reason": reason })
        }
        BusEvent::ReconnectExhausted {
            attempts,
            last_error,
        } => json!({
            "topic": topic,
            "attempts": attempts,
            "last_error": last_error,
        }),
        BusEvent::Alert(alert) => json!({ "topic": topic, "alert": alert.as_ref() }),
        BusEvent::AlertAcknowledged(ack) => json!({ "topic": topic, "alert_id": ack.alert_id }),
    }
}

fn event_text(event: &BusEvent, color: bool) -> String {
    let (tone, body) = match event {
        BusEvent::Updated { fetched_at, .. } => (
            Tone::Good,
            format!("snapshot refreshed at {}", fetched_at.to_rfc3339()),
        ),
        BusEvent::RefreshFailed { error, .. } => (Tone::Bad, format!("refresh failed: {error}")),
        BusEvent::Connected => (Tone::Good, "live channel open".into()),
        BusEvent::Disconnected { reason } => (Tone::Warn, format!("live channel lost: {reason}")),
        BusEvent::ReconnectExhausted {
            attempts,
            last_error,
        } => (
            Tone::Bad,
            format!("gave up after {attempts} attempts: {last_error}"),
        ),
        BusEvent::AuthRejected { reason } => (Tone::Bad, format!("credential rejected: {reason}")),
        BusEvent::Alert(alert) => {
            let tone = match alert.severity {
                AlertSeverity::Info => Tone::Muted,
                AlertSeverity::Warning => Tone::Warn,
                AlertSeverity::Critical => Tone::Bad,
            };
            (
                tone,
                format!(
                    "[{}] {}: {} ({})",
                    alert.severity, alert.source, alert.title, alert.message
                ),
            )
        }
        BusEvent::AlertAcknowledged(ack) => (Tone::Muted, format!("alert {} acknowledged", ack.alert_id)),
    };
    format!("{:<20} {body}", paint(&event.topic().to_string(), tone, color))
}

fn render_event(event: &BusEvent, format: &OutputFormat, color: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_json(&event_json(event), true)
        }
        OutputFormat::Yaml => Ok(format!("---\n{}", output::render_yaml(&event_json(event))?)),
        OutputFormat::Table | OutputFormat::Plain => Ok(event_text(event, color)),
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: WatchArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let Some(live_url) = resolved.sync.live_url.clone() else {
        return Err(CliError::Validation {
            field: "live".into(),
            reason: "no live channel address; set `live` in the profile or pass --live".into(),
        });
    };

    let bus = EventBus::new();
    let topics: Vec<Topic> = Topic::iter().collect();
    let mut events = bus.receiver(&topics);

    let credentials = Arc::new(SessionCredentials::with_token(resolved.token.clone()));
    let cancel = CancellationToken::new();

    let poller = if args.poll {
        let orchestrator = snapshot::orchestrator(resolved, Arc::clone(&credentials), bus.clone())?;
        let initial = orchestrator.clone();
        tokio::spawn(async move {
            initial.ensure_loaded().await;
        });
        Some(orchestrator.spawn_poller(resolved.sync.poll_interval, cancel.clone()))
    } else {
        None
    };

    let client = LiveEventClient::new(
        WebSocketTransport,
        bus.clone(),
        LiveOptions::from(&resolved.sync),
    );
    let guard = client.guard_credentials(credentials.subscribe());
    let source: Arc<dyn CredentialSource> = credentials.clone();
    client.open(live_url.clone(), source, LiveHandlers::new())?;
    tracing::info!(url = %live_url, "following live channel");

    let color = output::should_color(&global.color);
    let limit: Option<Duration> = args.duration.map(Into::into);
    let deadline = async move {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            () = &mut deadline => break Ok(()),
            event = events.recv() => {
                let Some(event) = event else { break Ok(()) };
                match render_event(&event, &global.output, color) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(err) => break Err(err),
                }
                match event {
                    BusEvent::AuthRejected { reason } => {
                        break Err(CliError::AuthFailed {
                            profile: resolved.profile.clone(),
                            message: reason,
                        });
                    }
                    BusEvent::ReconnectExhausted { attempts, last_error } if !args.keep_going => {
                        break Err(CliError::ReconnectExhausted { attempts, last_error });
                    }
                    _ => {}
                }
            }
        }
    };

    cancel.cancel();
    client.close();
    guard.abort();
    if let Some(poller) = poller {
        let _ = poller.await;
    }
    result
}
