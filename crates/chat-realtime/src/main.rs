//! Chat realtime client entry point
//!
//! Run with:
//! ```bash
//! CHATROOM_ID=668 STREAMER_ID=676 cargo run -p chat-realtime
//! ```
//!
//! Configuration is loaded from environment variables.

use chat_common::{try_init_tracing, AppConfig, AppError, AppResult, ResilienceSettings};
use chat_core::ChatEvent;
use chat_realtime::{
    ConnectionSession, HttpAuthProvider, SessionConfig, SessionDeps, StaticIdentity, WsConnector,
};
use chat_resilience::{spawn_error_rate_monitor, ResilienceRegistry, TracingMetricsSink};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, code = e.error_code(), "chat-realtime failed");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    let settings = ResilienceSettings::load(config.resilience_path.as_deref().map(Path::new))?;

    info!(
        env = ?config.app.env,
        room_id = %config.room.room_id,
        streamer_id = %config.room.streamer_id,
        "configuration loaded"
    );

    let registry = Arc::new(ResilienceRegistry::new(settings, Arc::new(TracingMetricsSink))?);
    let monitor = spawn_error_rate_monitor(
        registry.clone(),
        registry.settings().error_rates.check_interval(),
    );

    let deps = SessionDeps::new(
        registry,
        Arc::new(WsConnector),
        Arc::new(
            HttpAuthProvider::new(config.auth.endpoint.clone(), config.auth.token.clone())
                .map_err(AppError::internal)?,
        ),
        Arc::new(StaticIdentity::from_config(&config.room)),
    );

    let session = ConnectionSession::spawn(SessionConfig::from_app_config(&config), deps)?;
    let mut events = session.subscribe_events();
    session.connect().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    log_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer lagging"),
                Err(RecvError::Closed) => break,
            },
            () = session.closed() => {
                while let Ok(event) = events.try_recv() {
                    log_event(&event);
                }
                info!(phase = %session.state(), "session stopped");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.map_err(AppError::internal)?;
                info!("shutting down");
                break;
            }
        }
    }

    session.close().await;
    session.join().await?;
    monitor.abort();
    Ok(())
}

fn log_event(event: &ChatEvent) {
    match event {
        ChatEvent::Message(message) => info!(
            kind = ?message.kind,
            channel = ?message.channel,
            data = %message.data,
            "message"
        ),
        ChatEvent::Channel(update) => info!(kind = ?update.kind, data = %update.data, "channel"),
        ChatEvent::Error {
            category, message, ..
        } => warn!(%category, %message, "error"),
        other => info!(event = other.name(), detail = ?other, "session event"),
    }
}
