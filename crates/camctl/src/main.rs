mod error;

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use camctl_api::SessionClient;
use camctl_config::{Config, LogSection};
use camctl_core::{ContextUpdate, ControlManager, SubscriptionEvent, SubscriptionManager};

use crate::error::MonitorError;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

fn init_tracing(log: &LogSection) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> Result<Config, MonitorError> {
    let path = std::env::args_os()
        .nth(1)
        .map_or_else(camctl_config::config_path, PathBuf::from);

    camctl_config::load_config_from(&path).map_err(|source| MonitorError::Config {
        path: path.display().to_string(),
        source,
    })
}

async fn run() -> Result<(), MonitorError> {
    let config = load_config()?;
    init_tracing(&config.log);

    let host = config.device.host.trim().to_owned();
    let client = Arc::new(SessionClient::new(config.endpoint())?);
    let control = ControlManager::new(Arc::clone(&client), config.control_config());
    let events = SubscriptionManager::with_sink(config.subscription_config(), log_update);

    let mut stream = events.event_stream();
    if !events.connect(&host).await {
        events.destroy();
        return Err(MonitorError::StreamUnavailable {
            host,
            http_port: config.device.http_port,
            stream_port: config.device.stream_port,
        });
    }

    // Validated at load time; a bad mode never gets here.
    if let Ok(Some(mode)) = config.acquire_mode() {
        if !control.acquire_control(mode).await {
            warn!(device = %host, %mode, "could not take control, monitoring only");
        }
    }

    info!(device = %host, "monitoring, press Ctrl-C to stop");
    loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "cannot listen for Ctrl-C");
                }
                break;
            }
            event = stream.next() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }

    info!("shutting down");
    control.cleanup().await;
    if let Err(e) = client.logout().await {
        debug!(error = %e, "logout failed");
    }
    events.destroy();
    Ok(())
}

fn log_update(update: &ContextUpdate) {
    info!(
        device = %update.device,
        update = %serde_json::to_string(update).unwrap_or_default(),
        "context update"
    );
}

fn log_event(event: &SubscriptionEvent) {
    match event {
        SubscriptionEvent::Connected { address } => info!(device = %address, "event stream up"),
        SubscriptionEvent::Disconnected { address, reason } => {
            warn!(device = %address, reason = %reason, "event stream down");
        }
        SubscriptionEvent::Message { address, message, .. } => {
            debug!(device = %address, kind = ?message.kind, "stream message");
        }
        SubscriptionEvent::Reconnecting {
            address,
            attempt,
            delay,
        } => info!(device = %address, attempt, ?delay, "reconnecting"),
        SubscriptionEvent::ReconnectFailed { address, attempts } => {
            error!(device = %address, attempts, "gave up reconnecting");
        }
        SubscriptionEvent::Error { address, message } => {
            warn!(device = %address, error = %message, "event stream error");
        }
    }
}
