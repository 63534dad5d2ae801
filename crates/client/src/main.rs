//! Arcana client - headless process runner.
//!
//! Attaches to (or starts) one divination process, optionally pays for it
//! with a BLIK code, and logs every event until the process settles.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arcana_client::application::checkout::submit_blik_payment;
use arcana_client::application::dispatcher::{DispatchOptions, EventHandlerRegistry};
use arcana_client::application::session::PaymentSession;
use arcana_client::config::ClientConfig;
use arcana_client::infrastructure::http_client::OrchestratorClient;
use arcana_client::infrastructure::messaging::{ConnectionState, LiveConnections, ProcessKey};
use arcana_client::infrastructure::websocket::connect;
use arcana_client::ports::OrchestratorPort;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcana_client=debug,arcana_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Arcana client");

    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    let user_id = config
        .user_id
        .clone()
        .context("ARCANA_USER_ID environment variable is required")?;

    let api = OrchestratorClient::new(config.api_base_url.clone(), config.api_timeout);

    let process_id = match config.process_id.clone() {
        Some(process_id) => process_id,
        None => api
            .start_divination_process(&user_id, &config.form)
            .await
            .context("Failed to start divination process")?
            .process_id
            .context("Backend did not return a process id")?,
    };
    let key = ProcessKey::new(user_id, process_id);
    tracing::info!(user_id = %key.user_id, process_id = %key.process_id, "Attaching to process");

    let session = PaymentSession::new();
    let registry = Arc::new(EventHandlerRegistry::with_options(DispatchOptions {
        log_events: config.log_events,
        ..DispatchOptions::default()
    }));
    registry.install(&session.handlers());

    let live = LiveConnections::new();
    let connection = connect(&config.transport, key.clone(), Arc::clone(&registry), &live)
        .context("Connection was not opened")?;

    let state = connection.wait_for_state(ConnectionState::Subscribed).await;
    if state != ConnectionState::Subscribed {
        anyhow::bail!("Connection ended before subscribing ({state:?})");
    }

    if let Some(code) = config.blik_code.as_deref() {
        submit_blik_payment(&api, &key, code)
            .await
            .context("BLIK payment failed")?;
    }

    let observer = connection.observer();
    tokio::select! {
        snapshot = session.settled() => {
            tracing::info!(status = ?snapshot.status, cards = snapshot.cards.len(), "Process settled");
        }
        state = observer.wait_until(ConnectionState::is_terminal) => {
            tracing::warn!(state = ?state, "Connection ended before the process settled");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    let final_state = connection.close().await;
    tracing::info!(state = ?final_state, "Arcana client stopped");
    Ok(())
}
