// Remote command channel
//
// Keeps a NATS subscription open for commands addressed to this agent,
// publishes every command result and session report, and reconnects after a
// fixed delay whenever the connection fails or the subscription ends.

use anyhow::Result;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use super::client::NatsClient;
use super::messages::SessionMessage;
use crate::automation::Dispatcher;
use crate::session::SessionReport;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub agent_id: String,
    /// Wait between reconnect attempts (default: 30 seconds)
    pub reconnect_delay: Duration,
}

/// Run the command channel until `shutdown` flips to true
pub async fn run_command_channel(
    config: ChannelConfig,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut reports = dispatcher.controller().subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        match serve(&config, &dispatcher, &mut reports, &mut shutdown).await {
            Ok(()) => warn!("Command subscription ended"),
            Err(e) => error!("Command channel error: {:#}", e),
        }

        if *shutdown.borrow() {
            break;
        }

        info!(
            "Attempting to reconnect in {} seconds...",
            config.reconnect_delay.as_secs()
        );
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("Command channel stopped");
}

async fn serve(
    config: &ChannelConfig,
    dispatcher: &Dispatcher,
    reports: &mut broadcast::Receiver<SessionReport>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let client = NatsClient::connect(&config.url, config.agent_id.clone()).await?;
    client.announce(dispatcher.surface().title()).await?;
    let mut commands = client.subscribe_commands().await?;
    let mut reports_open = true;

    loop {
        tokio::select! {
            message = commands.next() => {
                let Some(message) = message else {
                    return Ok(());
                };
                let line = String::from_utf8_lossy(&message.payload);
                let result = dispatcher.execute_line(&line).await;
                if let Err(e) = client.publish_result(&result).await {
                    error!("{:#}", e);
                }
            }
            report = reports.recv(), if reports_open => match report {
                Ok(report) => {
                    let message = SessionMessage::from_report(client.agent_id(), &report);
                    if let Err(e) = client.publish_session(&message).await {
                        error!("{:#}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} session reports while busy", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    reports_open = false;
                }
            },
            _ = shutdown.changed() => return Ok(()),
        }
    }
}
