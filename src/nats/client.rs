use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::{HelloMessage, SessionMessage};
use crate::automation::CommandResult;

pub const HELLO_SUBJECT: &str = "agent.hello";

pub struct NatsClient {
    client: Client,
    agent_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, agent_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, agent_id })
    }

    pub fn command_subject(&self) -> String {
        format!("agent.command.{}", self.agent_id)
    }

    pub fn result_subject(&self) -> String {
        format!("agent.result.{}", self.agent_id)
    }

    pub fn audio_subject(&self) -> String {
        format!("agent.audio.{}", self.agent_id)
    }

    /// Announce this agent and the surface it drives
    pub async fn announce(&self, surface_title: &str) -> Result<()> {
        let message = HelloMessage {
            agent_id: self.agent_id.clone(),
            surface_title: surface_title.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        self.publish_json(HELLO_SUBJECT.to_string(), &message)
            .await
            .context("Failed to announce agent")
    }

    /// Subscribe to commands addressed to this agent
    pub async fn subscribe_commands(&self) -> Result<async_nats::Subscriber> {
        let subject = self.command_subject();

        info!("Subscribing to commands on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to commands")?;

        info!("Subscribed to {}", subject);

        Ok(subscriber)
    }

    pub async fn publish_result(&self, result: &CommandResult) -> Result<()> {
        self.publish_json(self.result_subject(), result)
            .await
            .context("Failed to publish command result")
    }

    pub async fn publish_session(&self, message: &SessionMessage) -> Result<()> {
        self.publish_json(self.audio_subject(), message)
            .await
            .context("Failed to publish session report")
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn publish_json<T: serde::Serialize>(&self, subject: String, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let bytes = payload.len();

        self.client.publish(subject.clone(), payload.into()).await?;
        self.client.flush().await?;

        debug!("Published {} bytes to {}", bytes, subject);

        Ok(())
    }
}
