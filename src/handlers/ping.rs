//! Liveness probe

use anyhow::Result;
use async_nats::{Client, Subscriber};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tracing::debug;

/// Pong payload: which worker answered, and when
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PongResponse {
    message: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
}

/// Answer pings with the worker's name and version. The request payload
/// is ignored, so probes can send anything.
pub async fn handle_ping(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let Some(reply) = msg.reply else {
            continue;
        };

        let response = PongResponse {
            message: "pong",
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        };

        client
            .publish(reply, serde_json::to_vec(&response)?.into())
            .await?;

        debug!("Answered ping");
    }

    Ok(())
}
