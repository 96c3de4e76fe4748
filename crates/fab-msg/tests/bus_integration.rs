//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "tests"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Integration coverage for the bus client and broker."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::time::Duration;

use fab_common::{MachineKind, RetryPolicy};
use fab_msg::{BusClient, BusEvent, InMemoryBroker, TopicRegistry};
use serde_json::json;

async fn connect(broker: &InMemoryBroker, id: &str) -> anyhow::Result<BusClient> {
    Ok(BusClient::connect(broker, id, RetryPolicy::once()).await?)
}

async fn next_message(client: &BusClient) -> anyhow::Result<fab_msg::BusMessage> {
    match tokio::time::timeout(Duration::from_secs(1), client.next_event()).await? {
        Some(BusEvent::Message(message)) => Ok(message),
        other => anyhow::bail!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn command_and_ack_exchange_between_client_and_device() -> anyhow::Result<()> {
    let broker = InMemoryBroker::new("memory://factory");
    let topics = TopicRegistry::machine(MachineKind::Hbw);
    let machine_client = connect(&broker, "fab-hbw").await?;
    let device = connect(&broker, "device-hbw").await?;
    machine_client.subscribe(topics.ack).await?;
    device.subscribe("fl/+/do").await?;

    machine_client
        .publish_json(topics.command, &json!({ "code": 2, "taskID": 11 }))
        .await?;
    let command = next_message(&device).await?;
    assert_eq!(command.topic, "fl/hbw/do");

    device.publish(fab_msg::BusMessage::new(topics.ack, command.payload.clone())).await?;
    let ack = next_message(&machine_client).await?;
    let value: serde_json::Value = ack.decode()?;
    assert_eq!(value["taskID"], 11);
    assert_eq!(machine_client.metrics().sent, 1);
    assert_eq!(machine_client.metrics().received, 1);
    Ok(())
}

#[tokio::test]
async fn broker_shutdown_is_reported_once_per_client() -> anyhow::Result<()> {
    let broker = InMemoryBroker::new("memory://factory");
    let first = connect(&broker, "first").await?;
    let second = connect(&broker, "second").await?;
    broker.shutdown();

    for client in [&first, &second] {
        let event = tokio::time::timeout(Duration::from_secs(1), client.next_event()).await?;
        assert!(matches!(event, Some(BusEvent::Disconnected { .. })));
        assert!(client.next_event().await.is_none());
    }
    Ok(())
}
