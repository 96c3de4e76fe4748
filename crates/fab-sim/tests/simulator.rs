//! ---
//! fab_section: "07-simulation"
//! fab_subsection: "tests"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Bus-level coverage for the factory simulator."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use fab_common::{MachineKind, SimulationConfig};
use fab_msg::{BusClient, BusEvent, InMemoryBroker, TopicRegistry, ENVIRONMENT_TOPIC};
use fab_sim::{spawn_factory_simulator, spawn_sensor_publisher, FactorySimulator, SensorGenerator};
use serde_json::{json, Value};
use tokio::sync::broadcast;

fn config() -> SimulationConfig {
    SimulationConfig {
        ack_delay: Duration::from_millis(10),
        ..SimulationConfig::default()
    }
}

async fn next_payload(bus: &BusClient) -> anyhow::Result<(String, Value)> {
    match tokio::time::timeout(Duration::from_secs(1), bus.next_event()).await? {
        Some(BusEvent::Message(message)) => Ok((message.topic.clone(), message.decode()?)),
        other => anyhow::bail!("unexpected bus event {:?}", other),
    }
}

#[tokio::test]
async fn sorting_line_acks_twice_with_sorted_type() -> anyhow::Result<()> {
    let broker = InMemoryBroker::new("memory://sim-tests");
    let simulator = Arc::new(FactorySimulator::new(
        BusClient::new("sim", Arc::new(broker.connect("sim")?)),
        &config(),
    ));
    simulator.subscribe().await?;
    let (shutdown, _) = broadcast::channel(1);
    let runtime = spawn_factory_simulator(simulator.clone(), shutdown.subscribe());

    let client = BusClient::new("SLDClient", Arc::new(broker.connect("SLDClient")?));
    let topics = TopicRegistry::machine(MachineKind::Sld);
    client.subscribe(topics.ack).await?;
    client
        .publish_json(
            topics.command,
            &json!({ "ts": "t", "code": 1, "taskID": 3, "productDID": "P", "processID": 1 }),
        )
        .await?;

    let (topic, first) = next_payload(&client).await?;
    assert_eq!(topic, "fl/sld/ack");
    assert_eq!(first["code"], "1");
    let (_, second) = next_payload(&client).await?;
    assert_eq!(second["code"], "2");
    assert_eq!(second["type"], "WHITE");
    assert_eq!(second["taskID"], 3);

    let _ = shutdown.send(());
    runtime.join().await;
    Ok(())
}

#[tokio::test]
async fn injected_fault_applies_to_the_next_command_only() -> anyhow::Result<()> {
    let broker = InMemoryBroker::new("memory://sim-faults");
    let simulator = Arc::new(FactorySimulator::new(
        BusClient::new("sim", Arc::new(broker.connect("sim")?)),
        &config(),
    ));
    simulator.subscribe().await?;
    simulator.inject_fault(MachineKind::Hbw, 6);
    let (shutdown, _) = broadcast::channel(1);
    let runtime = spawn_factory_simulator(simulator, shutdown.subscribe());

    let client = BusClient::new("HBWClient", Arc::new(broker.connect("HBWClient")?));
    let topics = TopicRegistry::machine(MachineKind::Hbw);
    client.subscribe(topics.ack).await?;

    client
        .publish_json(topics.command, &json!({ "ts": "t", "sound": 2 }))
        .await?;
    for task_id in [1u64, 2] {
        client
            .publish_json(
                topics.command,
                &json!({ "ts": "t", "code": 2, "taskID": task_id, "productDID": "", "processID": 0 }),
            )
            .await?;
        let (_, ack) = next_payload(&client).await?;
        assert_eq!(ack["taskID"], task_id);
        let expected: u64 = if task_id == 1 { 6 } else { 1 };
        assert_eq!(ack["code"], expected);
    }

    runtime.kill();
    runtime.join().await;
    Ok(())
}

#[tokio::test]
async fn sensor_publisher_emits_environment_frames() -> anyhow::Result<()> {
    let broker = InMemoryBroker::new("memory://sim-sensors");
    let listener = BusClient::new("readings", Arc::new(broker.connect("readings")?));
    listener.subscribe(ENVIRONMENT_TOPIC).await?;
    let (shutdown, _) = broadcast::channel(1);
    let runtime = spawn_sensor_publisher(
        BusClient::new("sensors", Arc::new(broker.connect("sensors")?)),
        SensorGenerator::new(1),
        Duration::from_millis(10),
        shutdown.subscribe(),
    );

    let (topic, frame) = next_payload(&listener).await?;
    assert_eq!(topic, ENVIRONMENT_TOPIC);
    assert!(frame["t"].as_f64().is_some());
    assert!(frame["iaq"].as_u64().is_some());

    let _ = shutdown.send(());
    runtime.join().await;
    Ok(())
}
