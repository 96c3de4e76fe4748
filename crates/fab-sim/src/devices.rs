//! ---
//! fab_section: "07-simulation"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "How each simulated device answers a command."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Device behaviour: every command is echoed back on the machine's ack
//! topic with an outcome code, after a fixed delay.

use std::time::Duration;

use fab_common::{MachineKind, SimulationConfig};
use fab_msg::TopicRegistry;
use serde_json::{json, Value};

const DONE: u64 = 1;
const VGR_GET_INFO: u64 = 2;
const SLD_MPO_STARTED: &str = "1";
const SLD_MPO_FINISHED: u64 = 2;

/// One acknowledgement to publish after `delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAck {
    /// Wait before publishing.
    pub delay: Duration,
    /// Ack topic.
    pub topic: &'static str,
    /// JSON body.
    pub payload: Value,
}

/// Canned device behaviour for every machine.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    ack_delay: Duration,
    info_workpiece_id: String,
    info_workpiece_type: String,
    sorted_type: String,
}

impl From<&SimulationConfig> for DeviceModel {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            ack_delay: config.ack_delay,
            info_workpiece_id: config.info_workpiece_id.clone(),
            info_workpiece_type: config.info_workpiece_type.clone(),
            sorted_type: config.sorted_type.clone(),
        }
    }
}

impl DeviceModel {
    /// Acknowledgements for `command`, sent by device `kind`.
    ///
    /// `fault` replaces the final outcome code. Messages without a task id,
    /// such as alert sounds, get no acknowledgement.
    pub fn respond(&self, kind: MachineKind, command: &Value, fault: Option<u64>) -> Vec<PlannedAck> {
        if command.get("taskID").is_none() {
            return Vec::new();
        }
        let topic = TopicRegistry::machine(kind).ack;
        let delay = self.ack_delay;
        let echo = |code: Value, extra: &[(&str, Value)]| {
            let mut payload = command.clone();
            if let Some(fields) = payload.as_object_mut() {
                fields.insert("code".to_owned(), code);
                for (key, value) in extra {
                    fields.insert((*key).to_owned(), value.clone());
                }
            }
            payload
        };

        match kind {
            MachineKind::Hbw => vec![PlannedAck {
                delay,
                topic,
                payload: echo(json!(fault.unwrap_or(DONE)), &[]),
            }],
            MachineKind::Vgr => {
                let code = command.get("code").and_then(Value::as_u64);
                let payload = match (code, fault) {
                    (Some(VGR_GET_INFO), None) => echo(
                        json!(DONE),
                        &[(
                            "workpiece",
                            json!({
                                "id": self.info_workpiece_id,
                                "type": self.info_workpiece_type,
                            }),
                        )],
                    ),
                    (_, Some(fault)) => echo(json!(fault), &[]),
                    (code, None) => echo(json!(code.unwrap_or(DONE)), &[]),
                };
                vec![PlannedAck {
                    delay,
                    topic,
                    payload,
                }]
            }
            MachineKind::Sld | MachineKind::Mpo => {
                let extra: Vec<(&str, Value)> = if kind == MachineKind::Sld {
                    vec![("type", json!(self.sorted_type))]
                } else {
                    Vec::new()
                };
                vec![
                    PlannedAck {
                        delay,
                        topic,
                        payload: echo(json!(SLD_MPO_STARTED), &extra),
                    },
                    PlannedAck {
                        delay: delay * 2,
                        topic,
                        payload: echo(json!(fault.unwrap_or(SLD_MPO_FINISHED).to_string()), &extra),
                    },
                ]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DeviceModel {
        DeviceModel::from(&SimulationConfig {
            ack_delay: Duration::from_millis(10),
            ..SimulationConfig::default()
        })
    }

    fn command(code: u64) -> Value {
        json!({ "ts": "t", "code": code, "taskID": 4, "productDID": "P", "processID": 2 })
    }

    #[test]
    fn storage_acks_echo_identity_with_done_code() {
        let acks = model().respond(MachineKind::Hbw, &command(5), None);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].topic, "fl/hbw/ack");
        assert_eq!(acks[0].payload["code"], 1);
        assert_eq!(acks[0].payload["taskID"], 4);
        assert_eq!(acks[0].payload["processID"], 2);
    }

    #[test]
    fn identification_reports_configured_workpiece() {
        let acks = model().respond(MachineKind::Vgr, &command(2), None);
        assert_eq!(acks[0].payload["code"], 1);
        assert_eq!(acks[0].payload["workpiece"]["id"], "2222");
        assert_eq!(acks[0].payload["workpiece"]["type"], "green");

        let moved = model().respond(MachineKind::Vgr, &command(4), None);
        assert_eq!(moved[0].payload["code"], 4);
        assert!(moved[0].payload.get("workpiece").is_none());
    }

    #[test]
    fn sorting_sends_progress_then_completion() {
        let acks = model().respond(MachineKind::Sld, &command(1), None);
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].payload["code"], "1");
        assert_eq!(acks[1].payload["code"], "2");
        assert_eq!(acks[1].payload["type"], "WHITE");
        assert_eq!(acks[1].delay, acks[0].delay * 2);

        let oven = model().respond(MachineKind::Mpo, &command(1), None);
        assert!(oven[1].payload.get("type").is_none());
    }

    #[test]
    fn faults_replace_the_outcome() {
        let acks = model().respond(MachineKind::Vgr, &command(2), Some(9));
        assert_eq!(acks[0].payload["code"], 9);
        assert!(acks[0].payload.get("workpiece").is_none());
        let acks = model().respond(MachineKind::Hbw, &command(4), Some(5));
        assert_eq!(acks[0].payload["code"], 5);
    }

    #[test]
    fn sound_commands_are_not_acknowledged() {
        let sound = json!({ "ts": "t", "sound": 2 });
        assert!(model().respond(MachineKind::Hbw, &sound, None).is_empty());
    }
}
