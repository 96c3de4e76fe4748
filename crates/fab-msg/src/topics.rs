//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Publish/subscribe bus client and topic registry."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Static mapping of logical channels to wire topics.

use fab_common::MachineKind;

/// Environment sensor frames (`t`, `h`, `p`, `gr`, `iaq`, ...).
pub const ENVIRONMENT_TOPIC: &str = "i/bme680";
/// Brightness sensor frames (`br`, `ldr`).
pub const BRIGHTNESS_TOPIC: &str = "i/ldr";

/// Wire topics used by one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineTopics {
    /// Commands published by the client, consumed by the device.
    pub command: &'static str,
    /// Acknowledgements published by the device.
    pub ack: &'static str,
    /// Dashboard-only state feed.
    pub state: Option<&'static str>,
    /// Dashboard-only stock feed.
    pub stock: Option<&'static str>,
}

impl MachineTopics {
    /// Topics a client subscribes to; state and stock only when requested.
    pub fn subscriptions(&self, include_state: bool) -> Vec<&'static str> {
        let mut topics = vec![self.ack];
        if include_state {
            topics.extend(self.state);
            topics.extend(self.stock);
        }
        topics
    }
}

/// Lookup of wire topics per machine.
pub struct TopicRegistry;

impl TopicRegistry {
    /// Topics for `kind`.
    pub const fn machine(kind: MachineKind) -> MachineTopics {
        match kind {
            MachineKind::Hbw => MachineTopics {
                command: "fl/hbw/do",
                ack: "fl/hbw/ack",
                state: Some("f/i/state/hbw"),
                stock: Some("f/i/stock"),
            },
            MachineKind::Vgr => MachineTopics {
                command: "fl/vgr/do",
                ack: "fl/vgr/ack",
                state: Some("f/i/state/vgr"),
                stock: None,
            },
            MachineKind::Sld => MachineTopics {
                command: "fl/sld/do",
                ack: "fl/sld/ack",
                state: Some("f/i/state/sld"),
                stock: None,
            },
            MachineKind::Mpo => MachineTopics {
                command: "fl/mpo/do",
                ack: "fl/mpo/ack",
                state: Some("f/i/state/mpo"),
                stock: None,
            },
        }
    }

    /// Sensor topics feeding the readings cache.
    pub fn sensors() -> [&'static str; 2] {
        [ENVIRONMENT_TOPIC, BRIGHTNESS_TOPIC]
    }

    /// Reverse lookup: the machine whose ack topic is `topic`.
    pub fn machine_for_ack(topic: &str) -> Option<MachineKind> {
        MachineKind::ALL
            .into_iter()
            .find(|kind| Self::machine(*kind).ack == topic)
    }

    /// Reverse lookup: the machine whose command topic is `topic`.
    pub fn machine_for_command(topic: &str) -> Option<MachineKind> {
        MachineKind::ALL
            .into_iter()
            .find(|kind| Self::machine(*kind).command == topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_matches_wire_names() {
        let hbw = TopicRegistry::machine(MachineKind::Hbw);
        assert_eq!(hbw.command, "fl/hbw/do");
        assert_eq!(hbw.ack, "fl/hbw/ack");
        assert_eq!(hbw.stock, Some("f/i/stock"));
        assert_eq!(TopicRegistry::machine(MachineKind::Vgr).stock, None);
        assert_eq!(
            TopicRegistry::machine_for_ack("fl/sld/ack"),
            Some(MachineKind::Sld)
        );
        assert_eq!(
            TopicRegistry::machine_for_command("fl/mpo/do"),
            Some(MachineKind::Mpo)
        );
        assert_eq!(TopicRegistry::machine_for_ack("fl/mpo/do"), None);
    }

    #[test]
    fn state_topics_are_opt_in() {
        let hbw = TopicRegistry::machine(MachineKind::Hbw);
        assert_eq!(hbw.subscriptions(false), vec!["fl/hbw/ack"]);
        assert_eq!(
            hbw.subscriptions(true),
            vec!["fl/hbw/ack", "f/i/state/hbw", "f/i/stock"]
        );
    }
}
