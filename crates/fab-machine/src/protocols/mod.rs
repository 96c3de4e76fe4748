//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Per-machine command encoding and acknowledgement classification."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Machine protocols. Each machine is a zero-sized type implementing
//! [`MachineProtocol`]; the generic client does the rest.

mod hbw;
mod mpo;
mod sld;
mod vgr;

pub use hbw::{Hbw, HbwTask};
pub use mpo::{Mpo, MpoTask};
pub use sld::{Sld, SldTask};
pub use vgr::{Vgr, VgrTask};

use std::fmt::{Debug, Display};
use std::str::FromStr;

use fab_common::MachineKind;
use thiserror::Error;

use crate::wire::{AckMessage, CommandHeader, TaskCommand, Workpiece};

/// Task name that is not part of a machine's catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task name {0:?}")]
pub struct UnknownTaskName(pub String);

/// What an acknowledgement means for the active task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The task succeeded.
    Success,
    /// The task failed; `note` is recorded on the ledger.
    Failure { note: &'static str },
    /// Identification finished; the device reported the workpiece it saw.
    InfoResult { workpiece: Option<Workpiece> },
    /// Intermediate notification. The task is still running.
    Progress,
}

/// Everything that differs between machines.
pub trait MachineProtocol: Send + Sync + 'static {
    /// Task table of the machine.
    type Task: Copy + Debug + Display + FromStr<Err = UnknownTaskName> + Send + Sync;

    /// Machine this protocol drives.
    const KIND: MachineKind;

    /// Task parameters fetched from the ledger before dispatch, in order.
    fn required_inputs(_task: Self::Task) -> &'static [&'static str] {
        &[]
    }

    /// Command for `task`; `inputs` holds the values of [`Self::required_inputs`].
    fn build_command(task: Self::Task, header: CommandHeader, inputs: &[String]) -> TaskCommand;

    /// Outcome of an acknowledgement for this machine.
    fn classify(ack: &AckMessage) -> AckOutcome;
}

/// Value of the `index`-th input, or empty when the ledger returned fewer.
pub(crate) fn input(inputs: &[String], index: usize) -> String {
    inputs.get(index).cloned().unwrap_or_default()
}

/// Closed task-name enum with wire names, `Display` and `FromStr`.
macro_rules! task_catalog {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = concat!("`", $wire, "` task.")]
                $variant
            ),+
        }

        impl $name {
            /// Every task in catalog order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of the task.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::protocols::UnknownTaskName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err($crate::protocols::UnknownTaskName(other.to_owned())),
                }
            }
        }
    };
}

pub(crate) use task_catalog;

#[cfg(test)]
mod tests {
    use super::*;

    fn names<T: Display>(all: &[T]) -> Vec<String> {
        all.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn catalogs_match_the_shared_registry() {
        assert_eq!(names(HbwTask::ALL), MachineKind::Hbw.task_catalog());
        assert_eq!(names(VgrTask::ALL), MachineKind::Vgr.task_catalog());
        assert_eq!(names(SldTask::ALL), MachineKind::Sld.task_catalog());
        assert_eq!(names(MpoTask::ALL), MachineKind::Mpo.task_catalog());
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!("storeproduct".parse::<HbwTask>().is_err());
        assert_eq!(
            "Calibrate".parse::<HbwTask>().unwrap_err(),
            UnknownTaskName("Calibrate".into())
        );
    }
}
