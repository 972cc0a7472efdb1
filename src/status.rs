//! Stack and container status codes, and the roll-up rule that reduces a
//! set of container states to one stack-level code.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One of the five stack-level status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    Unknown,
    /// Compose file present on disk, never deployed.
    CreatedFile,
    /// Containers created but none started.
    CreatedStack,
    Running,
    Exited,
}

impl StackStatus {
    /// Long-form presentation name, e.g. for a status badge.
    pub fn name(self) -> &'static str {
        match self {
            StackStatus::CreatedFile => "draft",
            StackStatus::CreatedStack => "created_stack",
            StackStatus::Running => "running",
            StackStatus::Exited => "exited",
            StackStatus::Unknown => "unknown",
        }
    }

    /// Short presentation name.
    pub fn name_short(self) -> &'static str {
        match self {
            StackStatus::CreatedFile | StackStatus::CreatedStack => "inactive",
            StackStatus::Running => "active",
            StackStatus::Exited => "exited",
            StackStatus::Unknown => "?",
        }
    }

    /// Presentation color hint.
    pub fn color(self) -> &'static str {
        match self {
            StackStatus::CreatedFile | StackStatus::CreatedStack => "dark",
            StackStatus::Running => "primary",
            StackStatus::Exited => "danger",
            StackStatus::Unknown => "secondary",
        }
    }
}

/// Per-container runtime state, as reported by the target runtime CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Created,
    Unknown,
}

/// Reduce a non-empty set of container states belonging to one stack to a
/// single `StackStatus`. An empty set maps to `Unknown`.
pub fn rollup<'a, I>(states: I) -> StackStatus
where
    I: IntoIterator<Item = &'a ContainerState>,
{
    let states: Vec<&ContainerState> = states.into_iter().collect();
    if states.is_empty() {
        return StackStatus::Unknown;
    }

    let distinct: HashSet<&ContainerState> = states.iter().copied().collect();
    if distinct.len() == 1 {
        return match **distinct.iter().next().unwrap() {
            ContainerState::Running => StackStatus::Running,
            ContainerState::Stopped => StackStatus::Exited,
            ContainerState::Created => StackStatus::CreatedStack,
            ContainerState::Unknown => StackStatus::Unknown,
        };
    }

    if distinct.contains(&ContainerState::Running) {
        StackStatus::Running
    } else if distinct.contains(&ContainerState::Stopped) {
        StackStatus::Exited
    } else {
        StackStatus::Unknown
    }
}
