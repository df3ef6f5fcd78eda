use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Init,
    Ready,
    Down,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Init => write!(f, "initializing"),
            NodeStatus::Ready => write!(f, "ready"),
            NodeStatus::Down => write!(f, "down"),
        }
    }
}

/// A client machine registered with the control plane. Registration is
/// client-driven; `drain` is scheduler-authored and survives client
/// re-registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub datacenter: String,
    pub http_addr: String,
    pub attributes: HashMap<String, String>,
    pub status: NodeStatus,
    pub status_description: String,
    pub drain: bool,
    pub create_index: u64,
    pub modify_index: u64,
}

impl Node {
    pub fn terminal_status(&self) -> bool {
        matches!(self.status, NodeStatus::Down)
    }
}
