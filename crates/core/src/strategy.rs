//! Strategy identifiers for the agent loop.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The enumerated set of loop strategies a turn can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Explicit two-node state machine with per-thread checkpoints
    Graph,
    /// Loop delegated to a synchronous single-shot runner
    ManagedSync,
    /// Loop delegated to an event-streaming runner
    ManagedStream,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [Self::Graph, Self::ManagedSync, Self::ManagedStream];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::ManagedSync => "managed-sync",
            Self::ManagedStream => "managed-stream",
        }
    }

    /// Canonical ids of every strategy, in declaration order.
    pub fn supported() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    /// Accepts the canonical ids plus the legacy framework names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" | "langgraph" => Ok(Self::Graph),
            "managed-sync" | "managed_sync" | "openai_agents" => Ok(Self::ManagedSync),
            "managed-stream" | "managed_stream" | "google_adk" => Ok(Self::ManagedStream),
            other => Err(Error::config(format!(
                "unknown agent strategy '{other}', expected one of: {}",
                Self::supported().join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_legacy_ids() {
        assert_eq!("graph".parse::<StrategyKind>().unwrap(), StrategyKind::Graph);
        assert_eq!("LangGraph".parse::<StrategyKind>().unwrap(), StrategyKind::Graph);
        assert_eq!("managed_sync".parse::<StrategyKind>().unwrap(), StrategyKind::ManagedSync);
        assert_eq!("openai_agents".parse::<StrategyKind>().unwrap(), StrategyKind::ManagedSync);
        assert_eq!("google_adk".parse::<StrategyKind>().unwrap(), StrategyKind::ManagedStream);
    }

    #[test]
    fn unknown_id_is_config_error() {
        let err = "crew".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("crew"));
    }

    #[test]
    fn display_round_trips() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }
}
