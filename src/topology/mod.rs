//! Replication and cluster topology model.
//!
//! The decision engine cares about topology because the same DDL that is
//! harmless on a standalone server can pause a whole Galera cluster or
//! overrun a Group Replication transaction limit. Detection lives in
//! [`probe`]; this module defines the result shape.

mod probe;

pub use probe::detect;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The replication role of the probed server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// No replication detected.
    Standalone,
    /// Classic asynchronous replication. Covers replicas, primaries, and
    /// chained nodes that are both.
    AsyncReplica(ReplicationDetail),
    /// Classic replication with semi-synchronous acknowledgment enabled
    /// on either role.
    SemiSyncReplica(ReplicationDetail),
    /// Galera-family synchronous multi-master cluster.
    Galera(GaleraDetail),
    /// MySQL Group Replication.
    GroupReplication(GroupReplicationDetail),
    /// Aurora writer instance.
    AuroraWriter,
    /// Aurora reader instance.
    AuroraReader,
}

impl Topology {
    /// Whether DDL on this topology runs under total order isolation and
    /// blocks the whole cluster.
    pub fn blocks_cluster_for_ddl(&self) -> bool {
        match self {
            Topology::Galera(detail) => detail.uses_toi(),
            _ => false,
        }
    }

    pub fn is_aurora(&self) -> bool {
        matches!(self, Topology::AuroraWriter | Topology::AuroraReader)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Standalone => write!(f, "standalone"),
            Topology::AsyncReplica(d) => write!(f, "async replication ({})", d.role()),
            Topology::SemiSyncReplica(d) => {
                write!(f, "semi-sync replication ({})", d.role())
            }
            Topology::Galera(d) => write!(f, "Galera cluster ({} nodes)", d.cluster_size),
            Topology::GroupReplication(d) => write!(
                f,
                "Group Replication ({}, {} online)",
                if d.single_primary {
                    "single-primary"
                } else {
                    "multi-primary"
                },
                d.online_members
            ),
            Topology::AuroraWriter => write!(f, "Aurora writer"),
            Topology::AuroraReader => write!(f, "Aurora reader"),
        }
    }
}

/// Detail for classic replication nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationDetail {
    /// This node applies a replication stream.
    pub is_replica: bool,
    /// This node feeds at least one binlog-streaming connection.
    pub is_primary: bool,
    /// Seconds behind the source, when this node is a replica and the
    /// stream is running.
    pub lag_seconds: Option<i64>,
    /// Number of active binlog dump connections.
    pub replica_count: u32,
}

impl ReplicationDetail {
    pub fn role(&self) -> &'static str {
        match (self.is_replica, self.is_primary) {
            (true, true) => "chained replica and primary",
            (true, false) => "replica",
            (false, true) => "primary",
            (false, false) => "unknown role",
        }
    }
}

/// Detail for Galera-family clusters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaleraDetail {
    pub cluster_size: u32,
    /// wsrep_local_state_comment, e.g. "Synced".
    pub node_state: Option<String>,
    /// Online schema upgrade method: TOI (default) or RSU.
    pub osu_method: Option<String>,
    /// wsrep_max_ws_size in bytes.
    pub max_writeset_bytes: Option<u64>,
    /// Fraction of time flow control paused the cluster recently.
    pub flow_control_paused: Option<f64>,
}

impl GaleraDetail {
    /// TOI is the default when the method variable is unreadable.
    pub fn uses_toi(&self) -> bool {
        self.osu_method
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("TOI"))
            .unwrap_or(true)
    }
}

/// Detail for Group Replication members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupReplicationDetail {
    pub single_primary: bool,
    /// This member's role: PRIMARY or SECONDARY.
    pub member_role: Option<String>,
    pub online_members: u32,
    /// group_replication_transaction_size_limit in bytes; 0 means
    /// unlimited.
    pub transaction_size_limit: Option<u64>,
}

/// Full probe result: the topology variant plus cross-cutting flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyInfo {
    pub topology: Topology,
    pub read_only: bool,
    pub super_read_only: bool,
    pub is_cloud_managed: bool,
    pub cloud_provider: Option<String>,
}

impl TopologyInfo {
    pub fn standalone() -> Self {
        Self {
            topology: Topology::Standalone,
            read_only: false,
            super_read_only: false,
            is_cloud_managed: false,
            cloud_provider: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_galera_defaults_to_toi() {
        let detail = GaleraDetail::default();
        assert!(detail.uses_toi());

        let rsu = GaleraDetail {
            osu_method: Some("RSU".to_string()),
            ..GaleraDetail::default()
        };
        assert!(!rsu.uses_toi());
    }

    #[test]
    fn test_blocks_cluster_only_for_toi_galera() {
        let toi = Topology::Galera(GaleraDetail::default());
        assert!(toi.blocks_cluster_for_ddl());

        let rsu = Topology::Galera(GaleraDetail {
            osu_method: Some("RSU".to_string()),
            ..GaleraDetail::default()
        });
        assert!(!rsu.blocks_cluster_for_ddl());

        assert!(!Topology::Standalone.blocks_cluster_for_ddl());
    }

    #[test]
    fn test_replication_role_labels() {
        let detail = ReplicationDetail {
            is_replica: true,
            is_primary: true,
            ..ReplicationDetail::default()
        };
        assert_eq!(detail.role(), "chained replica and primary");
    }
}
