//! Topology detection.
//!
//! Runs a sequential, short-circuiting probe chain against the live
//! connection. Order matters: a Galera node also answers classic
//! replication-status queries, so the cluster probes run first and the
//! first positive match wins. A server answering "unknown variable" or
//! "unknown table" to a probe is a normal negative result; only transport
//! and permission failures abort detection.

use tracing::debug;

use crate::db::{DatabaseClient, QueryResult, ServerVersion, Value};
use crate::error::Result;

use super::{
    GaleraDetail, GroupReplicationDetail, ReplicationDetail, Topology, TopologyInfo,
};

/// Detects the replication topology of the connected server.
pub async fn detect(client: &dyn DatabaseClient, version: &ServerVersion) -> Result<TopologyInfo> {
    let read_only = scalar_bool(client, "SELECT @@read_only").await?.unwrap_or(false);
    let super_read_only = scalar_bool(client, "SELECT @@super_read_only")
        .await?
        .unwrap_or(false);

    let mut info = TopologyInfo {
        topology: Topology::Standalone,
        read_only,
        super_read_only,
        is_cloud_managed: false,
        cloud_provider: None,
    };

    // Aurora is decided from the version string alone. Its replication
    // model is managed and must not be mis-read as classic replication.
    if version.is_aurora() {
        let reader = scalar_bool(client, "SELECT @@innodb_read_only")
            .await?
            .unwrap_or(read_only);
        info.topology = if reader {
            Topology::AuroraReader
        } else {
            Topology::AuroraWriter
        };
        info.is_cloud_managed = true;
        info.cloud_provider = Some("AWS Aurora".to_string());
        debug!(topology = %info.topology, "detected from version string");
        return Ok(info);
    }

    if let Some(galera) = probe_galera(client).await? {
        debug!(cluster_size = galera.cluster_size, "Galera cluster detected");
        info.topology = Topology::Galera(galera);
        return Ok(info);
    }

    if let Some(group) = probe_group_replication(client).await? {
        debug!(online = group.online_members, "Group Replication detected");
        info.topology = Topology::GroupReplication(group);
        return Ok(info);
    }

    if let Some(topology) = probe_classic_replication(client).await? {
        debug!(topology = %topology, "classic replication detected");
        info.topology = topology;
        return Ok(info);
    }

    debug!("no replication detected, treating as standalone");
    annotate_cloud(client, &mut info).await?;
    Ok(info)
}

/// Galera probe. The wsrep_on flag is sometimes only visible per-session,
/// so the global view is tried first and the session view only when the
/// global one returns no row.
async fn probe_galera(client: &dyn DatabaseClient) -> Result<Option<GaleraDetail>> {
    let enabled = match show_value(client, "SHOW GLOBAL VARIABLES LIKE 'wsrep_on'").await? {
        Some(value) => is_on(&value),
        None => show_value(client, "SHOW SESSION VARIABLES LIKE 'wsrep_on'")
            .await?
            .is_some_and(|v| is_on(&v)),
    };
    if !enabled {
        return Ok(None);
    }

    // Live status counter first, configured node list as the fallback.
    let mut cluster_size = show_value(client, "SHOW GLOBAL STATUS LIKE 'wsrep_cluster_size'")
        .await?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    if cluster_size == 0 {
        cluster_size = show_value(client, "SHOW GLOBAL VARIABLES LIKE 'wsrep_cluster_address'")
            .await?
            .map(|addr| count_cluster_nodes(&addr))
            .unwrap_or(0);
    }
    if cluster_size == 0 {
        debug!("wsrep_on set but no cluster size readable, not treating as Galera");
        return Ok(None);
    }

    // The rest is best-effort color; failures are swallowed.
    let node_state = show_value(client, "SHOW GLOBAL STATUS LIKE 'wsrep_local_state_comment'")
        .await
        .unwrap_or(None);
    let osu_method = show_value(client, "SHOW GLOBAL VARIABLES LIKE 'wsrep_OSU_method'")
        .await
        .unwrap_or(None);
    let max_writeset_bytes = show_value(client, "SHOW GLOBAL VARIABLES LIKE 'wsrep_max_ws_size'")
        .await
        .unwrap_or(None)
        .and_then(|v| v.parse().ok());
    let flow_control_paused =
        show_value(client, "SHOW GLOBAL STATUS LIKE 'wsrep_flow_control_paused'")
            .await
            .unwrap_or(None)
            .and_then(|v| v.parse().ok());

    Ok(Some(GaleraDetail {
        cluster_size,
        node_state,
        osu_method,
        max_writeset_bytes,
        flow_control_paused,
    }))
}

/// Group Replication probe: a non-empty group name means membership.
async fn probe_group_replication(
    client: &dyn DatabaseClient,
) -> Result<Option<GroupReplicationDetail>> {
    let group_name = scalar_string(client, "SELECT @@group_replication_group_name").await?;
    match group_name {
        Some(name) if !name.is_empty() => {}
        _ => return Ok(None),
    }

    let single_primary = scalar_bool(client, "SELECT @@group_replication_single_primary_mode")
        .await?
        .unwrap_or(true);
    let transaction_size_limit =
        scalar_u64(client, "SELECT @@group_replication_transaction_size_limit").await?;
    let member_role = scalar_string(
        client,
        "SELECT MEMBER_ROLE FROM performance_schema.replication_group_members \
         WHERE MEMBER_ID = @@server_uuid",
    )
    .await?;
    let online_members = scalar_u64(
        client,
        "SELECT COUNT(*) FROM performance_schema.replication_group_members \
         WHERE MEMBER_STATE = 'ONLINE'",
    )
    .await?
    .unwrap_or(0) as u32;

    Ok(Some(GroupReplicationDetail {
        single_primary,
        member_role,
        online_members,
        transaction_size_limit,
    }))
}

/// Classic replication probe. Replica role from the status query (modern
/// name, then legacy), primary role from active binlog dump connections.
/// A node can be replica, primary, both, or neither.
async fn probe_classic_replication(client: &dyn DatabaseClient) -> Result<Option<Topology>> {
    let status = match optional(client, "SHOW REPLICA STATUS").await? {
        Some(result) => Some(result),
        None => optional(client, "SHOW SLAVE STATUS").await?,
    };

    let mut detail = ReplicationDetail::default();
    if let Some(status) = status.filter(|s| !s.is_empty()) {
        detail.is_replica = true;
        detail.lag_seconds = status
            .get(0, "Seconds_Behind_Source")
            .or_else(|| status.get(0, "Seconds_Behind_Master"))
            .and_then(Value::as_i64);
    }

    let replica_count = scalar_u64(
        client,
        "SELECT COUNT(*) FROM information_schema.PROCESSLIST \
         WHERE COMMAND LIKE 'Binlog Dump%'",
    )
    .await?
    .unwrap_or(0) as u32;
    if replica_count > 0 {
        detail.is_primary = true;
        detail.replica_count = replica_count;
    }

    if !detail.is_replica && !detail.is_primary {
        return Ok(None);
    }

    let semi_sync = probe_semi_sync(client).await?;
    Ok(Some(if semi_sync {
        Topology::SemiSyncReplica(detail)
    } else {
        Topology::AsyncReplica(detail)
    }))
}

/// Semi-sync is checked on both roles, modern variable names before the
/// legacy ones. The first variable the server knows decides.
async fn probe_semi_sync(client: &dyn DatabaseClient) -> Result<bool> {
    let candidates = [
        "SELECT @@rpl_semi_sync_source_enabled",
        "SELECT @@rpl_semi_sync_master_enabled",
        "SELECT @@rpl_semi_sync_replica_enabled",
        "SELECT @@rpl_semi_sync_slave_enabled",
    ];
    for sql in candidates {
        if let Some(enabled) = scalar_bool(client, sql).await? {
            if enabled {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Best-effort cloud annotation for standalone servers. Never changes the
/// topology variant.
async fn annotate_cloud(client: &dyn DatabaseClient, info: &mut TopologyInfo) -> Result<()> {
    if let Some(basedir) = scalar_string(client, "SELECT @@basedir").await? {
        if basedir.contains("/rdsdbbin") {
            info.is_cloud_managed = true;
            info.cloud_provider = Some("AWS RDS".to_string());
        }
    }
    Ok(())
}

/// Runs a query, mapping the typed negative result to None and passing
/// real failures through.
async fn optional(client: &dyn DatabaseClient, sql: &str) -> Result<Option<QueryResult>> {
    match client.execute_query(sql).await {
        Ok(result) => Ok(Some(result)),
        Err(e) if e.is_unsupported() => {
            debug!("probe '{sql}' answered negative: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Reads the `Value` column of a single-row SHOW result. No row and an
/// unsupported query both read as None.
async fn show_value(client: &dyn DatabaseClient, sql: &str) -> Result<Option<String>> {
    Ok(optional(client, sql).await?.and_then(|result| {
        match result.get(0, "Value") {
            Some(Value::Null) | None => None,
            Some(v) => Some(v.to_display_string()),
        }
    }))
}

async fn scalar_string(client: &dyn DatabaseClient, sql: &str) -> Result<Option<String>> {
    Ok(optional(client, sql).await?.and_then(|r| r.scalar_string()))
}

async fn scalar_u64(client: &dyn DatabaseClient, sql: &str) -> Result<Option<u64>> {
    Ok(optional(client, sql)
        .await?
        .and_then(|r| r.scalar().and_then(Value::as_u64)))
}

async fn scalar_bool(client: &dyn DatabaseClient, sql: &str) -> Result<Option<bool>> {
    Ok(scalar_string(client, sql).await?.map(|v| is_on(&v)))
}

/// Server booleans come back as ON/OFF, 1/0, or true/false depending on
/// the variable and version.
fn is_on(value: &str) -> bool {
    matches!(value.trim().to_uppercase().as_str(), "ON" | "1" | "TRUE" | "YES")
}

/// Counts nodes in a wsrep_cluster_address gcomm:// list.
fn count_cluster_nodes(address: &str) -> u32 {
    let hosts = address
        .trim()
        .strip_prefix("gcomm://")
        .unwrap_or(address)
        .trim();
    if hosts.is_empty() {
        return 0;
    }
    hosts.split(',').filter(|h| !h.trim().is_empty()).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockDatabaseClient;

    fn version(raw: &str) -> ServerVersion {
        ServerVersion::parse(raw).unwrap()
    }

    fn galera_client() -> MockDatabaseClient {
        MockDatabaseClient::new()
            .with_rows(
                "SHOW GLOBAL VARIABLES LIKE 'wsrep_on'",
                &["Variable_name", "Value"],
                vec![vec![Value::from("wsrep_on"), Value::from("ON")]],
            )
            .with_rows(
                "SHOW GLOBAL STATUS LIKE 'wsrep_cluster_size'",
                &["Variable_name", "Value"],
                vec![vec![Value::from("wsrep_cluster_size"), Value::from("3")]],
            )
    }

    #[tokio::test]
    async fn test_standalone_when_nothing_answers() {
        let client = MockDatabaseClient::new();
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        assert_eq!(info.topology, Topology::Standalone);
        assert!(!info.read_only);
        assert!(!info.is_cloud_managed);
    }

    #[tokio::test]
    async fn test_galera_detection_with_best_effort_detail() {
        let client = galera_client()
            .with_rows(
                "SHOW GLOBAL VARIABLES LIKE 'wsrep_OSU_method'",
                &["Variable_name", "Value"],
                vec![vec![Value::from("wsrep_OSU_method"), Value::from("TOI")]],
            )
            .with_rows(
                "SHOW GLOBAL VARIABLES LIKE 'wsrep_max_ws_size'",
                &["Variable_name", "Value"],
                vec![vec![
                    Value::from("wsrep_max_ws_size"),
                    Value::from("2147483647"),
                ]],
            );
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        match info.topology {
            Topology::Galera(detail) => {
                assert_eq!(detail.cluster_size, 3);
                assert_eq!(detail.osu_method.as_deref(), Some("TOI"));
                assert_eq!(detail.max_writeset_bytes, Some(2147483647));
                // State and flow control were unscripted and swallowed.
                assert_eq!(detail.node_state, None);
            }
            other => panic!("expected Galera, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_galera_wins_over_classic_replication() {
        // A Galera node also answers SHOW REPLICA STATUS; the cluster
        // probe must take precedence.
        let client = galera_client().with_rows(
            "SHOW REPLICA STATUS",
            &["Replica_IO_Running", "Seconds_Behind_Source"],
            vec![vec![Value::from("Yes"), Value::Int(0)]],
        );
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        assert!(matches!(info.topology, Topology::Galera(_)));
    }

    #[tokio::test]
    async fn test_galera_session_fallback() {
        let client = MockDatabaseClient::new()
            .with_empty("SHOW GLOBAL VARIABLES LIKE 'wsrep_on'")
            .with_rows(
                "SHOW SESSION VARIABLES LIKE 'wsrep_on'",
                &["Variable_name", "Value"],
                vec![vec![Value::from("wsrep_on"), Value::from("ON")]],
            )
            .with_empty("SHOW GLOBAL STATUS LIKE 'wsrep_cluster_size'")
            .with_rows(
                "SHOW GLOBAL VARIABLES LIKE 'wsrep_cluster_address'",
                &["Variable_name", "Value"],
                vec![vec![
                    Value::from("wsrep_cluster_address"),
                    Value::from("gcomm://10.0.0.1,10.0.0.2,10.0.0.3"),
                ]],
            );
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        match info.topology {
            Topology::Galera(detail) => assert_eq!(detail.cluster_size, 3),
            other => panic!("expected Galera, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wsrep_on_without_cluster_size_is_not_galera() {
        let client = MockDatabaseClient::new().with_rows(
            "SHOW GLOBAL VARIABLES LIKE 'wsrep_on'",
            &["Variable_name", "Value"],
            vec![vec![Value::from("wsrep_on"), Value::from("ON")]],
        );
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        assert_eq!(info.topology, Topology::Standalone);
    }

    #[tokio::test]
    async fn test_group_replication_detection() {
        let client = MockDatabaseClient::new()
            .with_scalar(
                "SELECT @@group_replication_group_name",
                "9e8b1c2a-0000-0000-0000-000000000000",
            )
            .with_scalar("SELECT @@group_replication_single_primary_mode", "ON")
            .with_scalar("SELECT @@group_replication_transaction_size_limit", 150000000i64)
            .with_scalar(
                "SELECT MEMBER_ROLE FROM performance_schema.replication_group_members \
                 WHERE MEMBER_ID = @@server_uuid",
                "PRIMARY",
            )
            .with_scalar(
                "SELECT COUNT(*) FROM performance_schema.replication_group_members \
                 WHERE MEMBER_STATE = 'ONLINE'",
                3i64,
            );
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        match info.topology {
            Topology::GroupReplication(detail) => {
                assert!(detail.single_primary);
                assert_eq!(detail.member_role.as_deref(), Some("PRIMARY"));
                assert_eq!(detail.online_members, 3);
                assert_eq!(detail.transaction_size_limit, Some(150000000));
            }
            other => panic!("expected Group Replication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replica_via_modern_status_query() {
        let client = MockDatabaseClient::new().with_rows(
            "SHOW REPLICA STATUS",
            &["Replica_IO_Running", "Seconds_Behind_Source"],
            vec![vec![Value::from("Yes"), Value::Int(7)]],
        );
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        match info.topology {
            Topology::AsyncReplica(detail) => {
                assert!(detail.is_replica);
                assert!(!detail.is_primary);
                assert_eq!(detail.lag_seconds, Some(7));
            }
            other => panic!("expected AsyncReplica, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replica_via_legacy_status_query() {
        // An old server does not know SHOW REPLICA STATUS; the probe must
        // fall through to the legacy name and legacy lag column.
        let client = MockDatabaseClient::new().with_rows(
            "SHOW SLAVE STATUS",
            &["Slave_IO_Running", "Seconds_Behind_Master"],
            vec![vec![Value::from("Yes"), Value::Int(42)]],
        );
        let info = detect(&client, &version("5.7.44-log")).await.unwrap();
        match info.topology {
            Topology::AsyncReplica(detail) => {
                assert_eq!(detail.lag_seconds, Some(42));
            }
            other => panic!("expected AsyncReplica, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_primary_with_semi_sync() {
        let client = MockDatabaseClient::new()
            .with_rows(
                "SELECT COUNT(*) FROM information_schema.PROCESSLIST \
                 WHERE COMMAND LIKE 'Binlog Dump%'",
                &["COUNT(*)"],
                vec![vec![Value::Int(2)]],
            )
            .with_scalar("SELECT @@rpl_semi_sync_source_enabled", 1i64);
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        match info.topology {
            Topology::SemiSyncReplica(detail) => {
                assert!(detail.is_primary);
                assert_eq!(detail.replica_count, 2);
            }
            other => panic!("expected SemiSyncReplica, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_semi_sync_via_legacy_variable() {
        let client = MockDatabaseClient::new()
            .with_rows(
                "SHOW SLAVE STATUS",
                &["Slave_IO_Running", "Seconds_Behind_Master"],
                vec![vec![Value::from("Yes"), Value::Int(0)]],
            )
            .with_scalar("SELECT @@rpl_semi_sync_slave_enabled", "ON");
        let info = detect(&client, &version("5.6.51")).await.unwrap();
        assert!(matches!(info.topology, Topology::SemiSyncReplica(_)));
    }

    #[tokio::test]
    async fn test_aurora_writer_and_reader() {
        let aurora = version("8.0.mysql_aurora.3.04.1");

        let writer = MockDatabaseClient::new().with_scalar("SELECT @@innodb_read_only", 0i64);
        let info = detect(&writer, &aurora).await.unwrap();
        assert_eq!(info.topology, Topology::AuroraWriter);
        assert!(info.is_cloud_managed);

        let reader = MockDatabaseClient::new().with_scalar("SELECT @@innodb_read_only", 1i64);
        let info = detect(&reader, &aurora).await.unwrap();
        assert_eq!(info.topology, Topology::AuroraReader);
    }

    #[tokio::test]
    async fn test_rds_annotation_on_standalone() {
        let client = MockDatabaseClient::new()
            .with_scalar("SELECT @@basedir", "/rdsdbbin/mysql-8.0.32/");
        let info = detect(&client, &version("8.0.32")).await.unwrap();
        assert_eq!(info.topology, Topology::Standalone);
        assert!(info.is_cloud_managed);
        assert_eq!(info.cloud_provider.as_deref(), Some("AWS RDS"));
    }

    #[tokio::test]
    async fn test_hard_failure_aborts_detection() {
        let client = MockDatabaseClient::new()
            .with_failure("SHOW GLOBAL VARIABLES LIKE 'wsrep_on'", "connection reset");
        let err = detect(&client, &version("8.0.32")).await.unwrap_err();
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_count_cluster_nodes() {
        assert_eq!(count_cluster_nodes("gcomm://a,b,c"), 3);
        assert_eq!(count_cluster_nodes("gcomm://"), 0);
        assert_eq!(count_cluster_nodes(""), 0);
    }
}
