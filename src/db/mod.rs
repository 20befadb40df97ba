//! Database access layer.
//!
//! Provides a trait-based interface over the server connection so the
//! topology prober, metadata loader, and row estimator can run against
//! either a live server or the scripted mock used in tests.

mod estimate;
mod metadata;
mod mock;
mod mysql;
pub mod sandbox;
mod types;
mod version;

pub use estimate::{estimate_rows, EstimateSource, RowEstimate};
pub use metadata::{
    fetch_table_metadata, ColumnMeta, ForeignKeyMeta, IndexMeta, TableMetadata, TriggerMeta,
};
pub use mock::MockDatabaseClient;
pub use mysql::MySqlClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};
pub use version::{fetch_server_version, ServerFlavor, ServerVersion};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Mysql,
}

impl DatabaseBackend {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" | "aurora" | "percona" => Some(Self::Mysql),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Mysql => 3306,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
        }
    }
}

/// Creates a database client for the given configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::Mysql => {
            let client = MySqlClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for database clients.
///
/// All operations are async and return Results with PreflightError. A
/// query the server rejects as unknown syntax or an unknown variable
/// surfaces as `PreflightError::Unsupported`, which probe chains treat
/// as a negative answer rather than a failure.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a SQL statement and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
