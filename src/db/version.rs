//! Server version parsing and capability gates.
//!
//! The raw `@@version` string carries the numeric version plus build
//! suffixes that identify the server flavor. Managed flavors (Aurora)
//! report a recent community version while actually running an older
//! engine fork, so capability checks go through the effective version
//! rather than the reported one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PreflightError, Result};

/// Which server implementation produced the version string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFlavor {
    /// Community or enterprise MySQL.
    Mysql,
    /// Percona Server, wire- and DDL-compatible with MySQL.
    Percona,
    /// MariaDB, which diverged at 5.5 and numbers itself 10.x/11.x.
    MariaDb,
    /// Amazon Aurora MySQL. Carries the Aurora engine version.
    Aurora { aurora_version: String },
}

impl fmt::Display for ServerFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mysql => write!(f, "MySQL"),
            Self::Percona => write!(f, "Percona Server"),
            Self::MariaDb => write!(f, "MariaDB"),
            Self::Aurora { aurora_version } => write!(f, "Aurora MySQL {aurora_version}"),
        }
    }
}

/// A parsed server version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub flavor: ServerFlavor,
    /// The unparsed `@@version` value.
    pub raw: String,
}

impl ServerVersion {
    /// Parses a `@@version` string such as `8.0.32-0ubuntu0.22.04.2`,
    /// `5.7.44-log`, `8.0.mysql_aurora.3.04.1`, or `10.11.2-MariaDB`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PreflightError::probe("empty server version string"));
        }

        let lower = trimmed.to_lowercase();

        if let Some(idx) = lower.find("mysql_aurora.") {
            return Self::parse_aurora(trimmed, idx);
        }

        let (major, minor, patch) = parse_numeric_prefix(trimmed)?;

        let flavor = if lower.contains("mariadb") || major >= 10 {
            ServerFlavor::MariaDb
        } else if lower.contains("percona") {
            ServerFlavor::Percona
        } else {
            ServerFlavor::Mysql
        };

        Ok(Self {
            major,
            minor,
            patch,
            flavor,
            raw: trimmed.to_string(),
        })
    }

    /// Parses an Aurora version string. The part after `mysql_aurora.` is
    /// the Aurora engine version; the leading numbers are the compatible
    /// community version, which Aurora overstates.
    fn parse_aurora(raw: &str, marker_idx: usize) -> Result<Self> {
        let aurora_version = raw[marker_idx + "mysql_aurora.".len()..]
            .trim_end_matches(|c: char| !c.is_ascii_digit())
            .to_string();
        let (major, minor, patch) = parse_numeric_prefix(raw)?;
        let mut version = Self {
            major,
            minor,
            patch,
            flavor: ServerFlavor::Aurora {
                aurora_version: aurora_version.clone(),
            },
            raw: raw.to_string(),
        };

        // Aurora reports the compatibility target, not the actual engine
        // level. Pin the effective version to the documented baseline of
        // the Aurora major line so capability gates stay conservative.
        if aurora_version.starts_with('3') {
            (version.major, version.minor, version.patch) = (8, 0, 26);
        } else if aurora_version.starts_with('2') {
            (version.major, version.minor, version.patch) = (5, 7, 12);
        }
        Ok(version)
    }

    /// Returns true when the effective version is at least the given one.
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }

    /// Whether ALTER TABLE supports `ALGORITHM=INSTANT` for trailing
    /// column adds (8.0.12).
    pub fn supports_instant_add(&self) -> bool {
        !self.is_mariadb() && self.at_least(8, 0, 12)
    }

    /// Whether instant column add works at any position and instant drop
    /// is available (8.0.29).
    pub fn supports_instant_anywhere(&self) -> bool {
        !self.is_mariadb() && self.at_least(8, 0, 29)
    }

    /// Whether the server predates the online DDL rewrite and copies the
    /// table for most alterations (pre-5.6).
    pub fn predates_online_ddl(&self) -> bool {
        !self.is_mariadb() && !self.at_least(5, 6, 0)
    }

    pub fn is_mariadb(&self) -> bool {
        self.flavor == ServerFlavor::MariaDb
    }

    pub fn is_aurora(&self) -> bool {
        matches!(self.flavor, ServerFlavor::Aurora { .. })
    }

    /// Short numeric form of the effective version.
    pub fn numeric(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.flavor, self.numeric())
    }
}

/// Reads and parses the connected server's version.
///
/// `@@version_comment` distinguishes Percona builds whose `@@version`
/// string does not name them.
pub async fn fetch_server_version(
    client: &dyn crate::db::DatabaseClient,
) -> Result<ServerVersion> {
    let result = client.execute_query("SELECT @@version").await?;
    let raw = result
        .scalar_string()
        .ok_or_else(|| PreflightError::probe("server returned no version string"))?;
    let mut version = ServerVersion::parse(&raw)?;

    if version.flavor == ServerFlavor::Mysql {
        if let Ok(comment) = client.execute_query("SELECT @@version_comment").await {
            if comment
                .scalar_string()
                .is_some_and(|c| c.to_lowercase().contains("percona"))
            {
                version.flavor = ServerFlavor::Percona;
            }
        }
    }
    Ok(version)
}

/// Parses the leading `major.minor.patch` digits off a version string.
fn parse_numeric_prefix(raw: &str) -> Result<(u32, u32, u32)> {
    let mut parts = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty());
    let mut next = || -> Result<u32> {
        parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| PreflightError::probe(format!("unparseable server version '{raw}'")))
    };
    Ok((next()?, next()?, next()?))
}
