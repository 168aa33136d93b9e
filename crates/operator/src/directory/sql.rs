//! MySQL-protocol implementation of the node directory

use super::{AdminEndpoint, BackendNode, DirectoryClient, DirectoryConnector, FrontendNode};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Executor, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tag keys under which a backend records its compute group
const GROUP_TAG_KEYS: [&str; 2] = ["compute_group_name", "cloud_cluster_name"];

pub struct SqlDirectoryConnector {
    timeout: Duration,
}

impl SqlDirectoryConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn options(host: &str, port: u16, endpoint: &AdminEndpoint) -> MySqlConnectOptions {
        // keep sqlx's session setup to statements the frontend accepts
        MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&endpoint.credentials.username)
            .password(&endpoint.credentials.password)
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None::<String>)
    }

    async fn open(host: &str, port: u16, endpoint: &AdminEndpoint) -> Result<MySqlConnection> {
        Self::options(host, port, endpoint)
            .connect()
            .await
            .map_err(|e| {
                OperatorError::Connectivity(format!("connect to {}:{} failed: {}", host, port, e))
            })
    }

    async fn connect_leader(&self, endpoint: &AdminEndpoint) -> Result<SqlDirectoryClient> {
        let mut conn = Self::open(&endpoint.host, endpoint.port, endpoint).await?;
        let frontends = conn.fetch_all(sqlx::raw_sql("SHOW FRONTENDS")).await?;

        let mut leader = None;
        for row in &frontends {
            if parse_bool(&text(row, "IsMaster")?) {
                let host = text(row, "Host")?;
                let port = parse_port(&text(row, "QueryPort")?, "QueryPort")?;
                leader = Some((host, port));
                break;
            }
        }

        let Some((host, port)) = leader else {
            return Err(OperatorError::Connectivity(format!(
                "no leader among {} frontends reachable through {}:{}",
                frontends.len(),
                endpoint.host,
                endpoint.port
            )));
        };

        debug!(leader = %host, port, "Resolved metadata leader");
        let conn = Self::open(&host, port, endpoint).await?;
        Ok(SqlDirectoryClient { conn })
    }
}

#[async_trait]
impl DirectoryConnector for SqlDirectoryConnector {
    async fn connect(&self, endpoint: &AdminEndpoint) -> Result<Box<dyn DirectoryClient>> {
        let client = tokio::time::timeout(self.timeout, self.connect_leader(endpoint))
            .await
            .map_err(|_| {
                OperatorError::Timeout(
                    self.timeout,
                    format!("connecting to leader via {}:{}", endpoint.host, endpoint.port),
                )
            })??;
        Ok(Box::new(client))
    }
}

pub struct SqlDirectoryClient {
    conn: MySqlConnection,
}

impl SqlDirectoryClient {
    async fn execute(&mut self, statement: &str) -> std::result::Result<(), sqlx::Error> {
        info!(statement = %statement, "Executing administrative statement");
        self.conn.execute(sqlx::raw_sql(statement)).await?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryClient for SqlDirectoryClient {
    async fn list_metadata_nodes(&mut self) -> Result<Vec<FrontendNode>> {
        let rows = self.conn.fetch_all(sqlx::raw_sql("SHOW FRONTENDS")).await?;
        rows.iter().map(frontend_from_row).collect()
    }

    async fn list_compute_nodes(&mut self, compute_group: &str) -> Result<Vec<BackendNode>> {
        let rows = self.conn.fetch_all(sqlx::raw_sql("SHOW BACKENDS")).await?;
        let mut nodes = Vec::new();
        for row in &rows {
            let node = backend_from_row(row)?;
            if node.compute_group.as_deref() == Some(compute_group) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    async fn remove_metadata_nodes(&mut self, nodes: &[FrontendNode]) -> Result<()> {
        // one frontend per statement
        for node in nodes {
            let statement = format!(
                "ALTER SYSTEM DROP {} {}",
                node.role,
                quoted_address(&node.host, node.edit_log_port)?
            );
            match self.execute(&statement).await {
                Ok(()) => {}
                Err(e) if is_absent(&e) => {
                    debug!(host = %node.host, "Frontend already removed");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn remove_compute_nodes(&mut self, nodes: &[BackendNode]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let addresses = nodes
            .iter()
            .map(|n| quoted_address(&n.host, n.heartbeat_port))
            .collect::<Result<Vec<_>>>()?;

        let statement = format!("ALTER SYSTEM DROPP BACKEND {}", addresses.join(","));
        match self.execute(&statement).await {
            Ok(()) => Ok(()),
            Err(e) if is_absent(&e) => {
                // a batch fails as a whole when one member is gone; drop the rest one by one
                warn!(error = %e, "Batch drop hit a missing backend, retrying individually");
                for address in &addresses {
                    match self
                        .execute(&format!("ALTER SYSTEM DROPP BACKEND {}", address))
                        .await
                    {
                        Ok(()) => {}
                        Err(e) if is_absent(&e) => {
                            debug!(address = %address, "Backend already removed");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// SHOW output over the text protocol: every cell reads as a string
fn text(row: &MySqlRow, column: &str) -> Result<String> {
    let value: Option<String> = row.try_get_unchecked(column)?;
    Ok(value.unwrap_or_default())
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn parse_port(value: &str, column: &str) -> Result<u16> {
    value.trim().parse().map_err(|_| {
        OperatorError::Directory(format!("invalid {} value '{}'", column, value))
    })
}

fn quoted_address(host: &str, port: u16) -> Result<String> {
    if host.is_empty() || host.contains(['"', '\\', '\'']) {
        return Err(OperatorError::Directory(format!(
            "refusing to address node with host '{}'",
            host
        )));
    }
    Ok(format!("\"{}:{}\"", host, port))
}

fn is_absent(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().to_ascii_lowercase().contains("not exist"),
        _ => false,
    }
}

fn frontend_from_row(row: &MySqlRow) -> Result<FrontendNode> {
    Ok(FrontendNode {
        host: text(row, "Host")?,
        edit_log_port: parse_port(&text(row, "EditLogPort")?, "EditLogPort")?,
        role: text(row, "Role")?.parse()?,
        is_leader: parse_bool(&text(row, "IsMaster")?),
    })
}

fn backend_from_row(row: &MySqlRow) -> Result<BackendNode> {
    Ok(BackendNode {
        backend_id: text(row, "BackendId")?,
        host: text(row, "Host")?,
        heartbeat_port: parse_port(&text(row, "HeartbeatPort")?, "HeartbeatPort")?,
        compute_group: compute_group_from_tag(&text(row, "Tag")?),
    })
}

/// Group name recorded in a backend's `Tag` JSON object
pub(crate) fn compute_group_from_tag(tag: &str) -> Option<String> {
    let parsed: HashMap<String, serde_json::Value> = serde_json::from_str(tag).ok()?;
    GROUP_TAG_KEYS
        .iter()
        .find_map(|key| parsed.get(*key).and_then(|v| v.as_str()).map(str::to_string))
}
