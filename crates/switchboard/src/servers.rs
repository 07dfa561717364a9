//! The live set of connected remote servers.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use patchcord::{CallToolResult, ResourceContents};
use reqwest::Url;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{ServerError, TransportError};
use crate::tool::{RemoteServer, RemoteTool};
use crate::transport::{HttpConnector, ToolTransport, TransportConnector};

/// Media types accepted as widget HTML, in order of preference.
const APP_RESOURCE_MIME_TYPES: &[&str] = &["text/html+skybridge", "text/html"];

/// Outcome of [`ServerOrchestrator::connect_many`].
#[derive(Debug, Default)]
pub struct ConnectReport {
    pub connected: Vec<Arc<RemoteServer>>,
    /// Endpoints that were already connected, or repeated in the request.
    pub skipped: Vec<String>,
    pub failures: Vec<ServerError>,
}

impl ConnectReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns every connected [`RemoteServer`], keyed by endpoint string.
///
/// A server is installed only after it connected and its full tool list was
/// read. Connecting an endpoint that is already present replaces the entry.
pub struct ServerOrchestrator {
    connector: Arc<dyn TransportConnector>,
    servers: RwLock<Vec<Arc<RemoteServer>>>,
}

impl ServerOrchestrator {
    pub fn new(connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            connector,
            servers: RwLock::new(Vec::new()),
        }
    }

    /// Orchestrator using the Streamable HTTP transport.
    pub fn http() -> Self {
        Self::new(Arc::new(HttpConnector::default()))
    }

    #[tracing::instrument(skip(self), fields(mcp.endpoint = %endpoint))]
    pub async fn connect(&self, endpoint: &str) -> Result<Arc<RemoteServer>, ServerError> {
        let url = parse_endpoint(endpoint)?;

        let connection = self
            .connector
            .connect(&url)
            .await
            .map_err(|source| ServerError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let tools = match list_all_tools(connection.transport.as_ref()).await {
            Ok(tools) => tools,
            Err(source) => {
                connection.transport.disconnect().await;
                return Err(ServerError::Listing {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let server = Arc::new(RemoteServer {
            endpoint: endpoint.to_string(),
            info: connection.server_info,
            tools,
            transport: connection.transport,
        });

        let replaced = {
            let mut servers = self.servers.write().await;
            let previous = servers
                .iter()
                .position(|s| s.endpoint == endpoint)
                .map(|index| servers.remove(index));
            servers.push(server.clone());
            previous
        };

        if let Some(previous) = replaced {
            tracing::debug!("replacing existing connection");
            previous.transport.disconnect().await;
        }

        tracing::info!(
            server = %server.info.name,
            tools = server.tools.len(),
            "server connected"
        );

        Ok(server)
    }

    /// Connect every endpoint not already connected, concurrently.
    ///
    /// One endpoint failing does not affect the others.
    pub async fn connect_many<S: AsRef<str>>(&self, endpoints: &[S]) -> ConnectReport {
        let connected: HashSet<String> = self.endpoints().await.into_iter().collect();

        let mut report = ConnectReport::default();
        let mut pending = Vec::new();
        let mut seen = HashSet::new();

        for endpoint in endpoints.iter().map(AsRef::as_ref) {
            if connected.contains(endpoint) || !seen.insert(endpoint) {
                report.skipped.push(endpoint.to_string());
            } else {
                pending.push(endpoint);
            }
        }

        let results = join_all(pending.iter().map(|endpoint| self.connect(endpoint))).await;

        for result in results {
            match result {
                Ok(server) => report.connected.push(server),
                Err(e) => {
                    tracing::warn!(error = %e, "server connect failed");
                    report.failures.push(e);
                }
            }
        }

        report
    }

    /// Remove and close a server. Returns false if it was not connected.
    pub async fn disconnect(&self, endpoint: &str) -> bool {
        let removed = {
            let mut servers = self.servers.write().await;
            servers
                .iter()
                .position(|s| s.endpoint == endpoint)
                .map(|index| servers.remove(index))
        };

        match removed {
            Some(server) => {
                server.transport.disconnect().await;
                tracing::info!(mcp.endpoint = %endpoint, "server disconnected");
                true
            }
            None => false,
        }
    }

    /// Close every server concurrently and wait for all of them.
    pub async fn disconnect_all(&self) {
        let servers = std::mem::take(&mut *self.servers.write().await);
        if servers.is_empty() {
            return;
        }

        join_all(servers.iter().map(|s| s.transport.disconnect())).await;
        tracing::info!(count = servers.len(), "all servers disconnected");
    }

    pub async fn servers(&self) -> Vec<Arc<RemoteServer>> {
        self.servers.read().await.clone()
    }

    pub async fn server(&self, endpoint: &str) -> Option<Arc<RemoteServer>> {
        self.servers
            .read()
            .await
            .iter()
            .find(|s| s.endpoint == endpoint)
            .cloned()
    }

    pub async fn endpoints(&self) -> Vec<String> {
        self.servers
            .read()
            .await
            .iter()
            .map(|s| s.endpoint.clone())
            .collect()
    }

    /// Every tool of every live server, tagged with its owner.
    ///
    /// Names may repeat across servers.
    pub async fn aggregated_tools(&self) -> Vec<(Arc<RemoteServer>, RemoteTool)> {
        self.servers
            .read()
            .await
            .iter()
            .flat_map(|server| {
                server
                    .tools
                    .iter()
                    .map(move |tool| (server.clone(), tool.clone()))
            })
            .collect()
    }

    #[tracing::instrument(skip(self, arguments), fields(mcp.endpoint = %endpoint, tool.name = %name))]
    pub async fn call_tool(
        &self,
        endpoint: &str,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ServerError> {
        let server = self.require(endpoint).await?;
        server
            .transport
            .call_tool(name, arguments)
            .await
            .map_err(|source| ServerError::Request {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    pub async fn read_resource(
        &self,
        endpoint: &str,
        uri: &str,
    ) -> Result<Vec<ResourceContents>, ServerError> {
        let server = self.require(endpoint).await?;
        server
            .transport
            .read_resource(uri)
            .await
            .map_err(|source| ServerError::Request {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    /// HTML of a widget resource: the first text content served as
    /// `text/html+skybridge` or `text/html`.
    pub async fn app_resource_html(&self, endpoint: &str, uri: &str) -> Result<String, ServerError> {
        let contents = self.read_resource(endpoint, uri).await?;

        contents
            .into_iter()
            .find_map(|content| {
                let essence = content.mime_type()?.split(';').next()?.trim().to_ascii_lowercase();
                if !APP_RESOURCE_MIME_TYPES.contains(&essence.as_str()) {
                    return None;
                }
                content.text().map(str::to_owned)
            })
            .ok_or_else(|| ServerError::ResourceNotFound {
                endpoint: endpoint.to_string(),
                uri: uri.to_string(),
            })
    }

    async fn require(&self, endpoint: &str) -> Result<Arc<RemoteServer>, ServerError> {
        self.server(endpoint)
            .await
            .ok_or_else(|| ServerError::NotConnected(endpoint.to_string()))
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ServerError> {
    let url = Url::parse(endpoint).map_err(|e| ServerError::Connection {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ServerError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Follow `nextCursor` until the server stops returning one.
async fn list_all_tools(transport: &dyn ToolTransport) -> Result<Vec<RemoteTool>, TransportError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    let mut seen_cursors = HashSet::new();

    loop {
        let page = transport.list_tools(cursor.as_deref()).await?;
        tools.extend(page.tools.into_iter().map(RemoteTool::from));

        match page.next_cursor {
            Some(next) if !seen_cursors.insert(next.clone()) => {
                return Err(TransportError::Other(format!(
                    "server repeated pagination cursor '{}'",
                    next
                )));
            }
            Some(next) => cursor = Some(next),
            None => return Ok(tools),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert!(parse_endpoint("http://localhost:8000/mcp").is_ok());
        assert!(parse_endpoint("https://tools.example.com/mcp").is_ok());
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(ServerError::Connection { .. })
        ));
        assert!(matches!(
            parse_endpoint("ftp://host/mcp"),
            Err(ServerError::Connection { ref reason, .. }) if reason.contains("ftp")
        ));
    }
}
