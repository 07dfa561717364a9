//! The seam between server orchestration and the wire.

use std::sync::Arc;

use async_trait::async_trait;
use patchcord::{
    CallToolResult, ClientOptions, ListToolsPage, McpClient, ResourceContents, ServerInfo,
};
use reqwest::Url;
use serde_json::{Map, Value};

use crate::error::TransportError;

/// An open connection to one remote tool server.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self, cursor: Option<&str>) -> Result<ListToolsPage, TransportError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, TransportError>;

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, TransportError>;

    /// Close the connection. Never fails.
    async fn disconnect(&self);
}

pub struct Connection {
    pub transport: Arc<dyn ToolTransport>,
    pub server_info: ServerInfo,
}

/// Opens [`ToolTransport`]s.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<Connection, TransportError>;
}

/// Streamable HTTP connector backed by [`McpClient`].
#[derive(Debug, Clone)]
pub struct HttpConnector {
    options: ClientOptions,
}

impl HttpConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(ClientOptions::with_name("switchboard", env!("CARGO_PKG_VERSION")))
    }
}

#[async_trait]
impl TransportConnector for HttpConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Connection, TransportError> {
        let client = McpClient::with_options(endpoint.as_str(), self.options.clone());
        let init = client.initialize().await?;

        Ok(Connection {
            transport: Arc::new(HttpTransport { client }),
            server_info: init.server_info,
        })
    }
}

struct HttpTransport {
    client: McpClient,
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn list_tools(&self, cursor: Option<&str>) -> Result<ListToolsPage, TransportError> {
        Ok(self.client.list_tools_page(cursor).await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, TransportError> {
        Ok(self.client.call_tool(name, arguments).await?)
    }

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, TransportError> {
        Ok(self.client.read_resource(uri).await?.contents)
    }

    async fn disconnect(&self) {
        self.client.close().await;
    }
}
