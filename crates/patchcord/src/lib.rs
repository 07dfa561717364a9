//! Client side of the Model Context Protocol over Streamable HTTP.
//!
//! Requests are JSON-RPC 2.0 POSTs to a single endpoint. Servers may answer
//! with a plain JSON body or a short `text/event-stream`; both are accepted.
//!
//! ```rust,ignore
//! use patchcord::McpClient;
//!
//! let client = McpClient::new("http://localhost:8080/mcp");
//! client.initialize().await?;
//!
//! let mut cursor = None;
//! loop {
//!     let page = client.list_tools_page(cursor.as_deref()).await?;
//!     // ...
//!     match page.next_cursor {
//!         Some(next) => cursor = Some(next),
//!         None => break,
//!     }
//! }
//! ```

mod client;
pub mod types;

pub use client::{ClientError, ClientOptions, McpClient};
pub use types::{
    CallToolResult, Content, InitializeResult, ListToolsPage, ReadResourceResult,
    ResourceContents, ServerInfo, ToolDescriptor,
};
