//! `vidbridge-fixture` - a catalog-backed MCP video backend
//!
//! Serves `search_videos`, `download_video` and `get_video_details` over
//! stdio from a JSON catalog, speaking the same protocol as real backends.
//! Used by the integration tests and for trying the CLI without real
//! scraping servers.
//!
//! # Usage
//!
//! ```bash
//! vidbridge-fixture catalog.json
//! ```
//!
//! Catalog format:
//!
//! ```json
//! {
//!   "videos": [{"videoId": "v1", "title": "Launch", "duration": 42}],
//!   "search_error": null,
//!   "download_error": null,
//!   "malformed_search": false
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::mcp_server::{server_runtime, ServerHandler};
use rust_mcp_sdk::schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, Implementation, InitializeResult,
    ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities, ServerCapabilitiesTools,
    TextContent, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{tool_box, McpServer, StdioTransport, TransportOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

/// Videos and canned failures served by this process.
#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    videos: Vec<Value>,
    /// Answer every search with `{"error": ...}`.
    #[serde(default)]
    search_error: Option<String>,
    /// Fail every download with this message.
    #[serde(default)]
    download_error: Option<String>,
    /// Answer every search with text that is not JSON.
    #[serde(default)]
    malformed_search: bool,
}

static CATALOG: OnceCell<Catalog> = OnceCell::const_new();

static EMPTY: Catalog = Catalog {
    videos: Vec::new(),
    search_error: None,
    download_error: None,
    malformed_search: false,
};

fn catalog() -> &'static Catalog {
    CATALOG.get().unwrap_or(&EMPTY)
}

fn video_id(video: &Value) -> Option<&str> {
    video
        .get("videoId")
        .or_else(|| video.get("id"))
        .and_then(Value::as_str)
}

fn find_video(id: &str) -> Option<&'static Value> {
    catalog().videos.iter().find(|v| video_id(v) == Some(id))
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::text_content(vec![TextContent::from(text)])
}

// ============================================================================
// TOOLS
// ============================================================================

#[mcp_tool(
    name = "search_videos",
    description = "Search the catalog. Matches the query against titles and descriptions, case-insensitively.

Returns: JSON array of search results.",
    read_only_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SearchVideosTool {
    /// Search terms
    query: String,
    /// Only return videos up to this many seconds long
    #[serde(default)]
    max_duration: Option<f64>,
}

impl SearchVideosTool {
    pub fn run(&self) -> Result<CallToolResult, CallToolError> {
        let catalog = catalog();
        if let Some(error) = &catalog.search_error {
            return Ok(text_result(json!({ "error": error }).to_string()));
        }
        if catalog.malformed_search {
            return Ok(text_result("[{'videoId': 'not json'}]".to_string()));
        }

        let query = self.query.to_lowercase();
        let matches: Vec<&Value> = catalog
            .videos
            .iter()
            .filter(|video| {
                ["title", "description"].iter().any(|field| {
                    video
                        .get(*field)
                        .and_then(Value::as_str)
                        .is_some_and(|text| text.to_lowercase().contains(&query))
                })
            })
            .filter(|video| match self.max_duration {
                Some(max) => video
                    .get("duration")
                    .and_then(Value::as_f64)
                    .is_none_or(|duration| duration <= max),
                None => true,
            })
            .collect();

        let body = serde_json::to_string(&matches)
            .map_err(|e| CallToolError::from_message(e.to_string()))?;
        Ok(text_result(body))
    }
}

#[mcp_tool(
    name = "download_video",
    description = "Write a placeholder file for a catalog video.

Returns: the path of the written file as plain text.",
    read_only_hint = false
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct DownloadVideoTool {
    /// Video id from search results
    video_id: String,
    /// Where to write the file
    #[serde(default)]
    output_path: Option<String>,
    /// Seconds to download from the start
    #[serde(default)]
    duration: Option<f64>,
}

impl DownloadVideoTool {
    pub async fn run(&self) -> Result<CallToolResult, CallToolError> {
        if let Some(error) = &catalog().download_error {
            return Err(CallToolError::from_message(error.clone()));
        }
        if find_video(&self.video_id).is_none() {
            return Err(CallToolError::from_message(format!(
                "Video not found: {}",
                self.video_id
            )));
        }

        let path = self.output_path.as_ref().map_or_else(
            || {
                std::env::temp_dir()
                    .join("vidbridge-fixture")
                    .join(format!("{}.mp4", self.video_id))
            },
            PathBuf::from,
        );
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CallToolError::from_message(e.to_string()))?;
        }

        let contents = format!(
            "fixture video {} ({}s)\n",
            self.video_id,
            self.duration.unwrap_or(0.0)
        );
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| CallToolError::from_message(e.to_string()))?;

        Ok(text_result(path.to_string_lossy().to_string()))
    }
}

#[mcp_tool(
    name = "get_video_details",
    description = "Look up one catalog video.

Returns: JSON object with videoId, title, description, duration, downloadUrl and format.",
    read_only_hint = true
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetVideoDetailsTool {
    /// Video id from search results
    video_id: String,
}

impl GetVideoDetailsTool {
    pub fn run(&self) -> Result<CallToolResult, CallToolError> {
        let Some(video) = find_video(&self.video_id) else {
            let body = json!({ "error": format!("{} is not in the catalog", self.video_id) });
            return Ok(text_result(body.to_string()));
        };

        let field = |name: &str| video.get(name).cloned().unwrap_or_else(|| json!(""));
        let details = json!({
            "videoId": self.video_id,
            "title": field("title"),
            "description": field("description"),
            "duration": video.get("duration").cloned().unwrap_or_else(|| json!(0)),
            "downloadUrl": video
                .get("sourceUrl")
                .cloned()
                .unwrap_or_else(|| json!(format!("fixture://{}", self.video_id))),
            "format": "mp4"
        });
        Ok(text_result(details.to_string()))
    }
}

tool_box!(
    FixtureTools,
    [SearchVideosTool, DownloadVideoTool, GetVideoDetailsTool]
);

// ============================================================================
// SERVER HANDLER
// ============================================================================

pub struct FixtureHandler;

#[async_trait]
impl ServerHandler for FixtureHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: FixtureTools::tools(),
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> Result<CallToolResult, CallToolError> {
        let tool = FixtureTools::try_from(request.params)
            .map_err(|e| CallToolError::from_message(e.to_string()))?;

        match tool {
            FixtureTools::SearchVideosTool(t) => t.run(),
            FixtureTools::DownloadVideoTool(t) => t.run().await,
            FixtureTools::GetVideoDetailsTool(t) => t.run(),
        }
    }
}

// ============================================================================
// MAIN
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol, so log to stderr
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let catalog = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read catalog {path}: {e}"))?;
            serde_json::from_str(&text).map_err(|e| format!("invalid catalog {path}: {e}"))?
        }
        None => Catalog::default(),
    };
    tracing::debug!("catalog has {} videos", catalog.videos.len());
    CATALOG
        .set(catalog)
        .map_err(|_| "catalog initialized twice")?;

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "vidbridge-fixture".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            title: Some("vidbridge fixture backend".into()),
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some("Serves a fixed video catalog for testing vidbridge.".into()),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    };

    let transport = StdioTransport::new(TransportOptions::default())?;
    let server = server_runtime::create_server(server_details, transport, FixtureHandler);
    Ok(server.start().await?)
}
