//! Web search tools backed by the Tavily search API.
//!
//! `web_search` runs an advanced search and returns snippets, while
//! `web_search_simple` runs a quick basic search returning titles and links.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use reqwest::Client;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};

use super::ToolError;

/// Tracing target for search requests.
const TRACING_TARGET: &str = "studylab_rig::tool::web_search";

/// Default Tavily API endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Snippets longer than this many characters are truncated.
const MAX_SNIPPET_CHARS: usize = 200;

/// Result count of the quick search.
const SIMPLE_MAX_RESULTS: u8 = 3;

/// Tavily search settings.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct SearchConfig {
    /// Tavily API key, advanced tools are disabled without it.
    #[cfg_attr(
        feature = "config",
        arg(id = "tavily_api_key", long = "tavily-api-key", env = "TAVILY_API_KEY")
    )]
    pub api_key: Option<String>,

    /// Maximum number of search results (1-20).
    #[cfg_attr(
        feature = "config",
        arg(long = "tavily-max-results", env = "TAVILY_MAX_RESULTS", default_value_t = 5)
    )]
    pub max_results: u8,

    /// Search endpoint.
    #[cfg_attr(
        feature = "config",
        arg(long = "tavily-url", env = "TAVILY_URL", default_value = DEFAULT_SEARCH_URL)
    )]
    pub endpoint: String,
}

impl SearchConfig {
    /// Returns the API key when one is configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_results(mut self, max_results: u8) -> Self {
        self.max_results = max_results;
        self
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: 5,
            endpoint: DEFAULT_SEARCH_URL.to_owned(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .field("max_results", &self.max_results)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct WebSearchArgs {
    /// Natural language search query.
    pub query: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u8,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Searches the web for up-to-date information.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    http: Client,
    config: SearchConfig,
}

impl WebSearchTool {
    pub fn new(config: SearchConfig) -> Result<Self, ToolError> {
        if config.api_key().is_none() {
            return Err(ToolError::Unavailable("TAVILY_API_KEY is not set".into()));
        }

        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http, config })
    }

    async fn search(
        &self,
        query: &str,
        max_results: u8,
        search_depth: &'static str,
    ) -> Result<SearchResponse, ToolError> {
        let api_key = self.config.api_key().unwrap_or_default();
        let body = SearchRequest {
            query,
            max_results: max_results.clamp(1, 20),
            search_depth,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream(format!("search failed with {status}: {text}")));
        }

        Ok(response.json().await?)
    }
}

impl Tool for WebSearchTool {
    type Args = WebSearchArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "web_search";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "在互联网上搜索信息。适用于需要实时数据、最新新闻、技术文档等场景，\
                          返回标题、内容片段和来源链接。"
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "搜索查询字符串，用自然语言描述你想找的信息"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::info!(target: TRACING_TARGET, query = %args.query, "searching the web");
        let response = self
            .search(&args.query, self.config.max_results, "advanced")
            .await?;
        tracing::info!(target: TRACING_TARGET, results = response.results.len(), "search completed");
        Ok(format_results(&args.query, &response.results))
    }
}

/// Quick web search returning only titles and links.
#[derive(Debug, Clone)]
pub struct SimpleWebSearchTool {
    search: WebSearchTool,
}

impl SimpleWebSearchTool {
    pub fn new(config: SearchConfig) -> Result<Self, ToolError> {
        Ok(Self {
            search: WebSearchTool::new(config)?,
        })
    }
}

impl Tool for SimpleWebSearchTool {
    type Args = WebSearchArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "web_search_simple";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "快速网络搜索。使用基础搜索深度，返回更快但不够深入的结果，\
                          适合快速查询和简单问题。"
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "搜索查询字符串"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::info!(target: TRACING_TARGET, query = %args.query, "running quick search");
        let response = self
            .search
            .search(&args.query, SIMPLE_MAX_RESULTS, "basic")
            .await?;
        Ok(format_links(&args.query, &response.results))
    }
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("未找到关于 '{query}' 的相关信息。");
    }

    let mut lines = vec![format!("找到 {} 条搜索结果：\n", results.len())];
    for (i, result) in results.iter().enumerate() {
        lines.push(format!(
            "\n{}. {}",
            i + 1,
            result.title.as_deref().unwrap_or("无标题")
        ));

        let content = result.content.as_deref().unwrap_or_default();
        if !content.is_empty() {
            let snippet = if content.chars().count() > MAX_SNIPPET_CHARS {
                let head: String = content.chars().take(MAX_SNIPPET_CHARS).collect();
                format!("{head}...")
            } else {
                content.to_owned()
            };
            lines.push(format!("   内容: {snippet}"));
        }
        if let Some(url) = result.url.as_deref().filter(|url| !url.is_empty()) {
            lines.push(format!("   来源: {url}"));
        }
    }
    lines.join("\n")
}

fn format_links(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("未找到关于 '{query}' 的相关信息。");
    }

    let mut lines = vec![format!("快速搜索结果（{} 条）：\n", results.len())];
    lines.extend(results.iter().enumerate().map(|(i, result)| {
        format!(
            "{}. {} - {}",
            i + 1,
            result.title.as_deref().unwrap_or("无标题"),
            result.url.as_deref().unwrap_or_default()
        )
    }));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn requires_api_key() {
        assert!(WebSearchTool::new(SearchConfig::default()).is_err());
        assert!(WebSearchTool::new(SearchConfig::default().with_api_key("  ")).is_err());
        assert!(WebSearchTool::new(SearchConfig::default().with_api_key("tvly-test")).is_ok());
    }

    #[test]
    fn formats_empty_results() {
        assert_eq!(format_results("rust", &[]), "未找到关于 'rust' 的相关信息。");
    }

    #[test]
    fn truncates_long_snippets() {
        let results = [SearchResult {
            title: None,
            url: Some("https://example.com".into()),
            content: Some("长".repeat(250)),
        }];
        let text = format_results("q", &results);
        assert!(text.starts_with("找到 1 条搜索结果："));
        assert!(text.contains("1. 无标题"));
        assert!(text.contains(&format!("   内容: {}...", "长".repeat(200))));
        assert!(text.ends_with("   来源: https://example.com"));
    }

    /// Serves a search endpoint echoing the request settings in the title.
    async fn search_server() -> anyhow::Result<SearchConfig> {
        let router = Router::new().route(
            "/search",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "results": [{
                        "title": format!(
                            "About {} ({}, {})",
                            body["query"].as_str().unwrap_or_default(),
                            body["search_depth"].as_str().unwrap_or_default(),
                            body["max_results"],
                        ),
                        "url": "https://www.rust-lang.org",
                        "content": "A language empowering everyone."
                    }]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(SearchConfig::default()
            .with_api_key("tvly-test")
            .with_endpoint(format!("http://{addr}/search")))
    }

    #[tokio::test]
    async fn calls_search_endpoint() -> anyhow::Result<()> {
        let config = search_server().await?;
        let output = WebSearchTool::new(config)?
            .call(WebSearchArgs {
                query: "Rust".into(),
            })
            .await?;

        assert!(output.contains("1. About Rust (advanced, 5)"));
        assert!(output.contains("来源: https://www.rust-lang.org"));
        Ok(())
    }

    #[tokio::test]
    async fn quick_search_lists_links() -> anyhow::Result<()> {
        let config = search_server().await?;
        let output = SimpleWebSearchTool::new(config)?
            .call(WebSearchArgs {
                query: "Rust".into(),
            })
            .await?;

        assert_eq!(
            output,
            "快速搜索结果（1 条）：\n\n1. About Rust (basic, 3) - https://www.rust-lang.org"
        );
        Ok(())
    }

    #[tokio::test]
    async fn upstream_errors_are_tool_errors() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/search",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "invalid key") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let config = SearchConfig::default()
            .with_api_key("tvly-test")
            .with_endpoint(format!("http://{addr}/search"));
        let result = SimpleWebSearchTool::new(config)?
            .call(WebSearchArgs {
                query: "Rust".into(),
            })
            .await;
        assert!(matches!(result, Err(ToolError::Upstream(message)) if message.contains("401")));
        Ok(())
    }
}
