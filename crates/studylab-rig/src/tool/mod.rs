//! Tools available to the agent.
//!
//! Every tool implements the rig [`Tool`](rig::tool::Tool) trait and is made
//! callable by name through the [`ToolRegistry`].
//!
//! - `get_current_time`, `get_current_date`, `calculator`: basic tools that
//!   need no credentials
//! - `web_search`, `web_search_simple`: advanced tools backed by the Tavily
//!   search API
//! - `get_weather`, `get_weather_forecast`: advanced tools backed by the
//!   AMAP weather API

mod calculator;
mod registry;
mod time;
mod weather;
mod web_search;

pub use calculator::{CalculatorArgs, CalculatorTool, calculate};
pub use registry::{HandlerFuture, ToolHandler, ToolRegistry};
pub use time::{CurrentDateTool, CurrentTimeTool, NoArgs, format_date, format_time};
pub use weather::{
    ForecastArgs, WeatherArgs, WeatherConfig, WeatherForecastTool, WeatherReport, WeatherTool,
};
pub use web_search::{SearchConfig, SimpleWebSearchTool, WebSearchArgs, WebSearchTool};

/// Error returned by tool implementations.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool is not configured for use.
    #[error("tool unavailable: {0}")]
    Unavailable(String),

    /// An upstream service call failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream service answered with an error.
    #[error("{0}")]
    Upstream(String),
}
