//! Weather tools backed by the AMAP (高德地图) weather API.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use reqwest::Client;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};

use super::ToolError;

/// Tracing target for weather requests.
const TRACING_TARGET: &str = "studylab_rig::tool::weather";

/// Default AMAP weather endpoint.
pub const DEFAULT_WEATHER_URL: &str = "https://restapi.amap.com/v3/weather/weatherInfo";

/// AMAP weather settings.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct WeatherConfig {
    /// AMAP web service key, weather tools are disabled without it.
    #[cfg_attr(
        feature = "config",
        arg(id = "amap_key", long = "amap-key", env = "AMAP_KEY")
    )]
    pub api_key: Option<String>,

    /// Weather endpoint.
    #[cfg_attr(
        feature = "config",
        arg(
            id = "amap_weather_url",
            long = "amap-weather-url",
            env = "AMAP_WEATHER_URL",
            default_value = DEFAULT_WEATHER_URL
        )
    )]
    pub endpoint: String,
}

impl WeatherConfig {
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
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_WEATHER_URL.to_owned(),
        }
    }
}

impl std::fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Kind of report requested from AMAP.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WeatherReport {
    /// Current conditions.
    #[default]
    Base,
    /// Forecast for the next days.
    All,
}

#[derive(Debug, Deserialize)]
pub struct WeatherArgs {
    /// City name or adcode, e.g. `北京` or `110101`.
    pub city: String,
    #[serde(default)]
    pub extensions: WeatherReport,
}

#[derive(Debug, Deserialize)]
pub struct ForecastArgs {
    /// City name or adcode.
    pub city: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WeatherResponse {
    status: String,
    info: Option<String>,
    lives: Vec<LiveWeather>,
    forecasts: Vec<Forecast>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LiveWeather {
    province: String,
    city: String,
    weather: String,
    temperature: String,
    winddirection: String,
    windpower: String,
    humidity: String,
    reporttime: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Forecast {
    province: String,
    city: String,
    reporttime: String,
    casts: Vec<DailyCast>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyCast {
    date: String,
    week: String,
    dayweather: String,
    nightweather: String,
    daytemp: String,
    nighttemp: String,
    daywind: String,
    nightwind: String,
    daypower: String,
    nightpower: String,
}

/// Shared AMAP client used by both weather tools.
#[derive(Debug, Clone)]
struct AmapWeather {
    http: Client,
    config: WeatherConfig,
}

impl AmapWeather {
    fn new(config: WeatherConfig) -> Result<Self, ToolError> {
        if config.api_key().is_none() {
            return Err(ToolError::Unavailable("AMAP_KEY is not set".into()));
        }

        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http, config })
    }

    async fn query(&self, city: &str, report: WeatherReport) -> Result<String, ToolError> {
        tracing::info!(target: TRACING_TARGET, city, report = report.as_ref(), "querying weather");

        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&[
                ("key", self.config.api_key().unwrap_or_default()),
                ("city", city),
                ("extensions", report.as_ref()),
                ("output", "JSON"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::Upstream(format!(
                "HTTP 请求失败: {}",
                response.status().as_u16()
            )));
        }

        let data: WeatherResponse = response.json().await?;
        if data.status != "1" {
            let info = data.info.as_deref().unwrap_or("未知错误");
            return Err(ToolError::Upstream(format!("天气查询失败: {info}")));
        }

        Ok(match report {
            WeatherReport::Base => format_live(&data.lives),
            WeatherReport::All => format_forecast(&data.forecasts),
        })
    }
}

/// Queries current weather or the forecast for a city.
#[derive(Debug, Clone)]
pub struct WeatherTool {
    amap: AmapWeather,
}

impl WeatherTool {
    pub fn new(config: WeatherConfig) -> Result<Self, ToolError> {
        Ok(Self {
            amap: AmapWeather::new(config)?,
        })
    }
}

impl Tool for WeatherTool {
    type Args = WeatherArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "get_weather";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "查询指定城市的天气信息。extensions 为 \"base\" 时返回实况天气，\
                          为 \"all\" 时返回未来几天的预报天气。"
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "城市名称或城市编码（adcode），例如 \"北京\"、\"110101\""
                    },
                    "extensions": {
                        "type": "string",
                        "enum": ["base", "all"],
                        "description": "气象类型：base 为实况天气（默认），all 为预报天气"
                    }
                },
                "required": ["city"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.amap.query(&args.city, args.extensions).await
    }
}

/// Queries the forecast for the next days.
#[derive(Debug, Clone)]
pub struct WeatherForecastTool {
    amap: AmapWeather,
}

impl WeatherForecastTool {
    pub fn new(config: WeatherConfig) -> Result<Self, ToolError> {
        Ok(Self {
            amap: AmapWeather::new(config)?,
        })
    }
}

impl Tool for WeatherForecastTool {
    type Args = ForecastArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "get_weather_forecast";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "查询指定城市未来3天的天气预报。".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "城市名称或城市编码（adcode），例如 \"北京\"、\"上海\""
                    }
                },
                "required": ["city"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.amap.query(&args.city, WeatherReport::All).await
    }
}

fn format_live(lives: &[LiveWeather]) -> String {
    let Some(live) = lives.first() else {
        return "未查询到天气数据".to_owned();
    };

    [
        format!("📍 地区：{} {}", live.province, live.city),
        format!("🌤️ 天气：{}", live.weather),
        format!("🌡️ 温度：{}°C", live.temperature),
        format!("💨 风向：{}风", live.winddirection),
        format!("💨 风力：{}级", live.windpower),
        format!("💧 湿度：{}%", live.humidity),
        format!("⏰ 更新时间：{}", live.reporttime),
    ]
    .join("\n")
}

fn format_forecast(forecasts: &[Forecast]) -> String {
    let Some(forecast) = forecasts.first() else {
        return "未查询到天气预报数据".to_owned();
    };
    if forecast.casts.is_empty() {
        return "未查询到具体预报数据".to_owned();
    }

    let mut lines = vec![
        format!("📍 地区：{} {}", forecast.province, forecast.city),
        format!("⏰ 预报发布时间：{}", forecast.reporttime),
        String::new(),
    ];
    for (offset, cast) in forecast.casts.iter().enumerate() {
        lines.push(format!("📅 {}（{} 星期{}）", day_name(offset), cast.date, cast.week));
        lines.push(format!(
            "  🌞 白天：{}  {}°C  {}风{}级",
            cast.dayweather, cast.daytemp, cast.daywind, cast.daypower
        ));
        lines.push(format!(
            "  🌙 夜间：{}  {}°C  {}风{}级",
            cast.nightweather, cast.nighttemp, cast.nightwind, cast.nightpower
        ));
    }
    lines.join("\n")
}

fn day_name(offset: usize) -> String {
    match offset {
        0 => "今天".to_owned(),
        1 => "明天".to_owned(),
        2 => "后天".to_owned(),
        n => format!("{n}天后"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    /// Serves a fake AMAP endpoint that only accepts the key `amap-test`.
    async fn weather_server() -> anyhow::Result<WeatherConfig> {
        let router = Router::new().route(
            "/weather",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("key").map(String::as_str) != Some("amap-test") {
                    return Json(json!({"status": "0", "info": "INVALID_USER_KEY"}));
                }

                let city = params.get("city").cloned().unwrap_or_default();
                let body: Value = match params.get("extensions").map(String::as_str) {
                    Some("all") => json!({
                        "status": "1",
                        "forecasts": [{
                            "province": "广东",
                            "city": city,
                            "reporttime": "2025-01-01 08:00:00",
                            "casts": [
                                {"date": "2025-01-01", "week": "3", "dayweather": "晴",
                                 "nightweather": "多云", "daytemp": "22", "nighttemp": "15",
                                 "daywind": "东", "nightwind": "东", "daypower": "1-3",
                                 "nightpower": "1-3"},
                                {"date": "2025-01-02", "week": "4", "dayweather": "小雨",
                                 "nightweather": "小雨", "daytemp": "18", "nighttemp": "14",
                                 "daywind": "北", "nightwind": "北", "daypower": "3",
                                 "nightpower": "3"}
                            ]
                        }]
                    }),
                    _ => json!({
                        "status": "1",
                        "lives": [{
                            "province": "北京", "city": city, "weather": "晴",
                            "temperature": "5", "winddirection": "西北",
                            "windpower": "≤3", "humidity": "20",
                            "reporttime": "2025-01-01 10:00:00"
                        }]
                    }),
                };
                Json(body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(WeatherConfig::default()
            .with_api_key("amap-test")
            .with_endpoint(format!("http://{addr}/weather")))
    }

    #[test]
    fn requires_api_key() {
        assert!(WeatherTool::new(WeatherConfig::default()).is_err());
        assert!(WeatherForecastTool::new(WeatherConfig::default().with_api_key(" ")).is_err());
        assert!(WeatherTool::new(WeatherConfig::default().with_api_key("amap-test")).is_ok());
    }

    #[test]
    fn report_kind_defaults_to_live() -> anyhow::Result<()> {
        let args: WeatherArgs = serde_json::from_value(json!({"city": "北京"}))?;
        assert_eq!(args.extensions, WeatherReport::Base);

        let args: WeatherArgs =
            serde_json::from_value(json!({"city": "北京", "extensions": "all"}))?;
        assert_eq!(args.extensions.as_ref(), "all");
        Ok(())
    }

    #[tokio::test]
    async fn formats_live_weather() -> anyhow::Result<()> {
        let config = weather_server().await?;
        let output = WeatherTool::new(config)?
            .call(WeatherArgs {
                city: "北京".into(),
                extensions: WeatherReport::Base,
            })
            .await?;

        assert!(output.starts_with("📍 地区：北京 北京"));
        assert!(output.contains("🌡️ 温度：5°C"));
        assert!(output.contains("💨 风向：西北风"));
        assert!(output.ends_with("⏰ 更新时间：2025-01-01 10:00:00"));
        Ok(())
    }

    #[tokio::test]
    async fn formats_forecast() -> anyhow::Result<()> {
        let config = weather_server().await?;
        let output = WeatherForecastTool::new(config)?
            .call(ForecastArgs {
                city: "深圳".into(),
            })
            .await?;

        assert!(output.starts_with("📍 地区：广东 深圳\n⏰ 预报发布时间：2025-01-01 08:00:00\n\n"));
        assert!(output.contains("📅 今天（2025-01-01 星期3）\n  🌞 白天：晴  22°C  东风1-3级"));
        assert!(output.contains("📅 明天（2025-01-02 星期4）"));
        assert!(output.contains("  🌙 夜间：小雨  14°C  北风3级"));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_keys_are_tool_errors() -> anyhow::Result<()> {
        let config = weather_server().await?.with_api_key("wrong");
        let result = WeatherTool::new(config)?
            .call(WeatherArgs {
                city: "北京".into(),
                extensions: WeatherReport::Base,
            })
            .await;

        assert!(matches!(
            result,
            Err(ToolError::Upstream(message)) if message == "天气查询失败: INVALID_USER_KEY"
        ));
        Ok(())
    }

    #[test]
    fn empty_reports_are_described() {
        assert_eq!(format_live(&[]), "未查询到天气数据");
        assert_eq!(format_forecast(&[]), "未查询到天气预报数据");
        assert_eq!(format_forecast(&[Forecast::default()]), "未查询到具体预报数据");
        assert_eq!(day_name(4), "4天后");
    }
}
