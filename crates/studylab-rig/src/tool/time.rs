//! Current time and date tools.

use jiff::Zoned;
use jiff::civil::Weekday;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::Deserialize;

use super::ToolError;

/// Arguments of tools that take none.
#[derive(Debug, Default, Deserialize)]
pub struct NoArgs {}

fn no_parameters() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

/// Formats a timestamp as `当前时间是：YYYY-MM-DD HH:MM:SS`.
pub fn format_time(now: &Zoned) -> String {
    format!("当前时间是：{}", now.strftime("%Y-%m-%d %H:%M:%S"))
}

/// Formats a date as `今天是：YYYY-MM-DD (星期X)`.
pub fn format_date(now: &Zoned) -> String {
    let weekday = match now.weekday() {
        Weekday::Monday => "星期一",
        Weekday::Tuesday => "星期二",
        Weekday::Wednesday => "星期三",
        Weekday::Thursday => "星期四",
        Weekday::Friday => "星期五",
        Weekday::Saturday => "星期六",
        Weekday::Sunday => "星期日",
    };
    format!("今天是：{} ({weekday})", now.strftime("%Y-%m-%d"))
}

/// Returns the local wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentTimeTool;

impl Tool for CurrentTimeTool {
    type Args = NoArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "get_current_time";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "获取当前的日期和时间，格式为 YYYY-MM-DD HH:MM:SS。".to_string(),
            parameters: no_parameters(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(format_time(&Zoned::now()))
    }
}

/// Returns the local date and weekday.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentDateTool;

impl Tool for CurrentDateTool {
    type Args = NoArgs;
    type Error = ToolError;
    type Output = String;

    const NAME: &'static str = "get_current_date";

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "获取今天的日期和星期几。".to_string(),
            parameters: no_parameters(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(format_date(&Zoned::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> anyhow::Result<Zoned> {
        Ok("2025-11-08T14:05:09[UTC]".parse()?)
    }

    #[test]
    fn formats_time() -> anyhow::Result<()> {
        assert_eq!(format_time(&fixed()?), "当前时间是：2025-11-08 14:05:09");
        Ok(())
    }

    #[test]
    fn formats_date_with_weekday() -> anyhow::Result<()> {
        assert_eq!(format_date(&fixed()?), "今天是：2025-11-08 (星期六)");
        Ok(())
    }

    #[tokio::test]
    async fn time_tool_output_prefix() -> anyhow::Result<()> {
        let output = CurrentTimeTool.call(NoArgs::default()).await?;
        assert!(output.starts_with("当前时间是："));
        Ok(())
    }
}
