use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use multiapi_common::api::tools::{InputSchema, PropertySchema, PropertyType, ToolDefinition};
use multiapi_common::config::CATEGORY_WEATHER;

use super::{optional, parse_args, required, timestamp};
use crate::cache::Ttl;
use crate::tools::registry::{handler_fn, ToolRegistry};
use crate::tools::{ToolContext, ToolError};

/// OpenWeather returns forecasts in 3-hour steps.
const ENTRIES_PER_DAY: u32 = 8;
const MAX_FORECAST_DAYS: u32 = 5;

#[derive(Deserialize)]
struct CurrentArgs {
    city: String,
}

#[derive(Deserialize)]
struct ForecastArgs {
    city: String,
    #[serde(default)]
    days: Option<u32>,
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        ToolDefinition::new(
            "get_current_weather",
            "Get current weather for a city",
            InputSchema::new().required_property(
                "city",
                PropertySchema::string("City name (e.g., \"London\", \"New York\")"),
            ),
        ),
        handler_fn(current_weather),
    );

    registry.register(
        ToolDefinition::new(
            "get_weather_forecast",
            "Get weather forecast for a city",
            InputSchema::new()
                .required_property(
                    "city",
                    PropertySchema::string("City name (e.g., \"London\", \"New York\")"),
                )
                .property(
                    "days",
                    PropertySchema::new(PropertyType::Integer)
                        .describe("Number of days to forecast (1-5)")
                        .range(1.0, MAX_FORECAST_DAYS as f64)
                        .with_default(MAX_FORECAST_DAYS),
                ),
        ),
        handler_fn(weather_forecast),
    );
}

fn api_key(ctx: &ToolContext) -> Result<String, ToolError> {
    ctx.upstream
        .openweather_api_key
        .clone()
        .ok_or(ToolError::MissingApiKey("OpenWeather"))
}

async fn current_weather(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: CurrentArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    tracing::info!(city = %args.city, "Getting current weather");

    let key = format!("weather:current:{}", args.city);
    let ttl = Ttl::Seconds(ctx.cache_ttls.weather_ttl_seconds);

    ctx.cached(&key, CATEGORY_WEATHER, ttl, || async {
        let url = format!("{}/weather", ctx.upstream.openweather_base_url);
        let body = ctx
            .get_json(
                "weather",
                &url,
                &[
                    ("q", args.city.clone()),
                    ("appid", api_key),
                    ("units", "metric".into()),
                ],
            )
            .await?;

        Ok(json!({
            "city": required(&body, "weather", "/name")?,
            "country": optional(&body, "/sys/country"),
            "temperature": required(&body, "weather", "/main/temp")?,
            "feels_like": optional(&body, "/main/feels_like"),
            "description": required(&body, "weather", "/weather/0/description")?,
            "humidity": optional(&body, "/main/humidity"),
            "wind_speed": optional(&body, "/wind/speed"),
            "timestamp": timestamp(),
        }))
    })
    .await
}

async fn weather_forecast(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: ForecastArgs = parse_args(args)?;
    let days = args.days.unwrap_or(MAX_FORECAST_DAYS).clamp(1, MAX_FORECAST_DAYS);
    let api_key = api_key(&ctx)?;
    tracing::info!(city = %args.city, days, "Getting weather forecast");

    let key = format!("weather:forecast:{}:{}", args.city, days);
    let ttl = Ttl::Seconds(ctx.cache_ttls.weather_ttl_seconds);

    ctx.cached(&key, CATEGORY_WEATHER, ttl, || async {
        let url = format!("{}/forecast", ctx.upstream.openweather_base_url);
        let body = ctx
            .get_json(
                "forecast",
                &url,
                &[
                    ("q", args.city.clone()),
                    ("appid", api_key),
                    ("units", "metric".into()),
                    ("cnt", (days * ENTRIES_PER_DAY).to_string()),
                ],
            )
            .await?;

        let entries = required(&body, "forecast", "/list")?
            .as_array()
            .cloned()
            .unwrap_or_default();
        let mut forecasts = daily_summaries(&entries);
        forecasts.truncate(days as usize);

        Ok(json!({
            "city": required(&body, "forecast", "/city/name")?,
            "country": optional(&body, "/city/country"),
            "forecasts": forecasts,
            "timestamp": timestamp(),
        }))
    })
    .await
}

/// Collapse 3-hourly entries into one summary per calendar day (UTC), in
/// the order the days first appear.
fn daily_summaries(entries: &[Value]) -> Vec<Value> {
    let mut days: Vec<(String, Vec<f64>, Vec<String>)> = Vec::new();

    for entry in entries {
        let Some(date) = entry
            .get("dt")
            .and_then(Value::as_i64)
            .and_then(|dt| chrono::DateTime::from_timestamp(dt, 0))
            .map(|dt| dt.format("%a %b %d %Y").to_string())
        else {
            continue;
        };
        let Some(temp) = entry.pointer("/main/temp").and_then(Value::as_f64) else {
            continue;
        };
        let description = entry
            .pointer("/weather/0/description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match days.iter_mut().find(|(d, _, _)| *d == date) {
            Some((_, temps, descriptions)) => {
                temps.push(temp);
                descriptions.push(description);
            }
            None => days.push((date, vec![temp], vec![description])),
        }
    }

    days.into_iter()
        .map(|(date, temps, descriptions)| {
            let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
            let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = temps.iter().sum::<f64>() / temps.len() as f64;
            json!({
                "date": date,
                "min_temp": min,
                "max_temp": max,
                "avg_temp": avg,
                "description": descriptions[descriptions.len() / 2],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dt: i64, temp: f64, description: &str) -> Value {
        json!({ "dt": dt, "main": { "temp": temp }, "weather": [{ "description": description }] })
    }

    #[test]
    fn test_daily_summaries_groups_by_day() {
        // 2024-01-01 00:00, 03:00, 06:00 UTC and 2024-01-02 00:00 UTC.
        let entries = vec![
            entry(1_704_067_200, 2.0, "clear"),
            entry(1_704_078_000, 6.0, "clouds"),
            entry(1_704_088_800, 4.0, "rain"),
            entry(1_704_153_600, 10.0, "snow"),
        ];

        let days = daily_summaries(&entries);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0]["date"], json!("Mon Jan 01 2024"));
        assert_eq!(days[0]["min_temp"], json!(2.0));
        assert_eq!(days[0]["max_temp"], json!(6.0));
        assert_eq!(days[0]["avg_temp"], json!(4.0));
        assert_eq!(days[0]["description"], json!("clouds"));
        assert_eq!(days[1]["description"], json!("snow"));
    }

    #[test]
    fn test_daily_summaries_skips_malformed_entries() {
        let entries = vec![json!({ "dt": 1_704_067_200 }), json!("garbage")];
        assert!(daily_summaries(&entries).is_empty());
    }
}
