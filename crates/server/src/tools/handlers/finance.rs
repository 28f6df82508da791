use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use multiapi_common::api::tools::{InputSchema, PropertySchema, ToolDefinition};
use multiapi_common::config::CATEGORY_FINANCE;

use super::{number_from_str, optional, parse_args, timestamp};
use crate::cache::Ttl;
use crate::tools::registry::{handler_fn, ToolRegistry};
use crate::tools::{ToolContext, ToolError};

const GLOBAL_QUOTE: &str = "Global Quote";
const EXCHANGE_RATE: &str = "Realtime Currency Exchange Rate";

#[derive(Deserialize)]
struct SymbolArgs {
    symbol: String,
}

#[derive(Deserialize)]
struct ExchangeArgs {
    from: String,
    to: String,
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        ToolDefinition::new(
            "get_stock_quote",
            "Get real-time stock quote",
            InputSchema::new().required_property(
                "symbol",
                PropertySchema::string("Stock symbol (e.g., \"AAPL\", \"GOOGL\")"),
            ),
        ),
        handler_fn(stock_quote),
    );

    registry.register(
        ToolDefinition::new(
            "get_currency_exchange",
            "Get currency exchange rate",
            InputSchema::new()
                .required_property(
                    "from",
                    PropertySchema::string("From currency code (e.g., \"USD\", \"EUR\")"),
                )
                .required_property(
                    "to",
                    PropertySchema::string("To currency code (e.g., \"EUR\", \"GBP\")"),
                ),
        ),
        handler_fn(currency_exchange),
    );

    registry.register(
        ToolDefinition::new(
            "get_crypto_price",
            "Get cryptocurrency price in USD",
            InputSchema::new().required_property(
                "symbol",
                PropertySchema::string("Cryptocurrency symbol (e.g., \"BTC\", \"ETH\")"),
            ),
        ),
        handler_fn(crypto_price),
    );
}

fn api_key(ctx: &ToolContext) -> Result<String, ToolError> {
    ctx.upstream
        .alpha_vantage_api_key
        .clone()
        .ok_or(ToolError::MissingApiKey("Alpha Vantage"))
}

/// Alpha Vantage answers quota exhaustion and bad symbols with a 200 and no
/// payload object, so a missing section is the only failure signal.
fn section<'a>(
    body: &'a Value,
    name: &str,
    what: &str,
    reason: &str,
) -> Result<&'a Value, ToolError> {
    body.get(name)
        .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
        .ok_or_else(|| ToolError::Upstream(format!("Failed to fetch {}: {}", what, reason)))
}

async fn stock_quote(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: SymbolArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    tracing::info!(symbol = %args.symbol, "Getting stock quote");

    let key = format!("finance:quote:{}", args.symbol);
    let ttl = Ttl::Seconds(ctx.cache_ttls.finance_ttl_seconds);

    ctx.cached(&key, CATEGORY_FINANCE, ttl, || async {
        let body = ctx
            .get_json(
                "stock quote",
                &ctx.upstream.alpha_vantage_base_url,
                &[
                    ("function", "GLOBAL_QUOTE".into()),
                    ("symbol", args.symbol.clone()),
                    ("apikey", api_key),
                ],
            )
            .await?;

        let quote = section(
            &body,
            GLOBAL_QUOTE,
            "stock quote",
            "Invalid symbol or API limit reached",
        )?;

        let volume = quote
            .get("06. volume")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok());

        Ok(json!({
            "symbol": optional(quote, "/01. symbol"),
            "price": number_from_str(&optional(quote, "/05. price")),
            "change": number_from_str(&optional(quote, "/09. change")),
            "change_percent": optional(quote, "/10. change percent"),
            "volume": volume,
            "latest_trading_day": optional(quote, "/07. latest trading day"),
            "previous_close": number_from_str(&optional(quote, "/08. previous close")),
            "timestamp": timestamp(),
        }))
    })
    .await
}

async fn currency_exchange(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: ExchangeArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    tracing::info!(from = %args.from, to = %args.to, "Getting exchange rate");

    let key = format!("finance:exchange:{}:{}", args.from, args.to);
    let ttl = Ttl::Seconds(ctx.cache_ttls.finance_ttl_seconds);

    ctx.cached(&key, CATEGORY_FINANCE, ttl, || async {
        let body = ctx
            .get_json(
                "exchange rate",
                &ctx.upstream.alpha_vantage_base_url,
                &[
                    ("function", "CURRENCY_EXCHANGE_RATE".into()),
                    ("from_currency", args.from.clone()),
                    ("to_currency", args.to.clone()),
                    ("apikey", api_key),
                ],
            )
            .await?;

        let rate = section(
            &body,
            EXCHANGE_RATE,
            "exchange rate",
            "Invalid currency codes or API limit reached",
        )?;

        Ok(json!({
            "from_currency": optional(rate, "/1. From_Currency Code"),
            "from_currency_name": optional(rate, "/2. From_Currency Name"),
            "to_currency": optional(rate, "/3. To_Currency Code"),
            "to_currency_name": optional(rate, "/4. To_Currency Name"),
            "exchange_rate": number_from_str(&optional(rate, "/5. Exchange Rate")),
            "last_refreshed": optional(rate, "/6. Last Refreshed"),
            "timezone": optional(rate, "/7. Time Zone"),
            "timestamp": timestamp(),
        }))
    })
    .await
}

async fn crypto_price(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: SymbolArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    tracing::info!(symbol = %args.symbol, "Getting crypto price");

    let key = format!("finance:crypto:{}", args.symbol);
    let ttl = Ttl::Seconds(ctx.cache_ttls.finance_ttl_seconds);

    ctx.cached(&key, CATEGORY_FINANCE, ttl, || async {
        let body = ctx
            .get_json(
                "crypto price",
                &ctx.upstream.alpha_vantage_base_url,
                &[
                    ("function", "CURRENCY_EXCHANGE_RATE".into()),
                    ("from_currency", args.symbol.clone()),
                    ("to_currency", "USD".into()),
                    ("apikey", api_key),
                ],
            )
            .await?;

        let rate = section(
            &body,
            EXCHANGE_RATE,
            "crypto price",
            "Invalid crypto symbol or API limit reached",
        )?;

        Ok(json!({
            "symbol": optional(rate, "/1. From_Currency Code"),
            "name": optional(rate, "/2. From_Currency Name"),
            "price_usd": number_from_str(&optional(rate, "/5. Exchange Rate")),
            "last_refreshed": optional(rate, "/6. Last Refreshed"),
            "timestamp": timestamp(),
        }))
    })
    .await
}
