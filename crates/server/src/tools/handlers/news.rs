use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use multiapi_common::api::tools::{InputSchema, PropertySchema, ToolDefinition};
use multiapi_common::config::CATEGORY_NEWS;

use super::{optional, parse_args, required, timestamp};
use crate::cache::Ttl;
use crate::tools::registry::{handler_fn, ToolRegistry};
use crate::tools::{ToolContext, ToolError};

const PAGE_SIZE: u32 = 10;

const CATEGORIES: &[&str] = &[
    "business",
    "entertainment",
    "general",
    "health",
    "science",
    "sports",
    "technology",
];

#[derive(Deserialize)]
struct HeadlinesArgs {
    country: String,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(rename = "sortBy")]
    sort_by: String,
}

#[derive(Deserialize)]
struct SourcesArgs {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        ToolDefinition::new(
            "get_top_headlines",
            "Get top news headlines",
            InputSchema::new()
                .property(
                    "country",
                    PropertySchema::string("Country code (e.g., \"us\", \"gb\", \"de\")")
                        .with_default("us"),
                )
                .property(
                    "category",
                    PropertySchema::string("News category").one_of(CATEGORIES),
                ),
        ),
        handler_fn(top_headlines),
    );

    registry.register(
        ToolDefinition::new(
            "search_news",
            "Search news articles",
            InputSchema::new()
                .required_property("query", PropertySchema::string("Search query"))
                .property(
                    "sortBy",
                    PropertySchema::string("Sort results by")
                        .one_of(&["relevancy", "popularity", "publishedAt"])
                        .with_default("relevancy"),
                ),
        ),
        handler_fn(search_news),
    );

    registry.register(
        ToolDefinition::new(
            "get_news_sources",
            "Get available news sources",
            InputSchema::new()
                .property(
                    "category",
                    PropertySchema::string("Filter by category").one_of(CATEGORIES),
                )
                .property(
                    "country",
                    PropertySchema::string("Filter by country code (e.g., \"us\", \"gb\")"),
                ),
        ),
        handler_fn(news_sources),
    );
}

fn api_key(ctx: &ToolContext) -> Result<String, ToolError> {
    ctx.upstream
        .news_api_key
        .clone()
        .ok_or(ToolError::MissingApiKey("NewsAPI"))
}

fn articles(body: &Value, what: &str) -> Result<Vec<Value>, ToolError> {
    let articles = required(body, what, "/articles")?
        .as_array()
        .cloned()
        .unwrap_or_default();

    Ok(articles
        .iter()
        .map(|article| {
            json!({
                "title": optional(article, "/title"),
                "description": optional(article, "/description"),
                "source": optional(article, "/source/name"),
                "author": optional(article, "/author"),
                "url": optional(article, "/url"),
                "published_at": optional(article, "/publishedAt"),
                "image_url": optional(article, "/urlToImage"),
            })
        })
        .collect())
}

async fn top_headlines(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: HeadlinesArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    let category = args.category.as_deref().unwrap_or("all");
    tracing::info!(country = %args.country, category = %category, "Getting top headlines");

    let key = format!("news:headlines:{}:{}", args.country, category);
    let ttl = Ttl::Seconds(ctx.cache_ttls.news_ttl_seconds);

    ctx.cached(&key, CATEGORY_NEWS, ttl, || async {
        let mut query = vec![
            ("country", args.country.clone()),
            ("apiKey", api_key),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if let Some(category) = &args.category {
            query.push(("category", category.clone()));
        }

        let url = format!("{}/top-headlines", ctx.upstream.news_api_base_url);
        let body = ctx.get_json("headlines", &url, &query).await?;

        Ok(json!({
            "country": args.country,
            "category": category,
            "total_results": optional(&body, "/totalResults"),
            "articles": articles(&body, "headlines")?,
            "timestamp": timestamp(),
        }))
    })
    .await
}

async fn search_news(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: SearchArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    tracing::info!(query = %args.query, "Searching news");

    let key = format!("news:search:{}:{}", args.query, args.sort_by);
    let ttl = Ttl::Seconds(ctx.cache_ttls.news_ttl_seconds);

    ctx.cached(&key, CATEGORY_NEWS, ttl, || async {
        let url = format!("{}/everything", ctx.upstream.news_api_base_url);
        let body = ctx
            .get_json(
                "news search",
                &url,
                &[
                    ("q", args.query.clone()),
                    ("sortBy", args.sort_by.clone()),
                    ("language", "en".into()),
                    ("pageSize", PAGE_SIZE.to_string()),
                    ("apiKey", api_key),
                ],
            )
            .await?;

        Ok(json!({
            "query": args.query,
            "sort_by": args.sort_by,
            "total_results": optional(&body, "/totalResults"),
            "articles": articles(&body, "news search")?,
            "timestamp": timestamp(),
        }))
    })
    .await
}

async fn news_sources(args: Value, ctx: Arc<ToolContext>) -> Result<Value, ToolError> {
    let args: SourcesArgs = parse_args(args)?;
    let api_key = api_key(&ctx)?;
    let category = args.category.as_deref().unwrap_or("all");
    let country = args.country.as_deref().unwrap_or("all");
    tracing::info!(category = %category, country = %country, "Getting news sources");

    let key = format!("news:sources:{}:{}", category, country);
    let ttl = Ttl::Seconds(ctx.cache_ttls.news_ttl_seconds);

    ctx.cached(&key, CATEGORY_NEWS, ttl, || async {
        let mut query = vec![("apiKey", api_key)];
        if let Some(category) = &args.category {
            query.push(("category", category.clone()));
        }
        if let Some(country) = &args.country {
            query.push(("country", country.clone()));
        }

        let url = format!("{}/sources", ctx.upstream.news_api_base_url);
        let body = ctx.get_json("news sources", &url, &query).await?;

        let sources: Vec<Value> = required(&body, "news sources", "/sources")?
            .as_array()
            .map(|sources| {
                sources
                    .iter()
                    .map(|source| {
                        json!({
                            "id": optional(source, "/id"),
                            "name": optional(source, "/name"),
                            "description": optional(source, "/description"),
                            "url": optional(source, "/url"),
                            "category": optional(source, "/category"),
                            "language": optional(source, "/language"),
                            "country": optional(source, "/country"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "category": category,
            "country": country,
            "sources": sources,
            "timestamp": timestamp(),
        }))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_articles_flattens_source_name() {
        let body = json!({
            "totalResults": 1,
            "articles": [{
                "title": "Rust 2.0",
                "source": { "id": null, "name": "Example Times" },
                "publishedAt": "2024-01-01T00:00:00Z",
                "urlToImage": null
            }]
        });

        let out = articles(&body, "headlines").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["source"], json!("Example Times"));
        assert_eq!(out[0]["published_at"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(out[0]["author"], Value::Null);
    }

    #[test]
    fn test_articles_requires_array_field() {
        let err = articles(&json!({ "status": "error" }), "headlines").unwrap_err();
        assert!(err.to_string().contains("/articles"));
    }
}
