//! Wikidata MediaWiki API client.

use crate::config::RetrieverConfig;
use crate::error::{FusionError, Result};
use crate::item::{ClaimValue, Item, TitleHit};
use crate::retriever::FactSource;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::OnceLock;

pub struct WikidataClient {
    client: Client,
    api_url: String,
}

impl WikidataClient {
    pub fn new(config: &RetrieverConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone());
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FusionError::Config(format!("invalid proxy {proxy:?}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| FusionError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    async fn get(&self, key: &str, params: &[(&str, &str)]) -> Result<Value> {
        let lookup_err = |message: String| FusionError::Lookup {
            key: key.to_string(),
            message,
        };
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(lookup_err(format!("HTTP {}", response.status())));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| lookup_err(e.to_string()))
    }
}

#[async_trait]
impl FactSource for WikidataClient {
    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<TitleHit>> {
        let limit = limit.to_string();
        let data = self
            .get(
                query,
                &[
                    ("action", "query"),
                    ("list", "search"),
                    ("srsearch", query),
                    ("srlimit", limit.as_str()),
                    ("srprop", "snippet"),
                    ("format", "json"),
                ],
            )
            .await?;
        Ok(parse_search(&data))
    }

    async fn fetch_items(&self, ids: &[String]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join("|");
        let data = self
            .get(
                &joined,
                &[
                    ("action", "wbgetentities"),
                    ("ids", joined.as_str()),
                    ("languages", "en"),
                    ("props", "labels|descriptions|aliases|claims"),
                    ("format", "json"),
                ],
            )
            .await?;
        Ok(parse_entities(&data))
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn strip_markup(snippet: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));
    re.replace_all(snippet, "").into_owned()
}

/// `query.search[]` of a `list=search` response.
pub fn parse_search(data: &Value) -> Vec<TitleHit> {
    data["query"]["search"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let id = hit["title"].as_str()?.to_string();
                    Some(TitleHit {
                        title: id.clone(),
                        snippet: strip_markup(hit["snippet"].as_str().unwrap_or("")),
                        id,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn claim_value(snak: &Value) -> Option<ClaimValue> {
    let datavalue = &snak["mainsnak"]["datavalue"];
    let value = &datavalue["value"];
    match datavalue["type"].as_str()? {
        "wikibase-entityid" => Some(ClaimValue::Item(value["id"].as_str()?.to_string())),
        "string" => Some(ClaimValue::Literal(value.as_str()?.to_string())),
        "monolingualtext" => Some(ClaimValue::Literal(value["text"].as_str()?.to_string())),
        "time" => Some(ClaimValue::Literal(value["time"].as_str()?.to_string())),
        "quantity" => Some(ClaimValue::Literal(value["amount"].as_str()?.to_string())),
        _ => None,
    }
}

/// `entities{}` of a `wbgetentities` response. Missing entities are skipped.
pub fn parse_entities(data: &Value) -> Vec<Item> {
    let Some(entities) = data["entities"].as_object() else {
        return Vec::new();
    };
    entities
        .iter()
        .filter(|(_, e)| e.get("missing").is_none())
        .map(|(id, e)| {
            let mut item = Item::new(
                id.clone(),
                e["labels"]["en"]["value"].as_str().unwrap_or(""),
                e["descriptions"]["en"]["value"].as_str().unwrap_or(""),
            );
            if let Some(aliases) = e["aliases"]["en"].as_array() {
                item.aliases = aliases
                    .iter()
                    .filter_map(|a| a["value"].as_str().map(str::to_string))
                    .collect();
            }
            if let Some(claims) = e["claims"].as_object() {
                for (pid, snaks) in claims {
                    let values: Vec<ClaimValue> = snaks
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(claim_value)
                        .collect();
                    if !values.is_empty() {
                        item.claims.insert(pid.clone(), values);
                    }
                }
            }
            item
        })
        .collect()
}
