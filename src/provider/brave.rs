use crate::chat::settings::SearchSettings;
use crate::chat::util::truncate_with_ellipsis;
use crate::chat::warn::{self, WarnEvent};
use crate::error::{ChatLedgerError, WarnCode};
use crate::provider::{SearchDocument, SearchService};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use scraper::Html;
use serde_json::Value;
use std::env;
use std::time::Duration;

const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveSearch {
    api_key: String,
    settings: SearchSettings,
    client: Client,
}

impl BraveSearch {
    pub fn new(api_key: String, settings: &SearchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            api_key,
            settings: settings.clone(),
            client,
        })
    }

    pub fn from_env(settings: &SearchSettings) -> Result<Self> {
        let api_key = env::var("BRAVE_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("BRAVE_API_KEY is required for --search")?;
        Self::new(api_key.trim().to_string(), settings)
    }

    fn result_urls(&self, query: &str) -> Result<Vec<String>> {
        let count = self.settings.max_links.to_string();
        let response = self
            .client
            .get(SEARCH_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .context("brave search request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatLedgerError::RemoteCall {
                operation: "braveSearch".to_string(),
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            }
            .into());
        }
        let json: Value = response.json()?;
        Ok(extract_urls(&json))
    }

    fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            anyhow::bail!("fetch failed with status {}", response.status());
        }
        let html = response.text()?;
        let text = html_to_text(&html);
        Ok(truncate_with_ellipsis(
            &text,
            self.settings.max_page_chars as usize,
        ))
    }
}

fn extract_urls(json: &Value) -> Vec<String> {
    json.get("web")
        .and_then(|w| w.get("results"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("url").and_then(Value::as_str))
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn unquote(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|inner| !inner.trim().is_empty())
}

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if !hidden {
            out.push_str(text);
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl SearchService for BraveSearch {
    fn search(&self, query: &str) -> Result<Vec<SearchDocument>> {
        let mut urls = self.result_urls(query)?;
        if urls.is_empty()
            && let Some(unquoted) = unquote(query)
        {
            urls = self.result_urls(unquoted)?;
        }

        let mut documents = Vec::new();
        for url in urls {
            match self.fetch_page(&url) {
                Ok(text) if !text.trim().is_empty() => documents.push(SearchDocument { url, text }),
                Ok(_) => {}
                Err(err) => warn::emit(WarnEvent {
                    code: WarnCode::W004SearchSkipped,
                    stage: "search",
                    action: "fetch",
                    target: &url,
                    reason: "page fetch failed; skipping",
                    err: &format!("{err:#}"),
                }),
            }
        }
        Ok(documents)
    }
}
