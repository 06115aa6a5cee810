use std::path::Path;

use opml::{Outline, OPML};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};

/// The subscription export formats we accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// Google Takeout `subscriptions.json`.
    Json,
    /// OPML outline from the provider's subscription manager.
    Opml,
}

impl ImportFormat {
    pub fn from_mime_type(mime_type: &str) -> Result<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match essence.as_str() {
            "application/json" => Ok(ImportFormat::Json),
            "application/xml" | "text/xml" | "text/x-opml" => Ok(ImportFormat::Opml),
            other => Err(AppError::ImportParse(format!(
                "unsupported file format {:?}; expected a subscriptions.json takeout or an OPML export",
                other
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("json") => Ok(ImportFormat::Json),
            Some("xml") | Some("opml") => Ok(ImportFormat::Opml),
            _ => Err(AppError::ImportParse(format!(
                "cannot tell the format of {:?} from its extension",
                path
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TakeoutItem {
    snippet: TakeoutSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutSnippet {
    title: String,
    resource_id: TakeoutResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutResource {
    channel_id: String,
}

/// Parses an exported subscription list into `(channel_id, name)` pairs.
pub fn parse_subscriptions(format: ImportFormat, content: &str) -> Result<Vec<(String, String)>> {
    match format {
        ImportFormat::Json => parse_takeout_json(content),
        ImportFormat::Opml => parse_opml(content),
    }
}

pub fn parse_subscription_file(path: &Path) -> Result<Vec<(String, String)>> {
    let format = ImportFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_subscriptions(format, &content)
}

fn parse_takeout_json(content: &str) -> Result<Vec<(String, String)>> {
    let items: Vec<TakeoutItem> = serde_json::from_str(content)
        .map_err(|e| AppError::ImportParse(format!("unknown json structure: {}", e)))?;

    Ok(items
        .into_iter()
        .map(|item| (item.snippet.resource_id.channel_id, item.snippet.title))
        .collect())
}

fn parse_opml(content: &str) -> Result<Vec<(String, String)>> {
    let document = OPML::from_str(content)?;

    let mut channels = Vec::new();
    collect_outlines(&document.body.outlines, &mut channels);
    Ok(channels)
}

fn collect_outlines(outlines: &[Outline], channels: &mut Vec<(String, String)>) {
    for outline in outlines {
        if let Some(xml_url) = &outline.xml_url {
            match channel_id_from_feed_url(xml_url) {
                Some(channel_id) => channels.push((channel_id, outline.text.clone())),
                None => tracing::warn!("Skipping outline without a channel id: {}", xml_url),
            }
        }
        collect_outlines(&outline.outlines, channels);
    }
}

fn channel_id_from_feed_url(xml_url: &str) -> Option<String> {
    let url = Url::parse(xml_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "channel_id")
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| !id.is_empty())
}
