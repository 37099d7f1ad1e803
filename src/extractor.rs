use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::ExtractionConfig;
use crate::utils::error::{AppError, Result};

/// One open slot block found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityEntry {
    pub city: String,
    pub building: String,
    pub dates: String,
}

impl AvailabilityEntry {
    /// Identity used to suppress repeat notifications.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}|{}", self.city, self.building, self.dates)
    }
}

#[derive(Debug)]
pub struct AvailabilityExtractor {
    entry: Selector,
    city: Selector,
    building: Selector,
    dates: Selector,
    marker: String,
}

impl AvailabilityExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            entry: parse_selector(&config.entry_selector)?,
            city: parse_selector(&config.city_selector)?,
            building: parse_selector(&config.building_selector)?,
            dates: parse_selector(&config.dates_selector)?,
            marker: config.available_marker.clone(),
        })
    }

    /// Returns every block whose dates text carries the availability marker.
    pub fn extract(&self, html: &str) -> Vec<AvailabilityEntry> {
        let document = Html::parse_document(html);

        document
            .select(&self.entry)
            .filter_map(|block| {
                let dates = text_of(block, &self.dates);
                if !dates.contains(&self.marker) {
                    return None;
                }
                Some(AvailabilityEntry {
                    city: text_of(block, &self.city),
                    building: text_of(block, &self.building),
                    dates,
                })
            })
            .collect()
    }
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// True when `selector` matches at least one element of `html`.
pub fn contains_element(html: &str, selector: &Selector) -> bool {
    Html::parse_document(html).select(selector).next().is_some()
}

fn text_of(block: ElementRef<'_>, selector: &Selector) -> String {
    block
        .select(selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

fn normalize_whitespace(text: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    ws.replace_all(text.trim(), " ").into_owned()
}

/// Renders the message subscribers receive.
pub fn format_message(header: &str, entries: &[AvailabilityEntry]) -> String {
    let mut message = format!("{}\n\n", header);
    for entry in entries {
        message.push_str(&format!(
            "Город: {}\nЗдание: {}\nДоступные даты: {}\n\n",
            entry.city, entry.building, entry.dates
        ));
    }
    message.trim_end().to_string()
}
