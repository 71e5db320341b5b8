//! Ordered selector candidates and the extraction helpers shared by every
//! marketplace parser.
//!
//! Each field is read from the first candidate selector that yields a usable
//! value. Candidate lists come from the built-in per-source profiles and can
//! be replaced from configuration when a marketplace changes its layout.

use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::models::{FailureCause, ScrapeOutcome, ScrapedListing, Source, UnavailableReason};
use crate::utils::error::AppError;

/// Titles longer than this are cut before they reach storage.
pub const MAX_TITLE_LENGTH: usize = 255;

static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").unwrap());

/// Prices written with a decimal comma, e.g. `1.299,99` or `12,50`.
static DECIMAL_COMMA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:\.\d{3})+,\d{1,2}\b|\d+,\d{1,2}\b").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorProfile {
    pub title: Vec<String>,
    #[serde(default)]
    pub price: Vec<String>,
    /// Whole and fractional price parts, for sources that render them separately.
    #[serde(default)]
    pub price_whole: Vec<String>,
    #[serde(default)]
    pub price_fraction: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    #[serde(default = "default_image_attributes")]
    pub image_attributes: Vec<String>,
    #[serde(default)]
    pub unavailable: Vec<UnavailableMarker>,
}

/// Text that marks a listing as permanently gone. Without a selector the
/// whole visible page text is searched. The text matches as a whole phrase,
/// case-insensitively, so `ended` does not match `extended`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnavailableMarker {
    #[serde(default)]
    pub selector: Option<String>,
    pub text: String,
    pub reason: UnavailableReason,
}

fn default_image_attributes() -> Vec<String> {
    vec!["src".to_string()]
}

impl UnavailableMarker {
    pub fn scoped(selector: &str, text: &str, reason: UnavailableReason) -> Self {
        Self {
            selector: Some(selector.to_string()),
            text: text.to_string(),
            reason,
        }
    }

    pub fn anywhere(text: &str, reason: UnavailableReason) -> Self {
        Self {
            selector: None,
            text: text.to_string(),
            reason,
        }
    }
}

struct CompiledMarker {
    scope: Option<Selector>,
    phrase: Regex,
    reason: UnavailableReason,
}

/// Selector-driven parser configured by a [`SelectorProfile`].
pub struct CandidateParser {
    source: Source,
    title: Vec<Selector>,
    price: Vec<Selector>,
    price_whole: Vec<Selector>,
    price_fraction: Vec<Selector>,
    image: Vec<Selector>,
    image_attributes: Vec<String>,
    markers: Vec<CompiledMarker>,
}

impl CandidateParser {
    pub fn new(source: Source, profile: &SelectorProfile) -> Result<Self, AppError> {
        let markers = profile
            .unavailable
            .iter()
            .map(|marker| {
                Ok(CompiledMarker {
                    scope: marker.selector.as_deref().map(compile).transpose()?,
                    phrase: compile_phrase(&marker.text)?,
                    reason: marker.reason,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(Self {
            source,
            title: compile_all(&profile.title)?,
            price: compile_all(&profile.price)?,
            price_whole: compile_all(&profile.price_whole)?,
            price_fraction: compile_all(&profile.price_fraction)?,
            image: compile_all(&profile.image)?,
            image_attributes: profile.image_attributes.clone(),
            markers,
        })
    }

    pub fn parse_document(&self, document: &str) -> ScrapeOutcome {
        let html = Html::parse_document(document);

        if let Some(reason) = self.unavailable_reason(&html) {
            tracing::debug!("{} page reports listing unavailable: {}", self.source, reason);
            return ScrapeOutcome::unavailable(reason);
        }

        let title = first_text(&html, &self.title);
        let price = self.extract_price(&html);

        match (title, price) {
            (Some(title), Some(price)) => ScrapeOutcome::Success(ScrapedListing {
                title: truncate_title(&title),
                price,
                image_url: first_attribute(&html, &self.image, &self.image_attributes),
            }),
            (title, price) => {
                tracing::debug!(
                    "{} page missing required fields (title: {}, price: {})",
                    self.source,
                    title.is_some(),
                    price.is_some()
                );
                ScrapeOutcome::failure(FailureCause::Parse)
            }
        }
    }

    fn unavailable_reason(&self, html: &Html) -> Option<UnavailableReason> {
        if self.markers.is_empty() {
            return None;
        }
        let page_text = visible_text(html);

        self.markers.iter().find_map(|marker| {
            let matched = match &marker.scope {
                Some(scope) => html
                    .select(scope)
                    .any(|element| marker.phrase.is_match(&element_text(element))),
                None => marker.phrase.is_match(&page_text),
            };
            matched.then_some(marker.reason)
        })
    }

    fn extract_price(&self, html: &Html) -> Option<Decimal> {
        if let Some(whole) = first_text(html, &self.price_whole) {
            let fraction = first_text(html, &self.price_fraction);
            if let Some(price) = combine_price(&whole, fraction.as_deref()) {
                return Some(price);
            }
        }

        self.price.iter().find_map(|selector| {
            html.select(selector)
                .find_map(|element| normalize_price(&element_text(element)))
        })
    }
}

fn compile(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector).map_err(|e| AppError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Case-insensitive, word-bounded pattern for a marker phrase. Inner
/// whitespace matches any run of whitespace.
fn compile_phrase(text: &str) -> Result<Regex, AppError> {
    let words: Vec<String> = text.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return Err(AppError::Selector {
            selector: text.to_string(),
            message: "unavailable marker text is empty".to_string(),
        });
    }
    Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s+"))).map_err(|e| AppError::Selector {
        selector: text.to_string(),
        message: e.to_string(),
    })
}

fn compile_all(selectors: &[String]) -> Result<Vec<Selector>, AppError> {
    selectors.iter().map(|s| compile(s)).collect()
}

/// Whitespace-collapsed text content of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matched by the first candidate that has any.
pub fn first_text(html: &Html, candidates: &[Selector]) -> Option<String> {
    candidates.iter().find_map(|selector| {
        html.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// First non-empty attribute value, trying attributes in priority order per element.
pub fn first_attribute(html: &Html, candidates: &[Selector], attributes: &[String]) -> Option<String> {
    candidates.iter().find_map(|selector| {
        html.select(selector).find_map(|element| {
            attributes.iter().find_map(|attr| {
                element
                    .value()
                    .attr(attr)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
        })
    })
}

/// Page text outside script, style and template elements.
pub fn visible_text(html: &Html) -> String {
    let mut text = String::new();
    for node in html.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| {
                parent
                    .value()
                    .as_element()
                    .map(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"))
            })
            .unwrap_or(false);
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}

/// Extracts a decimal amount from price text such as `US $1,299.99` or
/// `EUR 1.299,99`. A comma followed by one or two trailing digits is read as
/// the decimal separator; otherwise commas group thousands.
pub fn normalize_price(text: &str) -> Option<Decimal> {
    let grouped = PRICE_PATTERN.find(text);
    let comma = DECIMAL_COMMA_PATTERN.find(text);

    match (grouped, comma) {
        (_, Some(comma)) if grouped.is_none_or(|g| comma.start() <= g.start()) => {
            Decimal::from_str(&comma.as_str().replace('.', "").replace(',', ".")).ok()
        }
        (Some(grouped), _) => Decimal::from_str(&grouped.as_str().replace(',', "")).ok(),
        (None, _) => None,
    }
}

/// Joins a whole part (`1,299.`) and an optional fraction part (`99`).
pub fn combine_price(whole: &str, fraction: Option<&str>) -> Option<Decimal> {
    let whole_digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    if whole_digits.is_empty() {
        return None;
    }
    let fraction_digits: String = fraction
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    if fraction_digits.is_empty() {
        Decimal::from_str(&whole_digits).ok()
    } else {
        Decimal::from_str(&format!("{}.{}", whole_digits, fraction_digits)).ok()
    }
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn truncate_title(title: &str) -> String {
    if title.chars().count() > MAX_TITLE_LENGTH {
        let cut: String = title.chars().take(MAX_TITLE_LENGTH).collect();
        format!("{}...", cut)
    } else {
        title.to_string()
    }
}
