//! Five-stage product form wizard.
//!
//! Each stage owns a pure predicate over its own fields. Moving forward is
//! gated on the current stage's predicate; moving back never validates.
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub mod currency;

use currency::CurrencyTable;

static SKU: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{2,31}$").expect("valid regex"));

const MAX_NAME_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 2000;
const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BasicInfo,
    Pricing,
    Classification,
    Shipping,
    Media,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::BasicInfo,
        Stage::Pricing,
        Stage::Classification,
        Stage::Shipping,
        Stage::Media,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::BasicInfo => "Basic info",
            Stage::Pricing => "Pricing",
            Stage::Classification => "Classification",
            Stage::Shipping => "Shipping",
            Stage::Media => "Media",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
}

/// Every field the wizard collects, across all stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    pub description: String,

    pub price: f64,
    pub compare_at_price: Option<f64>,
    pub currency: String,
    pub stock: u32,

    pub category_id: String,
    pub tags: Vec<String>,

    /// Digital goods skip the shipping checks.
    pub digital: bool,
    pub weight_kg: f64,
    pub dimensions: Dimensions,

    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A stage whose predicate does not hold, with the offending fields.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} has {} invalid field(s)", .errors.len())]
pub struct StepError {
    pub stage: Stage,
    pub errors: Vec<FieldError>,
}

impl StepError {
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// Result of a successful forward move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved(Stage),
    Finished,
}

/// Check one stage's fields.
pub fn validate_stage(
    stage: Stage,
    draft: &ProductDraft,
    currencies: &CurrencyTable,
) -> Result<(), StepError> {
    let errors = match stage {
        Stage::BasicInfo => basic_info(draft),
        Stage::Pricing => pricing(draft, currencies),
        Stage::Classification => classification(draft),
        Stage::Shipping => shipping(draft),
        Stage::Media => media(draft),
    };
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StepError { stage, errors })
    }
}

fn basic_info(d: &ProductDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let name = d.name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    } else if name.chars().count() > MAX_NAME_CHARS {
        errors.push(FieldError::new(
            "name",
            format!("must be at most {} characters", MAX_NAME_CHARS),
        ));
    }
    if !SKU.is_match(d.sku.trim()) {
        errors.push(FieldError::new(
            "sku",
            "must be 3-32 upper-case letters, digits or dashes",
        ));
    }
    if d.description.chars().count() > MAX_DESCRIPTION_CHARS {
        errors.push(FieldError::new(
            "description",
            format!("must be at most {} characters", MAX_DESCRIPTION_CHARS),
        ));
    }
    errors
}

fn pricing(d: &ProductDraft, currencies: &CurrencyTable) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !d.price.is_finite() || d.price <= 0.0 {
        errors.push(FieldError::new("price", "must be greater than zero"));
    }
    if d.currency.trim().is_empty() {
        errors.push(FieldError::new("currency", "is required"));
    } else if !currencies.supports(&d.currency) {
        errors.push(FieldError::new(
            "currency",
            format!("'{}' is not a configured currency", d.currency.trim()),
        ));
    }
    if let Some(compare_at) = d.compare_at_price {
        if !compare_at.is_finite() || compare_at < d.price {
            errors.push(FieldError::new(
                "compare_at_price",
                "must not be lower than the price",
            ));
        }
    }
    errors
}

fn classification(d: &ProductDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if d.category_id.trim().is_empty() {
        errors.push(FieldError::new("category_id", "is required"));
    }
    if d.tags.len() > MAX_TAGS {
        errors.push(FieldError::new(
            "tags",
            format!("at most {} tags are allowed", MAX_TAGS),
        ));
    }
    if d.tags.iter().any(|t| t.trim().is_empty()) {
        errors.push(FieldError::new("tags", "must not contain empty tags"));
    }
    errors
}

fn shipping(d: &ProductDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if d.digital {
        return errors;
    }
    if !d.weight_kg.is_finite() || d.weight_kg <= 0.0 {
        errors.push(FieldError::new("weight_kg", "must be greater than zero"));
    }
    let dims = d.dimensions;
    if [dims.length_cm, dims.width_cm, dims.height_cm]
        .iter()
        .any(|v| !v.is_finite() || *v <= 0.0)
    {
        errors.push(FieldError::new(
            "dimensions",
            "length, width and height must be greater than zero",
        ));
    }
    errors
}

fn media(d: &ProductDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if d.images.is_empty() {
        errors.push(FieldError::new("images", "at least one image is required"));
    }
    for raw in &d.images {
        let ok = Url::parse(raw.trim())
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false);
        if !ok {
            errors.push(FieldError::new(
                "images",
                format!("'{}' is not an http(s) URL", raw),
            ));
        }
    }
    errors
}

/// Linear wizard over a [`ProductDraft`].
#[derive(Debug, Clone)]
pub struct ProductWizard {
    draft: ProductDraft,
    stage: Stage,
    currencies: CurrencyTable,
}

impl ProductWizard {
    pub fn new(draft: ProductDraft, currencies: CurrencyTable) -> Self {
        Self {
            draft,
            stage: Stage::BasicInfo,
            currencies,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn draft_mut(&mut self) -> &mut ProductDraft {
        &mut self.draft
    }

    /// Move forward if the current stage validates.
    pub fn next(&mut self) -> Result<Advance, StepError> {
        validate_stage(self.stage, &self.draft, &self.currencies)?;
        match self.stage.next() {
            Some(stage) => {
                debug!(from = %self.stage, to = %stage, "wizard advanced");
                self.stage = stage;
                Ok(Advance::Moved(stage))
            }
            None => Ok(Advance::Finished),
        }
    }

    /// Move back one stage without validating. Stays put on the first stage.
    pub fn previous(&mut self) -> Stage {
        if let Some(stage) = self.stage.previous() {
            self.stage = stage;
        }
        self.stage
    }

    /// Failures of every stage, in stage order.
    pub fn validate_all(&self) -> Vec<StepError> {
        Stage::ALL
            .iter()
            .filter_map(|s| validate_stage(*s, &self.draft, &self.currencies).err())
            .collect()
    }

    /// Price in the base currency, derived from the current draft on every call.
    pub fn base_price(&self) -> Option<f64> {
        if !self.draft.price.is_finite() || self.draft.price <= 0.0 {
            return None;
        }
        self.currencies.to_base(self.draft.price, &self.draft.currency)
    }
}
