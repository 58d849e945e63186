//! Conversion of prices from any configured currency into the tenant's base unit.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static CURRENCY_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid regex"));

/// True for three upper-case ASCII letters (ISO-4217 shape).
pub fn is_currency_code(code: &str) -> bool {
    CURRENCY_CODE.is_match(code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyTable {
    base: String,
    rates: BTreeMap<String, f64>,
}

impl CurrencyTable {
    /// `rates` maps a currency code to units of `base` per one unit of that currency.
    pub fn new(base: impl Into<String>, rates: impl IntoIterator<Item = (String, f64)>) -> Self {
        let base = base.into().to_ascii_uppercase();
        let mut rates: BTreeMap<String, f64> = rates
            .into_iter()
            .map(|(code, rate)| (code.to_ascii_uppercase(), rate))
            .collect();
        rates.insert(base.clone(), 1.0);
        Self { base, rates }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn supports(&self, code: &str) -> bool {
        self.rates.contains_key(&code.trim().to_ascii_uppercase())
    }

    /// Amount expressed in the base currency, rounded to cents. `None` for unknown codes.
    pub fn to_base(&self, amount: f64, code: &str) -> Option<f64> {
        let rate = self.rates.get(&code.trim().to_ascii_uppercase())?;
        Some(round_cents(amount * rate))
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
