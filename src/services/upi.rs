//! UPI payment intent builder and QR rendering.
//!
//! Produces `upi://pay?...` deep links with percent-encoded values in a
//! stable key order, and renders them to base64 PNG QR codes for display.

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, Luma};
use once_cell::sync::Lazy;
use qrcode::QrCode;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::io::Cursor;

use crate::config::UpiConfig;
use crate::error::EngineError;
use crate::models::{Order, MINOR_UNITS_PER_MAJOR};

/// `user@bank`-style payee address.
static VPA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9]+$").expect("valid vpa pattern"));

/// Alphanumeric plus `. _ -`, at most 35 characters.
static TXN_REF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,35}$").expect("valid ref pattern"));

/// Parameters of a UPI payment intent. `pa`, `pn`, `tr` and `am` are
/// required; the rest are optional per the intent format.
#[derive(Debug, Clone, Default)]
pub struct UpiParams {
    /// Payee address (VPA).
    pub pa: String,
    /// Payee name.
    pub pn: String,
    /// Transaction reference.
    pub tr: String,
    /// Amount, major units, decimal string.
    pub am: String,
    /// Transaction note.
    pub tn: Option<String>,
    /// Currency code.
    pub cu: Option<String>,
    /// Merchant category code.
    pub mc: Option<String>,
    /// Terminal id.
    pub tid: Option<String>,
    /// Reference URL.
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct UpiService {
    config: UpiConfig,
}

impl UpiService {
    pub fn new(config: UpiConfig) -> Self {
        Self { config }
    }

    /// Build a `upi://pay?...` deep link from validated parameters.
    ///
    /// Values are percent-encoded and emitted in the fixed key order
    /// `pa, pn, tr, tn, am, cu, mc, tid, url`; the amount is always
    /// rendered with exactly two decimals.
    pub fn build_payload(&self, params: &UpiParams) -> Result<String, EngineError> {
        if params.pa.trim().is_empty()
            || params.pn.trim().is_empty()
            || params.tr.trim().is_empty()
            || params.am.trim().is_empty()
        {
            return Err(EngineError::Validation(
                "Missing required UPI parameters".to_string(),
            ));
        }

        if !VPA_PATTERN.is_match(&params.pa) {
            return Err(EngineError::Validation(
                "Invalid payee address format".to_string(),
            ));
        }

        let amount: Decimal = params
            .am
            .trim()
            .parse()
            .map_err(|_| EngineError::Validation("Invalid amount".to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("Invalid amount".to_string()));
        }

        let mut pairs: Vec<(&str, String)> = vec![
            ("pa", params.pa.clone()),
            ("pn", params.pn.clone()),
            ("tr", params.tr.clone()),
        ];
        if let Some(tn) = &params.tn {
            pairs.push(("tn", tn.clone()));
        }
        pairs.push(("am", Self::format_amount(amount)));
        if let Some(cu) = &params.cu {
            pairs.push(("cu", cu.clone()));
        }
        if let Some(mc) = &params.mc {
            pairs.push(("mc", mc.clone()));
        }
        if let Some(tid) = &params.tid {
            pairs.push(("tid", tid.clone()));
        }
        if let Some(url) = &params.url {
            pairs.push(("url", url.clone()));
        }

        let query = pairs
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("upi://pay?{}", query))
    }

    /// Intent link for a freshly created order, using the configured
    /// merchant VPA and name.
    pub fn payload_for_order(&self, order: &Order, note: &str) -> Result<String, EngineError> {
        let major = Decimal::from(order.amount_minor) / Decimal::from(MINOR_UNITS_PER_MAJOR);
        self.build_payload(&UpiParams {
            pa: self.config.vpa.clone(),
            pn: self.config.merchant_name.clone(),
            tr: order.transaction_ref.clone(),
            am: major.to_string(),
            tn: Some(note.to_string()),
            cu: Some(order.currency.clone()),
            ..Default::default()
        })
    }

    /// Render an amount with exactly two decimal places, rounding midpoints
    /// away from zero.
    pub fn format_amount(amount: Decimal) -> String {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.2}", rounded)
    }

    /// Whether a transaction reference is safe to embed in an intent link.
    pub fn validate_transaction_ref(reference: &str) -> bool {
        TXN_REF_PATTERN.is_match(reference)
    }

    /// Render a payload to a base64-encoded PNG QR image.
    pub fn qr_png_base64(&self, payload: &str) -> Result<String, EngineError> {
        let code = QrCode::new(payload)
            .map_err(|e| EngineError::Validation(format!("QR encoding failed: {}", e)))?;
        let image = code.render::<Luma<u8>>().build();

        let dynamic_image = DynamicImage::ImageLuma8(image);
        let mut buffer = Cursor::new(Vec::new());
        dynamic_image
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .map_err(|e| EngineError::Validation(format!("QR rendering failed: {}", e)))?;

        Ok(general_purpose::STANDARD.encode(buffer.get_ref()))
    }
}
