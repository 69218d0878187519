use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub orders: OrderConfig,
    pub reconciliation: ReconciliationConfig,
    pub signature: SignatureConfig,
    pub upi: UpiConfig,
    pub razorpay: RazorpayConfig,
    pub cashfree: CashfreeConfig,
    pub database: DatabaseConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct OrderConfig {
    /// Minutes a pending order stays payable before the expiry sweep closes it.
    pub expiry_minutes: i64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ReconciliationConfig {
    /// Half-width of the created-at window used for fuzzy matching.
    pub fuzzy_window_minutes: i64,
    /// Accepted absolute difference between reported and expected amounts,
    /// in minor units. One currency unit covers rounding of minor-unit
    /// conversions.
    pub amount_tolerance_minor: i64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SignatureConfig {
    /// Maximum age of a timestamped signature before it is rejected as a
    /// replay, in seconds.
    pub freshness_seconds: i64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct UpiConfig {
    /// Merchant virtual payment address (payee address in the intent).
    pub vpa: String,
    pub merchant_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CashfreeConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let expiry_minutes = env::var("ORDER_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;
        let fuzzy_window_minutes = env::var("RECON_FUZZY_WINDOW_MINUTES")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;
        let amount_tolerance_minor = env::var("RECON_AMOUNT_TOLERANCE_MINOR")
            .unwrap_or_else(|_| "100".to_string())
            .parse()?;
        let freshness_seconds = env::var("SIGNATURE_FRESHNESS_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()?;

        let vpa = env::var("UPI_VPA").unwrap_or_else(|_| "merchant@upi".to_string());
        let merchant_name =
            env::var("UPI_MERCHANT_NAME").unwrap_or_else(|_| "Merchant".to_string());

        let razorpay_key_id = env::var("RAZORPAY_KEY_ID").unwrap_or_default();
        let razorpay_key_secret = env::var("RAZORPAY_KEY_SECRET").unwrap_or_default();
        let razorpay_webhook_secret = env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default();
        let razorpay_api_base_url = env::var("RAZORPAY_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());

        let cashfree_client_id = env::var("CASHFREE_CLIENT_ID").unwrap_or_default();
        let cashfree_client_secret = env::var("CASHFREE_CLIENT_SECRET").unwrap_or_default();
        let cashfree_webhook_secret = env::var("CASHFREE_WEBHOOK_SECRET").unwrap_or_default();
        let cashfree_api_base_url = env::var("CASHFREE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.cashfree.com/pg".to_string());

        let db_url = env::var("PAYMENT_DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name =
            env::var("PAYMENT_DATABASE_NAME").unwrap_or_else(|_| "payment_db".to_string());

        Ok(Self {
            orders: OrderConfig { expiry_minutes },
            reconciliation: ReconciliationConfig {
                fuzzy_window_minutes,
                amount_tolerance_minor,
            },
            signature: SignatureConfig { freshness_seconds },
            upi: UpiConfig { vpa, merchant_name },
            razorpay: RazorpayConfig {
                key_id: razorpay_key_id,
                key_secret: Secret::new(razorpay_key_secret),
                webhook_secret: Secret::new(razorpay_webhook_secret),
                api_base_url: razorpay_api_base_url,
            },
            cashfree: CashfreeConfig {
                client_id: cashfree_client_id,
                client_secret: Secret::new(cashfree_client_secret),
                webhook_secret: Secret::new(cashfree_webhook_secret),
                api_base_url: cashfree_api_base_url,
            },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            service_name: "payment-engine".to_string(),
        })
    }
}
