use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db;
use crate::services::paystack::PaystackGateway;
use crate::services::settlement::ReconciliationEngine;
use crate::services::vtpass::VtPassClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub paystack: Arc<PaystackGateway>,
    pub vtpass: Arc<VtPassClient>,
    pub settlement: ReconciliationEngine,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = db::build_pool(&config)?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let paystack = Arc::new(PaystackGateway::new(
            http_client.clone(),
            config.paystack_base_url.clone(),
            config.paystack_secret_key.clone().unwrap_or_default(),
        ));
        let vtpass = Arc::new(VtPassClient::new(
            http_client.clone(),
            config.vtpass_base_url.clone(),
            config.vtpass_api_key.clone().unwrap_or_default(),
            config.vtpass_secret_key.clone().unwrap_or_default(),
        ));

        let settlement = ReconciliationEngine::new(paystack.clone(), vtpass.clone());

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            paystack,
            vtpass,
            settlement,
        })
    }
}
