//! Telephony provider REST client
//!
//! The only outbound use of the provider API in this service: replacing the
//! control document of a live call during a warm transfer. Everything else
//! is provider-driven through webhooks.

use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

/// Narrow contract to the telephony provider's call-management API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelephonyClient: Send + Sync {
    /// Replace the control document of an in-progress call.
    async fn redirect_call(&self, call_id: &str, document_xml: &str) -> Result<()>;
}

pub struct HttpTelephonyClient {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

impl HttpTelephonyClient {
    pub fn new(api_base: &str, account_sid: &str, auth_token: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
        }
    }
}

#[async_trait]
impl TelephonyClient for HttpTelephonyClient {
    async fn redirect_call(&self, call_id: &str, document_xml: &str) -> Result<()> {
        let url = format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.api_base, self.account_sid, call_id
        );

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Twiml", document_xml)])
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach telephony provider: {}", e);
                DomainError::ProviderUnavailable(format!("telephony api: {}", e))
            })?;

        if !response.status().is_success() {
            error!(
                "Telephony provider rejected redirect for call {}: {}",
                call_id,
                response.status()
            );
            return Err(DomainError::ProviderUnavailable(format!(
                "telephony api returned {}",
                response.status()
            )));
        }

        debug!("Redirected live call {}", call_id);
        Ok(())
    }
}
