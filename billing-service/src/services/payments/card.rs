//! Card payment gateway client (payment-intent API).

use super::{GatewayError, IntentHandle, PaymentGateway, ProviderReport};
use crate::config::CardGatewayConfig;
use crate::models::PaymentProviderKind;
use crate::services::metrics::GATEWAY_CALL_DURATION;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

/// Client for a Stripe-style payment-intent API: create an intent, hand the
/// client secret to the frontend, poll the intent for its status.
#[derive(Clone)]
pub struct CardGateway {
    client: reqwest::Client,
    config: CardGatewayConfig,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
    risk_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl CardGateway {
    pub fn new(config: CardGatewayConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.enabled && !self.config.secret_key.expose_secret().is_empty()
    }

    async fn parse_intent(
        &self,
        response: reqwest::Response,
        provider_ref: Option<&str>,
    ) -> Result<PaymentIntent, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(format!("Failed to read response: {}", e)))?;

        tracing::debug!(status = %status, body = %body, "Card gateway response");

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| GatewayError::Network(format!("Malformed provider response: {}", e)))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(GatewayError::TransactionNotFound(
                provider_ref.unwrap_or("<unknown>").to_string(),
            ))
        } else {
            let error: ApiErrorBody = serde_json::from_str(&body).unwrap_or(ApiErrorBody {
                error: ApiErrorDetail {
                    code: None,
                    message: Some(body.clone()),
                },
            });
            Err(GatewayError::Api {
                code: error.error.code.unwrap_or_else(|| "unknown".to_string()),
                message: error
                    .error
                    .message
                    .unwrap_or_else(|| "Card gateway error".to_string()),
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Card
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<IntentHandle, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Card gateway credentials not configured".to_string(),
            ));
        }

        let timer = GATEWAY_CALL_DURATION
            .with_label_values(&["card", "create_intent"])
            .start_timer();

        let mut form = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            ("payment_method_types[]".to_string(), "card".to_string()),
        ];
        if let Some(map) = metadata.as_object() {
            for (key, value) in map {
                let rendered = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                form.push((format!("metadata[{}]", key), rendered));
            }
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", self.config.api_base_url))
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Card gateway unreachable: {}", e)))?;

        let intent = self.parse_intent(response, None).await?;
        timer.observe_duration();

        tracing::info!(
            intent_id = %intent.id,
            amount_minor = amount_minor,
            currency = %currency,
            "Card payment intent created"
        );

        let client_token = intent.client_secret.clone().ok_or_else(|| GatewayError::Api {
            code: "missing_client_secret".to_string(),
            message: "Provider returned no client secret".to_string(),
        })?;

        Ok(IntentHandle {
            provider_id: intent.id,
            client_token,
        })
    }

    async fn get_status(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Card gateway credentials not configured".to_string(),
            ));
        }

        let timer = GATEWAY_CALL_DURATION
            .with_label_values(&["card", "get_status"])
            .start_timer();

        let response = self
            .client
            .get(format!(
                "{}/payment_intents/{}",
                self.config.api_base_url, provider_ref
            ))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Card gateway unreachable: {}", e)))?;

        let intent = self.parse_intent(response, Some(provider_ref)).await?;
        timer.observe_duration();

        Ok(ProviderReport {
            status: intent.status,
            risk_level: intent.risk_level,
        })
    }

    async fn capture(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Card gateway credentials not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!(
                "{}/payment_intents/{}/capture",
                self.config.api_base_url, provider_ref
            ))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Card gateway unreachable: {}", e)))?;

        let intent = self.parse_intent(response, Some(provider_ref)).await?;

        Ok(ProviderReport {
            status: intent.status,
            risk_level: intent.risk_level,
        })
    }
}
