//! Wallet payment gateway client (orders API).

use super::{GatewayError, IntentHandle, PaymentGateway, ProviderReport, minor_units_to_string};
use crate::config::WalletGatewayConfig;
use crate::models::PaymentProviderKind;
use crate::services::metrics::GATEWAY_CALL_DURATION;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

/// Client for a PayPal-style orders API: authenticate with client
/// credentials, create an order the buyer approves, then capture it.
#[derive(Clone)]
pub struct WalletGateway {
    client: reqwest::Client,
    config: WalletGatewayConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl WalletGateway {
    pub fn new(config: WalletGatewayConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.enabled
            && !self.config.client_id.is_empty()
            && !self.config.client_secret.expose_secret().is_empty()
    }

    /// Fetch a bearer token via the client-credentials grant. Tokens are
    /// short-lived; one per call keeps the client stateless.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.config.api_base_url))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Wallet gateway unreachable: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                code: "auth_failed".to_string(),
                message: format!("Wallet token request failed: {}", body),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Network(format!("Malformed token response: {}", e)))?;

        Ok(token.access_token)
    }

    async fn parse_order(
        &self,
        response: reqwest::Response,
        provider_ref: Option<&str>,
    ) -> Result<Order, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(format!("Failed to read response: {}", e)))?;

        tracing::debug!(status = %status, body = %body, "Wallet gateway response");

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| GatewayError::Network(format!("Malformed provider response: {}", e)))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(GatewayError::TransactionNotFound(
                provider_ref.unwrap_or("<unknown>").to_string(),
            ))
        } else {
            let error: ApiErrorBody = serde_json::from_str(&body).unwrap_or(ApiErrorBody {
                name: None,
                message: Some(body.clone()),
            });
            Err(GatewayError::Api {
                code: error.name.unwrap_or_else(|| "unknown".to_string()),
                message: error
                    .message
                    .unwrap_or_else(|| "Wallet gateway error".to_string()),
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for WalletGateway {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Wallet
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<IntentHandle, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Wallet gateway credentials not configured".to_string(),
            ));
        }

        let timer = GATEWAY_CALL_DURATION
            .with_label_values(&["wallet", "create_intent"])
            .start_timer();

        let token = self.access_token().await?;

        let reference = metadata
            .get("invoice_number")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference,
                "amount": {
                    "currency_code": currency,
                    "value": minor_units_to_string(amount_minor),
                }
            }]
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.config.api_base_url))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Wallet gateway unreachable: {}", e)))?;

        let order = self.parse_order(response, None).await?;
        timer.observe_duration();

        tracing::info!(
            order_id = %order.id,
            amount_minor = amount_minor,
            currency = %currency,
            "Wallet order created"
        );

        // The buyer approves the order by id; there is no separate secret.
        Ok(IntentHandle {
            client_token: order.id.clone(),
            provider_id: order.id,
        })
    }

    async fn get_status(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Wallet gateway credentials not configured".to_string(),
            ));
        }

        let timer = GATEWAY_CALL_DURATION
            .with_label_values(&["wallet", "get_status"])
            .start_timer();

        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.config.api_base_url, provider_ref
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Wallet gateway unreachable: {}", e)))?;

        let order = self.parse_order(response, Some(provider_ref)).await?;
        timer.observe_duration();

        Ok(ProviderReport {
            status: order.status,
            risk_level: None,
        })
    }

    async fn capture(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Wallet gateway credentials not configured".to_string(),
            ));
        }

        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.api_base_url, provider_ref
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("Wallet gateway unreachable: {}", e)))?;

        let order = self.parse_order(response, Some(provider_ref)).await?;

        Ok(ProviderReport {
            status: order.status,
            risk_level: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> WalletGatewayConfig {
        WalletGatewayConfig {
            client_id: "client-abc".to_string(),
            client_secret: Secret::new("secret-xyz".to_string()),
            api_base_url: base_url.to_string(),
            enabled: true,
        }
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "token-123",
                "token_type": "Bearer",
                "expires_in": 32400
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_intent_returns_order_id_as_token() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "ORDER-5XY",
                "status": "CREATED"
            })))
            .mount(&server)
            .await;

        let gateway = WalletGateway::new(test_config(&server.uri()), reqwest::Client::new());
        let handle = gateway
            .create_intent(16129, "USD", &serde_json::json!({"invoice_number": "F0042-117"}))
            .await
            .unwrap();

        assert_eq!(handle.provider_id, "ORDER-5XY");
        assert_eq!(handle.client_token, "ORDER-5XY");
    }

    #[tokio::test]
    async fn get_status_reports_provider_status_text() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/ORDER-5XY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ORDER-5XY",
                "status": "COMPLETED"
            })))
            .mount(&server)
            .await;

        let gateway = WalletGateway::new(test_config(&server.uri()), reqwest::Client::new());
        let report = gateway.get_status("ORDER-5XY").await.unwrap();
        assert_eq!(report.status, "COMPLETED");
    }

    #[tokio::test]
    async fn missing_order_maps_to_transaction_not_found() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/ORDER-GONE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "name": "RESOURCE_NOT_FOUND",
                "message": "The specified resource does not exist."
            })))
            .mount(&server)
            .await;

        let gateway = WalletGateway::new(test_config(&server.uri()), reqwest::Client::new());
        let err = gateway.get_status("ORDER-GONE").await.unwrap_err();
        assert!(matches!(err, GatewayError::TransactionNotFound(_)));
    }
}
