use super::token::TokenCache;
use super::wire::{
    ConsentCreatedResponse, ConsentRequest, ConsentResponse, PaymentBody, PaymentCreatedResponse,
    QuickPaymentResponse, merchant_now,
};
use crate::config::GatewayConfig;
use crate::domain::flow::FlowKind;
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::ConsentGateway;
use crate::domain::status::{ConsentDocument, CreatedConsent};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const SINGLE_CONSENTS_PATH: &str = "/payments/v1/single-consents";
pub const ENDURING_CONSENTS_PATH: &str = "/payments/v1/enduring-consents";
pub const QUICK_PAYMENTS_PATH: &str = "/payments/v1/quick-payments";
pub const PAYMENTS_PATH: &str = "/payments/v1/payments";

/// [`ConsentGateway`] over the gateway's HTTPS payments API.
#[derive(Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    tokens: TokenCache,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("consentpay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let tokens = TokenCache::new(
            client.clone(),
            format!("{}{}", config.base_url, TOKEN_PATH),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.token_timeout,
        );

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// Creates a consent and its payment in one call.
    ///
    /// The returned id is the quick payment id, which also addresses it for
    /// [`HttpGateway::get_quick_payment`].
    pub async fn create_quick_payment(
        &self,
        request: &PaymentRequest,
    ) -> GatewayResult<CreatedConsent> {
        let body = ConsentRequest::single(&self.config.redirect_uri, request);
        let response = self
            .send(self.request(Method::POST, &self.url(QUICK_PAYMENTS_PATH)).await?.json(&body))
            .await?;
        let created = decode::<ConsentCreatedResponse>(response).await?.validate()?;
        info!(quick_payment_id = %created.consent_id, "quick payment created");
        Ok(created)
    }

    pub async fn get_quick_payment(&self, quick_payment_id: &str) -> GatewayResult<ConsentDocument> {
        let url = format!("{}/{}", self.url(QUICK_PAYMENTS_PATH), quick_payment_id);
        let response = self.send(self.request(Method::GET, &url).await?).await?;
        let quick = decode::<QuickPaymentResponse>(response).await?;
        Ok(quick.consent.into_document(quick_payment_id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn consent_url(&self, kind: FlowKind, consent_id: Option<&str>) -> String {
        let base = match kind {
            FlowKind::Single => self.url(SINGLE_CONSENTS_PATH),
            FlowKind::Enduring => self.url(ENDURING_CONSENTS_PATH),
        };
        match consent_id {
            Some(id) => format!("{base}/{id}"),
            None => base,
        }
    }

    async fn request(&self, method: Method, url: &str) -> GatewayResult<RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {token}")))
    }

    /// Sends and maps every non-2xx status to an error.
    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(self.status_error(response).await)
    }

    async fn status_error(&self, response: Response) -> GatewayError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return GatewayError::Auth {
                message: "gateway rejected the access token".to_string(),
            };
        }
        let body = response.text().await.unwrap_or_default();
        GatewayError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    response
        .json()
        .await
        .map_err(|e| GatewayError::InvalidResponse {
            message: e.to_string(),
        })
}

#[async_trait]
impl ConsentGateway for HttpGateway {
    async fn create_consent(
        &self,
        kind: FlowKind,
        request: &PaymentRequest,
    ) -> GatewayResult<CreatedConsent> {
        let redirect_uri = &self.config.redirect_uri;
        let body = match kind {
            FlowKind::Single => ConsentRequest::single(redirect_uri, request),
            FlowKind::Enduring => ConsentRequest::enduring(
                redirect_uri,
                request,
                merchant_now(self.config.merchant_utc_offset),
            ),
        };

        let url = self.consent_url(kind, None);
        let response = self
            .send(self.request(Method::POST, &url).await?.json(&body))
            .await?;
        let created = decode::<ConsentCreatedResponse>(response).await?.validate()?;
        debug!(consent_id = %created.consent_id, %kind, "consent created");
        Ok(created)
    }

    async fn get_consent(
        &self,
        consent_id: &str,
        kind: FlowKind,
    ) -> GatewayResult<ConsentDocument> {
        let url = self.consent_url(kind, Some(consent_id));
        let response = self.send(self.request(Method::GET, &url).await?).await?;
        let consent = decode::<ConsentResponse>(response).await?;
        Ok(consent.into_document(consent_id))
    }

    async fn create_payment(
        &self,
        consent_id: &str,
        request: Option<&PaymentRequest>,
    ) -> GatewayResult<String> {
        let body = PaymentBody::new(consent_id, request);
        let response = self
            .send(self.request(Method::POST, &self.url(PAYMENTS_PATH)).await?.json(&body))
            .await?;
        let payment_id = decode::<PaymentCreatedResponse>(response).await?.validate()?;
        debug!(consent_id, %payment_id, "payment created");
        Ok(payment_id)
    }

    async fn revoke_consent(&self, consent_id: &str, kind: FlowKind) -> GatewayResult<bool> {
        let url = self.consent_url(kind, Some(consent_id));
        let response = self.request(Method::DELETE, &url).await?.send().await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::CONFLICT => {
                debug!(consent_id, "consent already revoked");
                Ok(true)
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                warn!(consent_id, "gateway refused revocation, consent may have completed");
                Ok(false)
            }
            _ => Err(self.status_error(response).await),
        }
    }
}
