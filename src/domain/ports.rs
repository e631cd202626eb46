use super::flow::FlowKind;
use super::payment::PaymentRequest;
use super::status::{ConsentDocument, CreatedConsent};
use crate::error::GatewayResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Consent and payment operations against the remote gateway.
#[async_trait]
pub trait ConsentGateway: Send + Sync {
    /// Creates a consent and returns its id with the authorisation URL.
    async fn create_consent(
        &self,
        kind: FlowKind,
        request: &PaymentRequest,
    ) -> GatewayResult<CreatedConsent>;

    async fn get_consent(&self, consent_id: &str, kind: FlowKind)
    -> GatewayResult<ConsentDocument>;

    /// Draws a payment against an authorised consent.
    ///
    /// `request` is `None` for single consents, whose amount is already bound.
    async fn create_payment(
        &self,
        consent_id: &str,
        request: Option<&PaymentRequest>,
    ) -> GatewayResult<String>;

    /// Returns `true` when the consent is (or already was) revoked, `false`
    /// when the gateway refuses because the consent may have completed.
    async fn revoke_consent(&self, consent_id: &str, kind: FlowKind) -> GatewayResult<bool>;
}

/// Shows the authorisation page to the user.
#[async_trait]
pub trait RedirectLauncher: Send + Sync {
    async fn launch(&self, url: &str) -> Result<(), String>;
}

pub type GatewayRef = Arc<dyn ConsentGateway>;
pub type LauncherRef = Arc<dyn RedirectLauncher>;
