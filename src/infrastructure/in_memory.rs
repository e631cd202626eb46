use crate::domain::flow::FlowKind;
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::ConsentGateway;
use crate::domain::status::{
    ConsentDocument, ConsentStatus, CreatedConsent, PaymentRecord, PaymentStatus,
};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// What a payment looks like on one consent read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStep {
    /// The payment is not in the consent's payment list yet.
    NotVisible,
    Status(PaymentStatus),
}

/// A queue of values where the last one sticks.
#[derive(Debug, Clone)]
struct Script<T>(VecDeque<T>);

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<T>) -> Self {
        Self(steps.into())
    }

    fn advance(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptedPayment {
    payment_id: String,
    steps: Script<PaymentStep>,
    request: Option<PaymentRequest>,
}

#[derive(Debug, Clone)]
struct ConsentRecord {
    kind: FlowKind,
    status: ConsentStatus,
    statuses: Script<ConsentStatus>,
    payments: Vec<ScriptedPayment>,
    request: Option<PaymentRequest>,
}

#[derive(Debug, Default)]
struct GatewayState {
    consents: HashMap<String, ConsentRecord>,
    next_consent: u32,
    next_payment: u32,
    create_calls: u32,
    consent_reads: u32,
    revoked: Vec<String>,
    create_delays: VecDeque<Duration>,
    fail_next_create: bool,
    fail_next_payment: bool,
    fail_revokes: bool,
    fail_reads_after: Option<u32>,
    next_payment_steps: Option<Vec<PaymentStep>>,
}

/// A gateway that lives in process memory.
///
/// Consents and payments follow scripts set up by the caller, which makes the
/// orchestration testable without a network and backs the CLI's
/// `--simulate` mode. Clones share the same state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGateway {
    state: Arc<RwLock<GatewayState>>,
    auto_authorise: bool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// New consents start out `Authorised`, as if the payer approved instantly.
    pub fn with_auto_authorise(mut self) -> Self {
        self.auto_authorise = true;
        self
    }

    /// Adds a consent directly, bypassing creation. Returns its id.
    pub async fn insert_consent(&self, kind: FlowKind, status: ConsentStatus) -> String {
        let mut state = self.state.write().await;
        let consent_id = next_consent_id(&mut state);
        state.consents.insert(
            consent_id.clone(),
            ConsentRecord {
                kind,
                status,
                statuses: Script::default(),
                payments: Vec::new(),
                request: None,
            },
        );
        consent_id
    }

    /// Sets the statuses the consent reports on its next reads.
    pub async fn script_consent_statuses(&self, consent_id: &str, statuses: Vec<ConsentStatus>) {
        if let Some(record) = self.state.write().await.consents.get_mut(consent_id) {
            record.statuses = Script::new(statuses);
        }
    }

    /// Overwrites a consent's status, e.g. when the payer rejects it.
    pub async fn set_consent_status(&self, consent_id: &str, status: ConsentStatus) {
        if let Some(record) = self.state.write().await.consents.get_mut(consent_id) {
            record.status = status;
            record.statuses = Script::default();
        }
    }

    /// Steps the next created payment goes through, one per consent read.
    ///
    /// Without a script a payment settles on the first read.
    pub async fn script_next_payment(&self, steps: Vec<PaymentStep>) {
        self.state.write().await.next_payment_steps = Some(steps);
    }

    /// Delays consent creation calls in order, one delay per call.
    pub async fn delay_creates(&self, delays: Vec<Duration>) {
        self.state.write().await.create_delays = delays.into();
    }

    pub async fn fail_next_create(&self) {
        self.state.write().await.fail_next_create = true;
    }

    pub async fn fail_next_payment(&self) {
        self.state.write().await.fail_next_payment = true;
    }

    pub async fn fail_revokes(&self) {
        self.state.write().await.fail_revokes = true;
    }

    /// Consent reads after the first `reads` total ones fail.
    pub async fn fail_reads_after(&self, reads: u32) {
        self.state.write().await.fail_reads_after = Some(reads);
    }

    pub async fn create_calls(&self) -> u32 {
        self.state.read().await.create_calls
    }

    pub async fn consent_reads(&self) -> u32 {
        self.state.read().await.consent_reads
    }

    /// Consent ids passed to `revoke_consent`, in call order.
    pub async fn revoked(&self) -> Vec<String> {
        self.state.read().await.revoked.clone()
    }

    pub async fn consent_status(&self, consent_id: &str) -> Option<ConsentStatus> {
        self.state
            .read()
            .await
            .consents
            .get(consent_id)
            .map(|record| record.status.clone())
    }

    /// The request a consent was created with.
    pub async fn consent_request(&self, consent_id: &str) -> Option<PaymentRequest> {
        self.state
            .read()
            .await
            .consents
            .get(consent_id)
            .and_then(|record| record.request.clone())
    }

    /// The draw-down request a payment was created with, if any.
    pub async fn payment_request(&self, payment_id: &str) -> Option<PaymentRequest> {
        self.state
            .read()
            .await
            .consents
            .values()
            .flat_map(|record| record.payments.iter())
            .find(|payment| payment.payment_id == payment_id)
            .and_then(|payment| payment.request.clone())
    }
}

fn next_consent_id(state: &mut GatewayState) -> String {
    state.next_consent += 1;
    format!("cns-{}", state.next_consent)
}

fn simulated_failure(body: &str) -> GatewayError {
    GatewayError::UnexpectedStatus {
        status: 503,
        body: body.to_string(),
    }
}

#[async_trait]
impl ConsentGateway for InMemoryGateway {
    async fn create_consent(
        &self,
        kind: FlowKind,
        request: &PaymentRequest,
    ) -> GatewayResult<CreatedConsent> {
        let delay = {
            let mut state = self.state.write().await;
            state.create_calls += 1;
            state.create_delays.pop_front()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if std::mem::take(&mut state.fail_next_create) {
            return Err(simulated_failure("service unavailable"));
        }

        let consent_id = next_consent_id(&mut state);
        let status = if self.auto_authorise {
            ConsentStatus::Authorised
        } else {
            ConsentStatus::AwaitingAuthorisation
        };
        state.consents.insert(
            consent_id.clone(),
            ConsentRecord {
                kind,
                status,
                statuses: Script::default(),
                payments: Vec::new(),
                request: Some(request.clone()),
            },
        );

        Ok(CreatedConsent {
            redirect_url: format!("https://gateway.invalid/authorise?cid={consent_id}"),
            consent_id,
        })
    }

    async fn get_consent(
        &self,
        consent_id: &str,
        _kind: FlowKind,
    ) -> GatewayResult<ConsentDocument> {
        let mut state = self.state.write().await;
        state.consent_reads += 1;
        if let Some(limit) = state.fail_reads_after
            && state.consent_reads > limit
        {
            return Err(simulated_failure("service unavailable"));
        }

        let record = state
            .consents
            .get_mut(consent_id)
            .ok_or_else(|| GatewayError::UnexpectedStatus {
                status: 404,
                body: format!("no consent {consent_id}"),
            })?;

        if let Some(status) = record.statuses.advance() {
            record.status = status;
        }

        let payments = record
            .payments
            .iter_mut()
            .filter_map(|payment| match payment.steps.advance() {
                Some(PaymentStep::Status(status)) => Some(PaymentRecord {
                    payment_id: payment.payment_id.clone(),
                    status,
                }),
                Some(PaymentStep::NotVisible) | None => None,
            })
            .collect();

        Ok(ConsentDocument {
            consent_id: consent_id.to_string(),
            status: record.status.clone(),
            payments,
        })
    }

    async fn create_payment(
        &self,
        consent_id: &str,
        request: Option<&PaymentRequest>,
    ) -> GatewayResult<String> {
        let mut state = self.state.write().await;
        if std::mem::take(&mut state.fail_next_payment) {
            return Err(simulated_failure("payment service unavailable"));
        }

        let steps = state.next_payment_steps.take().unwrap_or_else(|| {
            vec![PaymentStep::Status(
                PaymentStatus::AcceptedSettlementCompleted,
            )]
        });
        state.next_payment += 1;
        let payment_id = format!("pmt-{}", state.next_payment);

        let record = state
            .consents
            .get_mut(consent_id)
            .ok_or_else(|| GatewayError::UnexpectedStatus {
                status: 404,
                body: format!("no consent {consent_id}"),
            })?;
        if record.status != ConsentStatus::Authorised {
            return Err(GatewayError::UnexpectedStatus {
                status: 422,
                body: format!("consent is {}", record.status),
            });
        }

        record.payments.push(ScriptedPayment {
            payment_id: payment_id.clone(),
            steps: Script::new(steps),
            request: request.cloned(),
        });
        Ok(payment_id)
    }

    async fn revoke_consent(&self, consent_id: &str, _kind: FlowKind) -> GatewayResult<bool> {
        let mut state = self.state.write().await;
        state.revoked.push(consent_id.to_string());
        if state.fail_revokes {
            return Err(simulated_failure("revocation unavailable"));
        }

        let Some(record) = state.consents.get_mut(consent_id) else {
            return Err(GatewayError::UnexpectedStatus {
                status: 404,
                body: format!("no consent {consent_id}"),
            });
        };

        let settled = record.payments.iter().any(|payment| {
            payment.steps.0.back()
                == Some(&PaymentStep::Status(
                    PaymentStatus::AcceptedSettlementCompleted,
                ))
        });

        if record.status == ConsentStatus::Revoked {
            return Ok(true);
        }
        if record.kind == FlowKind::Single && settled {
            return Ok(false);
        }

        record.status = ConsentStatus::Revoked;
        record.statuses = Script::default();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Amount, Pcr};
    use rust_decimal_macros::dec;

    fn request() -> PaymentRequest {
        PaymentRequest::new(Amount::new(dec!(10.0)).unwrap(), Pcr::default())
    }

    #[tokio::test]
    async fn test_created_consent_awaits_authorisation() {
        let gateway = InMemoryGateway::new();
        let created = gateway
            .create_consent(FlowKind::Single, &request())
            .await
            .unwrap();

        assert_eq!(created.consent_id, "cns-1");
        assert!(created.redirect_url.ends_with("cid=cns-1"));
        let consent = gateway
            .get_consent(&created.consent_id, FlowKind::Single)
            .await
            .unwrap();
        assert_eq!(consent.status, ConsentStatus::AwaitingAuthorisation);
        assert_eq!(gateway.consent_request("cns-1").await, Some(request()));
    }

    #[tokio::test]
    async fn test_payment_requires_authorised_consent() {
        let gateway = InMemoryGateway::new();
        let pending = gateway
            .insert_consent(FlowKind::Single, ConsentStatus::AwaitingAuthorisation)
            .await;
        assert!(gateway.create_payment(&pending, None).await.is_err());

        let authorised = gateway
            .insert_consent(FlowKind::Single, ConsentStatus::Authorised)
            .await;
        let payment_id = gateway.create_payment(&authorised, None).await.unwrap();
        let consent = gateway
            .get_consent(&authorised, FlowKind::Single)
            .await
            .unwrap();
        assert_eq!(
            consent.find_payment(&payment_id).map(|p| p.status.clone()),
            Some(PaymentStatus::AcceptedSettlementCompleted)
        );
    }

    #[tokio::test]
    async fn test_payment_script_last_step_sticks() {
        let gateway = InMemoryGateway::new();
        let consent_id = gateway
            .insert_consent(FlowKind::Enduring, ConsentStatus::Authorised)
            .await;
        gateway
            .script_next_payment(vec![
                PaymentStep::NotVisible,
                PaymentStep::Status(PaymentStatus::Pending),
            ])
            .await;
        let payment_id = gateway
            .create_payment(&consent_id, Some(&request()))
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let consent = gateway
                .get_consent(&consent_id, FlowKind::Enduring)
                .await
                .unwrap();
            seen.push(consent.find_payment(&payment_id).map(|p| p.status.clone()));
        }

        assert_eq!(
            seen,
            vec![
                None,
                Some(PaymentStatus::Pending),
                Some(PaymentStatus::Pending)
            ]
        );
        assert_eq!(gateway.payment_request(&payment_id).await, Some(request()));
    }

    #[tokio::test]
    async fn test_revoke_semantics() {
        let gateway = InMemoryGateway::new();
        let consent_id = gateway
            .insert_consent(FlowKind::Single, ConsentStatus::AwaitingAuthorisation)
            .await;

        assert!(gateway.revoke_consent(&consent_id, FlowKind::Single).await.unwrap());
        // Already revoked is still a success.
        assert!(gateway.revoke_consent(&consent_id, FlowKind::Single).await.unwrap());
        assert_eq!(
            gateway.consent_status(&consent_id).await,
            Some(ConsentStatus::Revoked)
        );

        let paid = gateway
            .insert_consent(FlowKind::Single, ConsentStatus::Authorised)
            .await;
        gateway.create_payment(&paid, None).await.unwrap();
        assert!(!gateway.revoke_consent(&paid, FlowKind::Single).await.unwrap());

        assert_eq!(gateway.revoked().await, vec![consent_id.clone(), consent_id, paid]);
    }
}
