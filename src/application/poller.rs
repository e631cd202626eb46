use crate::config::PollConfig;
use crate::domain::flow::{FlowIdentity, FlowKind};
use crate::domain::ports::{ConsentGateway, GatewayRef};
use crate::domain::status::ConsentStatus;
use crate::error::{FlowError, GatewayError, GatewayResult};
use tracing::{debug, info, warn};

/// How a completion poll ended.
#[derive(Debug)]
pub enum PollOutcome {
    Settled { attempts: u32 },
    Rejected { attempts: u32 },
    /// No terminal status within the attempt budget. `revoked` reports
    /// whether the compensating revoke went through.
    TimedOut { attempts: u32, revoked: bool },
    /// A status read failed; polling stopped at that attempt.
    Aborted { attempts: u32, error: GatewayError },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Settled { attempts }
            | Self::Rejected { attempts }
            | Self::TimedOut { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    pub fn into_result(self, identity: &FlowIdentity, payment_id: &str) -> Result<(), FlowError> {
        match self {
            Self::Settled { .. } => Ok(()),
            Self::Rejected { .. } => Err(FlowError::PaymentRejected {
                payment_id: payment_id.to_string(),
            }),
            Self::TimedOut { attempts, .. } => Err(FlowError::CompletionTimeout {
                payment_id: payment_id.to_string(),
                attempts,
            }),
            Self::Aborted { error, .. } => Err(FlowError::Verification {
                consent_id: identity.consent_id.clone(),
                source: error,
            }),
        }
    }
}

/// Polls the gateway until a payment or consent reaches a terminal state.
///
/// Payments are only reachable through their consent, so every attempt
/// re-reads the consent and looks the payment up in its payment list.
pub struct CompletionPoller {
    gateway: GatewayRef,
    config: PollConfig,
}

impl CompletionPoller {
    pub fn new(gateway: GatewayRef, config: PollConfig) -> Self {
        Self { gateway, config }
    }

    /// Waits for `payment_id` to settle or be rejected.
    ///
    /// Runs at most `max_attempts` reads. On timeout a single consent is
    /// revoked (best effort); enduring consents are left alone since they
    /// outlive any one payment.
    pub async fn poll(&self, identity: &FlowIdentity, payment_id: &str) -> PollOutcome {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            let consent = match self
                .gateway
                .get_consent(&identity.consent_id, identity.kind)
                .await
            {
                Ok(consent) => consent,
                Err(error) => {
                    warn!(
                        consent_id = %identity.consent_id,
                        payment_id,
                        attempt,
                        error = %error,
                        "status read failed, abandoning poll"
                    );
                    return PollOutcome::Aborted {
                        attempts: attempt,
                        error,
                    };
                }
            };

            match consent.find_payment(payment_id) {
                Some(payment) if payment.status.is_success() => {
                    info!(payment_id, attempt, "payment settled");
                    return PollOutcome::Settled { attempts: attempt };
                }
                Some(payment) if payment.status.is_failure() => {
                    info!(payment_id, attempt, "payment rejected");
                    return PollOutcome::Rejected { attempts: attempt };
                }
                Some(payment) => {
                    debug!(payment_id, attempt, status = %payment.status, "payment in progress");
                }
                None => debug!(payment_id, attempt, "payment not visible yet"),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        warn!(
            consent_id = %identity.consent_id,
            payment_id,
            attempts = max_attempts,
            "payment did not reach a terminal status"
        );

        let revoked = match identity.kind {
            FlowKind::Single => revoke_best_effort(self.gateway.as_ref(), identity).await,
            FlowKind::Enduring => false,
        };

        PollOutcome::TimedOut {
            attempts: max_attempts,
            revoked,
        }
    }

    /// Re-reads a pending consent until it is authorised or fails.
    ///
    /// Returns the last status seen, which is still pending if the budget ran
    /// out. The caller decides what to compensate.
    pub async fn await_authorisation(&self, identity: &FlowIdentity) -> GatewayResult<ConsentStatus> {
        let mut status = ConsentStatus::AwaitingAuthorisation;

        for attempt in 1..=self.config.max_attempts {
            tokio::time::sleep(self.config.interval).await;

            status = self
                .gateway
                .get_consent(&identity.consent_id, identity.kind)
                .await?
                .status;

            if !status.is_pending() {
                debug!(consent_id = %identity.consent_id, attempt, %status, "consent left pending state");
                return Ok(status);
            }
        }

        warn!(consent_id = %identity.consent_id, %status, "consent still pending after wait");
        Ok(status)
    }
}

/// Revokes a consent, logging instead of failing.
pub(crate) async fn revoke_best_effort(gateway: &dyn ConsentGateway, identity: &FlowIdentity) -> bool {
    match gateway
        .revoke_consent(&identity.consent_id, identity.kind)
        .await
    {
        Ok(true) => {
            info!(consent_id = %identity.consent_id, "consent revoked");
            true
        }
        Ok(false) => {
            info!(consent_id = %identity.consent_id, "revocation declined, consent may have completed");
            false
        }
        Err(error) => {
            warn!(consent_id = %identity.consent_id, error = %error, "failed to revoke consent");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::PaymentStatus;
    use crate::infrastructure::in_memory::{InMemoryGateway, PaymentStep};
    use std::sync::Arc;
    use std::time::Duration;

    async fn authorised_consent_with_payment(
        gateway: &InMemoryGateway,
        kind: FlowKind,
        steps: Vec<PaymentStep>,
    ) -> (FlowIdentity, String) {
        let consent_id = gateway.insert_consent(kind, ConsentStatus::Authorised).await;
        gateway.script_next_payment(steps).await;
        let payment_id = gateway.create_payment(&consent_id, None).await.unwrap();
        (FlowIdentity::new(consent_id, kind), payment_id)
    }

    fn poller(gateway: &Arc<InMemoryGateway>) -> CompletionPoller {
        CompletionPoller::new(
            gateway.clone(),
            PollConfig::new(10, Duration::from_secs(1)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_on_third_attempt() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (identity, payment_id) = authorised_consent_with_payment(
            &gateway,
            FlowKind::Single,
            vec![
                PaymentStep::NotVisible,
                PaymentStep::Status(PaymentStatus::Pending),
                PaymentStep::Status(PaymentStatus::AcceptedSettlementCompleted),
            ],
        )
        .await;

        let outcome = poller(&gateway).poll(&identity, &payment_id).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert!(gateway.revoked().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_short_circuits() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (identity, payment_id) = authorised_consent_with_payment(
            &gateway,
            FlowKind::Single,
            vec![
                PaymentStep::Status(PaymentStatus::Pending),
                PaymentStep::Status(PaymentStatus::Rejected),
            ],
        )
        .await;

        let outcome = poller(&gateway).poll(&identity, &payment_id).await;

        assert!(matches!(outcome, PollOutcome::Rejected { attempts: 2 }));
        assert!(gateway.revoked().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enduring_timeout_does_not_revoke() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (identity, payment_id) = authorised_consent_with_payment(
            &gateway,
            FlowKind::Enduring,
            vec![PaymentStep::Status(PaymentStatus::AcceptedSettlementInProcess)],
        )
        .await;

        let outcome = poller(&gateway).poll(&identity, &payment_id).await;

        assert!(matches!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 10,
                revoked: false
            }
        ));
        assert!(gateway.revoked().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_aborts_immediately() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (identity, payment_id) = authorised_consent_with_payment(
            &gateway,
            FlowKind::Single,
            vec![PaymentStep::Status(PaymentStatus::Pending)],
        )
        .await;
        gateway.fail_reads_after(gateway.consent_reads().await + 2).await;

        let outcome = poller(&gateway).poll(&identity, &payment_id).await;

        assert!(matches!(outcome, PollOutcome::Aborted { attempts: 3, .. }));
        let err = outcome.into_result(&identity, &payment_id).unwrap_err();
        assert!(matches!(err, FlowError::Verification { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_authorisation_returns_first_non_pending_status() {
        let gateway = Arc::new(InMemoryGateway::new());
        let consent_id = gateway
            .insert_consent(FlowKind::Single, ConsentStatus::AwaitingAuthorisation)
            .await;
        gateway
            .script_consent_statuses(
                &consent_id,
                vec![
                    ConsentStatus::GatewayAwaitingSubmission,
                    ConsentStatus::Authorised,
                ],
            )
            .await;
        let identity = FlowIdentity::new(consent_id, FlowKind::Single);

        let status = poller(&gateway).await_authorisation(&identity).await.unwrap();

        assert_eq!(status, ConsentStatus::Authorised);
        assert_eq!(gateway.consent_reads().await, 2);
    }
}
