use super::classify;
use super::poller::{CompletionPoller, revoke_best_effort};
use crate::config::PollConfig;
use crate::domain::flow::{
    FlowEvent, FlowIdentity, FlowKind, FlowPhase, FlowSnapshot, ResumeSignal,
};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::{GatewayRef, LauncherRef};
use crate::domain::status::ConsentStatus;
use crate::error::{FlowError, Result};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;
const PAYMENT_COMPLETED: &str = "Payment completed.";
const CHECKING_STATUS: &str = "Checking your payment status...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The consent exists and the authorisation page was handed off.
    Launched,
    /// A payment is already being verified; nothing was started.
    Rejected,
    Failed,
    /// A newer flow or a reset took over while this one was in flight.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Completed { payment_id: String },
    Failed { message: String },
    /// The signal named a different consent; the flow went back to idle.
    Discarded,
    /// No flow was waiting on a redirect.
    Ignored,
    Superseded,
}

#[derive(Debug, Default)]
struct FlowState {
    phase: FlowPhase,
    identity: Option<FlowIdentity>,
    error: Option<String>,
    request: Option<PaymentRequest>,
    /// Bumped by every start and reset. Continuations from older values are stale.
    attempt: u64,
    redirect_open: bool,
    status_notice_shown: bool,
}

impl FlowState {
    fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            phase: self.phase,
            identity: self.identity.clone(),
            error: self.error.clone(),
        }
    }

    fn clear(&mut self) {
        self.phase = FlowPhase::Idle;
        self.identity = None;
        self.error = None;
        self.attempt += 1;
    }
}

/// What an async step captured when it was issued.
#[derive(Debug, Clone)]
struct FlowContext {
    attempt: u64,
    identity: Option<FlowIdentity>,
    request: PaymentRequest,
}

impl FlowContext {
    fn holds(&self, state: &FlowState, expected: FlowPhase) -> bool {
        state.attempt == self.attempt
            && state.identity == self.identity
            && state.phase == expected
    }

    fn bind(&self, identity: FlowIdentity) -> Self {
        Self {
            identity: Some(identity),
            ..self.clone()
        }
    }
}

/// Drives one consent flow at a time from creation to a settled payment.
///
/// All state lives behind a single mutex that is never held across a gateway
/// call. Every continuation re-checks the flow attempt, identity and phase it
/// captured before writing, so a response for a superseded flow is dropped.
pub struct ConsentOrchestrator {
    gateway: GatewayRef,
    launcher: LauncherRef,
    poller: CompletionPoller,
    state: Mutex<FlowState>,
    events: broadcast::Sender<FlowEvent>,
}

impl ConsentOrchestrator {
    pub fn new(gateway: GatewayRef, launcher: LauncherRef, poll: PollConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            poller: CompletionPoller::new(gateway.clone(), poll),
            gateway,
            launcher,
            state: Mutex::new(FlowState::default()),
            events,
        }
    }

    /// Receives a [`FlowEvent::StateChanged`] for every state mutation and
    /// each user message, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> FlowSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Starts a new flow, superseding whatever flow came before.
    ///
    /// A consent left over from the previous flow is revoked first; failure
    /// to revoke is logged and does not stop the new flow.
    pub async fn start(&self, kind: FlowKind, request: PaymentRequest) -> StartOutcome {
        let (ctx, previous) = {
            let mut state = self.state.lock().await;
            if state.phase == FlowPhase::Verifying {
                info!("payment verification in progress, ignoring start");
                return StartOutcome::Rejected;
            }

            let mut previous = None;
            self.mutate(&mut state, |s| {
                previous = s.identity.take();
                s.clear();
                s.phase = FlowPhase::CreatingConsent;
                s.request = Some(request.clone());
                s.status_notice_shown = false;
            });

            let ctx = FlowContext {
                attempt: state.attempt,
                identity: None,
                request,
            };
            (ctx, previous)
        };

        if let Some(previous) = previous {
            info!(consent_id = %previous.consent_id, "revoking consent from superseded flow");
            revoke_best_effort(self.gateway.as_ref(), &previous).await;
        }

        let created = match self.gateway.create_consent(kind, &ctx.request).await {
            Ok(created) => created,
            Err(source) => {
                return match self
                    .fail(&ctx, FlowPhase::CreatingConsent, FlowError::ConsentCreation(source))
                    .await
                {
                    Some(_) => StartOutcome::Failed,
                    None => StartOutcome::Superseded,
                };
            }
        };

        let identity = FlowIdentity::new(created.consent_id, kind);
        let stored = self
            .guarded(&ctx, FlowPhase::CreatingConsent, |s| {
                s.identity = Some(identity.clone());
                s.phase = FlowPhase::AwaitingRedirect;
            })
            .await;
        if stored.is_err() {
            info!(consent_id = %identity.consent_id, "revoking consent created for a superseded flow");
            revoke_best_effort(self.gateway.as_ref(), &identity).await;
            return StartOutcome::Superseded;
        }
        info!(consent_id = %identity.consent_id, %kind, "consent created, handing off to redirect");

        let ctx = ctx.bind(identity);
        match self.launcher.launch(&created.redirect_url).await {
            Ok(()) => StartOutcome::Launched,
            Err(reason) => {
                match self
                    .fail(&ctx, FlowPhase::AwaitingRedirect, FlowError::Launch(reason))
                    .await
                {
                    Some(_) => StartOutcome::Failed,
                    None => StartOutcome::Superseded,
                }
            }
        }
    }

    /// The user came back from the authorisation page.
    pub async fn resume(&self, signal: ResumeSignal) -> ResumeOutcome {
        let (ctx, identity) = {
            let mut state = self.state.lock().await;
            if state.phase != FlowPhase::AwaitingRedirect {
                debug!(phase = %state.phase, "resume outside of a redirect, ignoring");
                return ResumeOutcome::Ignored;
            }
            let (Some(current), Some(request)) = (state.identity.clone(), state.request.clone())
            else {
                return ResumeOutcome::Ignored;
            };

            let matches_current = signal.consent_id.as_deref() == Some(current.consent_id.as_str());

            if let Some(error) = signal.error
                && (matches_current || signal.consent_id.is_none())
            {
                let err = FlowError::AuthorisationDeclined {
                    error,
                    description: signal.error_description.unwrap_or_default(),
                };
                warn!(consent_id = %current.consent_id, error = %err, "authorisation returned an error");
                let message = classify::user_message(&err).to_string();
                self.mutate(&mut state, |s| {
                    s.phase = FlowPhase::Error;
                    s.error = Some(message.clone());
                });
                self.notify_user(false, &message);
                return ResumeOutcome::Failed { message };
            }

            if !matches_current {
                info!(
                    received = ?signal.consent_id,
                    expected = %current.consent_id,
                    "resume does not match the current consent, discarding"
                );
                self.mutate(&mut state, |s| {
                    s.phase = FlowPhase::Idle;
                    s.identity = None;
                    s.error = None;
                });
                return ResumeOutcome::Discarded;
            }

            self.mutate(&mut state, |s| s.phase = FlowPhase::Verifying);
            if !state.redirect_open && !state.status_notice_shown {
                state.status_notice_shown = true;
                self.notify_user(true, CHECKING_STATUS);
            }

            let ctx = FlowContext {
                attempt: state.attempt,
                identity: Some(current.clone()),
                request,
            };
            (ctx, current)
        };

        self.verify(ctx, identity).await
    }

    /// The app came back to the foreground without a deep link.
    ///
    /// Verifies the consent the flow is already waiting on, if any.
    pub async fn resume_foreground(&self) -> ResumeOutcome {
        let current = {
            let state = self.state.lock().await;
            match (&state.phase, &state.identity) {
                (FlowPhase::AwaitingRedirect, Some(identity)) => identity.consent_id.clone(),
                _ => return ResumeOutcome::Ignored,
            }
        };
        self.resume(ResumeSignal::for_consent(current)).await
    }

    /// Back to idle with no identity and no error.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.mutate(&mut state, FlowState::clear);
    }

    /// Back to idle and drops the cart and redirect bookkeeping too.
    pub async fn reset_payment_state(&self) {
        let mut state = self.state.lock().await;
        self.mutate(&mut state, |s| {
            s.clear();
            s.request = None;
            s.redirect_open = false;
            s.status_notice_shown = false;
        });
    }

    pub async fn mark_redirect_open(&self) {
        self.state.lock().await.redirect_open = true;
    }

    pub async fn mark_redirect_closed(&self) {
        self.state.lock().await.redirect_open = false;
    }

    pub async fn is_redirect_open(&self) -> bool {
        self.state.lock().await.redirect_open
    }

    async fn verify(&self, ctx: FlowContext, identity: FlowIdentity) -> ResumeOutcome {
        let mut status = match self
            .gateway
            .get_consent(&identity.consent_id, identity.kind)
            .await
        {
            Ok(consent) => consent.status,
            Err(source) => {
                let err = FlowError::Verification {
                    consent_id: identity.consent_id.clone(),
                    source,
                };
                return self.fail_resume(&ctx, err).await;
            }
        };

        if status.is_pending() && self.is_current(&ctx, FlowPhase::Verifying).await {
            debug!(consent_id = %identity.consent_id, %status, "consent pending, waiting for authorisation");
            status = match self.poller.await_authorisation(&identity).await {
                Ok(status) => status,
                Err(source) => {
                    let err = FlowError::Verification {
                        consent_id: identity.consent_id.clone(),
                        source,
                    };
                    return self.fail_resume(&ctx, err).await;
                }
            };
        }

        if !self.is_current(&ctx, FlowPhase::Verifying).await {
            debug!(consent_id = %identity.consent_id, "flow changed during verification");
            return ResumeOutcome::Superseded;
        }

        match status {
            ConsentStatus::Authorised => self.pay(ctx, identity).await,
            ConsentStatus::Unknown(raw) => {
                self.fail_resume(&ctx, FlowError::UnexpectedState(raw)).await
            }
            status if status.is_terminal_failure() => {
                if status != ConsentStatus::Revoked {
                    revoke_best_effort(self.gateway.as_ref(), &identity).await;
                }
                self.fail_unauthorised(&ctx, &identity, status).await
            }
            status => {
                warn!(consent_id = %identity.consent_id, %status, "consent never authorised, revoking");
                revoke_best_effort(self.gateway.as_ref(), &identity).await;
                self.fail_unauthorised(&ctx, &identity, status).await
            }
        }
    }

    async fn fail_unauthorised(
        &self,
        ctx: &FlowContext,
        identity: &FlowIdentity,
        status: ConsentStatus,
    ) -> ResumeOutcome {
        let err = FlowError::ConsentNotAuthorised {
            consent_id: identity.consent_id.clone(),
            status: status.to_string(),
        };
        self.fail_resume(ctx, err).await
    }

    async fn pay(&self, ctx: FlowContext, identity: FlowIdentity) -> ResumeOutcome {
        let draw_down = match identity.kind {
            FlowKind::Single => None,
            FlowKind::Enduring => Some(&ctx.request),
        };

        let payment_id = match self
            .gateway
            .create_payment(&identity.consent_id, draw_down)
            .await
        {
            Ok(payment_id) => payment_id,
            Err(source) => {
                return self
                    .fail_resume(&ctx, FlowError::PaymentCreation(source))
                    .await;
            }
        };

        if !self.is_current(&ctx, FlowPhase::Verifying).await {
            debug!(%payment_id, "flow changed after payment creation");
            return ResumeOutcome::Superseded;
        }
        info!(consent_id = %identity.consent_id, %payment_id, "payment created, polling for completion");

        let outcome = self.poller.poll(&identity, &payment_id).await;
        debug!(%payment_id, attempts = outcome.attempts(), "poll finished");

        if let Err(err) = outcome.into_result(&identity, &payment_id) {
            return self.fail_resume(&ctx, err).await;
        }

        let finished = self
            .guarded(&ctx, FlowPhase::Verifying, |s| {
                s.phase = FlowPhase::Idle;
                s.identity = None;
                s.error = None;
                s.request = None;
            })
            .await;
        if finished.is_err() {
            return ResumeOutcome::Superseded;
        }

        self.notify_user(true, PAYMENT_COMPLETED);
        ResumeOutcome::Completed { payment_id }
    }

    async fn fail_resume(&self, ctx: &FlowContext, err: FlowError) -> ResumeOutcome {
        match self.fail(ctx, FlowPhase::Verifying, err).await {
            Some(message) => ResumeOutcome::Failed { message },
            None => ResumeOutcome::Superseded,
        }
    }

    /// Moves the flow into the error phase if `ctx` is still current.
    ///
    /// A consent-creation failure never produced an identity, so there is
    /// nothing to retain; later failures keep the identity for diagnostics.
    /// Returns the user-facing message, or `None` if the flow moved on.
    async fn fail(&self, ctx: &FlowContext, expected: FlowPhase, err: FlowError) -> Option<String> {
        let message = classify::user_message(&err).to_string();
        let applied = self
            .guarded(ctx, expected, |s| {
                s.phase = FlowPhase::Error;
                s.error = Some(message.clone());
            })
            .await;

        match applied {
            Ok(()) => {
                warn!(phase = %expected, error = %err, "payment flow failed");
                self.notify_user(false, &message);
                Some(message)
            }
            Err(_) => {
                debug!(error = %err, "dropping failure from a superseded flow");
                None
            }
        }
    }

    /// Applies `mutate` only if the flow `ctx` belongs to is still current
    /// and in `expected`; otherwise reports [`FlowError::StaleContext`].
    async fn guarded<F>(&self, ctx: &FlowContext, expected: FlowPhase, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut FlowState),
    {
        let mut state = self.state.lock().await;
        if !ctx.holds(&state, expected) {
            debug!(
                attempt = ctx.attempt,
                current_attempt = state.attempt,
                phase = %state.phase,
                %expected,
                "stale continuation"
            );
            return Err(FlowError::StaleContext);
        }
        self.mutate(&mut state, mutate);
        Ok(())
    }

    async fn is_current(&self, ctx: &FlowContext, expected: FlowPhase) -> bool {
        ctx.holds(&*self.state.lock().await, expected)
    }

    fn mutate<F>(&self, state: &mut FlowState, mutate: F)
    where
        F: FnOnce(&mut FlowState),
    {
        let before = state.snapshot();
        mutate(state);
        let after = state.snapshot();
        if before != after {
            debug!(phase = %after.phase, "flow state changed");
            // No subscribers is fine.
            let _ = self.events.send(FlowEvent::StateChanged(after));
        }
    }

    fn notify_user(&self, success: bool, message: &str) {
        let _ = self.events.send(FlowEvent::UserMessage {
            success,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Amount, Pcr};
    use crate::infrastructure::in_memory::InMemoryGateway;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    struct NoopLauncher;

    #[async_trait]
    impl crate::domain::ports::RedirectLauncher for NoopLauncher {
        async fn launch(&self, _url: &str) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest::new(
            Amount::new(dec!(25.00)).unwrap(),
            Pcr::new("order", "A1", "ref"),
        )
    }

    fn orchestrator(gateway: &Arc<InMemoryGateway>) -> ConsentOrchestrator {
        ConsentOrchestrator::new(
            gateway.clone(),
            Arc::new(NoopLauncher),
            PollConfig::new(3, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_state_events_follow_mutations() {
        let gateway = Arc::new(InMemoryGateway::new());
        let orchestrator = orchestrator(&gateway);
        let mut events = orchestrator.subscribe();

        orchestrator.start(FlowKind::Single, request()).await;

        let first = events.try_recv().unwrap();
        assert!(matches!(
            first,
            FlowEvent::StateChanged(FlowSnapshot {
                phase: FlowPhase::CreatingConsent,
                identity: None,
                error: None
            })
        ));
        let second = events.try_recv().unwrap();
        let FlowEvent::StateChanged(snapshot) = second else {
            panic!("expected a state change, got {second:?}");
        };
        assert_eq!(snapshot.phase, FlowPhase::AwaitingRedirect);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_rejected_while_verifying() {
        let gateway = Arc::new(InMemoryGateway::new());
        let orchestrator = orchestrator(&gateway);
        orchestrator.state.lock().await.phase = FlowPhase::Verifying;

        let outcome = orchestrator.start(FlowKind::Single, request()).await;

        assert_eq!(outcome, StartOutcome::Rejected);
        assert_eq!(gateway.create_calls().await, 0);
    }

    #[tokio::test]
    async fn test_stale_context_is_reported_internally() {
        let gateway = Arc::new(InMemoryGateway::new());
        let orchestrator = orchestrator(&gateway);
        let ctx = FlowContext {
            attempt: 42,
            identity: None,
            request: request(),
        };

        let result = orchestrator
            .guarded(&ctx, FlowPhase::Idle, |s| s.phase = FlowPhase::Error)
            .await;

        assert!(matches!(result, Err(FlowError::StaleContext)));
        assert_eq!(orchestrator.snapshot().await, FlowSnapshot::default());
    }

    #[tokio::test]
    async fn test_status_notice_suppressed_while_redirect_open() {
        let gateway = Arc::new(InMemoryGateway::new().with_auto_authorise());
        let orchestrator = orchestrator(&gateway);
        orchestrator.start(FlowKind::Single, request()).await;
        orchestrator.mark_redirect_open().await;
        let mut events = orchestrator.subscribe();

        orchestrator.resume_foreground().await;

        let messages: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                FlowEvent::UserMessage { message, .. } => Some(message),
                FlowEvent::StateChanged(_) => None,
            })
            .collect();
        assert_eq!(messages, vec![PAYMENT_COMPLETED.to_string()]);
    }
}
