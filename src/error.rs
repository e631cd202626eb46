use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to the payment gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication failed: {message}")]
    Auth { message: String },
    #[error("token request timed out after {0:?}")]
    AuthTimeout(Duration),
    #[error("network error: {message}")]
    Network { message: String },
    #[error("gateway returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("invalid gateway response: {message}")]
    InvalidResponse { message: String },
    #[error("gateway response missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Errors produced by the consent flow itself.
///
/// The `Display` text is technical and is only ever logged. Users see the
/// message chosen by [`crate::application::classify`].
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("consent creation failed: {0}")]
    ConsentCreation(#[source] GatewayError),
    #[error("could not verify payment status for {consent_id}: {source}")]
    Verification {
        consent_id: String,
        #[source]
        source: GatewayError,
    },
    #[error("consent {consent_id} was not authorised: {status}")]
    ConsentNotAuthorised { consent_id: String, status: String },
    #[error("authorisation declined: {error} {description}")]
    AuthorisationDeclined { error: String, description: String },
    #[error("unexpected gateway state '{0}'")]
    UnexpectedState(String),
    #[error("payment creation failed: {0}")]
    PaymentCreation(#[source] GatewayError),
    #[error("payment {payment_id} was rejected by the bank")]
    PaymentRejected { payment_id: String },
    #[error("payment {payment_id} did not complete after {attempts} status checks")]
    CompletionTimeout { payment_id: String, attempts: u32 },
    #[error("failed to launch redirect page: {0}")]
    Launch(String),
    #[error("stale flow context")]
    StaleContext,
    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
