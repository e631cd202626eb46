use std::fmt;

/// Consent status as reported by the gateway.
///
/// Parsed from the wire string at the gateway boundary. Anything the gateway
/// sends that is not listed here lands in [`ConsentStatus::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentStatus {
    Authorised,
    AwaitingAuthorisation,
    GatewayAwaitingSubmission,
    Rejected,
    Revoked,
    GatewayTimeout,
    Unknown(String),
}

impl ConsentStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "Authorised" => Self::Authorised,
            "AwaitingAuthorisation" => Self::AwaitingAuthorisation,
            "GatewayAwaitingSubmission" => Self::GatewayAwaitingSubmission,
            "Rejected" => Self::Rejected,
            "Revoked" => Self::Revoked,
            "GatewayTimeout" => Self::GatewayTimeout,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Rejected | Self::Revoked | Self::GatewayTimeout)
    }

    /// Still waiting on the payer or the gateway; may become authorised.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::AwaitingAuthorisation | Self::GatewayAwaitingSubmission
        )
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authorised => "Authorised",
            Self::AwaitingAuthorisation => "AwaitingAuthorisation",
            Self::GatewayAwaitingSubmission => "GatewayAwaitingSubmission",
            Self::Rejected => "Rejected",
            Self::Revoked => "Revoked",
            Self::GatewayTimeout => "GatewayTimeout",
            Self::Unknown(other) => other,
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    AcceptedSettlementInProcess,
    AcceptedSettlementCompleted,
    Rejected,
    Unknown(String),
}

impl PaymentStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "AcceptedSettlementInProcess" => Self::AcceptedSettlementInProcess,
            "AcceptedSettlementCompleted" => Self::AcceptedSettlementCompleted,
            "Rejected" => Self::Rejected,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::AcceptedSettlementCompleted)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::AcceptedSettlementInProcess => "AcceptedSettlementInProcess",
            Self::AcceptedSettlementCompleted => "AcceptedSettlementCompleted",
            Self::Rejected => "Rejected",
            Self::Unknown(other) => other,
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub status: PaymentStatus,
}

/// A consent as read back from the gateway, with the payments drawn against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentDocument {
    pub consent_id: String,
    pub status: ConsentStatus,
    pub payments: Vec<PaymentRecord>,
}

impl ConsentDocument {
    pub fn find_payment(&self, payment_id: &str) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| p.payment_id == payment_id)
    }
}

/// What the gateway hands back when a consent is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedConsent {
    pub consent_id: String,
    pub redirect_url: String,
}
