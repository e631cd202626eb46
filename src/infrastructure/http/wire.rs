//! JSON bodies exchanged with the gateway.
//!
//! Outbound PCR values are always truncated here, so nothing upstream has to
//! remember the gateway's field limit.

use crate::domain::payment::{Amount, CURRENCY, PaymentRequest, Pcr};
use crate::domain::status::{
    ConsentDocument, ConsentStatus, CreatedConsent, PaymentRecord, PaymentStatus,
};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

pub(crate) const ENDURING_PERIOD: &str = "fortnightly";

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct WirePcr {
    pub particulars: String,
    pub code: String,
    pub reference: String,
}

impl From<&Pcr> for WirePcr {
    fn from(pcr: &Pcr) -> Self {
        let pcr = pcr.truncated();
        Self {
            particulars: pcr.particulars,
            code: pcr.code,
            reference: pcr.reference,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct WireAmount {
    pub total: String,
    pub currency: &'static str,
}

impl From<Amount> for WireAmount {
    fn from(amount: Amount) -> Self {
        Self {
            total: amount.to_wire(),
            currency: CURRENCY,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FlowDetail<'a> {
    #[serde(rename = "type")]
    pub flow_type: &'static str,
    pub redirect_uri: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct AuthFlow<'a> {
    pub detail: FlowDetail<'a>,
}

impl<'a> AuthFlow<'a> {
    pub fn gateway(redirect_uri: &'a str) -> Self {
        Self {
            detail: FlowDetail {
                flow_type: "gateway",
                redirect_uri,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EnduringTerms {
    pub maximum_amount_period: WireAmount,
    pub period: &'static str,
    pub from_timestamp: String,
    pub maximum_amount_payment: WireAmount,
}

impl EnduringTerms {
    pub fn new(request: &PaymentRequest, from: DateTime<FixedOffset>) -> Self {
        Self {
            maximum_amount_period: request.maximum_amount().into(),
            period: ENDURING_PERIOD,
            from_timestamp: format_timestamp(from),
            maximum_amount_payment: request.maximum_amount().into(),
        }
    }
}

/// Body for single, enduring and quick-payment consent creation.
#[derive(Debug, Serialize)]
pub(crate) struct ConsentRequest<'a> {
    pub flow: AuthFlow<'a>,
    pub pcr: WirePcr,
    pub amount: WireAmount,
    #[serde(flatten)]
    pub enduring: Option<EnduringTerms>,
}

impl<'a> ConsentRequest<'a> {
    pub fn single(redirect_uri: &'a str, request: &PaymentRequest) -> Self {
        Self {
            flow: AuthFlow::gateway(redirect_uri),
            pcr: (&request.pcr).into(),
            amount: request.amount.into(),
            enduring: None,
        }
    }

    pub fn enduring(
        redirect_uri: &'a str,
        request: &PaymentRequest,
        from: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            enduring: Some(EnduringTerms::new(request, from)),
            ..Self::single(redirect_uri, request)
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsentCreatedResponse {
    #[serde(alias = "quick_payment_id")]
    pub consent_id: Option<String>,
    pub redirect_uri: Option<String>,
}

impl ConsentCreatedResponse {
    pub fn validate(self) -> GatewayResult<CreatedConsent> {
        let consent_id = non_empty(self.consent_id).ok_or(GatewayError::MissingField {
            field: "consent_id",
        })?;
        let redirect_url = non_empty(self.redirect_uri).ok_or(GatewayError::MissingField {
            field: "redirect_uri",
        })?;
        Ok(CreatedConsent {
            consent_id,
            redirect_url,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentEntry {
    #[serde(alias = "id")]
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsentResponse {
    pub consent_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub payments: Vec<PaymentEntry>,
}

impl ConsentResponse {
    pub fn into_document(self, requested_id: &str) -> ConsentDocument {
        ConsentDocument {
            consent_id: self
                .consent_id
                .unwrap_or_else(|| requested_id.to_string()),
            status: ConsentStatus::parse(&self.status),
            payments: self
                .payments
                .into_iter()
                .map(|entry| PaymentRecord {
                    payment_id: entry.payment_id,
                    status: PaymentStatus::parse(&entry.status),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuickPaymentResponse {
    pub consent: ConsentResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaymentBody<'a> {
    pub consent_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr: Option<WirePcr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<WireAmount>,
}

impl<'a> PaymentBody<'a> {
    pub fn new(consent_id: &'a str, draw_down: Option<&PaymentRequest>) -> Self {
        Self {
            consent_id,
            pcr: draw_down.map(|request| (&request.pcr).into()),
            amount: draw_down.map(|request| request.amount.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentCreatedResponse {
    pub payment_id: Option<String>,
}

impl PaymentCreatedResponse {
    pub fn validate(self) -> GatewayResult<String> {
        non_empty(self.payment_id).ok_or(GatewayError::MissingField {
            field: "payment_id",
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// ISO-8601 with milliseconds and a numeric offset, e.g. `2024-05-01T09:30:00.000+12:00`.
pub(crate) fn format_timestamp(at: DateTime<FixedOffset>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
}

pub(crate) fn merchant_now(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}
