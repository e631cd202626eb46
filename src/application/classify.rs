//! Maps technical error text onto a small set of user-facing categories.
//!
//! Rules are evaluated top to bottom and the first match wins. New
//! categories go into [`RULES`]; call sites only ever see [`user_message`].

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Launch,
    Network,
    Consent,
    Verification,
    Generic,
}

impl ErrorCategory {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Launch => "We couldn't open the payment page. Please try again.",
            Self::Network => {
                "We couldn't reach the payment service. Check your connection and try again."
            }
            Self::Consent => "The payment was declined or could not be authorised.",
            Self::Verification => {
                "We couldn't confirm your payment. Please check with your bank before trying again."
            }
            Self::Generic => "Something went wrong with your payment. Please try again.",
        }
    }
}

type Rule = (fn(&str) -> bool, ErrorCategory);

const RULES: &[Rule] = &[
    (is_launch, ErrorCategory::Launch),
    (is_network, ErrorCategory::Network),
    (is_consent, ErrorCategory::Consent),
    (is_verification, ErrorCategory::Verification),
];

fn is_launch(text: &str) -> bool {
    contains_any(text, &["launch", "redirect page", "browser"])
}

fn is_network(text: &str) -> bool {
    contains_any(
        text,
        &["network", "connection", "dns", "error sending request"],
    )
}

fn is_consent(text: &str) -> bool {
    contains_any(
        text,
        &[
            "consent",
            "auth",
            "token",
            "declined",
            "access_denied",
            "cancel",
            "rejected",
            "revoked",
        ],
    )
}

fn is_verification(text: &str) -> bool {
    contains_any(
        text,
        &["verif", "timeout", "timed out", "did not complete", "status"],
    )
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

pub fn categorize(raw: &str) -> ErrorCategory {
    let text = raw.to_lowercase();
    RULES
        .iter()
        .find(|(matches, _)| matches(&text))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Generic)
}

/// The sanitized message to show for `err`.
pub fn user_message(err: &impl Display) -> &'static str {
    categorize(&err.to_string()).user_message()
}
