//! Gateway access over HTTPS: bearer token handling, wire format, and the
//! [`HttpGateway`] implementation of the consent port.

mod client;
mod token;
mod wire;

pub use client::{
    ENDURING_CONSENTS_PATH, HttpGateway, PAYMENTS_PATH, QUICK_PAYMENTS_PATH,
    SINGLE_CONSENTS_PATH, TOKEN_PATH,
};
