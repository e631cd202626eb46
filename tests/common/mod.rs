#![allow(dead_code)]

use async_trait::async_trait;
use consentpay::application::orchestrator::ConsentOrchestrator;
use consentpay::config::PollConfig;
use consentpay::domain::flow::{FlowEvent, FlowSnapshot};
use consentpay::domain::payment::{Amount, PaymentRequest, Pcr};
use consentpay::domain::ports::RedirectLauncher;
use consentpay::infrastructure::in_memory::InMemoryGateway;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub fn request() -> PaymentRequest {
    request_of(dec!(10.00))
}

pub fn request_of(amount: Decimal) -> PaymentRequest {
    PaymentRequest::new(
        Amount::new(amount).unwrap(),
        Pcr::new("particulars", "code", "reference"),
    )
}

/// Remembers every URL it was asked to open.
#[derive(Default)]
pub struct RecordingLauncher {
    urls: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingLauncher {
    pub fn failing(reason: &str) -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            failure: Some(reason.to_string()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RedirectLauncher for RecordingLauncher {
    async fn launch(&self, url: &str) -> Result<(), String> {
        self.urls.lock().unwrap().push(url.to_string());
        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

pub const FAST_POLL: PollConfig = PollConfig {
    max_attempts: 5,
    interval: Duration::from_millis(10),
};

pub fn orchestrator(
    gateway: &Arc<InMemoryGateway>,
    launcher: &Arc<RecordingLauncher>,
) -> ConsentOrchestrator {
    ConsentOrchestrator::new(gateway.clone(), launcher.clone(), FAST_POLL)
}

/// Drains whatever is queued on the receiver right now.
pub fn drain(events: &mut broadcast::Receiver<FlowEvent>) -> Vec<FlowEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

pub fn snapshots(events: &[FlowEvent]) -> Vec<FlowSnapshot> {
    events
        .iter()
        .filter_map(|event| match event {
            FlowEvent::StateChanged(snapshot) => Some(snapshot.clone()),
            FlowEvent::UserMessage { .. } => None,
        })
        .collect()
}

pub fn messages(events: &[FlowEvent]) -> Vec<(bool, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            FlowEvent::UserMessage { success, message } => Some((*success, message.clone())),
            FlowEvent::StateChanged(_) => None,
        })
        .collect()
}
