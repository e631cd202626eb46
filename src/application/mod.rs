//! Application layer containing the consent flow orchestration.
//!
//! `ConsentOrchestrator` is the entry point: it owns the flow state and drives
//! the gateway through consent creation, redirect, verification and payment.
//! `CompletionPoller` does the bounded status polling for it.

pub mod classify;
pub mod orchestrator;
pub mod poller;
