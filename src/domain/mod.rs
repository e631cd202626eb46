//! Domain types for the consent flow and the ports it talks through.

pub mod flow;
pub mod payment;
pub mod ports;
pub mod status;
