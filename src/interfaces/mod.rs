//! Adapters between the outside world and the orchestrator: return-URL
//! parsing for deep links and a console redirect launcher.

pub mod console;
pub mod deep_link;
