use crate::domain::ports::RedirectLauncher;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

/// Shows the authorisation URL by writing it to a terminal or any writer.
pub struct ConsoleLauncher<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleLauncher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl<W: Write + Send> RedirectLauncher for ConsoleLauncher<W> {
    async fn launch(&self, url: &str) -> Result<(), String> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| "console output unavailable".to_string())?;
        writeln!(out, "Open this link to authorise the payment:\n{url}")
            .and_then(|()| out.flush())
            .map_err(|e| e.to_string())
    }
}
