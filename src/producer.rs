//! JSON alert sink

use crate::types::alert::Alert;
use anyhow::{Context, Result};
use std::io::Write;
use tracing::debug;

/// Writes alerts as JSON lines to any writer (file, stdout, buffer).
pub struct AlertProducer<W: Write> {
    writer: W,
    published: u64,
}

impl<W: Write> AlertProducer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            published: 0,
        }
    }

    /// Publish a single alert
    pub fn publish(&mut self, alert: &Alert) -> Result<()> {
        serde_json::to_writer(&mut self.writer, alert)?;
        self.writer.write_all(b"\n")?;
        self.published += 1;

        debug!(
            alert_id = %alert.alert_id,
            client_id = alert.client_id,
            error = alert.error,
            reason = %alert.reason,
            "Published alert"
        );

        Ok(())
    }

    /// Publish alerts in order and flush. Stops at the first failed write;
    /// alerts after it are not written.
    pub fn publish_batch(&mut self, alerts: &[Alert]) -> Result<()> {
        for alert in alerts {
            self.publish(alert)
                .with_context(|| format!("Failed to publish alert {}", alert.alert_id))?;
        }
        self.writer.flush().context("Failed to flush alert sink")?;
        Ok(())
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
