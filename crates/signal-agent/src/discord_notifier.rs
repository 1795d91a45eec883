use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use signal_core::{Alert, CycleRecord, Severity};

/// Best-effort webhook delivery of WARNING and CRITICAL alerts.
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    pub async fn send_message(&self, content: &str) -> Result<()> {
        if !self.is_configured() {
            tracing::debug!("Discord webhook not configured, skipping notification");
            return Ok(());
        }

        let payload = json!({
            "content": content,
            "username": "Gold Signal Agent",
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!("Discord notification sent");
        Ok(())
    }

    /// Post the cycle's notable alerts, if any. Never fails the caller.
    pub async fn notify_cycle(&self, record: &CycleRecord) {
        let Some(message) = format_alerts(record) else {
            return;
        };
        if let Err(e) = self.send_message(&message).await {
            tracing::warn!("Discord notification for cycle {} failed: {}", record.cycle_id, e);
        }
    }
}

fn notable(alert: &Alert) -> bool {
    alert.severity >= Severity::Warning
}

/// Render WARNING+ alerts of a cycle, or `None` when there are none.
pub fn format_alerts(record: &CycleRecord) -> Option<String> {
    let lines: Vec<String> = record
        .alerts
        .iter()
        .filter(|a| notable(a))
        .map(|a| format!("- **{:?}** {:?}: {}", a.severity, a.kind, a.message))
        .collect();
    if lines.is_empty() {
        return None;
    }

    let decision = record
        .recommendation
        .as_ref()
        .map(|r| format!("{} ({:.0}% confidence)", r.decision.as_str(), r.confidence * 100.0))
        .unwrap_or_else(|| "no decision".to_string());

    Some(format!(
        "**Cycle #{}** | {:?} | {}\n{}",
        record.cycle_id,
        record.status,
        decision,
        lines.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use signal_core::{AlertKind, CycleTrigger, PendingCycle};

    #[test]
    fn test_info_alerts_are_not_sent() {
        let now = Utc::now();
        let mut pending = PendingCycle::start(7, now, CycleTrigger::Scheduled);
        pending
            .alerts
            .push(Alert::new(AlertKind::Sentiment, Severity::Info, "POSITIVE SENTIMENT", now));
        assert!(format_alerts(&pending.clone().finalize()).is_none());

        pending
            .alerts
            .push(Alert::new(AlertKind::DataQuality, Severity::Critical, "Degraded inputs", now));
        let message = format_alerts(&pending.finalize()).unwrap();
        assert!(message.contains("Cycle #7"));
        assert!(message.contains("Degraded inputs"));
        assert!(!message.contains("POSITIVE SENTIMENT"));
    }

    #[tokio::test]
    async fn test_unconfigured_webhook_is_noop() {
        let notifier = DiscordNotifier::new(String::new());
        assert!(notifier.send_message("hello").await.is_ok());
    }
}
