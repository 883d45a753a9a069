//! Sends a classified emergency through every channel that might work.
//!
//! Steps run in order and each one is allowed to fail on its own: confirm
//! (interactive only), submit to the remote store (online only), hand off one
//! batched SMS compose, then dial. Only a human decline stops the sequence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::classify::EmergencyClass;
use super::location::{Freshness, ResolvedLocation};
use crate::client::RemoteStore;
use crate::config::DEFAULT_SUBMIT_TIMEOUT;
use crate::model::{AlertRecord, UNKNOWN_LOCATION_PHRASE, is_sms_capable, map_link};
use crate::platform::{Connectivity, Dialer, Prompter, SmsCompose, SmsComposer};

/// Place text used when no place name is known.
pub const UNKNOWN_PLACE: &str = "an unknown place";

/// Result of the remote submission step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Stored { id: i64 },
    /// Offline; no request was attempted.
    Skipped,
    Failed(String),
}

/// Result of the SMS compose step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsHandoff {
    Composed { recipients: Vec<String> },
    /// No recipient can receive an SMS (only service codes).
    NoEligibleRecipients,
    Failed(String),
}

/// Result of the dial step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialHandoff {
    Dialed { number: String },
    NotRequested,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The human declined; nothing was sent.
    Declined,
    Dispatched {
        message: String,
        submission: Submission,
        sms: SmsHandoff,
        dial: DialHandoff,
    },
}

impl DispatchOutcome {
    /// Whether at least one channel was handed the alert.
    pub fn reached_anyone(&self) -> bool {
        match self {
            DispatchOutcome::Declined => false,
            DispatchOutcome::Dispatched {
                submission,
                sms,
                dial,
                ..
            } => {
                matches!(submission, Submission::Stored { .. })
                    || matches!(sms, SmsHandoff::Composed { .. })
                    || matches!(dial, DialHandoff::Dialed { .. })
            }
        }
    }
}

/// Human-readable alert text. Never presents the sentinel as a coordinate.
pub fn compose_message(title: &str, location: &ResolvedLocation) -> String {
    let place = location.place.as_deref().unwrap_or(UNKNOWN_PLACE);
    let link = if location.is_unknown() {
        None
    } else {
        map_link(location.sample.point())
    };

    match (link, location.freshness) {
        (Some(link), Freshness::Stale { age }) => format!(
            "SOS ALERT! {title}. I need help. I am at {place}. \
             Location (last known, {} min ago): {link}",
            age.num_minutes().max(0)
        ),
        (Some(link), _) => {
            format!("SOS ALERT! {title}. I need help. I am at {place}. Location: {link}")
        }
        (None, _) => format!("SOS ALERT! {title}. I need help. {UNKNOWN_LOCATION_PHRASE}."),
    }
}

/// Collaborators the dispatcher hands the alert to.
#[derive(Clone)]
pub struct DispatchChannels {
    pub store: Arc<dyn RemoteStore>,
    pub connectivity: Arc<dyn Connectivity>,
    pub sms: Arc<dyn SmsComposer>,
    pub dialer: Arc<dyn Dialer>,
    pub prompter: Arc<dyn Prompter>,
}

#[derive(Clone)]
pub struct AlertDispatcher {
    channels: DispatchChannels,
    dial_delay: Duration,
    submit_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(channels: DispatchChannels, dial_delay: Duration) -> Self {
        Self {
            channels,
            dial_delay,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    /// Longest wait for the remote store before moving on to SMS.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Ask the human to confirm when the class needs it. `true` otherwise.
    pub async fn confirm(&self, class: &EmergencyClass) -> bool {
        if !class.needs_confirmation() {
            return true;
        }
        let question = format!("{}\n\nAre you sure you want to send an SOS?", class.title());
        let confirmed = self.channels.prompter.confirm(&question).await;
        if !confirmed {
            info!(category = class.category.as_str(), "SOS declined by user");
        }
        confirmed
    }

    /// Confirm if needed, then send through every channel.
    pub async fn dispatch(
        &self,
        class: &EmergencyClass,
        location: &ResolvedLocation,
    ) -> DispatchOutcome {
        if !self.confirm(class).await {
            return DispatchOutcome::Declined;
        }
        self.dispatch_confirmed(class, location).await
    }

    /// Send through every channel; confirmation already happened.
    #[instrument(
        skip_all,
        fields(category = class.category.as_str(), from_device = class.from_device)
    )]
    pub async fn dispatch_confirmed(
        &self,
        class: &EmergencyClass,
        location: &ResolvedLocation,
    ) -> DispatchOutcome {
        let message = compose_message(class.title(), location);
        let interactive = class.is_interactive();

        let submission = self.submit(class, location, &message).await;
        if interactive {
            match &submission {
                Submission::Stored { .. } => self
                    .channels
                    .prompter
                    .notify(&format!("SOS sent to server: {}", class.title())),
                Submission::Skipped | Submission::Failed(_) => self
                    .channels
                    .prompter
                    .notify("Server unreachable, sending SOS by SMS"),
            }
        }

        let sms = self.hand_off_sms(class, &message).await;
        let dial = self.hand_off_dial(class).await;

        info!(
            submission = ?submission,
            sms_composed = matches!(sms, SmsHandoff::Composed { .. }),
            dialed = matches!(dial, DialHandoff::Dialed { .. }),
            "Alert dispatched"
        );

        DispatchOutcome::Dispatched {
            message,
            submission,
            sms,
            dial,
        }
    }

    async fn submit(
        &self,
        class: &EmergencyClass,
        location: &ResolvedLocation,
        message: &str,
    ) -> Submission {
        if !self.channels.connectivity.is_online() {
            info!("Offline, skipping remote submission");
            return Submission::Skipped;
        }

        let record = AlertRecord {
            category: class.category,
            message: message.to_string(),
            recipients: class.recipients.clone(),
            location: location.sample.point(),
            created_at: Utc::now(),
            media: None,
        };

        let attempt =
            tokio::time::timeout(self.submit_timeout, self.channels.store.submit_alert(&record))
                .await;
        match attempt {
            Ok(Ok(ack)) => Submission::Stored { id: ack.id },
            Ok(Err(e)) => {
                warn!(error = %e, "Alert submission failed, falling back to SMS");
                Submission::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.submit_timeout.as_millis() as u64,
                    "Alert submission timed out, falling back to SMS"
                );
                Submission::Failed("remote store timed out".to_string())
            }
        }
    }

    async fn hand_off_sms(&self, class: &EmergencyClass, message: &str) -> SmsHandoff {
        let recipients: Vec<String> = class
            .recipients
            .iter()
            .filter(|n| is_sms_capable(n))
            .cloned()
            .collect();
        if recipients.is_empty() {
            return SmsHandoff::NoEligibleRecipients;
        }

        let compose = SmsCompose {
            recipients,
            body: message.to_string(),
        };
        match self.channels.sms.compose(&compose).await {
            Ok(()) => SmsHandoff::Composed {
                recipients: compose.recipients,
            },
            Err(e) => {
                warn!(error = %e, "SMS compose handoff failed");
                SmsHandoff::Failed(e.to_string())
            }
        }
    }

    async fn hand_off_dial(&self, class: &EmergencyClass) -> DialHandoff {
        let Some(number) = &class.auto_dial else {
            return DialHandoff::NotRequested;
        };

        // Keep the compose view visible for a moment before the dialer covers it.
        tokio::time::sleep(self.dial_delay).await;

        match self.channels.dialer.dial(number).await {
            Ok(()) => DialHandoff::Dialed {
                number: number.clone(),
            },
            Err(e) => {
                warn!(error = %e, "Dial handoff failed");
                DialHandoff::Failed(e.to_string())
            }
        }
    }
}
