//! Maps a tap count to an emergency class.
//!
//! The mapping is a table of [`GestureRule`] rows; adding a category means
//! adding a row, not touching dispatch.

use thiserror::Error;

use crate::config::ServiceCodes;
use crate::model::{Contact, EmergencyCategory, dedup_recipients};
use crate::platform::MediaKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Zero taps, or a count no rule covers.
    #[error("no gesture to classify")]
    NoGesture,

    /// The category needs the contact list and it is empty.
    #[error("no emergency contacts configured")]
    NoContactsConfigured,
}

/// Inclusive tap range of a rule; `max: None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl TapRange {
    pub const fn exactly(taps: u32) -> Self {
        Self {
            min: taps,
            max: Some(taps),
        }
    }

    pub const fn at_least(taps: u32) -> Self {
        Self {
            min: taps,
            max: None,
        }
    }

    pub fn contains(&self, taps: u32) -> bool {
        taps >= self.min && self.max.is_none_or(|max| taps <= max)
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct GestureRule {
    pub taps: TapRange,
    pub category: EmergencyCategory,
    /// Fixed service numbers, in order.
    pub services: Vec<String>,
    /// Whether the stored contacts are recipients too.
    pub include_contacts: bool,
    pub auto_dial: Option<String>,
    pub requires_confirmation: bool,
    pub evidence: MediaKind,
}

/// A classified, dispatchable emergency.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyClass {
    pub category: EmergencyCategory,
    pub recipients: Vec<String>,
    pub auto_dial: Option<String>,
    pub requires_confirmation: bool,
    /// Triggered by a paired wearable rather than the screen.
    pub from_device: bool,
    pub evidence: MediaKind,
}

impl EmergencyClass {
    pub fn title(&self) -> &'static str {
        self.category.title()
    }

    /// Whether someone is looking at the screen and can be asked or told.
    pub fn is_interactive(&self) -> bool {
        !self.from_device
    }

    /// Confirmation is only ever asked interactively.
    pub fn needs_confirmation(&self) -> bool {
        self.requires_confirmation && self.is_interactive()
    }
}

#[derive(Debug, Clone)]
pub struct GestureClassifier {
    rules: Vec<GestureRule>,
}

impl GestureClassifier {
    /// Classifier over a custom table. The first matching row wins.
    pub fn new(rules: Vec<GestureRule>) -> Self {
        Self { rules }
    }

    /// The standard table: police, ambulance, family, critical.
    pub fn standard(codes: &ServiceCodes) -> Self {
        Self::new(vec![
            GestureRule {
                taps: TapRange::exactly(1),
                category: EmergencyCategory::Police,
                services: vec![codes.police.clone()],
                include_contacts: false,
                auto_dial: Some(codes.police.clone()),
                requires_confirmation: false,
                evidence: MediaKind::Video,
            },
            GestureRule {
                taps: TapRange::exactly(2),
                category: EmergencyCategory::Medical,
                services: vec![codes.ambulance.clone()],
                include_contacts: false,
                auto_dial: Some(codes.ambulance.clone()),
                requires_confirmation: false,
                evidence: MediaKind::Video,
            },
            GestureRule {
                taps: TapRange::exactly(3),
                category: EmergencyCategory::Family,
                services: Vec::new(),
                include_contacts: true,
                auto_dial: None,
                requires_confirmation: true,
                evidence: MediaKind::Video,
            },
            GestureRule {
                taps: TapRange::at_least(4),
                category: EmergencyCategory::Critical,
                services: vec![codes.ambulance.clone()],
                include_contacts: true,
                auto_dial: Some(codes.ambulance.clone()),
                requires_confirmation: false,
                evidence: MediaKind::Image,
            },
        ])
    }

    pub fn rules(&self) -> &[GestureRule] {
        &self.rules
    }

    pub fn classify(
        &self,
        taps: u32,
        from_device: bool,
        contacts: &[Contact],
    ) -> Result<EmergencyClass, ClassifyError> {
        if taps == 0 {
            return Err(ClassifyError::NoGesture);
        }
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.taps.contains(taps))
            .ok_or(ClassifyError::NoGesture)?;

        // A rule that reaches only contacts is useless without any.
        if rule.include_contacts && rule.services.is_empty() && contacts.is_empty() {
            return Err(ClassifyError::NoContactsConfigured);
        }

        let contact_numbers = contacts
            .iter()
            .filter(|_| rule.include_contacts)
            .map(|c| c.phone.clone());
        let recipients = dedup_recipients(rule.services.iter().cloned().chain(contact_numbers));

        Ok(EmergencyClass {
            category: rule.category,
            recipients,
            auto_dial: rule.auto_dial.clone(),
            requires_confirmation: rule.requires_confirmation,
            from_device,
            evidence: rule.evidence,
        })
    }
}
