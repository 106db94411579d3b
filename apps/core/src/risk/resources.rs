//! Support resources recommended alongside an assessment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::assessment::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    SelfHelp,
    Crisis,
    Professional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable identity used for de-duplication.
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Resource {
    fn new(id: &str, name: &str, description: &str, kind: ResourceKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            contact: None,
            url: None,
        }
    }

    fn contact(mut self, contact: &str) -> Self {
        self.contact = Some(contact.to_string());
        self
    }

    fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

/// Resources grouped by when they are offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCatalog {
    pub self_help: Vec<Resource>,
    pub crisis: Vec<Resource>,
    pub professional: Vec<Resource>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self {
            self_help: vec![
                Resource::new(
                    "guided-breathing",
                    "Guided breathing",
                    "A five-minute box breathing exercise to slow things down.",
                    ResourceKind::SelfHelp,
                ),
                Resource::new(
                    "reflective-journaling",
                    "Reflective journaling",
                    "Prompts for writing through what you are feeling.",
                    ResourceKind::SelfHelp,
                ),
                Resource::new(
                    "grounding-54321",
                    "5-4-3-2-1 grounding",
                    "Name five things you see, four you feel, three you hear, two you smell, one you taste.",
                    ResourceKind::SelfHelp,
                ),
            ],
            crisis: vec![
                Resource::new(
                    "988-lifeline",
                    "988 Suicide & Crisis Lifeline",
                    "Free, confidential support 24/7.",
                    ResourceKind::Crisis,
                )
                .contact("Call or text 988")
                .url("https://988lifeline.org"),
                Resource::new(
                    "crisis-text-line",
                    "Crisis Text Line",
                    "Text with a trained crisis counselor.",
                    ResourceKind::Crisis,
                )
                .contact("Text HOME to 741741")
                .url("https://www.crisistextline.org"),
                Resource::new(
                    "emergency-services",
                    "Emergency services",
                    "If you or someone else is in immediate danger.",
                    ResourceKind::Crisis,
                )
                .contact("Call 911 or your local emergency number"),
            ],
            professional: vec![
                Resource::new(
                    "samhsa-helpline",
                    "SAMHSA National Helpline",
                    "Treatment referral and information, 24/7.",
                    ResourceKind::Professional,
                )
                .contact("1-800-662-4357")
                .url("https://www.samhsa.gov/find-help/national-helpline"),
                Resource::new(
                    "therapist-directory",
                    "Find a therapist",
                    "Search licensed therapists near you.",
                    ResourceKind::Professional,
                )
                .url("https://www.psychologytoday.com/us/therapists"),
            ],
        }
    }
}

impl ResourceCatalog {
    /// Self-help always; crisis lines for HIGH and CRISIS; professional help when
    /// any concern was found. Each resource appears once.
    pub fn recommend(&self, level: RiskLevel, has_concerns: bool) -> Vec<Resource> {
        let mut groups: Vec<&[Resource]> = vec![self.self_help.as_slice()];
        if matches!(level, RiskLevel::High | RiskLevel::Crisis) {
            groups.push(self.crisis.as_slice());
        }
        if has_concerns {
            groups.push(self.professional.as_slice());
        }

        let mut seen = HashSet::new();
        groups
            .into_iter()
            .flatten()
            .filter(|r| seen.insert(r.id.clone()))
            .cloned()
            .collect()
    }
}
