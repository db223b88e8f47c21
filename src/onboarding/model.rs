//! Dealer, stage and agent data models.

use serde::{Deserialize, Deserializer, Serialize};

/// Kind of business the dealer runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Retail,
    Wholesale,
    Distributor,
    Franchise,
    #[default]
    Unset,
}

impl std::fmt::Display for BusinessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retail => write!(f, "retail"),
            Self::Wholesale => write!(f, "wholesale"),
            Self::Distributor => write!(f, "distributor"),
            Self::Franchise => write!(f, "franchise"),
            Self::Unset => write!(f, "unset"),
        }
    }
}

/// Form selects submit `""` when nothing is picked.
fn business_type_or_unset<'de, D>(deserializer: D) -> Result<BusinessType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("unset") => Ok(BusinessType::Unset),
        Some("retail") => Ok(BusinessType::Retail),
        Some("wholesale") => Ok(BusinessType::Wholesale),
        Some("distributor") => Ok(BusinessType::Distributor),
        Some("franchise") => Ok(BusinessType::Franchise),
        Some(other) => Err(serde::de::Error::unknown_variant(
            other,
            &["retail", "wholesale", "distributor", "franchise", ""],
        )),
    }
}

/// Contact details collected by the registration form.
///
/// Never persisted. Cleared back to `Default` on reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DealerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "business_type_or_unset")]
    pub business_type: BusinessType,
}

impl DealerInfo {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_business_type(mut self, business_type: BusinessType) -> Self {
        self.business_type = business_type;
        self
    }

    /// Required fields that are empty or whitespace-only, in form order.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Progress of a single onboarding stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl StageStatus {
    /// Forward transitions only. Reset bypasses this check.
    pub fn can_transition_to(&self, target: StageStatus) -> bool {
        use StageStatus::*;
        matches!((self, target), (Pending, InProgress) | (InProgress, Completed))
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// One step of the scripted sequence, bound to the agent that "runs" it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stage {
    pub id: String,
    pub title: String,
    pub agent_id: String,
    pub status: StageStatus,
    pub details: String,
}

impl Stage {
    pub fn new(id: &str, title: &str, agent_id: &str, details: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            agent_id: agent_id.to_string(),
            status: StageStatus::Pending,
            details: details.to_string(),
        }
    }
}

/// Display-only description of an onboarding agent.
///
/// `display_hint` is opaque to the core; frontends map it to an icon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub role: String,
    pub display_hint: String,
    pub description: String,
}

impl AgentProfile {
    pub fn new(id: &str, name: &str, role: &str, display_hint: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            display_hint: display_hint.to_string(),
            description: description.to_string(),
        }
    }
}

/// What an agent is doing right now, derived from its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentActivity {
    Idle,
    Active,
    Completed,
}

impl AgentActivity {
    /// Agents without a matching stage stay idle.
    pub fn derive(agent_id: &str, stages: &[Stage]) -> Self {
        match stages.iter().find(|s| s.agent_id == agent_id).map(|s| s.status) {
            Some(StageStatus::InProgress) => Self::Active,
            Some(StageStatus::Completed) => Self::Completed,
            Some(StageStatus::Pending) | None => Self::Idle,
        }
    }
}

/// Agent profile paired with its derived activity, for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentView {
    #[serde(flatten)]
    pub profile: AgentProfile,
    pub activity: AgentActivity,
}

/// The five scripted stages, in order.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(
            "1",
            "Welcome & Information Collection",
            "welcome",
            "Collecting dealer information...",
        ),
        Stage::new(
            "2",
            "Document Verification",
            "verification",
            "Verifying business licenses and tax documents...",
        ),
        Stage::new(
            "3",
            "Product Training",
            "training",
            "Providing product catalogs and training materials...",
        ),
        Stage::new(
            "4",
            "System Setup",
            "setup",
            "Setting up dealer portal and payment systems...",
        ),
        Stage::new(
            "5",
            "Final Review & Activation",
            "completion",
            "Reviewing all information and activating account...",
        ),
    ]
}

pub fn default_agents() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "welcome",
            "Welcome Agent",
            "Initial Contact",
            "users",
            "Greets new dealers and collects basic information",
        ),
        AgentProfile::new(
            "verification",
            "Verification Agent",
            "Document Verification",
            "file-text",
            "Verifies business licenses, tax IDs, and legal documents",
        ),
        AgentProfile::new(
            "training",
            "Training Agent",
            "Product Training",
            "message-square",
            "Provides product catalogs, pricing, and training materials",
        ),
        AgentProfile::new(
            "setup",
            "Setup Agent",
            "System Setup",
            "building",
            "Sets up dealer portal access, payment systems, and inventory tools",
        ),
        AgentProfile::new(
            "completion",
            "Completion Agent",
            "Final Review",
            "check-circle",
            "Conducts final review and activates dealer account",
        ),
    ]
}
