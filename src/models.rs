use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Creation time assigned by the document store.
///
/// A freshly written document may be listed before the store has resolved its
/// server timestamp; that state is `Pending` and serialises as `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<DateTime<Utc>>", into = "Option<DateTime<Utc>>")]
pub enum Timestamp {
    #[default]
    Pending,
    Resolved(DateTime<Utc>),
}

impl Timestamp {
    pub fn resolved(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Pending => None,
            Timestamp::Resolved(at) => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Timestamp {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map(Timestamp::Resolved).unwrap_or(Timestamp::Pending)
    }
}

impl From<Timestamp> for Option<DateTime<Utc>> {
    fn from(value: Timestamp) -> Self {
        value.resolved()
    }
}

// Aliases keep documents written by the first (Portuguese) front-end readable.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PetKind {
    #[serde(rename = "lost", alias = "perdido")]
    Lost,
    #[serde(rename = "found", alias = "encontrado")]
    Found,
    #[serde(rename = "adoption", alias = "adocao")]
    Adoption,
    #[serde(rename = "abuse-report", alias = "denuncia")]
    AbuseReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PetStatus {
    #[serde(rename = "lost", alias = "perdido")]
    Lost,
    #[serde(rename = "found", alias = "encontrado")]
    Found,
    #[serde(rename = "available-for-adoption", alias = "para_adocao")]
    AvailableForAdoption,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum CampaignStatus {
    #[default]
    #[serde(rename = "active", alias = "ativa")]
    Active,
    #[serde(rename = "paused", alias = "pausada")]
    Paused,
    #[serde(rename = "closed", alias = "encerrada")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Pet,
    Campaign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewPet {
    #[serde(rename = "type")]
    pub kind: PetKind,
    pub status: PetStatus,
    pub name: String,
    pub species: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_label: Option<String>,
    pub location: String,
    /// Phone number or e-mail address.
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: String,
    #[serde(flatten)]
    pub details: NewPet,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub org_name: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix_key: Option<String>,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CampaignStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub org_name: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    #[serde(default)]
    pub amount_raised: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix_key: Option<String>,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub created_at: Timestamp,
}

impl Campaign {
    /// Share of the goal already raised, as a whole percentage capped at 100.
    pub fn progress_percent(&self) -> u8 {
        if !(self.goal.is_finite() && self.goal > 0.0) {
            return 0;
        }
        let pct = (self.amount_raised / self.goal * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Pet-shaped fields carried by a report filed instead of a pet record
/// (lost animals, abuse cases).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PetStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub target_type: TargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(flatten)]
    pub snapshot: ReportSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    #[serde(flatten)]
    pub details: NewReport,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {problem}")]
pub struct ValidationError {
    pub field: &'static str,
    pub problem: &'static str,
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError { field, problem: "is required" });
    }
    Ok(())
}

impl NewPet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("species", &self.species)?;
        require("location", &self.location)?;
        require("contact", &self.contact)?;
        require("description", &self.description)
    }
}

impl NewCampaign {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("orgName", &self.org_name)?;
        require("title", &self.title)?;
        require("description", &self.description)?;
        require("contact", &self.contact)?;
        if !(self.goal.is_finite() && self.goal > 0.0) {
            return Err(ValidationError { field: "goal", problem: "must be a positive amount" });
        }
        Ok(())
    }
}

impl NewReport {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("reason", &self.reason)?;
        if self.target_type == TargetType::Campaign {
            match self.target_id.as_deref() {
                Some(id) if !id.trim().is_empty() => {}
                _ => {
                    return Err(ValidationError {
                        field: "targetId",
                        problem: "is required for campaign reports",
                    })
                }
            }
        }
        Ok(())
    }
}

/// Blob storage folder an uploaded image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFolder {
    Pets,
    Campaigns,
}

impl ImageFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFolder::Pets => "pets",
            ImageFolder::Campaigns => "campaigns",
        }
    }
}

impl std::fmt::Display for ImageFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self {
            ImageFolder::Pets => "pet",
            ImageFolder::Campaigns => "campaign",
        };
        f.write_str(what)
    }
}

#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// MIME type recognised from the leading bytes, if any.
    pub fn sniffed_type(&self) -> Option<&'static str> {
        infer::get(&self.bytes).map(|t| t.mime_type())
    }

    pub fn content_type(&self) -> &'static str {
        self.sniffed_type().unwrap_or("application/octet-stream")
    }
}

/// Listing filter applied over an already fetched, recency-ordered pet list.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PetFilter {
    #[serde(rename = "type")]
    #[param(value_type = Option<String>)]
    pub kind: Option<PetKind>,
    #[param(value_type = Option<String>)]
    pub status: Option<PetStatus>,
    pub species: Option<String>,
    /// Free text matched against name, species, breed, location and description.
    pub q: Option<String>,
}

impl PetFilter {
    pub fn matches(&self, pet: &Pet) -> bool {
        let d = &pet.details;
        if self.kind.is_some_and(|k| k != d.kind) {
            return false;
        }
        if self.status.is_some_and(|s| s != d.status) {
            return false;
        }
        if let Some(species) = self.species.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !d.species.trim().eq_ignore_ascii_case(species) {
                return false;
            }
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            None => true,
            Some(q) => {
                let needle = q.to_lowercase();
                [
                    Some(d.name.as_str()),
                    Some(d.species.as_str()),
                    d.breed.as_deref(),
                    Some(d.location.as_str()),
                    Some(d.description.as_str()),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }

    pub fn apply(&self, pets: Vec<Pet>) -> Vec<Pet> {
        pets.into_iter().filter(|p| self.matches(p)).collect()
    }
}

fn default_true() -> bool {
    true
}
