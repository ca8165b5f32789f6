use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChallengeId, FlagId, FlagType, ServiceId};

/// One challenge as served by the platform's challenge listing, with its
/// owned services and flags nested inline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub id: ChallengeId,
    pub services: Vec<ServiceRecord>,
    pub flags: Vec<FlagRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub category: String,
    pub name: String,
    /// Activation window, advisory only; enforcement happens upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagRecord {
    pub id: FlagId,
    pub flag_type: FlagType,
    pub display_name: String,
    pub category: String,
    pub points: i32,
    /// Human-readable description of a prior accepted submission
    /// ("Submitted on <timestamp>"); absent while unsubmitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_details: Option<String>,
}

/// Body of a flag submission POST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFlagRequest {
    pub flag: String,
}
