use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use shared::{
    domain::FlagId,
    protocol::{ChallengeRecord, SubmitFlagRequest},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use url::Url;

pub mod aggregate;
pub mod config;
pub mod notifications;

pub use aggregate::{points_label, CategoryView};
pub use config::{load_config, PlatformConfig};
pub use notifications::{Notification, NotificationId, NotificationKind, Severity};

use aggregate::CategoryViewCache;
use notifications::NotificationQueue;

/// Header carrying the caller's platform identity token.
const AUTH_HEADER: &str = "x-scp-auth";

/// Where the raw challenge listing comes from. The hosting page owns
/// authentication; the core only forwards the token it was handed.
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    async fn fetch_challenges(&self, auth_token: &str) -> Result<Vec<ChallengeRecord>>;
}

pub struct MissingChallengeSource;

#[async_trait]
impl ChallengeSource for MissingChallengeSource {
    async fn fetch_challenges(&self, _auth_token: &str) -> Result<Vec<ChallengeRecord>> {
        Err(anyhow!("challenge source is unavailable"))
    }
}

/// Fetches the challenge listing from the platform router.
pub struct HttpChallengeSource {
    http: Client,
    endpoint: Url,
}

impl HttpChallengeSource {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.challenges_endpoint())
            .with_context(|| format!("invalid challenges endpoint for router {}", config.router_url))?;
        Ok(Self {
            http: Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl ChallengeSource for HttpChallengeSource {
    async fn fetch_challenges(&self, auth_token: &str) -> Result<Vec<ChallengeRecord>> {
        let challenges: Vec<ChallengeRecord> = self
            .http
            .get(self.endpoint.clone())
            .header(AUTH_HEADER, auth_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(challenges)
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ChallengesRefreshed {
        challenge_count: usize,
        flag_count: usize,
    },
    SubmissionAccepted {
        flag_id: FlagId,
        submitted_at: DateTime<Utc>,
    },
    SubmissionRejected {
        flag_id: FlagId,
    },
    SubmissionFailed {
        flag_id: FlagId,
        reason: String,
    },
    Error(String),
}

/// How a single submission attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Scoring accepted the flag (202). Terminal for the flag.
    Accepted,
    /// Scoring rejected the candidate value (400). The user may retry.
    RejectedInvalid,
    /// Any other status, or a transport-level failure. The user may retry.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Unsubmitted,
    Editing,
    Submitting,
    Submitted,
}

/// Caller-contract violations of the submission state machine. Outcomes of a
/// request that was actually issued are [`SubmissionOutcome`]s, not errors.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no flag with id {flag_id} is loaded")]
    UnknownFlag { flag_id: String },
    #[error("flag {flag_id} has already been submitted")]
    AlreadySubmitted { flag_id: String },
    #[error("a submission for flag {flag_id} is already in flight")]
    AlreadyInFlight { flag_id: String },
    #[error("no candidate value supplied for flag {flag_id}")]
    EmptyCandidate { flag_id: String },
}

/// Per-flag submission state, keyed by flag identity and owned by the
/// session-scoped store rather than any view instance.
#[derive(Debug, Clone)]
pub struct FlagSubmission {
    pub flag_id: FlagId,
    /// Candidate text as last typed; retained across rejected attempts.
    pub candidate: String,
    /// Status text once submitted ("Submitted on <timestamp>").
    pub submission_details: Option<String>,
    pub submitting: bool,
    pub last_outcome: Option<SubmissionOutcome>,
}

impl FlagSubmission {
    fn new(flag_id: FlagId) -> Self {
        Self {
            flag_id,
            candidate: String::new(),
            submission_details: None,
            submitting: false,
            last_outcome: None,
        }
    }

    pub fn phase(&self) -> SubmissionPhase {
        if self.submission_details.is_some() {
            SubmissionPhase::Submitted
        } else if self.submitting {
            SubmissionPhase::Submitting
        } else if self.candidate.is_empty() {
            SubmissionPhase::Unsubmitted
        } else {
            SubmissionPhase::Editing
        }
    }

    /// Whether the input control is live: withdrawn after acceptance,
    /// disabled while a request is in flight.
    pub fn is_editable(&self) -> bool {
        self.submission_details.is_none() && !self.submitting
    }
}

struct DashboardState {
    challenges: Vec<ChallengeRecord>,
    view_cache: CategoryViewCache,
    flags: HashMap<FlagId, FlagSubmission>,
    notifications: NotificationQueue,
}

/// Session-scoped dashboard core: owns the challenge data, the per-flag
/// submission state machine, and the notification queue. State is partitioned
/// per flag id; submissions for different flags may be in flight
/// concurrently, while the per-flag `submitting` guard keeps at most one
/// request outstanding per flag.
pub struct DashboardClient {
    http: Client,
    config: PlatformConfig,
    scoring_origin: String,
    challenge_source: Arc<dyn ChallengeSource>,
    inner: Mutex<DashboardState>,
    events: broadcast::Sender<ClientEvent>,
}

impl DashboardClient {
    pub fn new(config: PlatformConfig) -> Arc<Self> {
        Self::new_with_source(config, Arc::new(MissingChallengeSource))
    }

    pub fn new_with_source(
        config: PlatformConfig,
        challenge_source: Arc<dyn ChallengeSource>,
    ) -> Arc<Self> {
        let scoring_origin = config.scoring_origin();
        Self::new_with_dependencies(config, challenge_source, scoring_origin)
    }

    pub fn new_with_dependencies(
        config: PlatformConfig,
        challenge_source: Arc<dyn ChallengeSource>,
        scoring_origin: impl Into<String>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            http: Client::new(),
            config,
            scoring_origin: scoring_origin.into(),
            challenge_source,
            inner: Mutex::new(DashboardState {
                challenges: Vec::new(),
                view_cache: CategoryViewCache::new(),
                flags: HashMap::new(),
                notifications: NotificationQueue::new(),
            }),
            events,
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn flag_submit_url(&self, flag_id: &FlagId) -> String {
        format!("{}/api/flags/{}/submit", self.scoring_origin, flag_id.0)
    }

    /// Pull the challenge listing from the configured source and hydrate the
    /// per-flag store from it.
    pub async fn refresh_challenges(&self, auth_token: &str) -> Result<()> {
        match self.challenge_source.fetch_challenges(auth_token).await {
            Ok(challenges) => {
                self.hydrate(&challenges).await;
                Ok(())
            }
            Err(err) => {
                let _ = self
                    .events
                    .send(ClientEvent::Error(format!("challenge refresh failed: {err}")));
                Err(err)
            }
        }
    }

    /// Seed the store from a challenge listing. Idempotent: hydrating twice
    /// with the same data yields the same view and per-flag states. An
    /// already-submitted status is never rolled back, and states for flags
    /// absent from the listing are dropped.
    pub async fn hydrate(&self, challenges: &[ChallengeRecord]) {
        let (challenge_count, flag_count) = {
            let mut guard = self.inner.lock().await;
            guard.challenges = challenges.to_vec();

            let mut retained: HashMap<FlagId, FlagSubmission> = HashMap::new();
            for challenge in challenges {
                for flag in &challenge.flags {
                    let mut state = guard
                        .flags
                        .remove(&flag.id)
                        .unwrap_or_else(|| FlagSubmission::new(flag.id.clone()));
                    if state.submission_details.is_none() {
                        state.submission_details = flag.submission_details.clone();
                    }
                    retained.insert(flag.id.clone(), state);
                }
            }
            guard.flags = retained;

            (challenges.len(), guard.flags.len())
        };

        info!(challenge_count, flag_count, "challenges: store hydrated");
        let _ = self.events.send(ClientEvent::ChallengesRefreshed {
            challenge_count,
            flag_count,
        });
    }

    /// The category-indexed view of the current challenge data, recomputed
    /// only when the underlying listing changes.
    pub async fn category_view(&self) -> Arc<CategoryView> {
        let mut guard = self.inner.lock().await;
        let DashboardState {
            challenges,
            view_cache,
            ..
        } = &mut *guard;
        view_cache.get_or_rebuild(challenges)
    }

    pub async fn flag_submission(&self, flag_id: &FlagId) -> Option<FlagSubmission> {
        self.inner.lock().await.flags.get(flag_id).cloned()
    }

    pub async fn submission_phase(&self, flag_id: &FlagId) -> Option<SubmissionPhase> {
        self.inner
            .lock()
            .await
            .flags
            .get(flag_id)
            .map(FlagSubmission::phase)
    }

    /// Record the user's typed candidate for a flag. Refused once the flag is
    /// submitted or while a request is in flight, mirroring the withdrawn /
    /// disabled input control.
    pub async fn set_flag_candidate(
        &self,
        flag_id: &FlagId,
        value: impl Into<String>,
    ) -> std::result::Result<(), SubmitError> {
        let mut guard = self.inner.lock().await;
        let state = guard
            .flags
            .get_mut(flag_id)
            .ok_or_else(|| SubmitError::UnknownFlag {
                flag_id: flag_id.0.clone(),
            })?;

        if state.submission_details.is_some() {
            return Err(SubmitError::AlreadySubmitted {
                flag_id: flag_id.0.clone(),
            });
        }
        if state.submitting {
            return Err(SubmitError::AlreadyInFlight {
                flag_id: flag_id.0.clone(),
            });
        }

        state.candidate = value.into();
        Ok(())
    }

    /// Drive one submission attempt for a flag: issue exactly one request
    /// carrying the stored candidate and map the response onto the state
    /// machine. Guard errors mean no request was issued; once a request goes
    /// out, its resolution is reported as a [`SubmissionOutcome`]. No
    /// automatic retries: a rejected or failed attempt only goes out again on
    /// a fresh call.
    pub async fn submit_flag(
        &self,
        flag_id: &FlagId,
    ) -> std::result::Result<SubmissionOutcome, SubmitError> {
        let candidate = {
            let mut guard = self.inner.lock().await;
            let state = guard
                .flags
                .get_mut(flag_id)
                .ok_or_else(|| SubmitError::UnknownFlag {
                    flag_id: flag_id.0.clone(),
                })?;

            if state.submission_details.is_some() {
                return Err(SubmitError::AlreadySubmitted {
                    flag_id: flag_id.0.clone(),
                });
            }
            if state.submitting {
                info!(
                    flag_id = %flag_id.0,
                    "flags: submission already in flight; duplicate submit ignored"
                );
                return Err(SubmitError::AlreadyInFlight {
                    flag_id: flag_id.0.clone(),
                });
            }
            if state.candidate.is_empty() {
                return Err(SubmitError::EmptyCandidate {
                    flag_id: flag_id.0.clone(),
                });
            }

            state.submitting = true;
            state.candidate.clone()
        };

        let response = self
            .http
            .post(self.flag_submit_url(flag_id))
            .json(&SubmitFlagRequest { flag: candidate })
            .send()
            .await;

        let (outcome, failure_reason) = match response {
            Ok(res) if res.status() == StatusCode::ACCEPTED => (SubmissionOutcome::Accepted, None),
            Ok(res) if res.status() == StatusCode::BAD_REQUEST => {
                (SubmissionOutcome::RejectedInvalid, None)
            }
            Ok(res) => {
                let status = res.status();
                warn!(flag_id = %flag_id.0, %status, "flags: unexpected scoring response");
                (
                    SubmissionOutcome::Failed,
                    Some(format!("unexpected scoring response {status}")),
                )
            }
            Err(err) => {
                warn!(flag_id = %flag_id.0, "flags: submission transport failure: {err}");
                (SubmissionOutcome::Failed, Some(err.to_string()))
            }
        };

        self.apply_submission_outcome(flag_id, outcome, failure_reason)
            .await;
        Ok(outcome)
    }

    /// Fold a resolved submission back into the store. If the flag was pruned
    /// while the request was in flight (its view is gone), the resolution is
    /// dropped: no state change, no notification.
    async fn apply_submission_outcome(
        &self,
        flag_id: &FlagId,
        outcome: SubmissionOutcome,
        failure_reason: Option<String>,
    ) {
        let submitted_at = Utc::now();
        let now = Instant::now();

        let applied = {
            let mut guard = self.inner.lock().await;
            let DashboardState {
                flags,
                notifications,
                ..
            } = &mut *guard;

            match flags.get_mut(flag_id) {
                None => false,
                Some(state) => {
                    state.submitting = false;
                    state.last_outcome = Some(outcome);

                    match outcome {
                        SubmissionOutcome::Accepted => {
                            state.submission_details = Some(format!(
                                "Submitted on {}",
                                submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true)
                            ));
                            state.candidate.clear();
                            notifications.push(
                                NotificationId {
                                    flag: flag_id.clone(),
                                    kind: NotificationKind::Submitted,
                                },
                                Severity::Success,
                                "Submitted",
                                "Flag submitted successfully",
                                now,
                            );
                        }
                        SubmissionOutcome::RejectedInvalid => {
                            notifications.push(
                                NotificationId {
                                    flag: flag_id.clone(),
                                    kind: NotificationKind::InvalidFlag,
                                },
                                Severity::Warning,
                                "Invalid",
                                "Invalid flag submitted",
                                now,
                            );
                        }
                        SubmissionOutcome::Failed => {
                            notifications.push(
                                NotificationId {
                                    flag: flag_id.clone(),
                                    kind: NotificationKind::SubmissionError,
                                },
                                Severity::Danger,
                                "Error",
                                "Error submitting flag",
                                now,
                            );
                        }
                    }
                    true
                }
            }
        };

        if !applied {
            warn!(
                flag_id = %flag_id.0,
                "flags: dropping submission result for a flag no longer in the store"
            );
            return;
        }

        match outcome {
            SubmissionOutcome::Accepted => {
                info!(flag_id = %flag_id.0, "flags: submission accepted");
                let _ = self.events.send(ClientEvent::SubmissionAccepted {
                    flag_id: flag_id.clone(),
                    submitted_at,
                });
            }
            SubmissionOutcome::RejectedInvalid => {
                info!(flag_id = %flag_id.0, "flags: submission rejected as invalid");
                let _ = self.events.send(ClientEvent::SubmissionRejected {
                    flag_id: flag_id.clone(),
                });
            }
            SubmissionOutcome::Failed => {
                let reason = failure_reason.unwrap_or_else(|| "submission failed".to_string());
                let _ = self.events.send(ClientEvent::SubmissionFailed {
                    flag_id: flag_id.clone(),
                    reason,
                });
            }
        }
    }

    /// Live notifications at `now`.
    pub async fn notifications(&self, now: Instant) -> Vec<Notification> {
        self.inner.lock().await.notifications.active(now)
    }

    pub async fn dismiss_notification(&self, id: &NotificationId) {
        self.inner.lock().await.notifications.dismiss(id);
    }

    /// Called by the external ticking collaborator to drop expired entries.
    pub async fn prune_notifications(&self, now: Instant) {
        self.inner.lock().await.notifications.prune_expired(now);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
