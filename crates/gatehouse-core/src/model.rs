//! Stream configuration, geo policy, and administrative data carriers.
//!
//! # Design
//! - Pure data carriers shared by the services, the backends, and the HTTP layer.
//! - Patches carry `Option` fields; `apply` validates the merged record before it is stored.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GateError, GateResult};

const DEFAULT_EMBED_URL: &str = "https://www.youtube.com/embed/GXRL7PcPbOA?autoplay=1&mute=1&controls=0&modestbranding=1&rel=0&showinfo=0&iv_load_policy=3&fs=0&disablekb=1&cc_load_policy=0&playsinline=1&loop=1&enablejsapi=1";
const DEFAULT_TITLE: &str = "Anjuman e Hakimi Najmi Mohallah Ratlam Live Portal";
const DEFAULT_DESCRIPTION: &str = "Welcome to the live portal of Anjuman e Hakimi Najmi Mohallah Ratlam. This stream is authorized for ITS members only. Please do not share this link with others.";
const DEFAULT_DATE: &str = "August 9-15, 2025";
const DEFAULT_TIME: &str = "7:30 AM - 12:30 PM IST";
const DEFAULT_SPEAKER: &str = "His Holiness Dr. Syedna Mufaddal Saifuddin (TUS)";
const DEFAULT_BLOCKED_MESSAGE: &str = "This stream is not available in your region.";
const MAX_TEXT_LEN: usize = 4_096;

/// Schedule text shown alongside the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFields {
    /// Human-readable date range.
    pub date: String,
    /// Human-readable time window.
    pub time: String,
    /// Presenter shown on the stream page.
    pub speaker: String,
}

/// Singleton stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Embed URL handed to the video player.
    pub embed_url: String,
    /// Stream title.
    pub title: String,
    /// Stream description.
    pub description: String,
    /// Schedule text.
    pub schedule: ScheduleFields,
    /// When set, members see a "no stream" notice instead of the player.
    pub no_stream: bool,
    /// Timestamp of the last administrative update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            embed_url: DEFAULT_EMBED_URL.to_string(),
            title: DEFAULT_TITLE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            schedule: ScheduleFields {
                date: DEFAULT_DATE.to_string(),
                time: DEFAULT_TIME.to_string(),
                speaker: DEFAULT_SPEAKER.to_string(),
            },
            no_stream: false,
            last_updated: None,
        }
    }
}

/// Partial update for [`StreamSettings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamSettingsPatch {
    /// Replacement embed URL.
    pub embed_url: Option<String>,
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement schedule date.
    pub date: Option<String>,
    /// Replacement schedule time.
    pub time: Option<String>,
    /// Replacement speaker.
    pub speaker: Option<String>,
    /// Replacement "no stream" flag.
    pub no_stream: Option<bool>,
}

impl StreamSettingsPatch {
    /// Merge the patch into `current`, validating the result.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidField`] when the embed URL is not an absolute
    /// `http`/`https` URL or a text field is blank or oversized.
    pub fn apply(self, current: &StreamSettings, now: DateTime<Utc>) -> GateResult<StreamSettings> {
        let mut next = current.clone();
        if let Some(embed_url) = self.embed_url {
            next.embed_url = validate_embed_url(&embed_url)?;
        }
        if let Some(title) = self.title {
            next.title = validate_text("title", &title, false)?;
        }
        if let Some(description) = self.description {
            next.description = validate_text("description", &description, true)?;
        }
        if let Some(date) = self.date {
            next.schedule.date = validate_text("date", &date, true)?;
        }
        if let Some(time) = self.time {
            next.schedule.time = validate_text("time", &time, true)?;
        }
        if let Some(speaker) = self.speaker {
            next.schedule.speaker = validate_text("speaker", &speaker, true)?;
        }
        if let Some(no_stream) = self.no_stream {
            next.no_stream = no_stream;
        }
        next.last_updated = Some(now);
        Ok(next)
    }
}

/// Singleton geographic admission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPolicy {
    /// Whether the policy is enforced.
    pub enabled: bool,
    /// ISO-3166 alpha-2 codes allowed to watch (upper-case).
    pub allowed_countries: BTreeSet<String>,
    /// Message shown to refused callers.
    pub blocked_message: String,
}

impl Default for GeoPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_countries: BTreeSet::from(["IN".to_string()]),
            blocked_message: DEFAULT_BLOCKED_MESSAGE.to_string(),
        }
    }
}

impl GeoPolicy {
    /// Whether a caller from `country` may proceed. Unknown countries are refused
    /// while the policy is enabled.
    #[must_use]
    pub fn permits(&self, country: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        country
            .map(|code| code.trim().to_ascii_uppercase())
            .is_some_and(|code| self.allowed_countries.contains(&code))
    }
}

/// Partial update for [`GeoPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoPolicyPatch {
    /// Replacement enforcement flag.
    pub enabled: Option<bool>,
    /// Replacement allow-list.
    pub allowed_countries: Option<Vec<String>>,
    /// Replacement refusal message.
    pub blocked_message: Option<String>,
}

impl GeoPolicyPatch {
    /// Merge the patch into `current`, normalising country codes.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidField`] for country codes that are not two
    /// ASCII letters, a blank message, or enabling the policy with an empty allow-list.
    pub fn apply(self, current: &GeoPolicy) -> GateResult<GeoPolicy> {
        let mut next = current.clone();
        if let Some(codes) = self.allowed_countries {
            next.allowed_countries = codes
                .iter()
                .map(|code| normalize_country(code))
                .collect::<GateResult<_>>()?;
        }
        if let Some(message) = self.blocked_message {
            next.blocked_message = validate_text("blocked_message", &message, false)?;
        }
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if next.enabled && next.allowed_countries.is_empty() {
            return Err(GateError::InvalidField {
                field: "allowed_countries",
                reason: "must list at least one country while enabled",
            });
        }
        Ok(next)
    }
}

/// Stored administrator credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredential {
    /// Administrator username.
    pub username: String,
    /// Argon2 PHC-format password hash.
    pub password_hash: String,
}

/// Live session row shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    /// Owning member identifier.
    pub identifier: String,
    /// Token used to kick the session.
    pub token: String,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// Last verification time.
    pub last_activity_at: DateTime<Utc>,
}

/// Point-in-time view of the registry, live sessions, and settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    /// Number of approved identifiers.
    pub identifier_count: usize,
    /// Number of live member sessions.
    pub live_session_count: usize,
    /// Approved identifiers, sorted.
    pub identifiers: Vec<String>,
    /// Live member sessions, oldest first.
    pub sessions: Vec<SessionView>,
    /// Current stream settings.
    pub stream: StreamSettings,
    /// Current geo policy.
    pub geo: GeoPolicy,
}

/// Outcome of a bulk identifier import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkAddReport {
    /// Identifiers inserted.
    pub added: usize,
    /// Tokens skipped as malformed or already present.
    pub skipped: usize,
}

fn validate_embed_url(raw: &str) -> GateResult<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|_| GateError::InvalidField {
        field: "embed_url",
        reason: "must be an absolute URL",
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(GateError::InvalidField {
            field: "embed_url",
            reason: "must use http or https",
        });
    }
    Ok(trimmed.to_string())
}

fn validate_text(field: &'static str, raw: &str, allow_empty: bool) -> GateResult<String> {
    let trimmed = raw.trim();
    if !allow_empty && trimmed.is_empty() {
        return Err(GateError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    if trimmed.len() > MAX_TEXT_LEN {
        return Err(GateError::InvalidField {
            field,
            reason: "is too long",
        });
    }
    Ok(trimmed.to_string())
}

fn normalize_country(raw: &str) -> GateResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 2 && code.bytes().all(|byte| byte.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(GateError::InvalidField {
            field: "allowed_countries",
            reason: "entries must be two-letter country codes",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_patch_merges_and_stamps() -> GateResult<()> {
        let now = Utc::now();
        let patch = StreamSettingsPatch {
            title: Some("  Evening relay ".into()),
            no_stream: Some(true),
            ..StreamSettingsPatch::default()
        };
        let next = patch.apply(&StreamSettings::default(), now)?;
        assert_eq!(next.title, "Evening relay");
        assert!(next.no_stream);
        assert_eq!(next.embed_url, DEFAULT_EMBED_URL);
        assert_eq!(next.last_updated, Some(now));
        Ok(())
    }

    #[test]
    fn stream_patch_rejects_non_http_embed() {
        let patch = StreamSettingsPatch {
            embed_url: Some("javascript:alert(1)".into()),
            ..StreamSettingsPatch::default()
        };
        let err = patch
            .apply(&StreamSettings::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::InvalidField {
                field: "embed_url",
                ..
            }
        ));
    }

    #[test]
    fn geo_policy_permits_by_country() -> GateResult<()> {
        let disabled = GeoPolicy::default();
        assert!(disabled.permits(None));

        let enabled = GeoPolicyPatch {
            enabled: Some(true),
            allowed_countries: Some(vec!["in".into(), " ae ".into()]),
            blocked_message: None,
        }
        .apply(&disabled)?;
        assert!(enabled.permits(Some("IN")));
        assert!(enabled.permits(Some("ae")));
        assert!(!enabled.permits(Some("US")));
        assert!(!enabled.permits(None));
        Ok(())
    }

    #[test]
    fn geo_patch_rejects_bad_codes_and_empty_allow_list() {
        let bad_code = GeoPolicyPatch {
            allowed_countries: Some(vec!["IND".into()]),
            ..GeoPolicyPatch::default()
        };
        assert!(bad_code.apply(&GeoPolicy::default()).is_err());

        let empty = GeoPolicyPatch {
            enabled: Some(true),
            allowed_countries: Some(Vec::new()),
            blocked_message: None,
        };
        assert!(empty.apply(&GeoPolicy::default()).is_err());
    }
}
