use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tone of the system prompt sent to the completion provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersonalityMode {
    #[default]
    Funny,
    Serious,
    Motivational,
}

impl PersonalityMode {
    /// Lenient parse: anything unrecognised (or absent) is `Funny`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("serious") => Self::Serious,
            Some("motivational") => Self::Motivational,
            _ => Self::Funny,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funny => "funny",
            Self::Serious => "serious",
            Self::Motivational => "motivational",
        }
    }
}

impl fmt::Display for PersonalityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested answer shape.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Meme,
    Photo,
    Video,
}

impl OutputFormat {
    /// Lenient parse: anything unrecognised (or absent) is `Plain`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("meme") => Self::Meme,
            Some("photo") => Self::Photo,
            Some("video") => Self::Video,
            _ => Self::Plain,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Meme => "meme",
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra data attached to a successful answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AuxData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meme_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_query: Option<String>,
    pub share_text: String,
}

/// Result of one synthesis. `data` is `None` only for the apology answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub data: Option<AuxData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trial" => Some(Self::Trial),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub subscription_status: SubscriptionStatus,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub streak_count: u32,
    pub last_login: DateTime<Utc>,
}

/// One asked question and the answer shown for it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QaRecord {
    pub user_id: String,
    pub question: String,
    pub answer: String,
    pub format: OutputFormat,
    pub personality: PersonalityMode,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub user_id: String,
    /// Whole currency units (rupees), as the checkout reports them.
    pub amount: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
