use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Display colours handed out to new monitors
pub const PALETTE: [&str; 8] = [
    "#8B5CF6", // Purple
    "#3B82F6", // Blue
    "#22C55E", // Green
    "#EF4444", // Red
    "#F97316", // Orange
    "#EC4899", // Pink
    "#06B6D4", // Cyan
    "#EAB308", // Yellow
];

pub const DEFAULT_COOLDOWN_MINUTES: u32 = 10;
pub const DEFAULT_MAX_POST_AGE_HOURS: u32 = 12;

fn default_enabled() -> bool {
    true
}

fn default_cooldown_minutes() -> u32 {
    DEFAULT_COOLDOWN_MINUTES
}

fn default_max_post_age_hours() -> Option<u32> {
    Some(DEFAULT_MAX_POST_AGE_HOURS)
}

// ============================================================================
// Monitor Models
// ============================================================================

/// Monitor is one subreddit watch with its filter rules and schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub subreddit: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub min_upvotes: Option<i64>,
    #[serde(default)]
    pub domain_contains: Vec<String>,
    #[serde(default)]
    pub domain_excludes: Vec<String>,
    #[serde(default)]
    pub flair_contains: Vec<String>,
    #[serde(default)]
    pub author_includes: Vec<String>,
    #[serde(default)]
    pub author_excludes: Vec<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    /// `None` disables the age check; a missing field means the default of 12 hours
    #[serde(default = "default_max_post_age_hours")]
    pub max_post_age_hours: Option<u32>,
}

impl Monitor {
    /// Monitor on `subreddit` with every rule empty and default schedule
    pub fn new(id: impl Into<String>, subreddit: &str) -> Self {
        let subreddit = normalize_subreddit(subreddit);
        Self {
            id: id.into(),
            name: format!("r/{}", subreddit),
            subreddit,
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            min_upvotes: None,
            domain_contains: Vec::new(),
            domain_excludes: Vec::new(),
            flair_contains: Vec::new(),
            author_includes: Vec::new(),
            author_excludes: Vec::new(),
            color: PALETTE[0].to_string(),
            enabled: true,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            max_post_age_hours: Some(DEFAULT_MAX_POST_AGE_HOURS),
        }
    }

    /// Resolve load-time defaults for a monitor read from the document.
    ///
    /// `index` is the monitor's position in the document and picks the
    /// fallback palette colour. Ids are assigned separately, see
    /// [`Monitor::fallback_id`].
    pub fn resolve_defaults(&mut self, index: usize) {
        self.subreddit = normalize_subreddit(&self.subreddit);
        self.id = self.id.trim().to_string();
        if self.name.trim().is_empty() {
            self.name = format!("r/{}", self.subreddit);
        }
        if self.color.trim().is_empty() {
            self.color = PALETTE[index % PALETTE.len()].to_string();
        }
    }

    /// Stable id for a legacy entry without one.
    ///
    /// The subreddit is used when no other monitor holds it, otherwise
    /// `{subreddit}-{index}` with the first free counter from `index`.
    pub fn fallback_id(&self, index: usize, taken: &HashSet<String>) -> String {
        if !taken.contains(&self.subreddit) {
            return self.subreddit.clone();
        }
        (index..)
            .map(|n| format!("{}-{}", self.subreddit, n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Check the invariants of a single monitor
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subreddit.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "subreddit".to_string(),
                reason: format!("monitor '{}' has an empty subreddit", self.id),
            });
        }
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }
        if self.cooldown_minutes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "cooldown_minutes".to_string(),
                reason: format!("monitor '{}' must have a cooldown of at least 1", self.id),
            });
        }
        Ok(())
    }

    /// Cooldown as a number of seconds
    pub fn cooldown_seconds(&self) -> i64 {
        i64::from(self.cooldown_minutes) * 60
    }

    /// Apply a field-wise update. The id never changes.
    pub fn apply(&mut self, update: MonitorUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(subreddit) = update.subreddit {
            self.subreddit = normalize_subreddit(&subreddit);
        }
        if let Some(keywords) = update.keywords {
            self.keywords = keywords;
        }
        if let Some(exclude_keywords) = update.exclude_keywords {
            self.exclude_keywords = exclude_keywords;
        }
        if let Some(min_upvotes) = update.min_upvotes {
            self.min_upvotes = min_upvotes;
        }
        if let Some(domain_contains) = update.domain_contains {
            self.domain_contains = domain_contains;
        }
        if let Some(domain_excludes) = update.domain_excludes {
            self.domain_excludes = domain_excludes;
        }
        if let Some(flair_contains) = update.flair_contains {
            self.flair_contains = flair_contains;
        }
        if let Some(author_includes) = update.author_includes {
            self.author_includes = author_includes;
        }
        if let Some(author_excludes) = update.author_excludes {
            self.author_excludes = author_excludes;
        }
        if let Some(color) = update.color {
            self.color = color;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(cooldown_minutes) = update.cooldown_minutes {
            self.cooldown_minutes = cooldown_minutes;
        }
        if let Some(max_post_age_hours) = update.max_post_age_hours {
            self.max_post_age_hours = max_post_age_hours;
        }
    }
}

/// Input for creating a monitor; everything except the subreddit is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorDraft {
    pub subreddit: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub min_upvotes: Option<i64>,
    #[serde(default)]
    pub domain_contains: Vec<String>,
    #[serde(default)]
    pub domain_excludes: Vec<String>,
    #[serde(default)]
    pub flair_contains: Vec<String>,
    #[serde(default)]
    pub author_includes: Vec<String>,
    #[serde(default)]
    pub author_excludes: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub cooldown_minutes: Option<u32>,
    #[serde(default = "default_max_post_age_hours")]
    pub max_post_age_hours: Option<u32>,
}

impl MonitorDraft {
    pub fn new(subreddit: impl Into<String>) -> Self {
        Self {
            subreddit: subreddit.into(),
            max_post_age_hours: default_max_post_age_hours(),
            ..Default::default()
        }
    }

    /// Build a monitor with a fresh id, taking the first palette colour not
    /// used by `existing`.
    pub fn into_monitor(self, existing: &[Monitor]) -> Result<Monitor, ValidationError> {
        let subreddit = normalize_subreddit(&self.subreddit);
        if subreddit.is_empty() {
            return Err(ValidationError::MissingField("subreddit".to_string()));
        }

        let color = self
            .color
            .unwrap_or_else(|| next_palette_color(existing).to_string());

        let monitor = Monitor {
            id: Uuid::new_v4().to_string(),
            name: self.name.unwrap_or_else(|| format!("r/{}", subreddit)),
            subreddit,
            keywords: self.keywords,
            exclude_keywords: self.exclude_keywords,
            min_upvotes: self.min_upvotes,
            domain_contains: self.domain_contains,
            domain_excludes: self.domain_excludes,
            flair_contains: self.flair_contains,
            author_includes: self.author_includes,
            author_excludes: self.author_excludes,
            color,
            enabled: self.enabled.unwrap_or(true),
            cooldown_minutes: self.cooldown_minutes.unwrap_or(DEFAULT_COOLDOWN_MINUTES),
            max_post_age_hours: self.max_post_age_hours,
        };
        monitor.validate()?;
        Ok(monitor)
    }
}

/// Field-wise monitor update. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorUpdate {
    pub name: Option<String>,
    pub subreddit: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub exclude_keywords: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub min_upvotes: Option<Option<i64>>,
    pub domain_contains: Option<Vec<String>>,
    pub domain_excludes: Option<Vec<String>>,
    pub flair_contains: Option<Vec<String>>,
    pub author_includes: Option<Vec<String>>,
    pub author_excludes: Option<Vec<String>>,
    pub color: Option<String>,
    pub enabled: Option<bool>,
    pub cooldown_minutes: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_post_age_hours: Option<Option<u32>>,
}

// Distinguishes an explicit `null` (clear) from an absent field (keep)
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Lowercase, trim and strip a leading `r/` or `/r/`
pub fn normalize_subreddit(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered
        .strip_prefix("/r/")
        .or_else(|| lowered.strip_prefix("r/"))
        .unwrap_or(&lowered);
    stripped.trim_matches('/').trim().to_string()
}

/// First palette colour no existing monitor uses, cycling when all are taken
pub fn next_palette_color(existing: &[Monitor]) -> &'static str {
    let used: HashSet<String> = existing.iter().map(|m| m.color.to_uppercase()).collect();
    PALETTE
        .iter()
        .find(|color| !used.contains(&color.to_uppercase()))
        .copied()
        .unwrap_or(PALETTE[existing.len() % PALETTE.len()])
}

// ============================================================================
// Post Models
// ============================================================================

/// Read-only view of a Reddit submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub permalink: String,
    pub domain: String,
    pub flair_text: Option<String>,
    /// `None` for deleted or suspended accounts
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Absolute link to the comments page
    pub fn permalink_url(&self) -> String {
        if self.permalink.starts_with("http") {
            self.permalink.clone()
        } else {
            format!("https://www.reddit.com{}", self.permalink)
        }
    }
}
