use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
    Twitter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoType {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    Planning,
    Scripting,
    Filming,
    Editing,
    Review,
    Ready,
    Published,
}

impl VideoStatus {
    /// READY and PUBLISHED both count as complete for aggregate stats and the
    /// checklist quick-toggle.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Ready | Self::Published)
    }

    /// Checklist quick-toggle: complete an open slot, reopen a complete one.
    /// Reopening always lands on PLANNING, not the prior state.
    pub fn toggled(self) -> Self {
        if self.is_done() {
            Self::Planning
        } else {
            Self::Ready
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Pt,
    Es,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub videos_per_day: u32,
    pub start_time: String,
    pub end_time: String,
    pub video_type: VideoType,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            videos_per_day: 3,
            start_time: "09:00".to_string(),
            end_time: "18:00".to_string(),
            video_type: VideoType::Long,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_hhmm(&self.start_time, "config.start_time")?;
        validate_hhmm(&self.end_time, "config.end_time")?;
        if self.videos_per_day == 0 {
            return Err("config.videos_per_day must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelProfile {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub platform: Platform,
    pub config: ScheduleConfig,
}

impl ChannelProfile {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "profile.id")?;
        validate_non_empty(&self.user_id, "profile.user_id")?;
        validate_non_empty(&self.name, "profile.name")?;
        self.config.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoSlot {
    pub id: String,
    pub profile_id: String,
    pub date: String,
    pub time: String,
    pub video_type: VideoType,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub topic: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub title: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub description: String,
    pub status: VideoStatus,
    #[serde(skip)]
    pub ai_loading: bool,
}

impl VideoSlot {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "slot.id")?;
        validate_non_empty(&self.profile_id, "slot.profile_id")?;
        validate_date(&self.date, "slot.date")?;
        validate_hhmm(&self.time, "slot.time")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserConfig {
    pub user_id: String,
    pub theme: Theme,
    pub language: Language,
}

impl UserConfig {
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            theme: Theme::Light,
            language: Language::Pt,
        }
    }
}

/// Stored rows may carry `null` for the free-text slot fields; they read
/// back as empty strings.
fn empty_if_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    let mut split = value.split(':');
    let Some(hour_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    let Some(minute_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    if split.next().is_some() {
        return Err(format!("{field_name} must be HH:MM"));
    }

    let hour = hour_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{field_name} must be HH:MM"));
    }
    Ok(())
}

pub(crate) fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}
