use crate::domain::models::{
    validate_hhmm, ChannelProfile, ScheduleConfig, UserConfig, VideoSlot, VideoStatus, VideoType,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::query::{Direction, Query, Store};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub(crate) const PROFILES: &str = "profiles";
pub(crate) const SLOTS: &str = "slots";
pub(crate) const USER_CONFIG: &str = "user_config";

/// Typed access to the three collections. Holds the backend chosen at
/// bootstrap; every caller above this layer works with domain structs only.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Store>,
}

/// Partial slot update. Absent fields are left untouched by the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlotPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_type: Option<VideoType>,
}

impl SlotPatch {
    pub fn is_empty(&self) -> bool {
        self.time.is_none()
            && self.topic.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.video_type.is_none()
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, InfraError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(InfraError::from))
        .collect()
}

fn decode_first<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>, InfraError> {
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_value(row)?))
}

impl Database {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_profiles(&self, user_id: &str) -> Result<Vec<ChannelProfile>, InfraError> {
        let rows = self
            .store
            .select(
                PROFILES,
                &Query::new()
                    .eq("user_id", user_id)
                    .order_by("name", Direction::Ascending),
            )
            .await?;
        decode_rows(rows)
    }

    pub async fn create_profile(
        &self,
        profile: ChannelProfile,
    ) -> Result<ChannelProfile, InfraError> {
        profile.validate().map_err(InfraError::Validation)?;
        let rows = self
            .store
            .insert(PROFILES, vec![serde_json::to_value(&profile)?])
            .await?;
        decode_first(rows)?
            .ok_or_else(|| InfraError::Store("profile insert returned no rows".to_string()))
    }

    pub async fn update_profile_config(
        &self,
        profile_id: &str,
        config: &ScheduleConfig,
    ) -> Result<Option<ChannelProfile>, InfraError> {
        config.validate().map_err(InfraError::Validation)?;
        let rows = self
            .store
            .update(
                PROFILES,
                &Query::new().eq("id", profile_id),
                serde_json::json!({ "config": config }),
            )
            .await?;
        decode_first(rows)
    }

    /// Cascade delete. Slots go first so a failure leaves the profile and its
    /// schedule both intact; the profile row is only removed once its slots
    /// are gone.
    pub async fn delete_profile(&self, profile_id: &str) -> Result<bool, InfraError> {
        self.store
            .delete(SLOTS, &Query::new().eq("profile_id", profile_id))
            .await?;
        let removed = self
            .store
            .delete(PROFILES, &Query::new().eq("id", profile_id))
            .await?;
        Ok(removed > 0)
    }

    pub async fn slots_for_day(
        &self,
        profile_id: &str,
        date: &str,
    ) -> Result<Vec<VideoSlot>, InfraError> {
        let rows = self
            .store
            .select(
                SLOTS,
                &Query::new()
                    .eq("profile_id", profile_id)
                    .eq("date", date)
                    .order_by("time", Direction::Ascending),
            )
            .await?;
        decode_rows(rows)
    }

    pub async fn insert_slots(&self, slots: Vec<VideoSlot>) -> Result<Vec<VideoSlot>, InfraError> {
        if slots.is_empty() {
            return Ok(Vec::new());
        }
        let rows = slots
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        decode_rows(self.store.insert(SLOTS, rows).await?)
    }

    pub async fn update_slot(
        &self,
        slot_id: &str,
        patch: &SlotPatch,
    ) -> Result<Option<VideoSlot>, InfraError> {
        if let Some(time) = patch.time.as_deref() {
            validate_hhmm(time, "slot.time").map_err(InfraError::Validation)?;
        }
        if patch.is_empty() {
            return self.find_slot(slot_id).await;
        }
        let rows = self
            .store
            .update(
                SLOTS,
                &Query::new().eq("id", slot_id),
                serde_json::to_value(patch)?,
            )
            .await?;
        decode_first(rows)
    }

    pub async fn find_slot(&self, slot_id: &str) -> Result<Option<VideoSlot>, InfraError> {
        let rows = self
            .store
            .select(SLOTS, &Query::new().eq("id", slot_id).single())
            .await?;
        decode_first(rows)
    }

    pub async fn delete_slot(&self, slot_id: &str) -> Result<bool, InfraError> {
        let removed = self
            .store
            .delete(SLOTS, &Query::new().eq("id", slot_id))
            .await?;
        Ok(removed > 0)
    }

    pub async fn delete_slots_for_day(
        &self,
        profile_id: &str,
        date: &str,
    ) -> Result<usize, InfraError> {
        self.store
            .delete(
                SLOTS,
                &Query::new().eq("profile_id", profile_id).eq("date", date),
            )
            .await
    }

    pub async fn load_user_config(
        &self,
        user_id: &str,
    ) -> Result<Option<UserConfig>, InfraError> {
        let rows = self
            .store
            .select(USER_CONFIG, &Query::new().eq("user_id", user_id).single())
            .await?;
        decode_first(rows)
    }

    /// One row per user: matched by `user_id` when the row carries no id yet.
    pub async fn save_user_config(&self, config: &UserConfig) -> Result<UserConfig, InfraError> {
        let rows = self
            .store
            .upsert(
                USER_CONFIG,
                vec![serde_json::to_value(config)?],
                Some("user_id"),
            )
            .await?;
        decode_first(rows)?
            .ok_or_else(|| InfraError::Store("user config upsert returned no rows".to_string()))
    }
}
