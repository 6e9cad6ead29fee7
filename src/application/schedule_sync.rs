use crate::application::database::{Database, SlotPatch};
use crate::domain::models::{ChannelProfile, VideoSlot, VideoStatus};
use crate::domain::schedule::generate_slot_times;
use crate::domain::time_codec::{minutes_to_time, time_to_minutes};
use crate::infrastructure::error::InfraError;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Keeps the currently displayed day in sync with the store. Edits apply to
/// the in-memory copy immediately and are persisted afterwards; a failed
/// write tags the slot as unconfirmed instead of rolling the edit back. The
/// store stays authoritative: the next reload replaces the whole view and
/// clears every tag.
pub struct ScheduleSyncService {
    database: Database,
    view: Mutex<DayView>,
}

#[derive(Debug, Default)]
struct DayView {
    profile_id: String,
    date: String,
    slots: Vec<VideoSlot>,
    unconfirmed: HashSet<String>,
}

impl ScheduleSyncService {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            view: Mutex::new(DayView::default()),
        }
    }

    fn lock_view(&self) -> Result<MutexGuard<'_, DayView>, InfraError> {
        self.view
            .lock()
            .map_err(|error| InfraError::Store(format!("day view lock poisoned: {error}")))
    }

    /// Authoritative refresh of one profile-day.
    pub async fn reload(
        &self,
        profile_id: &str,
        date: &str,
    ) -> Result<Vec<VideoSlot>, InfraError> {
        let slots = self.database.slots_for_day(profile_id, date).await?;
        let mut view = self.lock_view()?;
        view.profile_id = profile_id.to_string();
        view.date = date.to_string();
        view.slots = slots.clone();
        view.unconfirmed.clear();
        Ok(slots)
    }

    pub fn slots(&self) -> Result<Vec<VideoSlot>, InfraError> {
        Ok(self.lock_view()?.slots.clone())
    }

    pub fn is_unconfirmed(&self, slot_id: &str) -> Result<bool, InfraError> {
        Ok(self.lock_view()?.unconfirmed.contains(slot_id))
    }

    /// Display-only flag; never persisted.
    pub fn set_ai_loading(&self, slot_id: &str, loading: bool) -> Result<(), InfraError> {
        let mut view = self.lock_view()?;
        if let Some(slot) = view.slots.iter_mut().find(|slot| slot.id == slot_id) {
            slot.ai_loading = loading;
        }
        Ok(())
    }

    /// Optimistic edit: the in-memory slot changes first, then the write is
    /// attempted. When the write fails or matches nothing the edit stays
    /// visible and the slot is tagged unconfirmed.
    pub async fn apply_edit(
        &self,
        slot_id: &str,
        patch: SlotPatch,
    ) -> Result<VideoSlot, InfraError> {
        if let Some(time) = patch.time.as_deref() {
            crate::domain::models::validate_hhmm(time, "slot.time")
                .map_err(InfraError::Validation)?;
        }

        let optimistic = {
            let mut view = self.lock_view()?;
            let Some(slot) = view.slots.iter_mut().find(|slot| slot.id == slot_id) else {
                return Err(InfraError::Validation(format!("slot not found: {slot_id}")));
            };
            apply_patch(slot, &patch);
            slot.clone()
        };

        match self.database.update_slot(slot_id, &patch).await {
            Ok(Some(_stored)) => {
                let mut view = self.lock_view()?;
                view.unconfirmed.remove(slot_id);
            }
            Ok(None) | Err(_) => {
                let mut view = self.lock_view()?;
                view.unconfirmed.insert(slot_id.to_string());
            }
        }
        Ok(optimistic)
    }

    /// Optimistic removal. A failed delete is not undone locally; the id is
    /// tagged unconfirmed so the divergence stays visible, and the slot
    /// reappears on the next reload if the store still has it.
    pub async fn remove(&self, slot_id: &str) -> Result<bool, InfraError> {
        {
            let mut view = self.lock_view()?;
            let before = view.slots.len();
            view.slots.retain(|slot| slot.id != slot_id);
            view.unconfirmed.remove(slot_id);
            if view.slots.len() == before {
                return Ok(false);
            }
        }
        match self.database.delete_slot(slot_id).await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                let mut view = self.lock_view()?;
                view.unconfirmed.insert(slot_id.to_string());
            }
        }
        Ok(true)
    }

    /// Replaces the whole day: delete everything for the profile-day, insert
    /// freshly drawn slots, then reload so the returned schedule is exactly
    /// what the store holds. A failed delete aborts before anything is
    /// inserted.
    pub async fn regenerate(
        &self,
        profile: &ChannelProfile,
        date: &str,
    ) -> Result<Vec<VideoSlot>, InfraError> {
        profile.config.validate().map_err(InfraError::Validation)?;
        let start = time_to_minutes(&profile.config.start_time).ok_or_else(|| {
            InfraError::Validation("config.start_time must be HH:MM".to_string())
        })?;
        let end = time_to_minutes(&profile.config.end_time).ok_or_else(|| {
            InfraError::Validation("config.end_time must be HH:MM".to_string())
        })?;
        // The window must be strictly positive; an equal window is refused
        // too, not collapsed to a single minute.
        if end <= start {
            return Err(InfraError::Validation(
                "config.end_time must be after config.start_time".to_string(),
            ));
        }

        self.database.delete_slots_for_day(&profile.id, date).await?;

        let slots = generate_slot_times(start, end, profile.config.videos_per_day)
            .into_iter()
            .map(|minutes| VideoSlot {
                // The store assigns the id on insert.
                id: String::new(),
                profile_id: profile.id.clone(),
                date: date.to_string(),
                time: minutes_to_time(minutes),
                video_type: profile.config.video_type,
                topic: String::new(),
                title: String::new(),
                description: String::new(),
                status: VideoStatus::Planning,
                ai_loading: false,
            })
            .collect();
        self.database.insert_slots(slots).await?;

        self.reload(&profile.id, date).await
    }

    pub async fn clear_day(&self, profile_id: &str, date: &str) -> Result<usize, InfraError> {
        let removed = self.database.delete_slots_for_day(profile_id, date).await?;
        self.reload(profile_id, date).await?;
        Ok(removed)
    }
}

fn apply_patch(slot: &mut VideoSlot, patch: &SlotPatch) {
    if let Some(time) = patch.time.as_ref() {
        slot.time = time.clone();
    }
    if let Some(topic) = patch.topic.as_ref() {
        slot.topic = topic.clone();
    }
    if let Some(title) = patch.title.as_ref() {
        slot.title = title.clone();
    }
    if let Some(description) = patch.description.as_ref() {
        slot.description = description.clone();
    }
    if let Some(status) = patch.status {
        slot.status = status;
    }
    if let Some(video_type) = patch.video_type {
        slot.video_type = video_type;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Platform, ScheduleConfig, VideoType};
    use crate::infrastructure::local_store::InMemoryStore;
    use crate::infrastructure::query::{Query, Store};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Store wrapper that fails a planned number of deletes or updates
    /// before delegating to the in-memory backend.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        failing_deletes: AtomicUsize,
        failing_updates: AtomicUsize,
    }

    impl FlakyStore {
        fn take_failure(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                    value.checked_sub(1)
                })
                .is_ok()
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, InfraError> {
            self.inner.select(collection, query).await
        }

        async fn insert(
            &self,
            collection: &str,
            rows: Vec<Value>,
        ) -> Result<Vec<Value>, InfraError> {
            self.inner.insert(collection, rows).await
        }

        async fn update(
            &self,
            collection: &str,
            query: &Query,
            patch: Value,
        ) -> Result<Vec<Value>, InfraError> {
            if Self::take_failure(&self.failing_updates) {
                return Err(InfraError::Store("planned update failure".to_string()));
            }
            self.inner.update(collection, query, patch).await
        }

        async fn delete(&self, collection: &str, query: &Query) -> Result<usize, InfraError> {
            if Self::take_failure(&self.failing_deletes) {
                return Err(InfraError::Store("planned delete failure".to_string()));
            }
            self.inner.delete(collection, query).await
        }

        async fn upsert(
            &self,
            collection: &str,
            rows: Vec<Value>,
            fallback_key: Option<&str>,
        ) -> Result<Vec<Value>, InfraError> {
            self.inner.upsert(collection, rows, fallback_key).await
        }
    }

    fn sample_profile() -> ChannelProfile {
        ChannelProfile {
            id: "prf-1".to_string(),
            user_id: "usr-1".to_string(),
            name: "Main".to_string(),
            platform: Platform::Youtube,
            config: ScheduleConfig::default(),
        }
    }

    fn service() -> (Arc<FlakyStore>, ScheduleSyncService) {
        let store = Arc::new(FlakyStore::default());
        let database = Database::new(Arc::clone(&store) as Arc<dyn Store>);
        (store, ScheduleSyncService::new(database))
    }

    #[tokio::test]
    async fn regenerate_fills_the_window_sorted() {
        let (_store, service) = service();
        let profile = sample_profile();

        let slots = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("regenerate");
        assert_eq!(slots.len(), 3);
        for slot in &slots {
            assert!(!slot.id.is_empty());
            assert_eq!(slot.status, VideoStatus::Planning);
            let minutes = time_to_minutes(&slot.time).expect("valid time");
            assert!((9 * 60..=18 * 60).contains(&minutes));
        }
        let times = slots.iter().map(|slot| slot.time.clone()).collect::<Vec<_>>();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[tokio::test]
    async fn regenerate_replaces_previous_day_with_fresh_ids() {
        let (_store, service) = service();
        let profile = sample_profile();

        let first = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("first pass");
        let second = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("second pass");

        assert_eq!(second.len(), profile.config.videos_per_day as usize);
        let first_ids = first.iter().map(|slot| slot.id.clone()).collect::<HashSet<_>>();
        assert!(second.iter().all(|slot| !first_ids.contains(&slot.id)));
    }

    #[tokio::test]
    async fn regenerate_aborts_when_delete_fails() {
        let (store, service) = service();
        let profile = sample_profile();
        let existing = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("seed day");

        store.failing_deletes.store(1, Ordering::SeqCst);
        let result = service.regenerate(&profile, "2026-03-02").await;
        assert!(result.is_err());

        // Nothing was inserted; the old schedule survives.
        let reloaded = service
            .reload("prf-1", "2026-03-02")
            .await
            .expect("reload");
        let existing_ids = existing.iter().map(|slot| slot.id.clone()).collect::<HashSet<_>>();
        assert_eq!(reloaded.len(), existing.len());
        assert!(reloaded.iter().all(|slot| existing_ids.contains(&slot.id)));
    }

    #[tokio::test]
    async fn regenerate_rejects_inverted_window() {
        let (_store, service) = service();
        let mut profile = sample_profile();
        profile.config.start_time = "18:00".to_string();
        profile.config.end_time = "09:00".to_string();

        let result = service.regenerate(&profile, "2026-03-02").await;
        assert!(matches!(result, Err(InfraError::Validation(_))));
    }

    #[tokio::test]
    async fn regenerate_rejects_equal_window() {
        let (_store, service) = service();
        let mut profile = sample_profile();
        profile.config.start_time = "09:00".to_string();
        profile.config.end_time = "09:00".to_string();

        let result = service.regenerate(&profile, "2026-03-02").await;
        assert!(matches!(result, Err(InfraError::Validation(_))));
    }

    #[tokio::test]
    async fn failed_update_keeps_optimistic_value_and_tags_slot() {
        let (store, service) = service();
        let profile = sample_profile();
        let slots = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("seed day");
        let slot_id = slots[0].id.clone();

        store.failing_updates.store(1, Ordering::SeqCst);
        let patch = SlotPatch {
            topic: Some("Edited offline".to_string()),
            ..SlotPatch::default()
        };
        let edited = service.apply_edit(&slot_id, patch).await.expect("edit");
        assert_eq!(edited.topic, "Edited offline");
        assert!(service.is_unconfirmed(&slot_id).expect("tag check"));

        // The store never saw the edit; reload restores it and clears the tag.
        let reloaded = service
            .reload("prf-1", "2026-03-02")
            .await
            .expect("reload");
        let stored = reloaded
            .iter()
            .find(|slot| slot.id == slot_id)
            .expect("slot exists");
        assert_eq!(stored.topic, "");
        assert!(!service.is_unconfirmed(&slot_id).expect("tag cleared"));
    }

    #[tokio::test]
    async fn successful_edit_is_confirmed_and_persisted() {
        let (_store, service) = service();
        let profile = sample_profile();
        let slots = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("seed day");
        let slot_id = slots[0].id.clone();

        let patch = SlotPatch {
            topic: Some("Unboxing".to_string()),
            status: Some(VideoStatus::Scripting),
            ..SlotPatch::default()
        };
        service.apply_edit(&slot_id, patch).await.expect("edit");
        assert!(!service.is_unconfirmed(&slot_id).expect("tag check"));

        let reloaded = service
            .reload("prf-1", "2026-03-02")
            .await
            .expect("reload");
        let stored = reloaded
            .iter()
            .find(|slot| slot.id == slot_id)
            .expect("slot exists");
        assert_eq!(stored.topic, "Unboxing");
        assert_eq!(stored.status, VideoStatus::Scripting);
    }

    #[tokio::test]
    async fn remove_is_optimistic_and_reports_missing_slots() {
        let (_store, service) = service();
        let profile = sample_profile();
        let slots = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("seed day");
        let slot_id = slots[0].id.clone();

        assert!(service.remove(&slot_id).await.expect("remove"));
        assert!(service
            .slots()
            .expect("snapshot")
            .iter()
            .all(|slot| slot.id != slot_id));
        assert!(!service.is_unconfirmed(&slot_id).expect("tag check"));
        assert!(!service.remove(&slot_id).await.expect("second remove"));
    }

    #[tokio::test]
    async fn failed_delete_tags_removed_slot_until_reload() {
        let (store, service) = service();
        let profile = sample_profile();
        let slots = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("seed day");
        let slot_id = slots[0].id.clone();

        store.failing_deletes.store(1, Ordering::SeqCst);
        assert!(service.remove(&slot_id).await.expect("remove"));
        assert!(service
            .slots()
            .expect("snapshot")
            .iter()
            .all(|slot| slot.id != slot_id));
        assert!(service.is_unconfirmed(&slot_id).expect("tag check"));

        // The store never saw the delete; the slot comes back on reload and
        // the tag clears with it.
        let reloaded = service
            .reload("prf-1", "2026-03-02")
            .await
            .expect("reload");
        assert!(reloaded.iter().any(|slot| slot.id == slot_id));
        assert!(!service.is_unconfirmed(&slot_id).expect("tag cleared"));
    }

    #[tokio::test]
    async fn clear_day_empties_the_view() {
        let (_store, service) = service();
        let profile = sample_profile();
        service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("seed day");

        let removed = service
            .clear_day("prf-1", "2026-03-02")
            .await
            .expect("clear");
        assert_eq!(removed, 3);
        assert!(service.slots().expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn edits_use_short_video_type_from_config() {
        let (_store, service) = service();
        let mut profile = sample_profile();
        profile.config.video_type = VideoType::Short;
        profile.config.videos_per_day = 1;

        let slots = service
            .regenerate(&profile, "2026-03-02")
            .await
            .expect("regenerate");
        assert_eq!(slots[0].video_type, VideoType::Short);
    }
}
