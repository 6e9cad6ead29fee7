use crate::application::ai::{AiService, VideoDetails};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::database::{Database, SlotPatch};
use crate::application::schedule_sync::ScheduleSyncService;
use crate::domain::models::{
    validate_date, ChannelProfile, Language, Platform, ScheduleConfig, Theme, UserConfig,
    VideoSlot,
};
use crate::domain::schedule::HIGH_VOLUME_THRESHOLD;
use crate::infrastructure::config::{load_remote_config, read_user_id, select_store};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::query::Store;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    user_id: String,
    database: Database,
    schedule: ScheduleSyncService,
    runtime: Mutex<SessionRuntime>,
    log_guard: Mutex<()>,
}

impl AppState {
    /// Full bootstrap: workspace directories, default configs, the sqlite
    /// file, and the one-time backend choice.
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let remote = load_remote_config(&bootstrap.config_dir)?;
        let store = select_store(remote, &bootstrap.database_path);
        Self::from_parts(bootstrap.config_dir, bootstrap.database_path, bootstrap.logs_dir, store)
    }

    /// Same bootstrap with an injected backend. Used by embedders and tests.
    pub fn with_store(
        workspace_root: PathBuf,
        store: Arc<dyn Store>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::from_parts(bootstrap.config_dir, bootstrap.database_path, bootstrap.logs_dir, store)
    }

    fn from_parts(
        config_dir: PathBuf,
        database_path: PathBuf,
        logs_dir: PathBuf,
        store: Arc<dyn Store>,
    ) -> Result<Self, InfraError> {
        let user_id = read_user_id(&config_dir)?;
        let database = Database::new(store);
        Ok(Self {
            config_dir,
            database_path,
            logs_dir,
            user_id,
            database: database.clone(),
            schedule: ScheduleSyncService::new(database),
            runtime: Mutex::new(SessionRuntime::default()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn schedule(&self) -> &ScheduleSyncService {
        &self.schedule
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug)]
struct SessionRuntime {
    profiles: Vec<ChannelProfile>,
    active_profile_id: Option<String>,
    selected_date: String,
}

impl Default for SessionRuntime {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            active_profile_id: None,
            selected_date: Utc::now().date_naive().to_string(),
        }
    }
}

impl SessionRuntime {
    fn active_profile(&self) -> Option<ChannelProfile> {
        let active_id = self.active_profile_id.as_deref()?;
        self.profiles
            .iter()
            .find(|profile| profile.id == active_id)
            .cloned()
    }

    /// Keeps the current selection when it still exists, otherwise falls to
    /// the first profile, and to none when no profiles remain.
    fn reconcile_active(&mut self) {
        let still_present = self
            .active_profile_id
            .as_deref()
            .map(|active_id| self.profiles.iter().any(|profile| profile.id == active_id))
            .unwrap_or(false);
        if !still_present {
            self.active_profile_id = self.profiles.first().map(|profile| profile.id.clone());
        }
    }
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, SessionRuntime>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::Store(format!("session lock poisoned: {error}")))
}

fn required_active_context(state: &AppState) -> Result<(ChannelProfile, String), InfraError> {
    let runtime = lock_runtime(state)?;
    let profile = runtime
        .active_profile()
        .ok_or_else(|| InfraError::Validation("no active profile".to_string()))?;
    Ok((profile, runtime.selected_date.clone()))
}

pub async fn load_profiles_impl(state: &AppState) -> Result<Vec<ChannelProfile>, InfraError> {
    let profiles = state.database.list_profiles(state.user_id()).await?;
    {
        let mut runtime = lock_runtime(state)?;
        runtime.profiles = profiles.clone();
        runtime.reconcile_active();
    }
    state.log_info("load_profiles", &format!("loaded {} profiles", profiles.len()));
    Ok(profiles)
}

pub fn set_active_profile_impl(
    state: &AppState,
    profile_id: String,
) -> Result<ChannelProfile, InfraError> {
    let profile_id = profile_id.trim();
    if profile_id.is_empty() {
        return Err(InfraError::Validation(
            "profile_id must not be empty".to_string(),
        ));
    }

    let mut runtime = lock_runtime(state)?;
    let Some(profile) = runtime
        .profiles
        .iter()
        .find(|profile| profile.id == profile_id)
        .cloned()
    else {
        return Err(InfraError::Validation(format!(
            "profile not found: {profile_id}"
        )));
    };
    runtime.active_profile_id = Some(profile.id.clone());
    drop(runtime);

    state.log_info("set_active_profile", &format!("active profile_id={profile_id}"));
    Ok(profile)
}

pub fn set_selected_date_impl(state: &AppState, date: String) -> Result<String, InfraError> {
    let date = date.trim().to_string();
    validate_date(&date, "date").map_err(InfraError::Validation)?;

    let mut runtime = lock_runtime(state)?;
    runtime.selected_date = date.clone();
    drop(runtime);
    Ok(date)
}

pub async fn create_profile_impl(
    state: &AppState,
    name: String,
    platform: Platform,
    config: Option<ScheduleConfig>,
) -> Result<ChannelProfile, InfraError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InfraError::Validation(
            "profile name must not be empty".to_string(),
        ));
    }

    let profile = ChannelProfile {
        id: next_id("prf"),
        user_id: state.user_id().to_string(),
        name: name.to_string(),
        platform,
        config: config.unwrap_or_default(),
    };
    let created = state.database.create_profile(profile).await?;

    {
        let mut runtime = lock_runtime(state)?;
        runtime.profiles.push(created.clone());
        if runtime.active_profile_id.is_none() {
            runtime.active_profile_id = Some(created.id.clone());
        }
    }

    state.log_info("create_profile", &format!("created profile_id={}", created.id));
    Ok(created)
}

pub async fn update_profile_config_impl(
    state: &AppState,
    profile_id: String,
    config: ScheduleConfig,
) -> Result<ChannelProfile, InfraError> {
    let profile_id = profile_id.trim();
    if profile_id.is_empty() {
        return Err(InfraError::Validation(
            "profile_id must not be empty".to_string(),
        ));
    }

    let updated = state
        .database
        .update_profile_config(profile_id, &config)
        .await?
        .ok_or_else(|| InfraError::Validation(format!("profile not found: {profile_id}")))?;

    {
        let mut runtime = lock_runtime(state)?;
        if let Some(existing) = runtime
            .profiles
            .iter_mut()
            .find(|profile| profile.id == profile_id)
        {
            *existing = updated.clone();
        }
    }

    state.log_info(
        "update_profile_config",
        &format!("updated config for profile_id={profile_id}"),
    );
    Ok(updated)
}

pub async fn delete_profile_impl(state: &AppState, profile_id: String) -> Result<bool, InfraError> {
    let profile_id = profile_id.trim();
    if profile_id.is_empty() {
        return Err(InfraError::Validation(
            "profile_id must not be empty".to_string(),
        ));
    }

    let removed = state.database.delete_profile(profile_id).await?;
    {
        let mut runtime = lock_runtime(state)?;
        runtime.profiles.retain(|profile| profile.id != profile_id);
        runtime.reconcile_active();
    }

    state.log_info("delete_profile", &format!("deleted profile_id={profile_id}"));
    Ok(removed)
}

pub async fn load_schedule_impl(state: &AppState) -> Result<Vec<VideoSlot>, InfraError> {
    let (profile, date) = required_active_context(state)?;
    state.schedule.reload(&profile.id, &date).await
}

/// Replaces the active profile's schedule for the selected date. Counts above
/// the high-volume threshold must arrive pre-confirmed.
pub async fn generate_schedule_impl(
    state: &AppState,
    confirmed: bool,
) -> Result<Vec<VideoSlot>, InfraError> {
    let (profile, date) = required_active_context(state)?;
    let count = profile.config.videos_per_day;
    if count > HIGH_VOLUME_THRESHOLD && !confirmed {
        return Err(InfraError::Validation(format!(
            "generating {count} slots requires confirmation"
        )));
    }

    let slots = state.schedule.regenerate(&profile, &date).await?;
    state.log_info(
        "generate_schedule",
        &format!("generated {} slots for profile_id={} date={date}", slots.len(), profile.id),
    );
    Ok(slots)
}

pub async fn update_slot_impl(
    state: &AppState,
    slot_id: String,
    patch: SlotPatch,
) -> Result<VideoSlot, InfraError> {
    let slot_id = slot_id.trim();
    if slot_id.is_empty() {
        return Err(InfraError::Validation(
            "slot_id must not be empty".to_string(),
        ));
    }
    let updated = state.schedule.apply_edit(slot_id, patch).await?;
    state.log_info("update_slot", &format!("updated slot_id={slot_id}"));
    Ok(updated)
}

pub async fn toggle_slot_status_impl(
    state: &AppState,
    slot_id: String,
) -> Result<VideoSlot, InfraError> {
    let slot_id = slot_id.trim();
    let current = state
        .schedule
        .slots()?
        .into_iter()
        .find(|slot| slot.id == slot_id)
        .ok_or_else(|| InfraError::Validation(format!("slot not found: {slot_id}")))?;

    let patch = SlotPatch {
        status: Some(current.status.toggled()),
        ..SlotPatch::default()
    };
    state.schedule.apply_edit(slot_id, patch).await
}

pub async fn delete_slot_impl(state: &AppState, slot_id: String) -> Result<bool, InfraError> {
    let slot_id = slot_id.trim();
    if slot_id.is_empty() {
        return Err(InfraError::Validation(
            "slot_id must not be empty".to_string(),
        ));
    }
    let removed = state.schedule.remove(slot_id).await?;
    if removed {
        if state.schedule.is_unconfirmed(slot_id)? {
            state.log_error(
                "delete_slot",
                &format!("store delete unconfirmed for slot_id={slot_id}"),
            );
        } else {
            state.log_info("delete_slot", &format!("deleted slot_id={slot_id}"));
        }
    }
    Ok(removed)
}

/// Destructive; the caller must confirm before this runs.
pub async fn clear_schedule_impl(state: &AppState, confirmed: bool) -> Result<usize, InfraError> {
    if !confirmed {
        return Err(InfraError::Validation(
            "clearing the schedule requires confirmation".to_string(),
        ));
    }
    let (profile, date) = required_active_context(state)?;
    let removed = state.schedule.clear_day(&profile.id, &date).await?;
    state.log_info(
        "clear_schedule",
        &format!("cleared {removed} slots for profile_id={} date={date}", profile.id),
    );
    Ok(removed)
}

pub async fn load_user_config_impl(state: &AppState) -> Result<UserConfig, InfraError> {
    let loaded = state.database.load_user_config(state.user_id()).await?;
    Ok(loaded.unwrap_or_else(|| UserConfig::default_for(state.user_id())))
}

pub async fn set_theme_impl(state: &AppState, theme: Theme) -> Result<UserConfig, InfraError> {
    let mut config = load_user_config_impl(state).await?;
    config.theme = theme;
    state.database.save_user_config(&config).await
}

pub async fn set_language_impl(
    state: &AppState,
    language: Language,
) -> Result<UserConfig, InfraError> {
    let mut config = load_user_config_impl(state).await?;
    config.language = language;
    state.database.save_user_config(&config).await
}

/// Drafts a title and description for one slot. The loading flag is visible
/// while the request runs and is always reset, success or not.
pub async fn request_video_details_impl(
    state: &AppState,
    ai: &dyn AiService,
    slot_id: String,
) -> Result<VideoSlot, InfraError> {
    let slot_id = slot_id.trim().to_string();
    let slot = state
        .schedule
        .slots()?
        .into_iter()
        .find(|slot| slot.id == slot_id)
        .ok_or_else(|| InfraError::Validation(format!("slot not found: {slot_id}")))?;
    if slot.topic.trim().is_empty() {
        return Err(InfraError::Validation(
            "slot has no topic to generate from".to_string(),
        ));
    }

    state.schedule.set_ai_loading(&slot_id, true)?;
    let generated = ai
        .generate_video_details(&slot.topic, active_platform(state, &slot)?, slot.video_type)
        .await;
    state.schedule.set_ai_loading(&slot_id, false)?;

    let VideoDetails { title, description } = match generated {
        Ok(details) => details,
        Err(error) => {
            state.log_error("request_video_details", &error.to_string());
            return Err(error);
        }
    };

    let patch = SlotPatch {
        title: Some(title),
        description: Some(description),
        ..SlotPatch::default()
    };
    let updated = state.schedule.apply_edit(&slot_id, patch).await?;
    state.log_info(
        "request_video_details",
        &format!("drafted details for slot_id={slot_id}"),
    );
    Ok(updated)
}

fn active_platform(state: &AppState, slot: &VideoSlot) -> Result<Platform, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(runtime
        .profiles
        .iter()
        .find(|profile| profile.id == slot.profile_id)
        .map(|profile| profile.platform)
        .unwrap_or(Platform::Youtube))
}

pub async fn analyze_schedule_impl(
    state: &AppState,
    ai: &dyn AiService,
) -> Result<String, InfraError> {
    let slots = state.schedule.slots()?;
    Ok(ai.analyze_schedule(&slots).await)
}
