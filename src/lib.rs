pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::ai::{
    load_gemini_api_key, load_gemini_api_key_from_lookup, AiService, GeminiAiClient, VideoDetails,
};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::database::{Database, SlotPatch};
pub use application::schedule_sync::ScheduleSyncService;
pub use application::session::{
    analyze_schedule_impl, clear_schedule_impl, create_profile_impl, delete_profile_impl,
    delete_slot_impl, generate_schedule_impl, load_profiles_impl, load_schedule_impl,
    load_user_config_impl, request_video_details_impl, set_active_profile_impl,
    set_language_impl, set_selected_date_impl, set_theme_impl, toggle_slot_status_impl,
    update_profile_config_impl, update_slot_impl, AppState,
};
pub use domain::models::{
    ChannelProfile, Language, Platform, ScheduleConfig, Theme, UserConfig, VideoSlot, VideoStatus,
    VideoType,
};
pub use domain::schedule::{generate_slot_times, HIGH_VOLUME_THRESHOLD};
pub use domain::time_codec::{minutes_to_time, time_to_minutes};
pub use infrastructure::config::{
    ensure_default_configs, load_remote_config, select_store, RemoteConfig,
};
pub use infrastructure::error::InfraError;
pub use infrastructure::local_store::{InMemoryStore, SqliteLocalStore};
pub use infrastructure::query::{Direction, Query, Store};
pub use infrastructure::remote_store::RemoteStore;
