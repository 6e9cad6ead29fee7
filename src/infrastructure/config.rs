use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_store::SqliteLocalStore;
use crate::infrastructure::query::Store;
use crate::infrastructure::remote_store::RemoteStore;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const APP_JSON: &str = "app.json";
const DEFAULT_USER_ID: &str = "local-user";

const REMOTE_URL_ENV: &str = "POSTPLAN_REMOTE_URL";
const REMOTE_KEY_ENV: &str = "POSTPLAN_REMOTE_KEY";

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let value = serde_json::json!({
            "schema": 1,
            "appName": "PostPlan",
            "userId": DEFAULT_USER_ID,
            "remoteUrl": null,
            "remoteKey": null
        });
        let formatted = serde_json::to_string_pretty(&value)?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_user_id(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("userId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
}

pub fn load_remote_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<RemoteConfig> {
    let url = lookup(REMOTE_URL_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    let api_key = lookup(REMOTE_KEY_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    Some(RemoteConfig { url, api_key })
}

/// Remote credentials come from the environment first, then from `app.json`.
/// Absent or blank credentials mean the local emulation backend.
pub fn load_remote_config(config_dir: &Path) -> Result<Option<RemoteConfig>, InfraError> {
    if let Some(remote) = load_remote_config_from_lookup(|key| std::env::var(key).ok()) {
        return Ok(Some(remote));
    }

    let app = read_config(&config_dir.join(APP_JSON))?;
    let field = |name: &str| {
        app.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };
    match (field("remoteUrl"), field("remoteKey")) {
        (Some(url), Some(api_key)) => Ok(Some(RemoteConfig { url, api_key })),
        _ => Ok(None),
    }
}

/// Boot-time backend choice. Made exactly once; the rest of the crate only
/// ever sees `Arc<dyn Store>`. Credentials that are present but unusable
/// (malformed URL, blank key) fall back to the local store rather than
/// leaving the app without persistence.
pub fn select_store(remote: Option<RemoteConfig>, database_path: &Path) -> Arc<dyn Store> {
    if let Some(remote) = remote {
        if let Ok(store) = RemoteStore::new(&remote.url, &remote.api_key) {
            return Arc::new(store);
        }
    }
    Arc::new(SqliteLocalStore::new(database_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn lookup_requires_both_credentials() {
        let none = load_remote_config_from_lookup(|_| None);
        assert!(none.is_none());

        let url_only = load_remote_config_from_lookup(|key| match key {
            "POSTPLAN_REMOTE_URL" => Some("https://planner.example.com".to_string()),
            _ => None,
        });
        assert!(url_only.is_none());

        let both = load_remote_config_from_lookup(|key| match key {
            "POSTPLAN_REMOTE_URL" => Some("https://planner.example.com".to_string()),
            "POSTPLAN_REMOTE_KEY" => Some("service-key".to_string()),
            _ => None,
        });
        assert_eq!(
            both,
            Some(RemoteConfig {
                url: "https://planner.example.com".to_string(),
                api_key: "service-key".to_string(),
            })
        );
    }

    #[test]
    fn blank_credentials_count_as_absent() {
        let blank = load_remote_config_from_lookup(|key| match key {
            "POSTPLAN_REMOTE_URL" => Some("   ".to_string()),
            "POSTPLAN_REMOTE_KEY" => Some("service-key".to_string()),
            _ => None,
        });
        assert!(blank.is_none());
    }

    #[test]
    fn unusable_credentials_fall_back_to_local() {
        let database_path = PathBuf::from("planner.sqlite");
        let remote = Some(RemoteConfig {
            url: "not a url".to_string(),
            api_key: "key".to_string(),
        });
        // Falls back instead of failing bootstrap; the store itself is only
        // touched on first use.
        let _store = select_store(remote, &database_path);
    }

    #[test]
    fn defaults_are_written_once() {
        let dir = std::env::temp_dir().join(format!(
            "postplan-config-tests-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp config dir");

        ensure_default_configs(&dir).expect("write defaults");
        assert_eq!(read_user_id(&dir).expect("read user id"), "local-user");
        assert!(load_remote_config(&dir).expect("load remote config").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
