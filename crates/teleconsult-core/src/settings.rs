use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOKEN_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_LIVEKIT_URL: &str = "ws://localhost:7880";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";

/// Client preferences, persisted as `settings.json` in the host data dir.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    /// Root of the token service.
    #[serde(default = "default_token_api_url")]
    pub token_api_url: String,
    /// LiveKit server used when the token service does not advertise one.
    #[serde(default = "default_livekit_url")]
    pub livekit_url: String,
    /// Origin that shareable meeting links point at.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,
    #[serde(default = "default_true")]
    pub mic_enabled_on_join: bool,
    #[serde(default = "default_true")]
    pub camera_enabled_on_join: bool,
}

fn default_true() -> bool {
    true
}

fn default_token_api_url() -> String {
    DEFAULT_TOKEN_API_URL.to_string()
}

fn default_livekit_url() -> String {
    DEFAULT_LIVEKIT_URL.to_string()
}

fn default_app_origin() -> String {
    DEFAULT_APP_ORIGIN.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            token_api_url: default_token_api_url(),
            livekit_url: default_livekit_url(),
            app_origin: default_app_origin(),
            mic_enabled_on_join: true,
            camera_enabled_on_join: true,
        }
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.update(|s| s.display_name = name.filter(|n| !n.trim().is_empty()));
    }

    pub fn set_token_api_url(&self, url: String) {
        self.update(|s| s.token_api_url = url);
    }

    pub fn set_livekit_url(&self, url: String) {
        self.update(|s| s.livekit_url = url);
    }

    pub fn set_app_origin(&self, origin: String) {
        self.update(|s| s.app_origin = origin);
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.update(|s| s.mic_enabled_on_join = enabled);
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.update(|s| s.camera_enabled_on_join = enabled);
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut settings = self.settings.lock().unwrap();
            apply(&mut settings);
            settings.clone()
        };
        if let Err(e) = self.save(&snapshot) {
            tracing::warn!("failed to persist settings to {}: {e}", self.file_path.display());
        }
    }

    fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.file_path, json)
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable settings file {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
