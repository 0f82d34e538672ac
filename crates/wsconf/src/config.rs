//
// config.rs
//
// Settings that control where workspace configuration lives and how it reloads
//

/// Default debounce delay between a change event and the reload it triggers
pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 50;

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Settings root folder, relative to the workspace root
    pub settings_folder: String,
    /// Name of the canonical workspace settings file inside the settings folder
    pub settings_file: String,
    /// Recognised configuration-file extension (without the dot)
    pub extension: String,
    /// Quiet period before a scheduled reload fires, in milliseconds
    pub reload_debounce_ms: u64,
    /// File stems whose contents are consolidated under their own key
    /// instead of at the root (e.g. `launch.json` → `{"launch": ...}`)
    pub standalone_sections: Vec<String>,
}

impl Default for LoaderConfig {
    /// Defaults mirror the conventional editor layout: `.vscode/settings.json`,
    /// JSON files only, a 50ms reload debounce, and `launch`/`tasks` kept
    /// under their own keys.
    ///
    /// # Examples
    ///
    /// ```
    /// let cfg = wsconf::LoaderConfig::default();
    /// assert_eq!(cfg.settings_path(), ".vscode/settings.json");
    /// assert_eq!(cfg.reload_debounce_ms, 50);
    /// ```
    fn default() -> Self {
        Self {
            settings_folder: ".vscode".to_string(),
            settings_file: "settings.json".to_string(),
            extension: "json".to_string(),
            reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE_MS,
            standalone_sections: vec!["launch".to_string(), "tasks".to_string()],
        }
    }
}

impl LoaderConfig {
    /// Build a config from a JSON settings object, keeping defaults for
    /// anything missing or malformed.
    pub fn from_settings(settings: &serde_json::Value) -> Self {
        let mut config = Self::default();

        if let Some(v) = settings
            .get("settingsFolder")
            .and_then(|v| v.as_str())
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
        {
            config.settings_folder = v.to_string();
        }
        if let Some(v) = settings
            .get("settingsFile")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty() && !s.contains('/'))
        {
            config.settings_file = v.to_string();
        }
        if let Some(v) = settings
            .get("extension")
            .and_then(|v| v.as_str())
            .map(|s| s.trim_start_matches('.'))
            .filter(|s| !s.is_empty())
        {
            config.extension = v.to_string();
        }
        if let Some(v) = settings.get("reloadDebounceMs").and_then(|v| v.as_u64()) {
            config.reload_debounce_ms = v;
        }
        if let Some(sections) = settings
            .get("standaloneSections")
            .and_then(|v| v.as_array())
        {
            config.standalone_sections = sections
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect();
        }

        log::trace!("Loader config: {:?}", config);
        config
    }

    /// Workspace-relative path of the canonical settings file
    pub fn settings_path(&self) -> String {
        format!("{}/{}", self.settings_folder, self.settings_file)
    }

    /// Whether `relative_path` names a configuration file directly inside
    /// the settings folder
    pub fn is_config_file(&self, relative_path: &str) -> bool {
        let Some(name) = relative_path
            .strip_prefix(self.settings_folder.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return false;
        };
        !name.contains('/') && self.has_config_extension(name)
    }

    /// Whether a file name carries the configuration extension
    pub fn has_config_extension(&self, file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext == self.extension)
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reload_debounce_ms)
    }
}
