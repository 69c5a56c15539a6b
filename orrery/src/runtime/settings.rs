use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::coordinator::RecoveryPolicy;
use super::engine::StartupConfig;
use super::render_loop::RenderLoopConfig;

pub const HOST_SETTINGS_VERSION: &str = "1";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RecoverySettings {
    pub max_consecutive: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub grace_frames: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        let policy = RecoveryPolicy::default();
        Self {
            max_consecutive: policy.max_consecutive,
            backoff_ms: policy.backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            grace_frames: policy.grace_frames,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HostSettings {
    pub version: String,
    /// Render at the display's native scale instead of 1:1 logical pixels.
    pub use_full_dpi: bool,
    pub max_fps: Option<f32>,
    /// User override; `default_config_path` is used when unset.
    pub config_path: Option<PathBuf>,
    pub default_config_path: PathBuf,
    pub extra_paths: Vec<PathBuf>,
    pub recovery: RecoverySettings,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            version: HOST_SETTINGS_VERSION.to_string(),
            use_full_dpi: true,
            max_fps: None,
            config_path: None,
            default_config_path: PathBuf::from("celestia.cfg"),
            extra_paths: vec![],
            recovery: RecoverySettings::default(),
        }
    }
}

impl HostSettings {
    pub fn scale_factor(&self, display_scale: f32) -> f32 {
        if self.use_full_dpi && display_scale > 0.0 {
            display_scale
        } else {
            1.0
        }
    }

    pub fn startup_config(&self, display_scale: f32) -> StartupConfig {
        let config_path = self
            .config_path
            .clone()
            .unwrap_or_else(|| self.default_config_path.clone());

        StartupConfig {
            config_path,
            fallback_config_path: Some(self.default_config_path.clone()),
            extra_paths: self.extra_paths.clone(),
            scale_factor: self.scale_factor(display_scale),
        }
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            max_consecutive: self.recovery.max_consecutive,
            backoff: Duration::from_millis(self.recovery.backoff_ms),
            max_backoff: Duration::from_millis(self.recovery.max_backoff_ms),
            grace_frames: self.recovery.grace_frames,
        }
    }

    pub fn render_loop_config(&self, display_scale: f32) -> RenderLoopConfig {
        RenderLoopConfig {
            startup: self.startup_config(display_scale),
            max_fps: self.max_fps,
            recovery: self.recovery_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: HostSettings = serde_json::from_str(
            r#"{ "use_full_dpi": false, "recovery": { "backoff_ms": 0 } }"#,
        )
        .unwrap();

        assert!(!settings.use_full_dpi);
        assert_eq!(settings.version, HOST_SETTINGS_VERSION);
        assert_eq!(settings.recovery.backoff_ms, 0);
        assert_eq!(
            settings.recovery.max_consecutive,
            RecoveryPolicy::default().max_consecutive
        );
    }

    #[test]
    fn scale_factor_respects_full_dpi_flag() {
        let mut settings = HostSettings::default();
        assert_eq!(settings.scale_factor(1.5), 1.5);
        assert_eq!(settings.scale_factor(0.0), 1.0);

        settings.use_full_dpi = false;
        assert_eq!(settings.scale_factor(1.5), 1.0);
    }

    #[test]
    fn startup_config_prefers_override_and_falls_back_to_default() {
        let settings = HostSettings {
            config_path: Some(PathBuf::from("override/celestia.cfg")),
            ..HostSettings::default()
        };

        let startup = settings.startup_config(2.0);
        assert_eq!(startup.config_path, PathBuf::from("override/celestia.cfg"));
        assert_eq!(
            startup.fallback_config_path,
            Some(PathBuf::from("celestia.cfg"))
        );
        assert_eq!(startup.dpi(), 192);
    }

    #[test]
    fn default_settings_reproduce_default_policy() {
        assert_eq!(
            HostSettings::default().recovery_policy(),
            RecoveryPolicy::default()
        );
    }
}
