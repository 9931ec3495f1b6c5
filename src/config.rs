// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

use crate::frame::{ChainPolicy, FrameSettings};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Frame Pacer".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// How many frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Ordered preference; FIFO is always the last resort
    pub present_modes: Vec<String>,
    pub prefer_srgb: bool,
    /// Width / height of the content area. Unset = first window aspect.
    pub target_aspect: Option<f32>,
    /// Letterbox bars
    pub clear_color: [f32; 4],
    /// Content area inside the bars
    pub content_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            present_modes: vec!["mailbox".to_string()],
            prefer_srgb: true,
            target_aspect: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            content_color: [0.1, 0.2, 0.8, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Frames in flight, with 0 coerced to 1
    pub fn frames_in_flight(&self) -> usize {
        if self.graphics.frames_in_flight == 0 {
            log::warn!("frames_in_flight = 0 is not allowed, using 1");
            1
        } else {
            self.graphics.frames_in_flight
        }
    }

    /// Present modes in preference order; unknown names are skipped
    pub fn present_modes(&self) -> Vec<vk::PresentModeKHR> {
        self.graphics
            .present_modes
            .iter()
            .filter_map(|name| {
                let mode = parse_present_mode(name);
                if mode.is_none() {
                    log::warn!("Unknown present mode '{}', ignoring", name);
                }
                mode
            })
            .collect()
    }

    pub fn chain_policy(&self) -> ChainPolicy {
        let defaults = ChainPolicy::default();
        ChainPolicy {
            surface_formats: if self.graphics.prefer_srgb {
                defaults.surface_formats
            } else {
                Vec::new()
            },
            present_modes: self.present_modes(),
        }
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            frames_in_flight: self.frames_in_flight(),
            target_aspect: self.graphics.target_aspect,
            clear_color: self.graphics.clear_color,
            policy: self.chain_policy(),
        }
    }
}

pub fn parse_present_mode(name: &str) -> Option<vk::PresentModeKHR> {
    match name.to_lowercase().as_str() {
        "immediate" => Some(vk::PresentModeKHR::IMMEDIATE),
        "mailbox" => Some(vk::PresentModeKHR::MAILBOX),
        "fifo" => Some(vk::PresentModeKHR::FIFO),
        "fifo_relaxed" => Some(vk::PresentModeKHR::FIFO_RELAXED),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.present_modes(), vec![vk::PresentModeKHR::MAILBOX]);
        assert_eq!(config.graphics.target_aspect, None);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            frames_in_flight = 3
            target_aspect = 1.5

            [window]
            title = "Pacing test"
            "#,
        )
        .unwrap();

        assert_eq!(config.frames_in_flight(), 3);
        assert_eq!(config.graphics.target_aspect, Some(1.5));
        assert_eq!(config.window.title, "Pacing test");
        assert_eq!(config.window.height, 720);
        assert!(config.graphics.prefer_srgb);
    }

    #[test]
    fn zero_frames_in_flight_becomes_one() {
        let config = Config::from_toml_str("[graphics]\nframes_in_flight = 0\n").unwrap();
        assert_eq!(config.frames_in_flight(), 1);
        assert_eq!(config.frame_settings().frames_in_flight, 1);
    }

    #[test]
    fn present_mode_list_keeps_order_and_drops_unknown() {
        let config = Config::from_toml_str(
            "[graphics]\npresent_modes = [\"Immediate\", \"vsync\", \"fifo_relaxed\"]\n",
        )
        .unwrap();
        assert_eq!(
            config.present_modes(),
            vec![vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED]
        );
    }

    #[test]
    fn srgb_preference_can_be_disabled() {
        let config = Config::from_toml_str("[graphics]\nprefer_srgb = false\n").unwrap();
        assert!(config.chain_policy().surface_formats.is_empty());
        assert_eq!(
            Config::default().chain_policy().surface_formats,
            ChainPolicy::default().surface_formats
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::from_toml_str("[graphics]\nframes_in_flight = \"two\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("does/not/exist/config.toml").unwrap();
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }
}
