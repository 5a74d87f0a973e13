//! Engine configuration.
//!
//! An [`EngineConfig`] is resolved once when the engine is built and is
//! read-only afterwards. Per-page differences (which selectors to touch, how
//! aggressive to be) are expressed as different config values or presets,
//! never as code.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dom::parse_selector;
use crate::error::{Error, Result};

/// Viewport widths (px) separating the mobile, tablet, desktop, and wide tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoints {
    pub mobile: u32,
    pub tablet: u32,
    pub desktop: u32,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            mobile: 768,
            tablet: 1024,
            desktop: 1200,
        }
    }
}

/// Intensity used below the mobile and tablet breakpoints. Desktop and wide
/// viewports use [`EngineConfig::intensity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierIntensity {
    pub mobile: u8,
    pub tablet: u8,
}

impl Default for TierIntensity {
    fn default() -> Self {
        Self {
            mobile: 85,
            tablet: 70,
        }
    }
}

/// Minimum intensity at which each property group is mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupThresholds {
    pub text: u8,
    pub spacing: u8,
    pub float: u8,
    pub flex: u8,
    pub corners: u8,
}

impl Default for GroupThresholds {
    fn default() -> Self {
        Self {
            text: 0,
            spacing: 40,
            float: 50,
            flex: 70,
            corners: 80,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Which elements the engine visits. The first four groups are walked and
/// transformed; `preserve_ltr` elements are walked too but are pinned LTR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectorConfig {
    pub default: Vec<String>,
    pub interactive: Vec<String>,
    pub layout: Vec<String>,
    pub custom: Vec<String>,
    pub preserve_ltr: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            default: strings(&[
                "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "label", "td", "th",
                "span", "a",
            ]),
            interactive: strings(&[
                "button", "input", "textarea", "select", ".btn", "[role=button]",
            ]),
            layout: strings(&[
                "div", "section", "article", "header", "footer", "nav", "main", "aside", "ul", "ol",
                "form",
            ]),
            custom: Vec::new(),
            preserve_ltr: strings(&["pre", "code", "kbd", "samp"]),
        }
    }
}

impl SelectorConfig {
    /// Named target groups in a fixed order, for per-group reporting.
    pub fn groups(&self) -> [(&'static str, &[String]); 5] {
        [
            ("default", self.default.as_slice()),
            ("interactive", self.interactive.as_slice()),
            ("layout", self.layout.as_slice()),
            ("custom", self.custom.as_slice()),
            ("preserveLtr", self.preserve_ltr.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Intensity (0-100) for desktop and wide viewports.
    pub intensity: u8,
    pub breakpoints: Breakpoints,
    pub tier_intensity: TierIntensity,
    pub thresholds: GroupThresholds,
    pub selectors: SelectorConfig,
    /// Quiet period after the first mutation record before added nodes are processed.
    pub throttle_delay_ms: u64,
    /// Resize events closer together than this collapse into one recomputation.
    pub debounce_delay_ms: u64,
    /// Elements processed between yield points.
    pub batch_size: usize,
    /// Value written to `lang` on RTL elements.
    pub language: String,
    /// Viewport width assumed until the first resize.
    pub viewport_width: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intensity: 60,
            breakpoints: Breakpoints::default(),
            tier_intensity: TierIntensity::default(),
            thresholds: GroupThresholds::default(),
            selectors: SelectorConfig::default(),
            throttle_delay_ms: 100,
            debounce_delay_ms: 250,
            batch_size: 40,
            language: "he".to_string(),
            viewport_width: 1280,
        }
    }
}

impl EngineConfig {
    pub fn preset(preset: Preset) -> Self {
        let base = Self::default();
        match preset {
            Preset::Balanced => base,
            Preset::TextOnly => Self {
                intensity: 30,
                tier_intensity: TierIntensity { mobile: 30, tablet: 30 },
                ..base
            },
            Preset::Full => Self {
                intensity: 100,
                tier_intensity: TierIntensity {
                    mobile: 100,
                    tablet: 100,
                },
                ..base
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently misbehave.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(Error::InvalidConfig(msg)) };

        for (name, value) in [
            ("intensity", self.intensity),
            ("tierIntensity.mobile", self.tier_intensity.mobile),
            ("tierIntensity.tablet", self.tier_intensity.tablet),
            ("thresholds.text", self.thresholds.text),
            ("thresholds.spacing", self.thresholds.spacing),
            ("thresholds.float", self.thresholds.float),
            ("thresholds.flex", self.thresholds.flex),
            ("thresholds.corners", self.thresholds.corners),
        ] {
            if value > 100 {
                return invalid(format!("{name} must be within 0-100, got {value}"));
            }
        }

        let tiers = &self.tier_intensity;
        if tiers.mobile < tiers.tablet || tiers.tablet < self.intensity {
            return invalid(format!(
                "intensity must not increase with viewport width (mobile {} >= tablet {} >= desktop {})",
                tiers.mobile, tiers.tablet, self.intensity
            ));
        }

        let bp = &self.breakpoints;
        if bp.mobile == 0 || bp.mobile >= bp.tablet || bp.tablet >= bp.desktop {
            return invalid(format!(
                "breakpoints must be strictly increasing and non-zero, got {}/{}/{}",
                bp.mobile, bp.tablet, bp.desktop
            ));
        }

        if self.batch_size == 0 {
            return invalid("batchSize must be at least 1".to_string());
        }
        if self.language.trim().is_empty() {
            return invalid("language must not be empty".to_string());
        }

        let mut targets = 0;
        for (group, selectors) in self.selectors.groups() {
            for css in selectors {
                parse_selector(css)
                    .map_err(|e| Error::InvalidConfig(format!("selectors.{group}: {e}")))?;
            }
            if group != "preserveLtr" {
                targets += selectors.len();
            }
        }
        if targets == 0 {
            return invalid("at least one target selector is required".to_string());
        }

        Ok(())
    }
}

/// Named alternate configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    #[default]
    Balanced,
    /// Direction and alignment only, at every viewport.
    TextOnly,
    /// Every property group, at every viewport.
    Full,
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "balanced" => Ok(Self::Balanced),
            "text-only" => Ok(Self::TextOnly),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "unknown preset {other:?} (expected balanced, text-only, or full)"
            )),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Balanced => "balanced",
            Self::TextOnly => "text-only",
            Self::Full => "full",
        })
    }
}

/// `<config_dir>/rtl-mirror/config.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rtl-mirror").join("config.json"))
}

/// Load and validate a config file. Without an explicit path the user config
/// directory is tried, then the built-in defaults.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_path().filter(|p| p.is_file()),
    };

    let Some(path) = path else {
        debug!("no config file, using defaults");
        return Ok(EngineConfig::default());
    };

    let json = std::fs::read_to_string(&path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;
    let config = EngineConfig::from_json(&json)?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.intensity, 60);
        assert_eq!(c.breakpoints, Breakpoints { mobile: 768, tablet: 1024, desktop: 1200 });
        assert_eq!(c.debounce_delay_ms, 250);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn missing_keys_default_and_unknown_keys_are_ignored() {
        let json = r#"{"batchSize": 50, "sparkle": true, "breakpoints": {"mobile": 600}}"#;
        let c = EngineConfig::from_json(json).unwrap();
        assert_eq!(c.batch_size, 50);
        assert_eq!(c.breakpoints.mobile, 600);
        assert_eq!(c.breakpoints.tablet, 1024);
        assert_eq!(c.intensity, 60);
    }

    #[test]
    fn negative_intensity_fails_fast() {
        let err = EngineConfig::from_json(r#"{"intensity": -5}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn out_of_range_intensity_is_rejected() {
        let c = EngineConfig {
            intensity: 101,
            tier_intensity: TierIntensity { mobile: 101, tablet: 101 },
            ..Default::default()
        };
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("intensity"), "{err}");
    }

    #[test]
    fn intensity_must_not_grow_with_width() {
        let c = EngineConfig {
            intensity: 90,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn breakpoints_must_increase() {
        let c = EngineConfig {
            breakpoints: Breakpoints { mobile: 1024, tablet: 768, desktop: 1200 },
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn bad_selector_is_named_in_error() {
        let mut c = EngineConfig::default();
        c.selectors.custom.push("div[".to_string());
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("selectors.custom"), "{err}");
    }

    #[test]
    fn zero_batch_and_empty_targets_rejected() {
        let c = EngineConfig { batch_size: 0, ..Default::default() };
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.selectors = SelectorConfig {
            default: vec![],
            interactive: vec![],
            layout: vec![],
            custom: vec![],
            preserve_ltr: vec!["pre".into()],
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn presets_are_valid() {
        for p in [Preset::Balanced, Preset::TextOnly, Preset::Full] {
            assert!(EngineConfig::preset(p).validate().is_ok(), "{p}");
            assert_eq!(p.to_string().parse::<Preset>(), Ok(p));
        }
        assert!("loud".parse::<Preset>().is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"intensity": 40, "language": "yi"}}"#).unwrap();
        let c = load(Some(f.path())).unwrap();
        assert_eq!(c.intensity, 40);
        assert_eq!(c.language, "yi");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
