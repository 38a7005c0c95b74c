use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Abstract quality level a client can request
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QualityProfile {
    Light,
    Balanced,
    Maximum,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown quality level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for QualityProfile {
    type Err = UnknownLevel;

    /// Accepts the profile names plus the `low`/`medium`/`high` names the
    /// upload form sends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" | "low" => Ok(QualityProfile::Light),
            "balanced" | "medium" => Ok(QualityProfile::Balanced),
            "maximum" | "high" => Ok(QualityProfile::Maximum),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

impl QualityProfile {
    /// Parse a requested level, falling back to `Balanced` for anything
    /// unrecognised (including an absent level).
    pub fn parse_or_default(level: Option<&str>) -> Self {
        match level {
            None => QualityProfile::Balanced,
            Some(raw) => raw.parse().unwrap_or_else(|err: UnknownLevel| {
                warn!("{}, falling back to balanced", err);
                QualityProfile::Balanced
            }),
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityProfile::Light => "light",
            QualityProfile::Balanced => "balanced",
            QualityProfile::Maximum => "maximum",
        };
        f.write_str(name)
    }
}

/// Speed/quality trade-off handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedPreset {
    Balanced,
    Thorough,
}

impl SpeedPreset {
    /// Name of the matching x264 preset
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            SpeedPreset::Balanced => "medium",
            SpeedPreset::Thorough => "slow",
        }
    }
}

/// Engine invocation parameters resolved from a quality profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParameters {
    pub quality_factor: u8,
    pub speed_preset: SpeedPreset,
    pub audio_bitrate_kbps: u16,
}

impl EngineParameters {
    pub fn audio_bitrate(&self) -> String {
        format!("{}k", self.audio_bitrate_kbps)
    }
}

/// Map a profile to its fixed engine parameters
pub fn resolve(profile: QualityProfile) -> EngineParameters {
    let (quality_factor, speed_preset, audio_bitrate_kbps) = match profile {
        QualityProfile::Light => (23, SpeedPreset::Balanced, 128),
        QualityProfile::Balanced => (28, SpeedPreset::Balanced, 96),
        QualityProfile::Maximum => (32, SpeedPreset::Thorough, 64),
    };

    EngineParameters {
        quality_factor,
        speed_preset,
        audio_bitrate_kbps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn expected(profile: QualityProfile) -> (u8, &'static str, &'static str) {
        match profile {
            QualityProfile::Light => (23, "medium", "128k"),
            QualityProfile::Balanced => (28, "medium", "96k"),
            QualityProfile::Maximum => (32, "slow", "64k"),
        }
    }

    #[test]
    fn test_resolve_table() {
        for profile in [QualityProfile::Light, QualityProfile::Balanced, QualityProfile::Maximum] {
            let params = resolve(profile);
            let (crf, preset, audio) = expected(profile);
            assert_eq!(params.quality_factor, crf);
            assert_eq!(params.speed_preset.ffmpeg_name(), preset);
            assert_eq!(params.audio_bitrate(), audio);
        }
    }

    #[test]
    fn test_parse_accepts_form_names() {
        assert_eq!("low".parse::<QualityProfile>().unwrap(), QualityProfile::Light);
        assert_eq!("medium".parse::<QualityProfile>().unwrap(), QualityProfile::Balanced);
        assert_eq!("HIGH".parse::<QualityProfile>().unwrap(), QualityProfile::Maximum);
        assert_eq!(" maximum ".parse::<QualityProfile>().unwrap(), QualityProfile::Maximum);
    }

    #[test]
    fn test_strict_parse_rejects_unknown() {
        let err = "ultra".parse::<QualityProfile>().unwrap_err();
        assert_eq!(err, UnknownLevel("ultra".to_string()));
    }

    #[test]
    fn test_unknown_level_falls_back_to_balanced() {
        assert_eq!(QualityProfile::parse_or_default(Some("ultra")), QualityProfile::Balanced);
        assert_eq!(QualityProfile::parse_or_default(Some("")), QualityProfile::Balanced);
        assert_eq!(QualityProfile::parse_or_default(None), QualityProfile::Balanced);
        assert_eq!(resolve(QualityProfile::parse_or_default(Some("ultra"))), resolve(QualityProfile::Balanced));
    }

    fn any_profile() -> impl Strategy<Value = QualityProfile> {
        prop_oneof![
            Just(QualityProfile::Light),
            Just(QualityProfile::Balanced),
            Just(QualityProfile::Maximum),
        ]
    }

    proptest! {
        /// Resolution never depends on which profiles were resolved before.
        #[test]
        fn test_resolve_is_history_independent(history in prop::collection::vec(any_profile(), 0..32)) {
            for profile in history {
                let params = resolve(profile);
                let (crf, preset, audio) = expected(profile);
                prop_assert_eq!(params.quality_factor, crf);
                prop_assert_eq!(params.speed_preset.ffmpeg_name(), preset);
                prop_assert_eq!(params.audio_bitrate(), audio);
            }
        }
    }
}
