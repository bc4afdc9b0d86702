//! Effect chain entries.

use std::collections::BTreeMap;

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

/// Closed set of effect processors the signal graph knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    Equalizer,
    Compressor,
    Delay,
    Reverb,
    Distortion,
    Filter,
}

/// Static description of one effect parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParamInfo {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

const fn param(name: &'static str, min: f32, max: f32, default: f32) -> EffectParamInfo {
    EffectParamInfo { name, min, max, default }
}

static EQUALIZER_PARAMS: &[EffectParamInfo] = &[
    param("low", -24.0, 24.0, 0.0),
    param("mid", -24.0, 24.0, 0.0),
    param("high", -24.0, 24.0, 0.0),
];

static COMPRESSOR_PARAMS: &[EffectParamInfo] = &[
    param("threshold", -60.0, 0.0, -24.0),
    param("ratio", 1.0, 20.0, 4.0),
    param("attack", 0.0, 1.0, 0.003),
    param("release", 0.0, 1.0, 0.25),
];

static DELAY_PARAMS: &[EffectParamInfo] = &[
    param("time", 0.001, 2.0, 0.25),
    param("feedback", 0.0, 0.95, 0.3),
    param("mix", 0.0, 1.0, 0.3),
];

static REVERB_PARAMS: &[EffectParamInfo] = &[
    param("decay", 0.0, 0.98, 0.7),
    param("mix", 0.0, 1.0, 0.3),
];

static DISTORTION_PARAMS: &[EffectParamInfo] = &[
    param("drive", 1.0, 50.0, 4.0),
    param("mix", 0.0, 1.0, 1.0),
];

static FILTER_PARAMS: &[EffectParamInfo] = &[param("cutoff", 20.0, 20000.0, 2000.0)];

impl EffectKind {
    /// Every kind, in declaration order.
    pub const ALL: [EffectKind; 6] = [
        EffectKind::Equalizer,
        EffectKind::Compressor,
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::Distortion,
        EffectKind::Filter,
    ];

    /// Resolve a host-supplied effect tag. Case-insensitive; unknown tags
    /// return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Equalizer => "equalizer",
            EffectKind::Compressor => "compressor",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
            EffectKind::Distortion => "distortion",
            EffectKind::Filter => "filter",
        }
    }

    pub fn params(self) -> &'static [EffectParamInfo] {
        match self {
            EffectKind::Equalizer => EQUALIZER_PARAMS,
            EffectKind::Compressor => COMPRESSOR_PARAMS,
            EffectKind::Delay => DELAY_PARAMS,
            EffectKind::Reverb => REVERB_PARAMS,
            EffectKind::Distortion => DISTORTION_PARAMS,
            EffectKind::Filter => FILTER_PARAMS,
        }
    }

    pub fn param(self, name: &str) -> Option<&'static EffectParamInfo> {
        self.params().iter().find(|p| p.name == name)
    }

    /// Clamp a parameter into its declared range. Unknown names pass through.
    pub fn clamp_param(self, name: &str, value: f32) -> f32 {
        match self.param(name) {
            Some(info) if value.is_nan() => info.default,
            Some(info) => value.clamp(info.min, info.max),
            None => value,
        }
    }

    /// Full parameter set for this kind: defaults overlaid with `overrides`
    /// (clamped). Override names the kind does not declare are dropped.
    pub fn resolve_params(self, overrides: &BTreeMap<String, f32>) -> BTreeMap<String, f32> {
        self.params()
            .iter()
            .map(|info| {
                let value = overrides
                    .get(info.name)
                    .map_or(info.default, |v| self.clamp_param(info.name, *v));
                (info.name.to_string(), value)
            })
            .collect()
    }
}

/// One entry of a track's effect chain as stored in the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Effect tag; may name an effect this engine does not support
    #[serde(deserialize_with = "crate::text::truncated")]
    pub name: ArrayString<24>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

fn enabled_default() -> bool {
    true
}

impl EffectSpec {
    /// An enabled effect of a known kind with default parameters.
    pub fn new(kind: EffectKind) -> Self {
        Self::named(kind.name())
    }

    /// An enabled effect by tag (may be unknown).
    pub fn named(name: &str) -> Self {
        Self {
            name: crate::text::label(name),
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }

    /// Builder-style parameter override.
    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> Option<EffectKind> {
        EffectKind::from_name(&self.name)
    }
}
