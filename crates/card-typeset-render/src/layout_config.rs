use std::collections::BTreeMap;
use std::fmt;

use card_typeset::CardFormat;
use serde::{Deserialize, Serialize};

use crate::metrics::{FontMetricsRecord, FontMetricsTable, RubyConfig};
use crate::paint::TextAlign;
use crate::render_engine::{CardLayoutProfile, TextField};

/// Configuration rejected at load time.
#[derive(Debug)]
pub enum ConfigError {
    /// A tolerance table used a line-count key other than 1, 2 or 3.
    UnknownLineCount { key: String },
    /// A tolerance table did not define every line count.
    MissingLineCount { lines: usize },
    /// A width or size was zero, negative or not finite.
    NonPositiveWidth { what: &'static str, value: f32 },
    /// Tolerance thresholds must not shrink as the line count grows.
    DecreasingThreshold { lines: usize, previous: f32, value: f32 },
    EmptyFontTable { family: String },
    InvalidRecord {
        family: String,
        index: usize,
        reason: &'static str,
    },
    UnknownFont { field: &'static str, family: String },
    UnknownFormat { name: String },
    InvalidRubyBonus { value: f32 },
    /// A density factor was zero, negative or not finite.
    InvalidScaleFactor { value: f32 },
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLineCount { key } => {
                write!(f, "unknown tolerance line count '{}' (expected 1, 2 or 3)", key)
            }
            Self::MissingLineCount { lines } => {
                write!(f, "tolerance table is missing the {}-line threshold", lines)
            }
            Self::NonPositiveWidth { what, value } => {
                write!(f, "{} must be positive (got {})", what, value)
            }
            Self::DecreasingThreshold {
                lines,
                previous,
                value,
            } => write!(
                f,
                "{}-line threshold {} is below the previous threshold {}",
                lines, value, previous
            ),
            Self::EmptyFontTable { family } => {
                write!(f, "font table '{}' has no metrics records", family)
            }
            Self::InvalidRecord {
                family,
                index,
                reason,
            } => write!(f, "font table '{}' record {}: {}", family, index, reason),
            Self::UnknownFont { field, family } => {
                write!(f, "field '{}' references unknown font '{}'", field, family)
            }
            Self::UnknownFormat { name } => write!(f, "unknown card format '{}'", name),
            Self::InvalidRubyBonus { value } => {
                write!(f, "ruby bonus ratio must be in [0, 1) (got {})", value)
            }
            Self::InvalidScaleFactor { value } => {
                write!(f, "scale factor must be positive and finite (got {})", value)
            }
            Self::Json(err) => write!(f, "layout profile json: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

pub(crate) fn ensure_scale_factor(value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidScaleFactor { value })
    }
}

pub(crate) fn ensure_positive(what: &'static str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositiveWidth { what, value })
    }
}

/// Named condensation tolerance tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToleranceTier {
    VeryStrict,
    Strict,
    #[default]
    Normal,
    Loose,
    Relaxed,
}

impl ToleranceTier {
    pub const ALL: [Self; 5] = [
        Self::VeryStrict,
        Self::Strict,
        Self::Normal,
        Self::Loose,
        Self::Relaxed,
    ];

    /// Built-in 1/2/3-line width budgets in px at 1x density.
    pub const fn thresholds(self) -> [f32; 3] {
        match self {
            Self::VeryStrict => [600.0, 620.0, 640.0],
            Self::Strict => [640.0, 660.0, 680.0],
            Self::Normal => [680.0, 700.0, 720.0],
            Self::Loose => [720.0, 760.0, 800.0],
            Self::Relaxed => [780.0, 840.0, 900.0],
        }
    }
}

/// Per-line natural-width budgets for 1, 2 and 3 line layouts.
///
/// The line breaker tries the 1-line budget first and escalates through the
/// 2- and 3-line budgets in that fixed order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CondenseTolerance {
    thresholds: [f32; 3],
}

impl Default for CondenseTolerance {
    fn default() -> Self {
        Self::from_tier(ToleranceTier::default())
    }
}

impl From<ToleranceTier> for CondenseTolerance {
    fn from(value: ToleranceTier) -> Self {
        Self::from_tier(value)
    }
}

impl CondenseTolerance {
    /// Number of escalation tiers.
    pub const TIERS: usize = 3;

    pub const fn from_tier(tier: ToleranceTier) -> Self {
        Self {
            thresholds: tier.thresholds(),
        }
    }

    /// Build a custom table from `("1" | "2" | "3", px)` entries.
    pub fn from_thresholds<K, I>(entries: I) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f32)>,
    {
        let mut slots: [Option<f32>; 3] = [None; 3];
        for (key, value) in entries {
            let key = key.as_ref();
            let idx = match key.trim() {
                "1" => 0,
                "2" => 1,
                "3" => 2,
                _ => {
                    return Err(ConfigError::UnknownLineCount {
                        key: key.to_string(),
                    })
                }
            };
            slots[idx] = Some(ensure_positive("tolerance threshold", value)?);
        }
        let mut thresholds = [0.0; 3];
        for (idx, slot) in slots.iter().enumerate() {
            let Some(value) = slot else {
                return Err(ConfigError::MissingLineCount { lines: idx + 1 });
            };
            if idx > 0 && *value < thresholds[idx - 1] {
                return Err(ConfigError::DecreasingThreshold {
                    lines: idx + 1,
                    previous: thresholds[idx - 1],
                    value: *value,
                });
            }
            thresholds[idx] = *value;
        }
        Ok(Self { thresholds })
    }

    /// Budget for an `lines`-line layout; `None` outside 1..=3.
    pub fn threshold(&self, lines: usize) -> Option<f32> {
        lines
            .checked_sub(1)
            .and_then(|idx| self.thresholds.get(idx))
            .copied()
    }

    pub fn thresholds(&self) -> [f32; 3] {
        self.thresholds
    }

    /// Same table at another pixel density.
    pub fn scaled(&self, factor: f32) -> Result<Self, ConfigError> {
        let factor = ensure_scale_factor(factor)?;
        Ok(Self {
            thresholds: self.thresholds.map(|value| value * factor),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToleranceDoc {
    Tier(ToleranceTier),
    Thresholds(BTreeMap<String, f32>),
}

impl ToleranceDoc {
    fn into_tolerance(self) -> Result<CondenseTolerance, ConfigError> {
        match self {
            Self::Tier(tier) => Ok(CondenseTolerance::from_tier(tier)),
            Self::Thresholds(map) => CondenseTolerance::from_thresholds(map),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDoc {
    x: f32,
    baseline_y: f32,
    max_width: f32,
    #[serde(default)]
    align: TextAlign,
    font: String,
    #[serde(default)]
    tolerance: Option<ToleranceDoc>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldsDoc {
    name: FieldDoc,
    effect: FieldDoc,
    #[serde(default)]
    pendulum_effect: Option<FieldDoc>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutProfileDoc {
    format: String,
    #[serde(default)]
    ruby: RubyConfig,
    #[serde(default)]
    tolerance: Option<ToleranceDoc>,
    fonts: BTreeMap<String, Vec<FontMetricsRecord>>,
    fields: FieldsDoc,
}

/// Validated layout configuration for one card format.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutProfile {
    pub format: CardFormat,
    pub ruby: RubyConfig,
    pub fonts: Vec<FontMetricsTable>,
    pub card: CardLayoutProfile,
}

pub(crate) fn parse_format(name: &str) -> Result<CardFormat, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "tcg" => Ok(CardFormat::Tcg),
        "ocg" => Ok(CardFormat::Ocg),
        _ => Err(ConfigError::UnknownFormat {
            name: name.to_string(),
        }),
    }
}

impl LayoutProfile {
    /// Parse and validate a JSON layout profile.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let doc: LayoutProfileDoc = serde_json::from_str(json)?;
        let format = parse_format(&doc.format)?;
        let ruby = doc.ruby.validated()?;
        let default_tolerance = match doc.tolerance {
            Some(tolerance) => tolerance.into_tolerance()?,
            None => CondenseTolerance::default(),
        };

        let mut fonts = Vec::with_capacity(doc.fonts.len());
        for (family, records) in doc.fonts {
            fonts.push(FontMetricsTable::new(family, records)?);
        }

        let build_field = |field: &'static str, doc: FieldDoc| -> Result<TextField, ConfigError> {
            let font = fonts
                .iter()
                .find(|table| table.family() == doc.font)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownFont {
                    field,
                    family: doc.font.clone(),
                })?;
            let tolerance = match doc.tolerance {
                Some(tolerance) => tolerance.into_tolerance()?,
                None => default_tolerance,
            };
            Ok(TextField {
                x: doc.x,
                baseline_y: doc.baseline_y,
                max_width: ensure_positive("field max_width", doc.max_width)?,
                align: doc.align,
                format,
                font,
                tolerance,
                ruby,
            })
        };

        let card = CardLayoutProfile {
            name: build_field("name", doc.fields.name)?,
            effect: build_field("effect", doc.fields.effect)?,
            pendulum_effect: doc
                .fields
                .pendulum_effect
                .map(|field| build_field("pendulum_effect", field))
                .transpose()?,
        };

        Ok(Self {
            format,
            ruby,
            fonts,
            card,
        })
    }

    pub fn font(&self, family: &str) -> Option<&FontMetricsTable> {
        self.fonts.iter().find(|table| table.family() == family)
    }

    /// Same profile at another pixel density; the original is untouched.
    pub fn scaled(&self, factor: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            format: self.format,
            ruby: self.ruby,
            fonts: self
                .fonts
                .iter()
                .map(|table| crate::metrics::scale_font_data(table, factor))
                .collect::<Result<_, _>>()?,
            card: self.card.scaled(factor)?,
        })
    }
}
