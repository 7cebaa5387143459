use std::collections::HashMap;
use std::sync::Arc;

use card_typeset::{classify, classify_cluster, CardFormat, Fragment, FragmentKind, GlyphClass, InlineStyle, WordScript};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use unicode_segmentation::UnicodeSegmentation;

use crate::layout_config::{ensure_positive, ensure_scale_factor, ConfigError};

/// Bold glyphs are measured this much wider than regular ones.
const BOLD_ADVANCE_BONUS: f32 = 1.02;

/// Font selection passed to measurers and surfaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: Arc<str>,
    pub size_px: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl FontSpec {
    pub fn new(family: impl Into<Arc<str>>, size_px: f32) -> Self {
        Self {
            family: family.into(),
            size_px,
            bold: false,
            italic: false,
        }
    }

    pub fn with_style(&self, style: InlineStyle) -> Self {
        Self {
            family: Arc::clone(&self.family),
            size_px: self.size_px,
            bold: style.contains(InlineStyle::BOLD),
            italic: style.contains(InlineStyle::ITALIC),
        }
    }

    pub fn with_size(&self, size_px: f32) -> Self {
        Self {
            family: Arc::clone(&self.family),
            size_px,
            bold: self.bold,
            italic: self.italic,
        }
    }
}

/// Per-glyph advance source used for layout.
pub trait TextMeasurer: Send + Sync {
    /// Advance of `ch` in px; `None` when the font has no glyph for it.
    fn advance_px(&self, ch: char, font: &FontSpec) -> Option<f32>;

    /// Advance used for spaces and for unmeasurable glyphs.
    fn space_advance_px(&self, font: &FontSpec) -> f32 {
        self.advance_px(' ', font).unwrap_or(font.size_px * 0.3)
    }
}

/// One font-size step of a font family.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FontMetricsRecord {
    pub font_size: f32,
    pub line_height: f32,
    /// Advance override for bullet glyphs; 0 keeps the measured advance.
    #[serde(default)]
    pub bullet_symbol_width: f32,
    /// Extra spacing between letters of Latin words.
    #[serde(default)]
    pub word_letter_spacing: f32,
    /// Extra width reserved around ruby annotations.
    #[serde(default)]
    pub head_text_spacing: f32,
    /// Annotation font size; 0 means half of `font_size`.
    #[serde(default)]
    pub ruby_font_size: f32,
    /// Distance from the base baseline up to the annotation baseline.
    #[serde(default)]
    pub ruby_offset_y: f32,
    #[serde(default = "default_max_lines")]
    pub max_lines: u8,
    /// Smallest condensation scale this record accepts before the next,
    /// smaller record is tried.
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
}

fn default_max_lines() -> u8 {
    3
}

fn default_min_scale() -> f32 {
    0.5
}

impl FontMetricsRecord {
    /// Record with proportional defaults derived from `font_size`.
    pub fn new(font_size: f32, line_height: f32, max_lines: u8) -> Self {
        Self {
            font_size,
            line_height,
            bullet_symbol_width: 0.0,
            word_letter_spacing: 0.0,
            head_text_spacing: 0.0,
            ruby_font_size: font_size * 0.5,
            ruby_offset_y: font_size * 0.85,
            max_lines,
            min_scale: default_min_scale(),
        }
    }

    /// Pixel fields multiplied by `factor`; line limits and scales unchanged.
    pub fn scaled(&self, factor: f32) -> Result<Self, ConfigError> {
        let factor = ensure_scale_factor(factor)?;
        Ok(Self {
            font_size: self.font_size * factor,
            line_height: self.line_height * factor,
            bullet_symbol_width: self.bullet_symbol_width * factor,
            word_letter_spacing: self.word_letter_spacing * factor,
            head_text_spacing: self.head_text_spacing * factor,
            ruby_font_size: self.ruby_font_size * factor,
            ruby_offset_y: self.ruby_offset_y * factor,
            max_lines: self.max_lines,
            min_scale: self.min_scale,
        })
    }

    fn validate(mut self, family: &str, index: usize) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidRecord {
            family: family.to_string(),
            index,
            reason,
        };
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(invalid("font_size must be positive"));
        }
        if !(self.line_height.is_finite() && self.line_height > 0.0) {
            return Err(invalid("line_height must be positive"));
        }
        if self.max_lines == 0 {
            return Err(invalid("max_lines must be at least 1"));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0) {
            return Err(invalid("min_scale must be in (0, 1]"));
        }
        if self.bullet_symbol_width < 0.0
            || self.word_letter_spacing < 0.0
            || self.head_text_spacing < 0.0
            || self.ruby_font_size < 0.0
        {
            return Err(invalid("spacing values must not be negative"));
        }
        if self.ruby_font_size == 0.0 {
            self.ruby_font_size = self.font_size * 0.5;
        }
        Ok(self)
    }
}

/// Font-size steps of one family, largest font first.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FontMetricsTable {
    family: Arc<str>,
    records: Vec<FontMetricsRecord>,
}

impl FontMetricsTable {
    /// Validate and freeze a table. Records must be ordered largest font first.
    pub fn new(
        family: impl Into<Arc<str>>,
        records: Vec<FontMetricsRecord>,
    ) -> Result<Self, ConfigError> {
        let family = family.into();
        if records.is_empty() {
            return Err(ConfigError::EmptyFontTable {
                family: family.to_string(),
            });
        }
        let mut validated = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let record = record.validate(&family, index)?;
            if let Some(prev) = validated.last().map(|r: &FontMetricsRecord| r.font_size) {
                if record.font_size > prev {
                    return Err(ConfigError::InvalidRecord {
                        family: family.to_string(),
                        index,
                        reason: "records must be ordered largest font first",
                    });
                }
            }
            validated.push(record);
        }
        Ok(Self {
            family,
            records: validated,
        })
    }

    /// Table from records that skipped validation.
    pub(crate) fn new_unchecked(family: impl Into<Arc<str>>, records: Vec<FontMetricsRecord>) -> Self {
        Self {
            family: family.into(),
            records,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn family_arc(&self) -> Arc<str> {
        Arc::clone(&self.family)
    }

    pub fn records(&self) -> &[FontMetricsRecord] {
        &self.records
    }
}

/// Derive `table` at another pixel density without touching the original.
pub fn scale_font_data(
    table: &FontMetricsTable,
    factor: f32,
) -> Result<FontMetricsTable, ConfigError> {
    Ok(FontMetricsTable {
        family: Arc::clone(&table.family),
        records: table
            .records
            .iter()
            .map(|r| r.scaled(factor))
            .collect::<Result<_, _>>()?,
    })
}

/// Ruby compression policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RubyConfig {
    /// How much less aggressively annotations condense than base text.
    pub bonus_ratio: f32,
}

impl Default for RubyConfig {
    fn default() -> Self {
        Self {
            bonus_ratio: crate::condense::DEFAULT_RUBY_BONUS_RATIO,
        }
    }
}

impl RubyConfig {
    pub fn validated(self) -> Result<Self, ConfigError> {
        if (0.0..1.0).contains(&self.bonus_ratio) {
            Ok(self)
        } else {
            Err(ConfigError::InvalidRubyBonus {
                value: self.bonus_ratio,
            })
        }
    }
}

/// Em-based advance table, loadable from JSON.
///
/// Characters without an override use `wide_em` for CJK/kana/full-width
/// forms and `default_em` for everything else. With `default_em` unset,
/// those characters are unmeasurable.
#[derive(Clone, Debug, PartialEq)]
pub struct AdvanceTable {
    space_em: f32,
    wide_em: f32,
    default_em: Option<f32>,
    overrides: HashMap<char, f32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AdvanceTableDoc {
    space_em: f32,
    #[serde(default = "one")]
    wide_em: f32,
    #[serde(default)]
    default_em: Option<f32>,
    #[serde(default)]
    overrides: HashMap<String, f32>,
}

fn one() -> f32 {
    1.0
}

/// Rough proportional sans-serif advances for printable ASCII.
const ASCII_EM: [f32; 95] = [
    0.28, 0.28, 0.36, 0.56, 0.56, 0.89, 0.67, 0.19, 0.33, 0.33, 0.39, 0.58, 0.28, 0.33, 0.28,
    0.28, // ' ' .. '/'
    0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, // '0'..'9'
    0.28, 0.28, 0.58, 0.58, 0.58, 0.56, 1.02, // ':' .. '@'
    0.67, 0.67, 0.72, 0.72, 0.67, 0.61, 0.78, 0.72, 0.28, 0.50, 0.67, 0.56, 0.83, 0.72, 0.78,
    0.67, 0.78, 0.72, 0.67, 0.61, 0.72, 0.67, 0.94, 0.67, 0.67, 0.61, // 'A'..'Z'
    0.28, 0.28, 0.28, 0.47, 0.56, 0.33, // '[' .. '`'
    0.56, 0.56, 0.50, 0.56, 0.56, 0.28, 0.56, 0.56, 0.22, 0.22, 0.50, 0.22, 0.83, 0.56, 0.56,
    0.56, 0.56, 0.33, 0.50, 0.28, 0.56, 0.50, 0.72, 0.50, 0.50, 0.50, // 'a'..'z'
    0.33, 0.26, 0.33, 0.58, // '{' .. '~'
];

impl AdvanceTable {
    /// Built-in proportional table covering ASCII, Latin-1 and CJK.
    pub fn proportional_default() -> Self {
        let mut overrides = HashMap::with_capacity(ASCII_EM.len());
        for (offset, em) in ASCII_EM.iter().enumerate() {
            if let Some(ch) = char::from_u32(0x20 + offset as u32) {
                overrides.insert(ch, *em);
            }
        }
        Self {
            space_em: ASCII_EM[0],
            wide_em: 1.0,
            default_em: None,
            overrides,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let doc: AdvanceTableDoc = serde_json::from_str(json)?;
        let space_em = ensure_positive("space_em", doc.space_em)?;
        let wide_em = ensure_positive("wide_em", doc.wide_em)?;
        let default_em = doc
            .default_em
            .map(|em| ensure_positive("default_em", em))
            .transpose()?;
        let mut overrides = HashMap::with_capacity(doc.overrides.len());
        for (key, em) in doc.overrides {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(ConfigError::InvalidRecord {
                    family: "advance table".to_string(),
                    index: overrides.len(),
                    reason: "override keys must be single characters",
                });
            };
            if !(em.is_finite() && em >= 0.0) {
                return Err(ConfigError::NonPositiveWidth {
                    what: "advance override",
                    value: em,
                });
            }
            overrides.insert(ch, em);
        }
        Ok(Self {
            space_em,
            wide_em,
            default_em,
            overrides,
        })
    }

    fn em_for(&self, ch: char) -> Option<f32> {
        if let Some(em) = self.overrides.get(&ch) {
            return Some(*em);
        }
        if is_wide(ch) {
            return Some(self.wide_em);
        }
        if let Some(base) = latin1_base(ch) {
            return self.overrides.get(&base).copied().or(self.default_em);
        }
        self.default_em
    }
}

impl TextMeasurer for AdvanceTable {
    fn advance_px(&self, ch: char, font: &FontSpec) -> Option<f32> {
        if ch == ' ' {
            return Some(self.space_em * font.size_px);
        }
        self.em_for(ch).map(|em| em * font.size_px)
    }

    fn space_advance_px(&self, font: &FontSpec) -> f32 {
        self.space_em * font.size_px
    }
}

fn is_wide(ch: char) -> bool {
    matches!(
        ch,
        '\u{1100}'..='\u{115F}'
            | '\u{2E80}'..='\u{303E}'
            | '\u{3041}'..='\u{33FF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{AC00}'..='\u{D7A3}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{FF01}'..='\u{FF60}'
            | '\u{FFE0}'..='\u{FFE6}'
            | '\u{20000}'..='\u{2FFFD}'
    ) || matches!(ch, '\u{2026}' | '\u{2025}' | '\u{25A0}'..='\u{25FF}' | '\u{2605}' | '\u{2606}')
}

fn latin1_base(ch: char) -> Option<char> {
    let base = match ch {
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' | 'Ø' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' => 'Y',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(base)
}

/// Measured width of one fragment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentMetrics {
    /// Layout width at scale 1.
    pub width: f32,
    /// Advances of the drawn base glyphs, one per visible cluster.
    pub advances: SmallVec<[f32; 8]>,
    /// Ruby base width (equals `width` for non-ruby fragments).
    pub base_width: f32,
    /// Ruby annotation width including head spacing.
    pub annotation_width: f32,
    pub annotation_advances: SmallVec<[f32; 8]>,
    /// Characters measured with the space-advance fallback.
    pub fallbacks: SmallVec<[char; 2]>,
}

impl FragmentMetrics {
    /// Ruby whose annotation is wider than its base.
    pub fn annotation_dominated(&self) -> bool {
        self.annotation_width > self.base_width
    }
}

/// Measures fragments for one font record.
pub struct FragmentMeasurer<'a> {
    measurer: &'a dyn TextMeasurer,
    record: &'a FontMetricsRecord,
    font: FontSpec,
    format: CardFormat,
    line_width: f32,
}

impl<'a> FragmentMeasurer<'a> {
    /// `line_width` is the width reserved for full-line placeholders.
    pub fn new(
        measurer: &'a dyn TextMeasurer,
        record: &'a FontMetricsRecord,
        family: Arc<str>,
        format: CardFormat,
        line_width: f32,
    ) -> Self {
        Self {
            measurer,
            record,
            font: FontSpec::new(family, record.font_size),
            format,
            line_width,
        }
    }

    pub fn measure_all(&self, fragments: &[Fragment]) -> Vec<FragmentMetrics> {
        fragments.iter().map(|f| self.measure(f)).collect()
    }

    pub fn measure(&self, fragment: &Fragment) -> FragmentMetrics {
        let font = self.font.with_style(fragment.style);
        let bonus = if fragment.style.contains(InlineStyle::BOLD) {
            BOLD_ADVANCE_BONUS
        } else {
            1.0
        };
        let mut out = FragmentMetrics::default();
        match &fragment.kind {
            FragmentKind::Char { ch, glyph } => {
                let advance = if glyph.class == GlyphClass::Bullet
                    && self.record.bullet_symbol_width > 0.0
                {
                    self.record.bullet_symbol_width
                } else {
                    self.cluster_advance(ch, &font, &mut out.fallbacks) * glyph.width_ratio * bonus
                };
                out.advances.push(advance);
                out.width = advance;
            }
            FragmentKind::Word { text, script } => {
                let spacing = match script {
                    WordScript::LatinWord => self.record.word_letter_spacing,
                    WordScript::CjkRun => 0.0,
                };
                let mut clusters = text.graphemes(true).peekable();
                while let Some(cluster) = clusters.next() {
                    let ratio = classify_cluster(cluster, self.format).width_ratio;
                    let mut advance = self.cluster_advance(cluster, &font, &mut out.fallbacks) * ratio;
                    advance *= bonus;
                    if clusters.peek().is_some() {
                        advance += spacing;
                    }
                    out.advances.push(advance);
                    out.width += advance;
                }
            }
            FragmentKind::Ruby { base, annotation } => {
                for cluster in base.graphemes(true) {
                    let ratio = classify_cluster(cluster, self.format).width_ratio;
                    let advance =
                        self.cluster_advance(cluster, &font, &mut out.fallbacks) * ratio * bonus;
                    out.advances.push(advance);
                    out.base_width += advance;
                }
                let ruby_font = font.with_size(self.record.ruby_font_size);
                let mut annotation_width = self.record.head_text_spacing;
                for cluster in annotation.graphemes(true) {
                    let ratio = classify_cluster(cluster, self.format).width_ratio;
                    let advance = self.cluster_advance(cluster, &ruby_font, &mut out.fallbacks) * ratio;
                    out.annotation_advances.push(advance);
                    annotation_width += advance;
                }
                out.annotation_width = annotation_width;
                out.width = out.base_width.max(annotation_width);
                return out;
            }
            FragmentKind::Placeholder {
                width_px,
                full_line,
                ..
            } => {
                out.width = if *full_line {
                    self.line_width
                } else {
                    width_px.map_or(self.record.font_size, f32::from)
                };
                out.advances.push(out.width);
            }
            FragmentKind::LineBreak => {}
        }
        out.base_width = out.width;
        out
    }

    fn char_advance(&self, ch: char, font: &FontSpec, fallbacks: &mut SmallVec<[char; 2]>) -> f32 {
        match self.measurer.advance_px(ch, font) {
            Some(advance) => advance,
            None => {
                if !fallbacks.contains(&ch) {
                    fallbacks.push(ch);
                }
                self.measurer.space_advance_px(font)
            }
        }
    }

    /// Clusters advance by their first scalar; combining marks add nothing.
    fn cluster_advance(
        &self,
        cluster: &str,
        font: &FontSpec,
        fallbacks: &mut SmallVec<[char; 2]>,
    ) -> f32 {
        let Some(first) = cluster.chars().next() else {
            return 0.0;
        };
        if first == ' ' || classify(first, self.format).class == GlyphClass::Space {
            return self.measurer.space_advance_px(font);
        }
        self.char_advance(first, font, fallbacks)
    }
}
