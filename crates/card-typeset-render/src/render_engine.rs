use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use card_typeset::{init_dictionary, resolve, split, CardFormat, Fragment, KeywordDictionary};

use crate::condense::condense_lines;
use crate::layout_config::{ensure_scale_factor, CondenseTolerance, ConfigError};
use crate::line_break::{break_lines, Escalation, Line};
use crate::metrics::{
    scale_font_data, AdvanceTable, FontMetricsRecord, FontMetricsTable, FontSpec,
    FragmentMeasurer, FragmentMetrics, RubyConfig, TextMeasurer,
};
use crate::paint::{paint, PaintInput, Rgba, Surface, TextAlign, TextStyle};

/// Cooperative cancellation hook checked between card fields.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Cancellation token that never cancels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl CancelToken for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Layout diagnostics, logged and forwarded to the diagnostic sink.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutDiagnostic {
    /// No glyph for `ch`; measured with the space advance.
    UnmeasurableGlyph { ch: char },
    /// The tolerance tiers did not accept the text.
    Escalated {
        font_size: f32,
        escalation: Escalation,
    },
    /// A line condensed below the chosen record's minimum scale.
    BelowMinimumScale {
        line: usize,
        scale: f32,
        min_scale: f32,
    },
    /// No record fit; the smallest font was used anyway.
    FontRecordFallback { font_size: f32 },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(LayoutDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

type Attempt = (
    usize,
    FontMetricsRecord,
    Vec<FragmentMetrics>,
    Vec<Line>,
    Escalation,
);

/// Text box on the card and the typesetting policy for it.
#[derive(Clone, Debug, PartialEq)]
pub struct TextField {
    /// Box left edge.
    pub x: f32,
    /// Baseline of the first line.
    pub baseline_y: f32,
    pub max_width: f32,
    pub align: TextAlign,
    pub format: CardFormat,
    pub font: FontMetricsTable,
    pub tolerance: CondenseTolerance,
    pub ruby: RubyConfig,
}

impl TextField {
    pub fn new(
        format: CardFormat,
        font: FontMetricsTable,
        x: f32,
        baseline_y: f32,
        max_width: f32,
    ) -> Self {
        Self {
            x,
            baseline_y,
            max_width,
            align: TextAlign::default(),
            format,
            font,
            tolerance: CondenseTolerance::default(),
            ruby: RubyConfig::default(),
        }
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_tolerance(mut self, tolerance: impl Into<CondenseTolerance>) -> Self {
        self.tolerance = tolerance.into();
        self
    }

    pub fn with_ruby(mut self, ruby: RubyConfig) -> Self {
        self.ruby = ruby;
        self
    }

    /// Same field at another pixel density.
    pub fn scaled(&self, factor: f32) -> Result<Self, ConfigError> {
        let factor = ensure_scale_factor(factor)?;
        Ok(Self {
            x: self.x * factor,
            baseline_y: self.baseline_y * factor,
            max_width: self.max_width * factor,
            align: self.align,
            format: self.format,
            font: scale_font_data(&self.font, factor)?,
            tolerance: self.tolerance.scaled(factor)?,
            ruby: self.ruby,
        })
    }
}

/// Finished layout of one field.
#[derive(Clone, Debug, PartialEq)]
pub struct TextFieldLayout {
    pub fragments: Vec<Fragment>,
    pub metrics: Vec<FragmentMetrics>,
    pub lines: Vec<Line>,
    pub record: FontMetricsRecord,
    /// Index of `record` in the field's font table.
    pub record_index: usize,
    pub escalation: Escalation,
    pub font: FontSpec,
    pub diagnostics: Vec<LayoutDiagnostic>,
}

impl TextFieldLayout {
    /// Painter input for this layout inside `field`'s box.
    pub fn paint_input<'a>(&'a self, field: &TextField) -> PaintInput<'a> {
        PaintInput {
            fragments: &self.fragments,
            metrics: &self.metrics,
            lines: &self.lines,
            record: &self.record,
            font: &self.font,
            align: field.align,
            x: field.x,
            baseline_y: field.baseline_y,
            max_width: field.max_width,
        }
    }

    /// Visible text of each line.
    pub fn line_texts(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| {
                line.fragments
                    .iter()
                    .filter_map(|&idx| self.fragments.get(idx))
                    .map(Fragment::text)
                    .collect()
            })
            .collect()
    }

    /// Smallest line scale, 1 for an empty layout.
    pub fn min_scale(&self) -> f32 {
        self.lines.iter().map(|l| l.scale).fold(1.0, f32::min)
    }
}

/// Card text fields in raw markup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardText {
    pub name: String,
    pub effect: String,
    pub pendulum_effect: Option<String>,
}

/// Boxes for each card text field.
#[derive(Clone, Debug, PartialEq)]
pub struct CardLayoutProfile {
    pub name: TextField,
    pub effect: TextField,
    pub pendulum_effect: Option<TextField>,
}

fn reference_table(family: &str, records: &[(f32, f32, u8, f32)]) -> FontMetricsTable {
    let records: Vec<FontMetricsRecord> = records
        .iter()
        .map(|&(font_size, line_height, max_lines, min_scale)| FontMetricsRecord {
            word_letter_spacing: 0.0,
            head_text_spacing: font_size * 0.1,
            min_scale,
            ..FontMetricsRecord::new(font_size, line_height, max_lines)
        })
        .collect();
    FontMetricsTable::new(family, records.clone()).unwrap_or_else(|err| {
        log::error!("reference font table '{}' rejected: {}", family, err);
        FontMetricsTable::new_unchecked(family, records)
    })
}

impl CardLayoutProfile {
    /// Reference boxes at 1x density (813 x 1185 card).
    pub fn reference(format: CardFormat) -> Self {
        let name_font = reference_table("name", &[(48.0, 56.0, 1, 0.3)]);
        let effect_font = reference_table(
            "effect",
            &[
                (24.0, 30.0, 5, 0.75),
                (22.0, 27.0, 6, 0.7),
                (20.0, 24.0, 7, 0.65),
                (18.0, 21.0, 8, 0.5),
            ],
        );
        let pendulum_font =
            reference_table("pendulum_effect", &[(20.0, 24.0, 4, 0.7), (18.0, 21.0, 5, 0.5)]);
        let effect_align = match format {
            CardFormat::Tcg => TextAlign::Justify,
            CardFormat::Ocg => TextAlign::Left,
        };
        Self {
            name: TextField::new(format, name_font, 64.0, 108.0, 600.0)
                .with_tolerance(crate::layout_config::ToleranceTier::VeryStrict),
            effect: TextField::new(format, effect_font, 64.0, 902.0, 686.0).with_align(effect_align),
            pendulum_effect: Some(
                TextField::new(format, pendulum_font, 128.0, 758.0, 556.0).with_align(effect_align),
            ),
        }
    }

    /// Same boxes at another pixel density.
    pub fn scaled(&self, factor: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            name: self.name.scaled(factor)?,
            effect: self.effect.scaled(factor)?,
            pendulum_effect: self
                .pendulum_effect
                .as_ref()
                .map(|f| f.scaled(factor))
                .transpose()?,
        })
    }
}

/// Styles per card field.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CardTextStyles {
    pub name: TextStyle,
    pub effect: TextStyle,
}

impl CardTextStyles {
    pub fn monochrome(color: Rgba) -> Self {
        Self {
            name: TextStyle::solid(color),
            effect: TextStyle::solid(color),
        }
    }
}

/// Card rendering failure.
#[derive(Debug)]
pub enum RenderError<E> {
    Surface(E),
    Cancelled,
}

impl<E: fmt::Display> fmt::Display for RenderError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface(err) => write!(f, "surface error: {}", err),
            Self::Cancelled => write!(f, "card rendering cancelled"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RenderError<E> {}

/// Field layout and painting entry point.
///
/// Cheap to clone and shareable across threads; layout never mutates it.
#[derive(Clone)]
pub struct LayoutEngine {
    measurer: Arc<dyn TextMeasurer>,
    tcg: Arc<KeywordDictionary>,
    ocg: Arc<KeywordDictionary>,
    diagnostic_sink: DiagnosticSink,
}

impl fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("tcg_terms", &self.tcg.len())
            .field("ocg_terms", &self.ocg.len())
            .field("diagnostic_sink", &self.diagnostic_sink.is_some())
            .finish()
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(Arc::new(AdvanceTable::proportional_default()))
    }
}

impl LayoutEngine {
    /// Engine with the built-in keyword dictionaries.
    pub fn new(measurer: Arc<dyn TextMeasurer>) -> Self {
        Self {
            measurer,
            tcg: Arc::new(init_dictionary(CardFormat::Tcg)),
            ocg: Arc::new(init_dictionary(CardFormat::Ocg)),
            diagnostic_sink: None,
        }
    }

    /// Replace the dictionary for the dictionary's own format.
    pub fn with_dictionary(mut self, dictionary: KeywordDictionary) -> Self {
        match dictionary.format() {
            CardFormat::Tcg => self.tcg = Arc::new(dictionary),
            CardFormat::Ocg => self.ocg = Arc::new(dictionary),
        }
        self
    }

    pub fn dictionary(&self, format: CardFormat) -> &KeywordDictionary {
        match format {
            CardFormat::Tcg => &self.tcg,
            CardFormat::Ocg => &self.ocg,
        }
    }

    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(LayoutDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink)))); // allow: once, diagnostic setup
    }

    fn emit_diagnostic(&self, diagnostic: &LayoutDiagnostic) {
        match diagnostic {
            LayoutDiagnostic::UnmeasurableGlyph { ch } => {
                log::warn!("no glyph for U+{:04X}; using space advance", *ch as u32)
            }
            LayoutDiagnostic::Escalated {
                font_size,
                escalation,
            } => log::debug!("font size {} escalated: {:?}", font_size, escalation),
            LayoutDiagnostic::BelowMinimumScale {
                line,
                scale,
                min_scale,
            } => log::warn!(
                "line {} condensed to {:.3}, below minimum {:.3}",
                line,
                scale,
                min_scale
            ),
            LayoutDiagnostic::FontRecordFallback { font_size } => {
                log::warn!("no font record fits; falling back to size {}", font_size)
            }
        }
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic.clone());
        }
    }

    /// Resolve, split, break and condense `raw` for `field`.
    ///
    /// Records are tried largest first; the first whose layout stays within
    /// its `max_lines` at no less than its `min_scale` wins. Otherwise the
    /// smallest record is used and a [`LayoutDiagnostic::FontRecordFallback`]
    /// is reported.
    pub fn layout_field(&self, raw: &str, field: &TextField) -> TextFieldLayout {
        let format = field.format;
        let text = resolve(raw, format, self.dictionary(format));
        let fragments = split(&text, format);
        let family = field.font.family_arc();
        let records = field.font.records();

        let mut chosen: Option<Attempt> = None;
        let mut fits = false;
        for (idx, record) in records.iter().enumerate() {
            let measurer = FragmentMeasurer::new(
                self.measurer.as_ref(),
                record,
                Arc::clone(&family),
                format,
                field.max_width,
            );
            let metrics = measurer.measure_all(&fragments);
            let broken = break_lines(
                &fragments,
                &metrics,
                format,
                field.max_width,
                record,
                &field.tolerance,
            );
            let mut lines = broken.lines;
            condense_lines(
                &mut lines,
                &fragments,
                &metrics,
                field.max_width,
                field.ruby.bonus_ratio,
            );
            fits = lines.len() <= usize::from(record.max_lines)
                && lines.iter().all(|line| line.scale >= record.min_scale);
            chosen = Some((idx, *record, metrics, lines, broken.escalation));
            if fits {
                break;
            }
            log::debug!(
                "font size {} does not fit {} line(s); trying next record",
                record.font_size,
                record.max_lines
            );
        }

        let Some((record_index, record, metrics, lines, escalation)) = chosen else {
            return self.empty_layout(fragments, field);
        };

        let mut diagnostics = Vec::new();
        let mut seen: Vec<char> = Vec::new();
        for ch in metrics.iter().flat_map(|m| m.fallbacks.iter().copied()) {
            if !seen.contains(&ch) {
                seen.push(ch);
                diagnostics.push(LayoutDiagnostic::UnmeasurableGlyph { ch });
            }
        }
        if !matches!(escalation, Escalation::Tier { .. }) {
            diagnostics.push(LayoutDiagnostic::Escalated {
                font_size: record.font_size,
                escalation,
            });
        }
        if !fits {
            diagnostics.push(LayoutDiagnostic::FontRecordFallback {
                font_size: record.font_size,
            });
            for (line, l) in lines.iter().enumerate() {
                if l.scale < record.min_scale {
                    diagnostics.push(LayoutDiagnostic::BelowMinimumScale {
                        line,
                        scale: l.scale,
                        min_scale: record.min_scale,
                    });
                }
            }
        }
        for diagnostic in &diagnostics {
            self.emit_diagnostic(diagnostic);
        }

        TextFieldLayout {
            fragments,
            metrics,
            lines,
            record,
            record_index,
            escalation,
            font: FontSpec::new(family, record.font_size),
            diagnostics,
        }
    }

    fn empty_layout(&self, fragments: Vec<Fragment>, field: &TextField) -> TextFieldLayout {
        let record = FontMetricsRecord::new(field.max_width.max(1.0), field.max_width.max(1.0), 1);
        TextFieldLayout {
            fragments,
            metrics: Vec::new(),
            lines: Vec::new(),
            record,
            record_index: 0,
            escalation: Escalation::Tier { lines: 1 },
            font: FontSpec::new(field.font.family_arc(), record.font_size),
            diagnostics: Vec::new(),
        }
    }

    /// Lay out `raw` and paint it into `field`'s box.
    pub fn render_field<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        raw: &str,
        field: &TextField,
        style: &TextStyle,
    ) -> Result<TextFieldLayout, S::Error> {
        let layout = self.layout_field(raw, field);
        paint(surface, &layout.paint_input(field), style)?;
        Ok(layout)
    }

    /// Render every non-empty field of `card`.
    ///
    /// `cancel` is checked before each field, never mid-layout.
    pub fn render_card_text<S, C>(
        &self,
        surface: &mut S,
        card: &CardText,
        profile: &CardLayoutProfile,
        styles: &CardTextStyles,
        cancel: &C,
    ) -> Result<Vec<TextFieldLayout>, RenderError<S::Error>>
    where
        S: Surface + ?Sized,
        C: CancelToken + ?Sized,
    {
        let mut fields: Vec<(&str, &TextField, &TextStyle)> = Vec::with_capacity(3);
        fields.push((&card.name, &profile.name, &styles.name));
        fields.push((&card.effect, &profile.effect, &styles.effect));
        if let (Some(text), Some(field)) = (&card.pendulum_effect, &profile.pendulum_effect) {
            fields.push((text, field, &styles.effect));
        }

        let mut layouts = Vec::with_capacity(fields.len());
        for (raw, field, style) in fields {
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            if raw.trim().is_empty() {
                continue;
            }
            let layout = self
                .render_field(surface, raw, field, style)
                .map_err(RenderError::Surface)?;
            layouts.push(layout);
        }
        Ok(layouts)
    }
}
