//! Glyph painting onto a canvas-like [`Surface`].

use core::ops::{Deref, DerefMut};

use card_typeset::{Fragment, FragmentKind, InlineStyle};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::line_break::Line;
use crate::metrics::{FontMetricsRecord, FontSpec, FragmentMetrics};

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    u8::MAX
}

impl Rgba {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Linear interpolation towards `other`, `t` in `[0, 1]`.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

/// Horizontal gradient in device coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearGradient {
    pub start: Rgba,
    pub end: Rgba,
    pub x0: f32,
    pub x1: f32,
}

impl LinearGradient {
    pub fn color_at(&self, x: f32) -> Rgba {
        let span = self.x1 - self.x0;
        if span.abs() < f32::EPSILON {
            return self.start;
        }
        self.start.lerp(self.end, (x - self.x0) / span)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    Solid(Rgba),
    Gradient(LinearGradient),
}

impl Default for Fill {
    fn default() -> Self {
        Self::Solid(Rgba::BLACK)
    }
}

impl Fill {
    /// Color at device x.
    pub fn color_at(&self, x: f32) -> Rgba {
        match self {
            Self::Solid(color) => *color,
            Self::Gradient(gradient) => gradient.color_at(x),
        }
    }

    pub fn primary(&self) -> Rgba {
        match self {
            Self::Solid(color) => *color,
            Self::Gradient(gradient) => gradient.start,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub color: Rgba,
    pub offset_x: f32,
    pub offset_y: f32,
    #[serde(default)]
    pub blur: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub color: Rgba,
    pub width: f32,
}

/// Visual text style; opaque to layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub fill: Fill,
    pub shadow: Option<Shadow>,
    pub outline: Option<Outline>,
    /// Annotation fill; defaults to `fill`.
    pub ruby_fill: Option<Fill>,
    /// Boxed-run frame color; defaults to the primary fill color.
    pub box_color: Option<Rgba>,
}

impl TextStyle {
    pub fn solid(color: Rgba) -> Self {
        Self {
            fill: Fill::Solid(color),
            ..Self::default()
        }
    }
}

/// Horizontal placement of lines inside their box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    /// Distribute slack across gaps on full, uncondensed, non-final lines.
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Canvas-like drawing target.
///
/// `set_scale_x` compresses glyphs horizontally around the x passed to
/// `fill_text`/`stroke_text`; positions themselves are device coordinates.
pub trait Surface {
    type Error;

    fn save(&mut self);
    fn restore(&mut self);
    fn set_fill(&mut self, fill: &Fill);
    fn set_shadow(&mut self, shadow: Option<&Shadow>);
    fn set_font(&mut self, font: &FontSpec);
    fn set_scale_x(&mut self, scale: f32);
    fn fill_text(&mut self, text: &str, x: f32, baseline_y: f32) -> Result<(), Self::Error>;
    fn stroke_text(
        &mut self,
        text: &str,
        x: f32,
        baseline_y: f32,
        outline: &Outline,
    ) -> Result<(), Self::Error>;
    fn stroke_rect(&mut self, rect: RectF, color: Rgba, width: f32) -> Result<(), Self::Error>;
    fn draw_image(&mut self, src: &str, rect: RectF) -> Result<(), Self::Error>;
}

/// Saves surface state on creation and restores it on drop.
pub struct PaintScope<'s, S: Surface + ?Sized> {
    surface: &'s mut S,
}

impl<'s, S: Surface + ?Sized> PaintScope<'s, S> {
    pub fn new(surface: &'s mut S) -> Self {
        surface.save();
        Self { surface }
    }
}

impl<S: Surface + ?Sized> Deref for PaintScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: Surface + ?Sized> DerefMut for PaintScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: Surface + ?Sized> Drop for PaintScope<'_, S> {
    fn drop(&mut self) {
        self.surface.restore();
    }
}

/// Everything the painter needs from a finished layout.
#[derive(Clone, Copy, Debug)]
pub struct PaintInput<'a> {
    pub fragments: &'a [Fragment],
    pub metrics: &'a [FragmentMetrics],
    pub lines: &'a [Line],
    pub record: &'a FontMetricsRecord,
    pub font: &'a FontSpec,
    pub align: TextAlign,
    /// Box left edge.
    pub x: f32,
    /// Baseline of the first line.
    pub baseline_y: f32,
    pub max_width: f32,
}

/// Paint laid-out lines. Every surface state change is scoped to its line.
pub fn paint<S: Surface + ?Sized>(
    surface: &mut S,
    input: &PaintInput<'_>,
    style: &TextStyle,
) -> Result<(), S::Error> {
    let last = input.lines.len().saturating_sub(1);
    for (idx, line) in input.lines.iter().enumerate() {
        let mut scope = PaintScope::new(&mut *surface);
        scope.set_fill(&style.fill);
        scope.set_shadow(style.shadow.as_ref());
        paint_line(&mut *scope, input, line, idx == last, style)?;
    }
    Ok(())
}

fn justify_gaps(input: &PaintInput<'_>, line: &Line) -> Option<(f32, bool)> {
    let spaces = line
        .fragments
        .iter()
        .filter(|&&idx| input.fragments.get(idx).is_some_and(Fragment::is_space))
        .count();
    let gaps = if spaces > 0 {
        spaces
    } else {
        line.fragments.len().saturating_sub(1)
    };
    let slack = input.max_width - line.width;
    (gaps > 0 && slack > 0.0).then(|| (slack / gaps as f32, spaces > 0))
}

fn paint_line<S: Surface + ?Sized>(
    surface: &mut S,
    input: &PaintInput<'_>,
    line: &Line,
    is_last: bool,
    style: &TextStyle,
) -> Result<(), S::Error> {
    let y = input.baseline_y + line.baseline_y;
    let slack = (input.max_width - line.width).max(0.0);
    let mut x = match input.align {
        TextAlign::Left | TextAlign::Justify => input.x,
        TextAlign::Center => input.x + slack / 2.0,
        TextAlign::Right => input.x + slack,
    };
    let justify = if input.align == TextAlign::Justify
        && !is_last
        && !line.forced
        && !line.is_condensed()
    {
        justify_gaps(input, line)
    } else {
        None
    };

    let mut boxed_run: Option<(u32, f32)> = None;
    let count = line.fragments.len();
    for (pos, &idx) in line.fragments.iter().enumerate() {
        let (Some(fragment), Some(metrics)) = (input.fragments.get(idx), input.metrics.get(idx))
        else {
            continue;
        };
        let scale = if fragment.style.contains(InlineStyle::UNCOMPRESSED) {
            1.0
        } else {
            line.scale
        };

        let boxed = fragment.style.contains(InlineStyle::BOXED);
        if let Some((zone, start)) = boxed_run {
            if !boxed || fragment.zone_id() != zone {
                stroke_box(surface, input, style, start, x, y)?;
                boxed_run = None;
            }
        }
        if boxed && boxed_run.is_none() {
            boxed_run = Some((fragment.zone_id(), x));
        }

        let width = match &fragment.kind {
            FragmentKind::Ruby { base, annotation } => {
                paint_ruby(surface, input, style, fragment, metrics, line, x, y, base, annotation)?
            }
            FragmentKind::Word { text, .. } => {
                let font = input.font.with_style(fragment.style);
                surface.set_font(&font);
                surface.set_scale_x(scale);
                draw_glyphs(surface, style, text.graphemes(true), &metrics.advances, scale, x, y)?
            }
            FragmentKind::Char { ch, .. } => {
                let advance = metrics.width * scale;
                if !fragment.is_space() {
                    let font = input.font.with_style(fragment.style);
                    surface.set_font(&font);
                    surface.set_scale_x(scale);
                    draw_text(surface, style, ch, x, y)?;
                }
                advance
            }
            FragmentKind::Placeholder { src, full_line, .. } => {
                let width = if *full_line {
                    input.max_width
                } else {
                    metrics.width * scale
                };
                let left = if *full_line { input.x } else { x };
                let size = input.record.font_size;
                surface.draw_image(
                    src,
                    RectF {
                        x: left,
                        y: y - size,
                        width,
                        height: size,
                    },
                )?;
                width
            }
            FragmentKind::LineBreak => 0.0,
        };
        x += width;

        if let Some((gap, at_spaces)) = justify {
            if pos + 1 < count && (!at_spaces || fragment.is_space()) {
                x += gap;
            }
        }
    }
    if let Some((_, start)) = boxed_run {
        stroke_box(surface, input, style, start, x, y)?;
    }
    Ok(())
}

fn draw_text<S: Surface + ?Sized>(
    surface: &mut S,
    style: &TextStyle,
    text: &str,
    x: f32,
    y: f32,
) -> Result<(), S::Error> {
    if let Some(outline) = &style.outline {
        surface.stroke_text(text, x, y, outline)?;
    }
    surface.fill_text(text, x, y)
}

/// Draw cluster by cluster using stored advances; returns the drawn width.
fn draw_glyphs<'t, S: Surface + ?Sized>(
    surface: &mut S,
    style: &TextStyle,
    clusters: impl Iterator<Item = &'t str>,
    advances: &[f32],
    scale: f32,
    x: f32,
    y: f32,
) -> Result<f32, S::Error> {
    let mut cursor = x;
    for (cluster, advance) in clusters.zip(advances.iter()) {
        if cluster != " " {
            draw_text(surface, style, cluster, cursor, y)?;
        }
        cursor += advance * scale;
    }
    Ok(cursor - x)
}

#[allow(clippy::too_many_arguments)]
fn paint_ruby<S: Surface + ?Sized>(
    surface: &mut S,
    input: &PaintInput<'_>,
    style: &TextStyle,
    fragment: &Fragment,
    metrics: &FragmentMetrics,
    line: &Line,
    x: f32,
    y: f32,
    base: &str,
    annotation: &str,
) -> Result<f32, S::Error> {
    let (scale, ruby_scale) = if fragment.style.contains(InlineStyle::UNCOMPRESSED) {
        (1.0, 1.0)
    } else {
        (line.scale, line.ruby_scale)
    };
    let base_width = metrics.base_width * scale;
    let annotation_width = metrics.annotation_width * ruby_scale;
    let width = base_width.max(annotation_width);

    let font = input.font.with_style(fragment.style);
    surface.set_font(&font);
    surface.set_scale_x(scale);
    let base_x = x + (width - base_width) / 2.0;
    draw_glyphs(surface, style, base.graphemes(true), &metrics.advances, scale, base_x, y)?;

    let glyphs: f32 = metrics.annotation_advances.iter().sum::<f32>() * ruby_scale;
    let mut scope = PaintScope::new(surface);
    if let Some(fill) = &style.ruby_fill {
        scope.set_fill(fill);
    }
    scope.set_font(&font.with_size(input.record.ruby_font_size));
    scope.set_scale_x(ruby_scale);
    let annotation_x = x + (width - glyphs) / 2.0;
    draw_glyphs(
        &mut *scope,
        style,
        annotation.graphemes(true),
        &metrics.annotation_advances,
        ruby_scale,
        annotation_x,
        y - input.record.ruby_offset_y,
    )?;
    Ok(width)
}

fn stroke_box<S: Surface + ?Sized>(
    surface: &mut S,
    input: &PaintInput<'_>,
    style: &TextStyle,
    start: f32,
    end: f32,
    y: f32,
) -> Result<(), S::Error> {
    let size = input.record.font_size;
    let pad = (size * 0.1).max(1.0);
    let rect = RectF {
        x: start - pad,
        y: y - size - pad,
        width: end - start + pad * 2.0,
        height: size * 1.2 + pad,
    };
    let color = style.box_color.unwrap_or_else(|| style.fill.primary());
    surface.stroke_rect(rect, color, (size / 16.0).max(1.0))
}
