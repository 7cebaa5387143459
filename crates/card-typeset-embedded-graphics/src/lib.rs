//! embedded-graphics backend for `card-typeset-render`.
//!
//! [`EgTextMeasurer`] reports advances from the same bitmap fonts that
//! [`EgSurface`] draws with, so a field laid out with it paints exactly
//! into its box on any [`DrawTarget`] with an [`Rgb888`] color space.

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use card_typeset_render::{Fill, FontSpec, Outline, RectF, Rgba, Shadow, Surface, TextMeasurer};
use embedded_graphics::{
    mono_font::{
        ascii::{
            FONT_10X20, FONT_6X13_BOLD, FONT_6X13_ITALIC, FONT_6X9, FONT_7X13_ITALIC, FONT_7X14,
            FONT_7X14_BOLD, FONT_8X13, FONT_8X13_BOLD, FONT_8X13_ITALIC, FONT_9X18,
            FONT_9X18_BOLD,
        },
        MonoFont, MonoTextStyle,
    },
    pixelcolor::{BinaryColor, Rgb888},
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use unicode_width::UnicodeWidthChar;

/// Backend-local font identifier.
pub type FontId = u32;

/// Why a requested face could not be honored exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontFallbackReason {
    /// No bold-italic face exists in the size bucket.
    UnsupportedBoldItalic,
    /// No italic face exists in the size bucket.
    UnsupportedItalic,
    /// The id does not name a bucket/variant pair.
    UnknownFontId,
}

/// Resolved face for a requested [`FontSpec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontSelection {
    pub font_id: FontId,
    pub fallback_reason: Option<FontFallbackReason>,
}

/// Cell metrics of a resolved face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontMetrics {
    pub char_width: u32,
    pub char_height: u32,
    pub baseline: u32,
}

/// Font lookup shared by measurement and drawing.
pub trait FontBackend: Send + Sync {
    fn resolve_font(&self, font: &FontSpec) -> FontSelection;
    fn metrics(&self, font_id: FontId) -> FontMetrics;
    fn mono_font(&self, font_id: FontId) -> &'static MonoFont<'static>;
}

/// Built-in ASCII mono fonts bucketed by requested size.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonoFontBackend;

impl MonoFontBackend {
    const SIZE_SMALL: u32 = 0;
    const SIZE_MEDIUM: u32 = 1;
    const SIZE_LARGE: u32 = 2;
    const SIZE_XL: u32 = 3;

    const VARIANT_REGULAR: u32 = 0;
    const VARIANT_BOLD: u32 = 1;
    const VARIANT_ITALIC: u32 = 2;
    const VARIANT_BOLD_ITALIC: u32 = 3;

    fn size_bucket(size_px: f32) -> u32 {
        if size_px >= 24.0 {
            Self::SIZE_XL
        } else if size_px >= 20.0 {
            Self::SIZE_LARGE
        } else if size_px >= 16.0 {
            Self::SIZE_MEDIUM
        } else {
            Self::SIZE_SMALL
        }
    }

    fn variant(font: &FontSpec) -> u32 {
        match (font.bold, font.italic) {
            (false, false) => Self::VARIANT_REGULAR,
            (true, false) => Self::VARIANT_BOLD,
            (false, true) => Self::VARIANT_ITALIC,
            (true, true) => Self::VARIANT_BOLD_ITALIC,
        }
    }

    fn font_for(font_id: FontId) -> (&'static MonoFont<'static>, Option<FontFallbackReason>) {
        let (size, variant) = decode_font_id(font_id);
        match (size, variant) {
            (Self::SIZE_SMALL, Self::VARIANT_REGULAR) => (&FONT_6X9, None),
            (Self::SIZE_SMALL, Self::VARIANT_ITALIC) => (&FONT_6X13_ITALIC, None),
            (Self::SIZE_SMALL, Self::VARIANT_BOLD) => (&FONT_6X13_BOLD, None),
            (Self::SIZE_SMALL, Self::VARIANT_BOLD_ITALIC) => (
                &FONT_6X13_BOLD,
                Some(FontFallbackReason::UnsupportedBoldItalic),
            ),
            (Self::SIZE_MEDIUM, Self::VARIANT_REGULAR) => (&FONT_7X14, None),
            (Self::SIZE_MEDIUM, Self::VARIANT_ITALIC) => (&FONT_7X13_ITALIC, None),
            (Self::SIZE_MEDIUM, Self::VARIANT_BOLD) => (&FONT_7X14_BOLD, None),
            (Self::SIZE_MEDIUM, Self::VARIANT_BOLD_ITALIC) => (
                &FONT_7X14_BOLD,
                Some(FontFallbackReason::UnsupportedBoldItalic),
            ),
            (Self::SIZE_LARGE, Self::VARIANT_REGULAR) => (&FONT_8X13, None),
            (Self::SIZE_LARGE, Self::VARIANT_ITALIC) => (&FONT_8X13_ITALIC, None),
            (Self::SIZE_LARGE, Self::VARIANT_BOLD) => (&FONT_8X13_BOLD, None),
            (Self::SIZE_LARGE, Self::VARIANT_BOLD_ITALIC) => (
                &FONT_8X13_BOLD,
                Some(FontFallbackReason::UnsupportedBoldItalic),
            ),
            (Self::SIZE_XL, Self::VARIANT_REGULAR) => (&FONT_10X20, None),
            (Self::SIZE_XL, Self::VARIANT_ITALIC) => {
                (&FONT_9X18, Some(FontFallbackReason::UnsupportedItalic))
            }
            (Self::SIZE_XL, Self::VARIANT_BOLD) => (&FONT_9X18_BOLD, None),
            (Self::SIZE_XL, Self::VARIANT_BOLD_ITALIC) => (
                &FONT_9X18_BOLD,
                Some(FontFallbackReason::UnsupportedBoldItalic),
            ),
            _ => (&FONT_8X13, Some(FontFallbackReason::UnknownFontId)),
        }
    }
}

impl FontBackend for MonoFontBackend {
    fn resolve_font(&self, font: &FontSpec) -> FontSelection {
        let font_id = encode_font_id(Self::size_bucket(font.size_px), Self::variant(font));
        let (_, fallback_reason) = Self::font_for(font_id);
        FontSelection {
            font_id,
            fallback_reason,
        }
    }

    fn metrics(&self, font_id: FontId) -> FontMetrics {
        let font = self.mono_font(font_id);
        FontMetrics {
            char_width: font.character_size.width + font.character_spacing,
            char_height: font.character_size.height,
            baseline: font.baseline,
        }
    }

    fn mono_font(&self, font_id: FontId) -> &'static MonoFont<'static> {
        Self::font_for(font_id).0
    }
}

fn encode_font_id(size_bucket: u32, variant: u32) -> FontId {
    (size_bucket << 2) | (variant & 0b11)
}

fn decode_font_id(font_id: FontId) -> (u32, u32) {
    (font_id >> 2, font_id & 0b11)
}

/// [`TextMeasurer`] backed by a [`FontBackend`].
///
/// Wide (CJK) glyphs occupy two cells; control characters are unmeasurable.
#[derive(Clone, Debug, Default)]
pub struct EgTextMeasurer<B = MonoFontBackend> {
    backend: B,
}

impl EgTextMeasurer<MonoFontBackend> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared measurer for a [`card_typeset_render::LayoutEngine`].
    pub fn shared() -> Arc<dyn TextMeasurer> {
        Arc::new(Self::new())
    }
}

impl<B: FontBackend> EgTextMeasurer<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: FontBackend> TextMeasurer for EgTextMeasurer<B> {
    fn advance_px(&self, ch: char, font: &FontSpec) -> Option<f32> {
        let cells = ch.width()?;
        let selection = self.backend.resolve_font(font);
        let metrics = self.backend.metrics(selection.font_id);
        Some((metrics.char_width as usize * cells) as f32)
    }
}

/// Map full-width forms and CJK punctuation onto ASCII look-alikes.
pub fn normalize_text_for_mono(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    let mapped: String = text.chars().map(mono_fallback_char).collect();
    if mapped == text {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(mapped)
    }
}

fn mono_fallback_char(ch: char) -> char {
    match ch {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch),
        '\u{3000}' => ' ',
        '、' => ',',
        '。' | '・' => '.',
        '「' | '『' | '【' => '[',
        '」' | '』' | '】' => ']',
        '\u{2018}' | '\u{2019}' => '\'',
        '\u{201C}' | '\u{201D}' => '"',
        '\u{2013}' | '\u{2014}' | 'ー' => '-',
        _ => ch,
    }
}

/// Pre-decoded monochrome bitmap stored in packed row-major bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonochromeBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl MonochromeBitmap {
    /// Construct a bitmap from packed row-major bits, MSB first.
    pub fn from_packed_bits(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Self, IconRegistryError> {
        if width == 0 || height == 0 {
            return Err(IconRegistryError::InvalidDimensions);
        }
        let Some(required_bytes) = Self::required_bytes(width, height) else {
            return Err(IconRegistryError::InvalidDimensions);
        };
        if pixels.len() != required_bytes {
            return Err(IconRegistryError::InvalidPixelData);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn required_bytes(width: u32, height: u32) -> Option<usize> {
        let pixels = width.checked_mul(height)?;
        Some(pixels.div_ceil(8) as usize)
    }

    pub fn pixel_is_on(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let bit_index = y as usize * self.width as usize + x as usize;
        let bit_in_byte = 7 - (bit_index % 8);
        self.pixels
            .get(bit_index / 8)
            .is_some_and(|byte| (byte >> bit_in_byte) & 0x01 == 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IconRegistryError {
    EmptySource,
    InvalidDimensions,
    InvalidPixelData,
    MaxIconsExceeded,
    MaxTotalPixelsExceeded,
}

impl core::fmt::Display for IconRegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptySource => write!(f, "icon source is empty"),
            Self::InvalidDimensions => write!(f, "icon dimensions are zero or overflow"),
            Self::InvalidPixelData => write!(f, "packed pixel data has the wrong length"),
            Self::MaxIconsExceeded => write!(f, "icon count limit exceeded"),
            Self::MaxTotalPixelsExceeded => write!(f, "icon pixel budget exceeded"),
        }
    }
}

impl std::error::Error for IconRegistryError {}

/// Registry size limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IconRegistryLimits {
    pub max_icons: usize,
    pub max_total_pixels: usize,
}

impl Default for IconRegistryLimits {
    fn default() -> Self {
        Self {
            max_icons: 64,
            max_total_pixels: 512 * 512,
        }
    }
}

/// Inline icons keyed by `<img src>`.
#[derive(Clone, Debug, Default)]
pub struct IconRegistry {
    limits: IconRegistryLimits,
    icons: HashMap<String, MonochromeBitmap>,
    total_pixels: usize,
}

impl IconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: IconRegistryLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Register or replace the bitmap for `src`.
    pub fn register(
        &mut self,
        src: impl Into<String>,
        bitmap: MonochromeBitmap,
    ) -> Result<(), IconRegistryError> {
        let src = src.into();
        if src.trim().is_empty() {
            return Err(IconRegistryError::EmptySource);
        }
        let replaced = self.icons.get(&src).map_or(0, MonochromeBitmap::pixel_count);
        if replaced == 0 && self.icons.len() >= self.limits.max_icons {
            return Err(IconRegistryError::MaxIconsExceeded);
        }
        let total = self.total_pixels - replaced + bitmap.pixel_count();
        if total > self.limits.max_total_pixels {
            return Err(IconRegistryError::MaxTotalPixelsExceeded);
        }
        self.total_pixels = total;
        self.icons.insert(src, bitmap);
        Ok(())
    }

    pub fn bitmap_for(&self, src: &str) -> Option<&MonochromeBitmap> {
        self.icons.get(src)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    pub fn total_pixels(&self) -> usize {
        self.total_pixels
    }
}

/// Counters collected while painting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EgSurfaceDiagnostics {
    pub text_runs: usize,
    pub font_fallbacks: usize,
    pub missing_icons: usize,
    pub unbalanced_restores: usize,
}

#[derive(Clone, Debug)]
struct EgState {
    fill: Fill,
    shadow: Option<Shadow>,
    font: FontSpec,
    scale_x: f32,
}

impl Default for EgState {
    fn default() -> Self {
        Self {
            fill: Fill::default(),
            shadow: None,
            font: FontSpec::new("", 0.0),
            scale_x: 1.0,
        }
    }
}

fn to_rgb(color: Rgba) -> Rgb888 {
    Rgb888::new(color.r, color.g, color.b)
}

/// Adapter that condenses glyph pixels around `origin_x` and recolors them.
struct GlyphTarget<'a, D> {
    inner: &'a mut D,
    origin_x: i32,
    scale_x: f32,
    offset: Point,
    fill: Fill,
}

impl<D: DrawTarget<Color = Rgb888>> Dimensions for GlyphTarget<'_, D> {
    fn bounding_box(&self) -> Rectangle {
        self.inner.bounding_box()
    }
}

impl<D: DrawTarget<Color = Rgb888>> DrawTarget for GlyphTarget<'_, D> {
    type Color = BinaryColor;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (origin_x, scale_x, offset, fill) =
            (self.origin_x, self.scale_x, self.offset, self.fill);
        self.inner.draw_iter(
            pixels
                .into_iter()
                .filter(|Pixel(_, color)| color.is_on())
                .filter_map(move |Pixel(point, _)| {
                    let dx = ((point.x - origin_x) as f32 * scale_x).round() as i32;
                    let x = origin_x + dx + offset.x;
                    let color = fill.color_at(x as f32);
                    (color.a > 0).then(|| Pixel(Point::new(x, point.y + offset.y), to_rgb(color)))
                }),
        )
    }
}

/// [`Surface`] that rasterizes onto an embedded-graphics draw target.
pub struct EgSurface<'d, D, B = MonoFontBackend> {
    display: &'d mut D,
    backend: B,
    icons: Option<&'d IconRegistry>,
    state: EgState,
    stack: Vec<EgState>,
    diagnostics: EgSurfaceDiagnostics,
}

impl<'d, D> EgSurface<'d, D, MonoFontBackend>
where
    D: DrawTarget<Color = Rgb888>,
{
    pub fn new(display: &'d mut D) -> Self {
        Self::with_backend(display, MonoFontBackend)
    }
}

impl<'d, D, B> EgSurface<'d, D, B>
where
    D: DrawTarget<Color = Rgb888>,
    B: FontBackend,
{
    pub fn with_backend(display: &'d mut D, backend: B) -> Self {
        Self {
            display,
            backend,
            icons: None,
            state: EgState::default(),
            stack: Vec::new(),
            diagnostics: EgSurfaceDiagnostics::default(),
        }
    }

    pub fn with_icons(mut self, icons: &'d IconRegistry) -> Self {
        self.icons = Some(icons);
        self
    }

    pub fn diagnostics(&self) -> EgSurfaceDiagnostics {
        self.diagnostics
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn draw_glyphs(
        &mut self,
        text: &str,
        x: f32,
        baseline_y: f32,
        offset: Point,
        fill: Fill,
    ) -> Result<(), D::Error> {
        let selection = self.backend.resolve_font(&self.state.font);
        let font = self.backend.mono_font(selection.font_id);
        let origin = Point::new(x.round() as i32, baseline_y.round() as i32);
        let mut target = GlyphTarget {
            inner: &mut *self.display,
            origin_x: origin.x,
            scale_x: self.state.scale_x,
            offset,
            fill,
        };
        let style = MonoTextStyle::new(font, BinaryColor::On);
        let text = normalize_text_for_mono(text);
        Text::with_baseline(&text, origin, style, Baseline::Alphabetic).draw(&mut target)?;
        Ok(())
    }

    fn count_run(&mut self) {
        self.diagnostics.text_runs += 1;
        if let Some(reason) = self.backend.resolve_font(&self.state.font).fallback_reason {
            self.diagnostics.font_fallbacks += 1;
            log::debug!(
                "[EG] font fallback {reason:?} for {} {}px",
                self.state.font.family,
                self.state.font.size_px
            );
        }
    }
}

impl<D, B> Surface for EgSurface<'_, D, B>
where
    D: DrawTarget<Color = Rgb888>,
    B: FontBackend,
{
    type Error = D::Error;

    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        match self.stack.pop() {
            Some(state) => self.state = state,
            None => self.diagnostics.unbalanced_restores += 1,
        }
    }

    fn set_fill(&mut self, fill: &Fill) {
        self.state.fill = *fill;
    }

    fn set_shadow(&mut self, shadow: Option<&Shadow>) {
        self.state.shadow = shadow.copied();
    }

    fn set_font(&mut self, font: &FontSpec) {
        self.state.font = font.clone();
    }

    fn set_scale_x(&mut self, scale: f32) {
        self.state.scale_x = scale;
    }

    fn fill_text(&mut self, text: &str, x: f32, baseline_y: f32) -> Result<(), D::Error> {
        self.count_run();
        if let Some(shadow) = self.state.shadow {
            let offset = Point::new(shadow.offset_x.round() as i32, shadow.offset_y.round() as i32);
            self.draw_glyphs(text, x, baseline_y, offset, Fill::Solid(shadow.color))?;
        }
        let fill = self.state.fill;
        self.draw_glyphs(text, x, baseline_y, Point::zero(), fill)
    }

    fn stroke_text(
        &mut self,
        text: &str,
        x: f32,
        baseline_y: f32,
        outline: &Outline,
    ) -> Result<(), D::Error> {
        let radius = outline.width.round().max(1.0) as i32;
        let fill = Fill::Solid(outline.color);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx == 0 && dy == 0 {
                    continue;
                }
                self.draw_glyphs(text, x, baseline_y, Point::new(dx, dy), fill)?;
            }
        }
        Ok(())
    }

    fn stroke_rect(&mut self, rect: RectF, color: Rgba, width: f32) -> Result<(), D::Error> {
        let stroke = width.round().max(1.0) as u32;
        Rectangle::new(
            Point::new(rect.x.round() as i32, rect.y.round() as i32),
            Size::new(
                rect.width.round().max(0.0) as u32,
                rect.height.round().max(0.0) as u32,
            ),
        )
        .into_styled(PrimitiveStyle::with_stroke(to_rgb(color), stroke))
        .draw(&mut *self.display)
    }

    fn draw_image(&mut self, src: &str, rect: RectF) -> Result<(), D::Error> {
        let Some(bitmap) = self.icons.and_then(|icons| icons.bitmap_for(src)) else {
            self.diagnostics.missing_icons += 1;
            log::debug!("[EG] missing icon {src}; drawing frame");
            let color = self.state.fill.primary();
            return self.stroke_rect(rect, color, 1.0);
        };
        let width = rect.width.round().max(0.0) as u32;
        let height = rect.height.round().max(0.0) as u32;
        if width == 0 || height == 0 {
            return Ok(());
        }
        let left = rect.x.round() as i32;
        let top = rect.y.round() as i32;
        let fill = self.state.fill;
        let pixels = (0..height).flat_map(move |ty| {
            (0..width).filter_map(move |tx| {
                let sx = tx * bitmap.width() / width;
                let sy = ty * bitmap.height() / height;
                bitmap.pixel_is_on(sx, sy).then(|| {
                    let x = left + tx as i32;
                    Pixel(Point::new(x, top + ty as i32), to_rgb(fill.color_at(x as f32)))
                })
            })
        });
        self.display.draw_iter(pixels)
    }
}
