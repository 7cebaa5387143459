//! Horizontal condensation of overfull lines.

use card_typeset::{Fragment, FragmentKind, InlineStyle};

use crate::line_break::Line;
use crate::metrics::FragmentMetrics;

/// Smallest horizontal scale ever applied.
pub const MIN_SCALE: f32 = 0.05;

/// Default share of the base compression that ruby annotations are spared.
pub const DEFAULT_RUBY_BONUS_RATIO: f32 = 0.1;

/// Refinement passes for lines whose ruby annotations outgrow their base.
const MAX_REFINE_PASSES: usize = 8;

/// Horizontal scales for one line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Condensed {
    pub scale: f32,
    pub ruby_scale: f32,
}

impl Condensed {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        ruby_scale: 1.0,
    };

    fn from_scale(scale: f32, ruby_bonus_ratio: f32) -> Self {
        Self {
            scale,
            ruby_scale: ruby_scale(scale, ruby_bonus_ratio),
        }
    }
}

/// Annotation scale for base scale `scale`: `1 - (1 - scale)(1 - bonus)`.
///
/// Never smaller than `scale` for `bonus` in `[0, 1)`.
pub fn ruby_scale(scale: f32, ruby_bonus_ratio: f32) -> f32 {
    let bonus = ruby_bonus_ratio.clamp(0.0, 1.0);
    (1.0 - (1.0 - scale) * (1.0 - bonus)).clamp(scale, 1.0)
}

/// Scale that fits `natural_width` into `max_width`.
///
/// `uncompressed_width` is the part of `natural_width` that keeps scale 1.
pub fn solve(
    natural_width: f32,
    uncompressed_width: f32,
    max_width: f32,
    ruby_bonus_ratio: f32,
) -> Condensed {
    if natural_width <= max_width {
        return Condensed::IDENTITY;
    }
    let compressible = natural_width - uncompressed_width;
    if compressible <= 0.0 {
        return Condensed::IDENTITY;
    }
    let available = max_width - uncompressed_width;
    let scale = if available <= 0.0 {
        MIN_SCALE
    } else {
        (available / compressible).clamp(MIN_SCALE, 1.0)
    };
    Condensed::from_scale(scale, ruby_bonus_ratio)
}

/// Drawn width of one fragment at the given scales.
pub fn fragment_width(
    fragment: &Fragment,
    metrics: &FragmentMetrics,
    condensed: Condensed,
) -> f32 {
    if fragment.style.contains(InlineStyle::UNCOMPRESSED) {
        return metrics.width;
    }
    match fragment.kind {
        FragmentKind::Ruby { .. } => (metrics.base_width * condensed.scale)
            .max(metrics.annotation_width * condensed.ruby_scale),
        _ => metrics.width * condensed.scale,
    }
}

/// Drawn width of `line` at the given scales.
pub fn line_width(
    line: &Line,
    fragments: &[Fragment],
    metrics: &[FragmentMetrics],
    condensed: Condensed,
) -> f32 {
    line.fragments
        .iter()
        .filter_map(|&idx| Some(fragment_width(fragments.get(idx)?, metrics.get(idx)?, condensed)))
        .sum()
}

/// Condense `line` in place so its drawn width fits `max_width`.
///
/// Ruby annotations shrink by [`ruby_scale`], which is gentler than the base
/// scale, so annotation-dominated lines are refined until they fit or hit
/// [`MIN_SCALE`].
pub fn condense_line(
    line: &mut Line,
    fragments: &[Fragment],
    metrics: &[FragmentMetrics],
    max_width: f32,
    ruby_bonus_ratio: f32,
) {
    let mut condensed = solve(
        line.natural_width,
        line.uncompressed_width,
        max_width,
        ruby_bonus_ratio,
    );
    let mut width = line_width(line, fragments, metrics, condensed);
    let mut passes = 0;
    while width > max_width + 0.01 && condensed.scale > MIN_SCALE && passes < MAX_REFINE_PASSES {
        let compressible = width - line.uncompressed_width;
        let available = max_width - line.uncompressed_width;
        if compressible <= 0.0 {
            break;
        }
        let factor = (available / compressible).clamp(0.0, 1.0);
        let scale = (condensed.scale * factor).clamp(MIN_SCALE, 1.0);
        condensed = Condensed::from_scale(scale, ruby_bonus_ratio);
        width = line_width(line, fragments, metrics, condensed);
        passes += 1;
    }
    line.scale = condensed.scale;
    line.ruby_scale = condensed.ruby_scale;
    line.width = width;
}

/// Condense every line of a layout.
pub fn condense_lines(
    lines: &mut [Line],
    fragments: &[Fragment],
    metrics: &[FragmentMetrics],
    max_width: f32,
    ruby_bonus_ratio: f32,
) {
    for line in lines {
        condense_line(line, fragments, metrics, max_width, ruby_bonus_ratio);
    }
}
