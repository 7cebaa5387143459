//! Greedy line breaking with tolerance-tier escalation.
//!
//! Fragments are first glued into groups: a group ends only at a boundary
//! that lies outside every non-breakable zone and that break affinity allows.
//! Groups are then packed greedily against a per-line budget. The budget
//! escalates through the 1-, 2- and 3-line tolerance thresholds until the
//! packed result has no more lines than the tier allows. The threshold alone
//! decides acceptance; the box width is only the condensation target.

use card_typeset::{CardFormat, Fragment, InlineStyle};
use smallvec::SmallVec;

use crate::layout_config::CondenseTolerance;
use crate::metrics::{FontMetricsRecord, FragmentMetrics};

/// Budget multipliers tried after every tolerance tier failed.
const FALLBACK_LADDER: [f32; 9] = [1.0, 1.1, 1.25, 1.5, 2.0, 3.0, 4.0, 6.0, 8.0];

/// One laid-out line.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    /// Indices into the field's fragment list, in drawing order.
    pub fragments: SmallVec<[usize; 16]>,
    /// Width at scale 1.
    pub natural_width: f32,
    /// Part of `natural_width` exempt from condensation.
    pub uncompressed_width: f32,
    /// Drawn width after condensation.
    pub width: f32,
    pub scale: f32,
    pub ruby_scale: f32,
    /// Baseline offset from the first line.
    pub baseline_y: f32,
    /// Ended by an explicit line marker or a full-line placeholder.
    pub forced: bool,
}

impl Line {
    fn empty() -> Self {
        Self {
            fragments: SmallVec::new(),
            natural_width: 0.0,
            uncompressed_width: 0.0,
            width: 0.0,
            scale: 1.0,
            ruby_scale: 1.0,
            baseline_y: 0.0,
            forced: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Whether the line was condensed.
    pub fn is_condensed(&self) -> bool {
        self.scale < 1.0
    }
}

/// How the accepted line budget was found.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Escalation {
    /// A tolerance tier accepted the text in at most `lines` lines.
    Tier { lines: u8 },
    /// Plain wrapping at the box width within the record's line limit.
    Wrapped,
    /// Every tier failed; packed into at most `cap` lines at `budget`.
    Fallback { budget: f32, cap: usize },
}

/// Breaker output, lines still at scale 1.
#[derive(Clone, Debug, PartialEq)]
pub struct BrokenLines {
    pub lines: Vec<Line>,
    pub escalation: Escalation,
}

/// Whether a line may break between `prev` and `next`.
pub fn can_break(prev: &Fragment, next: &Fragment, format: CardFormat) -> bool {
    let zone = prev.zone_id();
    if zone != 0 && zone == next.zone_id() {
        return false;
    }
    // Must-not-start is checked first; the boundary is refused either way and
    // the packer falls back to the previous opportunity.
    if next.no_start(format) || prev.no_end(format) {
        return false;
    }
    if prev.is_word() && next.is_word() {
        return false;
    }
    match format {
        CardFormat::Tcg => prev.is_space() || next.is_space(),
        CardFormat::Ocg => true,
    }
}

#[derive(Clone, Copy, Debug)]
enum Piece {
    /// Explicit line marker.
    Hard,
    /// Full-line placeholder; owns a whole line.
    Flush(usize),
    /// Glued fragment range.
    Group {
        start: usize,
        end: usize,
        width: f32,
        space: bool,
    },
}

fn pieces(fragments: &[Fragment], metrics: &[FragmentMetrics], format: CardFormat) -> Vec<Piece> {
    let mut out = Vec::with_capacity(fragments.len());
    let mut group: Option<(usize, f32)> = None;
    let close = |out: &mut Vec<Piece>, group: &mut Option<(usize, f32)>, end: usize| {
        if let Some((start, width)) = group.take() {
            let space = fragments[start..end]
                .iter()
                .all(|f| f.is_space() && !f.style.contains(InlineStyle::PRE));
            out.push(Piece::Group {
                start,
                end,
                width,
                space,
            });
        }
    };
    for (idx, fragment) in fragments.iter().enumerate() {
        if fragment.is_line_break() {
            close(&mut out, &mut group, idx);
            out.push(Piece::Hard);
            continue;
        }
        if fragment.is_full_line() {
            close(&mut out, &mut group, idx);
            out.push(Piece::Flush(idx));
            continue;
        }
        let width = metrics.get(idx).map_or(0.0, |m| m.width);
        group.get_or_insert((idx, 0.0)).1 += width;
        let breakable = match fragments.get(idx + 1) {
            Some(next) if !next.is_line_break() && !next.is_full_line() => {
                can_break(fragment, next, format)
            }
            _ => true,
        };
        if breakable {
            close(&mut out, &mut group, idx + 1);
        }
    }
    close(&mut out, &mut group, fragments.len());
    out
}

struct Packer<'a> {
    fragments: &'a [Fragment],
    metrics: &'a [FragmentMetrics],
    budget: f32,
    lines: Vec<Line>,
    current: Line,
    pending_spaces: SmallVec<[(usize, usize); 2]>,
    soft_start: bool,
}

impl<'a> Packer<'a> {
    fn new(fragments: &'a [Fragment], metrics: &'a [FragmentMetrics], budget: f32) -> Self {
        Self {
            fragments,
            metrics,
            budget,
            lines: Vec::new(),
            current: Line::empty(),
            pending_spaces: SmallVec::new(),
            soft_start: false,
        }
    }

    fn pending_width(&self) -> f32 {
        self.pending_spaces
            .iter()
            .flat_map(|&(start, end)| start..end)
            .map(|idx| self.width_of(idx))
            .sum()
    }

    fn width_of(&self, idx: usize) -> f32 {
        self.metrics.get(idx).map_or(0.0, |m| m.width)
    }

    fn push_range(&mut self, start: usize, end: usize) {
        for idx in start..end {
            let width = self.width_of(idx);
            self.current.fragments.push(idx);
            self.current.natural_width += width;
            if self
                .fragments
                .get(idx)
                .is_some_and(|f| f.style.contains(InlineStyle::UNCOMPRESSED))
            {
                self.current.uncompressed_width += width;
            }
        }
    }

    fn commit_spaces(&mut self) {
        let pending = core::mem::take(&mut self.pending_spaces);
        for (start, end) in pending {
            self.push_range(start, end);
        }
    }

    /// Trailing spaces are dropped at every line end.
    fn finish_line(&mut self, forced: bool) {
        self.pending_spaces.clear();
        let mut line = core::mem::replace(&mut self.current, Line::empty());
        line.forced = forced;
        line.width = line.natural_width;
        self.lines.push(line);
        self.soft_start = !forced;
    }

    fn place(&mut self, piece: Piece) {
        match piece {
            Piece::Hard => self.finish_line(true),
            Piece::Flush(idx) => {
                if !self.current.is_empty() {
                    self.finish_line(true);
                }
                self.pending_spaces.clear();
                self.push_range(idx, idx + 1);
                self.finish_line(true);
            }
            Piece::Group {
                start,
                end,
                width,
                space,
            } => {
                if space {
                    if !(self.current.is_empty() && self.soft_start) {
                        self.pending_spaces.push((start, end));
                    }
                    return;
                }
                let needed = self.current.natural_width + self.pending_width() + width;
                if !self.current.is_empty() && needed > self.budget {
                    self.finish_line(false);
                }
                self.commit_spaces();
                self.push_range(start, end);
            }
        }
    }

    fn finish(mut self) -> Vec<Line> {
        if !self.current.is_empty() {
            self.finish_line(false);
        }
        if let Some(last) = self.lines.last_mut() {
            last.forced = false;
        }
        self.lines
    }
}

fn pack(
    pieces: &[Piece],
    fragments: &[Fragment],
    metrics: &[FragmentMetrics],
    budget: f32,
) -> Vec<Line> {
    let mut packer = Packer::new(fragments, metrics, budget);
    for piece in pieces {
        packer.place(*piece);
    }
    packer.finish()
}

/// Break `fragments` into lines for one font record.
///
/// Tiers are tried for 1 up to `min(3, record.max_lines)` lines. When none
/// accepts the text, records allowing more than three lines try plain
/// wrapping at `max_width`. The last resort walks a fixed budget ladder and
/// keeps the first result with at most `max(record.max_lines, forced)`
/// lines, where `forced` is the line count explicit markers alone produce.
pub fn break_lines(
    fragments: &[Fragment],
    metrics: &[FragmentMetrics],
    format: CardFormat,
    max_width: f32,
    record: &FontMetricsRecord,
    tolerance: &CondenseTolerance,
) -> BrokenLines {
    let pieces = pieces(fragments, metrics, format);
    let max_lines = usize::from(record.max_lines.max(1));
    let tiers = max_lines.min(CondenseTolerance::TIERS);

    let mut last_threshold = max_width;
    for n in 1..=tiers {
        let threshold = tolerance.threshold(n).unwrap_or(max_width);
        last_threshold = threshold;
        let lines = pack(&pieces, fragments, metrics, threshold);
        if lines.len() <= n {
            return finish(lines, record, Escalation::Tier { lines: n as u8 });
        }
    }

    if max_lines > CondenseTolerance::TIERS {
        let lines = pack(&pieces, fragments, metrics, max_width);
        if lines.len() <= max_lines {
            return finish(lines, record, Escalation::Wrapped);
        }
    }

    let forced = pack(&pieces, fragments, metrics, f32::INFINITY).len();
    let cap = max_lines.max(forced);
    let base = last_threshold.max(max_width);
    for factor in FALLBACK_LADDER {
        let budget = base * factor;
        let lines = pack(&pieces, fragments, metrics, budget);
        if lines.len() <= cap {
            return finish(lines, record, Escalation::Fallback { budget, cap });
        }
    }
    let lines = pack(&pieces, fragments, metrics, f32::INFINITY);
    finish(
        lines,
        record,
        Escalation::Fallback {
            budget: f32::INFINITY,
            cap,
        },
    )
}

fn finish(mut lines: Vec<Line>, record: &FontMetricsRecord, escalation: Escalation) -> BrokenLines {
    for (idx, line) in lines.iter_mut().enumerate() {
        line.baseline_y = idx as f32 * record.line_height;
    }
    log::debug!(
        "broke {} line(s) at font size {} via {:?}",
        lines.len(),
        record.font_size,
        escalation
    );
    BrokenLines { lines, escalation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::ToleranceTier;
    use crate::metrics::{FontSpec, FragmentMeasurer, TextMeasurer};
    use card_typeset::{init_dictionary, resolve, split};
    use std::sync::Arc;

    struct Mono(f32);

    impl TextMeasurer for Mono {
        fn advance_px(&self, _ch: char, _font: &FontSpec) -> Option<f32> {
            Some(self.0)
        }
    }

    fn layout(
        raw: &str,
        format: CardFormat,
        max_width: f32,
        max_lines: u8,
        tolerance: &CondenseTolerance,
    ) -> (Vec<Fragment>, BrokenLines) {
        let fragments = split(&resolve(raw, format, &init_dictionary(format)), format);
        let record = FontMetricsRecord::new(10.0, 12.0, max_lines);
        let measurer = Mono(10.0);
        let metrics = FragmentMeasurer::new(&measurer, &record, Arc::from("mono"), format, max_width)
            .measure_all(&fragments);
        let broken = break_lines(&fragments, &metrics, format, max_width, &record, tolerance);
        (fragments, broken)
    }

    fn line_texts(fragments: &[Fragment], broken: &BrokenLines) -> Vec<String> {
        broken
            .lines
            .iter()
            .map(|line| line.fragments.iter().map(|&i| fragments[i].text()).collect())
            .collect()
    }

    fn tolerance(one: f32, two: f32, three: f32) -> CondenseTolerance {
        CondenseTolerance::from_thresholds([("1", one), ("2", two), ("3", three)])
            .expect("valid thresholds")
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let tol = tolerance(100.0, 100.0, 100.0);
        let (_, broken) = layout("abc def", CardFormat::Tcg, 100.0, 3, &tol);
        assert_eq!(broken.lines.len(), 1);
        assert_eq!(broken.escalation, Escalation::Tier { lines: 1 });
        assert_eq!(broken.lines[0].natural_width, 70.0);
    }

    #[test]
    fn tier_thresholds_allow_overfull_lines() {
        // 15 glyphs at 10px = 150px natural width; 1-line budget 160.
        let tol = tolerance(160.0, 160.0, 160.0);
        let (_, broken) = layout("aaaaaaa bbbbbbb", CardFormat::Tcg, 100.0, 3, &tol);
        assert_eq!(broken.lines.len(), 1);
        assert_eq!(broken.lines[0].natural_width, 150.0);
    }

    #[test]
    fn stricter_tiers_wrap_text_that_looser_tiers_keep_whole() {
        // 650px natural width in a 686px box.
        let raw = "あ".repeat(65);
        let lines_for = |tier: ToleranceTier| {
            let tol = CondenseTolerance::from_tier(tier);
            let (_, broken) = layout(&raw, CardFormat::Ocg, 686.0, 3, &tol);
            (broken.lines.len(), broken.escalation)
        };
        assert_eq!(lines_for(ToleranceTier::VeryStrict), (2, Escalation::Tier { lines: 2 }));
        // 640 refuses one line; the 660 two-line budget takes it all.
        assert_eq!(lines_for(ToleranceTier::Strict), (1, Escalation::Tier { lines: 2 }));
        for tier in [ToleranceTier::Normal, ToleranceTier::Loose, ToleranceTier::Relaxed] {
            assert_eq!(lines_for(tier), (1, Escalation::Tier { lines: 1 }), "{tier:?}");
        }

        let tol = CondenseTolerance::from_tier(ToleranceTier::VeryStrict);
        let (_, broken) = layout(&raw, CardFormat::Ocg, 686.0, 3, &tol);
        assert_eq!(broken.lines[0].natural_width, 620.0);
        assert_eq!(broken.lines[1].natural_width, 30.0);
    }

    #[test]
    fn escalates_to_two_lines_and_drops_wrap_spaces() {
        let tol = tolerance(100.0, 100.0, 100.0);
        let (fragments, broken) = layout("aaaaaaa bbbbbbb", CardFormat::Tcg, 100.0, 3, &tol);
        assert_eq!(broken.escalation, Escalation::Tier { lines: 2 });
        assert_eq!(line_texts(&fragments, &broken), vec!["aaaaaaa", "bbbbbbb"]);
        assert_eq!(broken.lines[1].baseline_y, 12.0);
        assert!(!broken.lines[0].forced);
    }

    #[test]
    fn explicit_line_marker_forces_two_lines() {
        let tol = CondenseTolerance::from_tier(ToleranceTier::Relaxed);
        let (fragments, broken) = layout("ab\ncd", CardFormat::Tcg, 1000.0, 3, &tol);
        assert_eq!(line_texts(&fragments, &broken), vec!["ab", "cd"]);
        assert!(broken.lines[0].forced);
        assert!(!broken.lines[1].forced);
    }

    #[test]
    fn interior_empty_lines_are_kept_trailing_dropped() {
        let tol = CondenseTolerance::default();
        let (fragments, broken) = layout("a\n\nb\n", CardFormat::Tcg, 1000.0, 3, &tol);
        assert_eq!(line_texts(&fragments, &broken), vec!["a", "", "b"]);
    }

    #[test]
    fn oversized_word_sits_alone() {
        let tol = tolerance(100.0, 100.0, 100.0);
        let word = "x".repeat(30);
        let raw = format!("a {word} b");
        let (fragments, broken) = layout(&raw, CardFormat::Tcg, 100.0, 3, &tol);
        assert_eq!(line_texts(&fragments, &broken), vec!["a".to_string(), word, "b".to_string()]);
        assert_eq!(broken.lines[1].natural_width, 300.0);
    }

    #[test]
    fn zones_are_never_split() {
        let tol = tolerance(30.0, 30.0, 30.0);
        let (fragments, broken) = layout("あ[速攻魔法]い", CardFormat::Ocg, 30.0, 3, &tol);
        for line in &broken.lines {
            let zones: Vec<u32> = line.fragments.iter().map(|&i| fragments[i].zone_id()).collect();
            for zone in zones.iter().copied().filter(|z| *z != 0) {
                let total = fragments.iter().filter(|f| f.zone_id() == zone).count();
                let here = zones.iter().filter(|z| **z == zone).count();
                assert_eq!(here, total);
            }
        }
    }

    #[test]
    fn kinsoku_pulls_the_previous_glyph_down() {
        // Budget fits three glyphs; 「 must not end, 。 must not start.
        let tol = tolerance(30.0, 30.0, 30.0);
        let (fragments, broken) = layout("あいう。「え」", CardFormat::Ocg, 30.0, 3, &tol);
        for line in &broken.lines {
            let first = &fragments[line.fragments[0]];
            let last = &fragments[*line.fragments.last().expect("non-empty line")];
            assert!(!first.no_start(CardFormat::Ocg), "{:?}", line_texts(&fragments, &broken));
            assert!(!last.no_end(CardFormat::Ocg), "{:?}", line_texts(&fragments, &broken));
        }
        assert_eq!(line_texts(&fragments, &broken)[0], "あい");
    }

    #[test]
    fn fallback_respects_line_cap() {
        let tol = tolerance(50.0, 50.0, 50.0);
        let raw = "aa bb cc dd ee ff gg hh ii jj";
        let (_, broken) = layout(raw, CardFormat::Tcg, 50.0, 3, &tol);
        assert!(broken.lines.len() <= 3);
        assert!(matches!(broken.escalation, Escalation::Fallback { cap: 3, .. }));
    }

    #[test]
    fn forced_lines_raise_the_cap() {
        let tol = tolerance(50.0, 50.0, 50.0);
        let (_, broken) = layout("a\nb\nc\nd\ne", CardFormat::Tcg, 50.0, 3, &tol);
        assert_eq!(broken.lines.len(), 5);
        assert!(matches!(broken.escalation, Escalation::Fallback { cap: 5, .. }));
    }

    #[test]
    fn records_with_more_lines_wrap_at_box_width() {
        let tol = tolerance(50.0, 50.0, 50.0);
        let raw = "aa bb cc dd ee ff gg hh";
        let (_, broken) = layout(raw, CardFormat::Tcg, 50.0, 8, &tol);
        assert_eq!(broken.escalation, Escalation::Wrapped);
        assert!(broken.lines.iter().all(|l| l.natural_width <= 50.0));
    }

    #[test]
    fn pre_lines_are_not_wrapped() {
        let tol = tolerance(30.0, 30.0, 30.0);
        let (fragments, broken) = layout("<pre>abc def\nghi</pre>", CardFormat::Tcg, 30.0, 3, &tol);
        assert_eq!(line_texts(&fragments, &broken), vec!["abc def", "ghi"]);
    }

    #[test]
    fn breaking_is_deterministic() {
        let tol = CondenseTolerance::default();
        let raw = "{召|しょう}{喚|かん}に成功した場合、自分の墓地のモンスター1体を対象として発動できる。";
        let first = layout(raw, CardFormat::Ocg, 120.0, 3, &tol).1;
        for _ in 0..5 {
            assert_eq!(layout(raw, CardFormat::Ocg, 120.0, 3, &tol).1, first);
        }
    }
}
