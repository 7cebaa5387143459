//! Fragment splitting: marker-encoded text into indivisible layout units.

use core::ops::Range;

use bitflags::bitflags;
use unicode_segmentation::UnicodeSegmentation;

use crate::glyph_class::{
    classify, classify_cluster, is_full_width_alphanumeric, is_whole_word_char, CardFormat, Glyph,
};
use crate::markup::parse_placeholder;
use crate::normalized::{marker, NormalizedText};

bitflags! {
    /// Inline styling active for a fragment.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct InlineStyle: u8 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const PRE = 1 << 2;
        const BOXED = 1 << 3;
        const UNCOMPRESSED = 1 << 4;
    }
}

/// Script of a whole-word run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WordScript {
    /// ASCII/Latin letters, digits and word symbols.
    LatinWord,
    /// Full-width Latin letters and digits set inline in Japanese text.
    CjkRun,
}

/// Kind of non-breakable zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneKind {
    /// Ruby group, keyword expansion or boxed run.
    Word,
    /// One author line inside `<pre>`.
    Line,
}

/// Outermost non-breakable zone enclosing a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Zone {
    pub id: u32,
    pub kind: ZoneKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FragmentKind {
    Ruby {
        base: String,
        annotation: String,
    },
    Word {
        text: String,
        script: WordScript,
    },
    /// One grapheme cluster.
    Char {
        ch: String,
        glyph: Glyph,
    },
    Placeholder {
        raw: String,
        src: String,
        width_px: Option<u16>,
        full_line: bool,
    },
    LineBreak,
}

/// Atomic layout unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub kind: FragmentKind,
    /// Byte range in the source [`NormalizedText`], markers included.
    pub span: Range<usize>,
    pub style: InlineStyle,
    pub zone: Option<Zone>,
}

impl Fragment {
    /// Visible text drawn for the fragment (ruby base only).
    pub fn text(&self) -> &str {
        match &self.kind {
            FragmentKind::Ruby { base, .. } => base,
            FragmentKind::Word { text, .. } => text,
            FragmentKind::Char { ch, .. } => ch,
            FragmentKind::Placeholder { .. } | FragmentKind::LineBreak => "",
        }
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self.kind, FragmentKind::LineBreak)
    }

    pub fn is_space(&self) -> bool {
        matches!(&self.kind, FragmentKind::Char { glyph, .. } if glyph.class.is_space())
    }

    pub fn is_full_line(&self) -> bool {
        matches!(self.kind, FragmentKind::Placeholder { full_line: true, .. })
    }

    pub fn is_ruby(&self) -> bool {
        matches!(self.kind, FragmentKind::Ruby { .. })
    }

    pub fn is_word(&self) -> bool {
        matches!(self.kind, FragmentKind::Word { .. })
    }

    /// The fragment must not begin a line.
    pub fn no_start(&self, format: CardFormat) -> bool {
        match &self.kind {
            FragmentKind::Char { glyph, .. } => glyph.class.no_start(),
            FragmentKind::Word { text, .. } => text
                .chars()
                .next()
                .is_some_and(|ch| classify(ch, format).class.no_start()),
            _ => false,
        }
    }

    /// The fragment must not end a line.
    pub fn no_end(&self, format: CardFormat) -> bool {
        match &self.kind {
            FragmentKind::Char { glyph, .. } => glyph.class.no_end(),
            FragmentKind::Word { text, .. } => text
                .chars()
                .next_back()
                .is_some_and(|ch| classify(ch, format).class.no_end()),
            _ => false,
        }
    }

    pub fn zone_id(&self) -> u32 {
        self.zone.map_or(0, |zone| zone.id)
    }
}

/// Split `text` into fragments whose spans partition it.
///
/// Priority at each position: ruby group, whole-word run, placeholder, then
/// a single grapheme cluster. Open markers are absorbed into the span of the
/// next fragment and close markers into the span of the previous one.
pub fn split(text: &NormalizedText, format: CardFormat) -> Vec<Fragment> {
    Splitter::new(text.as_str(), format).run()
}

struct Splitter<'a> {
    src: &'a str,
    format: CardFormat,
    out: Vec<Fragment>,
    pending_start: Option<usize>,
    style_depth: [u16; 5],
    word_depth: u32,
    line_depth: u32,
    next_zone: u32,
    zone: Option<Zone>,
    full_line_pending: bool,
}

const STYLE_FLAGS: [InlineStyle; 5] = [
    InlineStyle::BOLD,
    InlineStyle::ITALIC,
    InlineStyle::PRE,
    InlineStyle::BOXED,
    InlineStyle::UNCOMPRESSED,
];

impl<'a> Splitter<'a> {
    fn new(src: &'a str, format: CardFormat) -> Self {
        Self {
            src,
            format,
            out: Vec::with_capacity(src.len() / 2),
            pending_start: None,
            style_depth: [0; 5],
            word_depth: 0,
            line_depth: 0,
            next_zone: 0,
            zone: None,
            full_line_pending: false,
        }
    }

    fn style(&self) -> InlineStyle {
        let mut style = InlineStyle::empty();
        for (flag, depth) in STYLE_FLAGS.iter().zip(self.style_depth.iter()) {
            if *depth > 0 {
                style |= *flag;
            }
        }
        style
    }

    fn adjust_style(&mut self, flag: InlineStyle, open: bool) {
        if let Some(idx) = STYLE_FLAGS.iter().position(|f| *f == flag) {
            let depth = &mut self.style_depth[idx];
            *depth = if open {
                depth.saturating_add(1)
            } else {
                depth.saturating_sub(1)
            };
        }
    }

    fn open_zone(&mut self, kind: ZoneKind) {
        if self.word_depth == 0 && self.line_depth == 0 {
            self.next_zone += 1;
            self.zone = Some(Zone {
                id: self.next_zone,
                kind,
            });
        }
        match kind {
            ZoneKind::Word => self.word_depth += 1,
            ZoneKind::Line => self.line_depth += 1,
        }
    }

    fn close_zone(&mut self, kind: ZoneKind) {
        match kind {
            ZoneKind::Word => self.word_depth = self.word_depth.saturating_sub(1),
            ZoneKind::Line => self.line_depth = self.line_depth.saturating_sub(1),
        }
        if self.word_depth == 0 && self.line_depth == 0 {
            self.zone = None;
        }
    }

    /// Absorb an open marker into the next fragment.
    fn open_marker(&mut self, pos: usize) {
        self.pending_start.get_or_insert(pos);
    }

    /// Absorb a close marker into the previous fragment.
    fn close_marker(&mut self, end: usize) {
        if self.pending_start.is_some() {
            return;
        }
        match self.out.last_mut() {
            Some(last) => last.span.end = end,
            None => self.pending_start = Some(end - marker_len()),
        }
    }

    fn emit(&mut self, kind: FragmentKind, start: usize, end: usize) {
        let start = self.pending_start.take().unwrap_or(start);
        let zone = if matches!(kind, FragmentKind::LineBreak) {
            None
        } else {
            self.zone
        };
        self.out.push(Fragment {
            kind,
            span: start..end,
            style: self.style(),
            zone,
        });
    }

    fn run(mut self) -> Vec<Fragment> {
        let src = self.src;
        let mut pos = 0;
        while pos < src.len() {
            let Some(ch) = src[pos..].chars().next() else {
                break;
            };
            let next = pos + ch.len_utf8();
            match ch {
                marker::NOBREAK_WORD_OPEN => {
                    self.open_marker(pos);
                    self.open_zone(ZoneKind::Word);
                }
                marker::NOBREAK_WORD_CLOSE => {
                    self.close_marker(next);
                    self.close_zone(ZoneKind::Word);
                }
                marker::NOBREAK_LINE_OPEN => {
                    self.open_marker(pos);
                    self.adjust_style(InlineStyle::PRE, true);
                    self.open_zone(ZoneKind::Line);
                }
                marker::NOBREAK_LINE_CLOSE => {
                    self.close_marker(next);
                    self.adjust_style(InlineStyle::PRE, false);
                    self.close_zone(ZoneKind::Line);
                }
                marker::BOLD_OPEN | marker::ITALIC_OPEN | marker::BOX_OPEN
                | marker::UNCOMPRESSED_OPEN => {
                    self.open_marker(pos);
                    self.adjust_style(style_for_marker(ch), true);
                }
                marker::BOLD_CLOSE | marker::ITALIC_CLOSE | marker::BOX_CLOSE
                | marker::UNCOMPRESSED_CLOSE => {
                    self.close_marker(next);
                    self.adjust_style(style_for_marker(ch), false);
                }
                marker::LINE_PLACEHOLDER => {
                    self.open_marker(pos);
                    self.full_line_pending = true;
                }
                marker::RUBY_OPEN => {
                    pos = self.ruby(pos);
                    continue;
                }
                marker::PLACEHOLDER_OPEN => {
                    pos = self.placeholder(pos);
                    continue;
                }
                marker::LINE_BREAK => {
                    self.emit(FragmentKind::LineBreak, pos, next);
                    if let Some(Zone {
                        kind: ZoneKind::Line,
                        ..
                    }) = self.zone
                    {
                        self.next_zone += 1;
                        self.zone = Some(Zone {
                            id: self.next_zone,
                            kind: ZoneKind::Line,
                        });
                    }
                }
                // Stray ruby separators/closes only occur in hand-built text.
                marker::RUBY_SEP | marker::RUBY_CLOSE | marker::PLACEHOLDER_CLOSE => {
                    self.close_marker(next);
                }
                _ if is_whole_word_char(ch, self.format) => {
                    pos = self.word(pos);
                    continue;
                }
                _ => {
                    let cluster = src[pos..].graphemes(true).next().unwrap_or_default();
                    let end = cluster_end(src, pos, cluster);
                    let visible = &src[pos..end];
                    self.emit(
                        FragmentKind::Char {
                            ch: visible.to_string(),
                            glyph: classify_cluster(visible, self.format),
                        },
                        pos,
                        end,
                    );
                    pos = end;
                    continue;
                }
            }
            pos = next;
        }
        if let Some(start) = self.pending_start.take() {
            if let Some(last) = self.out.last_mut() {
                last.span.end = src.len();
            } else {
                log::debug!("normalized text holds only markers from byte {}", start);
            }
        }
        self.out
    }

    fn ruby(&mut self, pos: usize) -> usize {
        let src = self.src;
        let body_start = pos + marker_len();
        let sep = src[body_start..].find(marker::RUBY_SEP).map(|i| body_start + i);
        let close = src[body_start..]
            .find(marker::RUBY_CLOSE)
            .map(|i| body_start + i);
        match (sep, close) {
            (Some(sep), Some(close)) if sep < close => {
                let end = close + marker_len();
                self.emit(
                    FragmentKind::Ruby {
                        base: src[body_start..sep].to_string(),
                        annotation: src[sep + marker_len()..close].to_string(),
                    },
                    pos,
                    end,
                );
                end
            }
            _ => {
                self.open_marker(pos);
                body_start
            }
        }
    }

    fn placeholder(&mut self, pos: usize) -> usize {
        let src = self.src;
        let body_start = pos + marker_len();
        let Some(close) = src[body_start..]
            .find(marker::PLACEHOLDER_CLOSE)
            .map(|i| body_start + i)
        else {
            self.open_marker(pos);
            return body_start;
        };
        let raw = &src[body_start..close];
        let attrs = parse_placeholder(raw);
        let full_line = core::mem::take(&mut self.full_line_pending)
            || attrs.as_ref().is_some_and(|a| a.full_line);
        let end = close + marker_len();
        self.emit(
            FragmentKind::Placeholder {
                raw: raw.to_string(),
                src: attrs
                    .as_ref()
                    .map_or_else(|| raw.to_string(), |a| a.src.clone()),
                width_px: attrs.as_ref().and_then(|a| a.width_px),
                full_line,
            },
            pos,
            end,
        );
        end
    }

    fn word(&mut self, pos: usize) -> usize {
        let src = self.src;
        let mut end = pos;
        for (offset, cluster) in src[pos..].grapheme_indices(true) {
            let Some(first) = cluster.chars().next() else {
                break;
            };
            if !is_whole_word_char(first, self.format) {
                break;
            }
            end = cluster_end(src, pos + offset, cluster);
            if end < pos + offset + cluster.len() {
                break;
            }
        }
        let text = &src[pos..end];
        let script = if text.chars().next().is_some_and(is_full_width_alphanumeric) {
            WordScript::CjkRun
        } else {
            WordScript::LatinWord
        };
        self.emit(
            FragmentKind::Word {
                text: text.to_string(),
                script,
            },
            pos,
            end,
        );
        end
    }
}

/// End of the visible part of `cluster`; clusters never swallow markers.
fn cluster_end(src: &str, start: usize, cluster: &str) -> usize {
    let visible = cluster
        .char_indices()
        .find(|(idx, ch)| *idx > 0 && marker::is_control(*ch))
        .map_or(cluster.len(), |(idx, _)| idx);
    let end = start + visible.max(1);
    // A cluster always covers at least its first scalar.
    let first_len = src[start..].chars().next().map_or(1, char::len_utf8);
    end.max(start + first_len)
}

const fn marker_len() -> usize {
    // All private-use markers are three bytes in UTF-8.
    3
}

fn style_for_marker(ch: char) -> InlineStyle {
    match ch {
        marker::BOLD_OPEN | marker::BOLD_CLOSE => InlineStyle::BOLD,
        marker::ITALIC_OPEN | marker::ITALIC_CLOSE => InlineStyle::ITALIC,
        marker::BOX_OPEN | marker::BOX_CLOSE => InlineStyle::BOXED,
        marker::UNCOMPRESSED_OPEN | marker::UNCOMPRESSED_CLOSE => InlineStyle::UNCOMPRESSED,
        _ => InlineStyle::empty(),
    }
}
