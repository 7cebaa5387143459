//! Table-driven glyph classification for TCG and OCG card text.
//!
//! Every character maps to exactly one [`GlyphClass`]. The class decides the
//! width ratio applied on top of the font advance and the break affinity the
//! line breaker honors at fragment boundaries.

use core::fmt;

/// Card text rule set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CardFormat {
    /// Western trading-card text (Latin script, space-delimited words).
    #[default]
    Tcg,
    /// Japanese card text (kana/kanji with kinsoku rules and ruby).
    Ocg,
}

impl CardFormat {
    /// Stable lowercase name used by configuration payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcg => "tcg",
            Self::Ocg => "ocg",
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutually exclusive character categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlyphClass {
    /// Latin capital letter (ASCII or full-width).
    Capital,
    /// Other Latin letters and digits.
    Latin,
    /// CJK unified ideograph.
    CjkIdeograph,
    /// Regular hiragana/katakana.
    Kana,
    /// Small kana; rendered narrower and never starts a line.
    SmallKana,
    /// Prolonged sound mark `ー`.
    ProlongedSoundMark,
    /// Full-width digit `０`..`９`.
    FullWidthNumeral,
    /// Bullet/ordinal symbol; glued to the following character.
    Bullet,
    /// Must not start a line (closing brackets, trailing punctuation).
    NoStart,
    /// Must not end a line (opening brackets).
    NoEnd,
    /// Must not be split from either neighbor (ellipsis, wave dash).
    NoSplit,
    /// Breakable whitespace.
    Space,
    /// Anything else; breakable on both sides.
    Generic,
}

impl GlyphClass {
    /// The character may not be the first visible glyph of a line.
    pub const fn no_start(self) -> bool {
        matches!(
            self,
            Self::NoStart | Self::SmallKana | Self::ProlongedSoundMark | Self::NoSplit
        )
    }

    /// The character may not be the last visible glyph of a line.
    pub const fn no_end(self) -> bool {
        matches!(self, Self::NoEnd | Self::Bullet | Self::NoSplit)
    }

    /// Whitespace that is dropped at wrap boundaries.
    pub const fn is_space(self) -> bool {
        matches!(self, Self::Space)
    }
}

/// Classification result: class plus width ratio relative to the font advance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub class: GlyphClass,
    pub width_ratio: f32,
}

impl Glyph {
    const fn new(class: GlyphClass, width_ratio: f32) -> Self {
        Self { class, width_ratio }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Formats {
    Both,
    TcgOnly,
    OcgOnly,
}

impl Formats {
    const fn includes(self, format: CardFormat) -> bool {
        match self {
            Self::Both => true,
            Self::TcgOnly => matches!(format, CardFormat::Tcg),
            Self::OcgOnly => matches!(format, CardFormat::Ocg),
        }
    }
}

struct GlyphRule {
    formats: Formats,
    matches: fn(char) -> bool,
    glyph: Glyph,
}

const fn rule(
    formats: Formats,
    matches: fn(char) -> bool,
    class: GlyphClass,
    ratio: f32,
) -> GlyphRule {
    GlyphRule {
        formats,
        matches,
        glyph: Glyph::new(class, ratio),
    }
}

/// Ordered classification table; first matching row wins.
static RULES: &[GlyphRule] = &[
    rule(Formats::Both, is_space, GlyphClass::Space, 1.0),
    rule(Formats::Both, is_no_split, GlyphClass::NoSplit, 1.0),
    rule(Formats::Both, is_bullet, GlyphClass::Bullet, 1.0),
    rule(Formats::OcgOnly, is_narrow_colon, GlyphClass::NoStart, 0.75),
    rule(Formats::OcgOnly, is_wide_stop, GlyphClass::NoStart, 1.25),
    rule(Formats::OcgOnly, is_cjk_no_start, GlyphClass::NoStart, 1.0),
    rule(Formats::Both, is_latin_no_start, GlyphClass::NoStart, 1.0),
    rule(Formats::Both, is_opening_bracket, GlyphClass::NoEnd, 1.0),
    rule(Formats::OcgOnly, is_small_kana, GlyphClass::SmallKana, 0.75),
    rule(
        Formats::OcgOnly,
        is_prolonged_sound_mark,
        GlyphClass::ProlongedSoundMark,
        0.875,
    ),
    rule(Formats::OcgOnly, is_full_width_digit, GlyphClass::FullWidthNumeral, 0.8),
    rule(Formats::TcgOnly, is_full_width_digit, GlyphClass::Latin, 1.0),
    rule(Formats::Both, is_kana, GlyphClass::Kana, 1.0),
    rule(Formats::Both, is_cjk_ideograph, GlyphClass::CjkIdeograph, 1.0),
    rule(Formats::Both, is_capital, GlyphClass::Capital, 1.0),
    rule(Formats::Both, is_latin, GlyphClass::Latin, 1.0),
];

const GENERIC: Glyph = Glyph::new(GlyphClass::Generic, 1.0);

/// Classify one character under `format` rules.
pub fn classify(ch: char, format: CardFormat) -> Glyph {
    RULES
        .iter()
        .find(|rule| rule.formats.includes(format) && (rule.matches)(ch))
        .map(|rule| rule.glyph)
        .unwrap_or(GENERIC)
}

/// Classify a grapheme cluster by its first scalar value.
pub fn classify_cluster(cluster: &str, format: CardFormat) -> Glyph {
    cluster
        .chars()
        .next()
        .map(|ch| classify(ch, format))
        .unwrap_or(GENERIC)
}

/// Whether `ch` belongs to the whole-word class for `format`.
///
/// Whole-word runs are never split by the line breaker.
pub fn is_whole_word_char(ch: char, format: CardFormat) -> bool {
    match format {
        CardFormat::Tcg => {
            ch.is_ascii_alphanumeric()
                || is_latin1_letter(ch)
                || matches!(
                    ch,
                    '\'' | '\u{2019}'
                        | '-'
                        | '.'
                        | ','
                        | ':'
                        | ';'
                        | '!'
                        | '?'
                        | '%'
                        | '&'
                        | '+'
                        | '/'
                        | '"'
                        | '('
                        | ')'
                        | '#'
                        | '*'
                )
        }
        CardFormat::Ocg => {
            ch.is_ascii_alphanumeric()
                || is_full_width_alphanumeric(ch)
                || matches!(ch, '-' | '+' | '%')
        }
    }
}

/// Full-width Latin letters and digits (`U+FF10..U+FF5A`).
pub fn is_full_width_alphanumeric(ch: char) -> bool {
    matches!(ch, '\u{FF10}'..='\u{FF19}' | '\u{FF21}'..='\u{FF3A}' | '\u{FF41}'..='\u{FF5A}')
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\u{00A0}' | '\u{3000}')
}

fn is_no_split(ch: char) -> bool {
    matches!(ch, '\u{2026}' | '\u{2025}' | '\u{301C}' | '\u{FF5E}')
}

fn is_bullet(ch: char) -> bool {
    matches!(
        ch,
        '\u{25CF}' | '\u{25CB}' | '\u{25C6}' | '\u{25A0}' | '\u{2605}' | '\u{2606}' | '\u{2022}'
    )
}

fn is_narrow_colon(ch: char) -> bool {
    ch == '\u{FF1A}'
}

fn is_wide_stop(ch: char) -> bool {
    matches!(ch, '\u{3002}' | '\u{FF64}')
}

fn is_cjk_no_start(ch: char) -> bool {
    matches!(
        ch,
        '\u{3001}' // 、
            | '\u{FF0C}' // ，
            | '\u{FF0E}' // ．
            | '\u{30FB}' // ・
            | '\u{FF1B}' // ；
            | '\u{FF01}' // ！
            | '\u{FF1F}' // ？
            | '\u{FF09}' // ）
            | '\u{300D}' // 」
            | '\u{300F}' // 』
            | '\u{3011}' // 】
            | '\u{3015}' // 〕
            | '\u{3009}' // 〉
            | '\u{300B}' // 》
            | '\u{FF5D}' // ｝
            | '\u{FF3D}' // ］
            | '\u{3005}' // 々
            | '\u{309D}'
            | '\u{309E}'
            | '\u{30FD}'
            | '\u{30FE}'
    )
}

fn is_latin_no_start(ch: char) -> bool {
    matches!(
        ch,
        ',' | '.' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '\u{2019}' | '\u{201D}'
    )
}

fn is_opening_bracket(ch: char) -> bool {
    matches!(
        ch,
        '(' | '['
            | '\u{2018}'
            | '\u{201C}'
            | '\u{FF08}' // （
            | '\u{300C}' // 「
            | '\u{300E}' // 『
            | '\u{3010}' // 【
            | '\u{3014}' // 〔
            | '\u{3008}' // 〈
            | '\u{300A}' // 《
            | '\u{FF5B}' // ｛
            | '\u{FF3B}' // ［
    )
}

fn is_small_kana(ch: char) -> bool {
    matches!(
        ch,
        'ぁ' | 'ぃ'
            | 'ぅ'
            | 'ぇ'
            | 'ぉ'
            | 'っ'
            | 'ゃ'
            | 'ゅ'
            | 'ょ'
            | 'ゎ'
            | 'ゕ'
            | 'ゖ'
            | 'ァ'
            | 'ィ'
            | 'ゥ'
            | 'ェ'
            | 'ォ'
            | 'ッ'
            | 'ャ'
            | 'ュ'
            | 'ョ'
            | 'ヮ'
            | 'ヵ'
            | 'ヶ'
            | '\u{31F0}'..='\u{31FF}'
    )
}

fn is_prolonged_sound_mark(ch: char) -> bool {
    matches!(ch, '\u{30FC}' | '\u{FF70}')
}

fn is_full_width_digit(ch: char) -> bool {
    matches!(ch, '\u{FF10}'..='\u{FF19}')
}

fn is_kana(ch: char) -> bool {
    matches!(ch, '\u{3041}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{FF66}'..='\u{FF9D}')
}

fn is_cjk_ideograph(ch: char) -> bool {
    matches!(
        ch,
        '\u{3007}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{2FFFF}'
    )
}

fn is_capital(ch: char) -> bool {
    ch.is_ascii_uppercase() || matches!(ch, '\u{FF21}'..='\u{FF3A}')
}

fn is_latin(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || is_latin1_letter(ch) || matches!(ch, '\u{FF41}'..='\u{FF5A}')
}

fn is_latin1_letter(ch: char) -> bool {
    matches!(ch, '\u{00C0}'..='\u{00FF}') && ch != '\u{00D7}' && ch != '\u{00F7}'
}
