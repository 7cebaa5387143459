//! Marker-encoded text produced by the markup resolver.

use core::fmt;

use crate::markup::{StyleTag, Token};

/// Private-use control characters that encode resolved markup.
pub mod marker {
    pub const RUBY_OPEN: char = '\u{E000}';
    pub const RUBY_SEP: char = '\u{E001}';
    pub const RUBY_CLOSE: char = '\u{E002}';
    pub const NOBREAK_WORD_OPEN: char = '\u{E003}';
    pub const NOBREAK_WORD_CLOSE: char = '\u{E004}';
    pub const NOBREAK_LINE_OPEN: char = '\u{E005}';
    pub const NOBREAK_LINE_CLOSE: char = '\u{E006}';
    pub const UNCOMPRESSED_OPEN: char = '\u{E007}';
    pub const UNCOMPRESSED_CLOSE: char = '\u{E008}';
    pub const BOX_OPEN: char = '\u{E009}';
    pub const BOX_CLOSE: char = '\u{E00A}';
    pub const BOLD_OPEN: char = '\u{E00B}';
    pub const BOLD_CLOSE: char = '\u{E00C}';
    pub const ITALIC_OPEN: char = '\u{E00D}';
    pub const ITALIC_CLOSE: char = '\u{E00E}';
    pub const PLACEHOLDER_OPEN: char = '\u{E00F}';
    pub const PLACEHOLDER_CLOSE: char = '\u{E010}';
    pub const LINE_PLACEHOLDER: char = '\u{E011}';
    /// Explicit author line break.
    pub const LINE_BREAK: char = '\n';

    /// Whether `ch` is one of the private-use markers above.
    pub const fn is_marker(ch: char) -> bool {
        matches!(ch, '\u{E000}'..='\u{E011}')
    }

    /// Whether `ch` is a marker or the explicit line break.
    pub const fn is_control(ch: char) -> bool {
        is_marker(ch) || ch == LINE_BREAK
    }
}

/// Immutable text in which all markup is resolved to [`marker`] characters.
///
/// Only the resolver constructs values, so the marker nesting invariants hold:
/// every open marker is closed, ruby regions contain no other markers and no
/// open/close pair encloses empty content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NormalizedText {
    text: String,
}

impl NormalizedText {
    /// Render a token stream into marker form.
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut text = String::with_capacity(tokens.len() * 4);
        for token in tokens {
            push_token(&mut text, token);
        }
        Self { text }
    }

    /// Marker-encoded source.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text with every marker removed; line breaks are kept.
    pub fn visible_text(&self) -> String {
        self.text
            .chars()
            .filter(|ch| !marker::is_marker(*ch))
            .collect()
    }

    /// Number of `{base|ruby}` pairs.
    pub fn ruby_pair_count(&self) -> usize {
        self.text
            .chars()
            .filter(|ch| *ch == marker::RUBY_OPEN)
            .count()
    }

    /// Number of top-level non-breakable word zones.
    pub fn nobreak_zone_count(&self) -> usize {
        let mut depth = 0usize;
        let mut zones = 0usize;
        for ch in self.text.chars() {
            match ch {
                marker::NOBREAK_WORD_OPEN => {
                    if depth == 0 {
                        zones += 1;
                    }
                    depth += 1;
                }
                marker::NOBREAK_WORD_CLOSE => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        zones
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

fn push_token(out: &mut String, token: &Token) {
    match token {
        Token::Literal(text) => out.push_str(text),
        Token::Ruby { base, annotation } => push_ruby(out, base, annotation),
        Token::KeywordMatch { expansion, .. } => {
            out.push(marker::NOBREAK_WORD_OPEN);
            for item in expansion {
                push_token(out, item);
            }
            out.push(marker::NOBREAK_WORD_CLOSE);
        }
        Token::StyleTagOpen(tag) => push_style_open(out, *tag),
        Token::StyleTagClose(tag) => push_style_close(out, *tag),
        Token::Placeholder { raw, full_line } => {
            if *full_line {
                out.push(marker::LINE_PLACEHOLDER);
            }
            out.push(marker::PLACEHOLDER_OPEN);
            out.push_str(raw);
            out.push(marker::PLACEHOLDER_CLOSE);
        }
        Token::LineBreak => out.push(marker::LINE_BREAK),
    }
}

fn push_ruby(out: &mut String, base: &str, annotation: &str) {
    out.push(marker::NOBREAK_WORD_OPEN);
    out.push(marker::RUBY_OPEN);
    out.push_str(base);
    out.push(marker::RUBY_SEP);
    out.push_str(annotation);
    out.push(marker::RUBY_CLOSE);
    out.push(marker::NOBREAK_WORD_CLOSE);
}

fn push_style_open(out: &mut String, tag: StyleTag) {
    match tag {
        StyleTag::Bold => out.push(marker::BOLD_OPEN),
        StyleTag::Italic => out.push(marker::ITALIC_OPEN),
        StyleTag::Pre => out.push(marker::NOBREAK_LINE_OPEN),
        StyleTag::Boxed => {
            out.push(marker::NOBREAK_WORD_OPEN);
            out.push(marker::BOX_OPEN);
        }
        StyleTag::Uncompressed => out.push(marker::UNCOMPRESSED_OPEN),
    }
}

fn push_style_close(out: &mut String, tag: StyleTag) {
    match tag {
        StyleTag::Bold => out.push(marker::BOLD_CLOSE),
        StyleTag::Italic => out.push(marker::ITALIC_CLOSE),
        StyleTag::Pre => out.push(marker::NOBREAK_LINE_CLOSE),
        StyleTag::Boxed => {
            out.push(marker::BOX_CLOSE);
            out.push(marker::NOBREAK_WORD_CLOSE);
        }
        StyleTag::Uncompressed => out.push(marker::UNCOMPRESSED_CLOSE),
    }
}
