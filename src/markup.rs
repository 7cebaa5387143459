//! Single-pass markup tokenizer and resolver.
//!
//! Explicit author markup always takes precedence over dictionary keywords:
//! the scanner tries markup first at every position and only consults the
//! [`KeywordDictionary`] for plain literal text. Anything that does not parse
//! as well-formed markup is kept as literal text, so tokenizing never fails.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::glyph_class::{is_whole_word_char, CardFormat};
use crate::keyword::{KeywordDictionary, KeywordEntry, KeywordGuard};
use crate::normalized::{marker, NormalizedText};

/// Upper bound on simultaneously open `<b>`/`<i>`/`<pre>` spans.
const MAX_OPEN_STYLES: usize = 8;

/// Paired styling markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StyleTag {
    /// `<b>...</b>`
    Bold,
    /// `<i>...</i>`
    Italic,
    /// `<pre>...</pre>`: author lines kept verbatim.
    Pre,
    /// `[...]`
    Boxed,
    /// `{{...}}`: exempt from condensation.
    ///
    /// The run closes at the first `}}` outside any inner `{...}` pair, so
    /// `{{{召|しょう}}}` holds one ruby pair.
    Uncompressed,
}

impl StyleTag {
    fn from_tag_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("b") {
            Some(Self::Bold)
        } else if name.eq_ignore_ascii_case("i") {
            Some(Self::Italic)
        } else if name.eq_ignore_ascii_case("pre") {
            Some(Self::Pre)
        } else {
            None
        }
    }
}

/// One unit of resolved markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Ruby {
        base: String,
        annotation: String,
    },
    /// Dictionary term replaced by its ruby form; always non-breakable.
    KeywordMatch {
        term: String,
        expansion: Vec<Token>,
    },
    StyleTagOpen(StyleTag),
    StyleTagClose(StyleTag),
    /// Inline `<img .../>`; `raw` is the tag text as written.
    Placeholder {
        raw: String,
        full_line: bool,
    },
    LineBreak,
}

/// Attributes of an `<img>` placeholder tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceholderAttrs {
    pub src: String,
    pub width_px: Option<u16>,
    pub full_line: bool,
}

/// Parse the attributes of a raw `<img .../>` tag.
///
/// Returns `None` when the tag is not a well-formed `img` element with a
/// non-empty `src`.
pub fn parse_placeholder(raw: &str) -> Option<PlaceholderAttrs> {
    let mut reader = Reader::from_str(raw);
    let start = match reader.read_event() {
        Ok(Event::Empty(e)) | Ok(Event::Start(e)) => e,
        _ => return None,
    };
    if !start.name().as_ref().eq_ignore_ascii_case(b"img") {
        return None;
    }
    let mut src = None;
    let mut width_px = None;
    let mut full_line = false;
    for attr in start.attributes() {
        let attr = attr.ok()?;
        let value = core::str::from_utf8(attr.value.as_ref()).ok()?;
        let key = attr.key.as_ref();
        if key.eq_ignore_ascii_case(b"src") {
            src = Some(value.trim().to_string());
        } else if key.eq_ignore_ascii_case(b"width") {
            width_px = value.trim().trim_end_matches("px").parse::<u16>().ok();
        } else if key.eq_ignore_ascii_case(b"display") {
            full_line = value.trim().eq_ignore_ascii_case("line");
        }
    }
    let src = src.filter(|s| !s.is_empty())?;
    Some(PlaceholderAttrs {
        src,
        width_px,
        full_line,
    })
}

/// Tokenize raw field text.
pub fn tokenize(raw: &str, format: CardFormat, dictionary: &KeywordDictionary) -> Vec<Token> {
    let cleaned: String = raw.chars().filter(|ch| !marker::is_marker(*ch)).collect();
    let scanner = Scanner {
        src: &cleaned,
        format,
        dictionary,
    };
    scanner.scan(0, cleaned.len(), true)
}

/// Resolve raw field text into marker-encoded [`NormalizedText`].
pub fn resolve(raw: &str, format: CardFormat, dictionary: &KeywordDictionary) -> NormalizedText {
    NormalizedText::from_tokens(&tokenize(raw, format, dictionary))
}

/// Parse a dictionary ruby form such as `{自|じ}{分|ぶん}` into tokens.
///
/// Only ruby pairs and literal text are recognized; dictionary lookup is
/// disabled so expansions never recurse.
pub(crate) fn parse_ruby_form(form: &str) -> Vec<Token> {
    let empty = KeywordDictionary::empty(CardFormat::Ocg);
    let scanner = Scanner {
        src: form,
        format: CardFormat::Ocg,
        dictionary: &empty,
    };
    scanner.scan(0, form.len(), false)
}

struct Scanner<'a> {
    src: &'a str,
    format: CardFormat,
    dictionary: &'a KeywordDictionary,
}

/// Accumulates tokens, merging adjacent literals and pruning empty spans.
#[derive(Default)]
struct TokenSink {
    tokens: Vec<Token>,
}

impl TokenSink {
    fn literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Token::Literal(prev)) = self.tokens.last_mut() {
            prev.push_str(text);
        } else {
            self.tokens.push(Token::Literal(text.to_string()));
        }
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    fn close(&mut self, tag: StyleTag) {
        if self.tokens.last() == Some(&Token::StyleTagOpen(tag)) {
            self.tokens.pop();
        } else {
            self.tokens.push(Token::StyleTagClose(tag));
        }
    }

    fn extend_wrapped(&mut self, tag: StyleTag, inner: Vec<Token>) {
        if inner.is_empty() {
            return;
        }
        self.push(Token::StyleTagOpen(tag));
        self.tokens.extend(inner);
        self.push(Token::StyleTagClose(tag));
    }
}

impl<'a> Scanner<'a> {
    /// Scan `src[start..end]`. `keywords` enables dictionary matching.
    fn scan(&self, start: usize, end: usize, keywords: bool) -> Vec<Token> {
        let mut sink = TokenSink::default();
        let mut open: heapless::Vec<StyleTag, MAX_OPEN_STYLES> = heapless::Vec::new();
        let mut pos = start;
        while pos < end {
            let rest = &self.src[pos..end];
            let Some(ch) = rest.chars().next() else {
                break;
            };

            if rest.starts_with("\r\n") {
                sink.push(Token::LineBreak);
                pos += 2;
                continue;
            }
            if ch == '\r' || ch == '\n' {
                sink.push(Token::LineBreak);
                pos += 1;
                continue;
            }
            if rest.starts_with("{{") {
                if let Some(close) = uncompressed_close(&rest[2..]) {
                    let inner_start = pos + 2;
                    let inner_end = inner_start + close;
                    if inner_end > inner_start && !self.src[inner_start..inner_end].contains('\n')
                    {
                        let inner = self.scan(inner_start, inner_end, false);
                        sink.extend_wrapped(StyleTag::Uncompressed, inner);
                        pos = inner_end + 2;
                        continue;
                    }
                }
            }
            if ch == '{' {
                if let Some((base, annotation, len)) = parse_ruby_pair(rest) {
                    sink.push(Token::Ruby {
                        base: base.to_string(),
                        annotation: annotation.to_string(),
                    });
                    pos += len;
                    continue;
                }
            }
            if ch == '[' {
                if let Some(close) = rest[1..].find(']') {
                    let inner_start = pos + 1;
                    let inner_end = inner_start + close;
                    let body = &self.src[inner_start..inner_end];
                    if !body.is_empty() && !body.contains(['[', '\n', '\r']) {
                        let inner = self.scan(inner_start, inner_end, keywords);
                        sink.extend_wrapped(StyleTag::Boxed, inner);
                        pos = inner_end + 1;
                        continue;
                    }
                }
            }
            if ch == '<' {
                if let Some(consumed) = self.scan_tag(rest, &mut sink, &mut open) {
                    pos += consumed;
                    continue;
                }
            }
            if keywords {
                if let Some(entry) = self.match_keyword(pos, end) {
                    sink.push(Token::KeywordMatch {
                        term: entry.term().to_string(),
                        expansion: entry.expansion().to_vec(),
                    });
                    pos += entry.term().len();
                    continue;
                }
            }
            sink.literal(&rest[..ch.len_utf8()]);
            pos += ch.len_utf8();
        }
        while let Some(tag) = open.pop() {
            sink.close(tag);
        }
        sink.tokens
    }

    /// Handle `<...>` at the start of `rest`; returns bytes consumed.
    fn scan_tag(
        &self,
        rest: &str,
        sink: &mut TokenSink,
        open: &mut heapless::Vec<StyleTag, MAX_OPEN_STYLES>,
    ) -> Option<usize> {
        let close = rest.find('>')?;
        let raw = &rest[..=close];
        let body = raw[1..raw.len() - 1].trim();
        if body.is_empty() || body.contains(['<', '\n', '\r']) {
            return None;
        }

        let self_closing = body.ends_with('/');
        let name_part = body.trim_end_matches('/').trim();
        let (is_close, name_part) = match name_part.strip_prefix('/') {
            Some(name) => (true, name.trim()),
            None => (false, name_part),
        };
        let name = name_part
            .split(|c: char| c.is_ascii_whitespace())
            .next()
            .unwrap_or_default();

        if name.eq_ignore_ascii_case("br") && !is_close && name == name_part {
            sink.push(Token::LineBreak);
            return Some(raw.len());
        }
        if name.eq_ignore_ascii_case("img") && !is_close {
            let attrs = parse_placeholder(raw)?;
            sink.push(Token::Placeholder {
                raw: raw.to_string(),
                full_line: attrs.full_line,
            });
            return Some(raw.len());
        }
        if name != name_part || self_closing {
            return None;
        }
        let tag = StyleTag::from_tag_name(name)?;
        if is_close {
            if open.last() != Some(&tag) {
                return None;
            }
            open.pop();
            sink.close(tag);
        } else {
            open.push(tag).ok()?;
            sink.push(Token::StyleTagOpen(tag));
        }
        Some(raw.len())
    }

    fn match_keyword(&self, pos: usize, end: usize) -> Option<&'a KeywordEntry> {
        let before = self.src[..pos].chars().next_back();
        let rest = &self.src[pos..end];
        self.dictionary.longest_match(rest, |entry| {
            let after = rest[entry.term().len()..].chars().next();
            self.guard_allows(entry.guard(), before, after)
        })
    }

    fn guard_allows(
        &self,
        guard: Option<&KeywordGuard>,
        before: Option<char>,
        after: Option<char>,
    ) -> bool {
        let is_alnum = |ch: Option<char>| {
            ch.is_some_and(|c| c.is_alphanumeric() && is_whole_word_char(c, self.format))
        };
        match guard {
            None => true,
            Some(KeywordGuard::Standalone) => !is_alnum(before) && !is_alnum(after),
            Some(KeywordGuard::NotBefore(chars)) => !after.is_some_and(|c| chars.contains(&c)),
            Some(KeywordGuard::NotAfter(chars)) => !before.is_some_and(|c| chars.contains(&c)),
            Some(KeywordGuard::AfterDigit) => {
                before.is_some_and(|c| c.is_ascii_digit() || ('０'..='９').contains(&c))
            }
        }
    }
}

/// Offset of the `}}` closing an uncompressed run whose body starts `body`.
fn uncompressed_close(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in body.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            '}' if body[idx + 1..].starts_with('}') => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Match `{base|annotation}` at the start of `rest`.
fn parse_ruby_pair(rest: &str) -> Option<(&str, &str, usize)> {
    let close = rest.find('}')?;
    let body = &rest[1..close];
    let (base, annotation) = body.split_once('|')?;
    let forbidden = ['{', '|', '<', '>', '[', ']', '\n', '\r'];
    if base.is_empty()
        || annotation.is_empty()
        || base.contains(forbidden)
        || annotation.contains(forbidden)
    {
        return None;
    }
    Some((base, annotation, close + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::init_dictionary;

    fn ocg(raw: &str) -> Vec<Token> {
        tokenize(raw, CardFormat::Ocg, &init_dictionary(CardFormat::Ocg))
    }

    fn lit(text: &str) -> Token {
        Token::Literal(text.to_string())
    }

    fn ruby(base: &str, annotation: &str) -> Token {
        Token::Ruby {
            base: base.to_string(),
            annotation: annotation.to_string(),
        }
    }

    #[test]
    fn explicit_ruby_pairs_become_ruby_tokens() {
        assert_eq!(
            ocg("{召|しょう}{喚|かん}扱い"),
            vec![ruby("召", "しょう"), ruby("喚", "かん"), lit("扱い")]
        );
    }

    #[test]
    fn dictionary_keyword_expands_to_one_match() {
        let tokens = ocg("自分のデッキから");
        assert_eq!(
            tokens,
            vec![
                Token::KeywordMatch {
                    term: "自分".to_string(),
                    expansion: vec![ruby("自", "じ"), ruby("分", "ぶん")],
                },
                lit("のデッキから"),
            ]
        );
    }

    #[test]
    fn explicit_ruby_wins_over_dictionary() {
        let tokens = ocg("{自分|じぶん}");
        assert_eq!(tokens, vec![ruby("自分", "じぶん")]);
    }

    #[test]
    fn keywords_are_not_matched_inside_uncompressed_runs() {
        let tokens = ocg("{{自分}}");
        assert_eq!(
            tokens,
            vec![
                Token::StyleTagOpen(StyleTag::Uncompressed),
                lit("自分"),
                Token::StyleTagClose(StyleTag::Uncompressed),
            ]
        );
    }

    #[test]
    fn uncompressed_runs_close_after_inner_ruby_pairs() {
        let wrapped = |inner: Vec<Token>| {
            let mut tokens = vec![Token::StyleTagOpen(StyleTag::Uncompressed)];
            tokens.extend(inner);
            tokens.push(Token::StyleTagClose(StyleTag::Uncompressed));
            tokens
        };
        assert_eq!(ocg("{{{召|しょう}}}"), wrapped(vec![ruby("召", "しょう")]));
        assert_eq!(
            ocg("{{{召|しょう}{喚|かん}}}扱い"),
            [wrapped(vec![ruby("召", "しょう"), ruby("喚", "かん")]), vec![lit("扱い")]].concat()
        );
        assert_eq!(
            ocg("{{ATK {攻|こう}}}"),
            wrapped(vec![lit("ATK "), ruby("攻", "こう")])
        );
        // A lone closing brace inside the run stays literal.
        assert_eq!(ocg("{{a}b}}"), wrapped(vec![lit("a}b")]));
    }

    #[test]
    fn longest_keyword_wins() {
        let tokens = ocg("攻撃力");
        let Token::KeywordMatch { term, .. } = &tokens[0] else {
            panic!("expected keyword match, got {tokens:?}");
        };
        assert_eq!(term, "攻撃力");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn malformed_markup_is_literal() {
        assert_eq!(ocg("{召|しょう"), vec![lit("{召|しょう")]);
        assert_eq!(ocg("a</b>c"), vec![lit("a</b>c")]);
        assert_eq!(ocg("<blink>x"), vec![lit("<blink>x")]);
        assert_eq!(ocg("{|x}"), vec![lit("{|x}")]);
        assert_eq!(ocg("<b"), vec![lit("<b")]);
    }

    #[test]
    fn unclosed_style_is_closed_at_end() {
        assert_eq!(
            ocg("<b>abc"),
            vec![
                Token::StyleTagOpen(StyleTag::Bold),
                lit("abc"),
                Token::StyleTagClose(StyleTag::Bold),
            ]
        );
    }

    #[test]
    fn empty_style_span_is_pruned() {
        assert_eq!(ocg("a<b></b>c"), vec![lit("ac")]);
        assert_eq!(ocg("a<i>"), vec![lit("a")]);
    }

    #[test]
    fn misnested_close_tag_stays_literal() {
        assert_eq!(
            ocg("<b><i>x</b></i>"),
            vec![
                Token::StyleTagOpen(StyleTag::Bold),
                Token::StyleTagOpen(StyleTag::Italic),
                lit("x</b>"),
                Token::StyleTagClose(StyleTag::Italic),
                Token::StyleTagClose(StyleTag::Bold),
            ]
        );
    }

    #[test]
    fn line_breaks_and_br_tags_become_line_breaks() {
        assert_eq!(
            ocg("a\r\nb<br>c<br/>d\re"),
            vec![
                lit("a"),
                Token::LineBreak,
                lit("b"),
                Token::LineBreak,
                lit("c"),
                Token::LineBreak,
                lit("d"),
                Token::LineBreak,
                lit("e"),
            ]
        );
    }

    #[test]
    fn img_tags_become_placeholders() {
        let tokens = ocg(r#"x<img src="icon/light.png" width="24"/>y"#);
        assert_eq!(
            tokens[1],
            Token::Placeholder {
                raw: r#"<img src="icon/light.png" width="24"/>"#.to_string(),
                full_line: false,
            }
        );
        let line = ocg(r#"<img src="a.png" display="line" />"#);
        assert!(matches!(line[0], Token::Placeholder { full_line: true, .. }));
    }

    #[test]
    fn img_without_src_is_literal() {
        assert_eq!(ocg("<img/>"), vec![lit("<img/>")]);
    }

    #[test]
    fn placeholder_attributes_parse() {
        let attrs = parse_placeholder(r#"<img src="a.png" width="32px" display="line"/>"#);
        assert_eq!(
            attrs,
            Some(PlaceholderAttrs {
                src: "a.png".to_string(),
                width_px: Some(32),
                full_line: true,
            })
        );
    }

    #[test]
    fn boxed_runs_wrap_their_content() {
        assert_eq!(
            ocg("[速攻]"),
            vec![
                Token::StyleTagOpen(StyleTag::Boxed),
                Token::KeywordMatch {
                    term: "速攻".to_string(),
                    expansion: vec![ruby("速", "そっ"), ruby("攻", "こう")],
                },
                Token::StyleTagClose(StyleTag::Boxed),
            ]
        );
        assert_eq!(ocg("[]"), vec![lit("[]")]);
    }

    #[test]
    fn raw_marker_characters_are_stripped() {
        let raw = format!("a{}b", marker::RUBY_OPEN);
        assert_eq!(ocg(&raw), vec![lit("ab")]);
    }

    #[test]
    fn standalone_guard_respects_neighbours() {
        let dict = init_dictionary(CardFormat::Tcg);
        let hit = tokenize("P Summon", CardFormat::Tcg, &dict);
        assert!(matches!(hit[0], Token::KeywordMatch { .. }));
        let miss = tokenize("PSYchic", CardFormat::Tcg, &dict);
        assert_eq!(miss, vec![lit("PSYchic")]);
        let miss = tokenize("ATKP", CardFormat::Tcg, &dict);
        assert_eq!(miss, vec![lit("ATKP")]);
    }

    #[test]
    fn guarded_short_terms_match_only_in_context() {
        let terms = |tokens: &[Token]| -> Vec<String> {
            tokens
                .iter()
                .filter_map(|t| match t {
                    Token::KeywordMatch { term, .. } => Some(term.clone()),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(terms(&ocg("フィールド上の")), vec!["上"]);
        assert_eq!(ocg("向上"), vec![lit("向上")]);
        assert_eq!(terms(&ocg("次のターン")), vec!["次"]);
        assert_eq!(ocg("次元"), vec![lit("次元")]);

        assert_eq!(
            ocg("1体"),
            vec![
                lit("1"),
                Token::KeywordMatch {
                    term: "体".to_string(),
                    expansion: vec![ruby("体", "たい")],
                },
            ]
        );
        assert_eq!(terms(&ocg("２回")), vec!["回"]);
        assert_eq!(ocg("合体"), vec![lit("合体")]);
        // The longer unguarded compound still wins over the counter.
        assert_eq!(terms(&ocg("一度")), vec!["一度"]);
    }

    #[test]
    fn resolve_renders_markers() {
        let dict = KeywordDictionary::empty(CardFormat::Ocg);
        let text = resolve("{召|しょう}い", CardFormat::Ocg, &dict);
        let expected: String = [
            marker::NOBREAK_WORD_OPEN,
            marker::RUBY_OPEN,
            '召',
            marker::RUBY_SEP,
            'し',
            'ょ',
            'う',
            marker::RUBY_CLOSE,
            marker::NOBREAK_WORD_CLOSE,
            'い',
        ]
        .iter()
        .collect();
        assert_eq!(text.as_str(), expected);
        assert_eq!(text.visible_text(), "召しょうい");
    }
}
