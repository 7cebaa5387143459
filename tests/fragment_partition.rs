mod common;

use card_typeset::{
    init_dictionary, marker, resolve, split, CardFormat, Fragment, FragmentKind, InlineStyle,
    ZoneKind,
};
use common::fixtures::{card, CARDS};

fn fields() -> impl Iterator<Item = (&'static str, CardFormat, &'static str)> {
    CARDS.iter().flat_map(|card| {
        [Some(card.name), Some(card.effect), card.pendulum_effect]
            .into_iter()
            .flatten()
            .map(move |raw| (card.key, card.format, raw))
    })
}

fn rebuild(fragments: &[Fragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match &fragment.kind {
            FragmentKind::Ruby { base, annotation } => {
                out.push_str(base);
                out.push_str(annotation);
            }
            FragmentKind::Placeholder { raw, .. } => out.push_str(raw),
            FragmentKind::LineBreak => out.push(marker::LINE_BREAK),
            _ => out.push_str(fragment.text()),
        }
    }
    out
}

#[test]
fn spans_partition_every_fixture_field() {
    for (key, format, raw) in fields() {
        let dictionary = init_dictionary(format);
        let normalized = resolve(raw, format, &dictionary);
        let fragments = split(&normalized, format);
        assert!(!fragments.is_empty(), "{key}: no fragments");

        let mut cursor = 0;
        for fragment in &fragments {
            assert_eq!(fragment.span.start, cursor, "{key}: gap before {fragment:?}");
            assert!(fragment.span.end > fragment.span.start, "{key}: empty span");
            cursor = fragment.span.end;
        }
        assert_eq!(cursor, normalized.len(), "{key}: tail not covered");
    }
}

#[test]
fn fragments_carry_no_marker_characters() {
    for (key, format, raw) in fields() {
        let normalized = resolve(raw, format, &init_dictionary(format));
        for fragment in split(&normalized, format) {
            let visible = match &fragment.kind {
                FragmentKind::Ruby { base, annotation } => format!("{base}{annotation}"),
                _ => fragment.text().to_string(),
            };
            assert!(
                !visible.chars().any(marker::is_marker),
                "{key}: marker leaked into {fragment:?}"
            );
        }
    }
}

#[test]
fn fragments_rebuild_the_visible_text() {
    for (key, format, raw) in fields() {
        let normalized = resolve(raw, format, &init_dictionary(format));
        let fragments = split(&normalized, format);
        assert_eq!(rebuild(&fragments), normalized.visible_text(), "{key}");
    }
}

#[test]
fn ruby_names_keep_pairs_whole() {
    let fixture = card("ocg-ruby-search");
    let normalized = resolve(fixture.name, fixture.format, &init_dictionary(fixture.format));
    assert_eq!(normalized.ruby_pair_count(), 4);
    let fragments = split(&normalized, fixture.format);
    let bases: Vec<&str> = fragments
        .iter()
        .filter(|f| f.is_ruby())
        .map(Fragment::text)
        .collect();
    assert_eq!(bases, vec!["青", "眼", "白", "龍"]);
}

#[test]
fn boxed_and_uncompressed_runs_are_flagged() {
    let fixture = card("ocg-boxed-icon");
    let normalized = resolve(fixture.name, fixture.format, &init_dictionary(fixture.format));
    let fragments = split(&normalized, fixture.format);

    let boxed: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.style.contains(InlineStyle::BOXED))
        .collect();
    assert!(!boxed.is_empty());
    let zone = boxed[0].zone.expect("boxed run is a zone");
    assert_eq!(zone.kind, ZoneKind::Word);
    assert!(boxed.iter().all(|f| f.zone == Some(zone)));

    assert!(fragments
        .iter()
        .filter(|f| !f.style.contains(InlineStyle::BOXED))
        .all(|f| f.style.contains(InlineStyle::UNCOMPRESSED)));
}

#[test]
fn pre_runs_share_a_line_zone() {
    let fixture = card("ocg-pendulum");
    let normalized = resolve(fixture.effect, fixture.format, &init_dictionary(fixture.format));
    let fragments = split(&normalized, fixture.format);
    let pre: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.style.contains(InlineStyle::PRE))
        .collect();
    assert!(!pre.is_empty());
    assert!(pre
        .iter()
        .all(|f| f.zone.map(|z| z.kind) == Some(ZoneKind::Line)));
    assert!(pre.iter().all(|f| f.zone_id() == pre[0].zone_id()));
}

#[test]
fn tcg_pendulum_keyword_gets_ruby_only_standalone() {
    let dictionary = init_dictionary(CardFormat::Tcg);
    let standalone = resolve("Target 1 P monster", CardFormat::Tcg, &dictionary);
    assert_eq!(standalone.ruby_pair_count(), 1);
    let embedded = resolve("Pendulum Zone", CardFormat::Tcg, &dictionary);
    assert_eq!(embedded.ruby_pair_count(), 0);
}
