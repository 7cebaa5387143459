use std::sync::Arc;

use card_typeset::{marker, CardFormat, FragmentKind, ZoneKind};
use card_typeset_render::{
    solve, CondenseTolerance, DrawCommand, Escalation, FontMetricsRecord, FontMetricsTable,
    FontSpec, LayoutEngine, RecordingSurface, TextField, TextFieldLayout, TextMeasurer,
    TextStyle, ToleranceTier,
};

/// Every glyph advances by the font size.
struct Monospace;

impl TextMeasurer for Monospace {
    fn advance_px(&self, _ch: char, font: &FontSpec) -> Option<f32> {
        Some(font.size_px)
    }
}

fn engine() -> LayoutEngine {
    LayoutEngine::new(Arc::new(Monospace))
}

fn font(max_lines: u8) -> FontMetricsTable {
    let record = FontMetricsRecord {
        min_scale: 0.05,
        ..FontMetricsRecord::new(10.0, 12.0, max_lines)
    };
    FontMetricsTable::new("mono", vec![record]).expect("valid table")
}

fn field(format: CardFormat, max_width: f32, max_lines: u8) -> TextField {
    TextField::new(format, font(max_lines), 0.0, 10.0, max_width)
}

fn thresholds(one: f32, two: f32, three: f32) -> CondenseTolerance {
    CondenseTolerance::from_thresholds([("1", one), ("2", two), ("3", three)])
        .expect("valid thresholds")
}

fn assert_zones_intact(layout: &TextFieldLayout) {
    for line in &layout.lines {
        for &idx in &line.fragments {
            let zone = layout.fragments[idx].zone_id();
            if zone == 0 {
                continue;
            }
            let total = layout
                .fragments
                .iter()
                .filter(|f| f.zone_id() == zone)
                .count();
            let here = line
                .fragments
                .iter()
                .filter(|&&i| layout.fragments[i].zone_id() == zone)
                .count();
            assert_eq!(here, total, "zone {zone} split: {:?}", layout.line_texts());
        }
    }
}

#[test]
fn explicit_ruby_pairs_reach_the_painter_without_markers() {
    let field = field(CardFormat::Ocg, 400.0, 3);
    let mut surface = RecordingSurface::new();
    let layout = engine()
        .render_field(&mut surface, "{召|しょう}{喚|かん}扱い", &field, &TextStyle::default())
        .expect("infallible");

    let kinds: Vec<&FragmentKind> = layout.fragments.iter().map(|f| &f.kind).collect();
    assert_eq!(kinds.len(), 4);
    assert!(matches!(
        kinds[0],
        FragmentKind::Ruby { base, annotation } if base == "召" && annotation == "しょう"
    ));
    assert!(matches!(
        kinds[1],
        FragmentKind::Ruby { base, annotation } if base == "喚" && annotation == "かん"
    ));
    assert_eq!(layout.fragments[2].text(), "扱");
    assert_eq!(layout.fragments[3].text(), "い");

    for command in surface.commands() {
        if let Some(text) = command.text() {
            assert!(!text.chars().any(marker::is_control), "{text:?}");
        }
    }
    let drawn: String = surface.texts().map(|t| t.text.as_str()).collect();
    assert_eq!(drawn, "召しょう喚かん扱い");
}

#[test]
fn overfull_single_line_condenses_to_ratio() {
    let condensed = solve(650.0, 0.0, 500.0, 0.1);
    assert!((condensed.scale - 0.769).abs() < 1e-3);

    let field = field(CardFormat::Ocg, 500.0, 1).with_tolerance(thresholds(700.0, 700.0, 700.0));
    let layout = engine().layout_field(&"あ".repeat(65), &field);
    assert_eq!(layout.lines.len(), 1);
    assert_eq!(layout.lines[0].natural_width, 650.0);
    assert!((layout.lines[0].scale - 500.0 / 650.0).abs() < 1e-4);
    assert!((layout.lines[0].width - 500.0).abs() < 0.01);
}

#[test]
fn keyword_expansion_is_one_unbreakable_group() {
    let layout = engine().layout_field("自分のデッキから", &field(CardFormat::Ocg, 400.0, 3));
    assert!(layout.fragments[0].is_ruby() && layout.fragments[1].is_ruby());
    assert_eq!(layout.fragments[0].zone, layout.fragments[1].zone);
    assert_eq!(
        layout.fragments[0].zone.map(|z| z.kind),
        Some(ZoneKind::Word)
    );
    let rest: String = layout.fragments[2..].iter().map(|f| f.text()).collect();
    assert_eq!(rest, "のデッキから");

    // A box narrower than the group still keeps both pairs together.
    let narrow = field(CardFormat::Ocg, 15.0, 8).with_tolerance(thresholds(15.0, 15.0, 15.0));
    let layout = engine().layout_field("自分のデッキから", &narrow);
    assert_eq!(layout.lines[0].fragments.as_slice(), &[0, 1]);
    assert_zones_intact(&layout);
}

#[test]
fn oversized_whole_word_sits_alone_and_condenses() {
    let word = "W".repeat(30);
    let raw = format!("Draw {word} now");
    let field = field(CardFormat::Tcg, 100.0, 3).with_tolerance(thresholds(100.0, 100.0, 100.0));
    let layout = engine().layout_field(&raw, &field);
    let texts = layout.line_texts();
    let line = texts
        .iter()
        .position(|t| t == &word)
        .expect("word on its own line");
    assert!(layout.lines[line].scale < 1.0);
    assert!((layout.lines[line].width - 100.0).abs() < 0.01);
}

#[test]
fn very_strict_tier_keeps_fitting_text_on_one_line() {
    let field = field(CardFormat::Ocg, 600.0, 3).with_tolerance(ToleranceTier::VeryStrict);
    let layout = engine().layout_field(&"あ".repeat(59), &field);
    assert_eq!(layout.lines.len(), 1);
    assert_eq!(layout.lines[0].natural_width, 590.0);
    assert_eq!(layout.lines[0].scale, 1.0);
    assert_eq!(layout.escalation, Escalation::Tier { lines: 1 });
}

#[test]
fn explicit_line_marker_always_yields_two_lines() {
    let field = field(CardFormat::Tcg, 1000.0, 3).with_tolerance(ToleranceTier::Relaxed);
    for raw in ["one\ntwo", "one<br>two", "one\r\ntwo", "one<br/>two"] {
        let layout = engine().layout_field(raw, &field);
        assert_eq!(layout.line_texts(), vec!["one", "two"], "{raw:?}");
    }
}

#[test]
fn must_not_start_wins_at_conflicting_boundaries() {
    let raw = "効果を発動する。「自分」の「墓地」…から";
    for width in [30.0, 40.0, 50.0, 60.0, 80.0] {
        let field = field(CardFormat::Ocg, width, 8).with_tolerance(thresholds(width, width, width));
        let layout = engine().layout_field(raw, &field);
        for line in &layout.lines {
            let Some(&first) = line.fragments.first() else {
                continue;
            };
            assert!(
                !layout.fragments[first].no_start(CardFormat::Ocg),
                "width {width}: {:?}",
                layout.line_texts()
            );
        }
    }
}

#[test]
fn conflicting_kinsoku_boundary_breaks_before_the_pair() {
    // Each glyph is 10px and the budget holds three. Greedy filling would end
    // the first line on the opening bracket; the break moves in front of it.
    let cases = [
        ("あい「」う", vec!["あい", "「」う"]),
        ("あい（、う", vec!["あい", "（、う"]),
        ("かきく『』けこさ", vec!["かきく", "『』け", "こさ"]),
    ];
    for (raw, expected) in cases {
        let field = field(CardFormat::Ocg, 30.0, 8).with_tolerance(thresholds(30.0, 30.0, 30.0));
        let layout = engine().layout_field(raw, &field);
        assert_eq!(layout.line_texts(), expected, "{raw}");
        for line in &layout.lines {
            let (Some(&first), Some(&last)) = (line.fragments.first(), line.fragments.last())
            else {
                continue;
            };
            assert!(!layout.fragments[first].no_start(CardFormat::Ocg), "{raw}");
            assert!(!layout.fragments[last].no_end(CardFormat::Ocg), "{raw}");
        }
    }
}

#[test]
fn zones_survive_every_tolerance_tier() {
    let raw = "[速攻魔法]{召|しょう}{喚|かん}に成功した場合、自分の墓地の<pre>ATK 1000</pre>モンスターを{{P}}対象とする。";
    for tier in ToleranceTier::ALL {
        for width in [20.0, 45.0, 90.0, 200.0] {
            let field = field(CardFormat::Ocg, width, 5).with_tolerance(tier);
            let layout = engine().layout_field(raw, &field);
            assert_zones_intact(&layout);
        }
    }
}

#[test]
fn escalation_is_deterministic() {
    let raw = "このカードが召喚に成功した場合、デッキからカード1枚を手札に加える。";
    let field = field(CardFormat::Ocg, 120.0, 3);
    let first = engine().layout_field(raw, &field);
    for _ in 0..10 {
        let again = engine().layout_field(raw, &field);
        assert_eq!(again.lines, first.lines);
        assert_eq!(again.escalation, first.escalation);
    }
}

#[test]
fn scale_never_grows_with_longer_single_lines() {
    let field = field(CardFormat::Ocg, 100.0, 1);
    let mut previous = 1.0;
    for n in 1..80 {
        let layout = engine().layout_field(&"あ".repeat(n), &field);
        assert_eq!(layout.lines.len(), 1);
        let scale = layout.min_scale();
        assert!(scale <= previous, "n={n}: {scale} > {previous}");
        previous = scale;
    }
}

#[test]
fn ruby_annotations_condense_less_than_base() {
    let field = field(CardFormat::Ocg, 60.0, 1);
    let mut surface = RecordingSurface::new();
    let layout = engine()
        .render_field(
            &mut surface,
            "{召|しょう}{喚|かん}したモンスター",
            &field,
            &TextStyle::default(),
        )
        .expect("infallible");
    let line = &layout.lines[0];
    assert!(line.scale < 1.0);
    assert!(line.ruby_scale >= line.scale);

    let base = surface
        .texts()
        .find(|t| t.text == "召")
        .expect("base glyph");
    let annotation = surface
        .texts()
        .find(|t| t.text == "し")
        .expect("annotation glyph");
    assert!(annotation.scale_x >= base.scale_x);
    assert!(annotation.baseline_y < base.baseline_y);
    assert_eq!(annotation.font.size_px, layout.record.ruby_font_size);
}

#[test]
fn uncompressed_runs_keep_full_width() {
    let field = field(CardFormat::Tcg, 100.0, 1);
    let mut surface = RecordingSurface::new();
    let layout = engine()
        .render_field(
            &mut surface,
            "{{ATK}} squeeze this text",
            &field,
            &TextStyle::default(),
        )
        .expect("infallible");
    assert!(layout.lines[0].scale < 1.0);
    let atk: Vec<f32> = surface
        .texts()
        .take(3)
        .map(|t| t.scale_x)
        .collect();
    assert_eq!(atk, vec![1.0, 1.0, 1.0]);
}

#[test]
fn combining_marks_are_drawn_with_their_base() {
    let field = field(CardFormat::Tcg, 500.0, 3);
    let mut surface = RecordingSurface::new();
    engine()
        .render_field(&mut surface, "cafe\u{301}", &field, &TextStyle::default())
        .expect("infallible");
    let drawn: Vec<&str> = surface.texts().map(|t| t.text.as_str()).collect();
    assert_eq!(drawn, vec!["c", "a", "f", "e\u{301}"]);
    let last = surface.texts().last().expect("glyph");
    assert_eq!(last.x, 30.0);
}

#[test]
fn boxed_runs_and_placeholders_emit_their_commands() {
    let field = field(CardFormat::Tcg, 500.0, 3);
    let mut surface = RecordingSurface::new();
    engine()
        .render_field(
            &mut surface,
            r#"[Quick-Play] <img src="spell.png" width="12"/>"#,
            &field,
            &TextStyle::default(),
        )
        .expect("infallible");
    let rects = surface
        .commands()
        .iter()
        .filter(|c| matches!(c, DrawCommand::Rect(_)))
        .count();
    assert_eq!(rects, 1);
    let image = surface
        .commands()
        .iter()
        .find_map(|c| match c {
            DrawCommand::Image(image) => Some(image),
            _ => None,
        })
        .expect("image command");
    assert_eq!(image.src, "spell.png");
    assert_eq!(image.rect.width, 12.0);
}

#[test]
fn shared_engine_lays_out_identically_across_threads() {
    let engine = engine();
    let field = field(CardFormat::Ocg, 150.0, 3);
    let raw = "自分の墓地の魔法カード1枚を対象として発動できる。そのカードを手札に加える。";
    let expected = engine.layout_field(raw, &field);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.layout_field(raw, &field)))
            .collect();
        for handle in handles {
            let layout = handle.join().expect("layout thread");
            assert_eq!(layout, expected);
        }
    });
}
