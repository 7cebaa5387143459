use card_typeset::CardFormat;

/// Card text sample used across integration tests and benches.
pub struct CardFixture {
    pub key: &'static str,
    pub format: CardFormat,
    pub name: &'static str,
    pub effect: &'static str,
    pub pendulum_effect: Option<&'static str>,
}

pub const CARDS: &[CardFixture] = &[
    CardFixture {
        key: "ocg-ruby-search",
        format: CardFormat::Ocg,
        name: "{青|ブルー}{眼|アイズ}の{白|ホワイト}{龍|ドラゴン}",
        effect: "このカード名の効果は1ターンに1度しか使用できない。\
                 ①：このカードが{召|しょう}{喚|かん}に成功した場合に発動できる。\
                 自分のデッキから「ブルーアイズ」モンスター1体を手札に加える。",
        pendulum_effect: None,
    },
    CardFixture {
        key: "ocg-pendulum",
        format: CardFormat::Ocg,
        name: "オッドアイズ・ペンデュラム・ドラゴン",
        effect: "①：このカードは相手に与える戦闘ダメージは倍になる。\n\
                 ②：1ターンに1度、自分のエンドフェイズに発動できる。\
                 自分の墓地の<pre>ATK 1500</pre>以下のPモンスター1体を対象とする。",
        pendulum_effect: Some(
            "①：1ターンに1度、自分のPモンスターの戦闘で発生する自分への戦闘ダメージを0にできる。",
        ),
    },
    CardFixture {
        key: "ocg-boxed-icon",
        format: CardFormat::Ocg,
        name: "[速攻魔法]{{サイクロン}}",
        effect: r#"<img src="quick-play.png" width="24"/>フィールドの魔法・罠カード1枚を対象として発動できる。そのカードを破壊する。"#,
        pendulum_effect: None,
    },
    CardFixture {
        key: "tcg-long-effect",
        format: CardFormat::Tcg,
        name: "Blue-Eyes White Dragon",
        effect: "You can only use each effect of this card's name once per turn. \
                 If this card is Normal or Special Summoned: You can add 1 \"Blue-Eyes\" monster \
                 from your Deck to your hand.<br>During your Main Phase: You can Special Summon \
                 1 Level 8 or lower Dragon monster from your GY, but it cannot attack this turn.",
        pendulum_effect: None,
    },
    CardFixture {
        key: "tcg-pendulum",
        format: CardFormat::Tcg,
        name: "Odd-Eyes Pendulum Dragon",
        effect: "If this card battles an opponent's monster, any battle damage this card \
                 inflicts to your opponent is doubled. <b>Once per turn</b>, during your End \
                 Phase: You can destroy this card.",
        pendulum_effect: Some(
            "You can reduce the battle damage you take from an attack involving a P monster \
             you control to 0.",
        ),
    },
    CardFixture {
        key: "tcg-stats",
        format: CardFormat::Tcg,
        name: "Dark Magician",
        effect: "The ultimate wizard in terms of attack and defense. {{ATK 2500}} <i>DEF 2100</i>",
        pendulum_effect: None,
    },
];

pub fn card(key: &str) -> &'static CardFixture {
    CARDS
        .iter()
        .find(|card| card.key == key)
        .unwrap_or_else(|| panic!("unknown card fixture {key}"))
}
