//! Keyword dictionaries: card shorthand terms and their ruby forms.

use core::fmt;

use crate::glyph_class::CardFormat;
use crate::markup::{parse_ruby_form, Token};

/// Context restriction for short or ambiguous dictionary terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeywordGuard {
    /// Neighbouring characters must not be letters or digits.
    Standalone,
    /// The term must not be immediately followed by any of these characters.
    NotBefore(&'static [char]),
    /// The term must not immediately follow any of these characters.
    NotAfter(&'static [char]),
    /// The term must immediately follow an ASCII or full-width digit, as
    /// counters do (`1体`, `２回`).
    AfterDigit,
}

/// A validated dictionary entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordEntry {
    term: String,
    ruby_form: String,
    expansion: Vec<Token>,
    guard: Option<KeywordGuard>,
}

impl KeywordEntry {
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Ruby form as written, e.g. `{自|じ}{分|ぶん}`.
    pub fn ruby_form(&self) -> &str {
        &self.ruby_form
    }

    /// Parsed ruby form.
    pub fn expansion(&self) -> &[Token] {
        &self.expansion
    }

    pub fn guard(&self) -> Option<&KeywordGuard> {
        self.guard.as_ref()
    }
}

/// Rejected dictionary entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DictionaryError {
    EmptyTerm {
        index: usize,
    },
    /// The ruby form contains no `{base|ruby}` pair.
    NoRubyPair {
        term: String,
    },
    /// The ruby form contains markup other than ruby pairs and plain text.
    UnsupportedMarkup {
        term: String,
    },
    DuplicateTerm {
        term: String,
    },
}

impl fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTerm { index } => write!(f, "dictionary entry {} has an empty term", index),
            Self::NoRubyPair { term } => {
                write!(f, "ruby form for '{}' contains no ruby pair", term)
            }
            Self::UnsupportedMarkup { term } => {
                write!(f, "ruby form for '{}' contains unsupported markup", term)
            }
            Self::DuplicateTerm { term } => write!(f, "duplicate dictionary term '{}'", term),
        }
    }
}

impl std::error::Error for DictionaryError {}

/// Frozen term lookup for one [`CardFormat`].
///
/// Entries are kept sorted by descending term length so the first accepted
/// candidate is the leftmost-longest match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordDictionary {
    format: CardFormat,
    entries: Vec<KeywordEntry>,
}

impl KeywordDictionary {
    /// Dictionary with no terms.
    pub fn empty(format: CardFormat) -> Self {
        Self {
            format,
            entries: Vec::new(),
        }
    }

    /// Build a dictionary from `(term, ruby_form, guard)` triples.
    pub fn from_entries<I, T, R>(format: CardFormat, entries: I) -> Result<Self, DictionaryError>
    where
        I: IntoIterator<Item = (T, R, Option<KeywordGuard>)>,
        T: Into<String>,
        R: Into<String>,
    {
        let mut out: Vec<KeywordEntry> = Vec::new();
        for (index, (term, ruby_form, guard)) in entries.into_iter().enumerate() {
            let term = term.into();
            let ruby_form = ruby_form.into();
            if term.trim().is_empty() {
                return Err(DictionaryError::EmptyTerm { index });
            }
            if out.iter().any(|entry| entry.term == term) {
                return Err(DictionaryError::DuplicateTerm { term });
            }
            let expansion = parse_ruby_form(&ruby_form);
            if expansion
                .iter()
                .any(|token| !matches!(token, Token::Ruby { .. } | Token::Literal(_)))
            {
                return Err(DictionaryError::UnsupportedMarkup { term });
            }
            if !expansion.iter().any(|token| matches!(token, Token::Ruby { .. })) {
                return Err(DictionaryError::NoRubyPair { term });
            }
            out.push(KeywordEntry {
                term,
                ruby_form,
                expansion,
                guard,
            });
        }
        out.sort_by(|a, b| b.term.len().cmp(&a.term.len()));
        Ok(Self {
            format,
            entries: out,
        })
    }

    pub fn format(&self) -> CardFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&KeywordEntry> {
        self.entries.iter().find(|entry| entry.term == term)
    }

    pub fn entries(&self) -> impl Iterator<Item = &KeywordEntry> {
        self.entries.iter()
    }

    /// Longest entry that prefixes `text` and passes `accept`.
    pub fn longest_match(
        &self,
        text: &str,
        mut accept: impl FnMut(&KeywordEntry) -> bool,
    ) -> Option<&KeywordEntry> {
        self.entries
            .iter()
            .filter(|entry| text.starts_with(entry.term.as_str()))
            .find(|entry| accept(entry))
    }
}

type RawEntry = (&'static str, &'static str, Option<KeywordGuard>);

const STANDALONE: Option<KeywordGuard> = Some(KeywordGuard::Standalone);
const AFTER_DIGIT: Option<KeywordGuard> = Some(KeywordGuard::AfterDigit);

static OCG_ENTRIES: &[RawEntry] = &[
    // Players
    ("自分", "{自|じ}{分|ぶん}", None),
    ("相手", "{相|あい}{手|て}", None),
    ("自身", "{自|じ}{身|しん}", None),
    ("互い", "{互|たが}い", None),
    ("両方", "{両|りょう}{方|ほう}", None),

    // Zones
    ("手札", "{手|て}{札|ふだ}", None),
    ("墓地", "{墓|ぼ}{地|ち}", None),
    ("除外", "{除|じょ}{外|がい}", None),
    ("フィールド魔法", "フィールド{魔|ま}{法|ほう}", None),

    // Summoning and materials
    ("召喚", "{召|しょう}{喚|かん}", None),
    ("特殊", "{特|とく}{殊|しゅ}", None),
    ("特殊召喚", "{特|とく}{殊|しゅ}{召|しょう}{喚|かん}", None),
    ("通常召喚", "{通|つう}{常|じょう}{召|しょう}{喚|かん}", None),
    ("反転召喚", "{反|はん}{転|てん}{召|しょう}{喚|かん}", None),
    ("融合召喚", "{融|ゆう}{合|ごう}{召|しょう}{喚|かん}", None),
    ("儀式召喚", "{儀|ぎ}{式|しき}{召|しょう}{喚|かん}", None),
    ("アドバンス召喚", "アドバンス{召|しょう}{喚|かん}", None),
    ("シンクロ召喚", "シンクロ{召|しょう}{喚|かん}", None),
    ("エクシーズ召喚", "エクシーズ{召|しょう}{喚|かん}", None),
    ("ペンデュラム召喚", "ペンデュラム{召|しょう}{喚|かん}", None),
    ("リンク召喚", "リンク{召|しょう}{喚|かん}", None),
    ("召喚条件", "{召|しょう}{喚|かん}{条|じょう}{件|けん}", None),
    ("条件", "{条|じょう}{件|けん}", None),
    ("素材", "{素|そ}{材|ざい}", None),
    ("融合素材", "{融|ゆう}{合|ごう}{素|そ}{材|ざい}", None),
    ("シンクロ素材", "シンクロ{素|そ}{材|ざい}", None),
    ("エクシーズ素材", "エクシーズ{素|そ}{材|ざい}", None),
    ("リンク素材", "リンク{素|そ}{材|ざい}", None),
    ("生贄", "{生|いけ}{贄|にえ}", None),

    // Card kinds
    ("効果", "{効|こう}{果|か}", None),
    ("魔法", "{魔|ま}{法|ほう}", None),
    ("罠", "{罠|わな}", None),
    ("通常", "{通|つう}{常|じょう}", None),
    ("永続", "{永|えい}{続|ぞく}", None),
    ("速攻", "{速|そっ}{攻|こう}", None),
    ("装備", "{装|そう}{備|び}", None),
    ("融合", "{融|ゆう}{合|ごう}", None),
    ("儀式", "{儀|ぎ}{式|しき}", None),
    ("速攻魔法", "{速|そっ}{攻|こう}{魔|ま}{法|ほう}", None),
    ("通常魔法", "{通|つう}{常|じょう}{魔|ま}{法|ほう}", None),
    ("永続魔法", "{永|えい}{続|ぞく}{魔|ま}{法|ほう}", None),
    ("装備魔法", "{装|そう}{備|び}{魔|ま}{法|ほう}", None),
    ("儀式魔法", "{儀|ぎ}{式|しき}{魔|ま}{法|ほう}", None),
    ("通常罠", "{通|つう}{常|じょう}{罠|わな}", None),
    ("永続罠", "{永|えい}{続|ぞく}{罠|わな}", None),
    ("カウンター罠", "カウンター{罠|わな}", None),
    ("カード名", "カード{名|めい}", None),
    ("同名", "{同|どう}{名|めい}", None),
    ("魔力カウンター", "{魔|ま}{力|りょく}カウンター", None),

    // Battle and positions
    ("攻撃", "{攻|こう}{撃|げき}", None),
    ("攻撃力", "{攻|こう}{撃|げき}{力|りょく}", None),
    ("守備", "{守|しゅ}{備|び}", None),
    ("守備力", "{守|しゅ}{備|び}{力|りょく}", None),
    ("攻守", "{攻|こう}{守|しゅ}", None),
    ("戦闘", "{戦|せん}{闘|とう}", None),
    ("戦闘破壊", "{戦|せん}{闘|とう}{破|は}{壊|かい}", None),
    ("戦闘ダメージ", "{戦|せん}{闘|とう}ダメージ", None),
    ("効果ダメージ", "{効|こう}{果|か}ダメージ", None),
    ("ダメージ計算", "ダメージ{計|けい}{算|さん}", None),
    ("直接", "{直|ちょく}{接|せつ}", None),
    ("直接攻撃", "{直|ちょく}{接|せつ}{攻|こう}{撃|げき}", None),
    ("攻撃宣言", "{攻|こう}{撃|げき}{宣|せん}{言|げん}", None),
    ("貫通", "{貫|かん}{通|つう}", None),
    ("表側", "{表|おもて}{側|がわ}", None),
    ("裏側", "{裏|うら}{側|がわ}", None),
    ("表示", "{表|ひょう}{示|じ}", None),
    ("表側表示", "{表|おもて}{側|がわ}{表|ひょう}{示|じ}", None),
    ("裏側表示", "{裏|うら}{側|がわ}{表|ひょう}{示|じ}", None),
    ("攻撃表示", "{攻|こう}{撃|げき}{表|ひょう}{示|じ}", None),
    ("守備表示", "{守|しゅ}{備|び}{表|ひょう}{示|じ}", None),
    ("裏側守備表示", "{裏|うら}{側|がわ}{守|しゅ}{備|び}{表|ひょう}{示|じ}", None),
    ("表示形式", "{表|ひょう}{示|じ}{形|けい}{式|しき}", None),
    ("表向き", "{表|おもて}{向|む}き", None),
    ("裏向き", "{裏|うら}{向|む}き", None),

    // Effect vocabulary
    ("発動", "{発|はつ}{動|どう}", None),
    ("破壊", "{破|は}{壊|かい}", None),
    ("無効", "{無|む}{効|こう}", None),
    ("無効化", "{無|む}{効|こう}{化|か}", None),
    ("対象", "{対|たい}{象|しょう}", None),
    ("選択", "{選|せん}{択|たく}", None),
    ("指定", "{指|し}{定|てい}", None),
    ("宣言", "{宣|せん}{言|げん}", None),
    ("確認", "{確|かく}{認|にん}", None),
    ("公開", "{公|こう}{開|かい}", None),
    ("使用", "{使|し}{用|よう}", None),
    ("適用", "{適|てき}{用|よう}", None),
    ("処理", "{処|しょ}{理|り}", None),
    ("発生", "{発|はっ}{生|せい}", None),
    ("成功", "{成|せい}{功|こう}", None),
    ("存在", "{存|そん}{在|ざい}", None),
    ("移動", "{移|い}{動|どう}", None),
    ("獲得", "{獲|かく}{得|とく}", None),
    ("回復", "{回|かい}{復|ふく}", None),
    ("計算", "{計|けい}{算|さん}", None),
    ("変更", "{変|へん}{更|こう}", None),
    ("変化", "{変|へん}{化|か}", None),
    ("開始", "{開|かい}{始|し}", None),
    ("終了", "{終|しゅう}{了|りょう}", None),
    ("終了時", "{終|しゅう}{了|りょう}{時|じ}", None),
    ("制限", "{制|せい}{限|げん}", None),
    ("制約", "{制|せい}{約|やく}", None),
    ("耐性", "{耐|たい}{性|せい}", None),
    ("反転", "{反|はん}{転|てん}", None),

    // Verbs and okurigana
    ("加える", "{加|くわ}える", None),
    ("加え", "{加|くわ}え", None),
    ("戻す", "{戻|もど}す", None),
    ("戻る", "{戻|もど}る", None),
    ("戻し", "{戻|もど}し", None),
    ("捨てる", "{捨|す}てる", None),
    ("捨て", "{捨|す}て", None),
    ("選ぶ", "{選|えら}ぶ", None),
    ("選んで", "{選|えら}んで", None),
    ("送る", "{送|おく}る", None),
    ("送り", "{送|おく}り", None),
    ("得る", "{得|え}る", None),
    ("受ける", "{受|う}ける", None),
    ("与える", "{与|あた}える", None),
    ("払う", "{払|はら}う", None),
    ("支払う", "{支|し}{払|はら}う", None),
    ("引く", "{引|ひ}く", None),
    ("置く", "{置|お}く", None),
    ("持つ", "{持|も}つ", None),
    ("出す", "{出|だ}す", None),
    ("使う", "{使|つか}う", None),
    ("行う", "{行|おこな}う", None),
    ("上げる", "{上|あ}げる", None),
    ("下げる", "{下|さ}げる", None),
    ("同じ", "{同|おな}じ", None),
    ("異なる", "{異|こと}なる", None),
    ("全て", "{全|すべ}て", None),
    ("必ず", "{必|かなら}ず", None),

    // Quantities and conditions
    ("場合", "{場|ば}{合|あい}", None),
    ("以下", "{以|い}{下|か}", None),
    ("以上", "{以|い}{上|じょう}", None),
    ("以外", "{以|い}{外|がい}", None),
    ("以降", "{以|い}{降|こう}", None),
    ("以内", "{以|い}{内|ない}", None),
    ("未満", "{未|み}{満|まん}", None),
    ("一度", "{一|いち}{度|ど}", None),
    ("半分", "{半|はん}{分|ぶん}", None),
    ("合計", "{合|ごう}{計|けい}", None),
    ("数値", "{数|すう}{値|ち}", None),
    ("枚数", "{枚|まい}{数|すう}", None),
    ("元々", "{元|もと}{々|もと}", None),
    ("全体", "{全|ぜん}{体|たい}", None),
    ("任意", "{任|にん}{意|い}", None),
    ("最大", "{最|さい}{大|だい}", None),
    ("最初", "{最|さい}{初|しょ}", None),
    ("最後", "{最|さい}{後|ご}", None),
    ("種類", "{種|しゅ}{類|るい}", None),
    ("別", "{別|べつ}", None),
    ("枚", "{枚|まい}", None),
    ("倍", "{倍|ばい}", None),
    ("階級", "{階|かい}{級|きゅう}", None),

    // Types and attributes
    ("種族", "{種|しゅ}{族|ぞく}", None),
    ("属性", "{属|ぞく}{性|せい}", None),
    ("天使族", "{天|てん}{使|し}{族|ぞく}", None),
    ("悪魔族", "{悪|あく}{魔|ま}{族|ぞく}", None),
    ("戦士族", "{戦|せん}{士|し}{族|ぞく}", None),
    ("獣族", "{獣|じゅう}{族|ぞく}", None),
    ("獣戦士族", "{獣|じゅう}{戦|せん}{士|し}{族|ぞく}", None),
    ("鳥獣族", "{鳥|ちょう}{獣|じゅう}{族|ぞく}", None),
    ("機械族", "{機|き}{械|かい}{族|ぞく}", None),
    ("水族", "{水|みず}{族|ぞく}", None),
    ("炎族", "{炎|ほのお}{族|ぞく}", None),
    ("岩石族", "{岩|がん}{石|せき}{族|ぞく}", None),
    ("植物族", "{植|しょく}{物|ぶつ}{族|ぞく}", None),
    ("昆虫族", "{昆|こん}{虫|ちゅう}{族|ぞく}", None),
    ("雷族", "{雷|いかずち}{族|ぞく}", None),
    ("恐竜族", "{恐|きょう}{竜|りゅう}{族|ぞく}", None),
    ("爬虫類族", "{爬|は}{虫|ちゅう}{類|るい}{族|ぞく}", None),
    ("海竜族", "{海|かい}{竜|りゅう}{族|ぞく}", None),
    ("魚族", "{魚|さかな}{族|ぞく}", None),
    ("幻竜族", "{幻|げん}{竜|りゅう}{族|ぞく}", None),
    ("幻神獣族", "{幻|げん}{神|しん}{獣|じゅう}{族|ぞく}", None),
    ("創造神族", "{創|そう}{造|ぞう}{神|しん}{族|ぞく}", None),
    ("魔法使い族", "{魔|ま}{法|ほう}{使|つか}い{族|ぞく}", None),
    ("ドラゴン族", "ドラゴン{族|ぞく}", None),
    ("アンデット族", "アンデット{族|ぞく}", None),
    ("サイキック族", "サイキック{族|ぞく}", None),
    ("サイバース族", "サイバース{族|ぞく}", None),
    ("光属性", "{光|ひかり}{属|ぞく}{性|せい}", None),
    ("闇属性", "{闇|やみ}{属|ぞく}{性|せい}", None),
    ("地属性", "{地|ち}{属|ぞく}{性|せい}", None),
    ("水属性", "{水|みず}{属|ぞく}{性|せい}", None),
    ("炎属性", "{炎|ほのお}{属|ぞく}{性|せい}", None),
    ("風属性", "{風|かぜ}{属|ぞく}{性|せい}", None),
    ("神属性", "{神|かみ}{属|ぞく}{性|せい}", None),

    // Short tokens, guarded by context
    ("上", "{上|うえ}", Some(KeywordGuard::NotAfter(&['以', '向', '浮', '頂', '最', '計', '売', '屋']))),
    ("下", "{下|した}", Some(KeywordGuard::NotAfter(&['以', '低', '地', '配', '降', '落', '却']))),
    ("場", "{場|ば}", Some(KeywordGuard::NotBefore(&['所', '面', '外']))),
    ("表", "{表|おもて}", Some(KeywordGuard::NotBefore(&['現', '記', '明']))),
    ("手", "{手|て}", Some(KeywordGuard::NotBefore(&['段', '法']))),
    ("時", "{時|とき}", Some(KeywordGuard::NotAfter(&['同', '一', '臨', '当', '常', '即']))),
    ("力", "{力|ちから}", Some(KeywordGuard::NotAfter(&['能', '協', '念', '威', '動', '重', '魔']))),
    ("後", "{後|あと}", Some(KeywordGuard::NotAfter(&['以', '直', '背', '午', '前', '戦']))),
    ("次", "{次|つぎ}", Some(KeywordGuard::NotBefore(&['元']))),
    ("元", "{元|もと}", Some(KeywordGuard::NotAfter(&['次', '異', '身', '復', '還', '地']))),
    ("体", "{体|たい}", AFTER_DIGIT),
    ("度", "{度|ど}", AFTER_DIGIT),
    ("回", "{回|かい}", AFTER_DIGIT),
    ("個", "{個|こ}", AFTER_DIGIT),
    ("P", "{P|ペンデュラム}", STANDALONE),
    ("EX", "{EX|エクストラ}", STANDALONE),
    ("S", "{S|シンクロ}", STANDALONE),
    ("X", "{X|エクシーズ}", STANDALONE),
    ("LP", "{LP|ライフポイント}", STANDALONE),
];

static TCG_ENTRIES: &[RawEntry] = &[
    ("P", "{P|ペンデュラム}", STANDALONE),
    ("EX", "{EX|エクストラ}", STANDALONE),
    ("LP", "{LP|ライフポイント}", STANDALONE),
];

/// Build the built-in dictionary for `format`.
pub fn init_dictionary(format: CardFormat) -> KeywordDictionary {
    let entries = match format {
        CardFormat::Ocg => OCG_ENTRIES,
        CardFormat::Tcg => TCG_ENTRIES,
    };
    // Built-in tables are covered by tests; fall back to no keywords rather than panic.
    KeywordDictionary::from_entries(format, entries.iter().copied()).unwrap_or_else(|err| {
        log::error!("built-in {} keyword dictionary rejected: {}", format, err);
        KeywordDictionary::empty(format)
    })
}
