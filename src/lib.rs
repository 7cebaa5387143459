//! Markup resolution, ruby handling and glyph segmentation for trading-card
//! text.
//!
//! Raw field text flows through three stages before layout:
//!
//! 1. [`resolve`] tokenizes author markup and dictionary keywords into a
//!    marker-encoded [`NormalizedText`].
//! 2. [`split`] cuts the normalized text into indivisible [`Fragment`]s.
//! 3. [`classify`] assigns every character a [`GlyphClass`] with its width
//!    ratio and line-break affinity.
//!
//! Layout, condensation and painting live in `card-typeset-render`.

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod fragment;
pub mod glyph_class;
pub mod keyword;
pub mod markup;
pub mod normalized;

pub use fragment::{split, Fragment, FragmentKind, InlineStyle, WordScript, Zone, ZoneKind};
pub use glyph_class::{
    classify, classify_cluster, is_whole_word_char, CardFormat, Glyph, GlyphClass,
};
pub use keyword::{init_dictionary, DictionaryError, KeywordDictionary, KeywordEntry, KeywordGuard};
pub use markup::{parse_placeholder, resolve, tokenize, PlaceholderAttrs, StyleTag, Token};
pub use normalized::{marker, NormalizedText};
