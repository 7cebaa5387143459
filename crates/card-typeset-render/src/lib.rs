//! Measurement, line breaking, condensation and painting for `card-typeset`.

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

mod condense;
mod layout_config;
mod line_break;
mod metrics;
mod paint;
mod render_engine;
mod render_ir;

pub use card_typeset::CardFormat;
pub use condense::{
    condense_line, condense_lines, fragment_width, line_width, ruby_scale, solve, Condensed,
    DEFAULT_RUBY_BONUS_RATIO, MIN_SCALE,
};
pub use layout_config::{CondenseTolerance, ConfigError, LayoutProfile, ToleranceTier};
pub use line_break::{break_lines, can_break, BrokenLines, Escalation, Line};
pub use metrics::{
    scale_font_data, AdvanceTable, FontMetricsRecord, FontMetricsTable, FontSpec,
    FragmentMeasurer, FragmentMetrics, RubyConfig, TextMeasurer,
};
pub use paint::{
    paint, Fill, LinearGradient, Outline, PaintInput, PaintScope, RectF, Rgba, Shadow, Surface,
    TextAlign, TextStyle,
};
pub use render_engine::{
    CancelToken, CardLayoutProfile, CardText, CardTextStyles, LayoutDiagnostic, LayoutEngine,
    NeverCancel, RenderError, TextField, TextFieldLayout,
};
pub use render_ir::{
    DrawCommand, ImageCommand, PaintState, RecordingSurface, RectCommand, StrokeTextCommand,
    TextCommand,
};
