use core::convert::Infallible;

use serde::Serialize;

use crate::metrics::FontSpec;
use crate::paint::{Fill, Outline, RectF, Rgba, Shadow, Surface};

/// Fill-text draw command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextCommand {
    pub text: String,
    /// Left x of the glyph.
    pub x: f32,
    pub baseline_y: f32,
    pub font: FontSpec,
    pub scale_x: f32,
    pub fill: Fill,
    pub shadow: Option<Shadow>,
}

/// Outline-text draw command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrokeTextCommand {
    pub text: String,
    pub x: f32,
    pub baseline_y: f32,
    pub font: FontSpec,
    pub scale_x: f32,
    pub outline: Outline,
}

/// Rectangle frame command.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RectCommand {
    pub rect: RectF,
    pub color: Rgba,
    pub width: f32,
}

/// Inline image command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageCommand {
    pub src: String,
    pub rect: RectF,
}

/// Backend-agnostic draw command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Fill a glyph run.
    Text(TextCommand),
    /// Outline a glyph run.
    StrokeText(StrokeTextCommand),
    /// Frame a boxed run.
    Rect(RectCommand),
    /// Draw an inline image.
    Image(ImageCommand),
}

impl DrawCommand {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(cmd) => Some(&cmd.text),
            Self::StrokeText(cmd) => Some(&cmd.text),
            Self::Rect(_) | Self::Image(_) => None,
        }
    }
}

/// Surface state captured by `save`.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintState {
    pub fill: Fill,
    pub shadow: Option<Shadow>,
    pub font: FontSpec,
    pub scale_x: f32,
}

impl Default for PaintState {
    fn default() -> Self {
        Self {
            fill: Fill::default(),
            shadow: None,
            font: FontSpec::new("", 0.0),
            scale_x: 1.0,
        }
    }
}

/// Surface that records draw commands instead of rasterizing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingSurface {
    commands: Vec<DrawCommand>,
    state: PaintState,
    stack: Vec<PaintState>,
    unbalanced_restores: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<DrawCommand> {
        self.commands
    }

    pub fn state(&self) -> &PaintState {
        &self.state
    }

    /// Outstanding `save` calls.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// `restore` calls without a matching `save`.
    pub fn unbalanced_restores(&self) -> usize {
        self.unbalanced_restores
    }

    /// Fill-text commands only.
    pub fn texts(&self) -> impl Iterator<Item = &TextCommand> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::Text(text) => Some(text),
            _ => None,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.commands)
    }
}

impl Surface for RecordingSurface {
    type Error = Infallible;

    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        match self.stack.pop() {
            Some(state) => self.state = state,
            None => self.unbalanced_restores += 1,
        }
    }

    fn set_fill(&mut self, fill: &Fill) {
        self.state.fill = *fill;
    }

    fn set_shadow(&mut self, shadow: Option<&Shadow>) {
        self.state.shadow = shadow.copied();
    }

    fn set_font(&mut self, font: &FontSpec) {
        self.state.font = font.clone();
    }

    fn set_scale_x(&mut self, scale: f32) {
        self.state.scale_x = scale;
    }

    fn fill_text(&mut self, text: &str, x: f32, baseline_y: f32) -> Result<(), Infallible> {
        self.commands.push(DrawCommand::Text(TextCommand {
            text: text.to_string(),
            x,
            baseline_y,
            font: self.state.font.clone(),
            scale_x: self.state.scale_x,
            fill: self.state.fill,
            shadow: self.state.shadow,
        }));
        Ok(())
    }

    fn stroke_text(
        &mut self,
        text: &str,
        x: f32,
        baseline_y: f32,
        outline: &Outline,
    ) -> Result<(), Infallible> {
        self.commands.push(DrawCommand::StrokeText(StrokeTextCommand {
            text: text.to_string(),
            x,
            baseline_y,
            font: self.state.font.clone(),
            scale_x: self.state.scale_x,
            outline: *outline,
        }));
        Ok(())
    }

    fn stroke_rect(&mut self, rect: RectF, color: Rgba, width: f32) -> Result<(), Infallible> {
        self.commands
            .push(DrawCommand::Rect(RectCommand { rect, color, width }));
        Ok(())
    }

    fn draw_image(&mut self, src: &str, rect: RectF) -> Result<(), Infallible> {
        self.commands.push(DrawCommand::Image(ImageCommand {
            src: src.to_string(),
            rect,
        }));
        Ok(())
    }
}
