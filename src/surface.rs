//! The rendering capability a device draws through.
//!
//! The crate never rasterizes anything itself. A device is handed a boxed
//! [`RenderSurface`] at construction by a [`SurfaceProvider`] and only ever calls the
//! primitives below on it; games do the same through [`Device::with_surface`].
//!
//! For headless use and tests, [`HeadlessCanvas`] provides a [`RecordingSurface`] that
//! keeps a bounded log of every [`DrawCall`].
//!
//! [`Device::with_surface`]: crate::Device::with_surface

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Number of draw calls a [`RecordingSurface`] keeps before discarding the oldest.
pub const DEFAULT_RECORDING_CAPACITY: usize = 4096;

/// Font used by a surface until [`RenderSurface::set_font`] is called.
pub const DEFAULT_FONT: &str = "10px monospace";

/// An RGBA color.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel, 255 is opaque.
    pub a: u8,
}

impl Color {
    /// Creates an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Creates a color with an explicit alpha channel.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    ///
    /// ```
    /// use handheld_link::surface::Color;
    ///
    /// assert_eq!(Color::from_hex("#c4cfa1"), Some(Color::rgb(0xc4, 0xcf, 0xa1)));
    /// assert_eq!(Color::from_hex("nope"), None);
    /// ```
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        };
        Some(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Formats the color as `#rrggbb`, ignoring alpha.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// An axis-aligned rectangle in surface pixels.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Result of [`RenderSurface::measure_text`].
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextMetrics {
    /// Advance width of the measured text.
    pub width: f32,
}

/// A decoded RGBA image. Row major, four bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// Wraps raw RGBA pixels. Returns `None` if `pixels` does not hold exactly
    /// `width * height` pixels.
    #[must_use]
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        (pixels.len() == expected).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Creates an image filled with a single color.
    #[must_use]
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The raw RGBA bytes.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Drawing primitives a device and its game may use.
///
/// Implementations must be `Send` because devices are ticked from the scheduler's
/// driver thread.
pub trait RenderSurface: Send {
    /// Surface width in pixels.
    fn width(&self) -> u32;

    /// Surface height in pixels.
    fn height(&self) -> u32;

    /// Fills `rect` with `color`.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Resets `rect` to transparent.
    fn clear_rect(&mut self, rect: Rect);

    /// Sets the font used by subsequent text calls, CSS shorthand such as `"12px monospace"`.
    fn set_font(&mut self, font: &str);

    /// Draws `text` with its baseline origin at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: f32, y: f32, color: Color);

    /// Measures `text` in the current font.
    fn measure_text(&self, text: &str) -> TextMetrics;

    /// Draws `image` scaled into `dest`.
    fn draw_image(&mut self, image: &Image, dest: Rect);

    /// Enables or disables smoothing when images are scaled.
    fn set_image_smoothing(&mut self, enabled: bool);

    /// The full surface as a rectangle.
    fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
    }
}

/// Supplies the surface a device is built on.
///
/// Returning `None` makes device construction fail with
/// [`HandheldError::SurfaceUnavailable`](crate::HandheldError::SurfaceUnavailable).
pub trait SurfaceProvider {
    /// Hands out a surface, or `None` if none can be acquired.
    fn acquire_surface(&mut self) -> Option<Box<dyn RenderSurface>>;
}

impl SurfaceProvider for Option<Box<dyn RenderSurface>> {
    fn acquire_surface(&mut self) -> Option<Box<dyn RenderSurface>> {
        self.take()
    }
}

/// A provider for headless operation: every acquisition yields a fresh
/// [`RecordingSurface`] of the given size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeadlessCanvas {
    width: u32,
    height: u32,
}

impl HeadlessCanvas {
    /// Creates a provider for surfaces of `width` x `height` pixels.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl SurfaceProvider for HeadlessCanvas {
    fn acquire_surface(&mut self) -> Option<Box<dyn RenderSurface>> {
        Some(Box::new(RecordingSurface::new(self.width, self.height)))
    }
}

/// A provider that never yields a surface, e.g. a canvas element that was never mounted.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DetachedCanvas;

impl SurfaceProvider for DetachedCanvas {
    fn acquire_surface(&mut self) -> Option<Box<dyn RenderSurface>> {
        None
    }
}

/// One recorded drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCall {
    /// [`RenderSurface::fill_rect`].
    FillRect {
        /// Target area.
        rect: Rect,
        /// Fill color.
        color: Color,
    },
    /// [`RenderSurface::clear_rect`].
    ClearRect {
        /// Target area.
        rect: Rect,
    },
    /// [`RenderSurface::set_font`].
    SetFont {
        /// The new font.
        font: String,
    },
    /// [`RenderSurface::draw_text`].
    Text {
        /// The drawn text.
        text: String,
        /// Baseline x.
        x: f32,
        /// Baseline y.
        y: f32,
        /// Text color.
        color: Color,
    },
    /// [`RenderSurface::draw_image`].
    Image {
        /// Source image width.
        width: u32,
        /// Source image height.
        height: u32,
        /// Target area.
        dest: Rect,
    },
    /// [`RenderSurface::set_image_smoothing`].
    ImageSmoothing {
        /// The new setting.
        enabled: bool,
    },
}

#[derive(Debug)]
struct RecordingState {
    width: u32,
    height: u32,
    font: String,
    smoothing: bool,
    calls: VecDeque<DrawCall>,
    capacity: usize,
}

impl RecordingState {
    fn record(&mut self, call: DrawCall) {
        if self.capacity == 0 {
            return;
        }
        while self.calls.len() >= self.capacity {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// A surface that draws nothing and records every call.
///
/// Clones share the same log, so a test can keep one clone and give the other to a
/// device (a `RecordingSurface` is itself a [`SurfaceProvider`]).
///
/// ```
/// use handheld_link::surface::{Color, DrawCall, RecordingSurface, Rect, RenderSurface};
///
/// let recorder = RecordingSurface::new(160, 144);
/// let mut surface = recorder.clone();
/// surface.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0), Color::rgb(0, 0, 0));
/// assert!(matches!(recorder.calls().last(), Some(DrawCall::FillRect { .. })));
/// ```
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSurface {
    /// Creates a recorder keeping the last [`DEFAULT_RECORDING_CAPACITY`] calls.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capacity(width, height, DEFAULT_RECORDING_CAPACITY)
    }

    /// Creates a recorder keeping the last `capacity` calls.
    #[must_use]
    pub fn with_capacity(width: u32, height: u32, capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                width,
                height,
                font: DEFAULT_FONT.to_owned(),
                smoothing: true,
                calls: VecDeque::with_capacity(capacity.min(DEFAULT_RECORDING_CAPACITY)),
                capacity,
            })),
        }
    }

    /// Snapshot of the recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<DrawCall> {
        self.state.lock().calls.iter().cloned().collect()
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Forgets all recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Whether image smoothing is currently enabled.
    #[must_use]
    pub fn smoothing_enabled(&self) -> bool {
        self.state.lock().smoothing
    }

    /// The current font.
    #[must_use]
    pub fn font(&self) -> String {
        self.state.lock().font.clone()
    }

    /// The color of the most recent full-surface fill, i.e. the current background.
    #[must_use]
    pub fn background(&self) -> Option<Color> {
        let state = self.state.lock();
        let (width, height) = (state.width as f32, state.height as f32);
        state.calls.iter().rev().find_map(|call| match call {
            DrawCall::FillRect { rect, color }
                if rect.x <= 0.0
                    && rect.y <= 0.0
                    && rect.width >= width
                    && rect.height >= height =>
            {
                Some(*color)
            },
            _ => None,
        })
    }

    /// Texts drawn so far, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DrawCall::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Approximates glyph advance from the pixel size in a CSS font shorthand.
fn glyph_width(font: &str) -> f32 {
    let size = font
        .split_whitespace()
        .find_map(|part| part.strip_suffix("px"))
        .and_then(|px| px.parse::<f32>().ok())
        .unwrap_or(10.0);
    size * 0.6
}

impl RenderSurface for RecordingSurface {
    fn width(&self) -> u32 {
        self.state.lock().width
    }

    fn height(&self) -> u32 {
        self.state.lock().height
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.state.lock().record(DrawCall::FillRect { rect, color });
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.state.lock().record(DrawCall::ClearRect { rect });
    }

    fn set_font(&mut self, font: &str) {
        let mut state = self.state.lock();
        font.clone_into(&mut state.font);
        state.record(DrawCall::SetFont {
            font: font.to_owned(),
        });
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        self.state.lock().record(DrawCall::Text {
            text: text.to_owned(),
            x,
            y,
            color,
        });
    }

    fn measure_text(&self, text: &str) -> TextMetrics {
        let state = self.state.lock();
        TextMetrics {
            width: text.chars().count() as f32 * glyph_width(&state.font),
        }
    }

    fn draw_image(&mut self, image: &Image, dest: Rect) {
        self.state.lock().record(DrawCall::Image {
            width: image.width(),
            height: image.height(),
            dest,
        });
    }

    fn set_image_smoothing(&mut self, enabled: bool) {
        let mut state = self.state.lock();
        state.smoothing = enabled;
        state.record(DrawCall::ImageSmoothing { enabled });
    }
}

impl SurfaceProvider for RecordingSurface {
    fn acquire_surface(&mut self) -> Option<Box<dyn RenderSurface>> {
        Some(Box::new(self.clone()))
    }
}
