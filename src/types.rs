//! Core types used throughout the VDC library.
//!
//! This module contains the fundamental data structures:
//! - [`Category`] - Severity ordering for changes
//! - [`ChangeRegion`] / [`ChangeKind`] - Localized visual changes
//! - [`Verdict`] / [`Evidence`] - Categorization results with provenance
//! - [`PixelBox`] / [`Extent`] / [`Rgb`] - Geometry and color primitives

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a visual change.
///
/// Categories form a total order (`Ignore < Expected < Warning < Error`);
/// aggregation over regions or stories always takes the maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ignore,
    Expected,
    Warning,
    Error,
}

impl Category {
    pub const fn all() -> [Category; 4] {
        [
            Category::Ignore,
            Category::Expected,
            Category::Warning,
            Category::Error,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Ignore => "ignore",
            Category::Expected => "expected",
            Category::Warning => "warning",
            Category::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Width and height of a raster, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel-space rectangle (top-left origin, inclusive width/height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Smallest box covering both rectangles.
    pub fn union(&self, other: &PixelBox) -> PixelBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        PixelBox::new(x, y, right - x, bottom - y)
    }
}

/// An sRGB color, serialized as a `#rrggbb` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parses `#rrggbb` or `rrggbb` (case-insensitive).
    pub fn parse(s: &str) -> Option<Rgb> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Rgb { r, g, b })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> String {
        c.hex()
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Rgb::parse(&s).ok_or_else(|| format!("invalid hex color: {s}"))
    }
}

/// What kind of change a region represents.
///
/// Inference runs in a fixed order (shift, color, resize, content) and the
/// first match wins; regions that match nothing stay [`ChangeKind::Unclassified`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeKind {
    /// Content translated by an integer pixel offset.
    Shift { dx: i32, dy: i32 },
    /// Same shape, one dominant color replaced by another.
    ColorShift { old: Rgb, new: Rgb },
    /// Content box grew or shrank while keeping its aspect ratio.
    Resize { old: Extent, new: Extent },
    /// Text-like content changed in place.
    Content,
    /// No structural pattern recognized.
    Unclassified,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Shift { .. } => "shift",
            ChangeKind::ColorShift { .. } => "colorShift",
            ChangeKind::Resize { .. } => "resize",
            ChangeKind::Content => "content",
            ChangeKind::Unclassified => "unclassified",
        }
    }
}

/// A connected cluster of changed pixels, with its inferred kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRegion {
    /// Bounding box in pixel coordinates of the current screenshot.
    pub bounds: PixelBox,
    /// Number of changed pixels inside the box.
    pub pixel_count: u64,
    /// Changed pixels relative to the full screenshot area (0.0 - 1.0).
    pub ratio: f32,
    /// Mean magnitude of the changed pixels (0.0 - 1.0).
    pub mean_magnitude: f32,
    #[serde(flatten)]
    pub kind: ChangeKind,
    /// Representative backdrop color sampled around the region, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Rgb>,
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum Evidence {
    /// A design-token diff entry matched the observed change.
    Token { name: String, commit: String },
    /// A commit message mentioned the observed value.
    Commit { id: String, excerpt: String },
    /// The pull-request description mentioned the observed value.
    PrDescription { excerpt: String },
    /// A computed measurement backing the verdict.
    Measurement { label: String, value: String },
    /// No change context was available for this run.
    NoneAvailable,
}

/// Suggested handling for a categorized region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    AutoApprove,
    Approve,
    Review,
    Reject,
}

/// Extra annotation from the optional advisory classifier.
///
/// Advisory output never changes a category; it only adds description and
/// volatile-content tags the approval policy may consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryNote {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatile: Option<VolatileKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Volatile content kinds an advisory classifier can tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatileKind {
    Timestamp,
    Uuid,
}

/// The categorization result for one change region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub category: Category,
    /// Human-readable explanation of which rule fired.
    pub reason: String,
    /// Supporting evidence; never empty (degraded runs record
    /// [`Evidence::NoneAvailable`]).
    pub evidence: Vec<Evidence>,
    pub recommendation: Recommendation,
    /// Confidence in the verdict (0.0 - 1.0); degraded mode caps this low.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<AdvisoryNote>,
}
