//! Page geometry in PDF user-space points.

use crate::error::{Error, Result};
use lopdf::Object;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Axis-aligned rectangle `[x0 y0 x1 y1]` in points (1 point = 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Create a rectangle from its corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Width in points.
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).abs()
    }

    /// Height in points.
    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }

    /// Read a rectangle from a PDF array of four numbers.
    pub fn from_objects(values: &[Object]) -> Option<Self> {
        if values.len() < 4 {
            return None;
        }
        let mut n = [0f32; 4];
        for (slot, value) in n.iter_mut().zip(values) {
            *slot = value.as_float().ok()?;
        }
        let rect = Self::new(
            n[0].min(n[2]),
            n[1].min(n[3]),
            n[0].max(n[2]),
            n[1].max(n[3]),
        );
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return None;
        }
        Some(rect)
    }

    /// Encode as a PDF array.
    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            Object::Real(self.x0),
            Object::Real(self.y0),
            Object::Real(self.x1),
            Object::Real(self.y1),
        ])
    }

    /// Bounding box of the four corners mapped through `transform`.
    pub fn transformed(&self, transform: &Affine) -> Self {
        let corners = [
            transform.apply(self.x0, self.y0),
            transform.apply(self.x1, self.y0),
            transform.apply(self.x0, self.y1),
            transform.apply(self.x1, self.y1),
        ];
        let mut rect = Self::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, y) in corners {
            rect.x0 = rect.x0.min(x);
            rect.y0 = rect.y0.min(y);
            rect.x1 = rect.x1.max(x);
            rect.y1 = rect.y1.max(y);
        }
        rect
    }
}

/// Affine transform `[a b c d e f]` as used by the `cm` operator:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    /// The transform that changes nothing.
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Uniform scale about the origin.
    pub fn scale(scale: f32) -> Self {
        Self {
            a: scale,
            d: scale,
            ..Self::IDENTITY
        }
    }

    /// Translation by `(dx, dy)`.
    pub fn translate(dx: f32, dy: f32) -> Self {
        Self {
            e: dx,
            f: dy,
            ..Self::IDENTITY
        }
    }

    /// Clockwise quarter-turn rotation of a `width` x `height` box anchored
    /// at the origin, as a viewer applies `/Rotate`. The rotated box is
    /// anchored at the origin again. Angles that are not a multiple of 90
    /// give the identity.
    pub fn rotation(degrees: i64, width: f32, height: f32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Self {
                a: 0.0,
                b: -1.0,
                c: 1.0,
                d: 0.0,
                e: 0.0,
                f: width,
            },
            180 => Self {
                a: -1.0,
                b: 0.0,
                c: 0.0,
                d: -1.0,
                e: width,
                f: height,
            },
            270 => Self {
                a: 0.0,
                b: 1.0,
                c: -1.0,
                d: 0.0,
                e: height,
                f: 0.0,
            },
            _ => Self::IDENTITY,
        }
    }

    /// This transform followed by `next`.
    pub fn then(&self, next: &Affine) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    /// Apply to a point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Content stream operator that installs this transform.
    pub fn to_cm(&self) -> String {
        format!(
            "{} {} {} {} {} {} cm",
            format_number(self.a),
            format_number(self.b),
            format_number(self.c),
            format_number(self.d),
            format_number(self.e),
            format_number(self.f)
        )
    }

    /// Whether this transform changes nothing.
    pub fn is_identity(&self) -> bool {
        let close = |x: f32, y: f32| (x - y).abs() < f32::EPSILON;
        close(self.a, 1.0)
            && close(self.b, 0.0)
            && close(self.c, 0.0)
            && close(self.d, 1.0)
            && self.e == 0.0
            && self.f == 0.0
    }
}

/// Format a number for a content stream without exponent notation.
pub(crate) fn format_number(value: f32) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Standard paper sizes available to the pre-merge resize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageSize {
    /// Every size in the catalogue.
    pub const ALL: [PageSize; 6] = [
        PageSize::A4,
        PageSize::A3,
        PageSize::A5,
        PageSize::Letter,
        PageSize::Legal,
        PageSize::Tabloid,
    ];

    /// Portrait dimensions `(width, height)` in points.
    pub fn dimensions(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.0, 842.0),      // 210 x 297 mm
            PageSize::A3 => (842.0, 1191.0),     // 297 x 420 mm
            PageSize::A5 => (420.0, 595.0),      // 148 x 210 mm
            PageSize::Letter => (612.0, 792.0),  // 8.5 x 11 in
            PageSize::Legal => (612.0, 1008.0),  // 8.5 x 14 in
            PageSize::Tabloid => (792.0, 1224.0), // 11 x 17 in
        }
    }

    /// Display name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::A3 => "A3",
            PageSize::A5 => "A5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
            PageSize::Tabloid => "Tabloid",
        }
    }

    /// Parse an optional resize token; `none` and the empty string mean no resize.
    pub fn parse_option(token: &str) -> Result<Option<PageSize>> {
        let token = token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        token.parse().map(Some)
    }
}

impl FromStr for PageSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        PageSize::ALL
            .iter()
            .copied()
            .find(|size| size.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("Unsupported page size: {}", s)))
    }
}

impl std::fmt::Display for PageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
