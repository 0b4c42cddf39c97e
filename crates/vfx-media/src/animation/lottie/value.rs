//! Animated Lottie properties.
//!
//! A property is either static (`{"a": 0, "k": value}`) or a list of
//! keyframes (`{"a": 1, "k": [{"t": 0, "s": ..., "i": ..., "o": ...}, ...]}`).
//! Keyframes ease with a cubic bezier through `o` (out tangent of the start)
//! and `i` (in tangent of the end), or hold when `h` is 1.

use kurbo::{BezPath, CubicBez, ParamCurve, Point};
use serde_json::Value;

/// A value that can be read from Lottie JSON and interpolated.
pub trait Animatable: Clone + Sized {
    fn from_json(value: &Value) -> Option<Self>;
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Animatable for f64 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::Array(items) => items.first().and_then(Value::as_f64),
            _ => None,
        }
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Animatable for Vec<f64> {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(|v| vec![v]),
            Value::Array(items) => items.iter().map(Value::as_f64).collect(),
            _ => None,
        }
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        self.iter()
            .zip(other.iter().chain(std::iter::repeat(&0.0)))
            .map(|(a, b)| a + (b - a) * t)
            .collect()
    }
}

/// One bezier path: vertices with in/out tangents relative to the vertex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BezierShape {
    pub closed: bool,
    pub vertices: Vec<Point>,
    pub in_tangents: Vec<Point>,
    pub out_tangents: Vec<Point>,
}

impl BezierShape {
    /// Build the kurbo path.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let n = self.vertices.len();
        if n == 0 {
            return path;
        }

        let tangent = |list: &[Point], i: usize| list.get(i).copied().unwrap_or(Point::ZERO);
        path.move_to(self.vertices[0]);

        let segments = if self.closed { n } else { n - 1 };
        for s in 0..segments {
            let from = s;
            let to = (s + 1) % n;
            let p0 = self.vertices[from];
            let p3 = self.vertices[to];
            let out = tangent(&self.out_tangents, from);
            let inn = tangent(&self.in_tangents, to);
            path.curve_to(
                (p0.x + out.x, p0.y + out.y),
                (p3.x + inn.x, p3.y + inn.y),
                (p3.x, p3.y),
            );
        }

        if self.closed {
            path.close_path();
        }
        path
    }
}

fn points(value: Option<&Value>) -> Option<Vec<Point>> {
    value?
        .as_array()?
        .iter()
        .map(|p| {
            let xy = p.as_array()?;
            Some(Point::new(xy.first()?.as_f64()?, xy.get(1)?.as_f64()?))
        })
        .collect()
}

impl Animatable for BezierShape {
    fn from_json(value: &Value) -> Option<Self> {
        // Older exports wrap the shape in a one-element array
        let shape = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };
        let vertices = points(shape.get("v"))?;
        let in_tangents = points(shape.get("i")).unwrap_or_default();
        let out_tangents = points(shape.get("o")).unwrap_or_default();
        Some(Self {
            closed: shape.get("c").and_then(Value::as_bool).unwrap_or(false),
            vertices,
            in_tangents,
            out_tangents,
        })
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        // Mismatched vertex counts cannot be morphed; snap at the midpoint
        if self.vertices.len() != other.vertices.len() {
            return if t < 0.5 { self.clone() } else { other.clone() };
        }
        let mix = |a: &[Point], b: &[Point]| -> Vec<Point> {
            a.iter()
                .zip(b)
                .map(|(p, q)| p.lerp(*q, t))
                .collect()
        };
        Self {
            closed: self.closed,
            vertices: mix(&self.vertices, &other.vertices),
            in_tangents: mix(&self.in_tangents, &other.in_tangents),
            out_tangents: mix(&self.out_tangents, &other.out_tangents),
        }
    }
}

/// One keyframe.
#[derive(Debug, Clone)]
pub struct Keyframe<T> {
    pub time: f64,
    pub start: T,
    /// Explicit end value (older exports); otherwise the next keyframe's start
    pub end: Option<T>,
    pub hold: bool,
    /// Out tangent of the start value
    pub ease_out: Point,
    /// In tangent of the end value
    pub ease_in: Point,
}

/// A static or keyframed property.
#[derive(Debug, Clone)]
pub enum Animated<T> {
    Static(T),
    Keyframes(Vec<Keyframe<T>>),
}

fn tangent(value: Option<&Value>, fallback: Point) -> Point {
    let Some(value) = value else {
        return fallback;
    };
    let x = value.get("x").and_then(f64::from_json);
    let y = value.get("y").and_then(f64::from_json);
    match (x, y) {
        (Some(x), Some(y)) => Point::new(x, y),
        _ => fallback,
    }
}

impl<T: Animatable> Animated<T> {
    /// Parse a property object, or `None` if it is malformed.
    pub fn parse(property: &Value) -> Option<Self> {
        let k = property.get("k")?;
        let animated = property.get("a").and_then(Value::as_i64).unwrap_or(0) == 1;

        if !animated {
            return T::from_json(k).map(Animated::Static);
        }

        let frames = k.as_array()?;
        let mut keyframes = Vec::with_capacity(frames.len());
        let mut last_end: Option<T> = None;

        for frame in frames {
            let time = frame.get("t").and_then(Value::as_f64)?;
            let end = frame.get("e").and_then(T::from_json);
            let start = match frame.get("s").and_then(T::from_json) {
                Some(start) => start,
                // Trailing keyframe of older exports carries only a time
                None => last_end.clone()?,
            };
            last_end = end.clone().or_else(|| Some(start.clone()));

            keyframes.push(Keyframe {
                time,
                start,
                end,
                hold: frame.get("h").and_then(Value::as_i64).unwrap_or(0) == 1,
                ease_out: tangent(frame.get("o"), Point::new(0.0, 0.0)),
                ease_in: tangent(frame.get("i"), Point::new(1.0, 1.0)),
            });
        }

        match keyframes.len() {
            0 => None,
            1 => keyframes.pop().map(|k| Animated::Static(k.start)),
            _ => Some(Animated::Keyframes(keyframes)),
        }
    }

    /// Parse an optional property, falling back to a static default.
    pub fn parse_or(property: Option<&Value>, default: T) -> Self {
        property
            .and_then(Self::parse)
            .unwrap_or(Animated::Static(default))
    }

    /// Value at `frame` (layer-local time).
    pub fn value_at(&self, frame: f64) -> T {
        let keyframes = match self {
            Animated::Static(value) => return value.clone(),
            Animated::Keyframes(keyframes) => keyframes,
        };

        let first = &keyframes[0];
        if frame <= first.time {
            return first.start.clone();
        }

        for pair in keyframes.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            if frame >= next.time {
                continue;
            }
            if current.hold || next.time <= current.time {
                return current.start.clone();
            }
            let end = current.end.as_ref().unwrap_or(&next.start);
            let progress = (frame - current.time) / (next.time - current.time);
            let eased = ease(current.ease_out, current.ease_in, progress);
            return current.start.lerp(end, eased);
        }

        let last = &keyframes[keyframes.len() - 1];
        last.start.clone()
    }
}

/// Cubic-bezier easing through (0,0), `p1`, `p2`, (1,1), evaluated at `x`.
pub fn ease(p1: Point, p2: Point, x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    let curve = CubicBez::new(Point::ZERO, p1, p2, Point::new(1.0, 1.0));

    // x(t) is monotonic for control x in [0, 1]; bisect for t
    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..40 {
        let mid = (lo + hi) / 2.0;
        if curve.eval(mid).x < x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    curve.eval((lo + hi) / 2.0).y
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_values() {
        let scalar: Animated<f64> = Animated::parse(&json!({"a": 0, "k": 50})).unwrap();
        assert_eq!(scalar.value_at(10.0), 50.0);

        let vector: Animated<Vec<f64>> = Animated::parse(&json!({"a": 0, "k": [1, 2, 3]})).unwrap();
        assert_eq!(vector.value_at(0.0), vec![1.0, 2.0, 3.0]);
        assert!(matches!(vector, Animated::Static(_)));
    }

    #[test]
    fn test_linear_keyframes() {
        let prop: Animated<f64> = Animated::parse(&json!({
            "a": 1,
            "k": [
                {"t": 0, "s": [0], "o": {"x": [0], "y": [0]}, "i": {"x": [1], "y": [1]}},
                {"t": 10, "s": [100]}
            ]
        }))
        .unwrap();

        assert_eq!(prop.value_at(-5.0), 0.0);
        assert!((prop.value_at(5.0) - 50.0).abs() < 1e-6);
        assert_eq!(prop.value_at(10.0), 100.0);
        assert_eq!(prop.value_at(20.0), 100.0);
    }

    #[test]
    fn test_hold_keyframe() {
        let prop: Animated<f64> = Animated::parse(&json!({
            "a": 1,
            "k": [{"t": 0, "s": [0], "h": 1}, {"t": 10, "s": [100]}]
        }))
        .unwrap();
        assert_eq!(prop.value_at(9.9), 0.0);
        assert_eq!(prop.value_at(10.0), 100.0);
    }

    #[test]
    fn test_legacy_start_end_keyframes() {
        let prop: Animated<Vec<f64>> = Animated::parse(&json!({
            "a": 1,
            "k": [
                {"t": 0, "s": [0, 0], "e": [10, 20], "o": {"x": 0, "y": 0}, "i": {"x": 1, "y": 1}},
                {"t": 4}
            ]
        }))
        .unwrap();
        let mid = prop.value_at(2.0);
        assert!((mid[0] - 5.0).abs() < 1e-6);
        assert!((mid[1] - 10.0).abs() < 1e-6);
        assert_eq!(prop.value_at(4.0), vec![10.0, 20.0]);
    }

    #[test]
    fn test_ease_curve() {
        let linear = ease(Point::new(0.0, 0.0), Point::new(1.0, 1.0), 0.25);
        assert!((linear - 0.25).abs() < 1e-6);

        let ease_in = ease(Point::new(0.42, 0.0), Point::new(1.0, 1.0), 0.5);
        assert!(ease_in < 0.5);
        assert_eq!(ease(Point::new(0.42, 0.0), Point::new(0.58, 1.0), 1.0), 1.0);
    }

    #[test]
    fn test_bezier_shape_path() {
        let shape = BezierShape::from_json(&json!({
            "c": true,
            "v": [[0, 0], [10, 0], [10, 10]],
            "i": [[0, 0], [0, 0], [0, 0]],
            "o": [[0, 0], [0, 0], [0, 0]]
        }))
        .unwrap();
        let path = shape.to_path();
        // move + 3 curves + close
        assert_eq!(path.elements().len(), 5);
    }

    #[test]
    fn test_malformed_property() {
        assert!(Animated::<f64>::parse(&json!({"a": 0})).is_none());
        assert!(Animated::<f64>::parse(&json!({"a": 1, "k": []})).is_none());
        let fallback = Animated::parse_or(None, 100.0);
        assert_eq!(fallback.value_at(0.0), 100.0);
    }
}
