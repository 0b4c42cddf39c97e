//! Typed view of the Lottie document subset the renderer draws.
//!
//! Unknown layer and shape types are skipped rather than rejected so that
//! documents exported with extra features still render their supported parts.

use std::collections::HashMap;

use serde_json::Value;

use super::value::{Animated, BezierShape};
use crate::animation::engine::Marker;
use crate::error::{MediaError, MediaResult};

/// Root composition.
#[derive(Debug, Clone)]
pub struct Composition {
    pub width: f64,
    pub height: f64,
    pub frame_rate: f64,
    pub in_point: f64,
    pub out_point: f64,
    pub layers: Vec<LayerModel>,
    /// Precomposition layers by asset id
    pub precomps: HashMap<String, Vec<LayerModel>>,
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone)]
pub struct LayerModel {
    pub name: String,
    pub index: Option<i64>,
    pub parent: Option<i64>,
    pub in_point: f64,
    pub out_point: f64,
    pub start_time: f64,
    pub stretch: f64,
    pub hidden: bool,
    /// Track-matte source layers are not drawn
    pub is_matte_source: bool,
    pub transform: TransformModel,
    pub content: LayerContent,
}

#[derive(Debug, Clone)]
pub enum LayerContent {
    Shapes(Vec<ShapeItem>),
    Solid { color: [f64; 3], width: f64, height: f64 },
    Precomp { ref_id: String },
    Null,
}

#[derive(Debug, Clone)]
pub enum Position {
    Unified(Animated<Vec<f64>>),
    Split(Animated<f64>, Animated<f64>),
}

#[derive(Debug, Clone)]
pub struct TransformModel {
    pub anchor: Animated<Vec<f64>>,
    pub position: Position,
    pub scale: Animated<Vec<f64>>,
    pub rotation: Animated<f64>,
    pub opacity: Animated<f64>,
}

impl Default for TransformModel {
    fn default() -> Self {
        Self {
            anchor: Animated::Static(vec![0.0, 0.0]),
            position: Position::Unified(Animated::Static(vec![0.0, 0.0])),
            scale: Animated::Static(vec![100.0, 100.0]),
            rotation: Animated::Static(0.0),
            opacity: Animated::Static(100.0),
        }
    }
}

impl TransformModel {
    pub fn parse(ks: Option<&Value>) -> Self {
        let Some(ks) = ks else {
            return Self::default();
        };

        let position = match ks.get("p") {
            Some(p) if p.get("s").and_then(Value::as_bool) == Some(true) => Position::Split(
                Animated::parse_or(p.get("x"), 0.0),
                Animated::parse_or(p.get("y"), 0.0),
            ),
            p => Position::Unified(Animated::parse_or(p, vec![0.0, 0.0])),
        };

        Self {
            anchor: Animated::parse_or(ks.get("a"), vec![0.0, 0.0]),
            position,
            scale: Animated::parse_or(ks.get("s"), vec![100.0, 100.0]),
            rotation: Animated::parse_or(ks.get("r").or_else(|| ks.get("rz")), 0.0),
            opacity: Animated::parse_or(ks.get("o"), 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

#[derive(Debug, Clone)]
pub enum ShapeItem {
    Group {
        items: Vec<ShapeItem>,
        transform: Option<TransformModel>,
    },
    Rect {
        position: Animated<Vec<f64>>,
        size: Animated<Vec<f64>>,
        roundness: Animated<f64>,
    },
    Ellipse {
        position: Animated<Vec<f64>>,
        size: Animated<Vec<f64>>,
    },
    Path(Animated<BezierShape>),
    Fill {
        color: Animated<Vec<f64>>,
        opacity: Animated<f64>,
        even_odd: bool,
    },
    Stroke {
        color: Animated<Vec<f64>>,
        opacity: Animated<f64>,
        width: Animated<f64>,
        cap: LineCap,
        join: LineJoin,
        miter_limit: f64,
    },
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn required(value: &Value, key: &str) -> MediaResult<f64> {
    number(value, key).ok_or_else(|| MediaError::invalid_animation(format!("missing numeric '{key}'")))
}

/// Parse `#rrggbb` into unit RGB.
pub fn parse_hex_color(hex: &str) -> Option<[f64; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok().map(|v| v as f64 / 255.0);
    Some([channel(0)?, channel(2)?, channel(4)?])
}

impl Composition {
    pub fn parse(document: &Value) -> MediaResult<Self> {
        if !document.is_object() {
            return Err(MediaError::invalid_animation("document is not an object"));
        }

        let width = required(document, "w")?;
        let height = required(document, "h")?;
        let frame_rate = required(document, "fr")?;
        let in_point = required(document, "ip")?;
        let out_point = required(document, "op")?;

        let layers = parse_layers(document.get("layers"));

        let mut precomps = HashMap::new();
        for asset in document.get("assets").and_then(Value::as_array).into_iter().flatten() {
            if let (Some(id), Some(_)) = (asset.get("id").and_then(Value::as_str), asset.get("layers")) {
                precomps.insert(id.to_string(), parse_layers(asset.get("layers")));
            }
        }

        let markers = document
            .get("markers")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|m| {
                Some(Marker {
                    name: m.get("cm").and_then(Value::as_str).unwrap_or_default().to_string(),
                    time_frame: number(m, "tm")? - in_point,
                })
            })
            .collect();

        Ok(Self {
            width,
            height,
            frame_rate,
            in_point,
            out_point,
            layers,
            precomps,
            markers,
        })
    }

    /// Whole frames between the in and out points.
    pub fn total_frames(&self) -> u32 {
        (self.out_point - self.in_point).max(0.0).round() as u32
    }
}

fn parse_layers(value: Option<&Value>) -> Vec<LayerModel> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(parse_layer)
        .collect()
}

fn parse_layer(layer: &Value) -> Option<LayerModel> {
    let ty = layer.get("ty").and_then(Value::as_i64)?;
    let content = match ty {
        0 => LayerContent::Precomp {
            ref_id: layer.get("refId").and_then(Value::as_str)?.to_string(),
        },
        1 => LayerContent::Solid {
            color: layer.get("sc").and_then(Value::as_str).and_then(parse_hex_color)?,
            width: number(layer, "sw").unwrap_or(0.0),
            height: number(layer, "sh").unwrap_or(0.0),
        },
        3 => LayerContent::Null,
        4 => LayerContent::Shapes(parse_shapes(layer.get("shapes"))),
        // image, text, audio and camera layers
        _ => return None,
    };

    Some(LayerModel {
        name: layer.get("nm").and_then(Value::as_str).unwrap_or_default().to_string(),
        index: layer.get("ind").and_then(Value::as_i64),
        parent: layer.get("parent").and_then(Value::as_i64),
        in_point: number(layer, "ip").unwrap_or(0.0),
        out_point: number(layer, "op").unwrap_or(f64::MAX),
        start_time: number(layer, "st").unwrap_or(0.0),
        stretch: number(layer, "sr").filter(|sr| *sr > 0.0).unwrap_or(1.0),
        hidden: layer.get("hd").and_then(Value::as_bool).unwrap_or(false),
        is_matte_source: layer.get("td").and_then(Value::as_i64).unwrap_or(0) != 0,
        transform: TransformModel::parse(layer.get("ks")),
        content,
    })
}

fn parse_shapes(value: Option<&Value>) -> Vec<ShapeItem> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| !item.get("hd").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(parse_shape)
        .collect()
}

fn parse_shape(item: &Value) -> Option<ShapeItem> {
    let ty = item.get("ty").and_then(Value::as_str)?;
    let shape = match ty {
        "gr" => {
            let children = item.get("it").and_then(Value::as_array);
            let transform = children
                .into_iter()
                .flatten()
                .find(|child| child.get("ty").and_then(Value::as_str) == Some("tr"))
                .map(|tr| TransformModel::parse(Some(tr)));
            ShapeItem::Group {
                items: parse_shapes(item.get("it")),
                transform,
            }
        }
        "rc" => ShapeItem::Rect {
            position: Animated::parse_or(item.get("p"), vec![0.0, 0.0]),
            size: Animated::parse_or(item.get("s"), vec![0.0, 0.0]),
            roundness: Animated::parse_or(item.get("r"), 0.0),
        },
        "el" => ShapeItem::Ellipse {
            position: Animated::parse_or(item.get("p"), vec![0.0, 0.0]),
            size: Animated::parse_or(item.get("s"), vec![0.0, 0.0]),
        },
        "sh" => ShapeItem::Path(item.get("ks").and_then(Animated::parse)?),
        "fl" => ShapeItem::Fill {
            color: Animated::parse_or(item.get("c"), vec![0.0, 0.0, 0.0]),
            opacity: Animated::parse_or(item.get("o"), 100.0),
            even_odd: item.get("r").and_then(Value::as_i64) == Some(2),
        },
        "st" => ShapeItem::Stroke {
            color: Animated::parse_or(item.get("c"), vec![0.0, 0.0, 0.0]),
            opacity: Animated::parse_or(item.get("o"), 100.0),
            width: Animated::parse_or(item.get("w"), 1.0),
            cap: match item.get("lc").and_then(Value::as_i64) {
                Some(2) => LineCap::Round,
                Some(3) => LineCap::Square,
                _ => LineCap::Butt,
            },
            join: match item.get("lj").and_then(Value::as_i64) {
                Some(2) => LineJoin::Round,
                Some(3) => LineJoin::Bevel,
                _ => LineJoin::Miter,
            },
            miter_limit: number(item, "ml").unwrap_or(4.0),
        },
        // group transforms are read by the parent; trims, repeaters,
        // gradients and merges are not drawn
        _ => return None,
    };
    Some(shape)
}
