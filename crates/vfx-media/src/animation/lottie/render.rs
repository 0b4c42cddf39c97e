//! Software rendering of a parsed composition.

use kurbo::{Affine, BezPath, Ellipse, PathEl, Rect, RoundedRect, Shape};
use resvg::tiny_skia::{self, FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};
use vfx_models::fit_rect;

use super::model::{
    Composition, LayerContent, LayerModel, LineCap, LineJoin, Position, ShapeItem, TransformModel,
};
use crate::error::{MediaError, MediaResult};

/// Precomp nesting limit; deeper references are treated as cycles.
const MAX_PRECOMP_DEPTH: usize = 16;
const CURVE_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
enum Style {
    Fill { even_odd: bool },
    Stroke { width: f64, cap: LineCap, join: LineJoin, miter_limit: f64 },
}

/// One paint operation in device space.
#[derive(Debug, Clone)]
struct DrawOp {
    path: BezPath,
    color: [f64; 3],
    alpha: f64,
    style: Style,
}

/// Render `frame` (relative to the in point) into a transparent
/// `width × height` pixmap with the composition fitted and centered.
pub fn render_frame(comp: &Composition, frame: f64, width: u32, height: u32) -> MediaResult<Pixmap> {
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| MediaError::internal(format!("failed to allocate {width}x{height} pixmap")))?;

    let fit = fit_rect(comp.width, comp.height, width as f64, height as f64);
    let root = Affine::translate((fit.x, fit.y)) * Affine::scale(fit.scale);

    let mut ops = Vec::new();
    collect_layers(comp, &comp.layers, comp.in_point + frame, root, 1.0, 0, &mut ops);

    // ops are collected top-first
    for op in ops.iter().rev() {
        paint(&mut pixmap, op);
    }
    Ok(pixmap)
}

fn local_time(layer: &LayerModel, frame: f64) -> f64 {
    (frame - layer.start_time) / layer.stretch
}

fn vec2(values: &[f64], default: f64) -> (f64, f64) {
    (
        values.first().copied().unwrap_or(default),
        values.get(1).copied().unwrap_or(default),
    )
}

/// `T · R · S · (−A)` at local time `t`.
fn transform_matrix(transform: &TransformModel, t: f64) -> Affine {
    let (ax, ay) = vec2(&transform.anchor.value_at(t), 0.0);
    let (px, py) = match &transform.position {
        Position::Unified(p) => vec2(&p.value_at(t), 0.0),
        Position::Split(x, y) => (x.value_at(t), y.value_at(t)),
    };
    let (sx, sy) = vec2(&transform.scale.value_at(t), 100.0);
    let rotation = transform.rotation.value_at(t).to_radians();

    Affine::translate((px, py))
        * Affine::rotate(rotation)
        * Affine::scale_non_uniform(sx / 100.0, sy / 100.0)
        * Affine::translate((-ax, -ay))
}

fn layer_matrix(layers: &[LayerModel], layer: &LayerModel, frame: f64, depth: usize) -> Affine {
    let local = transform_matrix(&layer.transform, local_time(layer, frame));
    let parent = layer
        .parent
        .and_then(|ind| layers.iter().find(|l| l.index == Some(ind)));
    match parent {
        Some(parent) if depth < layers.len() => layer_matrix(layers, parent, frame, depth + 1) * local,
        _ => local,
    }
}

fn collect_layers(
    comp: &Composition,
    layers: &[LayerModel],
    frame: f64,
    base: Affine,
    alpha: f64,
    depth: usize,
    ops: &mut Vec<DrawOp>,
) {
    for layer in layers {
        if layer.hidden || layer.is_matte_source {
            continue;
        }
        if frame < layer.in_point || frame >= layer.out_point {
            continue;
        }

        let t = local_time(layer, frame);
        let matrix = base * layer_matrix(layers, layer, frame, 0);
        let opacity = alpha * (layer.transform.opacity.value_at(t) / 100.0).clamp(0.0, 1.0);
        if opacity <= 0.0 {
            continue;
        }

        match &layer.content {
            LayerContent::Shapes(items) => {
                collect_shapes(items, t, matrix, opacity, ops);
            }
            LayerContent::Solid { color, width, height } => {
                let mut path = Rect::new(0.0, 0.0, *width, *height).to_path(CURVE_TOLERANCE);
                path.apply_affine(matrix);
                ops.push(DrawOp {
                    path,
                    color: *color,
                    alpha: opacity,
                    style: Style::Fill { even_odd: false },
                });
            }
            LayerContent::Precomp { ref_id } => {
                if depth >= MAX_PRECOMP_DEPTH {
                    continue;
                }
                if let Some(children) = comp.precomps.get(ref_id) {
                    collect_layers(comp, children, t, matrix, opacity, depth + 1, ops);
                }
            }
            LayerContent::Null => {}
        }
    }
}

/// Collect paint operations of one shape list, returning its geometry in
/// device space so that styles further down the parent list apply to it.
fn collect_shapes(items: &[ShapeItem], t: f64, matrix: Affine, alpha: f64, ops: &mut Vec<DrawOp>) -> Vec<BezPath> {
    let mut geometry: Vec<BezPath> = Vec::new();

    for item in items {
        match item {
            ShapeItem::Group { items, transform } => {
                let (group_matrix, group_alpha) = match transform {
                    Some(tr) => (
                        matrix * transform_matrix(tr, t),
                        alpha * (tr.opacity.value_at(t) / 100.0).clamp(0.0, 1.0),
                    ),
                    None => (matrix, alpha),
                };
                geometry.extend(collect_shapes(items, t, group_matrix, group_alpha, ops));
            }
            ShapeItem::Rect { position, size, roundness } => {
                let (cx, cy) = vec2(&position.value_at(t), 0.0);
                let (w, h) = vec2(&size.value_at(t), 0.0);
                let rect = Rect::from_center_size((cx, cy), (w, h));
                let radius = roundness.value_at(t).min(w.min(h) / 2.0).max(0.0);
                let mut path = if radius > 0.0 {
                    RoundedRect::from_rect(rect, radius).to_path(CURVE_TOLERANCE)
                } else {
                    rect.to_path(CURVE_TOLERANCE)
                };
                path.apply_affine(matrix);
                geometry.push(path);
            }
            ShapeItem::Ellipse { position, size } => {
                let (cx, cy) = vec2(&position.value_at(t), 0.0);
                let (w, h) = vec2(&size.value_at(t), 0.0);
                let mut path = Ellipse::from_rect(Rect::from_center_size((cx, cy), (w, h))).to_path(CURVE_TOLERANCE);
                path.apply_affine(matrix);
                geometry.push(path);
            }
            ShapeItem::Path(shape) => {
                let mut path = shape.value_at(t).to_path();
                path.apply_affine(matrix);
                geometry.push(path);
            }
            ShapeItem::Fill { color, opacity, even_odd } => {
                push_styled(ops, &geometry, color.value_at(t), alpha * opacity.value_at(t) / 100.0, Style::Fill {
                    even_odd: *even_odd,
                });
            }
            ShapeItem::Stroke {
                color,
                opacity,
                width,
                cap,
                join,
                miter_limit,
            } => {
                let scale = matrix.determinant().abs().sqrt();
                push_styled(ops, &geometry, color.value_at(t), alpha * opacity.value_at(t) / 100.0, Style::Stroke {
                    width: width.value_at(t) * scale,
                    cap: *cap,
                    join: *join,
                    miter_limit: *miter_limit,
                });
            }
        }
    }

    geometry
}

fn push_styled(ops: &mut Vec<DrawOp>, geometry: &[BezPath], color: Vec<f64>, alpha: f64, style: Style) {
    if geometry.is_empty() || alpha <= 0.0 {
        return;
    }
    let mut path = BezPath::new();
    for piece in geometry {
        path.extend(piece.elements().iter().copied());
    }
    ops.push(DrawOp {
        path,
        color: unit_rgb(&color),
        alpha: alpha.clamp(0.0, 1.0),
        style,
    });
}

/// Lottie colors are normally 0–1; some exporters write 0–255.
pub fn unit_rgb(color: &[f64]) -> [f64; 3] {
    let rgb = [
        color.first().copied().unwrap_or(0.0),
        color.get(1).copied().unwrap_or(0.0),
        color.get(2).copied().unwrap_or(0.0),
    ];
    let divisor = if rgb.iter().any(|c| *c > 1.0) { 255.0 } else { 1.0 };
    rgb.map(|c| (c / divisor).clamp(0.0, 1.0))
}

fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => builder.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => builder.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

fn paint(pixmap: &mut Pixmap, op: &DrawOp) {
    // Degenerate paths (empty or zero-area) have nothing to draw
    let Some(path) = to_skia_path(&op.path) else {
        return;
    };
    let Some(color) = tiny_skia::Color::from_rgba(
        op.color[0] as f32,
        op.color[1] as f32,
        op.color[2] as f32,
        op.alpha as f32,
    ) else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;

    match op.style {
        Style::Fill { even_odd } => {
            let rule = if even_odd { FillRule::EvenOdd } else { FillRule::Winding };
            pixmap.fill_path(&path, &paint, rule, Transform::identity(), None);
        }
        Style::Stroke {
            width,
            cap,
            join,
            miter_limit,
        } => {
            if width <= 0.0 {
                return;
            }
            let stroke = Stroke {
                width: width as f32,
                miter_limit: miter_limit as f32,
                line_cap: match cap {
                    LineCap::Butt => tiny_skia::LineCap::Butt,
                    LineCap::Round => tiny_skia::LineCap::Round,
                    LineCap::Square => tiny_skia::LineCap::Square,
                },
                line_join: match join {
                    LineJoin::Miter => tiny_skia::LineJoin::Miter,
                    LineJoin::Round => tiny_skia::LineJoin::Round,
                    LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
                },
                dash: None,
            };
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }
}
