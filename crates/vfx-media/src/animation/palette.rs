//! Transition recoloring.
//!
//! Colors are located by JSON pointer (RFC 6901) to the object that carries
//! them: a solid layer (`sc`), a fill or stroke item (`c.k`), an effect
//! control (`v.k`) or one keyframe of an animated color (`s`). Replacement
//! keeps the document's channel scale: values all at or below 1 stay unit
//! floats, otherwise 0–255.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{MediaError, MediaResult};

use super::lottie::parse_hex_color;

/// An 8-bit RGB color with unit alpha.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub fn from_hex(hex: &str) -> MediaResult<Self> {
        let [r, g, b] = parse_hex_color(hex).ok_or_else(|| MediaError::validation(format!("invalid color '{hex}'")))?;
        Ok(Self {
            r: (r * 255.0).round() as u8,
            g: (g * 255.0).round() as u8,
            b: (b * 255.0).round() as u8,
            a: 1.0,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Read `[r, g, b, a?]` in either channel scale.
    fn from_channels(values: &[f64]) -> Option<Self> {
        if values.len() < 3 {
            return None;
        }
        let unit = is_unit_scale(values);
        let channel = |v: f64| {
            let scaled = if unit { v * 255.0 } else { v };
            scaled.round().clamp(0.0, 255.0) as u8
        };
        Some(Self {
            r: channel(values[0]),
            g: channel(values[1]),
            b: channel(values[2]),
            a: values.get(3).copied().unwrap_or(1.0),
        })
    }

    fn to_channels(&self, unit: bool, alpha: f64) -> Value {
        if unit {
            json!([self.r as f64 / 255.0, self.g as f64 / 255.0, self.b as f64 / 255.0, alpha])
        } else {
            json!([self.r, self.g, self.b, alpha])
        }
    }
}

/// One distinct color and every place it occurs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaletteEntry {
    pub color: Rgba,
    pub hex: String,
    pub paths: Vec<String>,
}

fn is_unit_scale(values: &[f64]) -> bool {
    values.iter().all(|v| *v <= 1.0)
}

fn numbers(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

struct Collector {
    entries: Vec<PaletteEntry>,
}

impl Collector {
    fn push(&mut self, color: Rgba, path: String) {
        let hex = color.to_hex();
        match self.entries.iter_mut().find(|e| e.hex == hex) {
            Some(entry) => entry.paths.push(path),
            None => self.entries.push(PaletteEntry {
                color,
                hex,
                paths: vec![path],
            }),
        }
    }

    fn layers(&mut self, layers: &Value, pointer: &str) {
        for (i, layer) in layers.as_array().into_iter().flatten().enumerate() {
            let path = format!("{pointer}/{i}");
            if layer.get("ty").and_then(Value::as_i64) == Some(1) {
                if let Some(color) = layer.get("sc").and_then(Value::as_str).and_then(|hex| Rgba::from_hex(hex).ok()) {
                    self.push(color, path.clone());
                }
            }
            if let Some(shapes) = layer.get("shapes") {
                self.shapes(shapes, &format!("{path}/shapes"));
            }
        }
    }

    fn shapes(&mut self, items: &Value, pointer: &str) {
        for (i, item) in items.as_array().into_iter().flatten().enumerate() {
            let path = format!("{pointer}/{i}");
            match item.get("ty").and_then(Value::as_str) {
                Some("gr") => {
                    if let Some(children) = item.get("it") {
                        self.shapes(children, &format!("{path}/it"));
                    }
                }
                Some("fl") | Some("st") => self.animated_color(item, &path),
                _ => {}
            }
        }
    }

    fn animated_color(&mut self, item: &Value, path: &str) {
        let Some(k) = item.get("c").and_then(|c| c.get("k")) else {
            return;
        };
        if let Some(color) = numbers(k).as_deref().and_then(Rgba::from_channels) {
            self.push(color, path.to_string());
            return;
        }
        for (i, keyframe) in k.as_array().into_iter().flatten().enumerate() {
            if let Some(color) = keyframe.get("s").and_then(numbers).as_deref().and_then(Rgba::from_channels) {
                self.push(color, format!("{path}/c/k/{i}"));
            }
        }
    }
}

/// Distinct fill, stroke and solid colors of a document, in first-seen
/// order, with the pointers of every occurrence.
pub fn extract_palette(document: &Value) -> Vec<PaletteEntry> {
    let mut collector = Collector { entries: Vec::new() };

    if let Some(layers) = document.get("layers") {
        collector.layers(layers, "/layers");
    }
    for (i, asset) in document.get("assets").and_then(Value::as_array).into_iter().flatten().enumerate() {
        if let Some(layers) = asset.get("layers") {
            collector.layers(layers, &format!("/assets/{i}/layers"));
        }
    }

    collector.entries
}

/// Replace the color at each of `paths` with `hex`.
///
/// Returns the number of targets rewritten.
pub fn replace_color(document: &mut Value, paths: &[String], hex: &str) -> MediaResult<usize> {
    let color = Rgba::from_hex(hex)?;
    let mut replaced = 0;

    for path in paths {
        let target = document
            .pointer_mut(path)
            .ok_or_else(|| MediaError::validation(format!("no color at '{path}'")))?;

        if target.get("ty").and_then(Value::as_i64) == Some(1) {
            target["sc"] = Value::String(color.to_hex());
            replaced += 1;
            continue;
        }

        let slot = if target.pointer("/v/k").is_some() {
            target.pointer_mut("/v/k")
        } else if target.pointer("/c/k").is_some() {
            target.pointer_mut("/c/k")
        } else {
            target.get_mut("s")
        };

        let Some(slot) = slot else {
            return Err(MediaError::validation(format!("no color at '{path}'")));
        };
        let Some(current) = numbers(slot) else {
            return Err(MediaError::validation(format!(
                "color at '{path}' is animated; address its keyframes instead"
            )));
        };

        let alpha = current.get(3).copied().unwrap_or(1.0);
        *slot = color.to_channels(is_unit_scale(&current), alpha);
        replaced += 1;
    }

    Ok(replaced)
}

/// Replace every occurrence of `from` with `to`.
pub fn recolor(document: &mut Value, from: &str, to: &str) -> MediaResult<usize> {
    let from = Rgba::from_hex(from)?.to_hex();
    let paths = extract_palette(document)
        .into_iter()
        .find(|entry| entry.hex == from)
        .map(|entry| entry.paths)
        .unwrap_or_default();
    replace_color(document, &paths, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Value {
        json!({
            "fr": 30, "ip": 0, "op": 30, "w": 100, "h": 100,
            "layers": [
                {"ty": 1, "sc": "#ff0000", "ks": {}},
                {"ty": 4, "ks": {}, "shapes": [
                    {"ty": "gr", "it": [
                        {"ty": "rc"},
                        {"ty": "fl", "c": {"a": 0, "k": [1, 0, 0, 1]}},
                        {"ty": "st", "c": {"a": 0, "k": [0, 0, 255, 255]}}
                    ]}
                ]}
            ],
            "assets": [
                {"id": "comp_0", "layers": [
                    {"ty": 4, "ks": {}, "shapes": [
                        {"ty": "fl", "c": {"a": 1, "k": [
                            {"t": 0, "s": [0, 1, 0, 1]},
                            {"t": 10, "s": [1, 0, 0, 1]}
                        ]}}
                    ]}
                ]}
            ]
        })
    }

    #[test]
    fn test_extract_groups_distinct_colors() {
        let palette = extract_palette(&document());
        let hexes: Vec<&str> = palette.iter().map(|e| e.hex.as_str()).collect();
        assert_eq!(hexes, vec!["#ff0000", "#0000ff", "#00ff00"]);

        let red = &palette[0];
        assert_eq!(
            red.paths,
            vec![
                "/layers/0".to_string(),
                "/layers/1/shapes/0/it/1".to_string(),
                "/assets/0/layers/0/shapes/0/c/k/1".to_string(),
            ]
        );
    }

    #[test]
    fn test_replace_keeps_channel_scale() {
        let mut doc = document();
        let paths = vec![
            "/layers/0".to_string(),
            "/layers/1/shapes/0/it/1".to_string(),
            "/layers/1/shapes/0/it/2".to_string(),
            "/assets/0/layers/0/shapes/0/c/k/0".to_string(),
        ];
        let replaced = replace_color(&mut doc, &paths, "#336699").unwrap();
        assert_eq!(replaced, 4);

        assert_eq!(doc["layers"][0]["sc"], "#336699");
        assert_eq!(doc["layers"][1]["shapes"][0]["it"][1]["c"]["k"], json!([0.2, 0.4, 0.6, 1.0]));
        assert_eq!(doc["layers"][1]["shapes"][0]["it"][2]["c"]["k"], json!([51, 102, 153, 255.0]));
        assert_eq!(
            doc["assets"][0]["layers"][0]["shapes"][0]["c"]["k"][0]["s"],
            json!([0.2, 0.4, 0.6, 1.0])
        );
    }

    #[test]
    fn test_recolor_by_value() {
        let mut doc = document();
        assert_eq!(recolor(&mut doc, "#FF0000", "#ffffff").unwrap(), 3);
        let hexes: Vec<String> = extract_palette(&doc).into_iter().map(|e| e.hex).collect();
        assert!(!hexes.contains(&"#ff0000".to_string()));
        assert!(hexes.contains(&"#ffffff".to_string()));
    }

    #[test]
    fn test_bad_targets() {
        let mut doc = document();
        assert!(replace_color(&mut doc, &["/layers/9".to_string()], "#000000").is_err());
        assert!(replace_color(&mut doc, &["/assets/0/layers/0/shapes/0".to_string()], "#000000").is_err());
        assert!(replace_color(&mut doc, &["/layers/0".to_string()], "red").is_err());
    }
}
