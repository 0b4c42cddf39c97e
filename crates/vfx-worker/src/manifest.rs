//! Render manifests for the command line tool.
//!
//! A manifest is a JSON file naming the clips and transitions of one render.
//! Relative paths resolve against the manifest's own directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use vfx_media::recolor;
use vfx_models::{round_even, AspectPreset, MediaSegment, PlacedTransition, TransitionDescriptor};

use crate::coordinator::RenderRequest;
use crate::error::{RenderError, RenderResult};

/// One render job on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderManifest {
    /// Clips in playback order
    pub clips: Vec<ClipEntry>,

    /// Transitions burned in at clip boundaries
    #[serde(default)]
    pub transitions: Vec<TransitionEntry>,

    /// Output size preset, used when no explicit size is given
    #[serde(default)]
    pub aspect: Option<AspectPreset>,

    /// Explicit output width; requires `height`
    #[serde(default)]
    pub width: Option<u32>,

    /// Explicit output height; requires `width`
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipEntry {
    pub path: PathBuf,

    /// Keep only `[start, end)` seconds of the source
    #[serde(default)]
    pub trim: Option<TrimSpec>,

    /// MIME type; guessed from the extension when absent
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimSpec {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionEntry {
    /// Lottie JSON document
    pub path: PathBuf,

    /// Cut between clip `boundary` and `boundary + 1`; defaults to the
    /// transition's position in the list
    #[serde(default)]
    pub boundary: Option<usize>,

    /// Color replacements applied before rendering
    #[serde(default)]
    pub recolor: Vec<RecolorRule>,
}

/// Replace every fill or stroke of color `from` with `to` (`#rrggbb`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecolorRule {
    pub from: String,
    pub to: String,
}

impl RenderManifest {
    /// Read and parse a manifest file.
    pub async fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let bytes = read_file(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| RenderError::decode(path.display().to_string(), e.to_string()))
    }

    /// Output size: explicit dimensions rounded down to even, else the
    /// aspect preset, else vertical.
    pub fn output_size(&self) -> RenderResult<(u32, u32)> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => {
                let size = (round_even(width), round_even(height));
                if size != (width, height) {
                    debug!(width, height, rounded = ?size, "Rounded output size to even dimensions");
                }
                Ok(size)
            }
            (None, None) => Ok(self.aspect.unwrap_or_default().dimensions()),
            _ => Err(RenderError::validation("manifest must set both width and height, or neither")),
        }
    }

    /// Load every referenced file and build the render request.
    pub async fn load_request(&self, base_dir: &Path) -> RenderResult<RenderRequest> {
        let (width, height) = self.output_size()?;

        let mut segments = Vec::with_capacity(self.clips.len());
        for clip in &self.clips {
            let path = base_dir.join(&clip.path);
            let bytes = read_file(&path).await?;
            let mime_type = clip
                .mime_type
                .clone()
                .unwrap_or_else(|| guess_mime_type(&path).to_string());

            let mut segment = MediaSegment::new(display_name(&path), Arc::<[u8]>::from(bytes), mime_type);
            if let Some(trim) = clip.trim {
                segment = segment.with_trim(trim.start, trim.end);
            }
            segments.push(segment);
        }

        let mut transitions = Vec::with_capacity(self.transitions.len());
        for (position, entry) in self.transitions.iter().enumerate() {
            let path = base_dir.join(&entry.path);
            let descriptor = load_transition(&path, &entry.recolor).await?;
            transitions.push(PlacedTransition {
                descriptor,
                boundary: entry.boundary.unwrap_or(position),
            });
        }

        info!(
            clips = segments.len(),
            transitions = transitions.len(),
            width,
            height,
            "Manifest loaded"
        );
        Ok(RenderRequest::new(segments, transitions, width, height))
    }

    /// JSON schema of the manifest format.
    pub fn schema() -> Value {
        serde_json::to_value(schemars::schema_for!(RenderManifest)).unwrap_or(Value::Null)
    }
}

/// Read a Lottie document, apply recolor rules and build its descriptor.
pub async fn load_transition(path: &Path, rules: &[RecolorRule]) -> RenderResult<TransitionDescriptor> {
    let subject = path.display().to_string();
    let bytes = read_file(path).await?;
    let mut document: Value =
        serde_json::from_slice(&bytes).map_err(|e| RenderError::decode(&subject, e.to_string()))?;

    for rule in rules {
        let replaced = recolor(&mut document, &rule.from, &rule.to)?;
        if replaced == 0 {
            return Err(RenderError::validation(format!(
                "{subject}: no fill or stroke uses color {}",
                rule.from
            )));
        }
        debug!(transition = %subject, from = %rule.from, to = %rule.to, replaced, "Recolored transition");
    }

    Ok(TransitionDescriptor::from_document(display_name(path), document)?)
}

async fn read_file(path: &Path) -> RenderResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| RenderError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpg" | "mpeg" => "video/mpeg",
        _ => "video/mp4",
    }
}
