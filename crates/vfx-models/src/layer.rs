//! Ordered layer list: media clips with transitions placed between them.

use crate::error::{ModelError, ModelResult};
use crate::segment::MediaSegment;
use crate::transition::TransitionDescriptor;

/// One entry of a render request.
#[derive(Debug, Clone)]
pub enum Layer {
    Media(MediaSegment),
    Transition(TransitionDescriptor),
}

impl Layer {
    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Media(_) => "media",
            Layer::Transition(_) => "transition",
        }
    }
}

/// A transition bound to the cut between segment `boundary` and `boundary + 1`.
#[derive(Debug, Clone)]
pub struct PlacedTransition {
    pub descriptor: TransitionDescriptor,
    pub boundary: usize,
}

impl PlacedTransition {
    /// Place transition `i` on boundary `i`.
    pub fn sequential(transitions: Vec<TransitionDescriptor>) -> Vec<Self> {
        transitions
            .into_iter()
            .enumerate()
            .map(|(boundary, descriptor)| Self {
                descriptor,
                boundary,
            })
            .collect()
    }
}

/// Segments and placed transitions split out of a layer list.
#[derive(Debug, Clone, Default)]
pub struct LayerPlan {
    pub segments: Vec<MediaSegment>,
    pub transitions: Vec<PlacedTransition>,
}

impl LayerPlan {
    /// Split a layer list.
    ///
    /// Each transition sits on the boundary between the media layer before it
    /// and the media layer after it. Leading or trailing transitions, and two
    /// transitions on the same boundary, are rejected.
    pub fn from_layers(layers: Vec<Layer>) -> ModelResult<Self> {
        let mut plan = LayerPlan::default();
        let mut pending: Option<(usize, TransitionDescriptor)> = None;

        for (position, layer) in layers.into_iter().enumerate() {
            match layer {
                Layer::Media(segment) => {
                    if let Some((_, descriptor)) = pending.take() {
                        plan.transitions.push(PlacedTransition {
                            descriptor,
                            boundary: plan.segments.len() - 1,
                        });
                    }
                    plan.segments.push(segment);
                }
                Layer::Transition(descriptor) => {
                    if plan.segments.is_empty() {
                        return Err(ModelError::validation(format!(
                            "transition '{}' at layer {position} has no media before it",
                            descriptor.name
                        )));
                    }
                    if let Some((first, existing)) = &pending {
                        return Err(ModelError::validation(format!(
                            "transitions '{}' (layer {first}) and '{}' (layer {position}) share one boundary",
                            existing.name, descriptor.name
                        )));
                    }
                    pending = Some((position, descriptor));
                }
            }
        }

        if let Some((position, descriptor)) = pending {
            return Err(ModelError::validation(format!(
                "transition '{}' at layer {position} has no media after it",
                descriptor.name
            )));
        }

        Ok(plan)
    }
}
