//! Dual-threshold decision rule for probability channels.
//!
//! A region is accepted only if it contains at least one pixel at or above the
//! `top` threshold, while its extent is drawn at the looser `bottom` threshold.
//! Accepted regions are then gated by the per-class minimum area.

use ndarray::{Array3, ArrayView2, ArrayView3, Axis};

use super::components::{ComponentFilter, ComponentLabels, MaskDecision};
use crate::core::config::{ClassDecisions, DecisionMode, DecisionParameters};
use crate::core::{SegError, SegResult};

/// Applies [`DecisionParameters`] to single probability channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdDecider {
    params: DecisionParameters,
}

impl ThresholdDecider {
    /// Creates a decider for one class.
    pub fn new(params: DecisionParameters) -> Self {
        Self { params }
    }

    /// The parameters this decider applies.
    pub fn params(&self) -> &DecisionParameters {
        &self.params
    }

    /// Decides one `(height, width)` channel.
    ///
    /// Returns the binary mask and the number of components that survived.
    /// NaN probabilities never meet any threshold.
    pub fn decide(&self, channel: ArrayView2<'_, f32>) -> MaskDecision {
        match self.params.mode {
            DecisionMode::Hysteresis => self.hysteresis(channel),
            DecisionMode::PostProcess { threshold } => self.post_process(channel, threshold),
        }
    }

    fn hysteresis(&self, channel: ArrayView2<'_, f32>) -> MaskDecision {
        let DecisionParameters {
            top,
            bottom,
            min_area,
            ..
        } = self.params;

        let permissive = channel.mapv(|p| u8::from(p >= bottom));
        let labels = ComponentLabels::label(permissive.view());

        let mut seeded = vec![false; labels.slots()];
        for ((y, x), &p) in channel.indexed_iter() {
            if p >= top {
                let label = labels.at(y, x);
                if label != 0 {
                    seeded[label as usize] = true;
                }
            }
        }

        // Seeded components are exactly the components of the working mask, so
        // the area gate reuses the same labelling.
        labels.render(|label| seeded[label as usize] && labels.area(label) >= min_area)
    }

    fn post_process(&self, channel: ArrayView2<'_, f32>, threshold: f32) -> MaskDecision {
        let mask = channel.mapv(|p| u8::from(p >= threshold));
        ComponentFilter::new(self.params.min_area).apply(mask.view())
    }
}

/// Decides every channel of a probability map with its class parameters.
///
/// Returns the decided masks stacked as `(classes, height, width)` and the
/// retained component count of each channel.
///
/// # Errors
///
/// Returns a shape error if the number of channels differs from the number of
/// classes in `decisions`.
pub fn decide_channels(
    map: ArrayView3<'_, f32>,
    decisions: &ClassDecisions,
) -> SegResult<(Array3<u8>, Vec<usize>)> {
    let (channels, height, width) = map.dim();
    if channels != decisions.len() {
        return Err(SegError::shape(
            "decision channels",
            [decisions.len(), height, width],
            [channels, height, width],
        ));
    }

    let mut masks = Array3::<u8>::zeros((channels, height, width));
    let mut components = Vec::with_capacity(channels);
    for (ch, (params, mut out)) in decisions
        .iter()
        .zip(masks.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let decision = ThresholdDecider::new(*params).decide(map.index_axis(Axis(0), ch));
        out.assign(&decision.mask);
        components.push(decision.components);
    }
    Ok((masks, components))
}
