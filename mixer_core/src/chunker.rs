//! Splits pulses longer than the per-command ceiling.

use crate::config::ExecutionLimits;
use crate::model::{NodeUid, PumpKind};
use crate::plan::{ActuationRequest, IngredientRef};

/// One bounded pulse; part `segment_index` of `total_segments` of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuationSegment {
    pub ingredient: IngredientRef,
    pub node: NodeUid,
    pub pin: u8,
    pub pump: PumpKind,
    pub duration_ms: u64,
    /// Share of the request's grams dispensed by this segment.
    pub grams: f64,
    /// 1-based.
    pub segment_index: u32,
    pub total_segments: u32,
}

impl ActuationSegment {
    /// Ingredient name, with `[part i/n]` when the request was split.
    pub fn label(&self) -> String {
        if self.total_segments > 1 {
            format!(
                "{} [part {}/{}]",
                self.ingredient.name, self.segment_index, self.total_segments
            )
        } else {
            self.ingredient.name.clone()
        }
    }
}

/// `ceil(duration / max)` pieces, all `max` except the remainder.
pub fn split_duration(duration_ms: u64, max_segment_ms: u64) -> Vec<u64> {
    let max = max_segment_ms.max(1);
    let mut parts = Vec::with_capacity(usize::try_from(duration_ms.div_ceil(max)).unwrap_or(0));
    let mut left = duration_ms;
    while left > 0 {
        let part = left.min(max);
        parts.push(part);
        left -= part;
    }
    parts
}

#[allow(clippy::cast_precision_loss)]
pub fn chunk_request(request: &ActuationRequest, limits: &ExecutionLimits) -> Vec<ActuationSegment> {
    let parts = split_duration(request.duration_ms, limits.segment_ceiling());
    let total = u32::try_from(parts.len()).unwrap_or(u32::MAX);
    let grams_per_ms = if request.duration_ms == 0 {
        0.0
    } else {
        request.grams / request.duration_ms as f64
    };
    parts
        .into_iter()
        .zip(1..)
        .map(|(duration_ms, segment_index)| ActuationSegment {
            ingredient: request.ingredient.clone(),
            node: request.node,
            pin: request.pin,
            pump: request.pump,
            duration_ms,
            grams: grams_per_ms * duration_ms as f64,
            segment_index,
            total_segments: total,
        })
        .collect()
}

/// Chunk every request, keeping request order.
pub fn chunk(requests: &[ActuationRequest], limits: &ExecutionLimits) -> Vec<ActuationSegment> {
    requests
        .iter()
        .flat_map(|r| chunk_request(r, limits))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(125_000, vec![60_000, 60_000, 5_000])]
    #[case(60_000, vec![60_000])]
    #[case(60_001, vec![60_000, 1])]
    #[case(1, vec![1])]
    #[case(0, vec![])]
    fn splits_at_the_ceiling(#[case] duration: u64, #[case] expected: Vec<u64>) {
        assert_eq!(split_duration(duration, 60_000), expected);
    }

    #[test]
    fn segments_are_tagged_and_labelled() {
        let req = ActuationRequest {
            ingredient: IngredientRef {
                id: 1,
                name: "Musk".into(),
            },
            node: NodeUid(0xa),
            pin: 7,
            duration_ms: 125_000,
            pump: PumpKind::Large,
            grams: 6250.0,
            ms_per_gram: 20.0,
            uses_default_rate: true,
        };
        let segs = chunk_request(&req, &ExecutionLimits::default());
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[2].segment_index, 3);
        assert_eq!(segs[2].total_segments, 3);
        assert_eq!(segs[0].label(), "Musk [part 1/3]");

        let short = ActuationRequest {
            duration_ms: 10,
            ..req
        };
        assert_eq!(chunk_request(&short, &ExecutionLimits::default())[0].label(), "Musk");
    }
}
