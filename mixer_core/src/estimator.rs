//! Projected run time of a chunked plan.

use crate::batcher::group_by_node;
use crate::chunker::ActuationSegment;
use crate::config::ExecutionLimits;
use crate::model::NodeUid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Estimate {
    /// Every segment back to back plus the settle margin per segment.
    pub sequential_ms: u64,
    /// Longest node: sum over its batches of each batch's longest pulse.
    pub parallel_ms: u64,
    pub segment_count: usize,
}

pub fn estimate(segments: &[ActuationSegment], limits: &ExecutionLimits) -> Estimate {
    let total: u64 = segments.iter().map(|s| s.duration_ms).sum();
    let count = u64::try_from(segments.len()).unwrap_or(u64::MAX);
    let sequential_ms = total.saturating_add(limits.sequential_settle_ms.saturating_mul(count));

    let batches = group_by_node(segments, limits);
    let mut per_node: Vec<(NodeUid, u64)> = Vec::new();
    for b in &batches {
        match per_node.iter_mut().find(|(n, _)| *n == b.node) {
            Some((_, ms)) => *ms += b.max_duration_ms(),
            None => per_node.push((b.node, b.max_duration_ms())),
        }
    }
    let parallel_ms = per_node.into_iter().map(|(_, ms)| ms).max().unwrap_or(0);

    Estimate {
        sequential_ms,
        parallel_ms,
        segment_count: segments.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeUid, PumpKind};
    use crate::plan::IngredientRef;

    fn seg(node: u32, pin: u8, ms: u64) -> ActuationSegment {
        ActuationSegment {
            ingredient: IngredientRef {
                id: 1,
                name: "x".into(),
            },
            node: NodeUid(node),
            pin,
            pump: PumpKind::Large,
            duration_ms: ms,
            grams: 0.0,
            segment_index: 1,
            total_segments: 1,
        }
    }

    #[test]
    fn sequential_adds_settle_per_segment() {
        let e = estimate(&[seg(1, 1, 1000), seg(2, 2, 50)], &ExecutionLimits::default());
        assert_eq!(e.sequential_ms, 1450);
        assert_eq!(e.parallel_ms, 1000);
        assert_eq!(e.segment_count, 2);
    }

    #[test]
    fn parallel_sums_batches_of_one_node() {
        let limits = ExecutionLimits {
            max_batch_size: 2,
            ..ExecutionLimits::default()
        };
        // node 1: batches [300, 100] and [200] -> 300 + 200
        let segs = [seg(1, 1, 300), seg(1, 2, 100), seg(1, 3, 200), seg(2, 1, 450)];
        assert_eq!(estimate(&segs, &limits).parallel_ms, 500);
    }

    #[test]
    fn empty_plan_takes_no_time() {
        assert_eq!(estimate(&[], &ExecutionLimits::default()), Estimate::default());
    }
}
