//! Groups segments by node into bounded `batchprep` batches.

use crate::chunker::ActuationSegment;
use crate::config::ExecutionLimits;
use crate::model::NodeUid;

#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionBatch {
    pub node: NodeUid,
    pub entries: Vec<ActuationSegment>,
    /// 1-based position among this node's batches.
    pub index_for_node: usize,
    pub batches_for_node: usize,
}

impl TransmissionBatch {
    /// `(pin, duration)` pairs as sent on the wire.
    pub fn pairs(&self) -> Vec<(u8, u64)> {
        self.entries.iter().map(|s| (s.pin, s.duration_ms)).collect()
    }

    /// All pins of a batch fire together; the batch lasts as long as its longest pulse.
    pub fn max_duration_ms(&self) -> u64 {
        self.entries.iter().map(|s| s.duration_ms).max().unwrap_or(0)
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(ActuationSegment::label).collect()
    }

    /// Pins that appear more than once, in first-repeat order. Nodes fire all
    /// pairs of a batch at once, so a repeated pin runs once, not back to back.
    pub fn repeated_pins(&self) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut repeated = Vec::new();
        for s in &self.entries {
            if seen.contains(&s.pin) {
                if !repeated.contains(&s.pin) {
                    repeated.push(s.pin);
                }
            } else {
                seen.push(s.pin);
            }
        }
        repeated
    }
}

/// Group by node (in order of first appearance), then split each node's
/// segments into consecutive batches of at most `max_batch_size`.
pub fn group_by_node(segments: &[ActuationSegment], limits: &ExecutionLimits) -> Vec<TransmissionBatch> {
    let mut by_node: Vec<(NodeUid, Vec<ActuationSegment>)> = Vec::new();
    for seg in segments {
        match by_node.iter_mut().find(|(node, _)| *node == seg.node) {
            Some((_, list)) => list.push(seg.clone()),
            None => by_node.push((seg.node, vec![seg.clone()])),
        }
    }

    let size = limits.batch_ceiling();
    let mut batches = Vec::new();
    for (node, list) in by_node {
        let count = list.len().div_ceil(size);
        batches.extend(list.chunks(size).enumerate().map(|(i, entries)| TransmissionBatch {
            node,
            entries: entries.to_vec(),
            index_for_node: i + 1,
            batches_for_node: count,
        }));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PumpKind;
    use crate::plan::IngredientRef;

    fn seg(node: u32, pin: u8, ms: u64) -> ActuationSegment {
        ActuationSegment {
            ingredient: IngredientRef {
                id: u64::from(pin),
                name: format!("i{pin}"),
            },
            node: NodeUid(node),
            pin,
            pump: PumpKind::Small,
            duration_ms: ms,
            grams: 0.0,
            segment_index: 1,
            total_segments: 1,
        }
    }

    #[test]
    fn seventy_segments_make_two_batches() {
        let segs: Vec<_> = (0..70).map(|i| seg(1, i, 100)).collect();
        let batches = group_by_node(&segs, &ExecutionLimits::default());
        let sizes: Vec<_> = batches.iter().map(|b| b.entries.len()).collect();
        assert_eq!(sizes, vec![64, 6]);
        assert_eq!(batches[1].index_for_node, 2);
        assert_eq!(batches[1].batches_for_node, 2);
    }

    #[test]
    fn nodes_keep_first_appearance_order() {
        let segs = vec![seg(9, 1, 10), seg(3, 2, 30), seg(9, 3, 20)];
        let batches = group_by_node(&segs, &ExecutionLimits::default());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].node, NodeUid(9));
        assert_eq!(batches[0].pairs(), vec![(1, 10), (3, 20)]);
        assert_eq!(batches[0].max_duration_ms(), 20);
        assert_eq!(batches[1].node, NodeUid(3));
    }

    #[test]
    fn split_pulse_repeats_its_pin_within_one_batch() {
        let segs = vec![seg(1, 22, 60_000), seg(1, 22, 60_000), seg(1, 22, 5_000), seg(1, 23, 10)];
        let batches = group_by_node(&segs, &ExecutionLimits::default());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].repeated_pins(), vec![22]);
        assert!(group_by_node(&[seg(1, 22, 10), seg(1, 23, 10)], &ExecutionLimits::default())[0]
            .repeated_pins()
            .is_empty());
    }

    #[test]
    fn empty_input_gives_no_batches() {
        assert!(group_by_node(&[], &ExecutionLimits::default()).is_empty());
    }
}
