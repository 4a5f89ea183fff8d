//! Per-stream producer state: epoch fencing, duplicate detection, and
//! sequence-gap rejection for the idempotent-producer subsystem.

use durable_streams_common::offset::Offset;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ProducerState {
    epoch: u64,
    /// Highest seq acknowledged under the current epoch, if any.
    highest_acked_seq: Option<u64>,
    /// Offset assigned to the record at `highest_acked_seq`, so a
    /// duplicate retransmission can be answered with the real offset.
    last_acked_offset: Option<Offset>,
}

/// Outcome of checking an incoming `(epoch, seq)` pair against a
/// producer's recorded state.
pub enum Decision {
    /// Commit the record; `ack` must be called with the assigned offset.
    Commit,
    /// Already committed under this seq; return `offset` without a new append.
    Duplicate { offset: Option<Offset> },
    /// `epoch` is older than the producer's current epoch.
    StaleEpoch { server_epoch: u64 },
    /// `seq` skips ahead of `highest_acked_seq + 1`.
    SequenceGap { expected: u64 },
}

#[derive(Debug, Default)]
pub struct ProducerTable {
    producers: HashMap<String, ProducerState>,
}

impl ProducerTable {
    pub fn new() -> Self {
        Self {
            producers: HashMap::new(),
        }
    }

    /// Evaluate an incoming append against the producer's recorded
    /// state, without mutating it. Call [`ack`](Self::ack) after a
    /// successful commit.
    pub fn evaluate(&self, producer_id: &str, epoch: u64, seq: u64) -> Decision {
        let Some(state) = self.producers.get(producer_id) else {
            return if seq == 0 {
                Decision::Commit
            } else {
                Decision::SequenceGap { expected: 0 }
            };
        };

        if epoch < state.epoch {
            return Decision::StaleEpoch {
                server_epoch: state.epoch,
            };
        }

        if epoch > state.epoch {
            // New incarnation: the caller is expected to have reset seq to 0.
            return if seq == 0 {
                Decision::Commit
            } else {
                Decision::SequenceGap { expected: 0 }
            };
        }

        match state.highest_acked_seq {
            None => {
                if seq == 0 {
                    Decision::Commit
                } else {
                    Decision::SequenceGap { expected: 0 }
                }
            }
            Some(highest) => {
                if seq <= highest {
                    Decision::Duplicate {
                        offset: state.last_acked_offset,
                    }
                } else if seq == highest + 1 {
                    Decision::Commit
                } else {
                    Decision::SequenceGap {
                        expected: highest + 1,
                    }
                }
            }
        }
    }

    /// Record a successful commit.
    pub fn ack(&mut self, producer_id: &str, epoch: u64, seq: u64, offset: Offset) {
        let state = self
            .producers
            .entry(producer_id.to_string())
            .or_insert_with(|| ProducerState {
                epoch,
                highest_acked_seq: None,
                last_acked_offset: None,
            });

        if epoch > state.epoch {
            state.epoch = epoch;
            state.highest_acked_seq = None;
        }

        state.highest_acked_seq = Some(seq);
        state.last_acked_offset = Some(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_append_for_new_producer_requires_seq_zero() {
        let table = ProducerTable::new();
        assert!(matches!(table.evaluate("p1", 0, 0), Decision::Commit));
        assert!(matches!(
            table.evaluate("p1", 0, 1),
            Decision::SequenceGap { expected: 0 }
        ));
    }

    #[test]
    fn duplicate_seq_returns_known_offset() {
        let mut table = ProducerTable::new();
        let offset = Offset::new(1, 0);
        table.ack("p1", 0, 0, offset);
        match table.evaluate("p1", 0, 0) {
            Decision::Duplicate { offset: Some(o) } => assert_eq!(o, offset),
            _ => panic!("expected duplicate with known offset"),
        }
    }

    #[test]
    fn gap_is_rejected_without_mutating_state() {
        let mut table = ProducerTable::new();
        table.ack("p1", 0, 0, Offset::new(1, 0));
        assert!(matches!(
            table.evaluate("p1", 0, 2),
            Decision::SequenceGap { expected: 1 }
        ));
    }

    #[test]
    fn older_epoch_is_fenced() {
        let mut table = ProducerTable::new();
        table.ack("p1", 3, 0, Offset::new(1, 0));
        assert!(matches!(
            table.evaluate("p1", 1, 0),
            Decision::StaleEpoch { server_epoch: 3 }
        ));
    }

    #[test]
    fn newer_epoch_resets_sequence() {
        let mut table = ProducerTable::new();
        table.ack("p1", 0, 5, Offset::new(1, 0));
        assert!(matches!(table.evaluate("p1", 1, 0), Decision::Commit));
    }
}
