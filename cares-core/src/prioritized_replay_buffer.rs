//! Prioritized experience replay.
//!
//! [`PrioritizedReplayBuffer`] stores transitions in a circular buffer and
//! keeps one priority per slot in a [`SumTree`]. It supports uniform,
//! priority-proportional and inverse-priority sampling, priority updates
//! after a training step and sampling of consecutive transition pairs.
mod base;
mod batch;
mod config;
mod statistics;
pub use base::{IwScheduler, PrioritizedReplayBuffer, SumTree};
pub use batch::{ConsecutiveBatch, Transition, TransitionBatch};
pub use config::PrioritizedReplayBufferConfig;
pub use statistics::{Statistics, STATISTICS_EPS};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaresError;

    fn buffer(capacity: usize) -> PrioritizedReplayBuffer {
        let config = PrioritizedReplayBufferConfig::default()
            .capacity(capacity)
            .seed(0);
        PrioritizedReplayBuffer::build(&config).unwrap()
    }

    fn add(buffer: &mut PrioritizedReplayBuffer, i: usize, done: bool) {
        let x = i as f32;
        buffer
            .add(&[x, -x], &[x], x, &[x + 1.0, -x - 1.0], done, &[x * 10.0])
            .unwrap();
    }

    fn err_of<T>(r: anyhow::Result<T>) -> CaresError {
        match r {
            Ok(_) => panic!("expected an error"),
            Err(e) => e.downcast::<CaresError>().unwrap(),
        }
    }

    #[test]
    fn test_circularity() {
        let mut buffer = buffer(5);
        (0..8).for_each(|i| add(&mut buffer, i, false));
        assert_eq!(buffer.len(), 5);

        let batch = buffer.flush().unwrap();
        let mut rewards = batch.reward.clone();
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        // Slots 0..3 were overwritten by transitions 5..8.
        assert_eq!(batch.reward, vec![5.0, 6.0, 7.0, 3.0, 4.0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fields_follow_slots() {
        let mut buffer = buffer(10);
        (0..10).for_each(|i| add(&mut buffer, i, i == 3));
        let batch = buffer.sample_uniform(64).unwrap();
        assert_eq!(batch.len(), 10);
        for k in 0..batch.len() {
            let i = batch.indices[k];
            let tr = batch.transition(k);
            let x = i as f32;
            assert_eq!(tr.state, vec![x, -x]);
            assert_eq!(tr.action, vec![x]);
            assert_eq!(tr.next_state, vec![x + 1.0, -x - 1.0]);
            assert_eq!(tr.extra, vec![x * 10.0]);
            assert_eq!(tr.done, i == 3);
        }
    }

    #[test]
    fn test_arity_and_dimension() {
        let mut buffer = buffer(4);
        add(&mut buffer, 0, false);
        assert_eq!(
            err_of(buffer.add(&[0.0, 0.0], &[0.0], 0.0, &[0.0, 0.0], false, &[])),
            CaresError::ArityMismatch {
                expected: 1,
                got: 0
            }
        );
        assert!(buffer
            .add(&[0.0], &[0.0], 0.0, &[0.0, 0.0], false, &[0.0])
            .is_err());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_empty_buffer() {
        let mut buffer = buffer(4);
        assert_eq!(err_of(buffer.sample_uniform(2)), CaresError::EmptyBuffer);
        assert_eq!(err_of(buffer.sample_priority(2, true)), CaresError::EmptyBuffer);
        assert_eq!(
            err_of(buffer.sample_inverse_priority(2)),
            CaresError::EmptyBuffer
        );
        assert!(buffer.get_statistics().is_err());
    }

    #[test]
    fn test_new_transitions_get_max_priority() {
        let mut buffer = buffer(4);
        add(&mut buffer, 0, false);
        assert_eq!(buffer.priority(0), 1.0);
        buffer.update_priorities(&[0], &[3.0]).unwrap();
        add(&mut buffer, 1, false);
        assert_eq!(buffer.max_priority(), 3.0);
        assert_eq!(buffer.priority(1), 3.0);
    }

    #[test]
    fn test_priority_round_trip() {
        let mut buffer = buffer(8);
        (0..8).for_each(|i| add(&mut buffer, i, false));
        buffer.update_priorities(&[2, 5, 2], &[0.3, 0.7, 0.9]).unwrap();
        assert_eq!(buffer.priority(2), 0.9);
        assert_eq!(buffer.priority(5), 0.7);
        // Max priority never decreases.
        assert_eq!(buffer.max_priority(), 1.0);
        buffer.update_priorities(&[2], &[0.9]).unwrap();
        assert_eq!(buffer.priority(2), 0.9);
    }

    #[test]
    fn test_importance_weights() {
        let mut buffer = buffer(16);
        (0..16).for_each(|i| add(&mut buffer, i, false));
        let ixs = (0..16).collect::<Vec<_>>();
        let ps = (0..16).map(|i| 0.1 + i as f64).collect::<Vec<_>>();
        buffer.update_priorities(&ixs, &ps).unwrap();

        let beta_0 = buffer.beta();
        for stratified in [true, false] {
            let batch = buffer.sample_priority(8, stratified).unwrap();
            let ws = batch.weights.unwrap();
            let w_max = ws.iter().fold(f32::MIN, |m, &w| m.max(w));
            assert!((w_max - 1.0).abs() < 1e-6);
            assert!(ws.iter().all(|&w| w > 0.0 && w <= 1.0 + 1e-6));
        }
        assert!(buffer.beta() > beta_0);
    }

    #[test]
    fn test_inverse_priority() {
        let mut buffer = buffer(4);
        (0..4).for_each(|i| add(&mut buffer, i, false));
        buffer
            .update_priorities(&[0, 1, 2, 3], &[10.0, 1.0, 1.0, 1.0])
            .unwrap();

        let mut counts = [0usize; 4];
        for _ in 0..200 {
            let batch = buffer.sample_inverse_priority(4).unwrap();
            let ws = batch.weights.as_ref().unwrap();
            for (k, &ix) in batch.indices.iter().enumerate() {
                counts[ix] += 1;
                let expected = 10.0 / (buffer.priority(ix) + 1e-6);
                assert!((ws[k] as f64 - expected).abs() < 1e-3);
            }
        }
        assert!(counts[0] < counts[1]);
        assert!(counts[0] < counts[2]);
        assert!(counts[0] < counts[3]);
    }

    #[test]
    fn test_consecutive() {
        let mut buffer = buffer(6);
        (0..6).for_each(|i| add(&mut buffer, i, i == 2));
        let batch = buffer.sample_consecutive(4).unwrap();
        let mut ixs = batch.indices().to_vec();
        ixs.sort();
        // Slot 2 is terminal and slot 5 has no successor yet.
        assert_eq!(ixs, vec![0, 1, 3, 4]);
        for k in 0..4 {
            assert_eq!(batch.next.indices[k], batch.current.indices[k] + 1);
            assert_eq!(
                batch.current.transition(k).next_state,
                batch.next.transition(k).state
            );
        }

        assert_eq!(
            err_of(buffer.sample_consecutive(5)),
            CaresError::InsufficientNonTerminal {
                requested: 5,
                available: 4
            }
        );
    }

    #[test]
    fn test_consecutive_wraps_when_full() {
        let mut buffer = buffer(4);
        // Slots hold transitions 4, 5, 2, 3; the newest is slot 1.
        (0..6).for_each(|i| add(&mut buffer, i, false));
        let batch = buffer.sample_consecutive(3).unwrap();
        let mut ixs = batch.indices().to_vec();
        ixs.sort();
        assert_eq!(ixs, vec![0, 2, 3]);
    }

    #[test]
    fn test_statistics_and_clear() {
        let mut buffer = buffer(4);
        (0..4).for_each(|i| add(&mut buffer, i, false));
        let stats = buffer.get_statistics().unwrap();
        assert!((stats.observation_mean[0] - (1.5 + STATISTICS_EPS)).abs() < 1e-6);
        assert!((stats.delta_mean[0] - (1.0 + STATISTICS_EPS)).abs() < 1e-6);
        assert!((stats.delta_std[1] - STATISTICS_EPS).abs() < 1e-6);

        buffer.update_priorities(&[0], &[5.0]).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.max_priority(), 1.0);
        assert_eq!(buffer.sum_tree().total(), 0.0);
        // A new schema is accepted after clearing.
        buffer.add(&[0.0], &[0.0, 0.0], 0.0, &[1.0], true, &[]).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_update_rejects_unwritten_slots() {
        let mut buffer = buffer(10);
        (0..3).for_each(|i| add(&mut buffer, i, false));
        assert_eq!(
            err_of(buffer.update_priorities(&[1, 7], &[2.0, 1000.0])),
            CaresError::IndexOutOfRange { index: 7, len: 3 }
        );
        // Nothing is written when an index is rejected.
        assert_eq!(buffer.priority(1), 1.0);
        assert_eq!(buffer.priority(7), 0.0);
        assert_eq!(buffer.max_priority(), 1.0);

        let batch = buffer.sample_priority(3, true).unwrap();
        assert!(batch.indices.iter().all(|&ix| ix < 3));
    }

    #[test]
    fn test_zero_capacity() {
        let config = PrioritizedReplayBufferConfig::default().capacity(0);
        assert!(matches!(
            err_of(PrioritizedReplayBuffer::build(&config)),
            CaresError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_rejected_first_transition_does_not_fix_dims() {
        let mut buffer = buffer(4);
        assert_eq!(
            err_of(buffer.add(&[0.0, 0.0, 0.0], &[0.0], 0.0, &[0.0, 0.0], false, &[])),
            CaresError::DimensionMismatch {
                field: "next_state".to_string(),
                expected: 3,
                got: 2
            }
        );
        assert!(buffer.is_empty());
        assert_eq!(buffer.sum_tree().total(), 0.0);

        buffer.add(&[0.0, 0.0], &[0.0], 0.0, &[1.0, 1.0], false, &[]).unwrap();
        assert_eq!(buffer.len(), 1);
        assert!(buffer
            .add(&[0.0, 0.0, 0.0], &[0.0], 0.0, &[0.0, 0.0, 0.0], false, &[])
            .is_err());
    }
}
