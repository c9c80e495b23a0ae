use anyhow::Result;
use cares_core::{PrioritizedReplayBuffer, PrioritizedReplayBufferConfig};

fn filled_buffer() -> Result<PrioritizedReplayBuffer> {
    let config = PrioritizedReplayBufferConfig::default()
        .capacity(10)
        .seed(42);
    let mut buffer = PrioritizedReplayBuffer::build(&config)?;
    for i in 0..10 {
        let x = i as f32;
        buffer.add(&[x, x], &[0.0], x, &[x + 1.0, x], false, &[])?;
    }
    Ok(buffer)
}

#[test]
fn test_uniform_then_prioritized() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut buffer = filled_buffer()?;

    let batch = buffer.sample_uniform(5)?;
    assert_eq!(batch.len(), 5);
    assert!(batch.indices.iter().all(|&ix| ix < 10));
    for (k, &ix) in batch.indices.iter().enumerate() {
        assert_eq!(batch.reward[k], ix as f32);
    }

    let all = (0..10).collect::<Vec<_>>();
    let priorities = (1..=10).rev().map(|p| p as f64).collect::<Vec<_>>();
    buffer.update_priorities(&all, &priorities)?;

    // Each call is clamped to the 10 stored transitions.
    let mut counts = [0usize; 10];
    for _ in 0..100 {
        let batch = buffer.sample_priority(1000, true)?;
        assert_eq!(batch.len(), 10);
        batch.indices.iter().for_each(|&ix| counts[ix] += 1);
    }
    assert_eq!(counts.iter().sum::<usize>(), 1000);
    assert!(counts[0] >= 5 * counts[9].max(1), "{:?}", counts);
    Ok(())
}

#[test]
fn test_flush_returns_in_order() -> Result<()> {
    let mut buffer = filled_buffer()?;
    let batch = buffer.flush()?;
    assert_eq!(batch.reward, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    assert_eq!(batch.indices, (0..10).collect::<Vec<_>>());
    assert!(buffer.is_empty());
    assert!(buffer.sample_uniform(1).is_err());
    Ok(())
}
