//! Property-based tests for the resilience building blocks
//!
//! Uses proptest to verify invariants of:
//! - Circuit breaker trip threshold
//! - Reconnection backoff bounds and monotonicity
//! - Offline queue capacity and ordering
//! - Envelope wire format

use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

use pulsewire_client::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Envelope, EvictionPolicy, MessageQueue,
    QueuedMessage, ReconnectionPolicy,
};

// =============================================================================
// CIRCUIT BREAKER PROPERTY TESTS
// =============================================================================

fn breaker_config_strategy() -> impl Strategy<Value = CircuitBreakerConfig> {
    (1u32..=20, 1u64..=600).prop_map(|(failure_threshold, cooldown_secs)| CircuitBreakerConfig {
        failure_threshold,
        cooldown: Duration::from_secs(cooldown_secs),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the circuit is open iff the trailing run of failures has
    /// reached the threshold (no cool-down can elapse within the test).
    #[test]
    fn prop_breaker_trips_on_consecutive_failures(
        config in breaker_config_strategy(),
        outcomes in prop::collection::vec(prop::bool::ANY, 1..60)
    ) {
        let threshold = config.failure_threshold;
        let mut breaker = CircuitBreaker::new(config);
        let mut run = 0u32;
        let mut opened = false;

        for success in outcomes {
            if opened {
                prop_assert!(!breaker.permits());
                continue;
            }
            prop_assert!(breaker.permits());
            if success {
                breaker.record_success();
                run = 0;
            } else {
                breaker.record_failure();
                run += 1;
            }
            opened = run >= threshold;
            let expected = if opened { CircuitState::Open } else { CircuitState::Closed };
            prop_assert_eq!(breaker.state(), expected);
        }
    }

    /// Property: remaining cool-down never exceeds the configured cool-down
    #[test]
    fn prop_remaining_cooldown_bounded(config in breaker_config_strategy()) {
        let cooldown = config.cooldown;
        let threshold = config.failure_threshold;
        let mut breaker = CircuitBreaker::new(config);
        for _ in 0..threshold {
            breaker.record_failure();
        }
        prop_assert_eq!(breaker.state(), CircuitState::Open);
        prop_assert!(breaker.remaining_cooldown() <= cooldown);
    }
}

// =============================================================================
// BACKOFF PROPERTY TESTS
// =============================================================================

fn policy_strategy() -> impl Strategy<Value = ReconnectionPolicy> {
    (1u64..=5_000, 0u64..=60_000, 0.0f64..0.99).prop_map(|(base_ms, extra_ms, jitter)| {
        ReconnectionPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms + extra_ms),
            jitter,
            max_attempts: None,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every jittered delay stays within [0, max_delay]
    #[test]
    fn prop_delay_never_exceeds_max(
        policy in policy_strategy(),
        attempt in 0u32..64,
        sample in 0.0f64..1.0
    ) {
        let delay = policy.delay_with_sample(attempt, sample);
        prop_assert!(delay <= policy.max_delay);
    }

    /// Property: jitter stays within the configured fraction of the base delay
    #[test]
    fn prop_jitter_within_bounds(
        policy in policy_strategy(),
        attempt in 0u32..64,
        sample in 0.0f64..1.0
    ) {
        let base = policy.base_delay_for(attempt).as_secs_f64();
        let delay = policy.delay_with_sample(attempt, sample).as_secs_f64();
        let slack = 1e-6;
        prop_assert!(delay >= base * (1.0 - policy.jitter) - slack);
        prop_assert!(delay <= base * (1.0 + policy.jitter) + slack);
    }

    /// Property: un-jittered delays are non-decreasing in the attempt number
    #[test]
    fn prop_base_delay_monotonic(policy in policy_strategy(), attempt in 0u32..63) {
        prop_assert!(policy.base_delay_for(attempt) <= policy.base_delay_for(attempt + 1));
    }
}

// =============================================================================
// QUEUE PROPERTY TESTS
// =============================================================================

fn queued(n: usize) -> QueuedMessage {
    QueuedMessage::new(Envelope::new("order", json!({ "n": n })))
}

fn numbers(messages: &[QueuedMessage]) -> Vec<usize> {
    messages
        .iter()
        .map(|m| m.envelope.payload["n"].as_u64().unwrap_or(u64::MAX) as usize)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: drop-oldest keeps exactly the newest `capacity` messages, in order
    #[test]
    fn prop_drop_oldest_keeps_newest_in_order(capacity in 1usize..50, count in 0usize..200) {
        let mut queue = MessageQueue::new(capacity);
        for n in 0..count {
            queue.enqueue(queued(n));
            prop_assert!(queue.len() <= capacity);
        }

        let kept = count.min(capacity);
        prop_assert_eq!(queue.evicted(), (count - kept) as u64);
        let expected: Vec<usize> = (count - kept..count).collect();
        prop_assert_eq!(numbers(&queue.dequeue_all()), expected);
        prop_assert!(queue.is_empty());
    }

    /// Property: drop-newest keeps exactly the oldest `capacity` messages
    #[test]
    fn prop_drop_newest_keeps_oldest(capacity in 1usize..50, count in 0usize..200) {
        let mut queue = MessageQueue::with_policy(capacity, EvictionPolicy::DropNewest, None);
        for n in 0..count {
            queue.enqueue(queued(n));
        }
        let expected: Vec<usize> = (0..count.min(capacity)).collect();
        prop_assert_eq!(numbers(&queue.dequeue_all()), expected);
    }

    /// Property: requeued messages go back ahead of anything queued since
    #[test]
    fn prop_requeue_front_preserves_order(capacity in 4usize..50, split in 1usize..4) {
        let mut queue = MessageQueue::new(capacity);
        for n in 0..4 {
            queue.enqueue(queued(n));
        }
        let mut drained = queue.dequeue_all();
        let unsent = drained.split_off(split);
        queue.enqueue(queued(100));
        queue.requeue_front(unsent);

        let mut expected: Vec<usize> = (split..4).collect();
        expected.push(100);
        prop_assert_eq!(numbers(&queue.dequeue_all()), expected);
    }
}

// =============================================================================
// ENVELOPE PROPERTY TESTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: any non-empty type and string payload survives the wire
    #[test]
    fn prop_envelope_wire_format(kind in "[a-z_]{1,24}", text in ".{0,64}") {
        let envelope = Envelope::new(kind.clone(), json!({ "text": text }));
        let wire: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        prop_assert_eq!(wire["type"].as_str(), Some(kind.as_str()));
        prop_assert!(wire["timestamp"].is_i64());

        let decoded = Envelope::from_slice(envelope.to_json().unwrap().as_bytes()).unwrap();
        prop_assert_eq!(decoded, envelope);
    }
}
