// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_bound_both_waits() {
    let config = PoolConfig::with_size(4);
    assert_eq!(config.size, 4);
    assert_eq!(config.ready_deadline(), Some(DEFAULT_READY_TIMEOUT));
    assert_eq!(config.retire_deadline(), Some(DEFAULT_RETIRE_TIMEOUT));
}

#[test]
fn zero_timeout_waits_forever() {
    let config = PoolConfig {
        ready_timeout: Duration::ZERO,
        retire_timeout: Duration::ZERO,
        ..PoolConfig::with_size(1)
    };
    assert_eq!(config.ready_deadline(), None);
    assert_eq!(config.retire_deadline(), None);
}

#[parameterized(
    first_retry = { 1, 100 },
    second_retry = { 2, 200 },
    third_retry = { 3, 400 },
    capped = { 10, 5_000 },
    huge_retry_is_capped = { 200, 5_000 },
)]
fn backoff_doubles_up_to_cap(retry: u32, expected_ms: u64) {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(retry), Duration::from_millis(expected_ms));
}

#[test]
fn retry_policy_parses_humantime() {
    let policy: RetryPolicy = toml::from_str(
        r#"
attempts = 3
initial_backoff = "250ms"
max_backoff = "2s"
"#,
    )
    .unwrap();

    assert_eq!(policy.attempts, 3);
    assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    assert_eq!(policy.max_backoff, Duration::from_secs(2));
}

#[test]
fn retry_policy_fills_missing_fields() {
    let policy: RetryPolicy = toml::from_str("attempts = 2").unwrap();
    assert_eq!(policy.attempts, 2);
    assert_eq!(policy.initial_backoff, RetryPolicy::default().initial_backoff);
}
