use std::time::Duration;

use opc_data_logger::connection::retry_formatter::{RetryContext, RetryErrorType};
use opc_data_logger::connection::RetryPolicy;
use opc_data_logger::session::SessionError;

fn sample_context(error: SessionError) -> RetryContext {
    RetryContext::new(2, 5, &error, Duration::from_secs(4), "http://plant-gw:8080")
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let ctx = sample_context(SessionError::Timeout(Duration::from_secs(10)));
    let message = ctx.format_retry();
    assert!(message.contains("attempt 2/5"));
    assert!(message.contains("connection timeout"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.contains("http://plant-gw:8080"));
}

#[test]
fn format_success_includes_endpoint() {
    let message = RetryContext::succeeded(3, 5, "sim://plant").format_success();
    assert!(message.contains("attempt 3/5"));
    assert!(message.contains("succeeded"));
    assert!(message.contains("sim://plant"));
}

#[test]
fn format_failure_lists_suggestions() {
    let ctx = sample_context(SessionError::ConnectFailed("connection refused".to_string()));
    let output = ctx.format_failure();
    assert!(output.contains("after 5 attempts"));
    assert!(output.contains("connection refused"));
    assert!(output.contains("Verify the endpoint address"));
    assert!(output.contains("--max-retry"));
}

#[test]
fn error_types_are_classified() {
    let cases = [
        (SessionError::Timeout(Duration::from_secs(1)), RetryErrorType::Timeout),
        (SessionError::ConnectFailed("x".into()), RetryErrorType::Unreachable),
        (SessionError::SessionRejected("x".into()), RetryErrorType::SessionRejected),
        (SessionError::InvalidResponse("x".into()), RetryErrorType::Protocol),
        (SessionError::UnsupportedEndpoint("x".into()), RetryErrorType::Unsupported),
        (SessionError::Closed, RetryErrorType::Generic),
    ];
    for (error, expected) in cases {
        assert_eq!(RetryErrorType::from_error(&error), expected, "{error}");
    }
}

#[test]
fn default_policy_delays_grow_to_the_ceiling() {
    let policy = RetryPolicy::default();
    let delays: Vec<u128> = (1..policy.max_retry)
        .map(|n| policy.delay_after(n).as_millis())
        .collect();
    assert_eq!(delays, vec![2_000, 4_000, 8_000, 10_000]);
    assert!(policy.allows_another(4));
    assert!(!policy.allows_another(5));
}

#[test]
fn delays_never_overflow() {
    let policy = RetryPolicy::from_millis(u32::MAX, 1_000, 60_000);
    assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(60));
    assert_eq!(policy.delay_after(0), Duration::from_secs(1));
}
