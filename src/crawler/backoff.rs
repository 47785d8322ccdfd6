use rand::Rng;
use std::time::Duration;

/// Calculate exponential backoff delay with jitter
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64) -> Duration {
    // Cap the exponent to prevent overflow (~8.5 minutes with a 500ms base)
    let capped_attempt = attempt.min(10);

    // Calculate base delay: base * 2^attempt
    let base_delay = base_delay_ms.saturating_mul(2_u64.saturating_pow(capped_attempt));

    // Add jitter: ±30% randomness
    let jitter_factor = rand::thread_rng().gen_range(0.7..1.3);
    let delay_with_jitter = (base_delay as f64 * jitter_factor).round() as u64;

    Duration::from_millis(delay_with_jitter)
}
