//! Assertions scenarios make about their measurements.

use crate::node::DelayConfig;
use std::time::Duration;

/// Check that transfer times (seconds) are the source minimum plus a
/// residual uniform over the source range.
///
/// `slack` covers measurement overshoot, mostly the inbox poll interval.
/// Residuals must lie in `[0, range + slack]`; their mean must be within
/// four standard errors of `range / 2`, shifted up by at most `slack`.
pub fn check_residuals(samples: &[f64], delay: &DelayConfig, slack: Duration) -> Result<(), String> {
    if samples.is_empty() {
        return Err("no samples to check".to_string());
    }

    let min = delay.min_ms() as f64 / 1000.0;
    let range = delay.range_ms() as f64 / 1000.0;
    let slack = slack.as_secs_f64();
    let residuals: Vec<f64> = samples.iter().map(|t| t - min).collect();

    if let Some(low) = residuals.iter().copied().find(|r| *r < -1e-3) {
        return Err(format!(
            "transfer {:.3}s is below the minimum delay {min:.3}s",
            low + min
        ));
    }
    if let Some(high) = residuals.iter().copied().find(|r| *r > range + slack) {
        return Err(format!(
            "residual {high:.3}s exceeds range {range:.3}s plus slack {slack:.3}s"
        ));
    }

    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let standard_error = range / 12f64.sqrt() / n.sqrt();
    let lower = range / 2.0 - 4.0 * standard_error;
    let upper = range / 2.0 + slack + 4.0 * standard_error;
    if mean < lower || mean > upper {
        return Err(format!(
            "mean residual {mean:.3}s outside [{lower:.3}, {upper:.3}]"
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_samples(min: f64, range: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| min + range * (i as f64 + 0.5) / n as f64)
            .collect()
    }

    #[test]
    fn test_uniform_residuals_pass() {
        let delay = DelayConfig::new(1000, 1000);
        let samples = uniform_samples(1.0, 1.0, 1000);
        assert!(check_residuals(&samples, &delay, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_overshoot_within_slack_passes() {
        let delay = DelayConfig::new(2000, 1000);
        let samples: Vec<f64> = uniform_samples(2.0, 1.0, 500)
            .into_iter()
            .map(|t| t + 0.2)
            .collect();
        assert!(check_residuals(&samples, &delay, Duration::from_millis(300)).is_ok());
        assert!(check_residuals(&samples, &delay, Duration::ZERO).is_err());
    }

    #[test]
    fn test_below_minimum_fails() {
        let delay = DelayConfig::new(1000, 1000);
        let err = check_residuals(&[0.5, 1.5], &delay, Duration::ZERO).unwrap_err();
        assert!(err.contains("below the minimum"));
    }

    #[test]
    fn test_skewed_residuals_fail() {
        let delay = DelayConfig::new(1000, 1000);
        let samples = vec![1.01; 1000];
        let err = check_residuals(&samples, &delay, Duration::ZERO).unwrap_err();
        assert!(err.contains("mean residual"));
    }

    #[test]
    fn test_empty_fails() {
        assert!(check_residuals(&[], &DelayConfig::new(1, 1), Duration::ZERO).is_err());
    }
}
