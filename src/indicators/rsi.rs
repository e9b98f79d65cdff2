//! Relative Strength Index (RSI) indicator.

use super::{IndicatorError, Result};

/// Calculate Relative Strength Index (RSI) using Wilder's smoothing.
///
/// RSI measures the magnitude of recent price changes to evaluate overbought or oversold conditions.
/// Values range from 0 to 100, with readings above 70 indicating overbought and below 30 indicating oversold.
///
/// # Arguments
///
/// * `data` - Price data (typically close prices)
/// * `period` - Number of periods (typically 14)
///
/// # Formula
///
/// 1. Calculate price changes (current - previous), split into gains and losses.
/// 2. Seed the average gain/loss with a plain mean over the first `period` changes.
/// 3. Smooth subsequent averages with Wilder's recurrence:
///    `avg = (prev_avg * (period - 1) + current) / period`.
/// 4. RS = Average Gain / Average Loss; RSI = 100 - (100 / (1 + RS)).
///
/// # Example
///
/// ```
/// use backtest_engine::indicators::rsi;
///
/// let prices = vec![44.0, 44.34, 44.09, 43.61, 44.33, 44.83, 45.10, 45.42,
///                   45.84, 46.08, 45.89, 46.03, 45.61, 46.28, 46.28];
/// let result = rsi(&prices, 14).unwrap();
///
/// // First 14 values will be None (need period + 1 for calculation)
/// assert!(result[13].is_none());
/// // RSI values start from index 14
/// assert!(result[14].is_some());
/// ```
pub fn rsi(data: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod(
            "Period must be greater than 0".to_string(),
        ));
    }

    if data.len() <= period {
        return Err(IndicatorError::InsufficientData {
            need: period + 1,
            got: data.len(),
        });
    }

    let mut result = vec![None; data.len()];

    // Price changes, split into gain/loss series (aligned to data[1..])
    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    // Seed with a plain average over the first `period` changes.
    let mut avg_gain: f64 = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[..period].iter().sum::<f64>() / period as f64;

    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    // Wilder's smoothing for subsequent bars.
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        result[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    Ok(result)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_basic() {
        // Test data with known RSI values
        let data = vec![
            44.0, 44.34, 44.09, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.0,
        ];

        let result = rsi(&data, 14).unwrap();

        assert_eq!(result.len(), data.len());

        // First period values should be None
        for (i, &item) in result.iter().enumerate().take(14) {
            assert_eq!(item, None, "Index {} should be None", i);
        }

        // RSI should be between 0 and 100
        for (i, &val) in result.iter().enumerate().skip(14) {
            if let Some(rsi_val) = val {
                assert!(
                    (0.0..=100.0).contains(&rsi_val),
                    "RSI at index {} = {} is out of range [0, 100]",
                    i,
                    rsi_val
                );
            }
        }
    }

    #[test]
    fn test_rsi_all_gains() {
        // Steadily increasing prices should give high RSI
        let data: Vec<f64> = (0..30).map(|x| x as f64).collect();
        let result = rsi(&data, 14).unwrap();

        // Later RSI values should be close to 100
        if let Some(rsi_val) = result.last().and_then(|&v| v) {
            assert!(rsi_val > 90.0, "RSI with all gains should be > 90");
        }
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let data = vec![1.0, 2.0, 3.0];
        let result = rsi(&data, 14);

        assert!(result.is_err());
    }
}
