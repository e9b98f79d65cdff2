//! Volume-based indicators.

use super::sma::sma;

/// Calculate the simple moving average of volume.
///
/// Thin wrapper over [`sma`] kept as its own entry point so callers reading a
/// feature frame don't need to know volume happens to reuse the price SMA.
///
/// # Example
///
/// ```
/// use backtest_engine::indicators::volume_sma;
///
/// let volumes = vec![100.0, 110.0, 90.0, 120.0, 130.0];
/// let result = volume_sma(&volumes, 3);
/// assert!(result[1].is_none());
/// assert!(result[2].is_some());
/// ```
pub fn volume_sma(volumes: &[f64], period: usize) -> Vec<Option<f64>> {
    sma(volumes, period)
}

/// Calculate `volume / volume_sma(period)` for each bar.
///
/// `None` wherever the underlying SMA is undefined or zero (avoids a
/// division by zero on dead-volume bars).
///
/// # Example
///
/// ```
/// use backtest_engine::indicators::volume_ratio;
///
/// let volumes = vec![100.0, 100.0, 100.0, 300.0];
/// let result = volume_ratio(&volumes, 3);
/// assert_eq!(result[2], Some(1.0));
/// assert_eq!(result[3], Some(3.0));
/// ```
pub fn volume_ratio(volumes: &[f64], period: usize) -> Vec<Option<f64>> {
    let avg = volume_sma(volumes, period);
    volumes
        .iter()
        .zip(avg.iter())
        .map(|(&v, &a)| match a {
            Some(a) if a > 0.0 => Some(v / a),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_sma_basic() {
        let volumes = vec![10.0, 20.0, 30.0, 40.0];
        let result = volume_sma(&volumes, 2);
        assert_eq!(result[0], None);
        assert_eq!(result[1], Some(15.0));
        assert_eq!(result[2], Some(25.0));
        assert_eq!(result[3], Some(35.0));
    }

    #[test]
    fn test_volume_ratio_basic() {
        let volumes = vec![100.0, 100.0, 100.0, 400.0];
        let result = volume_ratio(&volumes, 3);
        assert_eq!(result[2], Some(1.0));
        assert_eq!(result[3], Some(4.0));
    }

    #[test]
    fn test_volume_ratio_zero_average() {
        let volumes = vec![0.0, 0.0, 5.0];
        let result = volume_ratio(&volumes, 2);
        assert_eq!(result[1], None);
    }
}
