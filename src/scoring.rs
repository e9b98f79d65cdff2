//! Scoring engine: combines trend, volatility, entry-quality, funding, news,
//! and volume factors (each clipped to `[0,1]`) into a single weighted
//! composite score the portfolio selector ranks candidates by.

use crate::config::ScoringConfig;
use crate::model::{NewsRisk, PositionSide};

/// An optional open-interest/positioning snapshot used to compute the
/// `crowding` factor. Absent by default; this crate does not fetch live
/// open-interest data itself (see `SPEC_FULL.md` §11).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CrowdingSnapshot {
    /// Symbol this snapshot was computed for.
    pub symbol: String,
    /// Percentile rank (0-1) of current open interest vs its own history;
    /// higher means more crowded.
    pub oi_percentile: f64,
    /// Ratio of long to short open interest; far from 1.0 in either
    /// direction indicates one-sided positioning.
    pub long_short_ratio: f64,
}

impl CrowdingSnapshot {
    fn score(&self) -> f64 {
        let oi_component = (1.0 - self.oi_percentile).clamp(0.0, 1.0);
        let skew = (self.long_short_ratio - 1.0).abs();
        let skew_component = (1.0 - skew).clamp(0.0, 1.0);
        ((oi_component + skew_component) / 2.0).clamp(0.0, 1.0)
    }
}

/// Inputs the scoring engine needs to compute a composite score for one
/// candidate. All fields are point-in-time values already computed by the
/// feature pipeline and signal generator; the scoring engine does no lookups
/// of its own.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ScoreInputs {
    /// Proposed side.
    pub side: PositionSide,
    /// Fast EMA at the current bar.
    pub ema_fast: f64,
    /// Fast EMA three bars prior, for the slope term.
    pub ema_fast_3_bars_ago: f64,
    /// Slow EMA at the current bar.
    pub ema_slow: f64,
    /// Current close price.
    pub price: f64,
    /// ATR at the current bar.
    pub atr: f64,
    /// Distance, in ATRs, from the entry trigger level to the current price.
    pub entry_distance_atr: f64,
    /// Funding rate in effect (decimal fraction, e.g. `0.0001`).
    pub funding_rate: f64,
    /// News-risk classification in effect.
    pub news_risk: NewsRisk,
    /// Volume ratio (current / SMA), when available.
    pub volume_ratio: Option<f64>,
    /// Optional crowding/positioning snapshot.
    pub crowding: Option<CrowdingSnapshot>,
}

/// Per-factor breakdown behind a composite score, useful for diagnostics and
/// as the portfolio selector's tiebreaker inputs (`funding`, `liquidity`).
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    /// Trend-alignment factor, `[0,1]`.
    pub trend: f64,
    /// Volatility-regime factor, `[0,1]`.
    pub volatility: f64,
    /// Entry-quality (distance-from-trigger) factor, `[0,1]`.
    pub entry_quality: f64,
    /// Funding-cost factor, `[0,1]`.
    pub funding: f64,
    /// News-risk factor, `[0,1]`.
    pub news: f64,
    /// Volume-confirmation factor, `[0,1]`.
    pub volume: f64,
    /// Crowding factor, `[0,1]`, neutral (`1.0`) when no snapshot is supplied.
    pub crowding: f64,
    /// Final weighted composite, clipped to `[0,1]`.
    pub composite: f64,
}

/// Computes composite scores from a configured set of factor weights.
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    /// Build a scoring engine from a weight/threshold configuration.
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score a candidate, returning the full factor breakdown.
    pub fn score(&self, inputs: &ScoreInputs) -> ScoreBreakdown {
        let trend = trend_factor(inputs);
        let volatility = volatility_factor(inputs.atr, inputs.price);
        let entry_quality = entry_quality_factor(inputs.entry_distance_atr);
        let funding = funding_factor(inputs.side, inputs.funding_rate);
        let news = news_factor(inputs.news_risk);
        let volume = volume_factor(inputs.volume_ratio);
        let crowding = inputs.crowding.as_ref().map(CrowdingSnapshot::score).unwrap_or(1.0);

        let composite = (self.config.weight_trend * trend
            + self.config.weight_volatility * volatility
            + self.config.weight_entry_quality * entry_quality
            + self.config.weight_funding * funding
            + self.config.weight_news * news)
            .clamp(0.0, 1.0);

        ScoreBreakdown {
            trend,
            volatility,
            entry_quality,
            funding,
            news,
            volume,
            crowding,
            composite,
        }
    }

    /// Whether a composite score clears the configured entry threshold.
    /// `override_threshold` lets the risk engine's soft news-`MEDIUM`
    /// adjustment (§4.3) substitute a stricter threshold for this call only.
    pub fn clears_threshold(&self, composite: f64, override_threshold: Option<f64>) -> bool {
        composite >= override_threshold.unwrap_or(self.config.min_composite_score)
    }
}

fn trend_factor(inputs: &ScoreInputs) -> f64 {
    let side_sign = inputs.side.sign();
    let aligned = match inputs.side {
        PositionSide::Long => inputs.ema_fast > inputs.ema_slow,
        PositionSide::Short => inputs.ema_fast < inputs.ema_slow,
    };
    let alignment = if aligned { 1.0 } else { 0.0 };

    let slope_component = if inputs.atr > 0.0 {
        let raw_slope = (inputs.ema_fast - inputs.ema_fast_3_bars_ago) / inputs.atr * side_sign;
        (raw_slope / 0.5).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let price_component = match inputs.side {
        PositionSide::Long => {
            if inputs.price > inputs.ema_slow {
                1.0
            } else {
                0.0
            }
        }
        PositionSide::Short => {
            if inputs.price < inputs.ema_slow {
                1.0
            } else {
                0.0
            }
        }
    };

    (0.5 * alignment + 0.3 * slope_component + 0.2 * price_component).clamp(0.0, 1.0)
}

fn volatility_factor(atr: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    let atr_pct = atr / price * 100.0;
    if (2.0..=5.0).contains(&atr_pct) {
        1.0
    } else if atr_pct < 2.0 {
        (atr_pct / 2.0).clamp(0.0, 1.0)
    } else if atr_pct < 10.0 {
        (1.0 - (atr_pct - 5.0) / 5.0).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn entry_quality_factor(entry_distance_atr: f64) -> f64 {
    if (0.5..=1.0).contains(&entry_distance_atr) {
        1.0
    } else if entry_distance_atr < 0.5 {
        (entry_distance_atr / 0.5).clamp(0.0, 1.0)
    } else {
        (1.0 - (entry_distance_atr - 1.0)).clamp(0.0, 1.0)
    }
}

fn funding_factor(side: PositionSide, funding_rate: f64) -> f64 {
    let adverse = match side {
        PositionSide::Long => funding_rate > 0.0,
        PositionSide::Short => funding_rate < 0.0,
    };
    if !adverse {
        return 1.0;
    }
    let funding_pct = funding_rate.abs() * 100.0;
    (1.0 - (funding_pct / 0.1).min(1.0)).clamp(0.0, 1.0)
}

fn news_factor(news_risk: NewsRisk) -> f64 {
    match news_risk {
        NewsRisk::High => 0.0,
        NewsRisk::Medium => 0.5,
        NewsRisk::Low => 1.0,
    }
}

fn volume_factor(volume_ratio: Option<f64>) -> f64 {
    match volume_ratio {
        None => 0.5,
        Some(ratio) if ratio >= 2.0 => 1.0,
        Some(ratio) if ratio >= 1.5 => 0.7,
        Some(ratio) if ratio >= 1.0 => 0.4,
        Some(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> ScoreInputs {
        ScoreInputs {
            side: PositionSide::Long,
            ema_fast: 105.0,
            ema_fast_3_bars_ago: 103.0,
            ema_slow: 100.0,
            price: 106.0,
            atr: 3.0,
            entry_distance_atr: 0.75,
            funding_rate: 0.0,
            news_risk: NewsRisk::Low,
            volume_ratio: Some(1.8),
            crowding: None,
        }
    }

    #[test]
    fn test_full_alignment_scores_high_trend() {
        let engine = ScoringEngine::new(ScoringConfig::default());
        let breakdown = engine.score(&base_inputs());
        assert!(breakdown.trend > 0.8);
    }

    #[test]
    fn test_short_misaligned_with_uptrend_scores_zero_trend_alignment() {
        let inputs = ScoreInputs {
            side: PositionSide::Short,
            ..base_inputs()
        };
        let engine = ScoringEngine::new(ScoringConfig::default());
        let breakdown = engine.score(&inputs);
        assert!(breakdown.trend < 0.5);
    }

    #[test]
    fn test_volatility_factor_sweet_spot() {
        assert_eq!(volatility_factor(3.0, 100.0), 1.0); // 3%
        assert!(volatility_factor(1.0, 100.0) < 1.0); // 1%
        assert_eq!(volatility_factor(15.0, 100.0), 0.0); // 15%
    }

    #[test]
    fn test_entry_quality_sweet_spot() {
        assert_eq!(entry_quality_factor(0.75), 1.0);
        assert!(entry_quality_factor(0.2) < 1.0);
        assert!(entry_quality_factor(1.8) < 1.0);
    }

    #[test]
    fn test_funding_factor_favorable_side() {
        // short collects positive funding: not adverse
        assert_eq!(funding_factor(PositionSide::Short, 0.0005), 1.0);
    }

    #[test]
    fn test_funding_factor_adverse_side_tapers_to_zero_at_10bps() {
        let f = funding_factor(PositionSide::Long, 0.001); // 0.1%
        assert!(f.abs() < 1e-9);
    }

    #[test]
    fn test_news_and_volume_factors() {
        assert_eq!(news_factor(NewsRisk::High), 0.0);
        assert_eq!(news_factor(NewsRisk::Medium), 0.5);
        assert_eq!(news_factor(NewsRisk::Low), 1.0);
        assert_eq!(volume_factor(Some(2.5)), 1.0);
        assert_eq!(volume_factor(Some(1.6)), 0.7);
        assert_eq!(volume_factor(Some(1.2)), 0.4);
        assert_eq!(volume_factor(Some(0.5)), 0.0);
        assert_eq!(volume_factor(None), 0.5);
    }

    #[test]
    fn test_composite_clipped_to_unit_interval() {
        let engine = ScoringEngine::new(ScoringConfig::default());
        let breakdown = engine.score(&base_inputs());
        assert!(breakdown.composite >= 0.0 && breakdown.composite <= 1.0);
    }

    #[test]
    fn test_clears_threshold_with_override() {
        let engine = ScoringEngine::new(ScoringConfig::default());
        assert!(engine.clears_threshold(0.6, None));
        assert!(!engine.clears_threshold(0.6, Some(0.75)));
    }

    #[test]
    fn test_crowding_snapshot_score_neutral_when_absent() {
        let engine = ScoringEngine::new(ScoringConfig::default());
        let breakdown = engine.score(&base_inputs());
        assert_eq!(breakdown.crowding, 1.0);
    }
}
