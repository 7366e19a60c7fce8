use serde::{Deserialize, Serialize};

use crate::config::RegimeSettings;
use crate::core::indicators::{atr, mean_of_last, sma};
use crate::models::{BarSeries, Bias, Regime, VolatilityRegime};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: Regime,
    pub bias: Bias,
    pub volatility: VolatilityRegime,
    /// MA slope over the lookback, in ATR units
    pub slope: f64,
    /// Current ATR over its longer-run mean
    pub volatility_ratio: f64,
    pub atr: Option<f64>,
}

impl RegimeReading {
    /// Used when there is not enough history to classify.
    pub fn neutral() -> Self {
        Self {
            regime: Regime::Transition,
            bias: Bias::Neutral,
            volatility: VolatilityRegime::Normal,
            slope: 0.0,
            volatility_ratio: 1.0,
            atr: None,
        }
    }
}

pub struct RegimeClassifier {
    settings: RegimeSettings,
}

impl RegimeClassifier {
    pub fn new(settings: &RegimeSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn min_bars(&self) -> usize {
        let s = &self.settings;
        s.ma_period
            .saturating_add(s.slope_lookback)
            .max(s.atr_period.saturating_add(s.atr_baseline))
    }

    pub fn classify(&self, bars: &BarSeries) -> RegimeReading {
        let s = &self.settings;
        if bars.len() < self.min_bars() || s.ma_period == 0 || s.atr_period == 0 {
            return RegimeReading::neutral();
        }

        let closes = bars.closes();
        let ma = sma(&closes, s.ma_period);
        let atr_series = atr(bars.as_slice(), s.atr_period);

        let n = closes.len();
        let ma_now = ma[n - 1];
        let ma_then = ma[n - 1 - s.slope_lookback];
        let atr_now = atr_series[n - 1];
        let atr_mean = mean_of_last(&atr_series, s.atr_baseline);

        let (Some(atr_mean), true) = (atr_mean, ma_now.is_finite() && ma_then.is_finite()) else {
            return RegimeReading::neutral();
        };
        if !atr_now.is_finite() || atr_now <= 0.0 || atr_mean <= 0.0 {
            // Flat tape: no usable volatility to normalise by.
            return RegimeReading {
                atr: Some(atr_now.max(0.0)),
                ..RegimeReading::neutral()
            };
        }

        let slope = (ma_now - ma_then) / atr_now;
        let ratio = atr_now / atr_mean;

        let volatility = if ratio < s.vol_low {
            VolatilityRegime::Low
        } else if ratio > s.vol_high {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Normal
        };

        let regime = if slope.abs() > s.trend_slope && ratio >= s.vol_low {
            Regime::Trend
        } else if slope.abs() <= s.range_slope && ratio <= s.vol_high {
            Regime::Range
        } else {
            Regime::Transition
        };

        let close = closes[n - 1];
        let bias = match regime {
            Regime::Trend => {
                if close > ma_now {
                    Bias::Bullish
                } else if close < ma_now {
                    Bias::Bearish
                } else {
                    Bias::Neutral
                }
            }
            Regime::Range => {
                let window = bars.tail(s.ma_period);
                let hi = window.highs_max();
                let lo = window.lows_min();
                let span = hi - lo;
                if span <= 0.0 {
                    Bias::Neutral
                } else {
                    let pos = (close - lo) / span;
                    if pos <= 0.25 {
                        Bias::Bullish
                    } else if pos >= 0.75 {
                        Bias::Bearish
                    } else {
                        Bias::Neutral
                    }
                }
            }
            Regime::Transition => Bias::Neutral,
        };

        RegimeReading {
            regime,
            bias,
            volatility,
            slope,
            volatility_ratio: ratio,
            atr: Some(atr_now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_helpers::{make_bars, make_bullish_trend};

    fn classifier() -> RegimeClassifier {
        let mut s = Config::default().regime;
        s.ma_period = 20;
        s.slope_lookback = 5;
        s.atr_period = 5;
        s.atr_baseline = 20;
        RegimeClassifier::new(&s)
    }

    #[test]
    fn steady_rise_is_bullish_trend() {
        let bars = make_bullish_trend(60, 100.0);
        let r = classifier().classify(&bars);
        assert_eq!(r.regime, Regime::Trend);
        assert_eq!(r.bias, Bias::Bullish);
        assert!(r.slope > 0.0);
    }

    #[test]
    fn oscillation_is_range_with_extreme_bias() {
        // Zig-zag between 100 and 104, ending at the bottom of the range.
        let mut data = Vec::new();
        for i in 0..60 {
            let up = i % 2 == 0;
            if up {
                data.push((100.0, 104.0, 99.8, 103.8));
            } else {
                data.push((103.8, 104.0, 99.8, 100.0));
            }
        }
        let r = classifier().classify(&make_bars(&data));
        assert_eq!(r.regime, Regime::Range);
        assert_eq!(r.bias, Bias::Bullish);
        assert_eq!(r.volatility, VolatilityRegime::Normal);
    }

    #[test]
    fn short_history_is_neutral() {
        let r = classifier().classify(&make_bullish_trend(10, 100.0));
        assert_eq!(r.regime, Regime::Transition);
        assert_eq!(r.bias, Bias::Neutral);
        assert!(r.atr.is_none());
    }

    #[test]
    fn huge_periods_read_as_short_history() {
        let mut s = Config::default().regime;
        s.ma_period = usize::MAX;
        s.atr_baseline = usize::MAX;
        let c = RegimeClassifier::new(&s);
        assert_eq!(c.min_bars(), usize::MAX);
        let r = c.classify(&make_bullish_trend(60, 100.0));
        assert_eq!(r.bias, Bias::Neutral);
    }

    #[test]
    fn zero_volatility_is_guarded() {
        let data: Vec<(f64, f64, f64, f64)> = (0..60).map(|_| (100.0, 100.0, 100.0, 100.0)).collect();
        let r = classifier().classify(&make_bars(&data));
        assert_eq!(r.regime, Regime::Transition);
        assert!(r.slope.is_finite());
    }
}
