//! Multi-factor entry signal for watchlisted symbols.
//!
//! A dropped stock is only bought once the tape stops arguing: the price has
//! stopped falling hard, volume is still around, and we are not catching the
//! exact bottom tick. Each factor votes independently; the buy fires when
//! enough of them agree.

use crate::quotes::DailyBar;
use crate::utils::decimal::fractional_change;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Bars of recent history the evaluation looks at.
pub const ENTRY_SIGNAL_DAYS: u32 = 5;

/// Minimum bars required before any factor can vote.
const MIN_BARS: usize = 3;

/// Single-day decline beyond which the price counts as still falling.
const MAX_DAILY_DECLINE: Decimal = dec!(-0.05);

/// Outcome of one entry evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryVerdict {
    /// Names of the factors that voted yes
    pub factors: Vec<&'static str>,
    pub pass: bool,
}

impl EntryVerdict {
    fn no_data() -> Self {
        Self {
            factors: Vec::new(),
            pass: false,
        }
    }
}

/// Evaluate the entry factors over recent daily bars (oldest first).
///
/// Factors:
/// - `price_stabilizing`: the latest daily change is above -5%
/// - `decent_volume`: the latest volume is at least half the window average
/// - `above_recent_low`: the latest close sits at least 2% above the window low
pub fn evaluate_entry(bars: &[DailyBar], min_factors: u32) -> EntryVerdict {
    if bars.len() < MIN_BARS {
        return EntryVerdict::no_data();
    }

    let mut factors = Vec::new();

    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];

    if fractional_change(prev.close, last.close) > MAX_DAILY_DECLINE {
        factors.push("price_stabilizing");
    }

    let total_volume: Decimal = bars.iter().map(|b| b.volume).sum();
    let avg_volume = total_volume / Decimal::from(bars.len());
    if avg_volume > Decimal::ZERO && last.volume > avg_volume * dec!(0.5) {
        factors.push("decent_volume");
    }

    let lowest = bars
        .iter()
        .map(|b| b.low)
        .min()
        .expect("bars checked non-empty");
    if last.close > lowest * dec!(1.02) {
        factors.push("above_recent_low");
    }

    let pass = factors.len() as u32 >= min_factors;
    EntryVerdict { factors, pass }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, close: Decimal, low: Decimal, volume: Decimal) -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_all_factors_agree() {
        // Flat close, healthy volume, well off the low.
        let bars = vec![
            bar(8, dec!(60), dec!(55), dec!(1_000_000)),
            bar(9, dec!(60), dec!(57), dec!(1_000_000)),
            bar(10, dec!(61), dec!(60), dec!(1_200_000)),
        ];

        let verdict = evaluate_entry(&bars, 2);
        assert!(verdict.pass);
        assert_eq!(
            verdict.factors,
            vec!["price_stabilizing", "decent_volume", "above_recent_low"]
        );
    }

    #[test]
    fn test_still_falling_blocks_stabilizing_factor() {
        // 10% down on the day: the stabilizing factor must not vote.
        let bars = vec![
            bar(8, dec!(70), dec!(68), dec!(1_000_000)),
            bar(9, dec!(70), dec!(68), dec!(1_000_000)),
            bar(10, dec!(63), dec!(62), dec!(1_000_000)),
        ];

        let verdict = evaluate_entry(&bars, 2);
        assert!(!verdict.factors.contains(&"price_stabilizing"));
    }

    #[test]
    fn test_thin_volume_blocks_volume_factor() {
        let bars = vec![
            bar(8, dec!(60), dec!(58), dec!(2_000_000)),
            bar(9, dec!(60), dec!(58), dec!(2_000_000)),
            bar(10, dec!(60), dec!(58), dec!(100_000)),
        ];

        let verdict = evaluate_entry(&bars, 2);
        assert!(!verdict.factors.contains(&"decent_volume"));
    }

    #[test]
    fn test_sitting_on_the_low_blocks_low_factor() {
        // Latest close within 2% of the window low.
        let bars = vec![
            bar(8, dec!(62), dec!(60), dec!(1_000_000)),
            bar(9, dec!(61), dec!(60), dec!(1_000_000)),
            bar(10, dec!(60.5), dec!(60), dec!(1_000_000)),
        ];

        let verdict = evaluate_entry(&bars, 2);
        assert!(!verdict.factors.contains(&"above_recent_low"));
    }

    #[test]
    fn test_one_factor_is_not_enough_by_default() {
        // Falling hard on thin volume, sitting on the low: only zero or one
        // factor can vote, so the 2-of-3 gate holds.
        let bars = vec![
            bar(8, dec!(70), dec!(60), dec!(2_000_000)),
            bar(9, dec!(70), dec!(60), dec!(2_000_000)),
            bar(10, dec!(60), dec!(60), dec!(100_000)),
        ];

        let verdict = evaluate_entry(&bars, 2);
        assert!(!verdict.pass);
    }

    #[test]
    fn test_insufficient_history_never_passes() {
        let bars = vec![
            bar(9, dec!(60), dec!(58), dec!(1_000_000)),
            bar(10, dec!(60), dec!(58), dec!(1_000_000)),
        ];

        let verdict = evaluate_entry(&bars, 1);
        assert!(!verdict.pass);
        assert!(verdict.factors.is_empty());
    }

    #[test]
    fn test_min_factors_gate_is_configurable() {
        let bars = vec![
            bar(8, dec!(60), dec!(55), dec!(1_000_000)),
            bar(9, dec!(60), dec!(57), dec!(1_000_000)),
            bar(10, dec!(61), dec!(60), dec!(1_200_000)),
        ];

        assert!(evaluate_entry(&bars, 3).pass);
        assert!(!evaluate_entry(&bars, 4).pass);
    }
}
