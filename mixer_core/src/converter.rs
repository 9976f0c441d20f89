//! Grams, percentage and pulse duration conversions.
//!
//! The `exact_*` functions are algebraic inverses of each other; the plain
//! variants round to whole milliseconds for transmission.

use crate::config::DEFAULT_MS_PER_GRAM;
use crate::error::ConversionError;

type Result<T> = std::result::Result<T, ConversionError>;

fn check_batch(batch_g: f64) -> Result<()> {
    if batch_g.is_finite() && batch_g > 0.0 {
        Ok(())
    } else {
        Err(ConversionError::NonPositiveBatch(batch_g))
    }
}

fn check_rate(ms_per_gram: f64) -> Result<()> {
    if ms_per_gram.is_finite() && ms_per_gram > 0.0 {
        Ok(())
    } else {
        Err(ConversionError::NonPositiveRate(ms_per_gram))
    }
}

fn check_grams(grams: f64) -> Result<()> {
    if grams.is_finite() && grams >= 0.0 {
        Ok(())
    } else {
        Err(ConversionError::NegativeGrams(grams))
    }
}

pub fn grams_from_percentage(pct: f64, batch_g: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(ConversionError::PercentageOutOfRange(pct));
    }
    check_batch(batch_g)?;
    Ok(pct / 100.0 * batch_g)
}

pub fn percentage_from_grams(grams: f64, batch_g: f64) -> Result<f64> {
    check_grams(grams)?;
    check_batch(batch_g)?;
    Ok(grams / batch_g * 100.0)
}

pub fn exact_duration_from_grams(grams: f64, ms_per_gram: f64) -> Result<f64> {
    check_grams(grams)?;
    check_rate(ms_per_gram)?;
    Ok(grams * ms_per_gram)
}

/// Whole-millisecond pulse for `grams` at `ms_per_gram`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn duration_from_grams_at(grams: f64, ms_per_gram: f64) -> Result<u64> {
    exact_duration_from_grams(grams, ms_per_gram).map(|ms| ms.round() as u64)
}

/// Whole-millisecond pulse for `grams` at the default rate.
pub fn duration_from_grams(grams: f64) -> Result<u64> {
    duration_from_grams_at(grams, f64::from(DEFAULT_MS_PER_GRAM))
}

pub fn grams_from_duration_at(duration_ms: f64, ms_per_gram: f64) -> Result<f64> {
    if !(duration_ms.is_finite() && duration_ms >= 0.0) {
        return Err(ConversionError::NegativeDuration(duration_ms));
    }
    check_rate(ms_per_gram)?;
    Ok(duration_ms / ms_per_gram)
}

pub fn grams_from_duration(duration_ms: f64) -> Result<f64> {
    grams_from_duration_at(duration_ms, f64::from(DEFAULT_MS_PER_GRAM))
}

pub fn exact_duration_from_percentage(pct: f64, batch_g: f64) -> Result<f64> {
    let grams = grams_from_percentage(pct, batch_g)?;
    exact_duration_from_grams(grams, f64::from(DEFAULT_MS_PER_GRAM))
}

pub fn duration_from_percentage(pct: f64, batch_g: f64) -> Result<u64> {
    let grams = grams_from_percentage(pct, batch_g)?;
    duration_from_grams(grams)
}

pub fn percentage_from_duration(duration_ms: f64, batch_g: f64) -> Result<f64> {
    let grams = grams_from_duration(duration_ms)?;
    percentage_from_grams(grams, batch_g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(50.0, 200.0, 100.0)]
    #[case(0.0, 10.0, 0.0)]
    #[case(100.0, 10.0, 10.0)]
    #[case(2.5, 100.0, 2.5)]
    fn grams_from_percentage_cases(#[case] pct: f64, #[case] batch: f64, #[case] expected: f64) {
        assert_eq!(grams_from_percentage(pct, batch), Ok(expected));
    }

    #[rstest]
    #[case(-0.1, 100.0)]
    #[case(100.1, 100.0)]
    #[case(10.0, 0.0)]
    #[case(10.0, -5.0)]
    #[case(f64::NAN, 100.0)]
    fn grams_from_percentage_rejects(#[case] pct: f64, #[case] batch: f64) {
        assert!(grams_from_percentage(pct, batch).is_err());
    }

    #[test]
    fn durations_round_to_whole_ms() {
        assert_eq!(duration_from_grams(2.5), Ok(50));
        assert_eq!(duration_from_grams(0.03), Ok(1));
        assert_eq!(duration_from_grams(0.0), Ok(0));
        assert_eq!(duration_from_grams_at(1.26, 10.0), Ok(13));
        assert!(duration_from_grams(-1.0).is_err());
        assert!(duration_from_grams_at(1.0, 0.0).is_err());
    }

    #[test]
    fn inverses_at_default_rate() {
        assert_eq!(grams_from_duration(2000.0), Ok(100.0));
        assert_eq!(percentage_from_duration(2000.0, 200.0), Ok(50.0));
        assert_eq!(duration_from_percentage(50.0, 200.0), Ok(2000));
        assert!(grams_from_duration(-1.0).is_err());
    }
}
