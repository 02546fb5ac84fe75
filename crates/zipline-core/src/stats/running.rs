use serde::{Deserialize, Serialize};

/// Online mean / variance accumulator (Welford).
///
/// Only pushes are supported; there is no way to retract a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStat {
    #[serde(rename = "n")]
    count: u64,
    #[serde(rename = "m")]
    mean: f64,
    /// Accumulated squared deviation from the running mean.
    #[serde(rename = "s")]
    sum_sq: f64,
}

impl RunningStat {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn push(&mut self, x: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = x;
            self.sum_sq = 0.0;
        } else {
            let old_mean = self.mean;
            self.mean = old_mean + (x - old_mean) / self.count as f64;
            self.sum_sq += (x - old_mean) * (x - self.mean);
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        if self.count > 0 { self.mean } else { 0.0 }
    }

    /// Sample variance (Bessel-corrected); 0 with fewer than two samples.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.sum_sq / (self.count - 1) as f64
        } else {
            0.0
        }
    }

    /// Sample standard deviation.
    ///
    /// With a single sample this is `mean / 2`, a deliberately wide guess
    /// that other components rely on.
    #[must_use]
    pub fn standard_deviation(&self) -> f64 {
        if self.count > 1 {
            self.variance().sqrt()
        } else {
            self.mean() / 2.0
        }
    }
}

impl FromIterator<f64> for RunningStat {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stat = Self::new();
        for x in iter {
            stat.push(x);
        }
        stat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn textbook_series() {
        let stat: RunningStat = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        assert_eq!(stat.count(), 8);
        assert!(close(stat.mean(), 5.0));
        // sum of squared deviations is 32, Bessel denominator is 7
        assert!(close(stat.variance(), 32.0 / 7.0));
        assert!(close(stat.standard_deviation(), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn single_sample_uses_half_mean_as_deviation() {
        let mut stat = RunningStat::new();
        stat.push(12.0);
        assert!(close(stat.mean(), 12.0));
        assert!(close(stat.variance(), 0.0));
        assert!(close(stat.standard_deviation(), 6.0));
    }

    #[test]
    fn empty_stat_is_all_zero() {
        let stat = RunningStat::new();
        assert!(close(stat.mean(), 0.0));
        assert!(close(stat.variance(), 0.0));
        assert!(close(stat.standard_deviation(), 0.0));
    }

    #[test]
    fn constant_series_has_zero_deviation() {
        let stat: RunningStat = std::iter::repeat_n(1.0, 5).collect();
        assert!(close(stat.mean(), 1.0));
        assert!(close(stat.standard_deviation(), 0.0));
    }

    #[test]
    fn serde_uses_compact_field_names() {
        let stat: RunningStat = [1.0, 3.0].into_iter().collect();
        let json = serde_json::to_string(&stat).expect("encode");
        assert_eq!(json, r#"{"n":2,"m":2.0,"s":2.0}"#);
        let back: RunningStat = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, stat);
    }
}
