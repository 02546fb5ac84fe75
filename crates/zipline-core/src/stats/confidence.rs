//! Table-driven T-distribution confidence ranges and normal p-values.
//!
//! # Confidence range
//!
//! For a sample of size `n` with standard deviation `s`, the prediction
//! interval around the mean is `mean ± t(df, tail) * s * sqrt(1 + 1/n)`
//! with the critical value read from the `df = n` row. Sample sizes of 30
//! and above all share the table's last row.
//!
//! Example: `tail = P05`, `n = 5`, `s = 1` gives `t = 2.015` and a range of
//! `2.015 * sqrt(1.2) ≈ 2.207`.
//!
//! # p-values
//!
//! [`p_value_from_z`] reads the standard normal CDF in 0.05 steps and clamps
//! to 0.999 beyond `z = 3`.

/// One-sided tail probability of the T critical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tail {
    /// 10% tail (80% two-sided interval).
    P10,
    /// 5% tail (90% two-sided interval).
    P05,
    P025,
    P01,
    P005,
    P001,
    /// 0.05% tail (99.9% two-sided interval).
    P0005,
}

impl Tail {
    const fn column(self) -> usize {
        match self {
            Self::P10 => 0,
            Self::P05 => 1,
            Self::P025 => 2,
            Self::P01 => 3,
            Self::P005 => 4,
            Self::P001 => 5,
            Self::P0005 => 6,
        }
    }
}

/// Critical values, one row per degree of freedom 1..=30.
#[rustfmt::skip]
const T_TABLE: [[f64; 7]; 30] = [
    [3.078, 6.314, 12.706, 31.821, 63.656, 318.289, 636.578],
    [1.886, 2.920,  4.303,  6.965,  9.925,  22.328,  31.600],
    [1.638, 2.353,  3.182,  4.541,  5.841,  10.214,  12.924],
    [1.533, 2.132,  2.776,  3.747,  4.604,   7.173,   8.610],
    [1.476, 2.015,  2.571,  3.365,  4.032,   5.894,   6.869],
    [1.440, 1.943,  2.447,  3.143,  3.707,   5.208,   5.959],
    [1.415, 1.895,  2.365,  2.998,  3.499,   4.785,   5.408],
    [1.397, 1.860,  2.306,  2.896,  3.355,   4.501,   5.041],
    [1.383, 1.833,  2.262,  2.821,  3.250,   4.297,   4.781],
    [1.372, 1.812,  2.228,  2.764,  3.169,   4.144,   4.587],
    [1.363, 1.796,  2.201,  2.718,  3.106,   4.025,   4.437],
    [1.356, 1.782,  2.179,  2.681,  3.055,   3.930,   4.318],
    [1.350, 1.771,  2.160,  2.650,  3.012,   3.852,   4.221],
    [1.345, 1.761,  2.145,  2.624,  2.977,   3.787,   4.140],
    [1.341, 1.753,  2.131,  2.602,  2.947,   3.733,   4.073],
    [1.337, 1.746,  2.120,  2.583,  2.921,   3.686,   4.015],
    [1.333, 1.740,  2.110,  2.567,  2.898,   3.646,   3.965],
    [1.330, 1.734,  2.101,  2.552,  2.878,   3.610,   3.922],
    [1.328, 1.729,  2.093,  2.539,  2.861,   3.579,   3.883],
    [1.325, 1.725,  2.086,  2.528,  2.845,   3.552,   3.850],
    [1.323, 1.721,  2.080,  2.518,  2.831,   3.527,   3.819],
    [1.321, 1.717,  2.074,  2.508,  2.819,   3.505,   3.792],
    [1.319, 1.714,  2.069,  2.500,  2.807,   3.485,   3.768],
    [1.318, 1.711,  2.064,  2.492,  2.797,   3.467,   3.745],
    [1.316, 1.708,  2.060,  2.485,  2.787,   3.450,   3.725],
    [1.315, 1.706,  2.056,  2.479,  2.779,   3.435,   3.707],
    [1.314, 1.703,  2.052,  2.473,  2.771,   3.421,   3.689],
    [1.313, 1.701,  2.048,  2.467,  2.763,   3.408,   3.674],
    [1.311, 1.699,  2.045,  2.462,  2.756,   3.396,   3.660],
    [1.310, 1.697,  2.042,  2.457,  2.750,   3.385,   3.646],
];

/// Standard normal CDF at z = 0.00, 0.05, ..., 3.00.
#[rustfmt::skip]
const Z_TABLE: [f64; 61] = [
    0.5,         0.519938806, 0.539827837, 0.559617692, 0.579259709,
    0.598706326, 0.617911422, 0.636830651, 0.655421742, 0.67364478,
    0.691462461, 0.708840313, 0.725746882, 0.742153889, 0.758036348,
    0.773372648, 0.788144601, 0.802337457, 0.815939875, 0.828943874,
    0.841344746, 0.853140944, 0.864333939, 0.874928064, 0.88493033,
    0.894350226, 0.903199515, 0.911492009, 0.919243341, 0.92647074,
    0.933192799, 0.939429242, 0.945200708, 0.950528532, 0.955434537,
    0.959940843, 0.964069681, 0.967843225, 0.97128344,  0.97441194,
    0.977249868, 0.979817785, 0.982135579, 0.984222393, 0.986096552,
    0.987775527, 0.98927589,  0.990613294, 0.991802464, 0.992857189,
    0.993790335, 0.994613854, 0.995338812, 0.995975411, 0.996533026,
    0.997020237, 0.99744487,  0.997814039, 0.998134187, 0.99841113,
    0.998650102,
];

const Z_STEPS_PER_UNIT: f64 = 20.0;
const P_VALUE_CEILING: f64 = 0.999;

/// Critical T value for `df` degrees of freedom, clamped to the table.
#[must_use]
pub fn t_value(df: usize, tail: Tail) -> f64 {
    let row = df.clamp(1, T_TABLE.len()) - 1;
    T_TABLE[row][tail.column()]
}

/// Half-width of the confidence range around a running mean.
///
/// A `sample_size` of 0 is treated as 1.
#[must_use]
pub fn ci_range(sample_size: usize, st_dev: f64, tail: Tail) -> f64 {
    let n = sample_size.max(1);
    t_value(n, tail) * st_dev * (1.0 + 1.0 / n as f64).sqrt()
}

/// Cumulative probability of `|z|` under the standard normal.
#[must_use]
pub fn p_value_from_z(z: f64) -> f64 {
    let z = z.abs();
    if z.is_nan() {
        return Z_TABLE[0];
    }
    let index = (z * Z_STEPS_PER_UNIT).floor();
    if index >= (Z_TABLE.len() - 1) as f64 {
        return P_VALUE_CEILING;
    }
    Z_TABLE[index as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn worked_example_from_module_docs() {
        let range = ci_range(5, 1.0, Tail::P05);
        assert!((range - 2.015 * 1.2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn small_samples_read_the_row_of_their_size() {
        for (n, t) in [(2usize, 2.920), (3, 2.353), (5, 2.015), (30, 1.697)] {
            let expected = t * (1.0 + 1.0 / n as f64).sqrt();
            let range = ci_range(n, 1.0, Tail::P05);
            assert!((range - expected).abs() < 1e-9, "n = {n}: {range}");
        }
    }

    #[test]
    fn sample_sizes_above_thirty_share_the_last_row() {
        let at_30 = t_value(30, Tail::P05);
        assert!((at_30 - 1.697).abs() < 1e-12);
        for n in [31, 45, 1000] {
            let expected = at_30 * 2.0 * (1.0 + 1.0 / n as f64).sqrt();
            assert!((ci_range(n, 2.0, Tail::P05) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn single_sample_uses_first_row() {
        let range = ci_range(1, 1.0, Tail::P05);
        assert!((range - 6.314 * 2f64.sqrt()).abs() < 1e-9);
        assert!((ci_range(0, 1.0, Tail::P05) - range).abs() < 1e-12);
    }

    #[test]
    fn tails_get_wider() {
        let tails = [
            Tail::P10,
            Tail::P05,
            Tail::P025,
            Tail::P01,
            Tail::P005,
            Tail::P001,
            Tail::P0005,
        ];
        for pair in tails.windows(2) {
            assert!(ci_range(10, 1.0, pair[0]) < ci_range(10, 1.0, pair[1]));
        }
    }

    #[test]
    fn p_value_lookup_and_clamp() {
        assert!((p_value_from_z(0.0) - 0.5).abs() < 1e-12);
        assert!((p_value_from_z(1.0) - 0.841_344_746).abs() < 1e-12);
        assert!((p_value_from_z(-1.0) - 0.841_344_746).abs() < 1e-12);
        // 0.07 falls into the 0.05 bucket
        assert!((p_value_from_z(0.07) - 0.519_938_806).abs() < 1e-12);
        assert!((p_value_from_z(2.96) - 0.998_411_13).abs() < 1e-12);
        assert!((p_value_from_z(3.0) - 0.999).abs() < 1e-12);
        assert!((p_value_from_z(40.0) - 0.999).abs() < 1e-12);
        assert!((p_value_from_z(f64::INFINITY) - 0.999).abs() < 1e-12);
        assert!((p_value_from_z(f64::NAN) - 0.5).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn ci_range_is_monotonic_in_stdev(
            n in 0usize..200,
            a in 0.0f64..1000.0,
            b in 0.0f64..1000.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ci_range(n, lo, Tail::P05) <= ci_range(n, hi, Tail::P05));
        }

        #[test]
        fn p_values_stay_in_range(z in -10.0f64..10.0) {
            let p = p_value_from_z(z);
            prop_assert!((0.5..=0.999).contains(&p));
        }
    }
}
