//! Fixed-width time bins for display.
//!
//! Bins are only used to draw the temperature and voltage traces with error
//! bars; spectral and stability analysis always see the unbinned series.

use crate::series::Series;
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean and population standard deviation of one time bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    /// Center of the bin, relative to the first sample.
    pub center_time_s: f64,
    pub count: usize,
    pub temp_mean: f64,
    pub temp_std: f64,
    pub volt_mean: f64,
    pub volt_std: f64,
}

/// Welford accumulator for mean and population variance.
#[derive(Debug, Default, Clone, Copy)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn population_std(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }
}

/// Partitions the series into `[k*width, (k+1)*width)` bins measured from the
/// first sample and summarizes every non-empty bin.
///
/// Samples stamped before the first sample (possible when block timing
/// jitters) fall outside every bin and are ignored. Empty bins are skipped.
pub fn aggregate(series: &Series, width_s: f64) -> Vec<Bin> {
    let Some(&origin) = series.timestamps().first() else {
        return Vec::new();
    };
    if !(width_s.is_finite() && width_s > 0.0) {
        return Vec::new();
    }

    // Keyed by bin index so memory follows the sample count, not the time span.
    let mut bins: BTreeMap<u64, (RunningStats, RunningStats)> = BTreeMap::new();
    for sample in series.samples() {
        let relative = sample.time_s - origin;
        if relative < 0.0 {
            continue;
        }
        let index = (relative / width_s).floor() as u64;
        let (temp, volt) = bins.entry(index).or_default();
        temp.push(sample.temperature_c);
        volt.push(sample.voltage_v);
    }

    bins.into_iter()
        .map(|(index, (temp, volt))| Bin {
            center_time_s: (index as f64 + 0.5) * width_s,
            count: temp.count,
            temp_mean: temp.mean,
            temp_std: temp.population_std(),
            volt_mean: volt.mean,
            volt_std: volt.population_std(),
        })
        .collect()
}
