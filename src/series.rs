//! The append-only record of one acquisition run.

use crate::conversion::ThermistorModel;
use crate::protocol::Block;
use crate::timing::sample_times;
use serde::Serialize;

/// One accepted measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time_s: f64,
    pub temperature_c: f64,
    pub voltage_v: f64,
}

/// Parallel timestamp / temperature / voltage sequences.
///
/// The acquisition loop owns the series while it grows; afterwards it is moved
/// into the run result and analyzers only ever see slices of it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Series {
    timestamps: Vec<f64>,
    temperatures: Vec<f64>,
    voltages: Vec<f64>,
    rejected: usize,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample if its temperature is finite and its voltage is not `NaN`.
    ///
    /// Rejected samples are only counted.
    pub fn push(&mut self, time_s: f64, temperature_c: f64, voltage_v: f64) -> bool {
        if !temperature_c.is_finite() || voltage_v.is_nan() {
            self.rejected += 1;
            return false;
        }
        self.timestamps.push(time_s);
        self.temperatures.push(temperature_c);
        self.voltages.push(voltage_v);
        true
    }

    /// Converts and timestamps every sample of `block`, returning how many were accepted.
    pub fn ingest_block(&mut self, block: &Block, arrival_s: f64, model: &ThermistorModel) -> usize {
        let times = sample_times(arrival_s, block.duration_micros, block.raw_samples.len());
        let before = self.len();
        for (time_s, &raw) in times.zip(&block.raw_samples) {
            self.push(
                time_s,
                model.adc_to_temperature(raw),
                model.adc_to_voltage(raw),
            );
        }
        self.len() - before
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    pub fn voltages(&self) -> &[f64] {
        &self.voltages
    }

    /// Samples dropped by the acceptance policy.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Time between the first and last accepted sample.
    pub fn elapsed_s(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.timestamps
            .iter()
            .zip(&self.temperatures)
            .zip(&self.voltages)
            .map(|((&time_s, &temperature_c), &voltage_v)| Sample {
                time_s,
                temperature_c,
                voltage_v,
            })
    }
}
