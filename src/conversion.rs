//! ADC count to temperature/voltage conversion for the NTC divider.
//!
//! The board measures the node between the thermistor and a fixed resistor:
//!
//! ```text
//! VCC --- NTC --- A0 --- R_fixed --- GND
//! ```
//!
//! so a higher ADC reading means a lower NTC resistance and therefore a higher
//! temperature. Temperatures come from the Beta-parameter model
//! `1/T = 1/T0 + ln(R/R0)/B`.
//!
//! Saturated readings map to `±inf` and arithmetic failures to `NaN`. Neither is
//! an error: [`ThermistorModel::convert`] simply rejects such samples so that
//! aggregation and spectral analysis stay well defined. This loses the
//! information that a saturation event happened; callers only see a count.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Offset between Kelvin and degrees Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

/// `r_ntc` at or below this resistance is treated as a short (reads `+inf`).
const MIN_NTC_OHMS: f64 = 1e-6;

/// `|1/T|` below this is treated as a division by zero (reads `+inf`).
const MIN_INVERSE_KELVIN: f64 = 1e-12;

/// Physical constants of the thermistor divider and the ADC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermistorModel {
    /// Thermistor B-coefficient in Kelvin.
    pub beta: f64,
    /// Nominal NTC resistance at `t0_kelvin`.
    pub r0_ohms: f64,
    /// Reference temperature for `r0_ohms`.
    pub t0_kelvin: f64,
    /// Series resistor between A0 and ground.
    pub r_fixed_ohms: f64,
    /// ADC full-scale count.
    pub adc_max: f64,
    /// Supply voltage across the divider.
    pub vcc: f64,
}

impl Default for ThermistorModel {
    fn default() -> Self {
        Self {
            beta: 3435.0,
            r0_ohms: 10_000.0,
            t0_kelvin: KELVIN_OFFSET + 25.0,
            r_fixed_ohms: 10_000.0,
            adc_max: 1023.0,
            vcc: 5.0,
        }
    }
}

impl ThermistorModel {
    /// Converts a raw ADC count to degrees Celsius.
    ///
    /// Returns `-inf` for a zero reading, `+inf` at or above full scale (and for
    /// the near-short / near-zero guards), and `NaN` if the model produces a
    /// non-finite result for any other reason.
    pub fn adc_to_temperature(&self, raw: u16) -> f64 {
        let raw = f64::from(raw);
        if raw <= 0.0 {
            return f64::NEG_INFINITY;
        }
        if raw >= self.adc_max {
            return f64::INFINITY;
        }

        let r_ntc = self.r_fixed_ohms * (self.adc_max / raw - 1.0);
        if r_ntc <= MIN_NTC_OHMS {
            return f64::INFINITY;
        }

        let inv_t = 1.0 / self.t0_kelvin + (r_ntc / self.r0_ohms).ln() / self.beta;
        if inv_t.abs() < MIN_INVERSE_KELVIN {
            return f64::INFINITY;
        }

        let temp_c = 1.0 / inv_t - KELVIN_OFFSET;
        if !temp_c.is_finite() {
            warn!(raw, r_ntc, inv_t, "Temperature conversion produced a non-finite value");
            return f64::NAN;
        }
        temp_c
    }

    /// Converts a raw ADC count to the voltage across the fixed resistor.
    ///
    /// Counts above full scale are out of range and yield `NaN`.
    pub fn adc_to_voltage(&self, raw: u16) -> f64 {
        let raw = f64::from(raw);
        if raw > self.adc_max {
            return f64::NAN;
        }
        raw / self.adc_max * self.vcc
    }

    /// Converts one raw count and applies the acceptance policy.
    ///
    /// Returns `(temperature_c, voltage_v)` only when the temperature is finite
    /// and the voltage is not `NaN`.
    pub fn convert(&self, raw: u16) -> Option<(f64, f64)> {
        let temperature = self.adc_to_temperature(raw);
        let voltage = self.adc_to_voltage(raw);
        (temperature.is_finite() && !voltage.is_nan()).then_some((temperature, voltage))
    }

    /// Inverse of [`adc_to_temperature`](Self::adc_to_temperature), rounded to the
    /// nearest count and clamped to `1..adc_max - 1`.
    pub fn temperature_to_adc(&self, temperature_c: f64) -> u16 {
        let kelvin = temperature_c + KELVIN_OFFSET;
        let r_ntc = self.r0_ohms * (self.beta * (1.0 / kelvin - 1.0 / self.t0_kelvin)).exp();
        let raw = self.adc_max * self.r_fixed_ohms / (r_ntc + self.r_fixed_ohms);
        raw.round().clamp(1.0, self.adc_max - 1.0) as u16
    }

    /// Rejects constants that would make every conversion meaningless.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("beta", self.beta),
            ("r0_ohms", self.r0_ohms),
            ("t0_kelvin", self.t0_kelvin),
            ("r_fixed_ohms", self.r_fixed_ohms),
            ("adc_max", self.adc_max),
            ("vcc", self.vcc),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("thermistor.{name} must be positive and finite, got {value}"));
            }
        }
        if self.adc_max > f64::from(u16::MAX) {
            return Err(format!(
                "thermistor.adc_max must fit a 16-bit sample, got {}",
                self.adc_max
            ));
        }
        Ok(())
    }
}

/// [`ThermistorModel::adc_to_temperature`] with the default constants.
pub fn adc_to_temperature(raw: u16) -> f64 {
    ThermistorModel::default().adc_to_temperature(raw)
}

/// [`ThermistorModel::adc_to_voltage`] with the default constants.
pub fn adc_to_voltage(raw: u16) -> f64 {
    ThermistorModel::default().adc_to_voltage(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturated_readings_map_to_infinities() {
        assert_eq!(adc_to_temperature(0), f64::NEG_INFINITY);
        assert_eq!(adc_to_temperature(1023), f64::INFINITY);
        assert_eq!(adc_to_temperature(u16::MAX), f64::INFINITY);
    }

    #[test]
    fn temperature_is_finite_and_rises_with_adc_count() {
        let model = ThermistorModel::default();
        let mut previous = model.adc_to_temperature(1);
        assert!(previous.is_finite());
        for raw in 2..1023u16 {
            let t = model.adc_to_temperature(raw);
            assert!(t.is_finite(), "raw {raw} gave {t}");
            assert!(t > previous, "raw {raw}: {t} <= {previous}");
            previous = t;
        }
    }

    #[test]
    fn midpoint_of_matched_divider_is_reference_temperature() {
        // With adc_max = 1022, raw 511 puts exactly R0 across the NTC.
        let model = ThermistorModel {
            adc_max: 1022.0,
            ..Default::default()
        };
        let t = model.adc_to_temperature(511);
        assert!((t - 25.0).abs() < 1e-9, "got {t}");
    }

    #[test]
    fn voltage_is_linear_in_counts() {
        assert_eq!(adc_to_voltage(0), 0.0);
        assert!((adc_to_voltage(1023) - 5.0).abs() < 1e-12);
        let half = adc_to_voltage(512) - adc_to_voltage(0);
        let other_half = adc_to_voltage(1023) - adc_to_voltage(511);
        assert!((half - other_half).abs() < 1e-12);
        assert!(adc_to_voltage(1024).is_nan());
    }

    #[test]
    fn convert_rejects_saturated_samples() {
        let model = ThermistorModel::default();
        assert!(model.convert(0).is_none());
        assert!(model.convert(1023).is_none());
        let (t, v) = model.convert(512).expect("mid-scale reading is valid");
        assert!(t.is_finite());
        assert!((v - 512.0 / 1023.0 * 5.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_constants_yield_nan_not_panic() {
        // R == R0 with beta == 0 makes ln(1)/0 = 0/0.
        let model = ThermistorModel {
            beta: 0.0,
            adc_max: 1022.0,
            ..Default::default()
        };
        assert!(model.adc_to_temperature(511).is_nan());
        assert!(model.convert(511).is_none());
        assert!(model.validate().is_err());
    }

    #[test]
    fn temperature_to_adc_inverts_conversion() {
        let model = ThermistorModel::default();
        for target in [0.0, 25.0, 37.0, 60.0] {
            let raw = model.temperature_to_adc(target);
            let back = model.adc_to_temperature(raw);
            assert!((back - target).abs() < 0.2, "{target} -> {raw} -> {back}");
        }
    }

    #[test]
    fn validate_rejects_non_finite_constants() {
        let model = ThermistorModel {
            vcc: f64::NAN,
            ..Default::default()
        };
        let err = model.validate().unwrap_err();
        assert!(err.contains("thermistor.vcc"));
        assert!(ThermistorModel::default().validate().is_ok());
    }
}
