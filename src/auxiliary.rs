//! Temperature, battery and auxiliary voltage channels.
//!
//! These are single-ended conversions against the reference voltage and never
//! pass through the touch calibration.

use crate::{
    sampler::{Sampler, CMD_AUX, CMD_TEMP0, CMD_TEMP1, CMD_VBAT},
    transport::Transport,
};

#[cfg(feature = "with_defmt")]
use defmt::Format;

const ADC_STEPS: f32 = 4096.0;
const KELVIN_OFFSET: f32 = 273.15;

/// Linear conversion constants for the auxiliary channels
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    /// Reference voltage, 2.5V for the internal reference
    pub vref_v: f32,
    /// The VBAT input goes through an internal 1/4 divider
    pub battery_divider: f32,
    /// Slope of the two-point (TEMP1 - TEMP0) diode measurement
    pub temp_k_per_mv: f32,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            vref_v: 2.5,
            battery_divider: 4.0,
            temp_k_per_mv: 2.573,
        }
    }
}

impl Conversion {
    pub fn is_valid(&self) -> bool {
        [self.vref_v, self.battery_divider, self.temp_k_per_mv]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    pub fn volts(&self, raw: u16) -> f32 {
        f32::from(raw) * self.vref_v / ADC_STEPS
    }

    pub fn battery_volts(&self, raw: u16) -> f32 {
        self.volts(raw) * self.battery_divider
    }

    pub fn celsius(&self, temp0: u16, temp1: u16) -> f32 {
        let delta_mv = (self.volts(temp1) - self.volts(temp0)) * 1000.0;
        delta_mv * self.temp_k_per_mv - KELVIN_OFFSET
    }
}

pub(crate) fn read_temp_c<T: Transport>(
    sampler: &Sampler,
    conversion: &Conversion,
    transport: &mut T,
) -> Result<f32, T::Error> {
    let [t0, t1] = sampler.burst(transport, &[CMD_TEMP0, CMD_TEMP1], true)?;
    Ok(conversion.celsius(t0.median, t1.median))
}

pub(crate) fn read_batt_v<T: Transport>(
    sampler: &Sampler,
    conversion: &Conversion,
    transport: &mut T,
) -> Result<f32, T::Error> {
    let [vbat] = sampler.burst(transport, &[CMD_VBAT], true)?;
    Ok(conversion.battery_volts(vbat.median))
}

pub(crate) fn read_aux_v<T: Transport>(
    sampler: &Sampler,
    conversion: &Conversion,
    transport: &mut T,
) -> Result<f32, T::Error> {
    let [aux] = sampler.burst(transport, &[CMD_AUX], true)?;
    Ok(conversion.volts(aux.median))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b) * (a - b) < 1e-4
    }

    #[test]
    fn voltage_scales_with_reference() {
        let c = Conversion::default();
        assert!(close(c.volts(2048), 1.25));
        assert!(close(c.battery_volts(2048), 5.0));
        assert!(close(c.volts(0), 0.0));
    }

    #[test]
    fn two_point_temperature() {
        let c = Conversion::default();
        // 190 steps of 0.6104mV, ~116mV between the diode readings
        let t = c.celsius(1000, 1190);
        assert!(t > 24.0 && t < 26.0, "{}", t);
    }

    #[test]
    fn rejects_non_positive_constants() {
        assert!(Conversion::default().is_valid());
        let c = Conversion {
            vref_v: 0.0,
            ..Conversion::default()
        };
        assert!(!c.is_valid());
    }
}
