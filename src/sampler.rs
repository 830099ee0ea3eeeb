//! Raw channel acquisition.
//!
//! For information on the operation of the XPT2046, refer to the XPT2046 data
//! sheet <https://www.snapeda.com/parts/XPT2046/Xptek/datasheet/>. The control
//! byte (Table 6) consists of 1 start bit, 3 channel select bits, 1 mode bit,
//! 1 single-ended/differential select bit and 2 power down mode select bits.
//!
//! Position and pressure channels are read differentially with the ADC powered
//! down between conversions and PENIRQ kept enabled (`PD = 00`). Temperature,
//! battery and auxiliary inputs are single-ended against the internal
//! reference, which must stay on for the conversion (`PD = 11`).
//!
//! A new conversion can start every 16 clocks, while the result of a
//! conversion only completes 5 clocks into the next one. Delaying each control
//! byte by 3 bits in the transmit stream lines every 12-bit result up with a
//! big-endian byte pair in the receive stream, so `n` chained conversions take
//! `2n + 1` bytes and need no shifting on the way back.

use crate::transport::Transport;
use heapless::Vec;

#[cfg(feature = "with_defmt")]
use defmt::Format;

pub(crate) const CMD_X: u8 = 0b1_001_0_0_00;
pub(crate) const CMD_Y: u8 = 0b1_101_0_0_00;
pub(crate) const CMD_Z1: u8 = 0b1_011_0_0_00;
pub(crate) const CMD_Z2: u8 = 0b1_100_0_0_00;
pub(crate) const CMD_TEMP0: u8 = 0b1_000_0_1_11;
pub(crate) const CMD_TEMP1: u8 = 0b1_111_0_1_11;
pub(crate) const CMD_VBAT: u8 = 0b1_010_0_1_11;
pub(crate) const CMD_AUX: u8 = 0b1_110_0_1_11;

/// Full scale of a 12-bit conversion
pub const RAW_MAX: u16 = 0x0FFF;

/// Largest median window the sampler supports
pub const MAX_FILTER_SAMPLES: usize = 7;

const POSITION_CHAIN: [u8; 4] = [CMD_Z1, CMD_Z2, CMD_X, CMD_Y];
// one extra slot for the trailing power down conversion
const MAX_COMMANDS: usize = POSITION_CHAIN.len() * MAX_FILTER_SAMPLES + 1;
const MAX_BUF_LEN: usize = 2 * MAX_COMMANDS + 1;

/// One instantaneous, median filtered controller read
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub x: u16,
    pub y: u16,
    /// Touch resistance proxy. Lower means a firmer press, `u16::MAX` means no contact
    pub z: u16,
}

/// A raw sample together with how much X and Y wandered across the burst
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    pub sample: RawSample,
    pub spread_x: u16,
    pub spread_y: u16,
}

impl Acquisition {
    pub fn jitter(&self) -> u16 {
        self.spread_x.max(self.spread_y)
    }
}

/// Median and peak-to-peak range of one channel over a burst
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Channel {
    pub median: u16,
    pub spread: u16,
}

/// Touch resistance proxy from the Z1/Z2 cross-plate measurements,
/// `x * (z2 / z1 - 1)` in raw units.
pub fn pressure(x: u16, z1: u16, z2: u16) -> u16 {
    if z1 == 0 {
        return u16::MAX;
    }
    let z = u32::from(x) * u32::from(z2.saturating_sub(z1)) / u32::from(z1);
    u16::try_from(z).unwrap_or(u16::MAX)
}

pub(crate) fn channel(column: &mut [u16]) -> Channel {
    if column.is_empty() {
        return Channel::default();
    }
    column.sort_unstable();
    Channel {
        median: column[column.len() / 2],
        spread: column[column.len() - 1] - column[0],
    }
}

/// Issues `commands` as one chained transfer and decodes one result per command
fn transact<T: Transport>(
    transport: &mut T,
    commands: &[u8],
    results: &mut [u16],
) -> Result<(), T::Error> {
    let len = 2 * commands.len() + 1;
    let mut tx = [0u8; MAX_BUF_LEN];
    let mut rx = [0u8; MAX_BUF_LEN];

    for (i, cmd) in commands.iter().enumerate() {
        let bytes = (u16::from(*cmd) << 5).to_be_bytes();
        tx[2 * i] = bytes[0];
        tx[2 * i + 1] = bytes[1];
    }

    transport.transfer(&mut rx[..len], &tx[..len])?;

    for (i, result) in results.iter_mut().enumerate().take(commands.len()) {
        *result = u16::from_be_bytes([rx[2 * i + 1], rx[2 * i + 2]]) & RAW_MAX;
    }
    Ok(())
}

/// Repeated-read median filter over the controller's channels
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    window: usize,
}

impl Sampler {
    /// `window` is clamped into `1..=MAX_FILTER_SAMPLES`
    pub fn new(window: usize) -> Self {
        Self {
            window: window.clamp(1, MAX_FILTER_SAMPLES),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Reads `chain` `window` times inside a single transfer and reduces each
    /// channel to its median.
    pub(crate) fn burst<T: Transport, const C: usize>(
        &self,
        transport: &mut T,
        chain: &[u8; C],
        power_down: bool,
    ) -> Result<[Channel; C], T::Error> {
        let mut commands: Vec<u8, MAX_COMMANDS> = Vec::new();
        for _ in 0..self.window {
            // C never exceeds the position chain, so this always fits
            let _ = commands.extend_from_slice(chain);
        }
        if power_down {
            let _ = commands.push(CMD_X);
        }

        let mut results = [0u16; MAX_COMMANDS];
        transact(transport, &commands, &mut results)?;

        let mut channels = [Channel::default(); C];
        for (c, out) in channels.iter_mut().enumerate() {
            let mut column = [0u16; MAX_FILTER_SAMPLES];
            for (r, slot) in column.iter_mut().enumerate().take(self.window) {
                *slot = results[r * C + c];
            }
            *out = channel(&mut column[..self.window]);
        }
        Ok(channels)
    }

    /// X, Y and pressure, all from the same chip-select window
    pub fn acquire<T: Transport>(&self, transport: &mut T) -> Result<Acquisition, T::Error> {
        let [z1, z2, x, y] = self.burst(transport, &POSITION_CHAIN, false)?;
        let acquisition = Acquisition {
            sample: RawSample {
                x: x.median,
                y: y.median,
                z: pressure(x.median, z1.median, z2.median),
            },
            spread_x: x.spread,
            spread_y: y.spread,
        };
        trace!(
            "raw x:{} y:{} z:{} jitter:{}",
            acquisition.sample.x,
            acquisition.sample.y,
            acquisition.sample.z,
            acquisition.jitter()
        );
        Ok(acquisition)
    }
}
