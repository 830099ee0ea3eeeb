//! Driver configuration and tuning constants.
//!
//! The thresholds below are panel dependent. The defaults suit the common
//! 2.4"-3.2" resistive modules; expect to tune `press_threshold`,
//! `release_threshold` and `jitter_threshold` for other panels.

use crate::{
    auxiliary::Conversion,
    calibration::{CalibrationTargets, MAX_DWELL_CYCLES},
    error::ConfigError,
    sampler::MAX_FILTER_SAMPLES,
    transform::Direction,
};
use embedded_graphics_core::geometry::Size;

/// Inset of the default corner targets, in pixels
pub const DEFAULT_TARGET_INSET: u32 = 10;

#[cfg_attr(feature = "with_defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Repeated reads per channel, reduced with a median. Must be odd.
    pub filter_samples: usize,
    /// Pressure proxy below which a release turns into a press
    pub press_threshold: u16,
    /// Pressure proxy above which a press turns into a release
    pub release_threshold: u16,
    /// Largest peak-to-peak X/Y spread within one burst that still counts as steady
    pub jitter_threshold: u16,
    /// Consecutive steady pressed cycles needed to capture a calibration target
    pub dwell_cycles: usize,
    /// Bus polls allowed per calibration step before giving up
    pub poll_budget: u32,
    /// Re-prompts allowed per calibration target
    pub target_retries: u8,
    /// Pause between calibration polls
    pub poll_interval_us: u32,
    pub conversion: Conversion,
    /// `None` uses the screen corners inset by [`DEFAULT_TARGET_INSET`]
    pub targets: Option<CalibrationTargets>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filter_samples: 5,
            press_threshold: 3500,
            release_threshold: 4500,
            jitter_threshold: 64,
            dwell_cycles: 5,
            poll_budget: 2000,
            target_retries: 3,
            poll_interval_us: 5_000,
            conversion: Conversion::default(),
            targets: None,
        }
    }
}

impl Settings {
    pub fn validate(&self, screen: Size) -> Result<(), ConfigError> {
        if self.filter_samples == 0
            || self.filter_samples > MAX_FILTER_SAMPLES
            || self.filter_samples % 2 == 0
        {
            return Err(ConfigError::FilterWindow);
        }
        if self.release_threshold <= self.press_threshold {
            return Err(ConfigError::Thresholds);
        }
        if self.dwell_cycles == 0 || self.dwell_cycles > MAX_DWELL_CYCLES {
            return Err(ConfigError::DwellWindow);
        }
        if !self.conversion.is_valid() {
            return Err(ConfigError::Conversion);
        }
        self.targets_for(screen).validate(screen)
    }

    pub(crate) fn targets_for(&self, screen: Size) -> CalibrationTargets {
        self.targets
            .clone()
            .unwrap_or_else(|| CalibrationTargets::corners(screen, DEFAULT_TARGET_INSET))
    }
}

/// Everything [`Xpt2046::init`](crate::Xpt2046::init) needs
#[derive(Debug)]
pub struct DriverConfig<T, IRQ = ()> {
    pub transport: T,
    /// PENIRQ line, `()` when not wired
    pub irq: IRQ,
    pub width: u16,
    pub height: u16,
    pub direction: Direction,
    /// Make the next [`calibration_run`](crate::Xpt2046::calibration_run)
    /// ignore any stored transform
    pub force_calibration: bool,
    pub settings: Settings,
}

impl<T, IRQ> DriverConfig<T, IRQ> {
    pub fn new(transport: T, irq: IRQ, width: u16, height: u16) -> Self {
        Self {
            transport,
            irq,
            width,
            height,
            direction: Direction::Deg0,
            force_calibration: false,
            settings: Settings::default(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn force_calibration(mut self, force: bool) -> Self {
        self.force_calibration = force;
        self
    }

    pub fn screen(&self) -> Size {
        Size::new(u32::from(self.width), u32::from(self.height))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        self.settings.validate(self.screen())
    }
}
