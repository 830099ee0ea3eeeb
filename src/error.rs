//! Error definition for the crate

use core::fmt;

#[cfg(feature = "with_defmt")]
use defmt::{Format, Formatter};

/// Failure of the [`SpiTransport`](crate::transport::SpiTransport) bus/chip-select pair
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug)]
pub enum BusError<SPIError, CSError> {
    Spi(SPIError),
    Pin(CSError),
}

/// Axis of a one dimensional calibration fit
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// The captured calibration pairs do not describe a usable mapping
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitError {
    /// Fewer than two captured targets
    TooFewPoints,
    /// No raw variation along the axis, or a near zero / non finite scale
    Degenerate(Axis),
}

/// Why an interactive calibration run stopped before every target was captured
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// [`Calibrator::cancel`](crate::calibration::Calibrator::cancel) was called
    Cancelled,
    /// A target did not see a stable press within its poll budget
    Timeout,
    /// A target was re-prompted too many times
    RetriesExhausted,
}

#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// The user did not complete the target sequence
    Aborted(AbortReason),
    /// The solved transform is degenerate
    Failed(FitError),
    /// The display collaborator refused to draw a target
    Display,
}

/// Invalid [`DriverConfig`](crate::config::DriverConfig)
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Screen width or height is zero
    ZeroDimension,
    /// Median window must be odd and within `1..=MAX_FILTER_SAMPLES`
    FilterWindow,
    /// Release threshold must lie above the press threshold
    Thresholds,
    /// Dwell window must be within `1..=MAX_DWELL_CYCLES`
    DwellWindow,
    /// Fewer than two calibration targets, or a target off screen
    Targets,
    /// Conversion constants must be finite and positive
    Conversion,
    /// A calibration transform with a zero or non finite scale
    Transform,
}

#[derive(Debug)]
pub enum Error<E> {
    /// SPI bus error
    Bus(E),
    /// Error when running or solving the calibration
    Calibration(CalibrationError),
    /// Rejected configuration
    Config(ConfigError),
}

impl<E> From<CalibrationError> for Error<E> {
    fn from(e: CalibrationError) -> Self {
        Error::Calibration(e)
    }
}

impl<E> From<ConfigError> for Error<E> {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<FitError> for CalibrationError {
    fn from(e: FitError) -> Self {
        CalibrationError::Failed(e)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "x",
            Axis::Y => "y",
        })
    }
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitError::TooFewPoints => f.write_str("at least two targets are needed"),
            FitError::Degenerate(axis) => write!(f, "degenerate fit on the {} axis", axis),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AbortReason::Cancelled => "cancelled",
            AbortReason::Timeout => "timed out waiting for a press",
            AbortReason::RetriesExhausted => "target retries exhausted",
        })
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Aborted(reason) => write!(f, "calibration {}", reason),
            CalibrationError::Failed(e) => write!(f, "calibration failed: {}", e),
            CalibrationError::Display => f.write_str("display refused to draw calibration target"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::ZeroDimension => "screen dimensions must be non-zero",
            ConfigError::FilterWindow => "median window must be odd and within limits",
            ConfigError::Thresholds => "release threshold must exceed press threshold",
            ConfigError::DwellWindow => "dwell window out of range",
            ConfigError::Targets => "calibration targets invalid",
            ConfigError::Conversion => "conversion constants must be positive",
            ConfigError::Transform => "calibration transform has a zero or non-finite scale",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "with_defmt")]
impl<E> Format for Error<E> {
    fn format(&self, fmt: Formatter) {
        match self {
            Error::Bus(_) => defmt::write!(fmt, "Bus error"),
            Error::Calibration(e) => defmt::write!(fmt, "Calibration error: {}", e),
            Error::Config(e) => defmt::write!(fmt, "Config error: {}", e),
        }
    }
}
