#![doc(html_root_url = "https://docs.rs/xpt2046-touch")]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_variables,
    unreachable_code,
    unused_comparisons,
    unused_imports,
    unused_must_use
)]
#![cfg_attr(not(test), no_std)]

//! A platform agnostic Rust driver for the XPT2046 resistive touch controller,
//! based on the [`embedded-hal`](https://github.com/rust-embedded/embedded-hal)
//! traits.
//!
//! The driver turns bursts of noisy 12-bit ADC readings into a median
//! filtered [`RawSample`], debounces press/release with hysteresis on the
//! pressure channel, and maps raw readings to display pixels with a
//! [`CalibrationTransform`] obtained from an interactive crosshair
//! calibration. The controller's temperature, battery and auxiliary inputs
//! are read through the same bus.
//!
//! ```ignore
//! let transport = SpiTransport::new(spi_bus, touch_cs)?;
//! let config = DriverConfig::new(transport, (), 320, 240).with_direction(Direction::Deg0);
//! let mut touch = Xpt2046::init(config)?;
//!
//! touch.calibration_run(&mut display, &mut delay, false)?;
//!
//! loop {
//!     let point = touch.sample()?;
//!     if point.pressed {
//!         // point.x, point.y are display pixels
//!     }
//!     delay.delay_ms(10);
//! }
//! ```
//!
//! All operations are blocking and bounded; the caller drives sampling on
//! its own cadence. The driver is not internally synchronised, share it
//! between contexts behind your own mutex.

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod auxiliary;
pub mod calibration;
pub mod config;
pub mod error;
pub mod irq;
pub mod press;
pub mod sampler;
pub mod store;
pub mod transform;
pub mod transport;

pub use crate::{
    calibration::{CalibrationTargets, Calibrator, Progress, TargetDisplay},
    config::{DriverConfig, Settings},
    error::{BusError, CalibrationError, ConfigError, Error},
    irq::{IrqPin, PenIrq},
    press::PressState,
    sampler::{Acquisition, RawSample},
    store::{CalibrationStore, StorageSlot},
    transform::{CalibrationTransform, Direction},
    transport::{DeviceTransport, SpiTransport, Transport},
};

use crate::{press::PressDetector, sampler::Sampler};
use embedded_graphics_core::geometry::Size;
use embedded_hal::delay::DelayNs;

#[cfg(feature = "with_defmt")]
use defmt::Format;

/// Result of one [`Xpt2046::sample`] call
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    /// Display pixel column
    pub x: u16,
    /// Display pixel row
    pub y: u16,
    /// Debounced press state. While released, `x` and `y` hold the last
    /// position of the previous press.
    pub pressed: bool,
}

#[derive(Debug)]
pub struct Xpt2046<T, IRQ = ()> {
    /// The SPI transport
    transport: T,
    /// PENIRQ line
    irq: IRQ,
    screen: Size,
    direction: Direction,
    calibration: CalibrationTransform,
    /// Next calibration run ignores the current transform
    force_calibration: bool,
    settings: Settings,
    sampler: Sampler,
    detector: PressDetector,
    /// Last pressed position, in pixels
    last_point: (u16, u16),
    /// `last_point` came from a steady burst of the current press
    point_steady: bool,
}

impl<T, IRQ> Xpt2046<T, IRQ>
where
    T: Transport,
    IRQ: PenIrq,
{
    /// Validates `config`, takes the transport and makes a throwaway
    /// measurement so the power down bits are left with PENIRQ enabled.
    /// Does not calibrate.
    pub fn init(config: DriverConfig<T, IRQ>) -> Result<Self, Error<T::Error>> {
        config.validate()?;
        let screen = config.screen();
        let DriverConfig {
            transport,
            irq,
            direction,
            force_calibration,
            settings,
            ..
        } = config;

        let mut touch = Self {
            transport,
            irq,
            screen,
            direction,
            calibration: CalibrationTransform::UNCALIBRATED,
            force_calibration,
            sampler: Sampler::new(settings.filter_samples),
            detector: PressDetector::new(
                settings.press_threshold,
                settings.release_threshold,
                settings.jitter_threshold,
            ),
            settings,
            last_point: (0, 0),
            point_steady: false,
        };
        touch.with_bus(|sampler, transport| sampler.acquire(transport))?;

        debug!(
            "xpt2046 up: {}x{} {:?}",
            touch.screen.width,
            touch.screen.height,
            touch.direction
        );
        Ok(touch)
    }

    /// Gives the transport and PENIRQ line back. Run [`Xpt2046::init`] again
    /// to start over with fresh state.
    pub fn deinit(self) -> (T, IRQ) {
        debug!("xpt2046 down");
        (self.transport, self.irq)
    }

    /// Masks PENIRQ for the duration of a bus transaction
    fn with_bus<R>(
        &mut self,
        f: impl FnOnce(&Sampler, &mut T) -> Result<R, T::Error>,
    ) -> Result<R, Error<T::Error>> {
        self.irq.disable_interrupt();
        let res = f(&self.sampler, &mut self.transport);
        self.irq.enable_interrupt();
        res.map_err(|e| {
            warn!("touch controller transaction failed");
            Error::Bus(e)
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        debug!("direction {:?} -> {:?}", self.direction, direction);
        self.direction = direction;
    }

    pub fn screen(&self) -> Size {
        self.screen
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current transform, [`CalibrationTransform::UNCALIBRATED`] until one is
    /// set or calibrated
    pub fn calibration(&self) -> CalibrationTransform {
        self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_valid()
    }

    /// Restores a transform persisted elsewhere. The uncalibrated sentinel is
    /// accepted and drops the current calibration.
    pub fn set_calibration(
        &mut self,
        transform: CalibrationTransform,
    ) -> Result<(), Error<T::Error>> {
        if !transform.is_uncalibrated() && !transform.is_valid() {
            return Err(Error::Config(ConfigError::Transform));
        }
        self.calibration = transform;
        Ok(())
    }

    pub fn press_state(&self) -> PressState {
        self.detector.state()
    }

    pub fn is_stable(&self, acquisition: &Acquisition) -> bool {
        self.detector.is_stable(acquisition)
    }

    /// One filtered acquisition, fed through the press detector
    pub fn poll(&mut self) -> Result<Acquisition, Error<T::Error>> {
        let acquisition = self.with_bus(|sampler, transport| sampler.acquire(transport))?;
        let was_pressed = self.detector.is_pressed();
        if self.detector.update(&acquisition) && !was_pressed {
            // new press, the stored position belongs to the previous one
            self.point_steady = false;
        }
        Ok(acquisition)
    }

    /// Median filtered X, Y and pressure, without touching the press state
    pub fn read_raw(&mut self) -> Result<RawSample, Error<T::Error>> {
        let acquisition = self.with_bus(|sampler, transport| sampler.acquire(transport))?;
        Ok(acquisition.sample)
    }

    /// Debounced press state. Reads the panel unless PENIRQ already tells
    /// us it is untouched; a failed read keeps the last known state.
    pub fn is_pressed(&mut self) -> bool {
        if !self.detector.is_pressed() && self.irq.pen_down() == Some(false) {
            return false;
        }
        // the failure is already logged by with_bus
        let _ = self.poll();
        self.detector.is_pressed()
    }

    /// Reads the panel and maps the press to display pixels. Once a press
    /// has produced a steady burst, jittery bursts keep that position.
    pub fn sample(&mut self) -> Result<TouchPoint, Error<T::Error>> {
        if !self.detector.is_pressed() && self.irq.pen_down() == Some(false) {
            return Ok(self.touch_point(false));
        }

        let acquisition = self.poll()?;
        let pressed = self.detector.is_pressed();
        let stable = self.detector.is_stable(&acquisition);
        if pressed && (stable || !self.point_steady) {
            self.last_point = transform::to_pixel(
                &acquisition.sample,
                &self.calibration,
                self.direction,
                self.screen,
            );
            self.point_steady = stable;
        }
        Ok(self.touch_point(pressed))
    }

    fn touch_point(&self, pressed: bool) -> TouchPoint {
        TouchPoint {
            x: self.last_point.0,
            y: self.last_point.1,
            pressed,
        }
    }

    /// Die temperature in degrees Celsius
    pub fn read_temp_c(&mut self) -> Result<f32, Error<T::Error>> {
        let conversion = self.settings.conversion;
        self.with_bus(|sampler, transport| auxiliary::read_temp_c(sampler, &conversion, transport))
    }

    /// Voltage on the VBAT input, undoing the internal divider
    pub fn read_batt_v(&mut self) -> Result<f32, Error<T::Error>> {
        let conversion = self.settings.conversion;
        self.with_bus(|sampler, transport| auxiliary::read_batt_v(sampler, &conversion, transport))
    }

    /// Voltage on the AUX input
    pub fn read_aux_v(&mut self) -> Result<f32, Error<T::Error>> {
        let conversion = self.settings.conversion;
        self.with_bus(|sampler, transport| auxiliary::read_aux_v(sampler, &conversion, transport))
    }

    /// A fresh calibration state machine over the configured targets
    pub fn calibrator(&self) -> Calibrator {
        Calibrator::new(self.settings.targets_for(self.screen), &self.settings)
    }

    fn needs_calibration(&self, force: bool) -> bool {
        force || self.force_calibration || !self.calibration.is_valid()
    }

    /// Runs the interactive calibration, blocking until every target was
    /// captured or the run gave up.
    ///
    /// Without `force` (and without
    /// [`DriverConfig::force_calibration`]) an existing valid transform is
    /// returned straight away and the display is left alone. A failed run
    /// leaves the previous transform in place.
    pub fn calibration_run<D, DELAY>(
        &mut self,
        display: &mut D,
        delay: &mut DELAY,
        force: bool,
    ) -> Result<CalibrationTransform, Error<T::Error>>
    where
        D: TargetDisplay,
        DELAY: DelayNs,
    {
        if !self.needs_calibration(force) {
            info!("touch panel already calibrated");
            return Ok(self.calibration);
        }

        let mut calibrator = self.calibrator();
        let transform = loop {
            match calibrator.poll(self, display)? {
                Progress::Complete(transform) => break transform,
                Progress::Pending => delay.delay_us(self.settings.poll_interval_us),
            }
        };

        self.calibration = transform;
        self.force_calibration = false;
        Ok(transform)
    }

    /// Adopts a valid transform from `store`. Returns whether one was found.
    pub fn load_calibration<S: CalibrationStore>(&mut self, store: &mut S) -> Result<bool, S::Error> {
        match store.load()? {
            Some(transform) if transform.is_valid() => {
                info!("calibration restored from store");
                self.calibration = transform;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// [`calibration_run`](Self::calibration_run) backed by a store: a stored
    /// transform skips the interactive run unless forced, and a fresh one is
    /// saved. A store that cannot be read or written is logged and otherwise
    /// ignored, the in-memory calibration stays authoritative.
    pub fn calibration_run_with_store<D, DELAY, S>(
        &mut self,
        display: &mut D,
        delay: &mut DELAY,
        store: &mut S,
        force: bool,
    ) -> Result<CalibrationTransform, Error<T::Error>>
    where
        D: TargetDisplay,
        DELAY: DelayNs,
        S: CalibrationStore,
    {
        if !self.needs_calibration(force) {
            return Ok(self.calibration);
        }
        if !force && !self.force_calibration && self.load_calibration(store).is_err() {
            warn!("calibration store unreadable");
        }
        let interactive = self.needs_calibration(force);

        let transform = self.calibration_run(display, delay, force)?;
        if interactive && store.save(&transform).is_err() {
            warn!("could not persist calibration");
        }
        Ok(transform)
    }
}
