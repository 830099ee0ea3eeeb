//! Interactive N-point calibration.
//!
//! A crosshair is drawn at each target, the user presses it until the press
//! has dwelt for a few consecutive cycles, and the median raw reading of the
//! dwell window is paired with the target's pixel position. Once every target
//! has a pair, two independent per-axis least-squares fits give the
//! [`CalibrationTransform`]. Rotation is not part of the fit, the
//! [`Direction`](crate::Direction) permutation is applied to the raw samples
//! before they are captured.
//!
//! [`Calibrator`] is the explicit state machine behind
//! [`Xpt2046::calibration_run`]. Drive it yourself with [`Calibrator::poll`]
//! from an event loop when blocking is not an option; it can be cancelled at
//! any point and never touches the driver's current transform.

use crate::{
    config::Settings,
    error::{AbortReason, Axis, CalibrationError, ConfigError, Error, FitError},
    irq::PenIrq,
    sampler::RAW_MAX,
    transform::CalibrationTransform,
    transport::Transport,
    Xpt2046,
};
use embedded_graphics::{
    primitives::{Line, Primitive, PrimitiveStyle},
    Drawable,
};
use embedded_graphics_core::{
    draw_target::DrawTarget,
    geometry::{Point, Size},
    pixelcolor::RgbColor,
};
use heapless::Vec;
use num_traits::Float;

#[cfg(feature = "with_defmt")]
use defmt::Format;

pub const MAX_TARGETS: usize = 5;
pub const MAX_DWELL_CYCLES: usize = 16;

/// Smallest accepted |pixels per raw step|. Anything flatter means the panel
/// did not register the difference between targets.
pub const MIN_SCALE: f32 = 1e-3;

/// Pixel positions the user is asked to press, in order
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTargets {
    points: Vec<Point, MAX_TARGETS>,
}

impl CalibrationTargets {
    /// The four corners, pulled in by `inset` pixels
    pub fn corners(screen: Size, inset: u32) -> Self {
        let inset = inset as i32;
        let right = screen.width as i32 - inset;
        let bottom = screen.height as i32 - inset;
        let mut points = Vec::new();
        for p in [
            Point::new(inset, inset),
            Point::new(right, inset),
            Point::new(inset, bottom),
            Point::new(right, bottom),
        ] {
            let _ = points.push(p);
        }
        Self { points }
    }

    /// Adds the screen centre as a final target. Fails when
    /// [`MAX_TARGETS`] targets are already present.
    pub fn with_center(mut self, screen: Size) -> Result<Self, ConfigError> {
        self.points
            .push(Point::new(
                screen.width as i32 / 2,
                screen.height as i32 / 2,
            ))
            .map_err(|_| ConfigError::Targets)?;
        Ok(self)
    }

    pub fn from_points(points: &[Point]) -> Result<Self, ConfigError> {
        if points.len() < 2 {
            return Err(ConfigError::Targets);
        }
        let points = Vec::from_slice(points).map_err(|_| ConfigError::Targets)?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// At least two targets, all on screen, spread over both axes
    pub(crate) fn validate(&self, screen: Size) -> Result<(), ConfigError> {
        let on_screen = |p: &Point| {
            p.x >= 0 && p.y >= 0 && (p.x as u32) < screen.width && (p.y as u32) < screen.height
        };
        let first = self.points.first().copied().unwrap_or_default();
        let spans_x = self.points.iter().any(|p| p.x != first.x);
        let spans_y = self.points.iter().any(|p| p.y != first.y);
        if self.points.len() < 2 || !self.points.iter().all(on_screen) || !spans_x || !spans_y {
            return Err(ConfigError::Targets);
        }
        Ok(())
    }
}

/// One captured target: median raw reading and the pixel it should map to
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationPair {
    pub raw: Point,
    pub display: Point,
}

fn fit_axis(pairs: &[CalibrationPair], axis: Axis) -> Result<(f32, f32), FitError> {
    let coords = |p: &CalibrationPair| match axis {
        Axis::X => (p.raw.x as f32, p.display.x as f32),
        Axis::Y => (p.raw.y as f32, p.display.y as f32),
    };
    let n = pairs.len() as f32;
    let (sum_raw, sum_px) = pairs.iter().map(coords).fold((0.0, 0.0), |acc, (r, p)| {
        (acc.0 + r, acc.1 + p)
    });
    let (mean_raw, mean_px) = (sum_raw / n, sum_px / n);

    // centred sums keep the f32 products small
    let (mut sxx, mut sxy) = (0.0f32, 0.0f32);
    for (r, p) in pairs.iter().map(coords) {
        let dr = r - mean_raw;
        sxx += dr * dr;
        sxy += dr * (p - mean_px);
    }
    if sxx == 0.0 {
        return Err(FitError::Degenerate(axis));
    }

    let scale = sxy / sxx;
    let offset = mean_px - scale * mean_raw;
    if !scale.is_finite() || !offset.is_finite() || Float::abs(scale) < MIN_SCALE {
        return Err(FitError::Degenerate(axis));
    }
    Ok((scale, offset))
}

/// Least-squares per-axis fit; exact for two pairs
pub fn solve(pairs: &[CalibrationPair]) -> Result<CalibrationTransform, FitError> {
    if pairs.len() < 2 {
        return Err(FitError::TooFewPoints);
    }
    let (scale_x, offset_x) = fit_axis(pairs, Axis::X)?;
    let (scale_y, offset_y) = fit_axis(pairs, Axis::Y)?;
    Ok(CalibrationTransform {
        scale_x,
        offset_x,
        scale_y,
        offset_y,
    })
}

/// What the calibration needs from the screen
pub trait TargetDisplay {
    type Error;

    fn clear_screen(&mut self) -> Result<(), Self::Error>;

    /// Replaces whatever is shown with a target centred on `at`
    fn draw_target(&mut self, at: Point) -> Result<(), Self::Error>;
}

/// White crosshair on black for any RGB `embedded-graphics` display
impl<DT> TargetDisplay for DT
where
    DT: DrawTarget,
    DT::Color: RgbColor,
{
    type Error = DT::Error;

    fn clear_screen(&mut self) -> Result<(), Self::Error> {
        self.clear(DT::Color::BLACK)
    }

    fn draw_target(&mut self, at: Point) -> Result<(), Self::Error> {
        self.clear(DT::Color::BLACK)?;
        let style = PrimitiveStyle::with_stroke(DT::Color::WHITE, 1);
        Line::new(Point::new(at.x - 4, at.y), Point::new(at.x + 4, at.y))
            .into_styled(style)
            .draw(self)?;
        Line::new(Point::new(at.x, at.y - 4), Point::new(at.x, at.y + 4))
            .into_styled(style)
            .draw(self)?;
        Ok(())
    }
}

#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationState {
    /// Target `i` still has to be drawn
    AwaitTarget(usize),
    /// Target `i` is shown, waiting for the press detector
    AwaitPress(usize),
    /// Collecting consecutive stable pressed samples for target `i`
    Dwelling(usize),
    /// Waiting for the finger to lift before moving on to target `i`.
    /// Every run starts here with `i = 0`.
    AwaitRelease(usize),
    Done(CalibrationTransform),
    Failed(CalibrationError),
}

#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Pending,
    Complete(CalibrationTransform),
}

#[derive(Debug, Clone)]
pub struct Calibrator {
    targets: CalibrationTargets,
    dwell_cycles: usize,
    poll_budget: u32,
    target_retries: u8,
    state: CalibrationState,
    polls: u32,
    retries: u8,
    dwell: Vec<Point, MAX_DWELL_CYCLES>,
    pairs: Vec<CalibrationPair, MAX_TARGETS>,
}

impl Calibrator {
    pub fn new(targets: CalibrationTargets, settings: &Settings) -> Self {
        Self {
            targets,
            dwell_cycles: settings.dwell_cycles.clamp(1, MAX_DWELL_CYCLES),
            poll_budget: settings.poll_budget,
            target_retries: settings.target_retries,
            // a finger still down from whatever started the run must lift first
            state: CalibrationState::AwaitRelease(0),
            polls: 0,
            retries: 0,
            dwell: Vec::new(),
            pairs: Vec::new(),
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Pairs captured so far
    pub fn pairs(&self) -> &[CalibrationPair] {
        &self.pairs
    }

    pub fn cancel(&mut self) {
        if !matches!(self.state, CalibrationState::Done(_)) {
            info!("calibration cancelled");
            self.state = CalibrationState::Failed(CalibrationError::Aborted(AbortReason::Cancelled));
        }
    }

    fn fail<E>(&mut self, e: CalibrationError) -> Error<E> {
        warn!("calibration failed: {:?}", e);
        self.state = CalibrationState::Failed(e);
        Error::Calibration(e)
    }

    /// A broken or unusable capture: prompt target `i` again, once `next`
    /// has been reached
    fn retry<E>(&mut self, i: usize, next: CalibrationState) -> Result<Progress, Error<E>> {
        self.retries = self.retries.saturating_add(1);
        if self.retries > self.target_retries {
            return Err(self.fail(CalibrationError::Aborted(AbortReason::RetriesExhausted)));
        }
        debug!("re-prompting target {} ({} retries)", i, self.retries);
        self.polls = 0;
        self.state = next;
        Ok(Progress::Pending)
    }

    fn dwell_median(&self) -> Point {
        let mut xs: Vec<i32, MAX_DWELL_CYCLES> = self.dwell.iter().map(|p| p.x).collect();
        let mut ys: Vec<i32, MAX_DWELL_CYCLES> = self.dwell.iter().map(|p| p.y).collect();
        xs.sort_unstable();
        ys.sort_unstable();
        Point::new(xs[xs.len() / 2], ys[ys.len() / 2])
    }

    /// Advances by at most one bus acquisition
    pub fn poll<T, IRQ, D>(
        &mut self,
        touch: &mut Xpt2046<T, IRQ>,
        display: &mut D,
    ) -> Result<Progress, Error<T::Error>>
    where
        T: Transport,
        IRQ: PenIrq,
        D: TargetDisplay,
    {
        let i = match self.state {
            CalibrationState::Done(transform) => return Ok(Progress::Complete(transform)),
            CalibrationState::Failed(e) => return Err(Error::Calibration(e)),
            CalibrationState::AwaitTarget(i) => {
                let target = self.targets.points()[i];
                info!(
                    "calibration target {}/{} at ({}, {})",
                    i + 1,
                    self.targets.len(),
                    target.x,
                    target.y
                );
                if display.draw_target(target).is_err() {
                    return Err(self.fail(CalibrationError::Display));
                }
                self.polls = 0;
                self.dwell.clear();
                self.state = CalibrationState::AwaitPress(i);
                return Ok(Progress::Pending);
            }
            CalibrationState::AwaitPress(i)
            | CalibrationState::Dwelling(i)
            | CalibrationState::AwaitRelease(i) => i,
        };

        self.polls += 1;
        if self.polls > self.poll_budget {
            return Err(self.fail(CalibrationError::Aborted(AbortReason::Timeout)));
        }

        let acq = touch.poll()?;
        let pressed = touch.press_state().is_pressed();
        let stable = touch.is_stable(&acq);
        let (x, y) = touch.direction().apply(acq.sample.x, acq.sample.y);
        let raw = Point::new(i32::from(x), i32::from(y));

        match self.state {
            CalibrationState::AwaitPress(_) if pressed => {
                self.dwell.clear();
                if stable {
                    let _ = self.dwell.push(raw);
                }
                self.state = CalibrationState::Dwelling(i);
            }
            CalibrationState::Dwelling(_) if !pressed => {
                debug!("press on target {} lifted before dwell completed", i);
                return self.retry(i, CalibrationState::AwaitTarget(i));
            }
            CalibrationState::Dwelling(_) if !stable => {
                // moving finger, start the dwell window over
                self.dwell.clear();
            }
            CalibrationState::Dwelling(_) => {
                let _ = self.dwell.push(raw);
                if self.dwell.len() < self.dwell_cycles {
                    return Ok(Progress::Pending);
                }
                let captured = self.dwell_median();
                let on_rail = |v: i32| v <= 0 || v >= i32::from(RAW_MAX);
                if on_rail(captured.x) || on_rail(captured.y) {
                    debug!("target {} captured on an ADC rail", i);
                    return self.retry(i, CalibrationState::AwaitRelease(i));
                }
                let pair = CalibrationPair {
                    raw: captured,
                    display: self.targets.points()[i],
                };
                debug!("target {} raw ({}, {})", i, pair.raw.x, pair.raw.y);
                let _ = self.pairs.push(pair);
                if display.clear_screen().is_err() {
                    return Err(self.fail(CalibrationError::Display));
                }
                self.retries = 0;
                self.polls = 0;
                self.state = CalibrationState::AwaitRelease(i + 1);
            }
            CalibrationState::AwaitRelease(next) if !pressed => {
                if next < self.targets.len() {
                    self.state = CalibrationState::AwaitTarget(next);
                } else {
                    let transform = solve(&self.pairs)
                        .map_err(|e| self.fail::<T::Error>(e.into()))?;
                    info!(
                        "calibration done x: {} * raw + {}, y: {} * raw + {}",
                        transform.scale_x,
                        transform.offset_x,
                        transform.scale_y,
                        transform.offset_y
                    );
                    self.state = CalibrationState::Done(transform);
                    return Ok(Progress::Complete(transform));
                }
            }
            _ => {}
        }
        Ok(Progress::Pending)
    }
}
