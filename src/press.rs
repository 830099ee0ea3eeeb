//! Press/release debouncing with hysteresis on the pressure proxy

use crate::sampler::Acquisition;

#[cfg(feature = "with_defmt")]
use defmt::Format;

/// Current state of the detector
#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PressState {
    /// Waiting for touch
    #[default]
    Released,
    /// Confirmed touch
    Pressed,
}

impl PressState {
    pub fn is_pressed(self) -> bool {
        self == PressState::Pressed
    }
}

#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug, Clone, Copy)]
pub struct PressDetector {
    press_threshold: u16,
    release_threshold: u16,
    jitter_threshold: u16,
    state: PressState,
}

impl PressDetector {
    pub fn new(press_threshold: u16, release_threshold: u16, jitter_threshold: u16) -> Self {
        Self {
            press_threshold,
            release_threshold,
            jitter_threshold,
            state: PressState::Released,
        }
    }

    pub fn state(&self) -> PressState {
        self.state
    }

    pub fn is_pressed(&self) -> bool {
        self.state.is_pressed()
    }

    pub fn reset(&mut self) {
        self.state = PressState::Released;
    }

    /// Whether the burst was steady enough to trust its X/Y
    pub fn is_stable(&self, acq: &Acquisition) -> bool {
        acq.jitter() <= self.jitter_threshold
    }

    /// Evaluates one sampling cycle and returns the new pressed state
    pub fn update(&mut self, acq: &Acquisition) -> bool {
        let z = acq.sample.z;
        let next = match self.state {
            PressState::Released if z < self.press_threshold && self.is_stable(acq) => {
                PressState::Pressed
            }
            PressState::Pressed if z > self.release_threshold => PressState::Released,
            state => state,
        };
        if next != self.state {
            debug!("touch {:?} -> {:?} (z:{})", self.state, next, z);
            self.state = next;
        }
        self.is_pressed()
    }
}
