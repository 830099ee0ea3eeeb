//! Optional PENIRQ line.
//!
//! `embedded-hal` does not expose any generic interface for working with
//! EXTI interrupts, so the driver takes the line through this trait. The
//! controller's datasheet asks for PENIRQ to be masked whenever a control
//! byte is being sent, otherwise the line glitches low during conversions
//! and triggers a spurious interrupt. The driver calls
//! [`PenIrq::disable_interrupt`] before and [`PenIrq::enable_interrupt`]
//! after every transaction.
//!
//! Wire a board without a PENIRQ connection with `()`:
//!
//! ```ignore
//! let config = DriverConfig::new(transport, (), 320, 240);
//! ```
//!
//! or an interrupt capable GPIO with your own implementation:
//!
//! ```ignore
//! struct MyIrq(Input<'static>);
//!
//! impl PenIrq for MyIrq {
//!     fn pen_down(&mut self) -> Option<bool> {
//!         Some(self.0.is_low())
//!     }
//!     fn disable_interrupt(&mut self) {
//!         self.0.unlisten();
//!     }
//!     fn enable_interrupt(&mut self) {
//!         self.0.clear_interrupt();
//!         self.0.listen(Event::FallingEdge);
//!     }
//! }
//! ```

use embedded_hal::digital::InputPin;

pub trait PenIrq {
    /// `Some(true)` while the panel is touched, `None` when unknown
    fn pen_down(&mut self) -> Option<bool>;

    fn disable_interrupt(&mut self) {}

    fn enable_interrupt(&mut self) {}
}

/// No PENIRQ line: every query goes to the bus
impl PenIrq for () {
    fn pen_down(&mut self) -> Option<bool> {
        None
    }
}

/// Plain active-low input pin without interrupt control
#[derive(Debug)]
pub struct IrqPin<P>(pub P);

impl<P: InputPin> PenIrq for IrqPin<P> {
    fn pen_down(&mut self) -> Option<bool> {
        // A pin read failure just means we fall back to the bus.
        self.0.is_low().ok()
    }
}
