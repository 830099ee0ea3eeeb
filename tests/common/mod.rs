#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::{DrawTarget, OriginDimensions, Point, Size},
    Pixel,
};
use embedded_hal::{delay::DelayNs, digital};
use xpt2046_touch::{DriverConfig, Transport};

/// Bus failure reported by the simulated controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nack;

/// Firm contact: pressure proxy is x / 2
pub const FIRM_Z1: u16 = 2000;
pub const FIRM_Z2: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub x: u16,
    pub y: u16,
    pub z1: u16,
    pub z2: u16,
}

impl Contact {
    pub fn firm(x: u16, y: u16) -> Self {
        Self {
            x,
            y,
            z1: FIRM_Z1,
            z2: FIRM_Z2,
        }
    }
}

/// What the simulated finger does
pub enum User {
    /// Nobody touches the panel
    Away,
    Fixed(Contact),
    /// Presses wherever a target is shown, lifts while the screen is blank.
    /// With `hold`, the finger lifts after that many acquisitions on a target.
    FollowScreen {
        to_raw: Box<dyn Fn(Point) -> (u16, u16)>,
        hold: Option<usize>,
    },
}

pub struct PanelState {
    pub user: User,
    pub temp0: u16,
    pub temp1: u16,
    pub vbat: u16,
    pub aux: u16,
    /// Overrides for the next X conversions, one value each
    pub x_overrides: VecDeque<u16>,
    pub fail: bool,
    pub transfers: usize,
    held: usize,
    seen_generation: u32,
    screen: ScreenState,
}

#[derive(Debug, Default)]
pub struct ScreenInner {
    pub shown: Option<Point>,
    pub generation: u32,
    pub clears: usize,
    pub draws: usize,
    min: Option<Point>,
    max: Option<Point>,
}

pub type ScreenState = Rc<RefCell<ScreenInner>>;

#[derive(Clone)]
pub struct FakePanel(pub Rc<RefCell<PanelState>>);

impl FakePanel {
    pub fn new(screen: &Screen) -> Self {
        Self(Rc::new(RefCell::new(PanelState {
            user: User::Away,
            temp0: 1000,
            temp1: 1190,
            vbat: 2048,
            aux: 1024,
            x_overrides: VecDeque::new(),
            fail: false,
            transfers: 0,
            held: 0,
            seen_generation: 0,
            screen: screen.0.clone(),
        })))
    }

    pub fn set_user(&self, user: User) {
        self.0.borrow_mut().user = user;
    }

    pub fn transfers(&self) -> usize {
        self.0.borrow().transfers
    }

    pub fn set_fail(&self, fail: bool) {
        self.0.borrow_mut().fail = fail;
    }
}

impl PanelState {
    fn contact(&mut self) -> Option<Contact> {
        match &self.user {
            User::Away => None,
            User::Fixed(c) => Some(*c),
            User::FollowScreen { to_raw, hold } => {
                let screen = self.screen.borrow();
                let target = screen.shown?;
                if screen.generation != self.seen_generation {
                    self.seen_generation = screen.generation;
                    self.held = 0;
                }
                self.held += 1;
                if matches!(hold, Some(limit) if self.held > *limit) {
                    return None;
                }
                let (x, y) = to_raw(target);
                Some(Contact::firm(x, y))
            }
        }
    }

    fn channel(&mut self, channel: u8, contact: Option<Contact>) -> u16 {
        match channel {
            0b000 => self.temp0,
            0b111 => self.temp1,
            0b010 => self.vbat,
            0b110 => self.aux,
            0b001 => {
                let x = contact.map_or(0, |c| c.x);
                self.x_overrides.pop_front().unwrap_or(x)
            }
            0b101 => contact.map_or(0, |c| c.y),
            0b011 => contact.map_or(0, |c| c.z1),
            0b100 => contact.map_or(4095, |c| c.z2),
            _ => unreachable!(),
        }
    }
}

impl Transport for FakePanel {
    type Error = Nack;

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Nack> {
        assert_eq!(read.len(), write.len());
        assert_eq!(write.len() % 2, 1, "chained transfers have 2n + 1 bytes");

        let mut state = self.0.borrow_mut();
        state.transfers += 1;
        if state.fail {
            return Err(Nack);
        }

        let n = (write.len() - 1) / 2;
        let first = (u16::from_be_bytes([write[0], write[1]]) >> 5) as u8;
        let position = matches!((first >> 4) & 0b111, 0b001 | 0b011 | 0b100 | 0b101);
        let contact = if position { state.contact() } else { None };

        read.fill(0);
        for i in 0..n {
            let cmd = (u16::from_be_bytes([write[2 * i], write[2 * i + 1]]) >> 5) as u8;
            assert_eq!(cmd & 0x80, 0x80, "start bit");
            let value = state.channel((cmd >> 4) & 0b111, contact).min(4095);
            let [hi, lo] = value.to_be_bytes();
            read[2 * i + 1] = hi;
            read[2 * i + 2] = lo;
        }
        Ok(())
    }
}

/// Records what the calibration draws and tells the simulated finger where
/// the current target is.
#[derive(Clone, Default)]
pub struct Screen(pub ScreenState);

impl Screen {
    pub fn clears(&self) -> usize {
        self.0.borrow().clears
    }

    pub fn draws(&self) -> usize {
        self.0.borrow().draws
    }

    pub fn shown(&self) -> Option<Point> {
        self.0.borrow().shown
    }
}

impl OriginDimensions for Screen {
    fn size(&self) -> Size {
        Size::new(320, 240)
    }
}

impl DrawTarget for Screen {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let mut s = self.0.borrow_mut();
        for Pixel(p, _) in pixels {
            s.draws += 1;
            let min = s.min.map_or(p, |m| Point::new(m.x.min(p.x), m.y.min(p.y)));
            let max = s.max.map_or(p, |m| Point::new(m.x.max(p.x), m.y.max(p.y)));
            s.min = Some(min);
            s.max = Some(max);
            s.shown = Some(Point::new((min.x + max.x) / 2, (min.y + max.y) / 2));
        }
        s.generation += 1;
        Ok(())
    }

    fn clear(&mut self, _color: Self::Color) -> Result<(), Self::Error> {
        let mut s = self.0.borrow_mut();
        s.clears += 1;
        s.shown = None;
        s.min = None;
        s.max = None;
        Ok(())
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Active-low PENIRQ stand-in
pub struct Pin(pub Rc<RefCell<bool>>);

impl digital::ErrorType for Pin {
    type Error = Infallible;
}

impl digital::InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!*self.0.borrow())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(*self.0.borrow())
    }
}

pub fn setup() -> (FakePanel, Screen) {
    let screen = Screen::default();
    let panel = FakePanel::new(&screen);
    (panel, screen)
}

pub fn config(panel: &FakePanel) -> DriverConfig<FakePanel, ()> {
    DriverConfig::new(panel.clone(), (), 320, 240)
}

/// Raw readings that are exact linear images of the corner targets:
/// (10,10)->(300,300), (310,10)->(3700,300), (10,230)->(300,3700), (310,230)->(3700,3700)
pub fn corner_mapping(p: Point) -> (u16, u16) {
    let x = 300 + (p.x - 10) * 3400 / 300;
    let y = 300 + (p.y - 10) * 3400 / 220;
    (x as u16, y as u16)
}
