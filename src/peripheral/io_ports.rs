//! General-purpose IO ports 0 (3 pins) and 1 (7 pins).
//!
//! A set direction bit makes a pin an input.  An input pin takes the level
//! the host drives it to, or when released, the level of the resistor the
//! two control registers select.  An output pin reads back its data latch
//! and presents a high level to the chip.
//!
//! Port 0 pins 0..2 are wired to the external interrupt inputs EXI1..EXI3,
//! so turning an undriven pin without a pull-up into an input gives a
//! falling edge.

use super::{ClockDomain, Peripheral, PeripheralContext, Region};
use crate::error::ChipsetError;

pub const P0D: u16 = 0xF048;
pub const P0MOD: u16 = 0xF049;
pub const P0CON0: u16 = 0xF04A;
pub const P0CON1: u16 = 0xF04B;
pub const P0DIR: u16 = 0xF04C;

pub const P1D: u16 = 0xF220;
pub const P1DIR: u16 = 0xF221;
pub const P1CON0: u16 = 0xF222;
pub const P1CON1: u16 = 0xF223;
pub const P1MOD0: u16 = 0xF224;
pub const P1MOD1: u16 = 0xF225;

pub const PORT0_PINS: usize = 3;
pub const PORT1_PINS: usize = 7;

const PINS: [usize; 2] = [PORT0_PINS, PORT1_PINS];

/// What the host does to one port pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PinInput {
    /// Nothing drives the pin.
    #[default]
    Released,
    Driven(bool),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortInputs {
    pub port0: [PinInput; PORT0_PINS],
    pub port1: [PinInput; PORT1_PINS],
}

impl PortInputs {
    pub fn get(&self, port: usize, pin: usize) -> Option<PinInput> {
        match port {
            0 => self.port0.get(pin).copied(),
            1 => self.port1.get(pin).copied(),
            _ => None,
        }
    }

    pub fn set(&mut self, port: usize, pin: usize, input: PinInput) -> Result<(), ChipsetError> {
        let slot = match port {
            0 => self.port0.get_mut(pin),
            1 => self.port1.get_mut(pin),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = input;
                Ok(())
            }
            None => Err(ChipsetError::InvalidPortPin { port, pin }),
        }
    }
}

// ── One port ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Port {
    mask: u8,
    /// Data latch.  Written even while the pin is an input.
    output: u8,
    direction: u8,
    control0: u8,
    control1: u8,
    /// Level the chip sees on each pin.
    input: u8,
}

impl Port {
    fn new(pins: usize) -> Self {
        let mask = ((1u16 << pins) - 1) as u8;
        Self {
            mask,
            output: 0,
            direction: 0,
            control0: 0,
            control1: 0,
            input: mask,
        }
    }

    fn read_data(&self) -> u8 {
        ((self.input & self.direction) | (self.output & !self.direction)) & self.mask
    }

    fn is_input(&self, pin: usize) -> bool {
        self.direction & (1 << pin) != 0
    }

    fn set_input(&mut self, pin: usize, level: bool) {
        if level {
            self.input |= 1 << pin;
        } else {
            self.input &= !(1 << pin);
        }
    }

    fn resolve(&self, pin: usize, input: PinInput) -> bool {
        let bit = 1 << pin;
        match input {
            PinInput::Driven(level) => level,
            PinInput::Released => {
                // CON0:CON1 = 0:1 pull-up, 1:0 pull-down, else high impedance.
                self.control0 & bit == 0 && self.control1 & bit != 0
            }
        }
    }
}

// ── Peripheral ───────────────────────────────────────────────

pub struct IoPorts {
    ports: [Port; 2],
    port0_mode: u8,
    port1_mode0: u8,
    port1_mode1: u8,
    has_port1_mode1: bool,
}

impl IoPorts {
    pub fn new(has_port1_mode1: bool) -> Self {
        Self {
            ports: [Port::new(PORT0_PINS), Port::new(PORT1_PINS)],
            port0_mode: 0,
            port1_mode0: 0,
            port1_mode1: 0,
            has_port1_mode1,
        }
    }

    /// Level the chip sees on `pin` of `port`.
    pub fn input_level(&self, port: usize, pin: usize) -> Option<bool> {
        let p = self.ports.get(port)?;
        (pin < PINS[port]).then(|| p.input & (1 << pin) != 0)
    }

    fn drive(&mut self, port: usize, pin: usize, level: bool, ctx: &mut PeripheralContext) {
        self.ports[port].set_input(pin, level);
        if port == 0 {
            ctx.set_pin_level(pin + 1, level);
        }
    }

    /// Recompute the level of input pin `pin`.  Output pins are left alone.
    fn accept(&mut self, port: usize, pin: usize, ctx: &mut PeripheralContext) {
        if !self.ports[port].is_input(pin) {
            return;
        }
        let input = ctx.state.port_inputs.get(port, pin).unwrap_or_default();
        let level = self.ports[port].resolve(pin, input);
        self.drive(port, pin, level, ctx);
    }

    fn accept_all(&mut self, port: usize, ctx: &mut PeripheralContext) {
        for pin in 0..PINS[port] {
            self.accept(port, pin, ctx);
        }
    }

    fn write_control(&mut self, port: usize, which: usize, data: u8, ctx: &mut PeripheralContext) {
        let p = &mut self.ports[port];
        let data = data & p.mask;
        if which == 0 {
            p.control0 = data;
        } else {
            p.control1 = data;
        }
        self.accept_all(port, ctx);
    }

    fn write_direction(&mut self, port: usize, data: u8, ctx: &mut PeripheralContext) {
        let p = &mut self.ports[port];
        let data = data & p.mask;
        let changed = data ^ p.direction;
        p.direction = data;
        for pin in 0..PINS[port] {
            if changed & (1 << pin) == 0 {
                continue;
            }
            if data & (1 << pin) != 0 {
                self.accept(port, pin, ctx);
            } else {
                self.drive(port, pin, true, ctx);
            }
        }
    }
}

impl Peripheral for IoPorts {
    fn name(&self) -> &'static str {
        "IoPorts"
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::Always
    }

    fn regions(&self) -> Vec<Region> {
        let port1 = if self.has_port1_mode1 { 6 } else { 5 };
        vec![
            Region::new(P0D, 5, "IOPorts/Port0"),
            Region::new(P1D, port1, "IOPorts/Port1"),
        ]
    }

    fn read(&mut self, address: u16, _ctx: &mut PeripheralContext) -> u8 {
        let [p0, p1] = &self.ports;
        match address {
            P0D => p0.read_data(),
            P0MOD => self.port0_mode,
            P0CON0 => p0.control0,
            P0CON1 => p0.control1,
            P0DIR => p0.direction,
            P1D => p1.read_data(),
            P1DIR => p1.direction,
            P1CON0 => p1.control0,
            P1CON1 => p1.control1,
            P1MOD0 => self.port1_mode0,
            P1MOD1 => self.port1_mode1,
            _ => 0,
        }
    }

    fn write(&mut self, address: u16, data: u8, ctx: &mut PeripheralContext) {
        match address {
            P0D => self.ports[0].output = data & self.ports[0].mask,
            P0MOD => self.port0_mode = data & 0x01,
            P0CON0 => self.write_control(0, 0, data, ctx),
            P0CON1 => self.write_control(0, 1, data, ctx),
            P0DIR => self.write_direction(0, data, ctx),
            P1D => self.ports[1].output = data & self.ports[1].mask,
            P1DIR => self.write_direction(1, data, ctx),
            P1CON0 => self.write_control(1, 0, data, ctx),
            P1CON1 => self.write_control(1, 1, data, ctx),
            P1MOD0 => self.port1_mode0 = data & 0x7F,
            P1MOD1 => self.port1_mode1 = data & 0x7F,
            _ => {}
        }
    }

    fn reset(&mut self, ctx: &mut PeripheralContext) {
        self.ports = [Port::new(PORT0_PINS), Port::new(PORT1_PINS)];
        self.port0_mode = 0;
        self.port1_mode0 = 0;
        self.port1_mode1 = 0;
        for pin in 0..PORT0_PINS {
            ctx.set_pin_level(pin + 1, true);
        }
    }

    /// Follow host input changes.
    fn tick(&mut self, ctx: &mut PeripheralContext) {
        self.accept_all(0, ctx);
        self.accept_all(1, ctx);
    }
}
