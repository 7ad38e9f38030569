// Dhtwire - Interrupt-driven DHT22 decoder and read-out service
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::sensor::core::{AcquisitionError, Direction, EdgeCallback, ErrorKind, GpioLine, Level};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;

/// Highest BCM GPIO number broken out on the 40 pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Which transitions on the data line are delivered to the edge callback.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum EdgeTrigger {
    Both,
    Falling,
    Rising,
}

impl EdgeTrigger {
    fn as_trigger(self) -> Trigger {
        match self {
            EdgeTrigger::Both => Trigger::Both,
            EdgeTrigger::Falling => Trigger::FallingEdge,
            EdgeTrigger::Rising => Trigger::RisingEdge,
        }
    }
}

impl FromStr for EdgeTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "both" => Ok(EdgeTrigger::Both),
            "falling" => Ok(EdgeTrigger::Falling),
            "rising" => Ok(EdgeTrigger::Rising),
            _ => Err(format!("unknown edge trigger '{}', expected 'both', 'falling', or 'rising'", s)),
        }
    }
}

impl fmt::Display for EdgeTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EdgeTrigger::Both => write!(f, "both"),
            EdgeTrigger::Falling => write!(f, "falling"),
            EdgeTrigger::Rising => write!(f, "rising"),
        }
    }
}

enum PinHandle {
    Output(OutputPin),
    Input(InputPin),
    Detached,
}

/// `GpioLine` for a Raspberry Pi GPIO pin.
///
/// `rppal` models input and output pins as different types so changing direction
/// means giving the pin back to the controller and acquiring it again in the other
/// mode. Pins are never reset when dropped so the line keeps its level in between.
pub struct RppalLine {
    gpio: Gpio,
    bcm_pin: u8,
    trigger: EdgeTrigger,
    handle: PinHandle,
}

impl RppalLine {
    fn reacquire(&mut self, direction: Direction) -> Result<(), AcquisitionError> {
        // A pin can only be held once, release the current handle first
        self.handle = PinHandle::Detached;

        let pin = self.gpio.get(self.bcm_pin).map_err(|e| {
            AcquisitionError::KindMsgCause(
                ErrorKind::ReservationFailed,
                "unable to acquire pin from controller",
                Box::new(e),
            )
        })?;

        self.handle = match direction {
            Direction::Output => {
                let mut out = pin.into_output();
                out.set_reset_on_drop(false);
                PinHandle::Output(out)
            }
            Direction::Input => {
                let mut input = pin.into_input();
                input.set_reset_on_drop(false);
                PinHandle::Input(input)
            }
        };

        Ok(())
    }
}

impl GpioLine for RppalLine {
    fn pin(&self) -> u8 {
        self.bcm_pin
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), AcquisitionError> {
        match (direction, &self.handle) {
            (Direction::Output, PinHandle::Output(_)) | (Direction::Input, PinHandle::Input(_)) => Ok(()),
            _ => self.reacquire(direction),
        }
    }

    fn set_output(&mut self, level: Level) -> Result<(), AcquisitionError> {
        self.set_direction(Direction::Output)?;
        if let PinHandle::Output(out) = &mut self.handle {
            out.write(level);
        }

        Ok(())
    }

    fn arm_edge_interrupt(&mut self, mut callback: EdgeCallback) -> Result<(), AcquisitionError> {
        self.set_direction(Direction::Input)?;
        let trigger = self.trigger.as_trigger();

        if let PinHandle::Input(input) = &mut self.handle {
            input
                .set_async_interrupt(trigger, move |_level| callback())
                .map_err(|e| {
                    AcquisitionError::KindMsgCause(
                        ErrorKind::ReservationFailed,
                        "unable to register edge interrupt",
                        Box::new(e),
                    )
                })?;
        }

        Ok(())
    }

    fn disarm_edge_interrupt(&mut self) -> Result<(), AcquisitionError> {
        match &mut self.handle {
            PinHandle::Input(input) => input.clear_async_interrupt().map_err(|e| {
                AcquisitionError::KindMsgCause(
                    ErrorKind::ReservationFailed,
                    "unable to clear edge interrupt",
                    Box::new(e),
                )
            }),
            _ => Ok(()),
        }
    }
}

impl Debug for RppalLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mode = match self.handle {
            PinHandle::Output(_) => "output",
            PinHandle::Input(_) => "input",
            PinHandle::Detached => "detached",
        };

        f.debug_struct("RppalLine")
            .field("bcm_pin", &self.bcm_pin)
            .field("trigger", &self.trigger)
            .field("mode", &mode)
            .finish()
    }
}

/// Reserve the data line of a sensor based on its BCM GPIO pin number, leaving
/// it as an output driven high (the idle state of the bus).
///
/// Note that the BCM GPIO pin number is NOT the same as the physical pin number.
/// See [pinout] for more information.
///
/// [pinout]: https://www.raspberrypi.com/documentation/computers/os.html#gpio-and-the-40-pin-header
pub fn open_line(bcm_gpio_pin: u8, trigger: EdgeTrigger) -> Result<RppalLine, AcquisitionError> {
    if bcm_gpio_pin > MAX_BCM_PIN {
        return Err(AcquisitionError::KindMsg(
            ErrorKind::InvalidGpio,
            "BCM GPIO pin number is not on the header",
        ));
    }

    let gpio = Gpio::new().map_err(|e| {
        AcquisitionError::KindMsgCause(
            ErrorKind::ReservationFailed,
            "unable to create GPIO controller",
            Box::new(e),
        )
    })?;

    let mut line = RppalLine {
        gpio,
        bcm_pin: bcm_gpio_pin,
        trigger,
        handle: PinHandle::Detached,
    };

    line.set_output(Level::High)?;
    Ok(line)
}
