// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The frame layer (C3): byte-level send/receive, checksum, ack/nack
//! handling, and half-duplex echo suppression on top of a [`Transport`].
//!
//! Echo suppression is handled here, not by string-matching further up in
//! the protocol engine: every `send` that expects an echo consumes exactly
//! as many echo bytes as it wrote before the caller sees a real response.

use crate::error::Error;
use crate::protocol::constants::{ACK, BUSY, NACK};
use crate::transport::Transport;
use std::time::Duration;

/// UART wiring mode, detected once per session on a UART transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartMode {
    /// No echo: host TX and RX are independent lines.
    FullDuplex,
    /// The target echoes every received byte unchanged.
    Reply,
    /// The target echoes every received byte bitwise inverted.
    TwoWire,
}

/// The physical interface in use for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Uart(UartMode),
    Spi,
}

/// The target's acknowledgement to a transaction phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ack,
    Nack,
}

/// Default per-byte timeout (§4.3).
pub const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(100);
/// Default timeout for a full response (§4.3).
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Delay between SPI BUSY polls (§5).
pub const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct FrameLayer<'t> {
    transport: &'t mut dyn Transport,
    interface: Interface,
    byte_timeout: Duration,
    response_timeout: Duration,
}

impl<'t> FrameLayer<'t> {
    pub fn new(transport: &'t mut dyn Transport, interface: Interface) -> Self {
        Self {
            transport,
            interface,
            byte_timeout: DEFAULT_BYTE_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }

    pub fn set_interface(&mut self, interface: Interface) {
        self.interface = interface;
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport
    }

    /// Sets a response timeout that overrides the default for the final
    /// ACK of a long operation (mass erase, §4.4).
    pub fn with_response_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.response_timeout = timeout;
        self
    }

    pub fn reset_response_timeout(&mut self) {
        self.response_timeout = DEFAULT_RESPONSE_TIMEOUT;
    }

    fn recv_byte(&mut self, timeout: Duration) -> Result<u8, Error> {
        let bytes = self.transport.recv(1, timeout)?;
        bytes.first().copied().ok_or(Error::ResponseTimeout)
    }

    fn consume_echo(&mut self, byte: u8) -> Result<(), Error> {
        let expected = match self.interface {
            Interface::Uart(UartMode::Reply) => byte,
            Interface::Uart(UartMode::TwoWire) => !byte,
            Interface::Uart(UartMode::FullDuplex) | Interface::Spi => return Ok(()),
        };
        let echoed = self.recv_byte(self.byte_timeout)?;
        if echoed != expected {
            return Err(Error::ResponseUnexpected { byte: echoed });
        }
        Ok(())
    }

    pub(crate) fn send_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.transport.send(&[byte])?;
        self.consume_echo(byte)
    }

    /// Writes `cmd` then its bitwise complement, consuming echoes as
    /// required by the current interface.
    pub fn send_command(&mut self, cmd: u8) -> Result<(), Error> {
        self.send_byte(cmd)?;
        self.send_byte(!cmd)
    }

    /// Writes `bytes` followed by the XOR of all payload bytes.
    pub fn send_payload(&mut self, bytes: &[u8]) -> Result<(), Error> {
        for &b in bytes {
            self.send_byte(b)?;
        }
        let checksum = bytes.iter().fold(0u8, |acc, &b| acc ^ b);
        self.send_byte(checksum)
    }

    /// Polls out `BUSY` bytes (SPI only) until a real response byte
    /// arrives, then interprets it as an ACK/NACK.
    pub fn expect_ack(&mut self) -> Result<Ack, Error> {
        let byte = loop {
            let byte = self.recv_byte(self.response_timeout)?;
            if self.interface == Interface::Spi && byte == BUSY {
                std::thread::sleep(BUSY_POLL_INTERVAL);
                continue;
            }
            break byte;
        };
        match byte {
            ACK => Ok(Ack::Ack),
            NACK => Ok(Ack::Nack),
            other => Err(Error::ResponseUnexpected { byte: other }),
        }
    }

    /// Reads exactly `n` bytes of real payload (never BUSY/ACK framing).
    pub fn recv_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let bytes = self.transport.recv(n, self.response_timeout)?;
        if bytes.len() != n {
            return Err(Error::ResponseTimeout);
        }
        Ok(bytes)
    }
}
