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

//! The byte-level transport contract. Opening, configuring, and driving the
//! actual UART/SPI device is outside this crate; callers provide an
//! implementation of [`Transport`] (a serial port, a USB-serial bridge, a
//! Linux SPI device, ...).

use crate::error::Error;
use std::time::Duration;

/// A half-duplex-agnostic byte transport to the target's bootloader.
///
/// The protocol engine serializes every access; no two transactions are
/// ever in flight on the same `Transport` at once.
pub trait Transport {
    /// Opens the underlying device.
    fn open(&mut self) -> Result<(), Error>;

    /// Closes the underlying device. Called on every session exit path.
    fn close(&mut self) -> Result<(), Error>;

    /// Flushes any buffered output.
    fn flush(&mut self) -> Result<(), Error>;

    /// Writes `bytes` to the wire.
    fn send(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Reads up to `n` bytes, waiting at most `timeout` for the first byte
    /// to arrive. Returns fewer than `n` bytes (possibly zero) on timeout;
    /// callers interpret a short read as [`Error::ResponseTimeout`].
    fn recv(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Error>;

    /// Asserts or releases the target's reset line, if wired.
    fn set_reset_line(&mut self, asserted: bool) -> Result<(), Error>;
}
