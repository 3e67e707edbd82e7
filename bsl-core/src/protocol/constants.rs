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

//! Byte-exact wire constants (§6).

use std::time::Duration;

pub const SYNCH: u8 = 0x7F;
pub const ACK: u8 = 0x79;
pub const NACK: u8 = 0x1F;
pub const BUSY: u8 = 0xAA;

pub const GET: u8 = 0x00;
pub const READ: u8 = 0x11;
pub const ERASE: u8 = 0x43;
pub const WRITE: u8 = 0x31;
pub const GO: u8 = 0x21;

/// Largest READ transaction payload, in bytes.
pub const MAX_READ_CHUNK: usize = 256;
/// Largest WRITE transaction payload, in bytes.
pub const MAX_WRITE_CHUNK: usize = 128;
/// Flash write alignment boundary, in bytes.
pub const FLASH_WRITE_ALIGN: usize = 128;
/// Sector size assumed for sector-granularity erase planning. Not given by
/// the BSL's own responses; a fixed STM8-like assumption, documented in
/// DESIGN.md.
pub const FLASH_SECTOR_SIZE: u32 = 1024;

pub const DEFAULT_SYNC_RETRIES: u32 = 5;
pub const DEFAULT_TRANSACTION_RETRIES: u32 = 3;
pub const DEFAULT_UART_MODE_PROBES: u32 = 3;

/// Minimum timeout applied to the final ACK of a mass erase.
pub const MASS_ERASE_TIMEOUT: Duration = Duration::from_secs(10);
/// Settling delay after a reset pulse.
pub const POST_RESET_SETTLE: Duration = Duration::from_millis(50);
