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

//! The target descriptor (§3) and the BSL-version lookup table that
//! derives it from a `GET` response.

use crate::error::Error;
use crate::frame::UartMode;

/// Coarse device class. `FamilyB` does not need a RAM routine side-loaded
/// before flash writes; `FamilyA` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    FamilyA,
    FamilyB,
}

impl Family {
    pub fn requires_ram_routine(self) -> bool {
        matches!(self, Family::FamilyA)
    }
}

/// Flash starts here on every supported device; option bytes occupy a
/// small fixed window below it. Neither address range is given by the
/// BSL's own `GET`/`READ` responses, so both are fixed constants here
/// rather than derived at runtime.
pub const FLASH_START: u32 = 0x8000;
pub const OPTION_BYTES_START: u32 = 0x4800;
pub const OPTION_BYTES_END: u32 = 0x487F;

fn version_lookup(bsl_version: u8) -> Option<(Family, u32)> {
    match bsl_version {
        0x10 => Some((Family::FamilyA, 32)),
        0x13 => Some((Family::FamilyA, 32)),
        0x20 => Some((Family::FamilyA, 64)),
        0x21 => Some((Family::FamilyA, 128)),
        0xA1 => Some((Family::FamilyB, 128)),
        _ => None,
    }
}

/// Produced by the identify phase (§4.4); immutable for the rest of the
/// session once built.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    pub family: Family,
    pub bsl_version: u8,
    pub flash_kb: u32,
    pub supported_commands: Vec<u8>,
    pub uart_mode: Option<UartMode>,
}

impl TargetDescriptor {
    /// Builds a descriptor from a `GET` response's BSL version byte and
    /// opcode list, failing if the version is not in the lookup table.
    pub fn from_get_response(bsl_version: u8, supported_commands: Vec<u8>) -> Result<Self, Error> {
        let (family, flash_kb) =
            version_lookup(bsl_version).ok_or(Error::CannotIdentifyFamily { bsl_version })?;
        Ok(Self {
            family,
            bsl_version,
            flash_kb,
            supported_commands,
            uart_mode: None,
        })
    }

    pub fn is_flash_address(&self, addr: u32) -> bool {
        let flash_end = FLASH_START + self.flash_kb * 1024;
        (FLASH_START..flash_end).contains(&addr)
    }

    pub fn is_option_byte_address(&self, addr: u32) -> bool {
        (OPTION_BYTES_START..=OPTION_BYTES_END).contains(&addr)
    }

    /// True when writing `addr` requires the RAM routine to be resident
    /// first (flash or option bytes, on a family that needs it).
    pub fn requires_ram_routine(&self, addr: u32) -> bool {
        self.family.requires_ram_routine() && (self.is_flash_address(addr) || self.is_option_byte_address(addr))
    }
}
