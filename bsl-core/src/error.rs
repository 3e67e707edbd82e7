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

//! Every fallible operation in this crate returns one rich [`Error`] variant
//! instead of stashing a code in a process-global slot.

use crate::protocol::Family;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // ---- Transport ----
    #[error("transport port is not open")]
    PortNotOpen,

    #[error("failed to send {count} bytes to the transport")]
    CannotSend { count: usize },

    #[error("timed out waiting for a response")]
    ResponseTimeout,

    #[error("unexpected response byte 0x{byte:02X}")]
    ResponseUnexpected { byte: u8 },

    // ---- Protocol ----
    #[error("failed to synchronize with the target after {attempts} attempts")]
    TooManySyncAttempts { attempts: u32 },

    #[error("could not determine the UART wiring mode after {attempts} probes")]
    CannotDetermineUartMode { attempts: u32 },

    #[error("could not identify the device family for BSL version 0x{bsl_version:02X}")]
    CannotIdentifyFamily { bsl_version: u8 },

    #[error(
        "no RAM routine is registered for {family:?}, {flash_kb} kB flash, BSL version 0x{bsl_version:02X}"
    )]
    CannotIdentifyDevice {
        family: Family,
        flash_kb: u32,
        bsl_version: u8,
    },

    #[error("GET response did not include the GET opcode")]
    IncorrectGetCode,
    #[error("GET response did not include the READ opcode")]
    IncorrectReadCode,
    #[error("GET response did not include the WRITE opcode")]
    IncorrectWriteCode,
    #[error("GET response did not include the ERASE opcode")]
    IncorrectEraseCode,
    #[error("GET response did not include the GO opcode")]
    IncorrectGoCode,

    #[error("unknown interface {0:?}")]
    UnknownInterface(String),

    #[error("address 0x{address:08X} does not exist on the target")]
    AddressNotExist { address: u32 },

    #[error("session is tainted by a prior fatal error; only sync reopens it")]
    SessionTainted,

    #[error("session already left BSL mode after GO; no further transactions are possible")]
    SessionDone,

    #[error("verification mismatch at address 0x{address:08X}: expected 0x{expected:02X}, read 0x{actual:02X}")]
    VerifyMismatch {
        address: u32,
        expected: u8,
        actual: u8,
    },

    // ---- Memory / range ----
    #[error("range start 0x{start:X} is greater than range end 0x{end:X}")]
    AddressStartGreaterEnd { start: u32, end: u32 },

    #[error("range start 0x{start:X} is past the end of the image buffer (capacity 0x{capacity:X})")]
    AddressStartGreaterBuffer { start: u32, capacity: u32 },

    #[error("range end 0x{end:X} is past the end of the image buffer (capacity 0x{capacity:X})")]
    AddressEndGreaterBuffer { end: u32, capacity: u32 },

    // ---- File ----
    #[error("failed to open {path}")]
    FailedOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {path}")]
    FailedCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file content exceeds the image buffer capacity")]
    FileBufferExceeded,

    #[error("line {line}: S-record does not start with 'S'")]
    SRecordInvalidStart { line: usize },

    #[error("line {line}: S-record address overflows its record type")]
    SRecordAddressOverflow { line: usize },

    #[error("line {line}: S-record checksum mismatch (expected 0x{expected:02X}, computed 0x{computed:02X})")]
    SRecordChecksum {
        line: usize,
        expected: u8,
        computed: u8,
    },

    #[error("line {line}: Intel HEX record does not start with ':'")]
    HexInvalidStart { line: usize },

    #[error("line {line}: Intel HEX address overflows the 32-bit address space")]
    HexAddressOverflow { line: usize },

    #[error("line {line}: unsupported Intel HEX record type 0x{record_type:02X}")]
    HexUnsupportedType { line: usize, record_type: u8 },

    #[error("line {line}: Intel HEX checksum mismatch (expected 0x{expected:02X}, computed 0x{computed:02X})")]
    HexChecksum {
        line: usize,
        expected: u8,
        computed: u8,
    },

    #[error("line {line}: invalid character {character:?}")]
    InvalidCharacter { line: usize, character: char },
}
