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

//! Protocol engine and address-sparse memory image for programming 8-bit
//! microcontrollers over their factory ROM bootloader (BSL), on UART or
//! SPI. The byte-level transport, command-line surface, logging backend,
//! and vendor RAM-routine blobs are supplied by the caller; this crate
//! owns the wire protocol, the file codecs, and the memory model they
//! share.

pub mod codecs;
pub mod error;
pub mod events;
pub mod frame;
pub mod image;
pub mod orchestrator;
pub mod protocol;
pub mod ramroutine;
pub mod transport;

pub mod test_support;

pub use error::Error;
pub use events::{Phase, ProgressEvent, ProgressSink};
pub use image::MemoryImage;
pub use orchestrator::{Config, ErasePlan, InterfaceKind, ResetMethod, Session, Transform};
pub use transport::Transport;
