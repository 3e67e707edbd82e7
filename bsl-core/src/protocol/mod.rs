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

//! The bootloader protocol engine (C4): wire constants, target
//! identification, and the synchronize/identify/read/write/erase/go state
//! machine.

pub mod constants;
pub mod engine;
pub mod target;

pub use engine::{plan_read_chunks, plan_write_chunks, ProtocolEngine};
pub use target::{Family, TargetDescriptor};
