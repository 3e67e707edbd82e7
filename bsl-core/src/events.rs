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

//! Progress reporting. The core never prints; it hands structured events
//! to a caller-supplied sink, the way a display layer expects to consume
//! them (formatting is entirely external, per the transport boundary).

/// A phase transition or byte-count update, emitted by the protocol engine
/// and the orchestrator during a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A new top-level phase has started (sync, identify, erase, upload,
    /// verify, read-out, go).
    PhaseStarted { phase: Phase },
    /// `bytes_done` of `bytes_total` have been transferred in the current
    /// phase.
    BytesTransferred { bytes_done: u32, bytes_total: u32 },
    /// The RAM routine was side-loaded before the first flash write.
    RamRoutineLoaded,
    /// The current phase finished successfully.
    PhaseFinished { phase: Phase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sync,
    Identify,
    Erase,
    Upload,
    Verify,
    ReadOut,
    Go,
}

/// A sink for [`ProgressEvent`]s. Boxed so callers can supply a closure or
/// a channel sender without the engine depending on either.
pub type ProgressSink<'a> = &'a mut dyn FnMut(ProgressEvent);

/// A sink that discards every event, for callers with nothing to report to.
pub fn null_sink(_event: ProgressEvent) {}
