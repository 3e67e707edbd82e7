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

//! A scriptable fake [`Transport`], in the spirit of the flash hardware
//! fakes used elsewhere in this codebase to unit-test protocol state
//! machines without real hardware.

use crate::error::Error;
use crate::transport::Transport;
use std::collections::VecDeque;
use std::time::Duration;

enum MockEvent {
    Reply(Vec<u8>),
    Timeout,
}

/// A [`Transport`] whose `recv` responses are scripted in advance and whose
/// `send` calls are recorded for later assertion.
#[derive(Default)]
pub struct MockTransport {
    /// Every byte passed to `send`, in order.
    pub sent: Vec<u8>,
    events: VecDeque<MockEvent>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Queues a reply of `bytes` for the next `recv` call.
    pub fn push_reply(&mut self, bytes: impl Into<Vec<u8>>) {
        self.events.push_back(MockEvent::Reply(bytes.into()));
    }

    /// Queues a single-byte reply.
    pub fn push_byte(&mut self, byte: u8) {
        self.push_reply(vec![byte]);
    }

    /// Queues a timeout (an empty read) for the next `recv` call.
    pub fn push_timeout(&mut self) {
        self.events.push_back(MockEvent::Timeout);
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.sent.extend_from_slice(bytes);
        Ok(())
    }

    fn recv(&mut self, n: usize, _timeout: Duration) -> Result<Vec<u8>, Error> {
        match self.events.pop_front() {
            Some(MockEvent::Reply(mut bytes)) => {
                bytes.truncate(n);
                Ok(bytes)
            }
            Some(MockEvent::Timeout) | None => Ok(Vec::new()),
        }
    }

    fn set_reset_line(&mut self, _asserted: bool) -> Result<(), Error> {
        Ok(())
    }
}
