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

//! A minimal [`Transport`] over a character device path. Real baud/SPI
//! clock configuration, DTR/RTS wiggling, and USB-bridge framing are
//! platform concerns outside this crate's scope; this adapter reads and
//! writes the path as a plain file, which is enough to drive the wire
//! protocol against an already-configured device node.

use bsl_core::error::Error;
use bsl_core::transport::Transport;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

pub struct FileTransport {
    path: String,
    handle: Option<File>,
}

impl FileTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    fn handle_mut(&mut self) -> Result<&mut File, Error> {
        self.handle.as_mut().ok_or(Error::PortNotOpen)
    }
}

impl Transport for FileTransport {
    fn open(&mut self) -> Result<(), Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| Error::FailedOpen {
                path: self.path.clone(),
                source,
            })?;
        self.handle = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.handle = None;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.handle_mut()?
            .flush()
            .map_err(|_| Error::CannotSend { count: 0 })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.handle_mut()?
            .write_all(bytes)
            .map_err(|_| Error::CannotSend { count: bytes.len() })
    }

    fn recv(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Error> {
        let deadline = Instant::now() + timeout;
        let mut out = vec![0u8; n];
        let mut filled = 0;
        let handle = self.handle_mut()?;
        while filled < n {
            if Instant::now() >= deadline {
                out.truncate(filled);
                return Ok(out);
            }
            match handle.read(&mut out[filled..]) {
                Ok(0) => continue,
                Ok(read) => filled += read,
                Err(_) => {
                    out.truncate(filled);
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }

    fn set_reset_line(&mut self, _asserted: bool) -> Result<(), Error> {
        // GPIO/DTR/RTS wiggling is platform-specific and out of scope here.
        Ok(())
    }
}
