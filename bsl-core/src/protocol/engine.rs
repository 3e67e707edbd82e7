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

//! The protocol engine (C4): synchronize, identify, and drive
//! `READ`/`WRITE`/`ERASE`/`GO` transactions, with the retry rules of §4.4.

use crate::error::Error;
use crate::frame::{Ack, FrameLayer, Interface, UartMode, DEFAULT_BYTE_TIMEOUT};
use crate::image::MemoryImage;
use crate::protocol::constants::*;
use crate::protocol::target::TargetDescriptor;
use log::{debug, trace, warn};

/// Outcome of one attempt inside a retried transaction.
enum TxError {
    /// Worth retrying the whole transaction (timeout, or a NACK at a
    /// position where NACK just means "rejected, try again").
    Retry,
    /// Not retryable; propagate immediately.
    Fatal(Error),
}

impl From<Error> for TxError {
    fn from(e: Error) -> Self {
        TxError::Fatal(e)
    }
}

pub struct ProtocolEngine<'t> {
    frame: FrameLayer<'t>,
    target: Option<TargetDescriptor>,
    ram_routine_resident: bool,
    tainted: bool,
    done: bool,
}

impl<'t> ProtocolEngine<'t> {
    pub fn new(frame: FrameLayer<'t>) -> Self {
        Self {
            frame,
            target: None,
            ram_routine_resident: false,
            tainted: false,
            done: false,
        }
    }

    pub fn target(&self) -> Option<&TargetDescriptor> {
        self.target.as_ref()
    }

    /// Reaches the underlying transport, for callers that need to close it
    /// on session exit.
    pub fn transport_mut(&mut self) -> &mut dyn crate::transport::Transport {
        self.frame.transport_mut()
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        if self.done {
            return Err(Error::SessionDone);
        }
        if self.tainted {
            return Err(Error::SessionTainted);
        }
        Ok(())
    }

    /// Sends `SYNCH` and accepts either `ACK` or `NACK` as success,
    /// retrying on timeout or an unrecognized byte up to `retries` times.
    pub fn sync(&mut self, retries: u32) -> Result<(), Error> {
        for attempt in 0..retries {
            trace!("sync attempt {}/{}", attempt + 1, retries);
            self.frame.send_byte(SYNCH)?;
            match self.frame.expect_ack() {
                Ok(Ack::Ack) | Ok(Ack::Nack) => {
                    self.tainted = false;
                    self.done = false;
                    return Ok(());
                }
                Err(Error::ResponseTimeout) | Err(Error::ResponseUnexpected { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        warn!("failed to synchronize after {} attempts", retries);
        Err(Error::TooManySyncAttempts { attempts: retries })
    }

    /// Probes for the UART echo mode. No-op (returns `FullDuplex`) if the
    /// frame layer is not on a UART interface; callers only need to invoke
    /// this for UART transports.
    pub fn detect_uart_mode(&mut self, retries: u32) -> Result<UartMode, Error> {
        for attempt in 0..retries {
            let probe = 0xA5u8.wrapping_add(attempt as u8);
            self.frame.transport_mut().send(&[probe])?;
            let resp = self.frame.transport_mut().recv(1, DEFAULT_BYTE_TIMEOUT)?;
            let mode = match resp.first() {
                None => UartMode::FullDuplex,
                Some(&b) if b == probe => UartMode::Reply,
                Some(&b) if b == !probe => UartMode::TwoWire,
                Some(_) => continue,
            };
            self.frame.set_interface(Interface::Uart(mode));
            debug!("detected UART mode {:?}", mode);
            return Ok(mode);
        }
        Err(Error::CannotDetermineUartMode { attempts: retries })
    }

    /// Issues `GET` and builds the session's [`TargetDescriptor`].
    pub fn identify(&mut self) -> Result<&TargetDescriptor, Error> {
        self.ensure_usable()?;
        self.frame.send_command(GET)?;
        if self.frame.expect_ack()? != Ack::Ack {
            return Err(Error::ResponseUnexpected { byte: NACK });
        }
        let len = self.frame.recv_bytes(1)?[0] as usize;
        let version = self.frame.recv_bytes(1)?[0];
        let opcodes = self.frame.recv_bytes(len)?;
        if self.frame.expect_ack()? != Ack::Ack {
            return Err(Error::ResponseUnexpected { byte: NACK });
        }

        for (code, err) in [
            (GET, Error::IncorrectGetCode),
            (READ, Error::IncorrectReadCode),
            (WRITE, Error::IncorrectWriteCode),
            (ERASE, Error::IncorrectEraseCode),
            (GO, Error::IncorrectGoCode),
        ] {
            if !opcodes.contains(&code) {
                return Err(err);
            }
        }

        let mut descriptor = TargetDescriptor::from_get_response(version, opcodes)?;
        if let Interface::Uart(mode) = self.frame.interface() {
            descriptor.uart_mode = Some(mode);
        }
        debug!(
            "identified {:?}, bsl version 0x{:02X}, {} kB flash",
            descriptor.family, descriptor.bsl_version, descriptor.flash_kb
        );
        self.target = Some(descriptor);
        Ok(self.target.as_ref().unwrap())
    }

    fn expect_ack_required(&mut self) -> Result<(), TxError> {
        match self.frame.expect_ack() {
            Ok(Ack::Ack) => Ok(()),
            Ok(Ack::Nack) => Err(TxError::Retry),
            Err(Error::ResponseTimeout) => Err(TxError::Retry),
            Err(e) => Err(TxError::Fatal(e)),
        }
    }

    fn expect_address_ack(&mut self, address: u32) -> Result<(), TxError> {
        match self.frame.expect_ack() {
            Ok(Ack::Ack) => Ok(()),
            Ok(Ack::Nack) => Err(TxError::Fatal(Error::AddressNotExist { address })),
            Err(Error::ResponseTimeout) => Err(TxError::Retry),
            Err(e) => Err(TxError::Fatal(e)),
        }
    }

    fn run_with_retries<F, T>(&mut self, retries: u32, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut(&mut Self) -> Result<T, TxError>,
    {
        for i in 0..=retries {
            match attempt(self) {
                Ok(v) => return Ok(v),
                Err(TxError::Retry) if i < retries => {
                    trace!("transaction retry {}/{}", i + 1, retries);
                    continue;
                }
                Err(TxError::Retry) => {
                    self.tainted = true;
                    return Err(Error::ResponseTimeout);
                }
                Err(TxError::Fatal(e)) => {
                    self.tainted = true;
                    return Err(e);
                }
            }
        }
        unreachable!("loop always returns within its bound")
    }

    /// Reads `count` bytes (<= [`MAX_READ_CHUNK`]) from `addr` into `image`.
    pub fn read(&mut self, addr: u32, count: usize, image: &mut MemoryImage) -> Result<(), Error> {
        self.ensure_usable()?;
        debug_assert!(count >= 1 && count <= MAX_READ_CHUNK);
        let retries = DEFAULT_TRANSACTION_RETRIES;
        let data = self.run_with_retries(retries, |engine| {
            engine.frame.send_command(READ)?;
            engine.expect_ack_required()?;
            engine.frame.send_payload(&addr.to_be_bytes())?;
            engine.expect_address_ack(addr)?;
            engine.frame.send_command((count - 1) as u8)?;
            engine.expect_ack_required()?;
            let data = engine.frame.recv_bytes(count)?;
            Ok(data)
        })?;
        for (i, &byte) in data.iter().enumerate() {
            image.set(addr + i as u32, byte);
        }
        Ok(())
    }

    /// Writes `data` (<= [`MAX_WRITE_CHUNK`] bytes) to `addr`.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        self.ensure_usable()?;
        debug_assert!(!data.is_empty() && data.len() <= MAX_WRITE_CHUNK);
        let retries = DEFAULT_TRANSACTION_RETRIES;
        self.run_with_retries(retries, |engine| {
            engine.frame.send_command(WRITE)?;
            engine.expect_ack_required()?;
            engine.frame.send_payload(&addr.to_be_bytes())?;
            engine.expect_address_ack(addr)?;
            let mut payload = Vec::with_capacity(1 + data.len());
            payload.push((data.len() - 1) as u8);
            payload.extend_from_slice(data);
            engine.frame.send_payload(&payload)?;
            engine.expect_ack_required()?;
            Ok(())
        })
    }

    /// Erases the sectors listed in `sectors` (each a sector index).
    pub fn erase_sectors(&mut self, sectors: &[u8]) -> Result<(), Error> {
        self.ensure_usable()?;
        let retries = DEFAULT_TRANSACTION_RETRIES;
        self.run_with_retries(retries, |engine| {
            engine.frame.send_command(ERASE)?;
            engine.expect_ack_required()?;
            let mut payload = Vec::with_capacity(1 + sectors.len());
            payload.push((sectors.len() - 1) as u8);
            payload.extend_from_slice(sectors);
            engine.frame.send_payload(&payload)?;
            engine.expect_ack_required()?;
            Ok(())
        })
    }

    /// Issues the special mass-erase sentinel sequence, with an extended
    /// timeout on the final ACK.
    pub fn mass_erase(&mut self) -> Result<(), Error> {
        self.ensure_usable()?;
        self.frame.send_command(ERASE)?;
        if self.frame.expect_ack()? != Ack::Ack {
            return Err(Error::ResponseUnexpected { byte: NACK });
        }
        self.frame.send_byte(0xFF)?;
        self.frame.send_byte(0x00)?;
        self.frame.with_response_timeout(MASS_ERASE_TIMEOUT);
        let ack = self.frame.expect_ack();
        self.frame.reset_response_timeout();
        match ack? {
            Ack::Ack => Ok(()),
            Ack::Nack => Err(Error::ResponseUnexpected { byte: NACK }),
        }
    }

    /// Jumps to `addr`, leaving BSL mode. No further transactions are
    /// possible on this engine afterwards.
    pub fn go(&mut self, addr: u32) -> Result<(), Error> {
        self.ensure_usable()?;
        self.frame.send_command(GO)?;
        if self.frame.expect_ack()? != Ack::Ack {
            return Err(Error::ResponseUnexpected { byte: NACK });
        }
        self.frame.send_payload(&addr.to_be_bytes())?;
        match self.frame.expect_ack()? {
            Ack::Ack => {
                self.done = true;
                Ok(())
            }
            Ack::Nack => Err(Error::ResponseUnexpected { byte: NACK }),
        }
    }

    pub fn ram_routine_resident(&self) -> bool {
        self.ram_routine_resident
    }

    pub fn mark_ram_routine_resident(&mut self) {
        self.ram_routine_resident = true;
    }
}

/// Splits the defined bytes of `[lo, hi]` into write-legal chunks: each at
/// most [`MAX_WRITE_CHUNK`] bytes, aligned on [`FLASH_WRITE_ALIGN`] so a
/// chunk never crosses an alignment boundary unless it starts unaligned.
pub fn plan_write_chunks(image: &MemoryImage, lo: u32, hi: u32) -> Vec<(u32, Vec<u8>)> {
    let mut chunks = Vec::new();
    let mut addr = lo;
    while addr <= hi {
        if !image.is_defined(addr) {
            addr += 1;
            continue;
        }
        let align = FLASH_WRITE_ALIGN as u32;
        let room_to_boundary = align - (addr % align);
        let max_len = room_to_boundary.min(MAX_WRITE_CHUNK as u32) as usize;

        let mut data = Vec::new();
        while addr <= hi && image.is_defined(addr) && data.len() < max_len {
            data.push(image.get(addr).unwrap());
            addr += 1;
        }
        let start = addr - data.len() as u32;
        chunks.push((start, data));
    }
    chunks
}

/// Splits the defined bytes of `[lo, hi]` into read-back chunks of at most
/// [`MAX_READ_CHUNK`] bytes, with no alignment constraint.
pub fn plan_read_chunks(image: &MemoryImage, lo: u32, hi: u32) -> Vec<(u32, Vec<u8>)> {
    crate::codecs::chunk_defined_runs(image, lo, hi, MAX_READ_CHUNK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;

    fn engine(transport: &mut MockTransport) -> ProtocolEngine<'_> {
        ProtocolEngine::new(FrameLayer::new(transport, Interface::Uart(UartMode::FullDuplex)))
    }

    #[test]
    fn sync_succeeds_on_ack() {
        let mut transport = MockTransport::new();
        transport.push_byte(ACK);
        let mut eng = engine(&mut transport);
        eng.sync(DEFAULT_SYNC_RETRIES).unwrap();
    }

    #[test]
    fn sync_succeeds_on_nack_already_synced() {
        let mut transport = MockTransport::new();
        transport.push_byte(NACK);
        let mut eng = engine(&mut transport);
        eng.sync(DEFAULT_SYNC_RETRIES).unwrap();
    }

    #[test]
    fn sync_retries_on_timeout_then_succeeds() {
        let mut transport = MockTransport::new();
        for _ in 0..4 {
            transport.push_timeout();
        }
        transport.push_byte(ACK);
        let mut eng = engine(&mut transport);
        eng.sync(5).unwrap();
    }

    #[test]
    fn sync_fails_after_exhausting_retries() {
        let mut transport = MockTransport::new();
        for _ in 0..5 {
            transport.push_timeout();
        }
        let mut eng = engine(&mut transport);
        let err = eng.sync(5).unwrap_err();
        assert!(matches!(err, Error::TooManySyncAttempts { attempts: 5 }));
    }

    #[test]
    fn identify_parses_get_response_and_checks_opcodes() {
        let mut transport = MockTransport::new();
        transport.push_byte(ACK); // command ack
        transport.push_reply(vec![5]); // length
        transport.push_reply(vec![0x10]); // bsl version
        transport.push_reply(vec![GET, READ, WRITE, ERASE, GO]); // opcodes
        transport.push_byte(ACK); // trailing ack
        let mut eng = engine(&mut transport);
        let desc = eng.identify().unwrap();
        assert_eq!(desc.bsl_version, 0x10);
        assert_eq!(desc.flash_kb, 32);
    }

    #[test]
    fn identify_reports_missing_opcode() {
        let mut transport = MockTransport::new();
        transport.push_byte(ACK);
        transport.push_reply(vec![4]);
        transport.push_reply(vec![0x10]);
        transport.push_reply(vec![GET, READ, WRITE, ERASE]); // missing GO
        transport.push_byte(ACK);
        let mut eng = engine(&mut transport);
        assert!(matches!(eng.identify(), Err(Error::IncorrectGoCode)));
    }

    #[test]
    fn read_transaction_observes_exact_wire_framing() {
        let mut transport = MockTransport::new();
        transport.push_byte(ACK); // command ack
        transport.push_byte(ACK); // address ack
        transport.push_byte(ACK); // count ack
        transport.push_reply(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let mut eng = engine(&mut transport);
        let mut image = MemoryImage::new();
        eng.read(0x8000, 4, &mut image).unwrap();

        assert_eq!(
            transport.sent,
            vec![0x11, 0xEE, 0x00, 0x00, 0x80, 0x00, 0x80, 0x03, 0xFC]
        );
        assert_eq!(image.get(0x8000), Some(0xDE));
        assert_eq!(image.get(0x8003), Some(0xEF));
    }

    #[test]
    fn address_nack_reports_address_not_exist() {
        let mut transport = MockTransport::new();
        transport.push_byte(ACK); // command ack
        transport.push_byte(NACK); // address nack
        let mut eng = engine(&mut transport);
        let mut image = MemoryImage::new();
        let err = eng.read(0x8000, 4, &mut image).unwrap_err();
        assert!(matches!(err, Error::AddressNotExist { address: 0x8000 }));
    }

    #[test]
    fn write_taints_session_after_exhausted_retries() {
        let mut transport = MockTransport::new();
        for _ in 0..(DEFAULT_TRANSACTION_RETRIES + 1) {
            transport.push_timeout();
        }
        let mut eng = engine(&mut transport);
        let err = eng.write(0x8000, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::ResponseTimeout));
        assert!(matches!(eng.write(0x8000, &[1]), Err(Error::SessionTainted)));
    }

    #[test]
    fn go_marks_session_done() {
        let mut transport = MockTransport::new();
        transport.push_byte(ACK);
        transport.push_byte(ACK);
        let mut eng = engine(&mut transport);
        eng.go(0x8000).unwrap();
        assert!(matches!(eng.read(0x8000, 1, &mut MemoryImage::new()), Err(Error::SessionDone)));
    }

    #[test]
    fn plan_write_chunks_splits_on_alignment() {
        let mut image = MemoryImage::new();
        image.fill(0x8000, 0x80FF, 0xAA).unwrap();
        let chunks = plan_write_chunks(&image, 0x8000, 0x80FF);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0, 0x8000);
        assert_eq!(chunks[0].1.len(), 128);
        assert_eq!(chunks[1].0, 0x8080);
        assert_eq!(chunks[1].1.len(), 128);
    }

    #[test]
    fn plan_write_chunks_respects_unaligned_start() {
        let mut image = MemoryImage::new();
        image.fill(0x8010, 0x80FF, 0xAA).unwrap();
        let chunks = plan_write_chunks(&image, 0x8010, 0x80FF);
        assert_eq!(chunks[0].0, 0x8010);
        assert_eq!(chunks[0].1.len(), FLASH_WRITE_ALIGN - 0x10);
    }

    #[test]
    fn plan_write_chunks_preserves_order_and_coverage() {
        let mut image = MemoryImage::new();
        image.set(0x10, 1);
        image.set(0x11, 2);
        image.set(0x20, 3);
        let chunks = plan_write_chunks(&image, 0, 0xFF);
        let flat: Vec<u8> = chunks.iter().flat_map(|(_, d)| d.clone()).collect();
        assert_eq!(flat, vec![1, 2, 3]);
    }
}
