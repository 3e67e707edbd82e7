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

//! The programming orchestrator (C6): composes C1-C5 into the top-level
//! `program`, `verify`, and `read_out` actions.

use crate::error::Error;
use crate::events::{Phase, ProgressEvent, ProgressSink};
use crate::frame::{FrameLayer, Interface, UartMode};
use crate::image::MemoryImage;
use crate::protocol::constants::{
    DEFAULT_SYNC_RETRIES, DEFAULT_UART_MODE_PROBES, FLASH_SECTOR_SIZE, MAX_READ_CHUNK,
    POST_RESET_SETTLE,
};
use crate::protocol::engine::{plan_read_chunks, plan_write_chunks, ProtocolEngine};
use crate::protocol::target::TargetDescriptor;
use crate::ramroutine;
use crate::transport::Transport;
use log::info;

/// Which physical interface the session runs over (§6 `interface`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Uart,
    SpiDevice,
    SpiBridge,
}

/// How (if at all) the target's reset line is pulsed before `sync` (§6
/// `reset_method`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMethod {
    None,
    Dtr,
    Rts,
    Gpio,
}

/// What erase to perform before upload (§4.6 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasePlan {
    None,
    Mass,
    /// Erase only the sectors overlapping the image's defined extent.
    Sectors,
}

/// One requested memory-image transform (§3, §4.1), applied between
/// decoding input files and uploading (§4.6 step 4).
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    Fill { lo: u32, hi: u32, value: u8 },
    Clip { lo: u32, hi: u32 },
    Cut { lo: u32, hi: u32 },
    Copy { src_lo: u32, src_hi: u32, dst_lo: u32 },
    Move { src_lo: u32, src_hi: u32, dst_lo: u32 },
}

/// Applies `transform` to `image` in place.
pub fn apply_transform(image: &mut MemoryImage, transform: &Transform) -> Result<(), Error> {
    match *transform {
        Transform::Fill { lo, hi, value } => image.fill(lo, hi, value),
        Transform::Clip { lo, hi } => image.clip(lo, hi),
        Transform::Cut { lo, hi } => image.cut(lo, hi),
        Transform::Copy { src_lo, src_hi, dst_lo } => image.copy(src_lo, src_hi, dst_lo),
        Transform::Move { src_lo, src_hi, dst_lo } => image.move_range(src_lo, src_hi, dst_lo),
    }
}

/// The orchestrator's configuration (§6), independent of however a caller
/// parses it from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub interface: InterfaceKind,
    pub reset_method: ResetMethod,
    pub uart_mode_override: Option<UartMode>,
    pub sync_retries: u32,
    pub erase: ErasePlan,
    /// Applied in order to the session image before block-planning (§4.6
    /// step 4), e.g. fills, clips, cuts, copies, and moves requested on the
    /// command line.
    pub transforms: Vec<Transform>,
    pub verify: bool,
    pub jump_after: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: InterfaceKind::Uart,
            reset_method: ResetMethod::None,
            uart_mode_override: None,
            sync_retries: DEFAULT_SYNC_RETRIES,
            erase: ErasePlan::None,
            transforms: Vec::new(),
            verify: false,
            jump_after: None,
        }
    }
}

/// One programming session over an already-opened [`Transport`] (§4.6,
/// §5: the transport and session image are owned exclusively by the
/// orchestrator for the session's lifetime).
pub struct Session<'t> {
    engine: ProtocolEngine<'t>,
    config: Config,
}

impl<'t> Session<'t> {
    /// Opens `transport`, optionally pulses reset, synchronizes, detects
    /// the UART mode (if applicable), and identifies the target.
    pub fn open(
        transport: &'t mut dyn Transport,
        config: Config,
        sink: ProgressSink,
    ) -> Result<Self, Error> {
        transport.open()?;
        if config.reset_method != ResetMethod::None {
            transport.set_reset_line(true)?;
            std::thread::sleep(POST_RESET_SETTLE);
            transport.set_reset_line(false)?;
            std::thread::sleep(POST_RESET_SETTLE);
        }

        let interface = match config.interface {
            InterfaceKind::Uart => Interface::Uart(config.uart_mode_override.unwrap_or(UartMode::FullDuplex)),
            InterfaceKind::SpiDevice | InterfaceKind::SpiBridge => Interface::Spi,
        };
        let mut engine = ProtocolEngine::new(FrameLayer::new(transport, interface));

        sink(ProgressEvent::PhaseStarted { phase: Phase::Sync });
        engine.sync(config.sync_retries)?;
        sink(ProgressEvent::PhaseFinished { phase: Phase::Sync });

        sink(ProgressEvent::PhaseStarted { phase: Phase::Identify });
        if config.interface == InterfaceKind::Uart && config.uart_mode_override.is_none() {
            engine.detect_uart_mode(DEFAULT_UART_MODE_PROBES)?;
        }
        let target = engine.identify()?;
        info!("identified {:?} (0x{:02X})", target.family, target.bsl_version);
        sink(ProgressEvent::PhaseFinished { phase: Phase::Identify });

        Ok(Self { engine, config })
    }

    pub fn target(&self) -> &TargetDescriptor {
        self.engine
            .target()
            .expect("Session::open always identifies before returning")
    }

    fn sectors_for_extent(lo: u32, hi: u32) -> Vec<u8> {
        let first_sector = lo / FLASH_SECTOR_SIZE;
        let last_sector = hi / FLASH_SECTOR_SIZE;
        (first_sector..=last_sector).map(|s| s as u8).collect()
    }

    /// Applies `config.transforms` to `image` in place, in order (§4.6 step
    /// 4), between decoding input files and block-planning.
    fn apply_configured_transforms(&self, image: &mut MemoryImage) -> Result<(), Error> {
        for transform in &self.config.transforms {
            apply_transform(image, transform)?;
        }
        Ok(())
    }

    /// Erases flash per `config.erase`, then writes every defined byte of
    /// `image` (after applying `config.transforms`), side-loading the RAM
    /// routine as needed. Verifies by read-back afterward if `config.verify`
    /// is set.
    pub fn program(&mut self, image: &MemoryImage, sink: ProgressSink) -> Result<(), Error> {
        let mut image = image.clone();
        self.apply_configured_transforms(&mut image)?;
        let image = &image;

        let (first, last, count) = image.extent(0, crate::image::LEN_IMAGE as u32 - 1)?;
        if count == 0 {
            return Ok(());
        }

        match self.config.erase {
            ErasePlan::None => {}
            ErasePlan::Mass => {
                sink(ProgressEvent::PhaseStarted { phase: Phase::Erase });
                self.engine.mass_erase()?;
                sink(ProgressEvent::PhaseFinished { phase: Phase::Erase });
            }
            ErasePlan::Sectors => {
                sink(ProgressEvent::PhaseStarted { phase: Phase::Erase });
                self.engine.erase_sectors(&Self::sectors_for_extent(first, last))?;
                sink(ProgressEvent::PhaseFinished { phase: Phase::Erase });
            }
        }

        sink(ProgressEvent::PhaseStarted { phase: Phase::Upload });
        let target = self.target().clone();
        let mut bytes_done = 0u32;
        for (addr, data) in plan_write_chunks(image, first, last) {
            if target.requires_ram_routine(addr) && !self.engine.ram_routine_resident() {
                ramroutine::ensure_resident(&mut self.engine, &target)?;
                sink(ProgressEvent::RamRoutineLoaded);
            }
            self.engine.write(addr, &data)?;
            bytes_done += data.len() as u32;
            sink(ProgressEvent::BytesTransferred {
                bytes_done,
                bytes_total: count,
            });
        }
        sink(ProgressEvent::PhaseFinished { phase: Phase::Upload });

        if self.config.verify {
            self.verify(image, sink)?;
        }
        Ok(())
    }

    /// Reads back every defined byte of `image` and compares it
    /// byte-for-byte; the first mismatch is fatal.
    pub fn verify(&mut self, image: &MemoryImage, sink: ProgressSink) -> Result<(), Error> {
        sink(ProgressEvent::PhaseStarted { phase: Phase::Verify });
        let (first, last, count) = image.extent(0, crate::image::LEN_IMAGE as u32 - 1)?;
        let mut bytes_done = 0u32;
        for (addr, expected) in plan_read_chunks(image, first, last) {
            let mut readback = MemoryImage::new();
            self.engine.read(addr, expected.len(), &mut readback)?;
            for (i, &expected_byte) in expected.iter().enumerate() {
                let a = addr + i as u32;
                let actual = readback.get(a).unwrap_or(0);
                if actual != expected_byte {
                    return Err(Error::VerifyMismatch {
                        address: a,
                        expected: expected_byte,
                        actual,
                    });
                }
            }
            bytes_done += expected.len() as u32;
            sink(ProgressEvent::BytesTransferred {
                bytes_done,
                bytes_total: count,
            });
        }
        sink(ProgressEvent::PhaseFinished { phase: Phase::Verify });
        Ok(())
    }

    /// Reads `[lo, hi]` into a fresh image, in chunks of up to
    /// [`MAX_READ_CHUNK`] bytes.
    pub fn read_out(&mut self, lo: u32, hi: u32, sink: ProgressSink) -> Result<MemoryImage, Error> {
        sink(ProgressEvent::PhaseStarted { phase: Phase::ReadOut });
        let mut image = MemoryImage::new();
        let total = hi - lo + 1;
        let mut addr = lo;
        let mut bytes_done = 0u32;
        while addr <= hi {
            let remaining = (hi - addr + 1) as usize;
            let chunk_len = remaining.min(MAX_READ_CHUNK);
            self.engine.read(addr, chunk_len, &mut image)?;
            addr += chunk_len as u32;
            bytes_done += chunk_len as u32;
            sink(ProgressEvent::BytesTransferred {
                bytes_done,
                bytes_total: total,
            });
        }
        sink(ProgressEvent::PhaseFinished { phase: Phase::ReadOut });
        Ok(image)
    }

    /// Jumps to `addr` if `config.jump_after` is set, leaving BSL mode.
    pub fn go_if_requested(&mut self, sink: ProgressSink) -> Result<(), Error> {
        let Some(addr) = self.config.jump_after else {
            return Ok(());
        };
        sink(ProgressEvent::PhaseStarted { phase: Phase::Go });
        self.engine.go(addr)?;
        sink(ProgressEvent::PhaseFinished { phase: Phase::Go });
        Ok(())
    }

    /// Closes the transport. Called on every exit path by the caller.
    pub fn close(mut self) -> Result<(), Error> {
        self.engine.transport_mut().close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::null_sink;
    use crate::protocol::constants::{ACK, ERASE, GET, GO, READ, WRITE};
    use crate::test_support::MockTransport;

    /// Queues the fixed byte exchange `Session::open` performs (sync, then
    /// a `GET` identify round-trip resolving to BSL version `0x10`).
    fn queue_open(transport: &mut MockTransport) {
        transport.push_byte(ACK); // sync
        transport.push_byte(ACK); // GET command ack
        transport.push_reply(vec![5]);
        transport.push_reply(vec![0x10]);
        transport.push_reply(vec![GET, READ, WRITE, ERASE, GO]);
        transport.push_byte(ACK); // GET trailing ack
    }

    #[test]
    fn open_identifies_target() {
        let mut transport = MockTransport::new();
        queue_open(&mut transport);
        let session = Session::open(&mut transport, Config::default(), &mut |_| {}).unwrap();
        assert_eq!(session.target().bsl_version, 0x10);
    }

    #[test]
    fn program_skips_empty_image() {
        let mut transport = MockTransport::new();
        queue_open(&mut transport);
        {
            let mut session = Session::open(&mut transport, Config::default(), &mut |_| {}).unwrap();
            let image = MemoryImage::new();
            session.program(&image, &mut null_sink).unwrap();
        }
        assert_eq!(transport.sent, vec![0x7F, GET, !GET]);
    }

    #[test]
    fn program_applies_configured_transform_before_upload() {
        let mut transport = MockTransport::new();
        queue_open(&mut transport);
        transport.push_byte(ACK); // WRITE command ack
        transport.push_byte(ACK); // address ack
        transport.push_byte(ACK); // payload ack
        {
            let mut config = Config::default();
            // Address 0x0000 is outside the flash/option-byte ranges that
            // would otherwise trigger a RAM-routine side-load first.
            config.transforms = vec![Transform::Fill {
                lo: 0x0000,
                hi: 0x0000,
                value: 0xAB,
            }];
            let mut session = Session::open(&mut transport, config, &mut |_| {}).unwrap();
            // The caller's image is empty; the configured fill transform is
            // what actually produces a byte to upload.
            let image = MemoryImage::new();
            session.program(&image, &mut null_sink).unwrap();
        }
        // Last three sent bytes are the WRITE payload: length-minus-one,
        // the filled data byte, and their XOR checksum.
        let write_payload = &transport.sent[transport.sent.len() - 3..];
        assert_eq!(write_payload, &[0x00, 0xAB, 0xAB]);
    }

    #[test]
    fn read_out_assembles_contiguous_range() {
        let mut transport = MockTransport::new();
        queue_open(&mut transport);
        transport.push_byte(ACK); // READ command ack
        transport.push_byte(ACK); // address ack
        transport.push_byte(ACK); // count ack
        transport.push_reply(vec![1, 2, 3, 4]);
        let image = {
            let mut session = Session::open(&mut transport, Config::default(), &mut |_| {}).unwrap();
            session.read_out(0x8000, 0x8003, &mut null_sink).unwrap()
        };
        assert_eq!(image.get(0x8000), Some(1));
        assert_eq!(image.get(0x8003), Some(4));
    }
}
