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

//! End-to-end scenarios, one per test, matching the worked examples used
//! to validate this crate's wire and codec behavior.

use bsl_core::codecs::{ihex, srecord};
use bsl_core::error::Error;
use bsl_core::frame::{FrameLayer, Interface, UartMode};
use bsl_core::image::MemoryImage;
use bsl_core::protocol::constants::{ACK, DEFAULT_SYNC_RETRIES};
use bsl_core::protocol::engine::{plan_write_chunks, ProtocolEngine};
use bsl_core::test_support::MockTransport;

#[test]
fn parse_s_record() {
    let mut image = MemoryImage::new();
    srecord::decode(
        "S1130000000102030405060708090A0B0C0D0E0F74\nS9030000FC",
        &mut image,
    )
    .unwrap();
    assert_eq!(image.extent(0, 0xFFFF).unwrap(), (0, 15, 16));
    for addr in 0u32..16 {
        assert_eq!(image.get(addr), Some(addr as u8));
    }
}

#[test]
fn parse_intel_hex_with_extended_linear_address() {
    // The correct two's-complement checksum for the data record is 0x52;
    // see DESIGN.md for the arithmetic.
    let mut image = MemoryImage::new();
    ihex::decode(
        ":020000040001F9\n:040000001122334452\n:00000001FF",
        &mut image,
    )
    .unwrap();
    assert_eq!(image.get(0x10000), Some(0x11));
    assert_eq!(image.get(0x10001), Some(0x22));
    assert_eq!(image.get(0x10002), Some(0x33));
    assert_eq!(image.get(0x10003), Some(0x44));
    assert_eq!(image.get(0x10004), None);
    assert_eq!(image.get(0x0000), None);
}

#[test]
fn round_trip_sparse_image_via_intel_hex() {
    let mut image = MemoryImage::new();
    image.set(0x8000, 0xAA);
    image.set(0x8001, 0xBB);
    image.set(0xFFFE, 0x55);

    let encoded = ihex::encode(&image).unwrap();
    let mut decoded = MemoryImage::new();
    ihex::decode(std::str::from_utf8(&encoded).unwrap(), &mut decoded).unwrap();

    assert_eq!(decoded.extent(0, 0xFFFFFF).unwrap(), (0x8000, 0xFFFE, 3));
    assert_eq!(decoded.get(0x8000), Some(0xAA));
    assert_eq!(decoded.get(0x8001), Some(0xBB));
    assert_eq!(decoded.get(0xFFFE), Some(0x55));
}

#[test]
fn sync_retry_succeeds_within_budget() {
    let mut transport = MockTransport::new();
    for _ in 0..4 {
        transport.push_timeout();
    }
    transport.push_byte(ACK);
    let mut engine = ProtocolEngine::new(FrameLayer::new(
        &mut transport,
        Interface::Uart(UartMode::FullDuplex),
    ));
    engine.sync(DEFAULT_SYNC_RETRIES).unwrap();
}

#[test]
fn sync_retry_exhausted_fails() {
    let mut transport = MockTransport::new();
    for _ in 0..DEFAULT_SYNC_RETRIES {
        transport.push_timeout();
    }
    let mut engine = ProtocolEngine::new(FrameLayer::new(
        &mut transport,
        Interface::Uart(UartMode::FullDuplex),
    ));
    let err = engine.sync(DEFAULT_SYNC_RETRIES).unwrap_err();
    assert!(matches!(
        err,
        Error::TooManySyncAttempts {
            attempts
        } if attempts == DEFAULT_SYNC_RETRIES
    ));
}

#[test]
fn read_transaction_framing_matches_wire_contract() {
    let mut transport = MockTransport::new();
    transport.push_byte(ACK);
    transport.push_byte(ACK);
    transport.push_byte(ACK);
    transport.push_reply(vec![0x11, 0x22, 0x33, 0x44]);
    let mut engine = ProtocolEngine::new(FrameLayer::new(
        &mut transport,
        Interface::Uart(UartMode::FullDuplex),
    ));
    let mut image = MemoryImage::new();
    engine.read(0x8000, 4, &mut image).unwrap();

    assert_eq!(
        transport.sent,
        vec![0x11, 0xEE, 0x00, 0x00, 0x80, 0x00, 0x80, 0x03, 0xFC]
    );
    assert_eq!(image.get(0x8000), Some(0x11));
    assert_eq!(image.get(0x8003), Some(0x44));
}

#[test]
fn block_plan_splits_256_bytes_into_two_128_byte_chunks() {
    let mut image = MemoryImage::new();
    image.fill(0x8000, 0x80FF, 0x00).unwrap();
    let chunks = plan_write_chunks(&image, 0x8000, 0x80FF);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].0, 0x8000);
    assert_eq!(chunks[0].1.len(), 128);
    assert_eq!(chunks[1].0, 0x8080);
    assert_eq!(chunks[1].1.len(), 128);
}
