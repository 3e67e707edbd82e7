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

//! Intel HEX codec.
//!
//! Understands type 00 (data), 01 (EOF), 02 (extended segment address,
//! explicit error per the open question in the design notes), 03 (start
//! segment, ignored), 04 (extended linear address, shifts the base by 16
//! bits), 05 (start linear address, ignored). Any other type is an error.

use super::chunk_defined_runs;
use crate::error::Error;
use crate::image::MemoryImage;
use std::fmt::Write as _;

const BLOCK_SIZE: usize = 32;

fn hex_pair(bytes: &[u8], offset: usize, line: usize) -> Result<u8, Error> {
    let pair = bytes
        .get(offset..offset + 2)
        .ok_or(Error::HexInvalidStart { line })?;
    let text = std::str::from_utf8(pair).map_err(|_| Error::InvalidCharacter {
        line,
        character: pair[0] as char,
    })?;
    u8::from_str_radix(text, 16).map_err(|_| Error::InvalidCharacter {
        line,
        character: text.chars().next().unwrap_or('?'),
    })
}

/// Decodes `text` and merges every type-00 data byte into `image`.
pub fn decode(text: &str, image: &mut MemoryImage) -> Result<(), Error> {
    let mut base: u32 = 0;
    for (line_idx, raw_line) in text.lines().enumerate() {
        let line = line_idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let bytes = trimmed.as_bytes();
        if bytes[0] != b':' {
            return Err(Error::HexInvalidStart { line });
        }
        let hex_body = &bytes[1..];
        if hex_body.len() % 2 != 0 || hex_body.len() < 8 {
            return Err(Error::HexInvalidStart { line });
        }
        let mut fields = Vec::with_capacity(hex_body.len() / 2);
        for offset in (0..hex_body.len()).step_by(2) {
            fields.push(hex_pair(hex_body, offset, line)?);
        }

        let length = fields[0] as usize;
        if fields.len() != length + 5 {
            return Err(Error::HexInvalidStart { line });
        }
        let address = ((fields[1] as u32) << 8) | fields[2] as u32;
        let record_type = fields[3];
        let data = &fields[4..4 + length];
        let checksum = fields[4 + length];

        let sum: u32 = fields[..fields.len() - 1].iter().map(|&b| b as u32).sum();
        let expected = (0u32.wrapping_sub(sum) & 0xFF) as u8;
        if expected != checksum {
            return Err(Error::HexChecksum {
                line,
                expected,
                computed: checksum,
            });
        }

        match record_type {
            0x00 => {
                for (i, &byte) in data.iter().enumerate() {
                    let cell_addr = base
                        .checked_add(address)
                        .and_then(|a| a.checked_add(i as u32))
                        .ok_or(Error::HexAddressOverflow { line })?;
                    if cell_addr as usize >= crate::image::LEN_IMAGE {
                        return Err(Error::FileBufferExceeded);
                    }
                    image.set(cell_addr, byte);
                }
            }
            0x01 => break, // EOF
            0x02 => return Err(Error::HexUnsupportedType { line, record_type }),
            0x03 => {} // start segment address: ignored
            0x04 => {
                if data.len() != 2 {
                    return Err(Error::HexInvalidStart { line });
                }
                base = ((data[0] as u32) << 24) | ((data[1] as u32) << 16);
            }
            0x05 => {} // start linear address: ignored
            other => return Err(Error::HexUnsupportedType { line, record_type: other }),
        }
    }
    Ok(())
}

/// Like [`chunk_defined_runs`], but additionally splits any chunk that would
/// straddle a 0x10000 boundary, so every emitted data record's bytes share a
/// single extended-linear-address segment.
fn chunk_defined_runs_no_segment_crossing(
    image: &MemoryImage,
    lo: u32,
    hi: u32,
    max_chunk: usize,
) -> Vec<(u32, Vec<u8>)> {
    let mut out = Vec::new();
    for (addr, data) in chunk_defined_runs(image, lo, hi, max_chunk) {
        let mut start = addr;
        let mut remaining = data.as_slice();
        while !remaining.is_empty() {
            let segment_end = (start & !0xFFFF) + 0x1_0000;
            let room = (segment_end - start) as usize;
            let take = room.min(remaining.len());
            out.push((start, remaining[..take].to_vec()));
            start += take as u32;
            remaining = &remaining[take..];
        }
    }
    out
}

fn push_record(out: &mut String, record_type: u8, address: u16, data: &[u8]) {
    let length = data.len() as u8;
    let mut sum: u32 = length as u32
        + (address >> 8) as u32
        + (address & 0xFF) as u32
        + record_type as u32;
    for &b in data {
        sum += b as u32;
    }
    let checksum = (0u32.wrapping_sub(sum) & 0xFF) as u8;

    write!(out, ":{:02X}{:04X}{:02X}", length, address, record_type).unwrap();
    for &b in data {
        write!(out, "{:02X}", b).unwrap();
    }
    writeln!(out, "{:02X}", checksum).unwrap();
}

/// Emits every defined byte of `image`, inserting an extended-linear-address
/// record whenever a block's upper 16 address bits change.
pub fn encode(image: &MemoryImage) -> Result<Vec<u8>, Error> {
    let (first, last, count) = image.extent(0, crate::image::LEN_IMAGE as u32 - 1)?;
    let mut out = String::new();
    if count == 0 {
        writeln!(out, ":00000001FF").unwrap();
        return Ok(out.into_bytes());
    }

    let mut current_upper: Option<u32> = None;
    for (addr, data) in chunk_defined_runs_no_segment_crossing(image, first, last, BLOCK_SIZE) {
        let upper = addr >> 16;
        if current_upper != Some(upper) {
            let ela = [((upper >> 8) & 0xFF) as u8, (upper & 0xFF) as u8];
            push_record(&mut out, 0x04, 0x0000, &ela);
            current_upper = Some(upper);
        }
        push_record(&mut out, 0x00, (addr & 0xFFFF) as u16, &data);
    }
    push_record(&mut out, 0x01, 0x0000, &[]);

    Ok(out.into_bytes())
}
