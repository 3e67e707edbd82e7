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

//! Motorola S-record codec.
//!
//! Accepts S1/S2/S3 data records; tolerates but ignores S0/S5/S7/S8/S9.
//! Emits S1/S2/S3 (narrowest sufficient for the highest defined address),
//! bracketed by a dummy S0 header and the matching termination record.

use super::chunk_defined_runs;
use crate::error::Error;
use crate::image::MemoryImage;
use std::fmt::Write as _;

const BLOCK_SIZE: usize = 32;

fn hex_byte(s: &[u8], line: usize) -> Result<u8, Error> {
    if s.len() != 2 {
        return Err(Error::SRecordInvalidStart { line });
    }
    let text = std::str::from_utf8(s).map_err(|_| Error::InvalidCharacter {
        line,
        character: s[0] as char,
    })?;
    u8::from_str_radix(text, 16).map_err(|_| Error::InvalidCharacter {
        line,
        character: text.chars().next().unwrap_or('?'),
    })
}

/// Address width, in bytes, carried by a given record type.
fn addr_width(record_type: u8) -> Option<usize> {
    match record_type {
        b'1' => Some(2),
        b'2' => Some(3),
        b'3' => Some(4),
        _ => None,
    }
}

/// Decodes `text` and merges every S1/S2/S3 data byte into `image`.
pub fn decode(text: &str, image: &mut MemoryImage) -> Result<(), Error> {
    for (line_idx, raw_line) in text.lines().enumerate() {
        let line = line_idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let bytes = trimmed.as_bytes();
        if bytes[0] != b'S' {
            return Err(Error::SRecordInvalidStart { line });
        }
        if bytes.len() < 2 {
            return Err(Error::SRecordInvalidStart { line });
        }
        let record_type = bytes[1];
        let hex_body = &bytes[2..];
        if hex_body.len() % 2 != 0 {
            return Err(Error::InvalidCharacter {
                line,
                character: *hex_body.last().unwrap_or(&b'?') as char,
            });
        }
        let mut fields = Vec::with_capacity(hex_body.len() / 2);
        for pair in hex_body.chunks(2) {
            fields.push(hex_byte(pair, line)?);
        }
        if fields.is_empty() {
            return Err(Error::SRecordInvalidStart { line });
        }
        let len = fields[0] as usize;
        let rest = &fields[1..];
        if rest.len() != len {
            return Err(Error::SRecordAddressOverflow { line });
        }
        let (checksum_byte, payload) = rest.split_last().ok_or(Error::SRecordInvalidStart { line })?;

        let sum: u32 = fields[0] as u32 + payload.iter().map(|&b| b as u32).sum::<u32>();
        let expected = !(sum as u8);
        if expected != *checksum_byte {
            return Err(Error::SRecordChecksum {
                line,
                expected,
                computed: *checksum_byte,
            });
        }

        let width = match addr_width(record_type) {
            Some(w) => w,
            None => continue, // S0, S5, S7, S8, S9: tolerated, no data.
        };
        if payload.len() < width {
            return Err(Error::SRecordAddressOverflow { line });
        }
        let (addr_bytes, data) = payload.split_at(width);
        let mut addr: u32 = 0;
        for &b in addr_bytes {
            addr = addr
                .checked_shl(8)
                .and_then(|a| a.checked_add(b as u32))
                .ok_or(Error::SRecordAddressOverflow { line })?;
        }
        for (i, &byte) in data.iter().enumerate() {
            let cell_addr = addr
                .checked_add(i as u32)
                .ok_or(Error::SRecordAddressOverflow { line })?;
            if cell_addr as usize >= crate::image::LEN_IMAGE {
                return Err(Error::FileBufferExceeded);
            }
            image.set(cell_addr, byte);
        }
    }
    Ok(())
}

fn push_record(out: &mut String, record_type: char, addr_width: usize, addr: u32, data: &[u8]) {
    let len = addr_width + data.len() + 1;
    let mut sum: u32 = len as u32;
    let addr_bytes = addr.to_be_bytes();
    let addr_bytes = &addr_bytes[4 - addr_width..];
    for &b in addr_bytes {
        sum += b as u32;
    }
    for &b in data {
        sum += b as u32;
    }
    let checksum = !(sum as u8);

    write!(out, "S{}{:02X}", record_type, len).unwrap();
    for &b in addr_bytes {
        write!(out, "{:02X}", b).unwrap();
    }
    for &b in data {
        write!(out, "{:02X}", b).unwrap();
    }
    writeln!(out, "{:02X}", checksum).unwrap();
}

/// Emits every defined byte of `image` as S-records, choosing the narrowest
/// record type (S1/S2/S3) that covers the highest emitted address.
pub fn encode(image: &MemoryImage) -> Result<Vec<u8>, Error> {
    let (first, last, count) = image.extent(0, crate::image::LEN_IMAGE as u32 - 1)?;
    let mut out = String::new();

    if count == 0 {
        push_record(&mut out, '0', 2, 0, b"HDR");
        writeln!(out, "S9030000FC").unwrap();
        return Ok(out.into_bytes());
    }

    let (record_type, addr_width, term_type) = if last <= 0xFFFF {
        ('1', 2, '9')
    } else if last <= 0xFF_FFFF {
        ('2', 3, '8')
    } else {
        ('3', 4, '7')
    };

    push_record(&mut out, '0', 2, 0, b"HDR");
    for (addr, data) in chunk_defined_runs(image, first, last, BLOCK_SIZE) {
        push_record(&mut out, record_type, addr_width, addr, &data);
    }
    push_record(&mut out, term_type, addr_width, 0, &[]);

    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sample_s1_record() {
        let data: Vec<u8> = (0u8..16).collect();
        let mut image = MemoryImage::new();
        decode("S1130000000102030405060708090A0B0C0D0E0F74\nS9030000FC", &mut image).unwrap();
        let (first, last, count) = image.extent(0, 0xFFFF).unwrap();
        assert_eq!((first, last, count), (0, 15, 16));
        for (addr, &expected) in data.iter().enumerate() {
            assert_eq!(image.get(addr as u32), Some(expected));
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut image = MemoryImage::new();
        let err = decode("S1130000000102030405060708090A0B0C0D0E0F00", &mut image).unwrap_err();
        assert!(matches!(err, Error::SRecordChecksum { line: 1, .. }));
    }

    #[test]
    fn ignores_header_and_termination_records() {
        let mut image = MemoryImage::new();
        decode("S0030000FC\nS1070000AABBCC6C\nS9030000FC", &mut image).unwrap();
        assert_eq!(image.get(0), Some(0xAA));
    }

    #[test]
    fn round_trips_sparse_image() {
        let mut image = MemoryImage::new();
        image.set(0x8000, 0xAA);
        image.set(0x8001, 0xBB);
        image.set(0xFFFE, 0x55);

        let encoded = encode(&image).unwrap();
        let mut decoded = MemoryImage::new();
        decode(std::str::from_utf8(&encoded).unwrap(), &mut decoded).unwrap();

        assert_eq!(decoded.extent(0, 0xFFFFFF).unwrap(), (0x8000, 0xFFFE, 3));
        assert_eq!(decoded.get(0x8000), Some(0xAA));
        assert_eq!(decoded.get(0x8001), Some(0xBB));
        assert_eq!(decoded.get(0xFFFE), Some(0x55));
    }
}
