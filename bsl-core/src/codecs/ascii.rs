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

//! ASCII address/value table codec: `# addr\tvalue` per line, decimal or
//! `0x`-prefixed hex tokens. Lines starting with `#` are comments.

use crate::error::Error;
use crate::image::MemoryImage;
use std::fmt::Write as _;

fn parse_token(token: &str, line: usize) -> Result<u64, Error> {
    let (body, radix) = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(rest) => (rest, 16),
        None => (token, 10),
    };
    if body.is_empty() {
        return Err(Error::InvalidCharacter { line, character: '?' });
    }
    for c in body.chars() {
        let valid = if radix == 16 {
            c.is_ascii_hexdigit()
        } else {
            c.is_ascii_digit()
        };
        if !valid {
            return Err(Error::InvalidCharacter { line, character: c });
        }
    }
    u64::from_str_radix(body, radix).map_err(|_| Error::InvalidCharacter { line, character: '?' })
}

/// Decodes `text` and merges every `addr\tvalue` line into `image`.
pub fn decode(text: &str, image: &mut MemoryImage) -> Result<(), Error> {
    for (line_idx, raw_line) in text.lines().enumerate() {
        let line = line_idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let addr_tok = parts.next().ok_or(Error::InvalidCharacter { line, character: '?' })?;
        let value_tok = parts.next().ok_or(Error::InvalidCharacter { line, character: '?' })?;
        if parts.next().is_some() {
            return Err(Error::InvalidCharacter { line, character: '?' });
        }

        let addr = parse_token(addr_tok, line)?;
        let value = parse_token(value_tok, line)?;
        if addr as usize >= crate::image::LEN_IMAGE {
            return Err(Error::FileBufferExceeded);
        }
        if value > 0xFF {
            return Err(Error::InvalidCharacter { line, character: '?' });
        }
        image.set(addr as u32, value as u8);
    }
    Ok(())
}

/// Emits a `# address\tvalue` header, then one `0xAAAA\t0xDD` line per
/// defined byte in `[first, last]`, ascending.
pub fn encode(image: &MemoryImage) -> Result<Vec<u8>, Error> {
    let (first, last, count) = image.extent(0, crate::image::LEN_IMAGE as u32 - 1)?;
    let mut out = String::new();
    writeln!(out, "# address\tvalue").unwrap();
    if count == 0 {
        return Ok(out.into_bytes());
    }
    for addr in first..=last {
        if let Some(value) = image.get(addr) {
            writeln!(out, "0x{:04X}\t0x{:02X}", addr, value).unwrap();
        }
    }
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_decimal_and_hex() {
        let mut image = MemoryImage::new();
        decode("# a table\n0x1000\t0xAB\n4096\t171\n", &mut image).unwrap();
        assert_eq!(image.get(0x1000), Some(0xAB));
    }

    #[test]
    fn rejects_garbage_token() {
        let mut image = MemoryImage::new();
        let err = decode("0xZZ\t0x01\n", &mut image).unwrap_err();
        assert!(matches!(err, Error::InvalidCharacter { line: 1, .. }));
    }

    #[test]
    fn round_trips_sparse_image() {
        let mut image = MemoryImage::new();
        image.set(0x10, 1);
        image.set(0x20, 2);
        let encoded = encode(&image).unwrap();
        let mut decoded = MemoryImage::new();
        decode(std::str::from_utf8(&encoded).unwrap(), &mut decoded).unwrap();
        assert_eq!(decoded.get(0x10), Some(1));
        assert_eq!(decoded.get(0x20), Some(2));
        assert_eq!(decoded.extent(0, 0xFF).unwrap(), (0x10, 0x20, 2));
    }
}
