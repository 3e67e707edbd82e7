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

//! Raw binary codec. Every decoded byte becomes defined; every byte emitted
//! in a hole is rendered as `0x00` since the format cannot represent
//! sparseness. Round-trip only holds when the image has no holes.

use crate::error::Error;
use crate::image::MemoryImage;

/// Decodes `bytes` starting at `base_address`; every byte becomes defined.
pub fn decode(bytes: &[u8], base_address: u32, image: &mut MemoryImage) -> Result<(), Error> {
    for (i, &byte) in bytes.iter().enumerate() {
        let addr = base_address
            .checked_add(i as u32)
            .ok_or(Error::FileBufferExceeded)?;
        if addr as usize >= crate::image::LEN_IMAGE {
            return Err(Error::FileBufferExceeded);
        }
        image.set(addr, byte);
    }
    Ok(())
}

/// Emits the contiguous range `[first, last]`, rendering undefined bytes as
/// `0x00`. Lossy: holes are not represented.
pub fn encode(image: &MemoryImage) -> Result<Vec<u8>, Error> {
    let (first, last, count) = image.extent(0, crate::image::LEN_IMAGE as u32 - 1)?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity((last - first + 1) as usize);
    for addr in first..=last {
        out.push(image.get(addr).unwrap_or(0));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_defines_every_byte() {
        let mut image = MemoryImage::new();
        decode(&[0xDE, 0xAD, 0xBE, 0xEF], 0x2000, &mut image).unwrap();
        assert_eq!(image.get(0x2000), Some(0xDE));
        assert_eq!(image.get(0x2003), Some(0xEF));
    }

    #[test]
    fn round_trip_holds_without_holes() {
        let mut image = MemoryImage::new();
        let data = [1u8, 2, 3, 4];
        decode(&data, 0x100, &mut image).unwrap();
        let encoded = encode(&image).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn round_trip_fills_holes_with_zero() {
        let mut image = MemoryImage::new();
        image.set(0x100, 0xAA);
        image.set(0x102, 0xBB); // 0x101 left undefined
        let encoded = encode(&image).unwrap();
        assert_eq!(encoded, vec![0xAA, 0x00, 0xBB]);
    }
}
