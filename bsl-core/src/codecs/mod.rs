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

//! File codecs (C2): parse and emit the four supported formats against a
//! [`MemoryImage`](crate::image::MemoryImage). Every decoder is strict:
//! any structural or checksum deviation aborts with the offending line
//! number (text formats) or byte offset (binary).

pub mod ascii;
pub mod ihex;
pub mod raw;
pub mod srecord;

/// Groups the defined bytes of an image's window into contiguous runs, each
/// split further into chunks of at most `max_chunk` bytes. Shared by the
/// S-record and Intel HEX emitters, which both group output into
/// fixed-size blocks.
pub(crate) fn chunk_defined_runs(
    image: &crate::image::MemoryImage,
    lo: u32,
    hi: u32,
    max_chunk: usize,
) -> Vec<(u32, Vec<u8>)> {
    let mut chunks = Vec::new();
    let mut addr = lo;
    while addr <= hi {
        if !image.is_defined(addr) {
            addr += 1;
            continue;
        }
        let run_start = addr;
        let mut data = Vec::new();
        while addr <= hi && image.is_defined(addr) && data.len() < max_chunk {
            data.push(image.get(addr).unwrap());
            addr += 1;
        }
        chunks.push((run_start, data));
    }
    chunks
}
