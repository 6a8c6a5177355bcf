/*
 * Copyright (c) 2025.
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Delta/zigzag/varint encoding for integer tuple series.
//!
//! Each appended entry is a fixed-arity tuple of `i32` fields. Per field the
//! codec stores the difference to the previous entry's field, folds the sign
//! with zigzag encoding so small deltas in either direction stay small, and
//! writes the result as a varint (7-bit groups, least-significant first,
//! continuation bit in the MSB).
//!
//! The codec is stateful only with respect to "the previous tuple": streams
//! are decodable sequentially from the start, never randomly accessible.
//!
//! # Wire Format
//!
//! ```text
//! entry   := field{N}               (N fixed per stream)
//! field   := varint(zigzag(value - previous_value))
//! zigzag  := (delta << 1) ^ (delta >> 31)
//! varint  := 7-bit groups, LSB group first, MSB set on continuation bytes
//! ```
//!
//! The external representation for embedding in higher-level messages is
//! standard base64 over the written bytes ([`DeltaEncodedSeries::encoded_base64`])
//! or a little-endian 64-bit word view padded to an 8-byte boundary
//! ([`DeltaEncodedSeries::encoded_words`]).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// A growable, delta/zigzag/varint encoded series of fixed-arity `i32`
/// tuples.
#[derive(Debug, Clone)]
pub struct DeltaEncodedSeries {
    /// Previous entry's fields, one per tuple position.
    last_values: Vec<i32>,
    /// Backing buffer; always sized to an 8-byte boundary when pre-allocated.
    data: Vec<u8>,
    /// Number of logically written bytes.
    end: usize,
    /// Number of complete entries.
    len: usize,
}

/// Rounds up to the next multiple of 8 bytes.
const fn to_word_boundary(n: usize) -> usize {
    8 * ((n + 7) / 8)
}

const fn zigzag_encode(delta: i32) -> u32 {
    ((delta >> 31) ^ (delta << 1)) as u32
}

const fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

impl DeltaEncodedSeries {
    /// Creates an empty series for `entry_size`-field tuples with an initial
    /// buffer of at least `byte_size` bytes (rounded up to an 8-byte
    /// boundary).
    #[must_use]
    pub fn new(byte_size: usize, entry_size: usize) -> Self {
        Self {
            last_values: vec![0; entry_size],
            data: vec![0; to_word_boundary(byte_size)],
            end: 0,
            len: 0,
        }
    }

    /// Adopts an already-encoded stream.
    ///
    /// `last_values` must hold the final field values of the stream (the
    /// state the encoder ended with); the entry count is recovered by a
    /// sequential decode pass.
    #[must_use]
    pub fn from_encoded(last_values: Vec<i32>, bytes: &[u8]) -> Self {
        let mut series = Self {
            last_values,
            data: bytes.to_vec(),
            end: bytes.len(),
            len: 0,
        };
        let entry_size = series.entry_size();
        if entry_size > 0 {
            series.len = series.deltas().len() / entry_size;
        }
        series
    }

    /// Number of fields per entry.
    #[must_use]
    pub fn entry_size(&self) -> usize {
        self.last_values.len()
    }

    /// Number of complete entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the series holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of logically written bytes (no padding).
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.end
    }

    /// Current backing-buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Appends one entry.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the series' entry size; an
    /// arity mismatch is a contract violation by the caller.
    pub fn add(&mut self, values: &[i32]) {
        assert_eq!(
            values.len(),
            self.last_values.len(),
            "entry arity mismatch"
        );
        for (idx, &value) in values.iter().enumerate() {
            let delta = value.wrapping_sub(self.last_values[idx]);
            self.push_varint(zigzag_encode(delta));
            self.last_values[idx] = value;
        }
        self.len += 1;
    }

    /// Decodes the full series back to absolute values, flat in entry order.
    ///
    /// Reconstruction walks backwards from the final field values, exactly
    /// reversing the delta transform.
    #[must_use]
    pub fn to_vec(&self) -> Vec<i32> {
        let entry_size = self.entry_size();
        if entry_size == 0 {
            return Vec::new();
        }
        let mut values = self.deltas();
        let mut next = self.last_values.clone();
        let mut next_idx = entry_size - 1;
        for idx in (0..values.len()).rev() {
            let delta = values[idx];
            values[idx] = next[next_idx];
            next[next_idx] = next[next_idx].wrapping_sub(delta);
            next_idx = (next_idx + 1) % entry_size;
        }
        values
    }

    /// Decodes the full series grouped into entries.
    #[must_use]
    pub fn decode_all(&self) -> Vec<Vec<i32>> {
        let entry_size = self.entry_size();
        if entry_size == 0 {
            return Vec::new();
        }
        self.to_vec()
            .chunks(entry_size)
            .map(<[i32]>::to_vec)
            .collect()
    }

    /// The encoded stream as little-endian 64-bit words.
    ///
    /// The byte length backing this view is rounded up to the next multiple
    /// of 8 and zero padded, so reinterpretation never reads out of bounds.
    #[must_use]
    pub fn encoded_words(&self) -> Vec<i64> {
        let mut padded = self.data[..self.end].to_vec();
        padded.resize(to_word_boundary(self.end), 0);
        padded
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                i64::from_le_bytes(word)
            })
            .collect()
    }

    /// Standard base64 over the logically written bytes only (no padding).
    #[must_use]
    pub fn encoded_base64(&self) -> String {
        BASE64.encode(&self.data[..self.end])
    }

    /// Writes one zigzag-encoded value as a varint, doubling the buffer when
    /// exhausted.
    fn push_varint(&mut self, value: u32) {
        let mut remaining = value;
        loop {
            if self.end == self.data.len() {
                let grown = if self.data.is_empty() {
                    8
                } else {
                    2 * self.data.len()
                };
                self.data.resize(grown, 0);
            }
            if remaining & !0x7f != 0 {
                self.data[self.end] = (remaining & 0x7f) as u8 | 0x80;
            } else {
                self.data[self.end] = remaining as u8;
            }
            self.end += 1;
            remaining >>= 7;
            if remaining == 0 {
                break;
            }
        }
    }

    /// Reads the raw zigzag-decoded deltas, truncated to complete entries.
    fn deltas(&self) -> Vec<i32> {
        let bytes = &self.data[..self.end];
        let mut deltas = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let mut value: u32 = 0;
            let mut offset = 0;
            let mut complete = false;
            while pos < bytes.len() {
                let byte = bytes[pos];
                pos += 1;
                if offset < 32 {
                    value |= u32::from(byte & 0x7f) << offset;
                }
                offset += 7;
                if byte & 0x80 == 0 {
                    complete = true;
                    break;
                }
            }
            if !complete {
                break;
            }
            deltas.push(zigzag_decode(value));
        }
        let entry_size = self.entry_size();
        if entry_size > 0 {
            deltas.truncate(deltas.len() - deltas.len() % entry_size);
        }
        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_glucose_sample_pairs() {
        let mut series = DeltaEncodedSeries::new(16, 2);
        series.add(&[1001, 99]);
        series.add(&[1501, 105]);

        assert_eq!(series.len(), 2);
        assert_eq!(
            series.decode_all(),
            vec![vec![1001, 99], vec![1501, 105]]
        );
    }

    #[test]
    fn empty_series_encodes_to_zero_bytes() {
        let series = DeltaEncodedSeries::new(16, 2);
        assert!(series.is_empty());
        assert_eq!(series.byte_size(), 0);
        assert_eq!(series.encoded_base64(), "");
        assert!(series.encoded_words().is_empty());
    }

    #[test]
    fn negative_deltas_round_trip() {
        let mut series = DeltaEncodedSeries::new(8, 3);
        series.add(&[100, -5, 0]);
        series.add(&[50, -300, i32::MIN]);
        series.add(&[51, 7, i32::MAX]);

        assert_eq!(
            series.to_vec(),
            vec![100, -5, 0, 50, -300, i32::MIN, 51, 7, i32::MAX]
        );
    }

    #[test]
    fn buffer_doubles_when_exhausted() {
        let mut series = DeltaEncodedSeries::new(8, 1);
        for i in 0..100 {
            series.add(&[i * 1000]);
        }
        assert_eq!(series.len(), 100);
        assert!(series.capacity() >= series.byte_size());
        let decoded: Vec<i32> = series.to_vec();
        assert_eq!(decoded, (0..100).map(|i| i * 1000).collect::<Vec<_>>());
    }

    #[test]
    fn word_view_is_padded_to_eight_byte_boundary() {
        for entries in 1..16 {
            let mut series = DeltaEncodedSeries::new(0, 2);
            for i in 0..entries {
                series.add(&[i * 300, i]);
            }
            let words = series.encoded_words();
            assert!(words.len() * 8 >= series.byte_size());
            assert!(words.len() * 8 < series.byte_size() + 8);
        }
    }

    #[test]
    fn preallocated_capacity_is_word_aligned() {
        for byte_size in 0..64 {
            let series = DeltaEncodedSeries::new(byte_size, 2);
            assert_eq!(series.capacity() % 8, 0);
            assert!(series.capacity() >= byte_size);
        }
    }

    #[test]
    fn adopting_an_encoded_stream_recovers_entries() {
        let mut series = DeltaEncodedSeries::new(8, 2);
        series.add(&[1001, 99]);
        series.add(&[1501, 105]);
        series.add(&[2001, 98]);

        let bytes: Vec<u8> = {
            let words = series.encoded_words();
            let mut out = Vec::new();
            for w in words {
                out.extend_from_slice(&w.to_le_bytes());
            }
            out.truncate(series.byte_size());
            out
        };

        let adopted = DeltaEncodedSeries::from_encoded(vec![2001, 98], &bytes);
        assert_eq!(adopted.len(), 3);
        assert_eq!(
            adopted.decode_all(),
            vec![vec![1001, 99], vec![1501, 105], vec![2001, 98]]
        );
    }

    #[test]
    fn base64_covers_written_bytes_only() {
        let mut series = DeltaEncodedSeries::new(64, 2);
        series.add(&[1, 1]);
        let encoded = series.encoded_base64();
        // 2 one-byte varints -> 2 bytes -> 4 base64 chars with padding.
        assert_eq!(encoded.len(), 4);
    }

    #[test]
    #[should_panic(expected = "entry arity mismatch")]
    fn arity_mismatch_panics() {
        let mut series = DeltaEncodedSeries::new(8, 2);
        series.add(&[1]);
    }

    #[test]
    fn small_values_stay_small_on_the_wire() {
        let mut series = DeltaEncodedSeries::new(64, 2);
        series.add(&[300_000, 100]);
        series.add(&[300_300, 101]);
        series.add(&[300_600, 99]);
        // First entry pays for the absolute values; subsequent entries cost
        // two or three bytes each instead of eight.
        assert!(series.byte_size() < 6 + 2 * 4);
    }
}
