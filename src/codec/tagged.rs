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

//! Tagged-value codec for dynamic message payloads.
//!
//! Device applications treat messages as untyped values: primitives, lists,
//! and maps. On this side the payload universe is the closed sum type
//! [`Value`], encoded as one type-tag byte followed by a type-specific
//! payload. Tag values mirror the device scripting runtime's type codes so
//! payloads decode on the watch unchanged.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────┬──────────────────────────────────────────────────────┐
//! │ Tag  │ Payload                                              │
//! ├──────┼──────────────────────────────────────────────────────┤
//! │ 0x00 │ null: empty                                          │
//! │ 0x01 │ int32, big-endian                                    │
//! │ 0x02 │ float32, IEEE-754 big-endian                         │
//! │ 0x03 │ string: u32 byte length, UTF-8 bytes                 │
//! │ 0x05 │ list: u32 count, recursively encoded elements        │
//! │ 0x09 │ bool: one byte, 0 or 1                               │
//! │ 0x0B │ map: u32 count, recursively encoded key/value pairs  │
//! │ 0x0E │ int64, big-endian                                    │
//! │ 0x0F │ float64, IEEE-754 big-endian                         │
//! │ 0x13 │ char: Unicode scalar value as int32, big-endian      │
//! └──────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding is forgiving by contract: malformed or unknown input yields
//! `None` rather than an error, so a bad payload drops one message instead
//! of poisoning the channel.

const TAG_NULL: u8 = 0x00;
const TAG_INT32: u8 = 0x01;
const TAG_FLOAT32: u8 = 0x02;
const TAG_STRING: u8 = 0x03;
const TAG_LIST: u8 = 0x05;
const TAG_BOOL: u8 = 0x09;
const TAG_MAP: u8 = 0x0B;
const TAG_INT64: u8 = 0x0E;
const TAG_FLOAT64: u8 = 0x0F;
const TAG_CHAR: u8 = 0x13;

/// A dynamically typed message payload.
///
/// Maps are unordered entry collections: two maps compare equal when they
/// hold the same entry set, regardless of insertion order. All other
/// variants compare structurally.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Str(String),
    /// Single Unicode scalar.
    Char(char),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Unordered map with dynamic keys.
    Map(Vec<(Value, Value)>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(bk, bv)| k == bk && v == bv))
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

/// Encodes a value to its tagged wire form.
#[must_use]
pub fn serialize(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(value, &mut out);
    out
}

/// Decodes a single tagged value.
///
/// Returns `None` on malformed or unknown input; trailing bytes after the
/// first complete value are ignored.
#[must_use]
pub fn deserialize(bytes: &[u8]) -> Option<Value> {
    let mut reader = Reader { bytes, pos: 0 };
    reader.read_value()
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        Value::Int32(v) => {
            out.push(TAG_INT32);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Int64(v) => {
            out.push(TAG_INT64);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float32(v) => {
            out.push(TAG_FLOAT32);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float64(v) => {
            out.push(TAG_FLOAT64);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Str(v) => {
            out.push(TAG_STRING);
            out.extend_from_slice(&(v.len() as u32).to_be_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        Value::Char(v) => {
            out.push(TAG_CHAR);
            out.extend_from_slice(&(*v as i32).to_be_bytes());
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                write_value(item, out);
            }
        }
        Value::Map(entries) => {
            out.push(TAG_MAP);
            out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
            for (key, value) in entries {
                write_value(key, out);
                write_value(value, out);
            }
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn read_value(&mut self) -> Option<Value> {
        let tag = self.read_u8()?;
        match tag {
            TAG_NULL => Some(Value::Null),
            TAG_BOOL => match self.read_u8()? {
                0 => Some(Value::Bool(false)),
                1 => Some(Value::Bool(true)),
                _ => None,
            },
            TAG_INT32 => Some(Value::Int32(i32::from_be_bytes(self.read_array()?))),
            TAG_INT64 => Some(Value::Int64(i64::from_be_bytes(self.read_array()?))),
            TAG_FLOAT32 => Some(Value::Float32(f32::from_be_bytes(self.read_array()?))),
            TAG_FLOAT64 => Some(Value::Float64(f64::from_be_bytes(self.read_array()?))),
            TAG_STRING => {
                let len = self.read_len()?;
                let bytes = self.read_slice(len)?;
                String::from_utf8(bytes.to_vec()).ok().map(Value::Str)
            }
            TAG_CHAR => {
                let code = i32::from_be_bytes(self.read_array()?);
                u32::try_from(code).ok().and_then(char::from_u32).map(Value::Char)
            }
            TAG_LIST => {
                let count = self.read_len()?;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                Some(Value::List(items))
            }
            TAG_MAP => {
                let count = self.read_len()?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    entries.push((key, value));
                }
                Some(Value::Map(entries))
            }
            _ => None,
        }
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn read_slice(&mut self, len: usize) -> Option<&[u8]> {
        let slice = self.bytes.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Some(out)
    }

    /// Reads a u32 length/count prefix, rejecting counts that cannot
    /// possibly fit in the remaining input.
    fn read_len(&mut self) -> Option<usize> {
        let len = u32::from_be_bytes(self.read_array()?) as usize;
        if len > self.bytes.len().saturating_sub(self.pos) {
            return None;
        }
        Some(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let data = serialize(&value);
        assert_eq!(deserialize(&data), Some(value));
    }

    #[test]
    fn string_round_trips() {
        round_trip(Value::from("Hello, world!"));
    }

    #[test]
    fn integer_round_trips() {
        round_trip(Value::Int32(3));
        round_trip(Value::Int32(4711));
        round_trip(Value::Int32(i32::MIN));
        round_trip(Value::Int64(i64::MAX));
    }

    #[test]
    fn null_round_trips_symmetrically() {
        let data = serialize(&Value::Null);
        assert_eq!(deserialize(&data), Some(Value::Null));
    }

    #[test]
    fn nested_list_round_trips() {
        // ["a", "b", true, 3, 3.4f, [5L, 9], 42]
        round_trip(Value::List(vec![
            Value::from("a"),
            Value::from("b"),
            Value::from(true),
            Value::from(3),
            Value::from(3.4f32),
            Value::List(vec![Value::from(5i64), Value::from(9)]),
            Value::from(42),
        ]));
    }

    #[test]
    fn all_primitive_types_round_trip() {
        round_trip(Value::List(vec![
            Value::from(1),
            Value::from(1.2f32),
            Value::from(1.3f64),
            Value::from("A"),
            Value::from(true),
            Value::from(2i64),
            Value::from('X'),
            Value::Null,
        ]));
    }

    #[test]
    fn map_round_trips() {
        round_trip(Value::Map(vec![
            (Value::from("a"), Value::from("abc")),
            (Value::from("c"), Value::from(3)),
            (
                Value::from("d"),
                Value::List(vec![Value::from(4), Value::from(9), Value::from("abc")]),
            ),
            (Value::from(true), Value::Null),
        ]));
    }

    #[test]
    fn map_equality_ignores_entry_order() {
        let a = Value::Map(vec![
            (Value::from("a"), Value::from(1)),
            (Value::from("b"), Value::from(2)),
        ]);
        let b = Value::Map(vec![
            (Value::from("b"), Value::from(2)),
            (Value::from("a"), Value::from(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn unicode_string_round_trips() {
        round_trip(Value::from("Grüße ☀ 血糖"));
        round_trip(Value::from('ß'));
    }

    #[test]
    fn malformed_input_decodes_to_none() {
        // Unknown tag.
        assert_eq!(deserialize(&[0xFF]), None);
        // Truncated int32 payload.
        assert_eq!(deserialize(&[TAG_INT32, 0x00]), None);
        // Empty input.
        assert_eq!(deserialize(&[]), None);
        // List count larger than the remaining buffer.
        assert_eq!(deserialize(&[TAG_LIST, 0xFF, 0xFF, 0xFF, 0xFF]), None);
        // Invalid bool payload.
        assert_eq!(deserialize(&[TAG_BOOL, 7]), None);
        // Invalid UTF-8 string bytes.
        assert_eq!(deserialize(&[TAG_STRING, 0, 0, 0, 1, 0xFF]), None);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut data = serialize(&Value::from(7));
        data.extend_from_slice(&[1, 2, 3]);
        assert_eq!(deserialize(&data), Some(Value::from(7)));
    }
}
