//! Base64 VLQ decoding of the `mappings` field.

use crate::error::{RestoreError, Result};

const CONTINUATION: i64 = 0b10_0000;
const DATA_MASK: i64 = 0b01_1111;
const MAX_SHIFT: u32 = 32;

fn base64_value(byte: u8) -> Option<i64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(i64::from(value))
}

/// Decode every VLQ value of one segment
fn decode_segment(segment: &str) -> std::result::Result<Vec<i64>, String> {
    let mut values = Vec::with_capacity(5);
    let mut value = 0i64;
    let mut shift = 0u32;

    for byte in segment.bytes() {
        let digit = base64_value(byte).ok_or_else(|| format!("invalid character {:?}", byte as char))?;
        if shift >= MAX_SHIFT {
            return Err("value overflows 32 bits".to_string());
        }
        value += (digit & DATA_MASK) << shift;
        if digit & CONTINUATION != 0 {
            shift += 5;
            continue;
        }
        let negative = value & 1 == 1;
        let magnitude = value >> 1;
        values.push(if negative { -magnitude } else { magnitude });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err("truncated value".to_string());
    }
    Ok(values)
}

/// Walk every mapping segment and report the absolute source index of each one
/// that has a source, in mapping order.
pub(crate) fn for_each_source(
    mappings: &str,
    source_count: usize,
    mut visit: impl FnMut(usize),
) -> Result<()> {
    let mut source = 0i64;

    for (line, line_mappings) in mappings.split(';').enumerate() {
        for (segment_idx, segment) in line_mappings.split(',').enumerate() {
            if segment.is_empty() {
                continue;
            }
            let fields = decode_segment(segment)
                .map_err(|reason| RestoreError::mappings(line, segment_idx, reason))?;

            match fields.len() {
                1 => continue,
                4 | 5 => {}
                n => {
                    return Err(RestoreError::mappings(
                        line,
                        segment_idx,
                        format!("segment has {n} fields"),
                    ))
                }
            }

            source += fields[1];
            match usize::try_from(source) {
                Ok(index) if index < source_count => visit(index),
                _ => {
                    return Err(RestoreError::SourceOutOfRange {
                        index: source,
                        count: source_count,
                    })
                }
            }
        }
    }
    Ok(())
}
