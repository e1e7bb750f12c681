use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::error::HookConfigError;
use crate::hook::{HookSpec, MAX_HOOK_KEY};

/// Size of one binary hook record: start, length and a flags word, each a native-endian `i32`.
pub const HOOK_RECORD_LEN: usize = 12;

const SILENCED_BIT: u8 = 0x80;

/// Reads `count` binary hook records.
///
/// The third word's first three bytes are `key` (bit 7 = start silenced), `dedupe` and `coalesce`;
/// the flag bytes count as set only when equal to 1.
pub fn read_hook_records<R: Read>(
    mut reader: R,
    count: usize,
) -> Result<Vec<HookSpec>, HookConfigError> {
    let mut specs = Vec::with_capacity(count);
    let mut record = [0u8; HOOK_RECORD_LEN];
    for read in 0..count {
        if let Err(err) = reader.read_exact(&mut record) {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                return Err(HookConfigError::Truncated {
                    read,
                    expected: count,
                });
            }
            return Err(err.into());
        }
        specs.push(decode_record(&record)?);
    }
    Ok(specs)
}

fn decode_record(record: &[u8; HOOK_RECORD_LEN]) -> Result<HookSpec, HookConfigError> {
    let word = |i: usize| i32::from_ne_bytes([record[i], record[i + 1], record[i + 2], record[i + 3]]);
    let start = word(0) as u32;
    let length = word(4);
    let [raw_key, dedupe, coalesce, _] = [record[8], record[9], record[10], record[11]];
    let key = raw_key & MAX_HOOK_KEY;

    let length = u32::try_from(length)
        .map_err(|_| HookConfigError::NegativeLength { key, length })?;
    Ok(HookSpec {
        key,
        start,
        length,
        dedupe: dedupe == 1,
        coalesce: coalesce == 1,
        silenced: raw_key & SILENCED_BIT != 0,
    })
}

/// Inverse of [`read_hook_records`] for a single hook.
pub fn encode_hook_record(spec: &HookSpec) -> [u8; HOOK_RECORD_LEN] {
    let mut out = [0u8; HOOK_RECORD_LEN];
    out[..4].copy_from_slice(&(spec.start as i32).to_ne_bytes());
    out[4..8].copy_from_slice(&(spec.length as i32).to_ne_bytes());
    out[8] = (spec.key & MAX_HOOK_KEY) | if spec.silenced { SILENCED_BIT } else { 0 };
    out[9] = u8::from(spec.dedupe);
    out[10] = u8::from(spec.coalesce);
    out
}

pub fn parse_json_hooks(raw: &str) -> Result<Vec<HookSpec>, HookConfigError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn load_json_hooks(path: &Path) -> Result<Vec<HookSpec>, HookConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_json_hooks(&raw)
}
