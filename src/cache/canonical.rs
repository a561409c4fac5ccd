//! Order-independent context serialization.
//!
//! # Byte layout
//!
//! All integers are big-endian. Fields are visited in ascending byte order
//! of their names; for each field:
//!
//! ```text
//! u32  name length | name bytes (UTF-8)
//! u32  value count
//! per value, ordinary field:          u32 length | value bytes (UTF-8)
//! per value, high-cardinality field:  u32 8      | u64 reduced value
//! ```
//!
//! Every field's raw values are sorted by their bytes first. High-cardinality
//! values are then replaced by their reduction in that order, so the
//! position of a bucket follows the raw value it came from. Length prefixes
//! keep `{"ab": ["c"]}` distinct from `{"a": ["bc"]}`.

use crate::cache::high_cardinality::HighCardinalityKeys;
use crate::types::Context;

/// Serialize `context` into canonical bytes, reducing high-cardinality fields.
///
/// Pure: identical inputs always produce identical output.
pub fn canonicalize(context: &Context, high_cardinality: &HighCardinalityKeys) -> Vec<u8> {
    let mut names: Vec<&String> = context.fields.keys().collect();
    names.sort_unstable();

    let mut out = Vec::with_capacity(estimate_len(context));
    for name in names {
        let values = &context.fields[name];
        write_chunk(&mut out, name.as_bytes());
        write_len(&mut out, values.len());

        let mut sorted: Vec<&String> = values.iter().collect();
        sorted.sort_unstable();
        let reducer = high_cardinality.reducer(name);
        for value in sorted {
            match reducer {
                Some(reducer) => {
                    write_chunk(&mut out, &reducer.reduce(value.as_bytes()).to_be_bytes())
                }
                None => write_chunk(&mut out, value.as_bytes()),
            }
        }
    }
    out
}

fn write_chunk(out: &mut Vec<u8>, bytes: &[u8]) {
    write_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    // Bounded by the gRPC message size limit.
    out.extend_from_slice(&(len as u32).to_be_bytes());
}

fn estimate_len(context: &Context) -> usize {
    context
        .fields
        .iter()
        .map(|(k, vs)| 8 + k.len() + vs.iter().map(|v| 4 + v.len().max(8)).sum::<usize>())
        .sum()
}
