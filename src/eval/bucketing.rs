//! Deterministic bucketing for percentage rollouts and experiments.

use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::context::{Context, Kind};

/// Maximum value representable by the first 15 hex digits of the hash.
const LONG_SCALE: f64 = 0xFFF_FFFF_FFFF_FFFF_u64 as f64;

/// Map a context to a pseudo-random fraction in `[0, 1)`.
///
/// The hash input is `<seed>` or `<key>.<salt>` as prefix, then `.<value>`
/// where `value` is the resolved bucket-by attribute, then `.<secondary>` if
/// the individual context carries a legacy secondary key. The first 15 hex
/// digits of the SHA-1 digest, divided by the largest 15-hex-digit value,
/// give the fraction. The algorithm is a cross-SDK contract and must stay
/// bit-for-bit reproducible.
///
/// Returns `None` when the context has no individual context of the wanted
/// kind, or the bucket-by attribute is absent or not a string or integer.
/// Callers treat `None` as "selects nothing", which rollout resolution turns
/// into last-bucket selection.
pub(crate) fn bucket_context(
    context: &Context,
    context_kind: Option<&Kind>,
    key: &str,
    bucket_by: Option<&str>,
    salt: &str,
    seed: Option<i64>,
) -> Option<f64> {
    let single = context.individual(context_kind)?;
    let value = single.attribute(bucket_by.unwrap_or("key"))?;
    let value = bucketable_string(&value)?;

    let mut input = match seed {
        Some(seed) => seed.to_string(),
        None => format!("{key}.{salt}"),
    };
    input.push('.');
    input.push_str(&value);
    if let Some(secondary) = single.secondary() {
        input.push('.');
        input.push_str(secondary);
    }

    let hash = Sha1::digest(input.as_bytes());
    // The top 60 bits of the digest are exactly its first 15 hex digits.
    let numerator = u64::from_be_bytes(hash[..8].try_into().unwrap()) >> 4;
    Some(numerator as f64 / LONG_SCALE)
}

/// Strings bucket as-is; integers bucket as their decimal form; everything
/// else does not bucket.
fn bucketable_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_i64().map(|i| i.to_string()),
        _ => None,
    }
}
