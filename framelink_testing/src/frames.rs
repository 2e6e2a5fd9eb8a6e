//! Hand-built wire frames.

use framelink::byte_order::ByteOrder;

/// Frame `payload` exactly as it appears on the wire.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
#[must_use]
pub fn frame(payload: &[u8]) -> Vec<u8> { frame_with_order(payload, ByteOrder::native()) }

/// Frame `payload` as a host with byte order `host` would.
///
/// The result is identical for every `host`; this exists to exercise the
/// conversion path.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
#[must_use]
pub fn frame_with_order(payload: &[u8], host: ByteOrder) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("payload fits a u32 prefix");
    let mut bytes = host.to_wire(host.host_bytes(len)).to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

/// Concatenate the frames of every payload.
#[must_use]
pub fn frames<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|payload| frame(payload.as_ref()))
        .collect()
}

/// Split `bytes` at each offset in `points`.
///
/// Offsets are sorted and clamped to `bytes.len()`; duplicates yield empty
/// chunks, which callers may skip.
#[must_use]
pub fn split_at(bytes: &[u8], points: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<_> = points.iter().map(|p| (*p).min(bytes.len())).collect();
    points.sort_unstable();
    let mut chunks = Vec::with_capacity(points.len() + 1);
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}
