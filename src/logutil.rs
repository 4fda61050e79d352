//! Logging helpers for binary payloads so log lines stay short and single-line.

/// Lowercase hex of at most `max` leading bytes, with an ellipsis and the total
/// length appended when the input was cut.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    use std::fmt::Write;
    let shown = max.min(data.len());
    let mut out = String::with_capacity(shown * 2 + 16);
    for b in &data[..shown] {
        let _ = write!(&mut out, "{:02x}", b);
    }
    if shown < data.len() {
        let _ = write!(&mut out, "… ({} bytes)", data.len());
    }
    out
}
