use lexical_core::FormattedSize;

use crate::aggregate::AggregateMap;

/// Separator between the min, mean and max of one key.
pub const FIELD_SEPARATOR: char = '/';

/// Render `{k1=min/mean/max, k2=...}` with keys in ascending byte order.
pub fn format_report(map: &AggregateMap) -> String {
    let entries = map.sorted();
    let mut out = String::with_capacity(2 + entries.len() * 32);
    out.push('{');
    for (i, (key, stats)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&String::from_utf8_lossy(key));
        out.push('=');
        write_tenths(&mut out, stats.min);
        out.push(FIELD_SEPARATOR);
        write_tenths(&mut out, stats.mean_tenths());
        out.push(FIELD_SEPARATOR);
        write_tenths(&mut out, stats.max);
    }
    out.push('}');
    out
}

/// Write a tenths value with exactly one fractional digit, e.g. `-35` → `-3.5`.
fn write_tenths(out: &mut String, tenths: i64) {
    if tenths < 0 {
        out.push('-');
    }
    let abs = tenths.unsigned_abs();
    let mut buf = [0u8; u64::FORMATTED_SIZE_DECIMAL];
    // lexical only emits ASCII digits
    out.extend(lexical_core::write(abs / 10, &mut buf).iter().map(|&b| b as char));
    out.push('.');
    out.push(char::from(b'0' + (abs % 10) as u8));
}
