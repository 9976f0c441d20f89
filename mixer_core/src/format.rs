//! Operator-facing renderings of durations and quantities.

/// `"850 ms"`, `"12.5 s"`, `"2 min 5.0 s"`.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{ms} ms");
    }
    let minutes = ms / 60_000;
    let rest_ms = ms % 60_000;
    #[allow(clippy::cast_precision_loss)]
    let seconds = rest_ms as f64 / 1000.0;
    if minutes == 0 {
        format!("{seconds:.1} s")
    } else {
        format!("{minutes} min {seconds:.1} s")
    }
}

pub fn format_grams(grams: f64) -> String {
    format!("{grams:.2} g")
}
