use std::time::Instant;
use tracing::info;

/// Wall-clock drop guard: logs elapsed time when the scope ends.
pub struct Timer {
    label: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        info!("{} started", label);
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("{} finished in {:.2?}", self.label, self.started.elapsed());
    }
}

/// Thousands separators for stats output.
pub fn fmt_count(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
