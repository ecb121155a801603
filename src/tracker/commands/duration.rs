//! Compact durations such as `1w2d`, `3h30m` or `90s`.

use std::sync::LazyLock;

use regex::Regex;

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
        .expect("duration pattern is valid")
});

const UNITS: [i64; 5] = [7 * 24 * 3600, 24 * 3600, 3600, 60, 1];

/// Seconds in `text`, or `None` when it does not parse or totals zero.
pub fn parse_duration(text: &str) -> Option<i64> {
    let caps = DURATION.captures(text)?;
    let mut total: i64 = 0;
    for (i, unit) in UNITS.iter().enumerate() {
        if let Some(n) = caps.get(i + 1) {
            let n: i64 = n.as_str().parse().ok()?;
            total = total.checked_add(n.checked_mul(*unit)?)?;
        }
    }
    (total > 0).then_some(total)
}
