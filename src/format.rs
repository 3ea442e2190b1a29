//! Pure display formatting for message fields.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://[^\s]+)").expect("URL regex pattern is valid"));

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Escape `&`, `<`, `>`, turn bare http(s) URLs into anchors, then newlines into `<br>`.
///
/// Escaping runs first so the anchor markup inserted afterwards is never escaped.
pub fn escape_and_linkify(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    let linked = URL_RE.replace_all(&escaped, |caps: &Captures<'_>| {
        // A quote inside the token would otherwise close the href attribute.
        let url = caps[1].replace('"', "&quot;");
        format!(r#"<a href="{url}" target="_blank" rel="noopener">{url}</a>"#)
    });

    linked.replace('\n', "<br>")
}

/// Short label for a timestamp relative to `now`, in `now`'s calendar.
///
/// - under a minute: `now`
/// - under an hour: `N min ago`
/// - same calendar day: time of day (`14:05`)
/// - otherwise: short date (`3 Mar`)
pub fn relative_time(ts: &DateTime<Utc>, now: &DateTime<FixedOffset>) -> String {
    let age = now.signed_duration_since(*ts);

    if age.num_seconds() < 60 {
        return "now".to_string();
    }
    if age.num_seconds() < 3600 {
        return format!("{} min ago", age.num_minutes());
    }

    let local = ts.with_timezone(&now.timezone());
    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%-d %b").to_string()
    }
}

/// Base-1024 size with at most two decimals (`1536` -> `1.5 KB`).
pub fn human_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut scale = 1u64;
    while unit + 1 < SIZE_UNITS.len() && bytes >= scale * 1024 {
        scale *= 1024;
        unit += 1;
    }

    let rounded = (bytes as f64 / scale as f64 * 100.0).round() / 100.0;
    format!("{} {}", trim_decimal(rounded), SIZE_UNITS[unit])
}

fn trim_decimal(value: f64) -> String {
    let s = format!("{:.2}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Calendar-day key (`YYYY-MM-DD`) in the timestamp's own zone.
pub fn date_bucket<Tz>(ts: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    ts.format("%Y-%m-%d").to_string()
}

/// Placeholder avatar letter for senders without a picture.
pub fn avatar_initial(name: &str) -> char {
    name.chars()
        .next()
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or('?')
}
