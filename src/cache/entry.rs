//! Cached response model and expiry handling.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use chrono::{FixedOffset, NaiveDateTime};

use crate::proxy::headers::HeaderSet;

/// Name of the response header carrying an explicit expiry.
pub const EXPIRES: &str = "Expires";

/// Absolute expiry of a cache entry, kept in the text form it was stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    raw: String,
    at: Option<SystemTime>,
}

impl Expiry {
    /// Interpret a stored or received expiry value.
    ///
    /// Accepts an HTTP date, a `Sun Oct 19 12:00:00 UTC 2026` style date in
    /// UTC or a `GMT+hh:mm` zone, or an integer count of milliseconds since
    /// the epoch. Anything else parses to an expiry that is never valid.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let at = parse_timestamp(raw.trim());
        Self { raw, at }
    }

    /// Expiry `ttl` after `now`, written as an HTTP date.
    ///
    /// The result has whole-second precision, matching what is persisted.
    pub fn after(now: SystemTime, ttl: Duration) -> Self {
        Self::parse(httpdate::fmt_http_date(now + ttl))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn at(&self) -> Option<SystemTime> {
        self.at
    }

    /// An entry is servable only while `now` is strictly before its expiry.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        matches!(self.at, Some(at) if now < at)
    }
}

fn parse_timestamp(raw: &str) -> Option<SystemTime> {
    if let Ok(at) = httpdate::parse_http_date(raw) {
        return Some(at);
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return match u64::try_from(millis) {
            Ok(millis) => UNIX_EPOCH.checked_add(Duration::from_millis(millis)),
            Err(_) => Some(UNIX_EPOCH),
        };
    }
    parse_zoned_date(raw)
}

/// `<weekday> <month> <day> <hh:mm:ss> <zone> <year>`, as written by older
/// cache directories for their default expiry.
fn parse_zoned_date(raw: &str) -> Option<SystemTime> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    let [weekday, month, day, time, zone, year] = fields.as_slice() else {
        return None;
    };
    let offset = zone_offset(zone)?;
    let local = NaiveDateTime::parse_from_str(
        &format!("{} {} {} {} {}", weekday, month, day, time, year),
        "%a %b %d %H:%M:%S %Y",
    )
    .ok()?;
    let at = local.and_local_timezone(offset).single()?;
    Some(SystemTime::from(at))
}

/// Offset for `UTC`, `GMT` or `GMT±hh:mm`. Other zone names are not resolved.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    if zone == "UTC" || zone == "GMT" {
        return FixedOffset::east_opt(0);
    }
    let rest = zone.strip_prefix("GMT")?;
    let (sign, rest) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// A response as held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub code: u16,
    pub expiry: Expiry,
    pub headers: HeaderSet,
    pub body: Bytes,
}

impl CacheEntry {
    /// Build an entry from a fresh response, resolving its expiry.
    ///
    /// An `Expires` header is kept verbatim; without one the entry expires
    /// `default_ttl` after `now`.
    pub fn from_response(
        code: u16,
        headers: HeaderSet,
        body: Bytes,
        now: SystemTime,
        default_ttl: Duration,
    ) -> Self {
        let expiry = match headers.first(EXPIRES) {
            Some(raw) => Expiry::parse(raw),
            None => Expiry::after(now, default_ttl),
        };
        Self {
            code,
            expiry,
            headers,
            body,
        }
    }

    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        self.expiry.is_valid_at(now)
    }
}
