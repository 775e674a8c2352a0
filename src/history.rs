//! Deployment history parsing and build selection.
//!
//! The log is plain text, one deployment per line:
//!
//! ```text
//! version-0123abcd4567ef89,"2015-06-01 17:02:11",...
//! ```
//!
//! Lines that cannot be understood are dropped one by one; a bad line never
//! stops the rest of the log from being read.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};
use memchr::memmem;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Literal preceding the version identifier inside a build hash.
pub const VERSION_MARKER: &[u8] = b"version-";

/// One parsed line of the deployment log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRecord {
    pub build_hash: String,
    /// Timestamp as written in the log, quotes removed.
    pub timestamp: String,
    /// `None` when the timestamp did not match [`TIMESTAMP_FORMAT`] and the
    /// year had to be scanned for.
    pub timestamp_utc: Option<NaiveDateTime>,
    pub year: i32,
    /// Lowercase hex run following [`VERSION_MARKER`], if any.
    pub version_id: Option<String>,
}

impl DeployRecord {
    /// Parses a single log line. Returns `None` for headers and malformed lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split(',');
        let build_hash = fields.next()?.trim();
        let timestamp = fields.next()?.trim().trim_matches('"').trim();

        if is_header(build_hash) || !timestamp.contains(':') {
            return None;
        }

        let timestamp_utc = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok();
        let year = match timestamp_utc {
            Some(dt) => dt.year(),
            None => scan_year(timestamp)?,
        };

        Some(Self {
            build_hash: build_hash.to_owned(),
            timestamp: timestamp.to_owned(),
            timestamp_utc,
            year,
            version_id: version_id(build_hash),
        })
    }
}

fn is_header(first_field: &str) -> bool {
    first_field.is_empty()
        || first_field
            .get(..4)
            .is_some_and(|s| s.eq_ignore_ascii_case("file"))
}

/// First `20xx` token in `text`.
fn scan_year(text: &str) -> Option<i32> {
    text.as_bytes()
        .windows(4)
        .find(|w| w.starts_with(b"20") && w[2].is_ascii_digit() && w[3].is_ascii_digit())
        .and_then(|w| std::str::from_utf8(w).ok()?.parse().ok())
}

fn version_id(build_hash: &str) -> Option<String> {
    let bytes = build_hash.as_bytes();
    memmem::find_iter(bytes, VERSION_MARKER).find_map(|pos| {
        let start = pos + VERSION_MARKER.len();
        let len = bytes[start..]
            .iter()
            .take_while(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
            .count();
        (len > 0).then(|| build_hash[start..start + len].to_owned())
    })
}

/// All parseable records of a deployment log, in log order.
#[derive(Debug, Clone, Default)]
pub struct DeployHistory {
    records: Vec<DeployRecord>,
}

impl DeployHistory {
    pub fn parse(text: &str) -> Self {
        let mut skipped = 0usize;
        let records = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| {
                let record = DeployRecord::parse_line(line);
                if record.is_none() {
                    log::debug!("Skipping deploy log line: {line}");
                    skipped += 1;
                }
                record
            })
            .collect::<Vec<_>>();

        log::info!(
            "Found {} deployments in history ({skipped} lines skipped)",
            records.len()
        );
        Self { records }
    }

    pub fn records(&self) -> &[DeployRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest `max_count` deployments of `year`.
    ///
    /// Timestamps are compared as strings, which orders correctly because the
    /// format is fixed-width and zero-padded. Equal timestamps keep log order.
    pub fn by_year(&self, year: i32, max_count: usize) -> Vec<&DeployRecord> {
        let mut selected: Vec<_> = self.records.iter().filter(|r| r.year == year).collect();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected.truncate(max_count);
        selected
    }

    /// [`by_year`](Self::by_year) for every year in the inclusive range,
    /// oldest year first. Reversed bounds are swapped.
    pub fn by_range(&self, start_year: i32, end_year: i32, max_per_year: usize) -> Vec<&DeployRecord> {
        let (Some(first), Some(last)) = (
            self.records.iter().map(|r| r.year).min(),
            self.records.iter().map(|r| r.year).max(),
        ) else {
            return Vec::new();
        };

        // Only years present in the log can yield records
        let low = start_year.min(end_year).max(first);
        let high = start_year.max(end_year).min(last);
        (low..=high)
            .flat_map(|year| self.by_year(year, max_per_year))
            .collect()
    }

    /// Explicitly requested builds need no lookup; the identifiers are passed
    /// through unchanged.
    pub fn by_explicit_ids<I, S>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().map(Into::into).collect()
    }

    /// Number of deployments per year.
    pub fn year_counts(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.year).or_insert(0) += 1;
        }
        counts
    }
}

/// Parses `START-END` (e.g. `2008-2012`).
pub fn parse_year_range(text: &str) -> Option<(i32, i32)> {
    let (start, end) = text.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
