//! Prediction history: a newest-first list capped at [`HISTORY_LIMIT`]
//! records, fed by `GET /predictions/history` and the WebSocket feed.

use serde::Serialize;
use std::cmp::Ordering;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::models::PredictionRecord;

/// Number of records the dashboard keeps.
pub const HISTORY_LIMIT: usize = 10;

const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

fn with_id(mut record: PredictionRecord) -> PredictionRecord {
    if has_no_id(&record) {
        record.id = Uuid::new_v4().to_string();
    }
    record
}

fn has_no_id(record: &PredictionRecord) -> bool {
    record.id.trim().is_empty()
}

/// Prepend `incoming` to `history` (giving it an id if it has none) and keep
/// only the newest [`HISTORY_LIMIT`] records.
pub fn merge_incoming(
    mut history: Vec<PredictionRecord>,
    incoming: PredictionRecord,
) -> Vec<PredictionRecord> {
    history.insert(0, with_id(incoming));
    history.truncate(HISTORY_LIMIT);
    history
}

/// Two records describe the same inference when their instants, actions and
/// inputs agree.  Unparseable timestamps compare as raw strings.
fn same_event(a: &PredictionRecord, b: &PredictionRecord) -> bool {
    let same_time = match (
        normalize_timestamp(&a.timestamp),
        normalize_timestamp(&b.timestamp),
    ) {
        (Some(x), Some(y)) => x == y,
        (None, None) => a.timestamp.trim() == b.timestamp.trim(),
        _ => false,
    };
    same_time && a.action == b.action && a.input_moisture == b.input_moisture
}

fn newest_first(a: &Option<OffsetDateTime>, b: &Option<OffsetDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Owned history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<PredictionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: PredictionRecord,
    pub display_time: Option<String>,
}

impl History {
    /// [`merge_incoming`] in place.
    pub fn push(&mut self, incoming: PredictionRecord) {
        self.records = merge_incoming(std::mem::take(&mut self.records), incoming);
    }

    /// Fold a freshly fetched history into the one we hold.
    ///
    /// A fetched record replaces the held record with the same id, failing
    /// that the held record for the same event.  A fetched record without an
    /// id inherits the id of the record it replaces, so ids stay stable
    /// across polls.  Held records the fetch doesn't mention, such as feed
    /// events newer than the fetch, are kept.  The union is ordered newest first by normalized timestamp,
    /// unparseable timestamps last in their incoming order, and capped at
    /// [`HISTORY_LIMIT`].
    pub fn merge_fetched(&mut self, fetched: Vec<PredictionRecord>) {
        let mut held: Vec<Option<PredictionRecord>> =
            std::mem::take(&mut self.records).into_iter().map(Some).collect();

        let mut merged: Vec<PredictionRecord> = Vec::with_capacity(fetched.len() + held.len());
        for mut record in fetched {
            let slot = held
                .iter()
                .position(|h| {
                    h.as_ref()
                        .is_some_and(|h| !has_no_id(&record) && h.id == record.id)
                })
                .or_else(|| {
                    held.iter()
                        .position(|h| h.as_ref().is_some_and(|h| same_event(h, &record)))
                });
            if let Some(previous) = slot.and_then(|i| held[i].take()) {
                if has_no_id(&record) {
                    record.id = previous.id;
                }
            }
            merged.push(with_id(record));
        }
        merged.extend(held.into_iter().flatten());

        let mut keyed: Vec<(Option<OffsetDateTime>, PredictionRecord)> = merged
            .into_iter()
            .map(|r| (normalize_timestamp(&r.timestamp), r))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| newest_first(a, b));

        self.records = keyed
            .into_iter()
            .map(|(_, r)| r)
            .take(HISTORY_LIMIT)
            .collect();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&PredictionRecord> {
        self.records.first()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &PredictionRecord> {
        self.records.iter()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.records
            .iter()
            .map(|r| HistoryEntry {
                display_time: display_time(&r.timestamp),
                record: r.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

fn has_offset(s: &str) -> bool {
    if s.ends_with(['Z', 'z']) {
        return true;
    }
    // Only look past the date part; the date itself contains '-'.
    match s.find(['T', 't']) {
        Some(i) => s[i..].contains(['+', '-']),
        None => false,
    }
}

/// Parse a backend timestamp.  Strings without an offset are UTC, and an
/// all-digit string is unix seconds.
pub fn normalize_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().ok()?;
        return OffsetDateTime::from_unix_timestamp(secs).ok();
    }

    let s = s.replacen(' ', "T", 1);
    if has_offset(&s) {
        OffsetDateTime::parse(&s, &Rfc3339).ok()
    } else {
        OffsetDateTime::parse(&format!("{s}Z"), &Rfc3339).ok()
    }
}

/// `YYYY-MM-DD HH:MM:SS UTC`, or `None` when the timestamp can't be read.
pub fn display_time(raw: &str) -> Option<String> {
    normalize_timestamp(raw)?
        .to_offset(UtcOffset::UTC)
        .format(DISPLAY_FORMAT)
        .ok()
}

// ===========================================================================
// Tests
// ===========================================================================
