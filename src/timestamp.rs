use time::{format_description::well_known, macros::format_description, OffsetDateTime};

/// RFC3339 UTC timestamp used for report fields.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Compact `YYYYMMDD_HHMMSS` stamp used in artifact, report and log file names.
pub fn now_compact() -> String {
    compact(OffsetDateTime::now_utc())
}

pub fn compact(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| String::from("19700101_000000"))
}
