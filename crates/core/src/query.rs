//! Read side of the result store: exact, year, paged and compressed queries.
//!
//! Queries only read committed records and never touch jobs. Every failure is
//! an [`Error`] that [`QueryResult`] turns into a tagged response.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::{CacheDb, url_key};

/// One stored fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CaptureResult {
    pub timestamp: String,
    pub simhash: String,
}

/// Captures of one day as `(hhmmss, hash id)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DayCaptures {
    pub day: u32,
    pub captures: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MonthCaptures {
    pub month: u32,
    pub days: Vec<DayCaptures>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct YearCaptures {
    pub year: u32,
    pub months: Vec<MonthCaptures>,
}

/// Captures grouped by date, with each distinct simhash sent once.
///
/// `hashes[id]` is the simhash referenced by a `(hhmmss, id)` pair. Ids are
/// assigned in first-seen order and are only meaningful within one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompressedCaptures {
    pub captures: Vec<YearCaptures>,
    pub hashes: Vec<String>,
}

/// Tagged outcome of a query, as returned to callers.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResult<T> {
    Success { data: T },
    NotFound,
    Error { kind: String, message: String },
}

impl<T> QueryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }
}

impl<T> From<Result<T, Error>> for QueryResult<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(data) => QueryResult::Success { data },
            Err(Error::CaptureNotFound(_)) => QueryResult::NotFound,
            Err(e) => QueryResult::Error { kind: e.code().to_string(), message: e.message() },
        }
    }
}

/// True for a `YYYYMMDDHHMMSS` string naming a real calendar instant.
pub fn is_valid_timestamp(timestamp: &str) -> bool {
    timestamp.len() == 14 && NaiveDateTime::parse_from_str(timestamp, "%Y%m%d%H%M%S").is_ok()
}

/// True for four ASCII digits.
pub fn is_valid_year(year: &str) -> bool {
    year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit())
}

/// Look up the simhash stored for one exact capture.
///
/// A miss is `CaptureNotFound` when other captures of the same year are
/// stored, and `NoCaptures` when the year has nothing or was recorded as empty.
pub async fn timestamp_simhash(db: &CacheDb, url: &str, timestamp: &str) -> Result<CaptureResult, Error> {
    if url.is_empty() {
        return Err(Error::InvalidInput("url is required".into()));
    }
    if !is_valid_timestamp(timestamp) {
        return Err(Error::InvalidInput(format!("invalid timestamp {timestamp:?}")));
    }

    let key = url_key(url);
    if let Some(simhash) = db.get_capture(&key, timestamp).await? {
        return Ok(CaptureResult { timestamp: timestamp.to_string(), simhash });
    }

    let year = &timestamp[..4];
    let stored = db.capture_timestamps(&key).await?;
    if stored.iter().any(|ts| ts == year) {
        return Err(Error::NoCaptures(format!("no captures of {url} for year {year}")));
    }
    if stored.iter().any(|ts| ts.starts_with(year)) {
        return Err(Error::CaptureNotFound(format!("{url} has no capture at {timestamp}")));
    }
    Err(Error::NoCaptures(format!("no captures of {url} for year {year}")))
}

/// All stored captures of `url` in `year`, sorted by timestamp.
///
/// With a page size, only the requested page is returned; pages past the end
/// clamp to the last one.
pub async fn year_simhash(
    db: &CacheDb, url: &str, year: &str, page: Option<usize>, per_page: Option<usize>,
) -> Result<Vec<CaptureResult>, Error> {
    if url.is_empty() {
        return Err(Error::InvalidInput("url is required".into()));
    }
    if !is_valid_year(year) {
        return Err(Error::InvalidInput(format!("invalid year {year:?}")));
    }

    let key = url_key(url);
    let mut stored = db.capture_timestamps(&key).await?;
    stored.sort();

    if stored.iter().any(|ts| ts == year) {
        return Err(Error::NoCaptures(format!("no captures of {url} for year {year}")));
    }
    let matching: Vec<String> = stored.into_iter().filter(|ts| ts.starts_with(year)).collect();
    if matching.is_empty() {
        return Err(Error::NoCaptures(format!("no captures of {url} for year {year}")));
    }

    let timestamps = paginate(matching, page, per_page);
    let values = db.get_captures(&key, &timestamps).await?;

    Ok(timestamps
        .into_iter()
        .zip(values)
        .filter_map(|(timestamp, simhash)| simhash.map(|simhash| CaptureResult { timestamp, simhash }))
        .collect())
}

/// Slice out one 1-based page.
///
/// No page, no page size or a zero page size returns everything. Page 0 is
/// page 1 and pages past the end clamp to the last page.
pub fn paginate<T>(items: Vec<T>, page: Option<usize>, per_page: Option<usize>) -> Vec<T> {
    let (Some(page), Some(per_page)) = (page, per_page) else {
        return items;
    };
    if per_page == 0 || items.is_empty() {
        return items;
    }

    let total_pages = items.len().div_ceil(per_page);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (page * per_page).min(items.len());

    items.into_iter().skip(start).take(end - start).collect()
}

/// Group captures by year, month and day, deduplicating simhash strings.
///
/// Entries whose timestamp is too short to carry a date are skipped.
pub fn compress_captures(results: &[CaptureResult]) -> CompressedCaptures {
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut hashes = Vec::new();
    let mut grouped: BTreeMap<u32, BTreeMap<u32, BTreeMap<u32, Vec<(String, usize)>>>> = BTreeMap::new();

    for result in results {
        let ts = result.timestamp.as_str();
        let (Some(year), Some(month), Some(day)) = (date_part(ts, 0..4), date_part(ts, 4..6), date_part(ts, 6..8))
        else {
            continue;
        };

        let id = *ids.entry(result.simhash.as_str()).or_insert_with(|| {
            hashes.push(result.simhash.clone());
            hashes.len() - 1
        });

        grouped
            .entry(year)
            .or_default()
            .entry(month)
            .or_default()
            .entry(day)
            .or_default()
            .push((ts[8..].to_string(), id));
    }

    let captures = grouped
        .into_iter()
        .map(|(year, months)| YearCaptures {
            year,
            months: months
                .into_iter()
                .map(|(month, days)| MonthCaptures {
                    month,
                    days: days.into_iter().map(|(day, captures)| DayCaptures { day, captures }).collect(),
                })
                .collect(),
        })
        .collect();

    CompressedCaptures { captures, hashes }
}

fn date_part(ts: &str, range: std::ops::Range<usize>) -> Option<u32> {
    ts.get(range)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(timestamp: &str, simhash: &str) -> CaptureResult {
        CaptureResult { timestamp: timestamp.into(), simhash: simhash.into() }
    }

    async fn seeded(url: &str, pairs: &[(&str, &str)]) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        let fields = pairs.iter().map(|(t, s)| (t.to_string(), s.to_string())).collect();
        db.put_captures(&url_key(url), &fields).await.unwrap();
        db
    }

    #[test]
    fn test_timestamp_validation() {
        assert!(is_valid_timestamp("20230101000000"));
        assert!(!is_valid_timestamp("2023010100000"));
        assert!(!is_valid_timestamp("20231301000000"));
        assert!(!is_valid_timestamp("2023-01-01T000"));
    }

    #[test]
    fn test_year_validation() {
        assert!(is_valid_year("2023"));
        assert!(!is_valid_year("23"));
        assert!(!is_valid_year("20a3"));
        assert!(!is_valid_year("٢٠٢٣"));
    }

    #[tokio::test]
    async fn test_timestamp_hit() {
        let db = seeded("example.com", &[("20230101000000", "AAA")]).await;
        let result = timestamp_simhash(&db, "example.com", "20230101000000").await.unwrap();
        assert_eq!(result, capture("20230101000000", "AAA"));
    }

    #[tokio::test]
    async fn test_timestamp_missing_but_year_present() {
        let db = seeded("example.com", &[("20230505000000", "AAA")]).await;
        let err = timestamp_simhash(&db, "example.com", "20230101000000").await.unwrap_err();
        assert!(matches!(err, Error::CaptureNotFound(_)));
    }

    #[tokio::test]
    async fn test_timestamp_missing_and_year_absent() {
        let db = seeded("example.com", &[("20220505000000", "AAA")]).await;
        let err = timestamp_simhash(&db, "example.com", "20230101000000").await.unwrap_err();
        assert!(matches!(err, Error::NoCaptures(_)));

        let empty = CacheDb::open_in_memory().await.unwrap();
        let err = timestamp_simhash(&empty, "example.com", "20230101000000").await.unwrap_err();
        assert!(matches!(err, Error::NoCaptures(_)));
    }

    #[tokio::test]
    async fn test_timestamp_year_marker_is_no_captures() {
        let db = seeded("example.com", &[("2023", "-1")]).await;
        let err = timestamp_simhash(&db, "example.com", "20230101000000").await.unwrap_err();
        assert!(matches!(err, Error::NoCaptures(_)));
    }

    #[tokio::test]
    async fn test_timestamp_rejects_invalid_input() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(matches!(
            timestamp_simhash(&db, "example.com", "yesterday").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            timestamp_simhash(&db, "", "20230101000000").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_year_without_key_is_no_captures() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let err = year_simhash(&db, "example.com", "2023", None, None).await.unwrap_err();
        assert!(matches!(err, Error::NoCaptures(_)));
    }

    #[tokio::test]
    async fn test_year_filters_and_sorts() {
        let db = seeded(
            "example.com",
            &[("20230301000000", "C"), ("20220101000000", "X"), ("20230101000000", "A"), ("20230201000000", "B")],
        )
        .await;

        let results = year_simhash(&db, "example.com", "2023", None, None).await.unwrap();
        let timestamps: Vec<&str> = results.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(timestamps, vec!["20230101000000", "20230201000000", "20230301000000"]);

        let err = year_simhash(&db, "example.com", "2021", None, None).await.unwrap_err();
        assert!(matches!(err, Error::NoCaptures(_)));
    }

    #[tokio::test]
    async fn test_year_uses_normalized_key() {
        let db = seeded("b.a.example.com", &[("20230101000000", "A")]).await;
        let results = year_simhash(&db, "example.com.a.b", "2023", None, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_year_paged() {
        let pairs: Vec<(String, String)> = (1..=25).map(|d| (format!("202301{d:02}000000"), format!("H{d}"))).collect();
        let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(t, s)| (t.as_str(), s.as_str())).collect();
        let db = seeded("example.com", &borrowed).await;

        let page = year_simhash(&db, "example.com", "2023", Some(3), Some(10)).await.unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].timestamp, "20230121000000");
        assert_eq!(page[4].timestamp, "20230125000000");
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (1..=25).collect();
        assert_eq!(paginate(items.clone(), Some(3), Some(10)), (21..=25).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), Some(99), Some(10)), (21..=25).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), Some(1), Some(10)), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), Some(0), Some(10)), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), Some(2), Some(0)).len(), 25);
        assert_eq!(paginate(items.clone(), None, Some(10)).len(), 25);
        assert_eq!(paginate(items, Some(2), None).len(), 25);
        assert!(paginate(Vec::<u32>::new(), Some(1), Some(10)).is_empty());
    }

    #[test]
    fn test_compress_captures() {
        let results = vec![
            capture("20230101010101", "AAA"),
            capture("20230101020202", "AAA"),
            capture("20230215030303", "BBB"),
        ];
        let compressed = compress_captures(&results);

        assert_eq!(compressed.hashes, vec!["AAA", "BBB"]);
        assert_eq!(compressed.captures.len(), 1);

        let year = &compressed.captures[0];
        assert_eq!(year.year, 2023);
        assert_eq!(year.months.len(), 2);

        assert_eq!(year.months[0].month, 1);
        assert_eq!(year.months[0].days.len(), 1);
        assert_eq!(year.months[0].days[0].day, 1);
        assert_eq!(
            year.months[0].days[0].captures,
            vec![("010101".to_string(), 0), ("020202".to_string(), 0)]
        );

        assert_eq!(year.months[1].month, 2);
        assert_eq!(year.months[1].days[0].day, 15);
        assert_eq!(year.months[1].days[0].captures, vec![("030303".to_string(), 1)]);
    }

    #[test]
    fn test_compress_skips_short_timestamps() {
        let compressed = compress_captures(&[capture("2023", "X")]);
        assert!(compressed.captures.is_empty());
        assert!(compressed.hashes.is_empty());
    }

    #[test]
    fn test_query_result_mapping() {
        let ok: QueryResult<u32> = Ok(1).into();
        assert!(ok.is_success());

        let missing: QueryResult<u32> = Err(Error::CaptureNotFound("x".into())).into();
        assert!(matches!(missing, QueryResult::NotFound));

        let none: QueryResult<u32> = Err(Error::NoCaptures("nothing for 2023".into())).into();
        match none {
            QueryResult::Error { kind, message } => {
                assert_eq!(kind, "NO_CAPTURES");
                assert_eq!(message, "nothing for 2023");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_query_result_serialization() {
        let ok: QueryResult<CaptureResult> = Ok(capture("20230101000000", "AAA")).into();
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["simhash"], "AAA");

        let missing: QueryResult<CaptureResult> = Err(Error::CaptureNotFound("x".into())).into();
        assert_eq!(serde_json::to_value(&missing).unwrap()["status"], "not_found");
    }
}
