// 9.0 oracle.rs: how the engine reads prices and volatilities.
//
// The core is agnostic to where values come from. Anything implementing
// `OracleFeed` can back it. Each top-level operation captures an
// `OracleSnapshot` once, so every margin and pricing computation inside the
// operation sees the same values, and a stale or missing feed fails the whole
// operation before any state is touched.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{Price, Timestamp};

/// A single value published by a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedValue {
    pub value: Decimal,
    pub timestamp: Timestamp,
}

impl FeedValue {
    pub fn new(value: Decimal, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }

    pub fn age(&self, now: Timestamp) -> i64 {
        self.timestamp.secs_until(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Unknown oracle feed {0}")]
    UnknownFeed(String),

    #[error("Stale oracle data for {feed}: {age}s old, max {max_age}s")]
    StaleOracleData { feed: String, age: i64, max_age: i64 },

    #[error("Feed {feed} published a non-positive value {value}")]
    InvalidFeedValue { feed: String, value: Decimal },
}

/// Source of named price and volatility values.
pub trait OracleFeed {
    fn get_value(&self, feed: &str) -> Result<FeedValue, OracleError>;
}

/// In-memory feed registry. Stands in for the on-chain oracle set in tests
/// and the simulator.
#[derive(Debug, Clone, Default)]
pub struct OracleManager {
    feeds: HashMap<String, FeedValue>,
}

impl OracleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite a feed
    pub fn set_value(&mut self, feed: &str, value: Decimal, timestamp: Timestamp) {
        self.feeds
            .insert(feed.to_string(), FeedValue::new(value, timestamp));
    }

    pub fn remove_feed(&mut self, feed: &str) -> Option<FeedValue> {
        self.feeds.remove(feed)
    }

    pub fn feeds(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }
}

impl OracleFeed for OracleManager {
    fn get_value(&self, feed: &str) -> Result<FeedValue, OracleError> {
        self.feeds
            .get(feed)
            .copied()
            .ok_or_else(|| OracleError::UnknownFeed(feed.to_string()))
    }
}

// 9.1: one consistent read of every feed an operation needs
#[derive(Debug, Clone)]
pub struct OracleSnapshot {
    values: BTreeMap<String, FeedValue>,
    taken_at: Timestamp,
}

impl OracleSnapshot {
    /// Reads each feed once. Fails on the first unknown, stale or
    /// non-positive value.
    pub fn capture<'a, O, I>(
        oracle: &O,
        feeds: I,
        now: Timestamp,
        max_staleness_secs: i64,
    ) -> Result<Self, OracleError>
    where
        O: OracleFeed + ?Sized,
        I: IntoIterator<Item = &'a str>,
    {
        let unique: BTreeSet<&str> = feeds.into_iter().collect();
        let mut values = BTreeMap::new();

        for feed in unique {
            let value = oracle.get_value(feed)?;
            let age = value.age(now);
            if age > max_staleness_secs {
                return Err(OracleError::StaleOracleData {
                    feed: feed.to_string(),
                    age,
                    max_age: max_staleness_secs,
                });
            }
            if value.value <= Decimal::ZERO {
                return Err(OracleError::InvalidFeedValue {
                    feed: feed.to_string(),
                    value: value.value,
                });
            }
            values.insert(feed.to_string(), value);
        }

        Ok(Self {
            values,
            taken_at: now,
        })
    }

    pub fn taken_at(&self) -> Timestamp {
        self.taken_at
    }

    pub fn value(&self, feed: &str) -> Result<Decimal, OracleError> {
        self.values
            .get(feed)
            .map(|v| v.value)
            .ok_or_else(|| OracleError::UnknownFeed(feed.to_string()))
    }

    // captured values are checked positive, so this never builds a zero price
    pub fn price(&self, feed: &str) -> Result<Price, OracleError> {
        self.value(feed).map(Price::new_unchecked)
    }

    pub fn contains(&self, feed: &str) -> bool {
        self.values.contains_key(feed)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
