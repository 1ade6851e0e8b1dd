//! Polling adapter for the URA4 reader's tag reporting endpoint.
//!
//! The reader is polled at a fixed interval and every reported tag becomes a
//! [`TagRead`] on the feed channel. Failures are logged and retried with
//! exponential backoff for as long as the process runs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::scan::TagRead;

const TAG_REPORTING_PATH: &str = "/InventoryController/tagReporting";
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Empty polls between "waiting for tags" heartbeats.
const HEARTBEAT_EVERY: u32 = 50;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("reader request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("reader answered HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("unreadable reader payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One tag as reported by the reader, before normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTag {
    #[serde(rename = "epcHex", default)]
    pub epc: String,
    #[serde(rename = "tidHex", alias = "tid", default)]
    pub tid: String,
    #[serde(rename = "antennaPort", default = "default_antenna")]
    pub antenna_port: u16,
    #[serde(default)]
    pub rssi: Option<f64>,
    #[serde(rename = "readCount", alias = "count", default)]
    pub read_count: Option<u32>,
}

fn default_antenna() -> u16 {
    1
}

#[derive(Debug, Deserialize)]
struct TagReport {
    #[serde(default)]
    data: Vec<RawTag>,
}

/// Decode a tag reporting response body. An empty body means no tags.
pub fn parse_tag_report(body: &str) -> Result<Vec<RawTag>, ReaderError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let report: TagReport = serde_json::from_str(body)?;
    Ok(report
        .data
        .into_iter()
        .filter(|tag| !tag.epc.trim().is_empty())
        .collect())
}

/// Anything that can answer "which tags are in the field right now".
#[async_trait]
pub trait TagSource: Send + Sync {
    async fn poll_tags(&self) -> Result<Vec<RawTag>, ReaderError>;

    fn describe(&self) -> String;
}

pub struct Ura4Reader {
    client: reqwest::Client,
    base_url: String,
}

impl Ura4Reader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReaderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TagSource for Ura4Reader {
    async fn poll_tags(&self) -> Result<Vec<RawTag>, ReaderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TAG_REPORTING_PATH))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Status(status));
        }
        parse_tag_report(&response.text().await?)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
}

/// Producer task turning reader polls into a stream of tag reads.
pub struct ReaderFeed<S> {
    source: S,
    settings: FeedSettings,
}

impl<S: TagSource + 'static> ReaderFeed<S> {
    pub fn new(source: S, settings: FeedSettings) -> Self {
        Self { source, settings }
    }

    /// Runs until `cancel` fires or the receiving side is gone.
    pub fn spawn(self, tx: mpsc::Sender<TagRead>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, cancel))
    }

    async fn run(self, tx: mpsc::Sender<TagRead>, cancel: CancellationToken) {
        info!(reader = %self.source.describe(), "Tag monitoring started");

        let mut backoff = INITIAL_BACKOFF.min(self.settings.max_backoff);
        let mut failures: u32 = 0;
        let mut empty_polls: u32 = 0;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.source.poll_tags() => polled,
            };

            let delay = match polled {
                Ok(tags) => {
                    if failures > 0 {
                        info!(failures, "Reader reachable again");
                    }
                    failures = 0;
                    backoff = INITIAL_BACKOFF.min(self.settings.max_backoff);

                    if tags.is_empty() {
                        empty_polls += 1;
                        if empty_polls >= HEARTBEAT_EVERY {
                            debug!("Waiting for tags... (no data from reader)");
                            empty_polls = 0;
                        }
                    } else {
                        empty_polls = 0;
                    }

                    let observed_at = Local::now().naive_local();
                    for tag in tags {
                        let read = TagRead::new(&tag.epc, tag.antenna_port, observed_at);
                        if tx.send(read).await.is_err() {
                            info!("Feed consumer gone, stopping tag monitoring");
                            return;
                        }
                    }
                    self.settings.poll_interval
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        error = %e,
                        failures,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Reader poll failed"
                    );
                    let delay = backoff;
                    backoff = (backoff * 2).min(self.settings.max_backoff);
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Tag monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn parses_reader_payload() {
        let body = r#"{
            "type": "Reader-tagReportingResponse",
            "data": [
                {"epcHex": "e2801160600002084d5a2b11", "tidHex": "E200", "antennaPort": 2, "rssi": -48.5, "readCount": 7},
                {"epcHex": "", "antennaPort": 1},
                {"epcHex": "AAA"}
            ]
        }"#;

        let tags = parse_tag_report(body).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].antenna_port, 2);
        assert_eq!(tags[0].read_count, Some(7));
        assert_eq!(tags[1].epc, "AAA");
        assert_eq!(tags[1].antenna_port, 1);
    }

    #[test]
    fn empty_body_means_no_tags_and_garbage_is_an_error() {
        assert!(parse_tag_report("").unwrap().is_empty());
        assert!(parse_tag_report(r#"{"type":"x"}"#).unwrap().is_empty());
        assert!(matches!(
            parse_tag_report("<html>"),
            Err(ReaderError::Decode(_))
        ));
    }

    /// Replays scripted poll results, then reports no tags.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<RawTag>, ReaderError>>>,
    }

    #[async_trait]
    impl TagSource for ScriptedSource {
        async fn poll_tags(&self) -> Result<Vec<RawTag>, ReaderError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn raw(epc: &str, antenna_port: u16) -> RawTag {
        RawTag {
            epc: epc.into(),
            tid: String::new(),
            antenna_port,
            rssi: None,
            read_count: None,
        }
    }

    #[tokio::test]
    async fn keeps_polling_through_failures_and_normalizes_reads() {
        let decode_failure = serde_json::from_str::<TagReport>("nope").unwrap_err();
        let source = ScriptedSource {
            script: Mutex::new(VecDeque::from([
                Err(ReaderError::Decode(decode_failure)),
                Ok(vec![raw(" aaa ", 1), raw("BBB", 2)]),
            ])),
        };
        let feed = ReaderFeed::new(
            source,
            FeedSettings {
                poll_interval: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        );

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = feed.spawn(tx, cancel.clone());

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.epc.as_str(), first.antenna_port), ("AAA", 1));
        assert_eq!((second.epc.as_str(), second.antenna_port), ("BBB", 2));
        assert_eq!(first.observed_at, second.observed_at);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stops_when_the_consumer_is_gone() {
        let source = ScriptedSource {
            script: Mutex::new(VecDeque::from([Ok(vec![raw("AAA", 1)])])),
        };
        let feed = ReaderFeed::new(
            source,
            FeedSettings {
                poll_interval: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        );

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = feed.spawn(tx, CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
