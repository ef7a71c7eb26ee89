// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Nightly builds published to an S3-compatible bucket

use super::ReleaseSource;
use crate::config::ReleaseChannel;
use crate::error::{ClientError, Result};
use crate::release::{ASSET_SUFFIX, ReleaseDescriptor};
use crate::version::VersionData;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;

const KEY_PREFIX: &str = "NIGHTLY";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// `ListBucketResult` document returned by a bucket listing
#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<BucketObject>,
}

#[derive(Debug, Deserialize)]
struct BucketObject {
    #[serde(rename = "Key", default)]
    key: Option<String>,
}

fn key_pattern() -> Regex {
    Regex::new(&format!(
        concat!(
            r"raiden-nightly-(?P<year>\d{{4}})-(?P<month>\d{{2}})-(?P<day>\d{{2}})",
            r"T(?P<hour>\d{{2}})-(?P<minute>\d{{2}})-(?P<second>\d{{2}})-",
            r"v(?P<major>\d+)\.(?P<minor>\d+)\.(?P<revision>\d+)(?P<extra>.*)-{}$"
        ),
        regex::escape(ASSET_SUFFIX)
    ))
    .expect("nightly key pattern is valid")
}

/// Nightly build index backed by a bucket listing
#[derive(Debug)]
pub struct NightlySource {
    index_url: String,
    client: reqwest::Client,
    key_pattern: Regex,
}

impl NightlySource {
    pub fn new(index_url: &str, client: reqwest::Client) -> Self {
        Self {
            index_url: index_url.trim_end_matches('/').to_string(),
            client,
            key_pattern: key_pattern(),
        }
    }

    /// Version and build time encoded in an object key; `None` unless both parts are valid.
    fn parse_key(&self, key: &str) -> Option<(VersionData, NaiveDateTime)> {
        let captures = self.key_pattern.captures(key)?;
        let number = |name: &str| captures.name(name)?.as_str().parse::<u32>().ok();

        let built_at = NaiveDate::from_ymd_opt(
            captures["year"].parse().ok()?,
            number("month")?,
            number("day")?,
        )?
        .and_hms_opt(number("hour")?, number("minute")?, number("second")?)?;
        let version = VersionData::from_captures(&captures)?;

        Some((version, built_at))
    }

    fn parse_listing(&self, body: &str) -> Result<Vec<ReleaseDescriptor>> {
        let listing: ListBucketResult = quick_xml::de::from_str(body).map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse bucket listing: {e}"))
        })?;

        Ok(listing
            .contents
            .into_iter()
            .filter_map(|object| object.key)
            .filter_map(|key| {
                let parsed = self.parse_key(&key);
                if parsed.is_none() {
                    tracing::debug!("Skipping bucket key {key}");
                }
                parsed
            })
            .map(|(version, built_at)| {
                let url = self.build_download_url(&version, Some(built_at));
                ReleaseDescriptor::nightly(url, version, built_at)
            })
            .collect())
    }
}

#[async_trait]
impl ReleaseSource for NightlySource {
    fn channel(&self) -> ReleaseChannel {
        ReleaseChannel::Nightly
    }

    async fn list(&self) -> Result<Vec<ReleaseDescriptor>> {
        let url = &self.index_url;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ClientError::Network(format!(
                "Nightly index returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(format!("Failed to read bucket listing: {e}")))?;

        self.parse_listing(&body)
    }

    /// The bucket has no per-tag endpoint, so this always re-lists.
    async fn fetch_by_tag(&self, tag: &str) -> Result<ReleaseDescriptor> {
        tracing::info!("Getting list of all nightly releases");
        self.list()
            .await?
            .into_iter()
            .find(|release| release.release() == tag)
            .ok_or_else(|| ClientError::NotFound(format!("nightly build {tag}")))
    }

    fn build_download_url(&self, version: &VersionData, built_at: Option<NaiveDateTime>) -> String {
        let timestamp = built_at
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();
        format!(
            "{}/{KEY_PREFIX}/raiden-nightly-{timestamp}-v{}-{ASSET_SUFFIX}",
            self.index_url,
            version.release()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::OrderingPolicy;
    use mockito::Server;
    use std::cmp::Ordering;

    fn key(timestamp: &str, version: &str) -> String {
        format!("{KEY_PREFIX}/raiden-nightly-{timestamp}-v{version}-{ASSET_SUFFIX}")
    }

    fn listing(keys: &[String]) -> String {
        let contents: String = keys
            .iter()
            .map(|k| format!("<Contents><Key>{k}</Key><Size>1024</Size></Contents>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>raiden-nightlies</Name><Prefix></Prefix><MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>{contents}</ListBucketResult>"#
        )
    }

    fn source() -> NightlySource {
        NightlySource::new("https://nightlies.example.com/", reqwest::Client::new())
    }

    #[test]
    fn test_parse_listing_skips_foreign_keys() {
        let keys = [
            key("2020-01-10T00-15-01", "0.200.0rc1.dev97+gb1d8ef2f"),
            "NIGHTLY/raiden-nightly-latest.txt".to_string(),
            "NIGHTLY/raiden-nightly-2020-01-10T00-15-01-v0.200.0-windows.exe".to_string(),
            key("2020-13-45T00-15-01", "0.200.0"),
            key("2020-01-11T25-00-00", "0.200.0"),
            key("2020-1-9T0-15-1", "0.200.0"),
            key("20201-01-09T00-15-01", "0.200.0"),
        ];
        let body = listing(&keys)
            .replace("</ListBucketResult>", "<Contents><Size>1</Size></Contents></ListBucketResult>");

        let releases = source().parse_listing(&body).unwrap();

        assert_eq!(releases.len(), 1);
        let release = &releases[0];
        assert_eq!(release.channel, ReleaseChannel::Nightly);
        assert_eq!(release.version.extra.as_deref(), Some("rc1.dev97+gb1d8ef2f"));
        assert_eq!(release.release(), "0.200.0rc1.dev97+gb1d8ef2f-20200110");
        assert_eq!(
            release.built_at.unwrap().to_string(),
            "2020-01-10 00:15:01"
        );
    }

    #[test]
    fn test_download_url_reproduces_object_key() {
        let object_key = key("2020-01-10T00-15-01", "0.200.0rc1.dev97+gb1d8ef2f");
        let releases = source().parse_listing(&listing(&[object_key.clone()])).unwrap();
        assert_eq!(
            releases[0].download_url,
            format!("https://nightlies.example.com/{object_key}")
        );
    }

    #[test]
    fn test_same_version_ordered_by_build_time() {
        let keys = [
            key("2020-01-11T03-00-00", "0.200.0"),
            key("2020-01-10T03-00-00", "0.200.0"),
        ];
        let releases = source().parse_listing(&listing(&keys)).unwrap();
        let (newer, older) = (&releases[0], &releases[1]);

        assert_eq!(newer.version, older.version);
        let policy = OrderingPolicy::for_channel(ReleaseChannel::Nightly);
        assert_eq!(policy.compare(newer, older), Ordering::Greater);
        assert_eq!(policy.latest(&releases).unwrap().release(), "0.200.0-20200111");
    }

    #[test]
    fn test_parse_listing_invalid_xml() {
        let result = source().parse_listing("<ListBucketResult><Contents>");
        assert!(matches!(result, Err(ClientError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_fetch_by_tag_relists() {
        let mut server = Server::new_async().await;
        let keys = [
            key("2020-01-10T00-15-01", "0.200.0rc1"),
            key("2020-01-11T00-15-01", "0.200.0rc2"),
        ];
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(listing(&keys))
            .expect(2)
            .create_async()
            .await;

        let source = NightlySource::new(&server.url(), reqwest::Client::new());
        let release = source.fetch_by_tag("0.200.0rc2-20200111").await.unwrap();
        assert_eq!(release.version.modifier().number, Some(2));

        let missing = source.fetch_by_tag("0.200.0rc2-20200110").await;
        assert!(matches!(missing, Err(ClientError::NotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let source = NightlySource::new(&server.url(), reqwest::Client::new());
        assert!(matches!(source.list().await, Err(ClientError::Network(_))));
    }
}
