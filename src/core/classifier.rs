// src/core/classifier.rs

//! Classifies intercepted traffic into auction, beacon, and cacheable classes.
//!
//! Auction and beacon traffic carries publisher revenue and must reach the
//! network untouched; everything else is a candidate for the cache pipeline.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use url::Url;

/// Hostname/URL substrings identifying ad and measurement infrastructure.
/// A match only toggles the `ad` origin label (statistics and aggressive
/// normalization); it never decides bypass on its own.
const AD_INFRA_SUBSTRINGS: &[&str] = &[
    "doubleclick",
    "googlesyndication",
    "googleadservices",
    "adservice.google",
    "google-analytics",
    "amazon-adsystem",
    "adsystem",
    "adnxs",
    "adsrvr.org",
    "criteo",
    "taboola",
    "outbrain",
    "pubmatic",
    "rubiconproject",
    "openx",
    "casalemedia",
    "indexexchange",
    "smartadserver",
    "adsafeprotected",
    "moatads",
    "scorecardresearch",
    "2mdn.net",
    "teads",
    "sharethrough",
    "yieldmo",
];

/// Path segments that mark measurement beacons when paired with a beacon-ish
/// resource type.
const BEACON_PATH_TOKENS: &[&str] = &[
    "pixel",
    "beacon",
    "collect",
    "impression",
    "ping",
    "log",
    "fire",
];

/// Resource types measurement beacons are delivered as.
const BEACON_RESOURCE_TYPES: &[&str] = &["image", "ping", "other"];

/// The three-valued traffic class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficClass {
    /// Ad auction / decisioning traffic. Always bypassed.
    Auction,
    /// Measurement / beacon traffic. Always bypassed.
    Beacon,
    /// Creative or asset traffic eligible for caching.
    Cacheable,
}

/// The traffic-origin label. Used for statistics and to toggle aggressive
/// normalization; never a cache key input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Ad,
    ThirdParty,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Ad => "ad",
            Origin::ThirdParty => "third-party",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classifier's answer for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub class: TrafficClass,
    pub origin: Origin,
}

/// Matches request URLs against the configured bypass pattern lists and the
/// built-in beacon heuristic.
#[derive(Debug)]
pub struct TrafficClassifier {
    auction: Vec<Regex>,
    beacon: Vec<Regex>,
}

impl TrafficClassifier {
    pub fn new(auction_patterns: &[String], beacon_patterns: &[String]) -> Self {
        Self {
            auction: compile_patterns(auction_patterns),
            beacon: compile_patterns(beacon_patterns),
        }
    }

    /// Returns the traffic class and origin label for one request.
    pub fn classify(&self, url: &str, resource_type: &str) -> Verdict {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_default();

        let origin = if is_ad_infrastructure(&host, url) {
            Origin::Ad
        } else {
            Origin::ThirdParty
        };

        if self.auction.iter().any(|re| re.is_match(url)) {
            return Verdict {
                class: TrafficClass::Auction,
                origin,
            };
        }
        if self.beacon.iter().any(|re| re.is_match(url)) {
            return Verdict {
                class: TrafficClass::Beacon,
                origin,
            };
        }
        if looks_like_beacon(url, resource_type) {
            return Verdict {
                class: TrafficClass::Beacon,
                origin,
            };
        }

        Verdict {
            class: TrafficClass::Cacheable,
            origin,
        }
    }

    /// Decides whether a `fetch`/`xhr` response body is worth caching based
    /// on its media type. APIs return volatile JSON; this keeps only static
    /// media, styles, scripts, and fonts served through those channels.
    pub fn should_cache_by_content_type(content_type: Option<&str>) -> bool {
        let Some(raw) = content_type else {
            return false;
        };
        let media = raw
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if media.is_empty() {
            return false;
        }
        if media.starts_with("image/")
            || media.starts_with("video/")
            || media.starts_with("audio/")
            || media.starts_with("font/")
        {
            return true;
        }
        if ["font", "css", "javascript", "wasm", "svg"]
            .iter()
            .any(|t| media.contains(t))
        {
            return true;
        }
        media.contains("xml") && !media.contains("html")
    }
}

/// Compiles glob-ish bypass patterns into case-insensitive regexes.
/// Unparseable patterns are skipped with a warning rather than failing startup.
fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let translated = glob_to_regex(pattern);
            match RegexBuilder::new(&translated).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Skipping unusable bypass pattern '{}': {}", pattern, e);
                    None
                }
            }
        })
        .collect()
}

/// Escapes regex meta-characters and maps `*` to `.*`.
fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '*' => regex.push_str(".*"),
            c if ".+^${}()|[]\\".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            _ => regex.push(c),
        }
    }
    regex
}

fn is_ad_infrastructure(host: &str, url: &str) -> bool {
    AD_INFRA_SUBSTRINGS
        .iter()
        .any(|s| host.contains(s) || url.contains(s))
}

/// Heuristic of last resort for beacons no pattern list covers: a marker
/// token as a whole path segment (or the Facebook-style `/tr?` pixel path),
/// delivered as an image, ping, or untyped request.
fn looks_like_beacon(url: &str, resource_type: &str) -> bool {
    if !BEACON_RESOURCE_TYPES.contains(&resource_type) {
        return false;
    }
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    if path == "/tr" && parsed.query().is_some() {
        return true;
    }
    path.split('/').any(|segment| {
        let segment = segment.to_ascii_lowercase();
        BEACON_PATH_TOKENS.contains(&segment.as_str())
    })
}
