//! Automated-client classification.
//!
//! [`ClientClassifier`] is the seam for deciding whether a caller is a
//! human-driven client, a known kind of automation, or unknown. The
//! built-in [`UserAgentClassifier`] works from the `User-Agent` header.

use std::fmt;
use std::str::FromStr;

use super::RequestFacts;
use crate::error::AdmissionError;

/// Category of automated client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotCategory {
    /// Search-engine indexers (Googlebot, Bingbot, ...).
    SearchEngine,
    /// Link-preview fetchers (Slack, Discord, social networks).
    Preview,
    /// Uptime and monitoring probes.
    Monitor,
    /// AI crawlers and scrapers.
    AiScraper,
    /// Command-line tools and HTTP libraries.
    Tool,
    /// Headless browsers.
    Headless,
    /// Self-declared crawlers not covered above.
    Crawler,
}

impl BotCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 7] = [
        Self::SearchEngine,
        Self::Preview,
        Self::Monitor,
        Self::AiScraper,
        Self::Tool,
        Self::Headless,
        Self::Crawler,
    ];

    /// Configuration name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SearchEngine => "search_engine",
            Self::Preview => "preview",
            Self::Monitor => "monitor",
            Self::AiScraper => "ai_scraper",
            Self::Tool => "tool",
            Self::Headless => "headless",
            Self::Crawler => "crawler",
        }
    }
}

impl fmt::Display for BotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotCategory {
    type Err = String;

    /// Accepts `search_engine`, `SEARCH_ENGINE` or `CATEGORY:SEARCH_ENGINE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let name = trimmed
            .strip_prefix("CATEGORY:")
            .or_else(|| trimmed.strip_prefix("category:"))
            .unwrap_or(trimmed)
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| format!("unknown bot category {s:?}"))
    }
}

/// Classification of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientClass {
    /// A browser operated by a person.
    Human,
    /// Identified automation.
    Automated(BotCategory),
    /// Not enough signal to decide.
    Unknown,
}

/// Decides what kind of client issued a request.
pub trait ClientClassifier: Send + Sync + fmt::Debug {
    /// Classifies the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Classifier`] if classification could not
    /// be performed.
    fn classify(&self, facts: &RequestFacts) -> Result<ClientClass, AdmissionError>;
}

/// Lower-case `User-Agent` fragments per category, checked in order.
const AGENT_SIGNATURES: &[(BotCategory, &[&str])] = &[
    (
        BotCategory::SearchEngine,
        &[
            "googlebot",
            "bingbot",
            "duckduckbot",
            "baiduspider",
            "yandexbot",
            "applebot",
            "slurp",
        ],
    ),
    (
        BotCategory::Preview,
        &[
            "slackbot",
            "twitterbot",
            "facebookexternalhit",
            "discordbot",
            "linkedinbot",
            "whatsapp",
            "telegrambot",
            "embedly",
        ],
    ),
    (
        BotCategory::Monitor,
        &["uptimerobot", "pingdom", "statuscake", "site24x7", "datadog synthetics"],
    ),
    (
        BotCategory::AiScraper,
        &["gptbot", "ccbot", "claudebot", "bytespider", "perplexitybot", "amazonbot"],
    ),
    (
        BotCategory::Headless,
        &["headlesschrome", "phantomjs", "puppeteer", "playwright", "selenium"],
    ),
    (
        BotCategory::Tool,
        &[
            "curl/",
            "wget/",
            "python-requests",
            "python-urllib",
            "aiohttp",
            "go-http-client",
            "okhttp",
            "httpie",
            "postmanruntime",
            "java/",
            "libwww-perl",
            "scrapy",
        ],
    ),
    (BotCategory::Crawler, &["bot", "crawler", "spider"]),
];

/// Classifies callers from their `User-Agent` header.
///
/// Known automation signatures win; otherwise a `Mozilla/` agent is taken
/// as a human browser and anything else (including a missing header) is
/// `Unknown`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserAgentClassifier;

impl ClientClassifier for UserAgentClassifier {
    fn classify(&self, facts: &RequestFacts) -> Result<ClientClass, AdmissionError> {
        let Some(agent) = facts.user_agent.as_deref().map(str::trim) else {
            return Ok(ClientClass::Unknown);
        };
        if agent.is_empty() {
            return Ok(ClientClass::Unknown);
        }
        let agent = agent.to_ascii_lowercase();

        let automated = AGENT_SIGNATURES.iter().find_map(|(category, needles)| {
            needles
                .iter()
                .any(|needle| agent.contains(needle))
                .then_some(*category)
        });
        Ok(match automated {
            Some(category) => ClientClass::Automated(category),
            None if agent.starts_with("mozilla/") => ClientClass::Human,
            None => ClientClass::Unknown,
        })
    }
}
