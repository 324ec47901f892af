//! Request cost by user-agent class.
//!
//! Rules are evaluated top to bottom against the lowercased user agent; the
//! first rule with a matching substring wins.

/// Coarse classification of a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    /// Crawlers, scrapers and command-line HTTP clients
    Automation,
    /// AI agents and their crawlers
    AiAgent,
    /// Everything else
    Default,
}

impl TrafficClass {
    pub fn weight(self) -> u64 {
        match self {
            TrafficClass::Automation => 5,
            TrafficClass::AiAgent => 10,
            TrafficClass::Default => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrafficClass::Automation => "automation",
            TrafficClass::AiAgent => "ai_agent",
            TrafficClass::Default => "default",
        }
    }
}

const RULES: &[(&[&str], TrafficClass)] = &[
    (
        &["bot", "crawler", "spider", "scrapy", "curl", "wget"],
        TrafficClass::Automation,
    ),
    (
        &["openai", "gpt", "anthropic", "claude", "ai"],
        TrafficClass::AiAgent,
    ),
];

pub fn classify(user_agent: &str) -> TrafficClass {
    let ua = user_agent.to_lowercase();
    RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| ua.contains(p)))
        .map(|(_, class)| *class)
        .unwrap_or(TrafficClass::Default)
}

/// Cost of one request from `user_agent`, scaled by `multiplier` and rounded up.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn request_weight(user_agent: &str, multiplier: Option<f64>) -> u64 {
    let base = classify(user_agent).weight();
    match multiplier {
        // negative or NaN results saturate to zero, huge ones to u64::MAX
        Some(m) => (base as f64 * m).ceil() as u64,
        None => base,
    }
}
