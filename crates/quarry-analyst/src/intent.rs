//! Conversational turns that need no data and no completion call

use std::sync::OnceLock;

use indoc::formatdoc;
use regex::Regex;

/// Longest message still treated as a bare greeting
const GREETING_MAX_WORDS: usize = 4;

/// A turn answered with a canned reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    /// "What can you help with?"
    Capabilities,
    /// "Who built you?"
    Identity,
}

fn greeting_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(hi|hello|hey|greetings|good (morning|afternoon|evening))\b").expect("valid greeting regex")
    })
}

fn capabilities_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)what\s+can\s+you\s+(help|do)|what\s+do\s+you\s+do|capabilities|how\s+can\s+you\s+(assist|help)")
            .expect("valid capabilities regex")
    })
}

fn identity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)who\s+(created|built|made|developed)\s+you|who\s+are\s+you|what\s+is\s+your\s+name|how\s+old\s+are\s+you|where\s+(are\s+you|do\s+you\s+live)|your\s+purpose",
        )
        .expect("valid identity regex")
    })
}

/// Classify the latest user text
///
/// Greetings only count when the message is little more than the greeting
/// itself, so "hi, what sold best in March?" still reaches the backend.
pub fn detect(text: &str) -> Option<Intent> {
    let text = text.trim();

    if capabilities_regex().is_match(text) {
        return Some(Intent::Capabilities);
    }

    if identity_regex().is_match(text) {
        return Some(Intent::Identity);
    }

    if greeting_regex().is_match(text) && text.split_whitespace().count() <= GREETING_MAX_WORDS {
        return Some(Intent::Greeting);
    }

    None
}

/// Reply for a detected intent
pub fn canned_reply(intent: Intent, assistant_name: &str) -> String {
    match intent {
        Intent::Greeting | Intent::Capabilities => formatdoc! {"
            **Executive Summary**

            I am {assistant_name}, the analytics assistant for this dashboard. I turn business \
            questions into read-only SQL, run it against your data and summarize what the numbers mean.

            **What I Can Help With**
            - Explaining the chart or dataset you are looking at
            - Ad-hoc questions about products, branches, customers or time periods
            - Follow-up questions that need a fresh query
            - Spotting trends, outliers and comparisons

            Ask about any metric and I will fetch the data if it is available."
        },
        Intent::Identity => formatdoc! {"
            **Executive Summary**

            I am {assistant_name}, here to help you explore the business metrics in this dashboard.

            **Example Questions**
            - \"Which branch had the highest sales in March?\"
            - \"What were our five best-selling products last quarter?\"
            - \"Show monthly revenue for this year.\"
            - \"Who are our most valuable customers?\""
        },
    }
}
