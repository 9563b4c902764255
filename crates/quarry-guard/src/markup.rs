use std::sync::OnceLock;

use regex::Regex;

/// Blocks never shown to a person: proposed queries and model reasoning
fn internal_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<SQL>.*?</SQL>|<think>.*?</think>|<internal>.*?</internal>|```sql.*?```")
            .expect("valid internal block regex")
    })
}

/// An opened reasoning block the model never closed
fn dangling_think_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*$").expect("valid dangling think regex"))
}

/// Orphan tags left after unbalanced output
fn stray_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?(SQL|think|internal)>").expect("valid stray tag regex"))
}

fn blank_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+\n").expect("valid blank run regex"))
}

/// Remove internal markup from text about to reach an end user
pub fn strip_internal_markup(text: &str) -> String {
    let text = internal_block_regex().replace_all(text, "");
    let text = dangling_think_regex().replace(&text, "");
    let text = stray_tag_regex().replace_all(&text, "");
    let text = blank_run_regex().replace_all(&text, "\n\n");

    text.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_queries_are_removed() {
        let reply = "Revenue peaked in March.\n\n<SQL>SELECT month, SUM(total) FROM orders GROUP BY month</SQL>\n\nJakarta leads.";
        assert_eq!(strip_internal_markup(reply), "Revenue peaked in March.\n\nJakarta leads.");
    }

    #[test]
    fn reasoning_blocks_are_removed() {
        let reply = "<think>The user wants totals, so...</think>Total sales were 4,210.";
        assert_eq!(strip_internal_markup(reply), "Total sales were 4,210.");

        let reply = "Answer first.<INTERNAL>scratch</INTERNAL>";
        assert_eq!(strip_internal_markup(reply), "Answer first.");
    }

    #[test]
    fn dangling_think_is_cut_to_the_end() {
        let reply = "Sales are up.\n<think>still reasoning about";
        assert_eq!(strip_internal_markup(reply), "Sales are up.");
    }

    #[test]
    fn sql_fences_are_removed() {
        let reply = "Here is how I got it:\n```sql\nSELECT 1\n```\nDone.";
        assert_eq!(strip_internal_markup(reply), "Here is how I got it:\n\nDone.");
    }

    #[test]
    fn stray_tags_are_dropped() {
        assert_eq!(strip_internal_markup("Totals are final.</SQL>"), "Totals are final.");
    }

    #[test]
    fn ordinary_text_is_untouched() {
        let reply = "Top products:\n\n1. Rice\n2. Coffee";
        assert_eq!(strip_internal_markup(reply), reply);
    }

    #[test]
    fn stripping_is_idempotent() {
        let reply = "<think>x</think>A\n\n\n\n<SQL>SELECT 1</SQL>\nB";
        let once = strip_internal_markup(reply);
        assert_eq!(strip_internal_markup(&once), once);
    }
}
