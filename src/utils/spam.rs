//! Regex heuristics for rejecting spam on free-text forms. Only the text
//! itself is inspected.

use crate::utils::error::{PortalError, Result};
use regex::Regex;
use std::sync::OnceLock;

const MAX_LINKS: usize = 2;

const SPAM_PHRASES: &[&str] = &[
    "casino",
    "viagra",
    "crypto investment",
    "seo services",
    "backlinks",
    "payday loan",
];

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid url regex"))
}

fn link_markup_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\[url=|\[link=|<a\s+href=)").expect("valid link markup regex")
    })
}

fn cyrillic_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\p{Cyrillic}").expect("valid cyrillic regex"))
}

/// Returns `Err(PortalError::Spam)` naming the first heuristic that matched.
pub fn check(name: &str, message: &str) -> Result<()> {
    if url_pattern().is_match(name) {
        return Err(spam("link in name field"));
    }

    let links = url_pattern().find_iter(message).count();
    if links > MAX_LINKS {
        return Err(spam(&format!("{} links in message", links)));
    }

    if link_markup_pattern().is_match(message) {
        return Err(spam("link markup in message"));
    }

    let letters = message.chars().filter(|c| c.is_alphabetic()).count();
    let cyrillic = cyrillic_pattern().find_iter(message).count();
    if letters > 0 && cyrillic * 2 > letters {
        return Err(spam("mostly cyrillic message"));
    }

    let lowered = message.to_lowercase();
    if let Some(phrase) = SPAM_PHRASES.iter().find(|p| lowered.contains(*p)) {
        return Err(spam(&format!("contains '{}'", phrase)));
    }

    Ok(())
}

fn spam(reason: &str) -> PortalError {
    tracing::debug!("Rejecting form submission: {}", reason);
    PortalError::Spam {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_passes() {
        assert!(check("Ada Lovelace", "My renewal failed for the green book, see https://searchworks.example.edu/view/123").is_ok());
    }

    #[test]
    fn test_link_in_name_rejected() {
        assert!(matches!(
            check("http://spam.example.com", "hello"),
            Err(PortalError::Spam { .. })
        ));
    }

    #[test]
    fn test_too_many_links_rejected() {
        let message = "http://a.example http://b.example www.c.example";
        assert!(check("Bob", message).is_err());
    }

    #[test]
    fn test_link_markup_rejected() {
        assert!(check("Bob", "[url=http://x.example]cheap[/url]").is_err());
    }

    #[test]
    fn test_cyrillic_message_rejected() {
        assert!(check("Bob", "Привет как дела").is_err());
        assert!(check("Bob", "Thanks for the help! Спасибо").is_ok());
    }

    #[test]
    fn test_spam_phrase_rejected() {
        assert!(check("Bob", "Best CASINO bonuses").is_err());
    }
}
