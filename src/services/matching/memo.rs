//! Memo parsing: sender name, phone, and email extraction from the free
//! text that rides along with a payment.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("invalid email regex")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+?\d[\d\-\s().]{7,}\d").expect("invalid phone regex")
});

// Zelle/Venmo bank descriptors tend to carry the counterparty as
// "ZELLE FROM JANE DOE" or "From: Jane Doe".
static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:from|by|sender)[:\s]+([A-Za-z][A-Za-z .'-]{1,40})")
        .expect("invalid sender regex")
});

/// Contact hints extracted from a payment memo.
#[derive(Debug, Clone, Default)]
pub struct MemoSignals {
    pub sender_names: Vec<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}

impl MemoSignals {
    pub fn parse(memo: Option<&str>) -> Self {
        let Some(memo) = memo else {
            return Self::default();
        };

        let emails: Vec<String> = EMAIL_RE
            .find_iter(memo)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let phones: Vec<String> = PHONE_RE
            .find_iter(memo)
            .map(|m| phone_digits(m.as_str()))
            .filter(|digits| digits.len() >= 10)
            .collect();

        let mut sender_names: Vec<String> = Vec::new();
        for capture in FROM_RE.captures_iter(memo) {
            if let Some(name) = capture.get(1) {
                push_name(&mut sender_names, name.as_str());
            }
        }

        // Fall back to memo segments that read like a bare person name once
        // emails and phone numbers are stripped out.
        for segment in memo.split(['|', '\n', ';']) {
            let stripped = EMAIL_RE.replace_all(segment, " ");
            let stripped = PHONE_RE.replace_all(&stripped, " ");
            let cleaned = stripped.trim();
            if looks_like_name(cleaned) {
                push_name(&mut sender_names, cleaned);
            }
        }

        Self {
            sender_names,
            phones,
            emails,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sender_names.is_empty() && self.phones.is_empty() && self.emails.is_empty()
    }
}

/// Strip a phone string down to its digits.
pub fn phone_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn push_name(names: &mut Vec<String>, raw: &str) {
    let normalized = normalize_name(raw);
    if !normalized.is_empty() && !names.contains(&normalized) {
        names.push(normalized);
    }
}

/// Lowercase, punctuation-free, single-spaced form used for similarity.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_name(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let words: Vec<&str> = s.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) {
        return false;
    }
    words
        .iter()
        .all(|w| w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '.' || c == '-'))
}
