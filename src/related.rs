//! Search links, keyword categories and other small helpers around a problem.

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelatedLinks {
    pub youtube: String,
    pub google: String,
    pub reddit: String,
}

// Marks that browsers' encodeURIComponent leaves as-is but urlencoding escapes.
const UNRESERVED_MARKS: [(&str, &str); 5] = [("%21", "!"), ("%27", "'"), ("%28", "("), ("%29", ")"), ("%2A", "*")];

/// Percent-encodes a query component the way browsers' `encodeURIComponent` does.
pub fn encode_uri_component(raw: &str) -> String {
    UNRESERVED_MARKS
        .iter()
        .fold(urlencoding::encode(raw).into_owned(), |acc, (escaped, mark)| acc.replace(escaped, mark))
}

pub fn search_related_content(problem: &str) -> RelatedLinks {
    let query = encode_uri_component(&format!("{} solution tutorial", problem));
    RelatedLinks {
        youtube: format!("https://www.youtube.com/results?search_query={}", query),
        google: format!("https://www.google.com/search?q={}", query),
        reddit: format!("https://www.reddit.com/search?q={}", query),
    }
}

// Checked in order; the first category with a keyword hit wins.
const CATEGORIES: [(&str, &[&str]); 6] = [
    ("work", &["productivity", "career", "job", "workplace", "office", "boss"]),
    ("health", &["diet", "exercise", "sleep", "stress", "mental health", "fitness"]),
    ("relationship", &["dating", "marriage", "friends", "family", "social"]),
    ("money", &["budget", "savings", "debt", "investment", "finance"]),
    ("education", &["study", "learn", "school", "college", "exam"]),
    ("technology", &["computer", "phone", "app", "software", "internet"]),
];

pub fn problem_category(problem: &str) -> &'static str {
    let lower = problem.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("general")
}

const PROBLEMS_OF_THE_DAY: [&str; 5] = [
    "How to stay motivated while working from home?",
    "What's the best way to learn a new skill quickly?",
    "How to manage time effectively?",
    "How to deal with social media addiction?",
    "What to do when feeling overwhelmed?",
];

pub fn problem_of_the_day() -> &'static str {
    PROBLEMS_OF_THE_DAY
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(PROBLEMS_OF_THE_DAY[0])
}

/// "Just now", "5m ago", "3h ago", "2d ago".
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    match secs {
        s if s < 60 => "Just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// First `max_chars` characters followed by an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
