//! Answer synthesis: prompt building, one completion call, post-processing.

use std::sync::{Arc, LazyLock};

use rand::seq::IndexedRandom;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::domain::CompletionProvider;
use crate::models::{AuxData, OutputFormat, PersonalityMode, SynthesizedAnswer};
use crate::related::encode_uri_component;

pub const APOLOGY_TEXT: &str =
    "Oops! I'm having trouble connecting to my brain right now. Please try again in a moment! 🤖💭";

const FUNNY_PROMPT: &str = "You are a hilarious problem-solver who gives practical advice with jokes, puns, and funny analogies. \
Be helpful but make the user laugh. Use emojis and keep things light-hearted. \
Always end with a funny comment or joke related to the problem.";

const SERIOUS_PROMPT: &str = "You are a wise and experienced advisor who provides thoughtful, well-researched solutions. \
Give detailed, practical advice with step-by-step instructions. \
Be professional but caring. Include relevant facts or statistics when helpful.";

const MOTIVATIONAL_PROMPT: &str = "You are an enthusiastic life coach who inspires and motivates people to overcome challenges. \
Be energetic, positive, and encouraging. Use powerful words and motivational phrases. \
Always end with an inspiring call to action or affirmation.";

const MEME_SUFFIX: &str = "\n\nPlease provide a solution and also suggest a funny meme caption that relates to this problem. \
Format your response as: SOLUTION: [your solution] | MEME: [funny meme text]";
const PHOTO_SUFFIX: &str =
    "\n\nProvide a solution and describe what kind of helpful image or infographic would illustrate this solution best.";
const VIDEO_SUFFIX: &str =
    "\n\nProvide a solution and suggest what type of video tutorial or explanation would be most helpful for this problem.";
const PLAIN_SUFFIX: &str = "\n\nProvide a clear, practical solution.";

/// imgflip template ids used for the illustrative meme image.
const MEME_TEMPLATES: [(&str, &str); 4] = [
    ("181913649", "Drake"),
    ("87743020", "Two Buttons"),
    ("112126428", "Distracted Boyfriend"),
    ("131087935", "Running Away Balloon"),
];

const SHARE_PREVIEW_CHARS: usize = 100;
const CAPTION_FALLBACK_CHARS: usize = 50;
pub const CAPTION_FALLBACK_BOTTOM: &str = "Problem Solved! 😎";

// Caption runs to the first pipe, or to the end of the text.
static MEME_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)MEME:\s*(.+?)(?:\||$)").expect("meme tag pattern is valid"));
static SOLUTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SOLUTION:").expect("solution tag pattern is valid"));

pub fn system_prompt(personality: PersonalityMode) -> &'static str {
    match personality {
        PersonalityMode::Funny => FUNNY_PROMPT,
        PersonalityMode::Serious => SERIOUS_PROMPT,
        PersonalityMode::Motivational => MOTIVATIONAL_PROMPT,
    }
}

pub fn user_prompt(problem: &str, format: OutputFormat) -> String {
    let suffix = match format {
        OutputFormat::Meme => MEME_SUFFIX,
        OutputFormat::Photo => PHOTO_SUFFIX,
        OutputFormat::Video => VIDEO_SUFFIX,
        OutputFormat::Plain => PLAIN_SUFFIX,
    };
    format!("Please help me solve this problem: \"{}\"{}", problem, suffix)
}

/// Turns the generator into a structured answer. Cheap to clone.
#[derive(Clone)]
pub struct Synthesizer {
    provider: Arc<dyn CompletionProvider>,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Never fails: any provider error yields the apology answer with no data.
    pub async fn synthesize(
        &self,
        problem: &str,
        format: OutputFormat,
        personality: PersonalityMode,
    ) -> SynthesizedAnswer {
        let system = system_prompt(personality);
        let user = user_prompt(problem, format);
        debug!(%format, %personality, "synthesizing answer");

        match self.provider.complete(system, &user).await {
            Ok(raw) => post_process(&raw, format, problem),
            Err(e) => {
                error!(error = %e, "completion provider failed; returning apology");
                SynthesizedAnswer { text: APOLOGY_TEXT.to_string(), data: None }
            }
        }
    }
}

/// Format-specific shaping of the raw provider text.
pub fn post_process(raw: &str, format: OutputFormat, problem: &str) -> SynthesizedAnswer {
    let mut text = raw.to_string();
    let mut data = AuxData::default();

    match format {
        OutputFormat::Meme => {
            if let Some((solution, caption)) = split_meme_response(raw) {
                data.image = lookup_meme_image(&caption);
                data.meme_text = Some(caption);
                text = solution;
            } else {
                warn!("meme response had no MEME: caption; returning raw text");
            }
        }
        OutputFormat::Photo => {
            data.suggested_search = Some(format!("{} infographic tutorial", problem));
        }
        OutputFormat::Video => {
            data.video_search = Some(format!("{} tutorial", problem));
            data.youtube_query = Some(encode_uri_component(&format!("{} how to solve", problem)));
            text.push_str(&format!("\n\n🎥 Search YouTube for: \"{} tutorial\"", problem));
        }
        OutputFormat::Plain => {}
    }

    data.share_text = share_text(problem, &text);
    SynthesizedAnswer { text, data: Some(data) }
}

pub fn share_text(problem: &str, text: &str) -> String {
    let preview: String = text.chars().take(SHARE_PREVIEW_CHARS).collect();
    format!("Problem: {}\nSolution: {}...", problem, preview)
}

/// Splits `SOLUTION: x | MEME: y` into `(x, y)`.
///
/// The matched caption segment and the first `SOLUTION:` tag are removed, then
/// leftover whitespace and `|` separators are trimmed from both ends. Returns
/// `None` when there is no caption or it is blank.
pub fn split_meme_response(raw: &str) -> Option<(String, String)> {
    let caps = MEME_TAG.captures(raw)?;
    let whole = caps.get(0)?;
    let caption = caps.get(1)?.as_str().trim();
    if caption.is_empty() {
        return None;
    }

    let mut rest = String::with_capacity(raw.len());
    rest.push_str(&raw[..whole.start()]);
    rest.push_str(&raw[whole.end()..]);
    let rest = SOLUTION_TAG.replacen(&rest, 1, "");
    let solution = rest.trim_matches(|c: char| c == '|' || c.is_whitespace());

    Some((solution.to_string(), caption.to_string()))
}

// Stands in for an external meme API; a miss just leaves the answer text-only.
fn lookup_meme_image(caption: &str) -> Option<String> {
    let mut rng = rand::rng();
    let picked = MEME_TEMPLATES.choose(&mut rng);
    match picked {
        Some((id, name)) => {
            debug!(template = name, caption_len = caption.len(), "picked meme template");
            Some(format!("https://imgflip.com/s/meme/{}.jpg", id))
        }
        None => None,
    }
}

/// Top/bottom caption suggestion for the meme editor.
pub fn meme_captions(text: &str) -> (String, String) {
    let mut sentences = text.split(". ");
    match (sentences.next(), sentences.next()) {
        (Some(first), Some(second)) => (first.to_string(), second.to_string()),
        _ => (
            text.chars().take(CAPTION_FALLBACK_CHARS).collect(),
            CAPTION_FALLBACK_BOTTOM.to_string(),
        ),
    }
}
