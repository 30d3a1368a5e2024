//! Entry routing between small talk and the technical consultation, and the
//! canned small-talk replies.

use once_cell::sync::Lazy;
use regex::Regex;

use super::state::Route;

const SMALLTALK_MAX_CHARS: usize = 64;
const SHORT_INPUT_MAX_CHARS: usize = 20;

static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(hi|hallo|hello|hey|servus|moin|grüß(?:e)?\s*dich|guten\s*(?:morgen|tag|abend))\b")
        .expect("static greeting pattern")
});
static SMALLTALK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(wie\s+geht'?s|alles\s+gut|was\s+geht|na\s+du|danke|bitte|tschüss|ciao|bye)\b")
        .expect("static smalltalk pattern")
});
static TECH_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(rwdr|hydraulik|dichtung|welle|gehäuse|rpm|u/min|bar|°c|tmax|werkstoff|profil)\b")
        .expect("static technical hint pattern")
});

static BYE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(tsch(ü|u)ss|ciao|bye)\b").expect("static bye pattern"));
static HOW_ARE_YOU: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)wie\s+geht'?s|how\s+are\s+you").expect("static how-are-you pattern"));
static HELLO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(hi|hallo|hello|hey|servus|moin)\b").expect("static hello pattern"));

/// Picks the macro-branch for a turn.
///
/// `text` is all user text of the thread joined, `form_submitted` is true
/// when the client sent a params patch with this turn.
pub fn route(text: &str, form_submitted: bool) -> Route {
    if form_submitted {
        return Route::Default;
    }
    let text = text.trim();
    if text.is_empty() || TECH_HINT.is_match(text) {
        return Route::Default;
    }

    let len = text.chars().count();
    if (GREETING.is_match(text) || SMALLTALK.is_match(text)) && len <= SMALLTALK_MAX_CHARS {
        return Route::Smalltalk;
    }
    if len <= SHORT_INPUT_MAX_CHARS {
        return Route::Smalltalk;
    }
    Route::Default
}

/// Deterministic reply for a small-talk message.
pub fn reply(text: &str) -> &'static str {
    if BYE.is_match(text) {
        "Tschüss! Melde dich jederzeit wieder."
    } else if HOW_ARE_YOU.is_match(text) {
        "Danke der Nachfrage, mir geht's gut! Wie kann ich dir helfen?"
    } else if HELLO.is_match(text) {
        "Hallo! Wie kann ich dir helfen?"
    } else {
        "Alles klar! Womit kann ich dir helfen?"
    }
}
