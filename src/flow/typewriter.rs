//! Character-by-character text reveal.
//!
//! A bot message is revealed one unit at a time: a unit is a single
//! character, or a whole inline tag such as `<b>` so markup never shows half
//! written. After each unit the reveal pauses for the configured base delay,
//! longer after clause (`,;:`) and sentence (`.!?`) punctuation.
//!
//! [`reveal`] is a `Stream` of growing prefixes. Dropping the stream cancels
//! the pending timer.

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};

use crate::backend::RevealPacing;

/// Split text into reveal units.
fn units(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch == '<' {
            if let Some(close) = text[start..].find('>') {
                let end = start + close + 1;
                out.push(text[start..end].to_string());
                while chars.peek().is_some_and(|(i, _)| *i < end) {
                    chars.next();
                }
                continue;
            }
        }
        out.push(ch.to_string());
    }
    out
}

fn pause_after(unit: &str, pacing: &RevealPacing) -> Duration {
    let ms = match unit.chars().last() {
        Some('.' | '!' | '?') => pacing.sentence_delay_ms,
        Some(',' | ';' | ':') => pacing.clause_delay_ms,
        _ if unit.starts_with('<') => 0,
        _ => pacing.base_delay_ms,
    };
    Duration::from_millis(ms)
}

/// Pause after every reveal unit of `text`.
pub fn schedule(text: &str, pacing: &RevealPacing) -> Vec<Duration> {
    units(text).iter().map(|u| pause_after(u, pacing)).collect()
}

/// Total time a full reveal takes.
pub fn total_duration(text: &str, pacing: &RevealPacing) -> Duration {
    // The pause after the last unit is never waited for.
    let mut delays = schedule(text, pacing);
    delays.pop();
    delays.into_iter().sum()
}

struct Cursor {
    units: std::vec::IntoIter<(String, Duration)>,
    shown: String,
    pause: Duration,
}

/// Stream of growing prefixes of `text`; the last item is the full text.
pub fn reveal(text: &str, pacing: RevealPacing) -> impl Stream<Item = String> {
    let steps: Vec<(String, Duration)> = units(text)
        .into_iter()
        .map(|u| {
            let pause = pause_after(&u, &pacing);
            (u, pause)
        })
        .collect();
    let cursor = Cursor {
        units: steps.into_iter(),
        shown: String::with_capacity(text.len()),
        pause: Duration::ZERO,
    };

    stream::unfold(cursor, |mut cursor| async move {
        let (unit, pause) = cursor.units.next()?;
        if !cursor.pause.is_zero() {
            tokio::time::sleep(cursor.pause).await;
        }
        cursor.shown.push_str(&unit);
        cursor.pause = pause;
        Some((cursor.shown.clone(), cursor))
    })
}

/// Run a reveal to completion.
pub async fn play(text: &str, pacing: RevealPacing) {
    reveal(text, pacing).for_each(|_| async {}).await;
}

// ─── Tests ──────────────────────────────────────────────────────────────────
