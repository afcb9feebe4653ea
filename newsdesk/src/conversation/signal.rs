//! Finalize-signal parsing.
//!
//! The model marks an agreed item with a delimited block:
//!
//! ```text
//! <SAVE_ITEM>
//! <name>…</name><url>…</url><reason>…</reason><agreed_text>…</agreed_text>
//! </SAVE_ITEM>
//! ```
//!
//! Anything that does not parse cleanly is treated as "not final yet".

use std::sync::LazyLock;

use regex::Regex;

use crate::sessions::Draft;

static SAVE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<SAVE_ITEM>(.*?)</SAVE_ITEM>").unwrap());

// An opening tag the model never closed; everything after it is dropped from display.
static DANGLING_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<SAVE_ITEM>.*$").unwrap());

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(name|url|reason|agreed_text)>(.*?)</(name|url|reason|agreed_text)>")
        .unwrap()
});

static DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*[—–]\s*").unwrap());
static DOUBLE_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*,").unwrap());

/// Fields carried by a finalize block. Empty tags are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSignal {
    pub name: Option<String>,
    pub url: Option<String>,
    pub reason: Option<String>,
    pub agreed_text: Option<String>,
}

impl SaveSignal {
    /// url, reason and agreed text are all present
    pub fn is_complete(&self) -> bool {
        self.url.is_some() && self.reason.is_some() && self.agreed_text.is_some()
    }

    pub fn as_draft(&self) -> Draft {
        Draft {
            url: self.url.clone(),
            reason: self.reason.clone(),
            blurb: self.agreed_text.clone(),
        }
    }
}

/// A model reply split into what the contributor sees and the signal, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub text: String,
    pub signal: Option<SaveSignal>,
}

pub fn parse_reply(raw: &str) -> ParsedReply {
    let signal = SAVE_BLOCK_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|block| parse_fields(block.as_str()));

    let text = SAVE_BLOCK_RE.replace_all(raw, "");
    let text = DANGLING_OPEN_RE.replace(&text, "");

    ParsedReply {
        text: text.trim().to_string(),
        signal,
    }
}

fn parse_fields(block: &str) -> SaveSignal {
    let mut signal = SaveSignal::default();
    for caps in FIELD_RE.captures_iter(block) {
        let open = caps[1].to_ascii_lowercase();
        if !open.eq_ignore_ascii_case(&caps[3]) {
            continue;
        }
        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        let slot = match open.as_str() {
            "name" => &mut signal.name,
            "url" => &mut signal.url,
            "reason" => &mut signal.reason,
            _ => &mut signal.agreed_text,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    signal
}

/// Replace em and en dashes used as clause separators with commas.
pub fn strip_dashes(text: &str) -> String {
    let text = DASH_RE.replace_all(text, ", ");
    DOUBLE_COMMA_RE.replace_all(&text, ",").into_owned()
}
