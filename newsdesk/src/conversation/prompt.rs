use crate::feed::FeedEntry;

/// Opening line for every new session. Fixed text, so it costs no model call.
pub const GREETING: &str = "Welcome to the newsletter agent! I'm here to help you add your news item. \
If you have no idea how this works, let me know and I'll explain. \
Or, if you do know how it works, just tell me your name and we'll get going.";

/// Phrases that mean the contributor wants to see what has been collected
const FEED_KEYWORDS: &[&str] = &[
    "feed",
    "recent",
    "latest",
    "what's been added",
    "what has been added",
    "show me",
    "show items",
    "see items",
    "submitted",
    "in the pipeline",
    "so far",
    "what's there",
    "what is there",
    "list",
    "entries",
];

pub fn wants_feed(message: &str) -> bool {
    let lower = message.to_lowercase();
    FEED_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

pub fn build_system_prompt(newsletter: &str) -> String {
    format!(
        r#"You are an editorial assistant collecting items for {newsletter}. Contributors share links
they think readers should see. Help each of them turn one link into short, publishable copy.

STYLE
- Be direct and brief. No filler, no gushing, no "Great question!".
- Never use em dashes or en dashes. Use a comma, a full stop, or rewrite the sentence.
- Have opinions and push back when something is vague, but stay factual.
- If a contributor insists on exact wording, use it.

WHAT EACH ITEM NEEDS
1. The contributor's name.
2. A URL for the story.
3. Their reason for including it. This stays private and is never published.
4. Agreed copy for the newsletter: 2 to 4 short sentences, roughly 50 to 80 words, active
   voice, no URL in the copy. The first sentence is the hook and is shown in bold, so wrap it
   in **double asterisks**.

CONVERSATION
1. Ask for their name if you do not have it.
2. Ask for the link.
3. Ask why it is worth including.
4. Play their reasoning back in a sentence, then ask one focused follow-up that would make the
   copy sharper. Do not draft yet.
5. Draft the copy with the bolded hook, show it exactly as it will appear, and ask whether the
   hook works.
6. Revise until they clearly approve ("yes", "looks good", "save it", "go ahead").
7. Confirm what you are saving and include this block in your reply:

<SAVE_ITEM>
<name>their name</name>
<url>the url</url>
<reason>their reason, verbatim or a close paraphrase</reason>
<agreed_text>the final agreed copy with the first sentence in **double asterisks**</agreed_text>
</SAVE_ITEM>

   After the block, tell them it is saved and offer to start another item.

FEED QUESTIONS
If a message carries a note with feed data, summarise it briefly: who added what and a line on
each story. Do not read it out verbatim.

RULES
- Never include <SAVE_ITEM> until the contributor has explicitly approved the copy. If unsure,
  ask "Shall I go ahead and save that?"
- Saved items cannot be edited here. If someone wants a change, draft a new item.
- Do not ask again for information you already have.
- One item at a time."#
    )
}

/// System note telling the model who it is talking to
pub fn contributor_note(name: &str) -> String {
    format!("The contributor's name is {}. Do not ask for it again.", name)
}

/// Assistant-only context attached to a contributor message that asks about the feed
pub fn feed_note(entries: &[FeedEntry]) -> String {
    let mut note = String::from("[SYSTEM NOTE, for assistant only, do not quote verbatim]\n");
    if entries.is_empty() {
        note.push_str("FEED DATA: No items have been saved yet.");
        return note;
    }

    note.push_str(&format!("FEED DATA, {} most recent item(s):", entries.len()));
    for (i, entry) in entries.iter().enumerate() {
        note.push_str(&format!(
            "\n\n[{}] Added by {} on {}\n    URL: {}\n    Blurb: {}",
            i + 1,
            entry.submitter_name,
            entry.created_at.format("%Y-%m-%d"),
            entry.url,
            entry.agreed_text
        ));
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn feed_requests_are_detected() {
        assert!(wants_feed("Can you SHOW ME what's been added?"));
        assert!(wants_feed("what's the latest"));
        assert!(!wants_feed("Here's a link: https://example.com/story"));
    }

    #[test]
    fn feed_note_lists_public_fields() {
        let entries = vec![FeedEntry {
            id: 1,
            submitter_name: "Alice".into(),
            url: "https://example.com/story".into(),
            agreed_text: "**Hook.** Body.".into(),
            created_at: Utc::now(),
        }];
        let note = feed_note(&entries);
        assert!(note.contains("Added by Alice"));
        assert!(note.contains("https://example.com/story"));
        assert!(feed_note(&[]).contains("No items have been saved yet"));
    }

    #[test]
    fn prompt_names_the_newsletter_and_block() {
        let prompt = build_system_prompt("the Lab Bulletin");
        assert!(prompt.contains("the Lab Bulletin"));
        assert!(prompt.contains("<SAVE_ITEM>"));
        assert!(!prompt.contains('—'));
    }
}
