//! Prompt templates for the character, narrator and memory agents

use crate::character::Character;
use regex::{Captures, Regex};
use std::sync::LazyLock;

const CHARACTER_PROMPT: &str = "\
You are a character in a visual novel. You may respond in any style, but it must align with your character's personality.

Character name: {name}
Character background: {background}
Persona: {description}
Speaking style: {style}

Context:
{context}
User: {user_input}
{name}: ";

const NARRATOR_PROMPT: &str = "\
You are a narrator in a visual novel.

Your role is to describe the physical scene and the character's emotional actions.
Focus on body language, subtle changes in behavior, or shifts in tone.
Only describe; do NOT include any spoken dialogue.
Return output wrapped in asterisks, e.g. *She smiles and looks away.*

Character:
- Name: {name}
- Style: {style}
- Description: {description}

Conversation so far:
{context}

User just said:
{user_input}

Narrator:";

const SUMMARY_PROMPT: &str = "\
Here is the current story summary:
{old_summary}

The conversation just added:
User: {user_input}
Assistant: {assistant_reply}

Please provide a concise, one-paragraph UPDATED summary that includes any new facts or emotional shifts.";

const EXTRACTION_PROMPT: &str = "\
Conversation update:
User: {user_input}
Assistant: {assistant_reply}

List any new facts or feelings in JSON, like:
[
  { \"type\": \"fact\", \"text\": \"…\" },
  { \"type\": \"feeling\", \"text\": \"…\" }
]";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Fill `{key}` placeholders in a single pass.
///
/// Substituted text is never scanned again, and unknown placeholders are left as-is.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

fn persona_prompt(template: &str, character: &Character, context: &str, user_input: &str) -> String {
    render(
        template,
        &[
            ("name", character.name.as_str()),
            ("background", character.background.as_str()),
            ("description", character.style.description.as_str()),
            ("style", character.style.kind.as_str()),
            ("context", context),
            ("user_input", user_input),
        ],
    )
}

pub fn character_prompt(character: &Character, context: &str, user_input: &str) -> String {
    persona_prompt(CHARACTER_PROMPT, character, context, user_input)
}

pub fn narrator_prompt(character: &Character, context: &str, user_input: &str) -> String {
    persona_prompt(NARRATOR_PROMPT, character, context, user_input)
}

pub fn summary_prompt(old_summary: &str, user_input: &str, assistant_reply: &str) -> String {
    render(
        SUMMARY_PROMPT,
        &[
            ("old_summary", old_summary),
            ("user_input", user_input),
            ("assistant_reply", assistant_reply),
        ],
    )
}

pub fn extraction_prompt(user_input: &str, assistant_reply: &str) -> String {
    render(
        EXTRACTION_PROMPT,
        &[("user_input", user_input), ("assistant_reply", assistant_reply)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Style;

    fn ada() -> Character {
        Character {
            name: "Ada".into(),
            background: "Clockmaker".into(),
            style: Style {
                kind: "cheerful".into(),
                description: "Curious".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_character_prompt_ends_with_cue() {
        let p = character_prompt(&ada(), "Greeting.", "Hello");
        assert!(p.contains("Character name: Ada\n"));
        assert!(p.contains("Speaking style: cheerful\n"));
        assert!(p.ends_with("Context:\nGreeting.\nUser: Hello\nAda: "));
    }

    #[test]
    fn test_user_text_is_not_templated() {
        let p = character_prompt(&ada(), "ctx {name}", "what is {user_input}?");
        assert!(p.contains("ctx {name}\n"));
        assert!(p.contains("User: what is {user_input}?\n"));
    }

    #[test]
    fn test_memory_text_is_not_templated() {
        let s = summary_prompt("Recap mentions {user_input}.", "what is {assistant_reply}?", "Hi");
        assert!(s.contains("Recap mentions {user_input}.\n"));
        assert!(s.contains("User: what is {assistant_reply}?\nAssistant: Hi\n"));

        let e = extraction_prompt("say {assistant_reply}", "{user_input}");
        assert!(e.contains("User: say {assistant_reply}\nAssistant: {user_input}\n"));
    }

    #[test]
    fn test_persona_fields_are_not_templated() {
        let mut character = ada();
        character.name = "Ada {background}".into();
        character.style.description = "Says {context} a lot".into();
        let p = character_prompt(&character, "Greeting.", "Hello");
        assert!(p.contains("Character name: Ada {background}\n"));
        assert!(p.contains("Character background: Clockmaker\n"));
        assert!(p.contains("Persona: Says {context} a lot\n"));
        assert!(p.ends_with("Context:\nGreeting.\nUser: Hello\nAda {background}: "));
    }

    #[test]
    fn test_narrator_prompt() {
        let p = narrator_prompt(&ada(), "Greeting.", "Hello");
        assert!(p.contains("- Name: Ada\n"));
        assert!(p.contains("Conversation so far:\nGreeting.\n\nUser just said:\nHello\n\nNarrator:"));
        assert!(p.contains("do NOT include any spoken dialogue"));
    }

    #[test]
    fn test_memory_prompts() {
        let s = summary_prompt("", "Hello", "Hi there");
        assert!(s.starts_with("Here is the current story summary:\n\n"));
        assert!(s.contains("User: Hello\nAssistant: Hi there\n"));

        let e = extraction_prompt("Hello", "Hi there");
        assert!(e.contains("{ \"type\": \"fact\", \"text\": \"…\" }"));
    }
}
