//! Prompt Building and Generation Parsing
//!
//! Prompts for the phone agent, plus the parser that separates spoken text
//! from any control markup a generation contains. Control markup is
//! `[TOOL_CALL: {"name": ..., "arguments": {...}}]` and `[STATE: name]`.
//! Neither has any effect on its own; the caller decides what to do with it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Rough token estimate, ~4 graphemes per token
pub fn estimate_tokens(text: &str) -> usize {
    use unicode_segmentation::UnicodeSegmentation;
    text.graphemes(true).count().max(1) / 4
}

/// Prompt builder for the phone agent
#[derive(Debug, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persona and ground rules
    pub fn system_prompt(mut self, business: &str, agent_name: &str) -> Self {
        self.messages.push(Message::system(format!(
            "You are {agent_name}, answering missed calls for {business}, a home heating and \
             cooling service company. Speak in one or two short, friendly sentences suitable for \
             a phone call. Ask at most one question at a time.\n\
             You cannot book, cancel, confirm or schedule anything yourself and you must never \
             say that an appointment, callback or alert has been made. Those happen elsewhere."
        )));
        self
    }

    /// What the current step of the call is trying to achieve
    pub fn with_state_guidance(mut self, state: &str, goal: &str, legal_intents: &[&str]) -> Self {
        let mut guidance = format!("## Current Step: {}\n{}", state, goal);
        if !legal_intents.is_empty() {
            guidance.push_str("\nThe caller may reasonably want to: ");
            guidance.push_str(&legal_intents.join(", "));
            guidance.push('.');
        }
        self.messages.push(Message::system(guidance));
        self
    }

    /// Known facts the agent may mention
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.trim().is_empty() {
            self.messages
                .push(Message::system(format!("## What we know\n{}", context)));
        }
        self
    }

    pub fn with_history(mut self, history: &[Message]) -> Self {
        self.messages.extend(history.iter().cloned());
        self
    }

    pub fn user_message(mut self, message: &str) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }

    /// Build within a token limit. System messages are always kept; the
    /// oldest conversation messages are dropped first.
    pub fn build_with_limit(self, max_tokens: usize) -> Vec<Message> {
        let current_tokens = self.estimate_tokens();
        if current_tokens <= max_tokens {
            return self.messages;
        }

        let (system_msgs, conv_msgs): (Vec<_>, Vec<_>) = self
            .messages
            .into_iter()
            .partition(|m| matches!(m.role, Role::System));

        let system_tokens: usize = system_msgs.iter().map(|m| estimate_tokens(&m.content)).sum();
        let available_tokens = max_tokens.saturating_sub(system_tokens);

        let mut kept_msgs: Vec<Message> = Vec::new();
        let mut used_tokens = 0;
        for msg in conv_msgs.into_iter().rev() {
            let msg_tokens = estimate_tokens(&msg.content);
            if used_tokens + msg_tokens > available_tokens {
                break;
            }
            kept_msgs.push(msg);
            used_tokens += msg_tokens;
        }
        kept_msgs.reverse();

        let mut result = system_msgs;
        result.extend(kept_msgs);

        tracing::debug!(
            from_tokens = current_tokens,
            to_tokens = system_tokens + used_tokens,
            messages = result.len(),
            "Prompt truncated"
        );
        result
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }
}

/// Parsed tool call from a generation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    /// Tool name as written by the generator
    pub name: String,
    pub arguments: serde_json::Value,
    /// Text before the tool call
    pub text_before: String,
    /// Text after the tool call
    pub text_after: String,
}

const TOOL_MARKER: &str = "[TOOL_CALL:";
const STATE_MARKER: &str = "[STATE:";

/// Byte offset just past the JSON object starting at `s[0] == '{'`
fn json_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first `[TOOL_CALL: {...}]` from a generation
pub fn parse_tool_call(response: &str) -> Option<ParsedToolCall> {
    let start_idx = response.find(TOOL_MARKER)?;
    let after_marker = &response[start_idx + TOOL_MARKER.len()..];
    let json_offset = after_marker.find('{')?;
    let json_region = &after_marker[json_offset..];
    let json_len = json_object_end(json_region)?;

    let value: serde_json::Value = serde_json::from_str(&json_region[..json_len]).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = value
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

    let rest = &json_region[json_len..];
    let rest = rest.trim_start().strip_prefix(']').unwrap_or(rest);

    Some(ParsedToolCall {
        name,
        arguments,
        text_before: response[..start_idx].trim().to_string(),
        text_after: rest.trim().to_string(),
    })
}

/// A generation split into speech and control markup
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGeneration {
    /// Spoken text with all markup removed
    pub text: String,
    pub tool_call: Option<ParsedToolCall>,
    /// State named in a `[STATE: ...]` claim, lowercased
    pub claimed_state: Option<String>,
}

impl ParsedGeneration {
    pub fn has_control_markup(&self) -> bool {
        self.tool_call.is_some() || self.claimed_state.is_some()
    }
}

/// Split a raw generation
pub fn parse_generation(raw: &str) -> ParsedGeneration {
    let tool_call = parse_tool_call(raw);
    let claimed_state = raw.find(STATE_MARKER).and_then(|idx| {
        let rest = &raw[idx + STATE_MARKER.len()..];
        let end = rest.find(']')?;
        let name = rest[..end].trim().to_lowercase();
        (!name.is_empty()).then_some(name)
    });

    ParsedGeneration {
        text: strip_markup(raw),
        tool_call,
        claimed_state,
    }
}

/// Remove every control marker, collapsing whitespace
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        let next = [rest.find(TOOL_MARKER), rest.find(STATE_MARKER)]
            .into_iter()
            .flatten()
            .min();
        let Some(idx) = next else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        rest = match marker_len(tail) {
            Some(len) => &tail[len..],
            // Unterminated marker: drop the remainder
            None => "",
        };
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn marker_len(tail: &str) -> Option<usize> {
    if let Some(after) = tail.strip_prefix(TOOL_MARKER) {
        let brace = after.find('{')?;
        let json_len = json_object_end(&after[brace..])?;
        let consumed = TOOL_MARKER.len() + brace + json_len;
        let close = tail[consumed..].find(']').map(|i| i + 1).unwrap_or(0);
        Some(consumed + close)
    } else {
        tail.find(']').map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_simple() {
        let response = r#"Let me book that. [TOOL_CALL: {"name": "book_service", "arguments": {"time": "9am"}}]"#;
        let parsed = parse_tool_call(response).expect("tool call");
        assert_eq!(parsed.name, "book_service");
        assert_eq!(parsed.arguments["time"], "9am");
        assert_eq!(parsed.text_before, "Let me book that.");
        assert!(parsed.text_after.is_empty());
    }

    #[test]
    fn test_parse_tool_call_with_nested_arrays() {
        let response = r#"[TOOL_CALL: {"name": "send_alert", "arguments": {"kinds": ["gas", "fire"]}}] One moment."#;
        let parsed = parse_tool_call(response).expect("tool call");
        assert_eq!(parsed.name, "send_alert");
        assert_eq!(parsed.arguments["kinds"][1], "fire");
        assert_eq!(parsed.text_after, "One moment.");
    }

    #[test]
    fn test_parse_tool_call_no_tool() {
        assert!(parse_tool_call("Hello! What's going on with your system?").is_none());
        assert!(parse_tool_call("[TOOL_CALL: not json]").is_none());
    }

    #[test]
    fn test_parse_generation_strips_markup() {
        let raw = r#"Great, you're all set! [STATE: Confirm] [TOOL_CALL: {"name": "bookService"}]"#;
        let parsed = parse_generation(raw);
        assert_eq!(parsed.text, "Great, you're all set!");
        assert_eq!(parsed.claimed_state.as_deref(), Some("confirm"));
        assert_eq!(parsed.tool_call.map(|t| t.name).as_deref(), Some("bookService"));
    }

    #[test]
    fn test_parse_generation_plain_text() {
        let parsed = parse_generation("  What's the   address there? ");
        assert_eq!(parsed.text, "What's the address there?");
        assert!(!parsed.has_control_markup());
    }

    #[test]
    fn test_build_with_limit_keeps_system_and_recent() {
        let history: Vec<Message> = (0..20)
            .map(|i| Message::user(format!("caller line number {} with some padding text", i)))
            .collect();
        let messages = PromptBuilder::new()
            .system_prompt("Comfort Air", "Sam")
            .with_history(&history)
            .build_with_limit(200);

        assert_eq!(messages[0].role, Role::System);
        assert!(messages.len() < 21);
        assert!(messages
            .last()
            .unwrap()
            .content
            .contains("caller line number 19"));
    }

    #[test]
    fn test_state_guidance_lists_intents() {
        let messages = PromptBuilder::new()
            .with_state_guidance("discovery", "Find out what is wrong.", &["describe the problem"])
            .build();
        assert!(messages[0].content.contains("describe the problem"));
    }
}
