//! Call transcript

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::CallState;

/// Who produced a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    Agent,
    /// Tool outcomes and escalations; never spoken
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub state: CallState,
    pub at: DateTime<Utc>,
}

/// Ordered transcript of one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>, state: CallState) {
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.into(),
            state,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Caller-attributed lines only
    pub fn caller_lines(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.speaker == Speaker::Caller)
            .map(|e| e.text.as_str())
    }

    /// Caller-attributed lines joined with newlines
    pub fn caller_text(&self) -> String {
        self.caller_lines().collect::<Vec<_>>().join("\n")
    }

    /// Most recent spoken lines (caller and agent), oldest first
    pub fn recent_spoken(&self, limit: usize) -> Vec<&TranscriptEntry> {
        let spoken: Vec<&TranscriptEntry> = self
            .entries
            .iter()
            .filter(|e| e.speaker != Speaker::System)
            .collect();
        let skip = spoken.len().saturating_sub(limit);
        spoken.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_lines_exclude_agent_text() {
        let mut t = Transcript::new();
        t.push(Speaker::Agent, "Hi, this is Maria with Comfort Air", CallState::Welcome);
        t.push(Speaker::Caller, "my AC quit", CallState::Welcome);
        t.push(Speaker::System, "lookup_caller: found=false", CallState::Lookup);
        t.push(Speaker::Caller, "I'm John", CallState::Discovery);

        let lines: Vec<_> = t.caller_lines().collect();
        assert_eq!(lines, vec!["my AC quit", "I'm John"]);
        assert_eq!(t.caller_text(), "my AC quit\nI'm John");
    }

    #[test]
    fn test_recent_spoken_keeps_tail() {
        let mut t = Transcript::new();
        for i in 0..5 {
            t.push(Speaker::Caller, format!("line {i}"), CallState::Discovery);
            t.push(Speaker::System, "noise", CallState::Discovery);
        }
        let recent = t.recent_spoken(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "line 3");
        assert_eq!(recent[1].text, "line 4");
    }
}
