//! Reply extraction from a streamed agent run.
//!
//! Every `agent` step is rendered as `Agent:<content>\n` and concatenated.
//! The reply is whatever follows the second marker, so a run with a single
//! agent step yields no reply.

use moverelay_core::agent::AgentChunk;

pub const AGENT_MARKER: &str = "Agent:";

/// Collects the text of `agent` steps; `tools` steps are skipped.
#[derive(Debug, Default, Clone)]
pub struct ReplyAccumulator {
    text: String,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &AgentChunk) {
        if let AgentChunk::Agent { messages } = chunk {
            let content = messages.first().map(|m| m.content.as_str()).unwrap_or("");
            self.text.push_str(AGENT_MARKER);
            self.text.push_str(content);
            self.text.push('\n');
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The reply to send, or `None` if the run never produced a second
    /// agent step.
    pub fn reply(&self) -> Option<String> {
        extract_reply(&self.text)
    }
}

/// Trimmed text after the second [`AGENT_MARKER`]; `None` when empty.
pub fn extract_reply(accumulated: &str) -> Option<String> {
    let reply = substring_after_nth(accumulated, AGENT_MARKER, 2).trim();
    (!reply.is_empty()).then(|| reply.to_string())
}

/// Text after the `n`-th occurrence of `delimiter`. Each search resumes one
/// character past the previous match, so occurrences may overlap. Returns
/// `""` if there are fewer than `n` occurrences.
pub fn substring_after_nth<'a>(text: &'a str, delimiter: &str, n: usize) -> &'a str {
    if n == 0 {
        return text;
    }

    let mut pos: Option<usize> = None;
    for _ in 0..n {
        let start = match pos {
            None => 0,
            Some(p) => p + text[p..].chars().next().map_or(1, char::len_utf8),
        };
        if start > text.len() {
            return "";
        }
        match text[start..].find(delimiter) {
            Some(offset) => pos = Some(start + offset),
            None => return "",
        }
    }

    match pos {
        Some(p) => &text[p + delimiter.len()..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moverelay_core::message::Message;

    #[test]
    fn second_marker_wins() {
        assert_eq!(
            extract_reply("Agent:first\nAgent:second reply\n").as_deref(),
            Some("second reply")
        );
    }

    #[test]
    fn fewer_than_two_markers_is_none() {
        assert_eq!(extract_reply("Agent:only one\n"), None);
        assert_eq!(extract_reply(""), None);
        assert_eq!(extract_reply("no markers at all"), None);
    }

    #[test]
    fn everything_after_second_marker_is_kept() {
        assert_eq!(
            extract_reply("Agent:\nAgent:done\nAgent:extra\n").as_deref(),
            Some("done\nAgent:extra")
        );
    }

    #[test]
    fn blank_second_step_is_none() {
        assert_eq!(extract_reply("Agent:x\nAgent:   \n"), None);
    }

    #[test]
    fn substring_after_nth_basics() {
        assert_eq!(substring_after_nth("a,b,c", ",", 1), "b,c");
        assert_eq!(substring_after_nth("a,b,c", ",", 2), "c");
        assert_eq!(substring_after_nth("a,b,c", ",", 3), "");
        assert_eq!(substring_after_nth("abc", ",", 0), "abc");
    }

    #[test]
    fn overlapping_occurrences_are_found() {
        assert_eq!(substring_after_nth("aaa", "aa", 2), "");
        assert_eq!(substring_after_nth("aaaa", "aa", 2), "a");
    }

    #[test]
    fn multibyte_text_is_safe() {
        assert_eq!(substring_after_nth("é|ü|ö", "|", 2), "ö");
        assert_eq!(
            extract_reply("Agent:héllo\nAgent:ünïcode ✓\n").as_deref(),
            Some("ünïcode ✓")
        );
    }

    #[test]
    fn accumulator_skips_tool_steps() {
        let mut acc = ReplyAccumulator::new();
        acc.push(&AgentChunk::Agent {
            messages: vec![Message::assistant("")],
        });
        acc.push(&AgentChunk::Tools {
            messages: vec![Message::tool_result("call_1", r#"{"status":"success"}"#)],
        });
        acc.push(&AgentChunk::Agent {
            messages: vec![Message::assistant("Withdrew 1 APT.")],
        });

        assert_eq!(acc.text(), "Agent:\nAgent:Withdrew 1 APT.\n");
        assert_eq!(acc.reply().as_deref(), Some("Withdrew 1 APT."));
    }

    #[test]
    fn single_step_run_has_no_reply() {
        let mut acc = ReplyAccumulator::new();
        acc.push(&AgentChunk::Agent {
            messages: vec![Message::assistant("Hello there")],
        });
        assert_eq!(acc.reply(), None);
    }
}
