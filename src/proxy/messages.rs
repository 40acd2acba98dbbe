//! Conversation assembly.
//!
//! Builds the ordered message sequence sent to OpenRouter: optional system
//! message, the most recent history entries, then the new user message.

use super::types::ChatMessage;

/// Maximum history entries forwarded upstream; oldest are dropped first.
pub const HISTORY_CAP: usize = 50;

/// Appended to the reply when the model stopped at the token cap.
pub const TRUNCATION_WARNING: &str = "\n\n⚠️ **Внимание:** Ответ был обрезан из-за достижения \
     лимита токенов. Увеличьте значение max_tokens в настройках для получения полного ответа.";

/// Compose the system prompt from the base prompt and an optional style
/// addendum, joined by a blank line. Empty parts are skipped.
pub fn compose_system_prompt(base: &str, style: Option<&str>) -> String {
    let style = style.unwrap_or("").trim();
    match (base.is_empty(), style.is_empty()) {
        (true, true) => String::new(),
        (false, true) => base.to_string(),
        (true, false) => style.to_string(),
        (false, false) => format!("{}\n\n{}", base, style),
    }
}

/// Build the ordered message sequence: optional system message, capped
/// history (most recent [`HISTORY_CAP`] entries, order preserved), then
/// the new user message.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let tail = history.len().saturating_sub(HISTORY_CAP);
    let mut messages = Vec::with_capacity(history.len().min(HISTORY_CAP) + 2);

    if !system_prompt.is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.extend_from_slice(&history[tail..]);
    messages.push(ChatMessage::user(message));
    messages
}

/// Append the truncation warning when the finish reason indicates the
/// reply was cut off at the token cap.
pub fn apply_truncation_warning(content: &mut String, finish_reason: &str) {
    if finish_reason == "length" {
        content.push_str(TRUNCATION_WARNING);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::types::Role;

    #[test]
    fn system_prompt_joined_by_blank_line() {
        assert_eq!(
            compose_system_prompt("Base prompt.", Some("Answer tersely.")),
            "Base prompt.\n\nAnswer tersely."
        );
    }

    #[test]
    fn missing_parts_are_skipped() {
        assert_eq!(compose_system_prompt("Base.", None), "Base.");
        assert_eq!(compose_system_prompt("", Some("Style.")), "Style.");
        assert_eq!(compose_system_prompt("", None), "");
    }

    #[test]
    fn messages_ordered_system_history_user() {
        let history = vec![
            ChatMessage::user("q1"),
            ChatMessage::assistant("a1"),
        ];
        let messages = build_messages("sys", &history, "q2");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "q1");
        assert_eq!(messages[2].content, "a1");
        assert_eq!(messages[3], ChatMessage::user("q2"));
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = build_messages("", &[], "hello");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn history_capped_to_most_recent_50_in_order() {
        let history: Vec<ChatMessage> = (0..120)
            .map(|i| ChatMessage::user(format!("msg-{}", i)))
            .collect();
        let messages = build_messages("", &history, "new");

        // 50 history entries + the new message.
        assert_eq!(messages.len(), 51);
        assert_eq!(messages[0].content, "msg-70");
        assert_eq!(messages[49].content, "msg-119");
        assert_eq!(messages[50].content, "new");
    }

    #[test]
    fn history_at_exactly_cap_is_untouched() {
        let history: Vec<ChatMessage> = (0..50)
            .map(|i| ChatMessage::user(format!("msg-{}", i)))
            .collect();
        let messages = build_messages("", &history, "new");
        assert_eq!(messages.len(), 51);
        assert_eq!(messages[0].content, "msg-0");
    }

    #[test]
    fn truncation_warning_only_on_length() {
        let mut content = "partial answer".to_string();
        apply_truncation_warning(&mut content, "stop");
        assert_eq!(content, "partial answer");

        apply_truncation_warning(&mut content, "length");
        assert!(content.ends_with(TRUNCATION_WARNING));
    }
}
