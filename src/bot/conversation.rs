use crate::models::chat::{ HistoryTurn, Message };

/// Lays out a model conversation: optional system prompt, each earlier
/// turn as a user/assistant pair, then the new user message. History is
/// never truncated.
pub fn build_messages(
    message: &str,
    history: &[HistoryTurn],
    system_prompt: Option<&str>
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        messages.push(Message::system(prompt));
    }
    for turn in history {
        messages.push(Message::user(turn.query.as_str()));
        messages.push(Message::assistant(turn.response.as_str()));
    }
    messages.push(Message::user(message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn history(n: usize) -> Vec<HistoryTurn> {
        (0..n).map(|i| HistoryTurn::new(format!("q{i}"), format!("a{i}"))).collect()
    }

    #[test]
    fn without_system_prompt() {
        for n in 0..4 {
            let messages = build_messages("now", &history(n), None);
            assert_eq!(messages.len(), 2 * n + 1);
            assert_eq!(messages[0].role, Role::User);
        }
    }

    #[test]
    fn with_system_prompt_first() {
        for n in 0..4 {
            let messages = build_messages("now", &history(n), Some("be brief"));
            assert_eq!(messages.len(), 2 * n + 2);
            assert_eq!(messages[0], Message::system("be brief"));
        }
    }

    #[test]
    fn empty_system_prompt_is_ignored() {
        let messages = build_messages("now", &[], Some(""));
        assert_eq!(messages, vec![Message::user("now")]);
    }

    #[test]
    fn turns_alternate_and_end_on_new_message() {
        let messages = build_messages("now", &history(2), Some("sys"));
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[1].content, "q0");
        assert_eq!(messages[4].content, "a1");
        assert_eq!(messages.last().unwrap().content, "now");
    }
}
