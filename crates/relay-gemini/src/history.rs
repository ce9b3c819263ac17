//! Replay of persisted exchanges as chat turns.

use crate::types::Content;

/// One stored exchange: a user prompt and the model's reply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub model: String,
}

impl Exchange {
    pub fn new(user: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            model: model.into(),
        }
    }
}

/// Flatten `exchanges` into alternating user/model turns, oldest first.
pub fn assemble_history(exchanges: &[Exchange]) -> Vec<Content> {
    exchanges
        .iter()
        .flat_map(|e| [Content::user_text(e.user.as_str()), Content::model_text(e.model.as_str())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn empty_history_has_no_turns() {
        assert!(assemble_history(&[]).is_empty());
    }

    #[test]
    fn turns_alternate_starting_with_user() {
        for n in 1..=6 {
            let exchanges: Vec<_> = (0..n)
                .map(|i| Exchange::new(format!("q{i}"), format!("a{i}")))
                .collect();
            let turns = assemble_history(&exchanges);

            assert_eq!(turns.len(), 2 * n);
            for (i, turn) in turns.iter().enumerate() {
                let expected = if i % 2 == 0 { Role::User } else { Role::Model };
                assert_eq!(turn.role, Some(expected));
            }
        }
    }

    #[test]
    fn each_reply_follows_its_prompt() {
        let turns = assemble_history(&[Exchange::new("hi", "hello"), Exchange::new("again", "sure")]);
        let texts: Vec<_> = turns.iter().filter_map(Content::text).collect();
        assert_eq!(texts, ["hi", "hello", "again", "sure"]);
    }
}
