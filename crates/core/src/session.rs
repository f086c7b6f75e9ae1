use crate::models::{AnswerKind, RetrievalResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub kind: AnswerKind,
    pub asked_at: DateTime<Utc>,
}

/// Chat history owned by the caller and lent to the pipeline per question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question: &str, response: &RetrievalResponse) {
        self.turns.push(ChatTurn {
            question: question.to_string(),
            answer: response.answer.clone(),
            kind: response.kind,
            asked_at: Utc::now(),
        });
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_are_recorded_in_order_and_cleared() {
        let mut session = ChatSession::new();
        session.record(
            "first",
            &RetrievalResponse::without_sources("one", AnswerKind::Answered),
        );
        session.record(
            "second",
            &RetrievalResponse::without_sources("two", AnswerKind::NoRelevantContent),
        );

        assert_eq!(session.len(), 2);
        assert_eq!(session.history()[0].question, "first");
        assert_eq!(session.last().map(|turn| turn.kind), Some(AnswerKind::NoRelevantContent));

        session.clear();
        assert!(session.is_empty());
    }
}
