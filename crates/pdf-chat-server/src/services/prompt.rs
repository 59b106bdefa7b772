use crate::document::context::truncate_chars;
use crate::models::chat::Turn;

pub const CONTEXT_START_MARKER: &str = "--- PDF CONTEXT START ---";
pub const CONTEXT_END_MARKER: &str = "--- PDF CONTEXT END ---";

/// Builds the message list sent to the model for one exchange.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    base_instruction: String,
    max_context_chars: usize,
}

impl PromptAssembler {
    pub fn new(max_context_chars: usize) -> Self {
        Self::with_instruction(Self::default_base_instruction(), max_context_chars)
    }

    pub fn with_instruction(base_instruction: String, max_context_chars: usize) -> Self {
        Self {
            base_instruction,
            max_context_chars,
        }
    }

    pub fn default_base_instruction() -> String {
        "You are a helpful assistant. Answer the user's questions using the provided PDF context when relevant. \
If the answer is in the PDF, cite the section or page briefly (e.g., 'See Page 5'). \
If the PDF lacks the answer, state that it's not explicitly covered and provide a best-effort answer from general knowledge."
            .to_string()
    }

    /// System prompt with the (capped) document between the context markers.
    pub fn system_prompt(&self, document: &str) -> String {
        format!(
            "{}\n\n{}\n{}\n{}\n",
            self.base_instruction,
            CONTEXT_START_MARKER,
            truncate_chars(document, self.max_context_chars),
            CONTEXT_END_MARKER
        )
    }

    /// `system`, then `history` in order, then the new user turn.
    pub fn build(&self, history: &[Turn], new_message: &str, document: &str) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Turn::system(self.system_prompt(document)));
        messages.extend(history.iter().cloned());
        messages.push(Turn::user(new_message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn test_build_orders_system_history_then_user() {
        let assembler = PromptAssembler::new(1_000);
        let history = vec![Turn::user("q1"), Turn::assistant("a1")];

        let messages = assembler.build(&history, "q2", "[Page 1] Ramps are available.");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(&messages[1..3], history.as_slice());
        assert_eq!(messages[3], Turn::user("q2"));
    }

    #[test]
    fn test_document_is_embedded_between_markers() {
        let assembler = PromptAssembler::new(1_000);
        let prompt = assembler.system_prompt("[Page 3] Elevators");

        let start = prompt.find(CONTEXT_START_MARKER).unwrap();
        let body = prompt.find("[Page 3] Elevators").unwrap();
        let end = prompt.find(CONTEXT_END_MARKER).unwrap();
        assert!(start < body && body < end);
        assert!(prompt.contains("See Page 5"));
        assert!(prompt.contains("not explicitly covered"));
    }

    #[test]
    fn test_long_document_is_capped_to_prefix() {
        let assembler = PromptAssembler::new(10);
        let document = "0123456789ABCDEFGHIJ";

        let messages = assembler.build(&[], "hi", document);
        let system = &messages[0].content;

        assert!(system.contains("0123456789"));
        assert!(!system.contains("ABC"));
        assert!(!system.contains(document));
    }

    #[test]
    fn test_empty_document_still_produces_markers() {
        let assembler = PromptAssembler::new(10);
        let messages = assembler.build(&[], "hi", "");

        assert!(messages[0].content.contains(CONTEXT_START_MARKER));
        assert!(messages[0].content.contains(CONTEXT_END_MARKER));
    }

    #[test]
    fn test_build_does_not_touch_history() {
        let assembler = PromptAssembler::new(10);
        let history = vec![Turn::user("keep")];
        let _ = assembler.build(&history, "next", "doc");
        assert_eq!(history, vec![Turn::user("keep")]);
    }
}
