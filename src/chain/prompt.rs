//! Prompt templates for the conversational chain.

use crate::llm::ChatMessage;

use super::retriever::Document;

const CONDENSE_INSTRUCTIONS: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question that can be understood without \
the conversation. Reply with the standalone question only.";

const ANSWER_INSTRUCTIONS: &str = "You are a helpful AI assistant. Answer the user's question \
using the context below. If the context does not contain the answer, say that you don't know \
instead of making something up. Keep the answer concise.";

/// Placeholder used when retrieval found nothing.
pub const NO_CONTEXT: &str = "No relevant documents were found.";

/// Messages asking the model to rewrite a follow-up as a standalone question.
pub fn condense_question(history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let transcript = history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        ChatMessage::system(CONDENSE_INSTRUCTIONS),
        ChatMessage::user(format!(
            "Chat history:\n{}\n\nFollow up question: {}\n\nStandalone question:",
            transcript, question
        )),
    ]
}

/// Render retrieved documents into a context block.
pub fn format_context(documents: &[Document]) -> String {
    if documents.is_empty() {
        return NO_CONTEXT.to_string();
    }

    documents
        .iter()
        .map(|d| match &d.source {
            Some(source) => format!("[{}]\n{}", source, d.content.trim()),
            None => d.content.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Messages asking the model to answer from the retrieved context.
pub fn answer(documents: &[Document], history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\nContext:\n{}",
        ANSWER_INSTRUCTIONS,
        format_context(documents)
    )));
    messages.extend(
        history
            .iter()
            .filter(|m| m.role != crate::llm::Role::System)
            .cloned(),
    );
    messages.push(ChatMessage::user(question));
    messages
}
