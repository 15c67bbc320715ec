use super::llm::ChatMessage;

/// Fixed instruction sent ahead of the retrieved context, byte for byte as
/// deployed (note the joined "context Format" and "SeverityDont").
pub const REMEDY_SYSTEM_PROMPT: &str = concat!(
    "You are a medical assistant. ",
    "Answer ONLY using the medical context provided. ",
    "If the context does not contain the answer, say ",
    "'This answer is based on general medical knowledge, not the database.' ",
    "Use simple language for patients. Add simple language so that even a small kid could understand along with medical context ",
    "Format strictly and only add if the condition requires to break the series as:\n",
    "1. Remedy and step wise preparation\n2. Dosage\n3. Suggestions\n4. Severity",
    "Dont add references like this [1][2]",
);

/// Reply when retrieval finds nothing for the query.
pub const NO_CONTEXT_RESPONSE: &str = "No relevant medical data found in the knowledge base.";

/// Messages for one remedy question: instructions, retrieved context, query.
pub fn build_remedy_messages(query: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(REMEDY_SYSTEM_PROMPT),
        ChatMessage::system(format!("Medical Context:\n{context}")),
        ChatMessage::user(query),
    ]
}
