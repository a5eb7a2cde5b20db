use super::ChatMessage;

pub const SQL_SYSTEM_PROMPT: &str = "You are a professional SQL generation assistant. Follow these rules strictly: \
1. Return only the SQL statement, with no explanation; \
2. If the question does not match the schema, return a syntactically valid query that returns no rows; \
3. Do not use markdown; \
4. Make sure the SQL is syntactically correct.";

pub const NARRATION_SYSTEM_PROMPT: &str =
    "You are a data analyst. Answer in the same language as the user's question.";

pub const GENERAL_QA_SYSTEM_PROMPT: &str =
    "You are a professional and friendly AI assistant. Answer the user's question clearly.";

pub const WEATHER_SYSTEM_PROMPT: &str =
    "You are a weather analyst. Answer the user's question using the weather data provided.";

pub fn sql_prompt(question: &str, schema: &str) -> String {
    format!(
        "You are a professional SQL generation assistant. Given the user's question and the database schema, \
write an accurate SQL query.\n\n\
Database schema:\n{schema}\n\n\
User question: {question}\n\n\
Important: return only the SQL statement, without explanations, comments or any other text. \
If the question does not match the schema, return a syntactically valid query that returns no rows.\n\n\
SQL:"
    )
}

/// Prompt for an expert bound to one database.
pub fn expert_sql_prompt(database_name: &str, question: &str, schema: &str) -> String {
    format!(
        "You are a SQL generation assistant dedicated to the {database_name} database.\n\n\
Database schema:\n{schema}\n\n\
User question: {question}\n\n\
Write an accurate SQL query for the question. Only query tables of {database_name}. \
Return only the SQL statement, without any explanation.\n\n\
SQL:"
    )
}

pub fn narration_prompt(question: &str, result_text: &str) -> String {
    format!(
        "You are a data analyst. Using the user's original question and the SQL query result, write a clear \
natural-language answer.\n\n\
User question: {question}\n\n\
Query result: {result_text}\n\n\
Write a concise, professional answer that responds directly to the question. If the result is empty, \
say that no matching data was found.\n\n\
Answer:"
    )
}

pub fn sql_messages(question: &str, schema: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SQL_SYSTEM_PROMPT),
        ChatMessage::user(sql_prompt(question, schema)),
    ]
}

pub fn narration_messages(question: &str, result_text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(NARRATION_SYSTEM_PROMPT),
        ChatMessage::user(narration_prompt(question, result_text)),
    ]
}

pub fn general_qa_messages(question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(GENERAL_QA_SYSTEM_PROMPT),
        ChatMessage::user(question),
    ]
}

pub fn weather_messages(question: &str, weather_summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(WEATHER_SYSTEM_PROMPT),
        ChatMessage::user(format!("{question}\n\n{weather_summary}")),
    ]
}

/// Flattens chat messages for completion-style endpoints.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!("<|im_start|>{}\n{}<|im_end|>\n", message.role, message.content));
    }
    out.push_str("<|im_start|>assistant\n");
    out
}
