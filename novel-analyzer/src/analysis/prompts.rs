//! Prompt text for the extraction backend

/// System prompt for per-chunk extraction
pub const CHUNK_SYSTEM_PROMPT: &str = "You are an assistant that analyses novel manuscripts. \
Extract well-structured information. Return concise character profiles and scene summaries \
capturing the essence of the provided text. Avoid speculation. \
Respond with a JSON object of the form \
{\"characters\": [{\"name\", \"description\"}], \"scenes\": [{\"title\", \"summary\"}]}.";

/// System prompt for merging partial analyses
pub const AGGREGATION_SYSTEM_PROMPT: &str = "You merge overlapping information across multiple \
analyses of the same story. Combine character details and scene summaries, deduplicating by \
similar names and themes. Respond with a JSON object of the form \
{\"characters\": [{\"name\", \"description\"}], \"scenes\": [{\"title\", \"summary\"}]}.";

/// User prompt carrying one chunk of manuscript text
pub fn chunk_user_prompt(chunk: &str) -> String {
    format!(
        "Analyze the following excerpt.\n\nText:\n{}\n\nRespond with JSON describing characters and scenes.",
        chunk
    )
}

/// User prompt carrying the serialized partial analyses
pub fn aggregation_user_prompt(partials_json: &str) -> String {
    format!(
        "Combine the following partial analyses into a single, non-redundant summary.\n\nPartial analyses:\n{}",
        partials_json
    )
}
