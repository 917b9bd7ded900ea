//! Prompt builders for subject extraction, chunk summaries, the merge pass, and chat.

/// Ask for the dominant topic of a text prefix.
pub(crate) fn subject_prompt(prefix: &str, language: &str) -> String {
    format!(
        "Identify the main subject of the following text. Reply in {language} with a short topic \
         label of at most ten words, without quotes or extra commentary.\n\n{prefix}"
    )
}

/// Ask for a partial summary of one chunk.
pub(crate) fn chunk_prompt(chunk: &str, index: usize, total: usize, language: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You summarize transcripts and documents accurately. Write in {language}. Keep names, \
         figures and decisions. Do not invent facts.\n\n"
    ));
    prompt.push_str(&format!(
        "Summarize part {} of {total} of the text below:\n\n",
        index + 1
    ));
    prompt.push_str(chunk);
    prompt
}

/// Ask for one coherent summary built from ordered partial summaries.
pub(crate) fn merge_prompt(partials: &[String], language: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "The following are summaries of consecutive parts of one text, in order. Combine them \
         into a single coherent summary in {language}. Remove repetition and keep the original \
         order of ideas.\n\n"
    ));
    for (index, partial) in partials.iter().enumerate() {
        prompt.push_str(&format!("Part {}:\n{}\n\n", index + 1, partial.trim()));
    }
    prompt
}

/// Answer a follow-up question from previously extracted context.
pub(crate) fn chat_prompt(question: &str, context: &str) -> String {
    format!(
        "Answer the question using only the context below. If the context does not contain the \
         answer, say so. Reply in the language of the question.\n\nContext:\n{context}\n\n\
         Question: {question}"
    )
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub(crate) fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}
