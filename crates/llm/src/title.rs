use super::generator::{
    ChatTurn, ResponseGenerator, Role, StreamRequest, collect_response,
};

/// Sampling temperature for title generation.
pub const TITLE_TEMPERATURE: f64 = 0.7;

/// Output cap for title generation.
pub const TITLE_MAX_TOKENS: u64 = 20;

const FALLBACK_TITLE: &str = "New Conversation";

/// Derives a conversation title from the user's first input: the first few
/// words, each capitalized, with an ellipsis when the input is longer.
pub fn heuristic_title(input: &str) -> String {
    let words: Vec<&str> = input.split_whitespace().collect();

    if words.len() > 2 {
        let mut title = words[..3]
            .iter()
            .map(|word| capitalize(word))
            .collect::<Vec<_>>()
            .join(" ");
        if words.len() > 3 {
            title.push_str("...");
        }
        title
    } else if !input.trim().is_empty() {
        capitalize(input.trim())
    } else {
        FALLBACK_TITLE.to_string()
    }
}

/// Asks the generator for a short descriptive title. Any failure returns
/// `None` so the caller keeps the default title.
pub async fn generate_title(
    generator: &dyn ResponseGenerator,
    user_message: &str,
    assistant_reply: &str,
) -> Option<String> {
    let prompt = format!(
        "Based on the following conversation, generate a short, descriptive title (3-5 words):\n\n\
         User: {user_message}\n\n\
         Assistant: {assistant_reply}\n\n\
         Title:"
    );

    let request = StreamRequest::new(
        generator.default_model(),
        vec![ChatTurn::new(Role::User, prompt)],
    )
    .with_temperature(TITLE_TEMPERATURE)
    .with_max_tokens(TITLE_MAX_TOKENS);

    let handle = match generator.stream_chat(request) {
        Ok(handle) => handle,
        Err(error) => {
            tracing::debug!(error = %error, "title generation failed to start");
            return None;
        }
    };

    let text = match collect_response(handle).await {
        Ok(text) => text,
        Err(error) => {
            tracing::debug!(error = %error, "title generation stream failed");
            return None;
        }
    };

    let title = strip_wrapping_quotes(text.trim());
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn capitalize(word: &str) -> String {
    let mut characters = word.chars();
    match characters.next() {
        Some(first) => first.to_uppercase().collect::<String>() + characters.as_str(),
        None => String::new(),
    }
}

fn strip_wrapping_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
