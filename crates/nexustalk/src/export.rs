use chrono::DateTime;
use snafu::{ResultExt, Snafu};

use nexus_store::{
    ConversationId, ConversationRecord, MessageRole, current_unix_timestamp_seconds,
};

/// Plain-text transcript of one conversation.
pub fn export_to_text(conversation: &ConversationRecord) -> String {
    let mut output = format!("# {}\n", conversation.title);
    output.push_str(&format!(
        "Date: {}\n\n",
        format_timestamp(conversation.created_at)
    ));

    for message in &conversation.messages {
        output.push_str(&format!(
            "{}: {}\n\n",
            role_label(message.role),
            message.content
        ));
    }

    output
}

/// JSON dump of the conversation object; parses back to an equal record.
pub fn export_to_json(conversation: &ConversationRecord) -> Result<String, ExportError> {
    serde_json::to_string_pretty(conversation).context(SerializeConversationSnafu {
        stage: "export-conversation-json",
        conversation_id: conversation.id,
    })
}

/// Self-contained styled HTML document for one conversation.
pub fn export_to_html(conversation: &ConversationRecord) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <title>{title}</title>\n\
         <style>\n\
         body {{ font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }}\n\
         h1 {{ color: #333; }}\n\
         .message {{ margin-bottom: 20px; padding: 10px; border-radius: 5px; }}\n\
         .user {{ background-color: #e6f7ff; text-align: right; }}\n\
         .assistant {{ background-color: #f0f0f0; }}\n\
         .meta {{ color: #888; font-size: 12px; margin-bottom: 5px; }}\n\
         </style>\n\
         </head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <p class=\"meta\">Exported on {exported_at}</p>\n\
         <div class=\"chat\">\n",
        title = escape_html(&conversation.title),
        exported_at = format_timestamp(current_unix_timestamp_seconds()),
    );

    for message in &conversation.messages {
        let class_name = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        html.push_str(&format!(
            "<div class=\"message {class_name}\">\n\
             <div class=\"meta\">{label} - {time}</div>\n\
             <div class=\"content\">{content}</div>\n\
             </div>\n",
            label = role_label(message.role),
            time = format_time(message.created_at),
            content = escape_html(&message.content).replace('\n', "<br>"),
        ));
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// Demo share link for a conversation.
pub fn share_url(base_url: &str, conversation_id: ConversationId) -> String {
    format!(
        "{}/shared/{conversation_id}",
        base_url.trim_end_matches('/')
    )
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExportError {
    #[snafu(display("failed to serialize conversation '{conversation_id}'"))]
    SerializeConversation {
        stage: &'static str,
        conversation_id: ConversationId,
        source: serde_json::Error,
    },
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "You",
        MessageRole::Assistant => "AI Assistant",
    }
}

fn format_timestamp(unix_seconds: u64) -> String {
    DateTime::from_timestamp(unix_seconds as i64, 0)
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}

fn format_time(unix_seconds: u64) -> String {
    DateTime::from_timestamp(unix_seconds as i64, 0)
        .map(|datetime| datetime.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(character),
        }
    }
    escaped
}
