use comrak::plugins::syntect::SyntectAdapter;
use comrak::{ComrakOptions, ComrakPlugins, markdown_to_html_with_plugins};
use once_cell::sync::Lazy;
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

use crate::conversation::{Conversation, Message};
use crate::segments::{Segment, SegmentKind};
use crate::types::Role;

const HIGHLIGHT_THEME: &str = "base16-ocean.dark";

static MARKDOWN_OPTIONS: Lazy<ComrakOptions> = Lazy::new(|| {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options
});

const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour repr:12 padding:zero]:[minute padding:zero] [period case:upper]");

pub fn markdown_to_html(md: &str) -> String {
    let adapter = SyntectAdapter::new(Some(HIGHLIGHT_THEME));
    let mut plugins = ComrakPlugins::default();
    plugins.render.codefence_syntax_highlighter = Some(&adapter);
    markdown_to_html_with_plugins(md, &MARKDOWN_OPTIONS, &plugins)
}

/// `840 ms`, `1.2s`, `12s`.
pub fn format_latency(ms: f64) -> String {
    let secs = ms / 1000.0;
    if secs >= 10.0 {
        format!("{secs:.0}s")
    } else if secs >= 1.0 {
        format!("{secs:.1}s")
    } else {
        format!("{ms:.0} ms")
    }
}

pub fn format_message_timestamp(timestamp: OffsetDateTime) -> Option<String> {
    let mut datetime = timestamp;
    if let Ok(offset) = UtcOffset::current_local_offset() {
        datetime = datetime.to_offset(offset);
    }
    datetime.format(MESSAGE_TIME_FORMAT).ok()
}

pub fn segment_to_html(segment: &Segment) -> String {
    match segment.kind {
        SegmentKind::Prose => markdown_to_html(&segment.text),
        SegmentKind::Code => {
            let fenced = format!(
                "```{}\n{}\n```\n",
                segment.language.as_deref().unwrap_or(""),
                segment.text
            );
            let mut html = String::from("<div class=\"code-block\">");
            html.push_str(&markdown_to_html(&fenced));
            if let Some(ms) = segment.inference_time_ms {
                html.push_str(&format!(
                    "<div class=\"inference-time\">generated in {}</div>",
                    format_latency(ms)
                ));
            }
            html.push_str("</div>");
            html
        }
    }
}

pub fn message_to_html(message: &Message) -> String {
    let role = message.role.as_str();
    let mut html = format!("<div class=\"message-row {role}\">");

    if message.pending {
        html.push_str(
            "<div class=\"shimmer-line\"><span class=\"shimmer-text\">Processing…</span></div>",
        );
    } else {
        html.push_str(&format!("<div class=\"bubble {role}\">"));
        match message.role {
            Role::Assistant => {
                for segment in message.segments() {
                    html.push_str(&segment_to_html(&segment));
                }
            }
            Role::User => html.push_str(&escape_html(&message.content)),
        }
        html.push_str("</div>");
    }

    if let Some(ts) = format_message_timestamp(message.timestamp) {
        html.push_str(&format!(
            "<div class=\"message-meta\"><span class=\"message-timestamp\">{ts}</span></div>"
        ));
    }
    html.push_str("</div>");
    html
}

/// Standalone HTML page for the whole conversation.
pub fn transcript_html(conversation: &Conversation) -> String {
    let mut body = String::new();
    for message in conversation.messages() {
        body.push_str(&message_to_html(message));
        body.push('\n');
    }
    if let Some(banner) = conversation.banner() {
        body.push_str(&format!(
            "<div class=\"error-banner\">{}</div>\n",
            escape_html(banner)
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>codechat transcript</title></head>\n<body>\n<div class=\"chat-list\">\n{body}</div>\n</body>\n</html>\n"
    )
}

/// Plain-text rendering for the terminal front end.
pub fn message_to_text(message: &Message) -> String {
    if message.pending {
        return "Processing…".to_string();
    }
    let mut out = String::new();
    for segment in message.segments() {
        if !out.is_empty() {
            out.push('\n');
        }
        match segment.kind {
            SegmentKind::Prose => out.push_str(&segment.text),
            SegmentKind::Code => {
                let lang = segment.language.as_deref().unwrap_or("code");
                out.push_str(&format!("--- {lang} ---\n{}\n---", segment.text));
                if let Some(ms) = segment.inference_time_ms {
                    out.push_str(&format!(" generated in {}", format_latency(ms)));
                }
            }
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
