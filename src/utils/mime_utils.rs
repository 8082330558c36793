use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub const MAX_ATTACHMENTS: usize = 10;
pub const MAX_ATTACHMENT_BYTES: i64 = 5 * 1024 * 1024;

/// One node of the Gmail payload tree. Containers carry `parts`, leaves carry
/// `body` data; attachments additionally carry a filename and attachment id.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    pub body: Option<PartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartBody {
    pub data: Option<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(rename = "attachmentId")]
    pub attachment_id: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct DecodedBodies {
    pub text: Option<String>,
    pub html: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttachmentMeta {
    pub filename: String,
    pub attachment_id: String,
    pub size: i64,
    pub too_large: bool,
}

/// Gmail body data is URL-safe base64 without guaranteed padding.
pub fn decode_base64url(data: &str) -> Option<String> {
    let cleaned = data.replace('-', "+").replace('_', "/");
    let padding_needed = cleaned.len() % 4;
    let padded = if padding_needed > 0 {
        cleaned + &"=".repeat(4 - padding_needed)
    } else {
        cleaned
    };
    let decoded = STANDARD.decode(&padded).ok()?;
    Some(String::from_utf8_lossy(&decoded).into_owned())
}

/// Walks the whole part tree and accumulates the first-class bodies. Both
/// `multipart/alternative` and `multipart/mixed` get the same treatment since
/// every child is visited. Fields stay `None` when no matching leaf exists so
/// callers can tell "empty body" from "no body of this type".
pub fn decode_bodies(payload: &MessagePart) -> DecodedBodies {
    let mut bodies = DecodedBodies::default();
    walk_bodies(payload, &mut bodies);
    bodies
}

fn walk_bodies(part: &MessagePart, bodies: &mut DecodedBodies) {
    let data = part.body.as_ref().and_then(|b| b.data.as_deref());
    if let Some(data) = data {
        if let Some(decoded) = decode_base64url(data) {
            match part.mime_type.as_deref() {
                Some("text/plain") => append(&mut bodies.text, decoded),
                Some("text/html") => append(&mut bodies.html, decoded),
                // A leaf carrying data but no declared type is treated as plain text
                None => append(&mut bodies.text, decoded),
                _ => {}
            }
        }
    }
    if let Some(children) = &part.parts {
        for child in children {
            walk_bodies(child, bodies);
        }
    }
}

fn append(slot: &mut Option<String>, decoded: String) {
    match slot {
        Some(existing) => existing.push_str(&decoded),
        None => *slot = Some(decoded),
    }
}

/// Collects attachment metadata from the part tree, capped at
/// `MAX_ATTACHMENTS`. Oversized attachments are flagged instead of fetched.
pub fn collect_attachments(payload: &MessagePart) -> Vec<AttachmentMeta> {
    let mut attachments = Vec::new();
    walk_attachments(payload, &mut attachments);
    attachments
}

fn walk_attachments(part: &MessagePart, attachments: &mut Vec<AttachmentMeta>) {
    if attachments.len() >= MAX_ATTACHMENTS {
        return;
    }
    if let (Some(filename), Some(body)) = (part.filename.as_deref(), part.body.as_ref()) {
        if !filename.is_empty() {
            if let Some(attachment_id) = &body.attachment_id {
                attachments.push(AttachmentMeta {
                    filename: filename.to_string(),
                    attachment_id: attachment_id.clone(),
                    size: body.size,
                    too_large: body.size > MAX_ATTACHMENT_BYTES,
                });
            }
        }
    }
    if let Some(children) = &part.parts {
        for child in children {
            walk_attachments(child, attachments);
        }
    }
}

static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<style[^>]*>.*?</style>").unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<script[^>]*>.*?</script>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Minimal HTML-to-text cleanup for feeding an HTML-only body to the model.
pub fn strip_html(html: &str) -> String {
    let mut text = html.replace("\r\n", "\n");
    text = STYLE_RE.replace_all(&text, "").to_string();
    text = SCRIPT_RE.replace_all(&text, "").to_string();

    for end_tag in ["</div>", "</p>", "</tr>", "</li>", "<br>", "<br/>", "<br />"] {
        text = text.replace(end_tag, "\n");
    }

    text = TAG_RE.replace_all(&text, "").to_string();

    for (entity, replacement) in [
        ("&nbsp;", " "),
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
    ] {
        text = text.replace(entity, replacement);
    }

    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn encode(content: &str) -> String {
        URL_SAFE_NO_PAD.encode(content.as_bytes())
    }

    fn leaf(mime: Option<&str>, content: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.map(str::to_string),
            filename: None,
            headers: Vec::new(),
            body: Some(PartBody {
                data: Some(encode(content)),
                size: content.len() as i64,
                attachment_id: None,
            }),
            parts: None,
        }
    }

    fn container(mime: &str, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            filename: None,
            headers: Vec::new(),
            body: None,
            parts: Some(parts),
        }
    }

    #[test]
    fn nested_alternative_yields_both_bodies() {
        let payload = container(
            "multipart/mixed",
            vec![container(
                "multipart/alternative",
                vec![
                    leaf(Some("text/plain"), "plain body"),
                    leaf(Some("text/html"), "<p>html body</p>"),
                ],
            )],
        );
        let bodies = decode_bodies(&payload);
        assert_eq!(bodies.text.as_deref(), Some("plain body"));
        assert_eq!(bodies.html.as_deref(), Some("<p>html body</p>"));
    }

    #[test]
    fn missing_bodies_stay_none_not_empty() {
        let payload = container("multipart/mixed", vec![leaf(Some("image/png"), "\x01\x02")]);
        let bodies = decode_bodies(&payload);
        assert_eq!(bodies.text, None);
        assert_eq!(bodies.html, None);
    }

    #[test]
    fn untyped_leaf_with_data_counts_as_plain_text() {
        let bodies = decode_bodies(&leaf(None, "raw content"));
        assert_eq!(bodies.text.as_deref(), Some("raw content"));
        assert_eq!(bodies.html, None);
    }

    #[test]
    fn base64url_alphabet_is_decoded() {
        // '-' and '_' stand in for '+' and '/'
        let encoded = URL_SAFE_NO_PAD.encode("subject?>~test".as_bytes());
        assert_eq!(decode_base64url(&encoded).as_deref(), Some("subject?>~test"));
    }

    #[test]
    fn attachments_capped_and_flagged_by_size() {
        let attachment = |name: &str, size: i64| MessagePart {
            mime_type: Some("application/pdf".to_string()),
            filename: Some(name.to_string()),
            headers: Vec::new(),
            body: Some(PartBody {
                data: None,
                size,
                attachment_id: Some(format!("att-{name}")),
            }),
            parts: None,
        };

        let mut parts = vec![attachment("big.pdf", MAX_ATTACHMENT_BYTES + 1)];
        for i in 0..20 {
            parts.push(attachment(&format!("doc{i}.pdf"), 1024));
        }
        let collected = collect_attachments(&container("multipart/mixed", parts));
        assert_eq!(collected.len(), MAX_ATTACHMENTS);
        assert!(collected[0].too_large);
        assert!(!collected[1].too_large);
    }

    #[test]
    fn strip_html_removes_tags_and_style() {
        let text = strip_html("<style>.a{}</style><div>Hello</div><p>World &amp; co</p>");
        assert_eq!(text, "Hello\nWorld & co");
    }
}
