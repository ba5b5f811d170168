//! MIME assembly using lettre's message builder

use super::provider::{OutboundMessage, TransportError};
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

fn parse_mailbox(email: &str, name: Option<&str>) -> Result<Mailbox, TransportError> {
    let mailbox = match name {
        Some(name) => format!("{} <{}>", name, email),
        None => email.to_string(),
    };

    mailbox
        .parse()
        .map_err(|e| TransportError::InvalidMessage(format!("invalid address {}: {}", email, e)))
}

/// Build the raw RFC 5322 message bytes for one recipient
pub fn build_mime(
    from_email: &str,
    from_name: Option<&str>,
    message: &OutboundMessage,
) -> Result<Vec<u8>, TransportError> {
    let from = parse_mailbox(from_email, from_name)?;
    let to = parse_mailbox(&message.to_email, message.to_name.as_deref())?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(&message.subject);

    let html_part = SinglePart::builder()
        .header(ContentType::TEXT_HTML)
        .body(message.html_body.clone());

    let email = if let Some(attachment) = &message.attachment {
        let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
            TransportError::InvalidMessage(format!(
                "invalid attachment content type {}: {}",
                attachment.content_type, e
            ))
        })?;

        let attachment_part =
            Attachment::new(attachment.filename.clone()).body(attachment.bytes.clone(), content_type);

        builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(html_part)
                    .singlepart(attachment_part),
            )
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?
    } else {
        builder
            .multipart(MultiPart::mixed().singlepart(html_part))
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?
    };

    Ok(email.formatted())
}
