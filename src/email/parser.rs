use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail, addrparse_header};
use serde::Serialize;
use thiserror::Error;

use crate::normalizer::{NormalizedContent, first_non_empty, normalize};

#[derive(Error, Debug)]
pub enum EmailParseError {
    #[error("malformed message: {0}")]
    Malformed(#[from] mailparse::MailParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    pub address: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().trim().to_string(),
            name: None,
        }
    }

    pub fn local_part(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.address)
    }

    pub fn domain(&self) -> Option<&str> {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim())
            .filter(|domain| !domain.is_empty())
    }
}

/// One inbound message, flattened to what validation and storage need.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub from: Vec<Mailbox>,
    pub to: Vec<Mailbox>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    /// Filenames of parts marked as attachments.
    pub attachments: Vec<String>,
    pub message_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub content: NormalizedContent,
}

impl ParsedEmail {
    pub fn sender(&self) -> Option<&Mailbox> {
        self.from.first()
    }

    /// The body that was normalized: HTML when present, else plain text.
    pub fn raw_body(&self) -> &str {
        first_non_empty([self.html.as_deref(), self.text.as_deref()]).unwrap_or("")
    }
}

/// Parse a raw RFC 822 message.
pub fn parse_raw_email(raw: &[u8]) -> Result<ParsedEmail, EmailParseError> {
    let mail = mailparse::parse_mail(raw)?;

    let from = mailboxes(&mail, "From");
    let to = ["To", "Cc", "Delivered-To"]
        .iter()
        .flat_map(|header| mailboxes(&mail, header))
        .collect();
    let subject = mail
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let message_id = mail
        .headers
        .get_first_value("Message-ID")
        .map(|id| id.trim().trim_matches(['<', '>']).to_string())
        .filter(|id| !id.is_empty());
    let date = mail
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0));

    let mut bodies = Bodies::default();
    bodies.collect(&mail);

    let body = first_non_empty([bodies.html.as_deref(), bodies.text.as_deref()]).unwrap_or("");
    let content = normalize(&subject, body);

    Ok(ParsedEmail {
        from,
        to,
        subject,
        html: bodies.html,
        text: bodies.text,
        attachments: bodies.attachments,
        message_id,
        date,
        content,
    })
}

fn mailboxes(mail: &ParsedMail, header: &str) -> Vec<Mailbox> {
    let Some(header) = mail.headers.get_first_header(header) else {
        return Vec::new();
    };
    let Ok(list) = addrparse_header(header) else {
        // Fall back to the raw value so a sloppy header still yields an address
        let value = header.get_value();
        return value
            .split(',')
            .map(str::trim)
            .filter(|v| v.contains('@'))
            .map(|v| Mailbox::new(v.trim_matches(['<', '>'])))
            .collect();
    };

    let mut out = Vec::new();
    for addr in list.iter() {
        match addr {
            MailAddr::Single(info) => out.push(Mailbox {
                address: info.addr.trim().to_string(),
                name: info.display_name.clone(),
            }),
            MailAddr::Group(group) => out.extend(group.addrs.iter().map(|info| Mailbox {
                address: info.addr.trim().to_string(),
                name: info.display_name.clone(),
            })),
        }
    }
    out
}

#[derive(Default)]
struct Bodies {
    html: Option<String>,
    text: Option<String>,
    attachments: Vec<String>,
}

impl Bodies {
    /// Depth-first walk; the first HTML and first plain-text leaf win.
    fn collect(&mut self, part: &ParsedMail) {
        let disposition = part.get_content_disposition();
        if matches!(disposition.disposition, DispositionType::Attachment) {
            let name = disposition
                .params
                .get("filename")
                .or_else(|| part.ctype.params.get("name"))
                .cloned()
                .unwrap_or_else(|| "unnamed".to_string());
            self.attachments.push(name);
            return;
        }

        if !part.subparts.is_empty() {
            for sub in &part.subparts {
                self.collect(sub);
            }
            return;
        }

        let mime = part.ctype.mimetype.to_ascii_lowercase();
        let slot = match mime.as_str() {
            "text/html" => &mut self.html,
            "text/plain" => &mut self.text,
            _ => return,
        };
        if slot.is_none()
            && let Ok(body) = part.get_body()
            && !body.trim().is_empty()
        {
            *slot = Some(body);
        }
    }
}
