use crate::config::types::EmailConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Local};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("could not connect to mail relay {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mail relay I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mail relay timed out during {0}")]
    Timeout(&'static str),

    #[error("mail relay closed the connection during {0}")]
    Closed(&'static str),

    #[error("malformed reply during {stage}: '{line}'")]
    Malformed { stage: &'static str, line: String },

    #[error("mail relay rejected {stage} with {code}: {message}")]
    Rejected {
        stage: &'static str,
        code: u16,
        message: String,
    },

    #[error("no recipients configured")]
    NoRecipients,
}

/// Delivers HTML notifications to operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_html(&self, subject: &str, html: &str) -> Result<(), NotifyError>;
}

/// Plain SMTP client for an internal relay (no auth, no TLS).
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn full_subject(&self, subject: &str) -> String {
        if self.config.subject_prefix.is_empty() {
            subject.to_string()
        } else {
            format!("{} {}", self.config.subject_prefix, subject)
        }
    }

    async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
        let config = &self.config;
        let addr = format!("{}:{}", config.smtp_host, config.smtp_port);

        let stream = tokio::time::timeout(config.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| NotifyError::Timeout("connect"))?
            .map_err(|source| NotifyError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let mut session = SmtpSession::new(stream, config.timeout);
        session.expect("greeting", &[220]).await?;

        let local = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        session.send_line(&format!("EHLO {local}"), "EHLO").await?;
        let (code, _) = session.read_reply("EHLO").await?;
        if code != 250 {
            session.command(&format!("HELO {local}"), "HELO", &[250]).await?;
        }

        session
            .command(&format!("MAIL FROM:<{}>", config.from_address), "MAIL FROM", &[250])
            .await?;
        for recipient in &config.recipients {
            session
                .command(&format!("RCPT TO:<{recipient}>"), "RCPT TO", &[250, 251])
                .await?;
        }
        session.command("DATA", "DATA", &[354]).await?;
        session.send_raw(&encode_data(message), "message body").await?;
        session.expect("message body", &[250]).await?;

        // The message is accepted at this point.
        if let Err(e) = session.command("QUIT", "QUIT", &[221]).await {
            tracing::debug!(error = %e, "QUIT not acknowledged");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_html(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        if self.config.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let subject = self.full_subject(subject);
        let message = build_message(&self.config, &subject, html, Local::now());
        self.deliver(&message).await?;

        tracing::info!(subject = %subject, recipients = self.config.recipients.len(), "Email sent");
        Ok(())
    }
}

struct SmtpSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl SmtpSession {
    fn new(stream: TcpStream, timeout: Duration) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
            timeout,
        }
    }

    async fn send_raw(&mut self, data: &str, stage: &'static str) -> Result<(), NotifyError> {
        tokio::time::timeout(self.timeout, self.writer.write_all(data.as_bytes()))
            .await
            .map_err(|_| NotifyError::Timeout(stage))??;
        Ok(())
    }

    async fn send_line(&mut self, line: &str, stage: &'static str) -> Result<(), NotifyError> {
        self.send_raw(&format!("{line}\r\n"), stage).await
    }

    async fn command(
        &mut self,
        line: &str,
        stage: &'static str,
        accepted: &[u16],
    ) -> Result<(), NotifyError> {
        self.send_line(line, stage).await?;
        self.expect(stage, accepted).await
    }

    async fn expect(&mut self, stage: &'static str, accepted: &[u16]) -> Result<(), NotifyError> {
        let (code, message) = self.read_reply(stage).await?;
        if accepted.contains(&code) {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                stage,
                code,
                message,
            })
        }
    }

    /// Reads one possibly multi-line reply (`250-...` continues, `250 ...` ends).
    async fn read_reply(&mut self, stage: &'static str) -> Result<(u16, String), NotifyError> {
        let mut message = String::new();
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(self.timeout, self.reader.read_line(&mut line))
                .await
                .map_err(|_| NotifyError::Timeout(stage))??;
            if read == 0 {
                return Err(NotifyError::Closed(stage));
            }

            let line = line.trim_end();
            let code = line
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| NotifyError::Malformed {
                    stage,
                    line: line.to_string(),
                })?;

            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(line.get(4..).unwrap_or_default());

            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok((code, message));
            }
        }
    }
}

/// RFC 5322 message with an HTML body. The result is 7-bit clean: the body is
/// base64 and a non-ASCII subject is RFC 2047 encoded.
pub fn build_message(config: &EmailConfig, subject: &str, html: &str, date: DateTime<Local>) -> String {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Date: {date}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         {body}",
        from = config.from_address,
        to = config.recipients.join(", "),
        date = date.to_rfc2822(),
        subject = encode_header(subject),
        body = encode_body(html),
    )
}

fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    format!("=?utf-8?B?{}?=", BASE64_STANDARD.encode(value))
}

/// Base64 in lines of at most 76 characters.
fn encode_body(html: &str) -> String {
    let encoded = BASE64_STANDARD.encode(html);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 38 + 2);
    for line in encoded.as_bytes().chunks(76) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    out
}

/// CRLF-normalizes and dot-stuffs a message for the DATA phase, adding the
/// terminating `.` line.
fn encode_data(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 16);
    for line in message.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Minimal relay that accepts one message and hands back the DATA lines
    /// and the recipients it saw.
    async fn fake_relay() -> (u16, oneshot::Receiver<(Vec<String>, Vec<String>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(b"220 relay ESMTP\r\n").await.unwrap();

            let mut recipients = Vec::new();
            let mut data = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                let command = line.trim_end().to_string();
                if command.starts_with("EHLO") {
                    write.write_all(b"250-relay\r\n250 SIZE 1000000\r\n").await.unwrap();
                } else if let Some(rcpt) = command.strip_prefix("RCPT TO:") {
                    recipients.push(rcpt.to_string());
                    write.write_all(b"250 OK\r\n").await.unwrap();
                } else if command == "DATA" {
                    write.write_all(b"354 go ahead\r\n").await.unwrap();
                    loop {
                        let mut body = String::new();
                        reader.read_line(&mut body).await.unwrap();
                        let body = body.trim_end_matches("\r\n").to_string();
                        if body == "." {
                            break;
                        }
                        data.push(body);
                    }
                    write.write_all(b"250 queued\r\n").await.unwrap();
                } else if command == "QUIT" {
                    write.write_all(b"221 bye\r\n").await.unwrap();
                    break;
                } else {
                    write.write_all(b"250 OK\r\n").await.unwrap();
                }
            }
            let _ = tx.send((data, recipients));
        });

        (port, rx)
    }

    fn email_config(port: u16) -> EmailConfig {
        EmailConfig {
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: port,
            from_address: "monitor@example.com".to_string(),
            recipients: vec!["ops@example.com".to_string(), "dev@example.com".to_string()],
            subject_prefix: "[Log Monitor]".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_send_html_through_relay() {
        let (port, rx) = fake_relay().await;
        let notifier = SmtpNotifier::new(email_config(port));

        notifier
            .send_html("RECOVERY: 1 server(s) active again", "<p>hi</p>\n.hidden")
            .await
            .unwrap();

        let (data, recipients) = rx.await.unwrap();
        assert_eq!(recipients, vec!["<ops@example.com>", "<dev@example.com>"]);
        assert!(data.contains(&"From: monitor@example.com".to_string()));
        assert!(data.contains(&"To: ops@example.com, dev@example.com".to_string()));
        assert!(data.contains(
            &"Subject: [Log Monitor] RECOVERY: 1 server(s) active again".to_string()
        ));
        assert!(data.iter().any(|l| l.starts_with("Date: ")));
        assert!(data.contains(&"Content-Type: text/html; charset=utf-8".to_string()));
        assert!(data.contains(&"Content-Transfer-Encoding: base64".to_string()));

        let blank = data.iter().position(String::is_empty).unwrap();
        let body = BASE64_STANDARD
            .decode(data[blank + 1..].concat())
            .unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "<p>hi</p>\n.hidden");
    }

    #[test]
    fn test_message_is_seven_bit_clean() {
        let date = Local::now();
        let html = format!("<p>{}</p>", "Zürich ✓ ".repeat(20));
        let message = build_message(&email_config(25), "Störung – 10.0.0.1", &html, date);

        assert!(message.is_ascii());
        assert!(message.contains("Subject: =?utf-8?B?"));
        assert!(message.lines().all(|line| line.trim_end().len() <= 998));

        let (_, body) = message.split_once("\r\n\r\n").unwrap();
        assert!(body.lines().all(|line| line.len() <= 76));
        let decoded = BASE64_STANDARD.decode(body.replace("\r\n", "")).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), html);
    }

    #[test]
    fn test_ascii_subject_is_left_readable() {
        assert_eq!(encode_header("ALERT: 1 server(s)"), "ALERT: 1 server(s)");
        assert_eq!(encode_header("Störung"), "=?utf-8?B?U3TDtnJ1bmc=?=");
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let notifier = SmtpNotifier::new(email_config(port));
        let err = notifier.send_html("x", "y").await.unwrap_err();
        assert!(matches!(err, NotifyError::Connect { .. } | NotifyError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_no_recipients() {
        let mut config = email_config(25);
        config.recipients.clear();
        let err = SmtpNotifier::new(config).send_html("x", "y").await.unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }

    #[test]
    fn test_encode_data_dot_stuffs_and_terminates() {
        assert_eq!(encode_data("a\n.b\r\nc"), "a\r\n..b\r\nc\r\n.\r\n");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
