//! IMAP (TLS) inbound + SMTP outbound mail transport.
//!
//! IMAP is spoken directly over a rustls stream inside `spawn_blocking`;
//! only the handful of commands the pipeline needs are implemented.
//! Outbound mail goes through lettre.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::channels::{InboxStatus, MailTransport, OutgoingEmail, RawEmail, SendReceipt};
use crate::error::ChannelError;

const TRANSPORT_NAME: &str = "email";

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_IMAP_HOST` is not set (transport disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())?;

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }

    /// Domain part of the sender address, used for generated message ids.
    fn sender_domain(&self) -> &str {
        self.from_address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|d| !d.is_empty())
            .unwrap_or("localhost")
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// IMAP mailbox + SMTP relay.
pub struct ImapSmtpTransport {
    config: Arc<EmailConfig>,
    timeout: Duration,
}

impl ImapSmtpTransport {
    pub fn new(config: EmailConfig, timeout: Duration) -> Self {
        Self {
            config: Arc::new(config),
            timeout,
        }
    }

    /// Run a blocking mail operation with the transport timeout.
    async fn run_blocking<T, F>(&self, op: F) -> Result<T, ChannelError>
    where
        T: Send + 'static,
        F: FnOnce(&EmailConfig, Duration) -> Result<T, ChannelError> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || op(&config, timeout));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ChannelError::FetchFailed {
                name: TRANSPORT_NAME.into(),
                reason: format!("mail task panicked: {e}"),
            }),
            Err(_) => Err(ChannelError::Timeout {
                name: TRANSPORT_NAME.into(),
                timeout,
            }),
        }
    }
}

#[async_trait]
impl MailTransport for ImapSmtpTransport {
    fn name(&self) -> &str {
        TRANSPORT_NAME
    }

    async fn fetch_unseen(&self, limit: usize) -> Result<Vec<RawEmail>, ChannelError> {
        let emails = self
            .run_blocking(move |cfg, timeout| {
                fetch_unseen_imap(cfg, timeout, limit).map_err(fetch_error)
            })
            .await?;
        tracing::info!(count = emails.len(), "Fetched unseen emails");
        Ok(emails)
    }

    async fn mark_read(&self, uids: &[String]) -> Result<(), ChannelError> {
        if uids.is_empty() {
            return Ok(());
        }
        let uids = uids.to_vec();
        self.run_blocking(move |cfg, timeout| mark_seen_imap(cfg, timeout, &uids).map_err(fetch_error))
            .await
    }

    async fn send(&self, email: OutgoingEmail) -> Result<SendReceipt, ChannelError> {
        let to = email.to.clone();
        let receipt = self.run_blocking(move |cfg, timeout| send_smtp(cfg, timeout, email)).await?;
        tracing::info!(to = %to, message_id = %receipt.message_id, "Email sent");
        Ok(receipt)
    }

    async fn check_inbox(&self) -> Result<InboxStatus, ChannelError> {
        self.run_blocking(|cfg, timeout| inbox_status_imap(cfg, timeout).map_err(fetch_error))
            .await
    }

    async fn check_relay(&self) -> Result<(), ChannelError> {
        self.run_blocking(|cfg, timeout| {
            let reachable = smtp_transport(cfg, timeout)?
                .test_connection()
                .map_err(|e| send_error(format!("SMTP connection failed: {e}")))?;
            if reachable {
                Ok(())
            } else {
                Err(send_error("SMTP server did not accept the connection"))
            }
        })
        .await
    }
}

fn fetch_error(e: ImapError) -> ChannelError {
    ChannelError::FetchFailed {
        name: TRANSPORT_NAME.into(),
        reason: e.to_string(),
    }
}

fn send_error(reason: impl std::fmt::Display) -> ChannelError {
    ChannelError::SendFailed {
        name: TRANSPORT_NAME.into(),
        reason: reason.to_string(),
    }
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Build the outbound message: plain text, plus an HTML alternative when given.
fn build_message(
    config: &EmailConfig,
    email: OutgoingEmail,
    message_id: &str,
) -> Result<Message, ChannelError> {
    let from: Mailbox = config
        .from_address
        .parse()
        .map_err(|e| send_error(format!("invalid from address: {e}")))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| send_error(format!("invalid recipient '{}': {e}", email.to)))?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject)
        .message_id(Some(message_id.to_string()));

    let message = match email.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(email.text, html)),
        None => builder.header(ContentType::TEXT_PLAIN).body(email.text),
    };
    message.map_err(|e| send_error(format!("failed to build email: {e}")))
}

fn smtp_transport(config: &EmailConfig, timeout: Duration) -> Result<SmtpTransport, ChannelError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );
    // 465 is implicit TLS, everything else negotiates STARTTLS.
    let builder = if config.smtp_port == 465 {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    }
    .map_err(|e| send_error(format!("SMTP relay error: {e}")))?;

    Ok(builder
        .port(config.smtp_port)
        .credentials(creds)
        .timeout(Some(timeout))
        .build())
}

fn send_smtp(
    config: &EmailConfig,
    timeout: Duration,
    email: OutgoingEmail,
) -> Result<SendReceipt, ChannelError> {
    let message_id = format!("<{}@{}>", Uuid::new_v4(), config.sender_domain());
    let message = build_message(config, email, &message_id)?;

    smtp_transport(config, timeout)?
        .send(&message)
        .map_err(|e| send_error(format!("SMTP send failed: {e}")))?;

    Ok(SendReceipt { message_id })
}

// ── IMAP ────────────────────────────────────────────────────────────

/// Error type for IMAP operations.
type ImapError = Box<dyn std::error::Error + Send + Sync>;

/// A completed tagged command: untagged lines, literals, final status.
#[derive(Debug, Default)]
struct ImapResponse {
    lines: Vec<String>,
    /// Each literal with the line that announced it.
    literals: Vec<(String, Vec<u8>)>,
    ok: bool,
    status_line: String,
}

/// Minimal IMAP4rev1 client over any byte stream.
struct ImapSession<S> {
    stream: S,
    next_tag: u32,
}

impl<S: Read + Write> ImapSession<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            next_tag: 1,
        }
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => return Err("IMAP connection closed".into()),
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    fn greeting(&mut self) -> Result<(), ImapError> {
        let line = self.read_line()?;
        if line.starts_with("* OK") || line.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(format!("unexpected IMAP greeting: {}", line.trim_end()).into())
        }
    }

    fn command(&mut self, cmd: &str) -> Result<ImapResponse, ImapError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;
        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let mut response = ImapResponse::default();
        let tag_prefix = format!("{tag} ");
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&tag_prefix) {
                response.ok = status.starts_with("OK");
                response.status_line = status.trim_end().to_string();
                return Ok(response);
            }
            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push((line, literal));
            } else {
                response.lines.push(line);
            }
        }
    }

    /// Run a command and fail unless it completes with OK.
    fn expect_ok(&mut self, cmd: &str, what: &str) -> Result<ImapResponse, ImapError> {
        let response = self.command(cmd)?;
        if response.ok {
            Ok(response)
        } else {
            Err(format!("IMAP {what} failed: {}", response.status_line).into())
        }
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let cmd = format!("LOGIN {} {}", quote(username), quote(password));
        self.expect_ok(&cmd, "login").map(|_| ())
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            tracing::debug!("IMAP logout failed: {e}");
        }
    }
}

/// `{123}` at the end of a line announces a literal of that many bytes.
fn literal_length(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Uids from `* SEARCH` lines, numerically sorted.
fn parse_search(lines: &[String]) -> Vec<u64> {
    let mut uids: Vec<u64> = lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|t| t.parse().ok()))
        .collect();
    uids.sort_unstable();
    uids.dedup();
    uids
}

/// The `UID n` item from a FETCH response line.
fn fetch_uid(line: &str) -> Option<String> {
    let mut tokens = line.split(|c: char| c.is_whitespace() || c == '(' || c == ')');
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("UID") {
            return tokens.next().map(str::to_string);
        }
    }
    None
}

/// The newest `limit` uids, oldest first.
fn newest_window(uids: &[u64], limit: usize) -> &[u64] {
    &uids[uids.len().saturating_sub(limit)..]
}

fn connect(
    config: &EmailConfig,
    timeout: Duration,
) -> Result<ImapSession<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>, ImapError> {
    let addr = (config.imap_host.as_str(), config.imap_port)
        .to_socket_addrs()?
        .next()
        .ok_or("IMAP host did not resolve")?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;

    let mut session = ImapSession::new(rustls::StreamOwned::new(conn, tcp));
    session.greeting()?;
    session.login(&config.username, config.password.expose_secret())?;
    Ok(session)
}

/// Fetch the newest unseen messages with `BODY.PEEK[]` so the seen flag
/// is left untouched until `mark_read`.
fn fetch_unseen_imap(
    config: &EmailConfig,
    timeout: Duration,
    limit: usize,
) -> Result<Vec<RawEmail>, ImapError> {
    let mut session = connect(config, timeout)?;
    let emails = fetch_with_session(&mut session, config, limit);
    session.logout();
    emails
}

fn fetch_with_session<S: Read + Write>(
    session: &mut ImapSession<S>,
    config: &EmailConfig,
    limit: usize,
) -> Result<Vec<RawEmail>, ImapError> {
    session.expect_ok("SELECT \"INBOX\"", "select")?;
    let search = session.expect_ok("UID SEARCH UNSEEN", "search")?;
    let uids = parse_search(&search.lines);
    let window = newest_window(&uids, limit);
    if window.is_empty() {
        return Ok(Vec::new());
    }

    let set = window
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let fetched = session.expect_ok(&format!("UID FETCH {set} (UID BODY.PEEK[])"), "fetch")?;

    let parser = MessageParser::default();
    let mut emails = Vec::new();
    for (line, raw) in &fetched.literals {
        let Some(uid) = fetch_uid(line) else {
            tracing::warn!("FETCH response without UID, skipping");
            continue;
        };
        match parser.parse(raw.as_slice()) {
            Some(parsed) => emails.push(to_raw_email(&parsed, uid, config)),
            None => tracing::warn!(uid = %uid, "Unparseable message, skipping"),
        }
    }
    Ok(emails)
}

fn inbox_status_imap(config: &EmailConfig, timeout: Duration) -> Result<InboxStatus, ImapError> {
    let mut session = connect(config, timeout)?;
    let status = inbox_status_with_session(&mut session);
    session.logout();
    status
}

fn inbox_status_with_session<S: Read + Write>(
    session: &mut ImapSession<S>,
) -> Result<InboxStatus, ImapError> {
    let select = session.expect_ok("SELECT \"INBOX\"", "select")?;
    let messages = select.lines.iter().find_map(|l| exists_count(l)).unwrap_or(0);
    let search = session.expect_ok("UID SEARCH UNSEEN", "search")?;
    Ok(InboxStatus {
        messages,
        unseen: parse_search(&search.lines).len(),
    })
}

/// Message count from a `* n EXISTS` line.
fn exists_count(line: &str) -> Option<u64> {
    let (count, keyword) = line.strip_prefix("* ")?.trim_end().split_once(' ')?;
    if keyword.eq_ignore_ascii_case("EXISTS") {
        count.parse().ok()
    } else {
        None
    }
}

fn mark_seen_imap(config: &EmailConfig, timeout: Duration, uids: &[String]) -> Result<(), ImapError> {
    let mut session = connect(config, timeout)?;
    let result = mark_seen_with_session(&mut session, uids);
    session.logout();
    result
}

fn mark_seen_with_session<S: Read + Write>(
    session: &mut ImapSession<S>,
    uids: &[String],
) -> Result<(), ImapError> {
    session.expect_ok("SELECT \"INBOX\"", "select")?;
    let set = uids.join(",");
    session.expect_ok(&format!("UID STORE {set} +FLAGS (\\Seen)"), "store")?;
    Ok(())
}

// ── Message decoding ────────────────────────────────────────────────

fn to_raw_email(parsed: &mail_parser::Message, uid: String, config: &EmailConfig) -> RawEmail {
    let message_id = parsed
        .message_id()
        .map(str::to_string)
        .unwrap_or_else(|| format!("imap-{uid}@{}", config.imap_host));
    let received_at = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);
    RawEmail {
        uid,
        message_id,
        from: extract_sender(parsed),
        to: parsed
            .to()
            .and_then(|addr| addr.first())
            .and_then(|a| a.address())
            .unwrap_or(config.from_address.as_str())
            .to_string(),
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        body: extract_text(parsed),
        received_at,
    }
}

/// Strip HTML tags, decode the common entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sender address of a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "unknown".into())
}

/// Readable text of a parsed email: plain part, else stripped HTML, else
/// the first textual attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.trim().to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Scripted server: reads come from `input`, writes are captured.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(script: &[u8]) -> Self {
            Self {
                input: Cursor::new(script.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config() -> EmailConfig {
        EmailConfig {
            imap_host: "imap.test.com".into(),
            imap_port: 993,
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            username: "biuro@test.com".into(),
            password: SecretString::from("pass"),
            from_address: "biuro@test.com".into(),
        }
    }

    const MESSAGE: &str = "From: Anna <Anna@Example.com>\r\n\
        To: biuro@test.com\r\n\
        Subject: Hotel w Dubaju\r\n\
        Message-ID: <abc@example.com>\r\n\
        Date: Mon, 06 Jan 2025 10:00:00 +0000\r\n\
        \r\n\
        Ile kosztuje hotel?\r\n";

    #[test]
    fn fetch_reads_literal_bodies_by_uid() {
        let script = format!(
            "* 3 EXISTS\r\nA0001 OK SELECT done\r\n\
             * SEARCH 7 12\r\nA0002 OK SEARCH done\r\n\
             * 2 FETCH (UID 12 BODY[] {{{}}}\r\n{})\r\nA0003 OK FETCH done\r\n",
            MESSAGE.len(),
            MESSAGE
        );
        let mut session = ImapSession::new(ScriptedStream::new(script.as_bytes()));
        let emails = fetch_with_session(&mut session, &config(), 1).unwrap();

        assert_eq!(emails.len(), 1);
        let email = &emails[0];
        assert_eq!(email.uid, "12");
        assert_eq!(email.message_id, "abc@example.com");
        assert_eq!(email.from, "anna@example.com");
        assert_eq!(email.subject, "Hotel w Dubaju");
        assert_eq!(email.body, "Ile kosztuje hotel?");
        assert_eq!(email.received_at.to_rfc3339(), "2025-01-06T10:00:00+00:00");

        let sent = String::from_utf8(session.stream.output).unwrap();
        assert!(sent.contains("A0002 UID SEARCH UNSEEN\r\n"));
        assert!(sent.contains("A0003 UID FETCH 12 (UID BODY.PEEK[])\r\n"));
    }

    #[test]
    fn empty_search_skips_fetch() {
        let script = b"A0001 OK\r\n* SEARCH\r\nA0002 OK\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script));
        assert!(fetch_with_session(&mut session, &config(), 10).unwrap().is_empty());
        let sent = String::from_utf8(session.stream.output).unwrap();
        assert!(!sent.contains("FETCH"));
    }

    #[test]
    fn inbox_status_reads_counters() {
        let script = b"* FLAGS (\\Seen)\r\n* 42 EXISTS\r\n* 1 RECENT\r\nA0001 OK SELECT done\r\n\
            * SEARCH 40 41 42\r\nA0002 OK SEARCH done\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script));
        let status = inbox_status_with_session(&mut session).unwrap();
        assert_eq!(status, InboxStatus { messages: 42, unseen: 3 });

        let sent = String::from_utf8(session.stream.output).unwrap();
        assert!(!sent.contains("FETCH"));
        assert!(!sent.contains("STORE"));
    }

    #[test]
    fn rejected_select_fails_inbox_check() {
        let script = b"A0001 NO mailbox unavailable\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script));
        let err = inbox_status_with_session(&mut session).unwrap_err();
        assert!(err.to_string().contains("mailbox unavailable"));
    }

    #[test]
    fn store_failure_is_an_error() {
        let script = b"A0001 OK\r\nA0002 NO permission denied\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script));
        let err = mark_seen_with_session(&mut session, &["4".into(), "5".into()]).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
        let sent = String::from_utf8(session.stream.output).unwrap();
        assert!(sent.contains("UID STORE 4,5 +FLAGS (\\Seen)"));
    }

    #[test]
    fn closed_connection_is_an_error() {
        let mut session = ImapSession::new(ScriptedStream::new(b"* OK ready\r\n"));
        session.greeting().unwrap();
        assert!(session.command("NOOP").is_err());
    }

    #[test]
    fn window_keeps_newest() {
        assert_eq!(newest_window(&[1, 2, 3, 4], 2), &[3, 4]);
        assert_eq!(newest_window(&[1, 2], 10), &[1, 2]);
    }

    #[test]
    fn search_and_uid_parsing() {
        let lines = vec!["* SEARCH 9 3 3\r\n".to_string()];
        assert_eq!(parse_search(&lines), vec![3, 9]);
        assert_eq!(fetch_uid("* 1 FETCH (UID 42 BODY[] {10}\r\n"), Some("42".into()));
        assert_eq!(literal_length("* 1 FETCH (UID 42 BODY[] {10}\r\n"), Some(10));
        assert_eq!(literal_length("* 1 FETCH (FLAGS (\\Seen))\r\n"), None);
    }

    #[test]
    fn quoting_escapes() {
        assert_eq!(quote(r#"pa"ss\"#), r#""pa\"ss\\""#);
    }

    #[test]
    fn strip_html_decodes_entities() {
        assert_eq!(
            strip_html("<p>Hotel&nbsp;<b>Atlantis</b></p><br>Tom &amp; Jerry"),
            "Hotel Atlantis Tom & Jerry"
        );
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn message_id_falls_back_to_uid() {
        let raw = "From: a@b.com\r\nSubject: x\r\n\r\nbody\r\n";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let email = to_raw_email(&parsed, "77".into(), &config());
        assert_eq!(email.message_id, "imap-77@imap.test.com");
        assert_eq!(email.to, "biuro@test.com");
    }

    #[test]
    fn multipart_message_builds() {
        let outgoing = OutgoingEmail {
            to: "anna@example.com".into(),
            subject: "Re: Hotel".into(),
            text: "Dziękujemy".into(),
            html: Some("<p>Dziękujemy</p>".into()),
        };
        let message = build_message(&config(), outgoing, "<id@test.com>").unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("Message-ID: <id@test.com>"));
    }

    #[test]
    fn invalid_recipient_is_send_failure() {
        let outgoing = OutgoingEmail {
            to: "not an address".into(),
            subject: "x".into(),
            text: "x".into(),
            html: None,
        };
        assert!(matches!(
            build_message(&config(), outgoing, "<id@test.com>"),
            Err(ChannelError::SendFailed { .. })
        ));
    }

    #[test]
    fn sender_domain_from_address() {
        assert_eq!(config().sender_domain(), "test.com");
    }
}
