//! Relay transport against a scripted in-process SMTP server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};

use mailcast::compose::compose;
use mailcast::error::Error;
use mailcast::model::draft::Draft;
use mailcast::transport::relay::{send_via_relay, RelaySettings, RelayTransport, TlsMode};
use mailcast::transport::{envelope_for, Delivery, Transport};

/// What the server saw during one connection.
#[derive(Debug, Default)]
struct Session {
    commands: Vec<String>,
    data: String,
}

impl Session {
    fn verbs(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|c| {
                c.split(|ch: char| ch == ' ' || ch == ':')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_uppercase()
            })
            .collect()
    }

    fn find(&self, prefix: &str) -> Vec<&str> {
        self.commands
            .iter()
            .filter(|c| c.to_ascii_uppercase().starts_with(prefix))
            .map(String::as_str)
            .collect()
    }
}

/// Accept one connection and answer it like a permissive relay.
///
/// `extensions` are advertised in the EHLO reply. A STARTTLS request is
/// accepted; without `tls` the server then hangs up, with it the session
/// continues over TLS.
fn spawn_smtp(extensions: &'static [&'static str]) -> (u16, JoinHandle<Session>) {
    spawn_smtp_with(extensions, None)
}

fn spawn_smtp_with(
    extensions: &'static [&'static str],
    tls: Option<Arc<ServerConfig>>,
) -> (u16, JoinHandle<Session>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream, extensions, tls)
    });
    (port, handle)
}

/// Self-signed server identity.
fn tls_config() -> Arc<ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["relay.test".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    Arc::new(config)
}

#[derive(Debug, PartialEq)]
enum Step {
    Closed,
    StartTls,
}

fn serve(stream: TcpStream, extensions: &[&str], tls: Option<Arc<ServerConfig>>) -> Session {
    let mut session = Session::default();
    let mut plain = BufReader::new(stream);

    if plain.get_mut().write_all(b"220 relay.test ESMTP ready\r\n").is_err() {
        return session;
    }
    if converse(&mut plain, extensions, &mut session) != Step::StartTls {
        return session;
    }
    let Some(config) = tls else {
        return session;
    };

    let conn = ServerConnection::new(config).unwrap();
    let mut secure = BufReader::new(StreamOwned::new(conn, plain.into_inner()));
    let upgraded: Vec<&str> = extensions
        .iter()
        .copied()
        .filter(|e| *e != "STARTTLS")
        .collect();
    converse(&mut secure, &upgraded, &mut session);
    session
}

/// Answer commands until the client quits, hangs up or asks for STARTTLS.
fn converse<S: Read + Write>(
    reader: &mut BufReader<S>,
    extensions: &[&str],
    session: &mut Session,
) -> Step {
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return Step::Closed,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        let upper = command.to_ascii_uppercase();
        session.commands.push(command);

        let reply = if upper.starts_with("EHLO") {
            let mut lines = vec!["relay.test"];
            lines.extend_from_slice(extensions);
            let last = lines.len() - 1;
            lines
                .iter()
                .enumerate()
                .map(|(i, l)| format!("250{}{l}\r\n", if i == last { ' ' } else { '-' }))
                .collect::<String>()
        } else if upper.starts_with("STARTTLS") {
            let _ = reader.get_mut().write_all(b"220 2.0.0 go ahead\r\n");
            return Step::StartTls;
        } else if upper.starts_with("AUTH") {
            "235 2.7.0 authenticated\r\n".to_string()
        } else if upper.starts_with("MAIL") || upper.starts_with("RCPT") {
            "250 2.1.0 ok\r\n".to_string()
        } else if upper.starts_with("DATA") {
            if reader.get_mut().write_all(b"354 end with <CRLF>.<CRLF>\r\n").is_err() {
                return Step::Closed;
            }
            loop {
                let mut data_line = String::new();
                match reader.read_line(&mut data_line) {
                    Ok(0) | Err(_) => return Step::Closed,
                    Ok(_) if data_line == ".\r\n" => break,
                    Ok(_) => session.data.push_str(&data_line),
                }
            }
            "250 2.0.0 Ok: queued as ABC123\r\n".to_string()
        } else if upper.starts_with("QUIT") {
            let _ = reader.get_mut().write_all(b"221 2.0.0 bye\r\n");
            return Step::Closed;
        } else {
            "250 ok\r\n".to_string()
        };

        if reader.get_mut().write_all(reply.as_bytes()).is_err() {
            return Step::Closed;
        }
    }
}

fn settings(port: u16) -> RelaySettings {
    RelaySettings {
        port,
        ..RelaySettings::new("127.0.0.1")
    }
}

fn draft(to: &str) -> Draft {
    let mut d = Draft::new("sender@example.com", to, "Relay test");
    d.html = "<p>relayed</p>".into();
    d.plain = "relayed".into();
    d
}

// ─── Plain relay ────────────────────────────────────────────────────

#[test]
fn test_plain_relay_sends_once_to_every_recipient() {
    let (port, server) = spawn_smtp(&[]);
    let d = draft("a@example.com, b@example.com,c@example.com");
    let message = compose(&d).unwrap();

    let delivery = send_via_relay(&message, &settings(port), &d.sender, &d.to).unwrap();
    let session = server.join().unwrap();

    match delivery {
        Delivery::Relayed { response } => assert!(response.contains("queued as ABC123"), "{response}"),
        other => panic!("unexpected delivery {other:?}"),
    }

    let verbs = session.verbs();
    assert_eq!(verbs[0], "EHLO");
    assert!(!verbs.contains(&"AUTH".to_string()));
    assert!(!verbs.contains(&"STARTTLS".to_string()));
    assert_eq!(session.find("MAIL FROM").len(), 1);
    assert!(session.find("MAIL FROM")[0].contains("<sender@example.com>"));

    let rcpts = session.find("RCPT TO");
    assert_eq!(rcpts.len(), 3);
    assert!(rcpts[0].contains("<a@example.com>"));
    assert!(rcpts[2].contains("<c@example.com>"));

    assert!(session.data.contains("Subject: Relay test"));
    assert!(session.data.contains("multipart/mixed"));
}

#[test]
fn test_transport_trait_uses_given_envelope() {
    let (port, server) = spawn_smtp(&[]);
    let d = draft("only@example.com");
    let message = compose(&d).unwrap();
    let envelope = envelope_for(&d.sender, &d.to).unwrap();

    let mut transport = RelayTransport::new(settings(port));
    transport.send(&message, &envelope).unwrap();
    let session = server.join().unwrap();

    let rcpts = session.find("RCPT TO");
    assert_eq!(rcpts, vec!["RCPT TO:<only@example.com>"]);
}

// ─── Authentication ─────────────────────────────────────────────────

#[test]
fn test_auth_sent_when_both_credentials_present() {
    let (port, server) = spawn_smtp(&["AUTH PLAIN LOGIN"]);
    let d = draft("to@example.com");
    let message = compose(&d).unwrap();
    let relay = RelaySettings {
        username: Some("me".into()),
        password: Some("secret".into()),
        ..settings(port)
    };

    send_via_relay(&message, &relay, &d.sender, &d.to).unwrap();
    let session = server.join().unwrap();

    let auth = session.find("AUTH PLAIN");
    assert_eq!(auth.len(), 1, "commands: {:?}", session.commands);
    let encoded = auth[0].rsplit(' ').next().unwrap();
    assert_eq!(STANDARD.decode(encoded).unwrap(), b"\0me\0secret");

    let verbs = session.verbs();
    let auth_at = verbs.iter().position(|v| v == "AUTH").unwrap();
    let mail_at = verbs.iter().position(|v| v == "MAIL").unwrap();
    assert!(auth_at < mail_at);
}

#[test]
fn test_no_auth_with_only_a_username() {
    let (port, server) = spawn_smtp(&["AUTH PLAIN LOGIN"]);
    let d = draft("to@example.com");
    let message = compose(&d).unwrap();
    let relay = RelaySettings {
        username: Some("me".into()),
        password: Some(String::new()),
        ..settings(port)
    };

    send_via_relay(&message, &relay, &d.sender, &d.to).unwrap();
    let session = server.join().unwrap();
    assert!(session.find("AUTH").is_empty());
    assert_eq!(session.find("RCPT TO").len(), 1);
}

// ─── STARTTLS ───────────────────────────────────────────────────────

#[test]
fn test_starttls_repeats_ehlo_before_auth() {
    let (port, server) = spawn_smtp_with(&["STARTTLS", "AUTH PLAIN LOGIN"], Some(tls_config()));
    let d = draft("to@example.com");
    let message = compose(&d).unwrap();
    let relay = RelaySettings {
        tls: TlsMode::StartTls,
        username: Some("me".into()),
        password: Some("secret".into()),
        accept_invalid_certs: true,
        ..settings(port)
    };

    let delivery = send_via_relay(&message, &relay, &d.sender, &d.to).unwrap();
    let session = server.join().unwrap();

    assert!(matches!(delivery, Delivery::Relayed { .. }));
    let verbs = session.verbs();
    assert_eq!(
        verbs[..7],
        ["EHLO", "STARTTLS", "EHLO", "AUTH", "MAIL", "RCPT", "DATA"],
        "commands: {:?}",
        session.commands
    );
    assert!(session.data.contains("Subject: Relay test"));
}

#[test]
fn test_starttls_rejects_untrusted_certificate() {
    let (port, server) = spawn_smtp_with(&["STARTTLS", "AUTH PLAIN LOGIN"], Some(tls_config()));
    let d = draft("to@example.com");
    let message = compose(&d).unwrap();
    let relay = RelaySettings {
        tls: TlsMode::StartTls,
        username: Some("me".into()),
        password: Some("secret".into()),
        ..settings(port)
    };

    let err = send_via_relay(&message, &relay, &d.sender, &d.to).unwrap_err();
    let session = server.join().unwrap();

    assert!(matches!(err, Error::Smtp(_)), "got {err}");
    assert_eq!(session.verbs(), vec!["EHLO", "STARTTLS"]);
}

#[test]
fn test_starttls_without_upgrade_sends_nothing_in_clear() {
    let (port, server) = spawn_smtp(&["STARTTLS", "AUTH PLAIN LOGIN"]);
    let d = draft("to@example.com");
    let message = compose(&d).unwrap();
    let relay = RelaySettings {
        tls: TlsMode::StartTls,
        username: Some("me".into()),
        password: Some("secret".into()),
        ..settings(port)
    };

    let err = send_via_relay(&message, &relay, &d.sender, &d.to).unwrap_err();
    let session = server.join().unwrap();

    assert!(matches!(err, Error::Smtp(_)), "got {err}");
    assert_eq!(session.verbs(), vec!["EHLO", "STARTTLS"]);
}

#[test]
fn test_unreachable_relay_is_an_smtp_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let d = draft("to@example.com");
    let message = compose(&d).unwrap();
    let err = send_via_relay(&message, &settings(port), &d.sender, &d.to).unwrap_err();
    assert!(matches!(err, Error::Smtp(_)), "got {err}");
}
