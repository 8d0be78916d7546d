//! Integration tests for `SmtpClient` against the scripted fake
//! server.

mod fake_server;

use fake_server::{ScriptServer, Step, step};
use mail_client::{MailConfig, MessageBuilder, SmtpClient};

fn config_for(server: &ScriptServer) -> MailConfig {
    MailConfig::new("127.0.0.1", server.port())
        .with_credentials("sender", "secret")
}

const GREETING: Step = Step::Send("220 mail.example.org ESMTP ready\r\n");

#[tokio::test]
async fn send_pipeline_walks_the_state_machine() {
    let server = ScriptServer::start(vec![
        GREETING,
        step(
            "EHLO",
            "250-mail.example.org greets you\r\n250-8BITMIME\r\n250 PIPELINING\r\n",
        ),
        step("MAIL FROM:<s@x>", "250 OK\r\n"),
        step("RCPT TO:<r@y>", "250 OK\r\n"),
        step("DATA", "354 End data with <CR><LF>.<CR><LF>\r\n"),
        step(".\r\n", "250 OK queued as 12345\r\n"),
        step("QUIT", "221 bye\r\n"),
    ])
    .await;

    let mut client = SmtpClient::connect(config_for(&server)).await.unwrap();
    let reply = client.ehlo("client.example.org").await.unwrap();
    assert_eq!(reply.code, 250);
    assert_eq!(client.extensions(), ["8BITMIME", "PIPELINING"]);

    client.mail_from("s@x").await.unwrap();
    client.rcpt_to("r@y").await.unwrap();
    let reply = client
        .data(b"Subject: test\r\n\r\nline one\r\n.leading dot\r\n")
        .await
        .unwrap();
    assert!(reply.message().contains("queued"));
    client.quit().await.unwrap();
}

#[tokio::test]
async fn auth_plain_sends_base64_blob() {
    // base64("\0sender\0secret")
    let server = ScriptServer::start(vec![
        GREETING,
        step("EHLO", "250-x\r\n250 AUTH PLAIN LOGIN\r\n"),
        step("AUTH PLAIN AHNlbmRlcgBzZWNyZXQ=", "235 authenticated\r\n"),
    ])
    .await;

    let mut client = SmtpClient::connect(config_for(&server)).await.unwrap();
    client.ehlo("client.example.org").await.unwrap();
    let reply = client.auth_plain().await.unwrap();
    assert_eq!(reply.code, 235);
}

#[tokio::test]
async fn auth_login_exchanges_credentials() {
    // base64("sender") and base64("secret")
    let server = ScriptServer::start(vec![
        GREETING,
        step("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
        step("c2VuZGVy", "334 UGFzc3dvcmQ6\r\n"),
        step("c2VjcmV0", "235 authenticated\r\n"),
    ])
    .await;

    let mut client = SmtpClient::connect(config_for(&server)).await.unwrap();
    let reply = client.auth_login().await.unwrap();
    assert_eq!(reply.code, 235);
}

#[tokio::test]
async fn transient_failure_surfaces_as_refusal() {
    let server = ScriptServer::start(vec![
        GREETING,
        step("MAIL FROM", "451 try again later\r\n"),
    ])
    .await;

    let mut client = SmtpClient::connect(config_for(&server)).await.unwrap();
    let err = client.mail_from("s@x").await.unwrap_err();
    assert!(matches!(
        err,
        mail_client::Error::ServerStatus { code, .. } if code == "451"
    ));
}

#[tokio::test]
async fn send_message_extracts_envelope_from_headers() {
    let server = ScriptServer::start(vec![
        GREETING,
        step("MAIL FROM:<alice@example.com>", "250 OK\r\n"),
        step("RCPT TO:<bob@example.com>", "250 OK\r\n"),
        step("RCPT TO:<carol@example.com>", "250 OK\r\n"),
        step("DATA", "354 go\r\n"),
        step(".\r\n", "250 queued\r\n"),
    ])
    .await;

    let message = MessageBuilder::new()
        .from("alice@example.com")
        .to("Bob <bob@example.com>")
        .cc("carol@example.com")
        .subject("hello")
        .text_body("hi there")
        .build()
        .unwrap();

    let mut client = SmtpClient::connect(config_for(&server)).await.unwrap();
    let reply = client.send_message(&message).await.unwrap();
    assert!(reply.is_positive());
}

#[tokio::test]
async fn starttls_upgrades_and_rehellos() {
    let server = ScriptServer::start(vec![
        GREETING,
        step("EHLO", "250-x\r\n250 STARTTLS\r\n"),
        step("STARTTLS", "220 ready for TLS\r\n"),
        Step::UpgradeTls,
        step("EHLO", "250-x\r\n250 AUTH PLAIN\r\n"),
    ])
    .await;

    let mut config = config_for(&server);
    config.accept_invalid_certs = true;

    let mut client = SmtpClient::connect(config).await.unwrap();
    client.ehlo("client.example.org").await.unwrap();
    client.start_tls().await.unwrap();
    assert_eq!(client.extensions(), ["AUTH PLAIN"]);
}
