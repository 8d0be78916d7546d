//! Integration tests for `Pop3Client` against the scripted fake
//! server.

mod fake_server;

use fake_server::{ScriptServer, Step, step};
use mail_client::{MailConfig, Pop3Client};

const GREETING: Step = Step::Send("+OK POP3 server ready <1896.697170952@dbc.mtview.ca.us>\r\n");

#[tokio::test]
async fn user_pass_session_with_listing_and_retrieval() {
    let server = ScriptServer::start(vec![
        GREETING,
        step("USER mrose", "+OK name is a valid mailbox\r\n"),
        step("PASS", "+OK maildrop locked and ready\r\n"),
        step("STAT", "+OK 2 320\r\n"),
        step("LIST", "+OK 2 messages (320 octets)\r\n1 120\r\n2 200\r\n.\r\n"),
        step(
            "RETR 1",
            "+OK 120 octets\r\n\
             From: alice@example.com\r\n\
             Subject: greetings\r\n\
             \r\n\
             Body line\r\n\
             ..stuffed line\r\n\
             .\r\n",
        ),
        step("DELE 1", "+OK message 1 deleted\r\n"),
        step("RSET", "+OK maildrop has 2 messages\r\n"),
        step("QUIT", "+OK dewey POP3 server signing off\r\n"),
    ])
    .await;

    let config = MailConfig::new("127.0.0.1", server.port())
        .with_credentials("mrose", "tanstaaf");
    let mut client = Pop3Client::connect(config).await.unwrap();
    assert!(client.supports_apop());

    client.login().await.unwrap();
    assert_eq!(client.stat().await.unwrap(), (2, 320));
    assert_eq!(client.list(None).await.unwrap(), vec![(1, 120), (2, 200)]);

    let message = client.retr_message(1).await.unwrap();
    assert_eq!(message.header("Subject"), Some("greetings"));
    // The framer unstuffed the doubled leading dot.
    assert_eq!(message.text(), Some("Body line\r\n.stuffed line\r\n"));

    client.dele(1).await.unwrap();
    client.rset().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn apop_sends_the_rfc_1939_digest() {
    // MD5("<1896.697170952@dbc.mtview.ca.us>tanstaaf") from RFC 1939 §7.
    let server = ScriptServer::start(vec![
        GREETING,
        step(
            "APOP mrose c4c9334bac560ecc979e58001b3e22fb",
            "+OK maildrop has 1 message\r\n",
        ),
        step("STAT", "+OK 1 369\r\n"),
    ])
    .await;

    let config = MailConfig::new("127.0.0.1", server.port())
        .with_credentials("mrose", "tanstaaf");
    let mut client = Pop3Client::connect(config).await.unwrap();
    client.apop().await.unwrap();
    assert_eq!(client.stat().await.unwrap(), (1, 369));
}

#[tokio::test]
async fn uidl_and_top_return_per_message_data() {
    let server = ScriptServer::start(vec![
        GREETING,
        step("UIDL", "+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n"),
        step(
            "TOP 1 0",
            "+OK\r\nFrom: alice@example.com\r\nSubject: top only\r\n\r\n.\r\n",
        ),
    ])
    .await;

    let config = MailConfig::new("127.0.0.1", server.port())
        .with_credentials("mrose", "tanstaaf");
    let mut client = Pop3Client::connect(config).await.unwrap();

    let uids = client.uidl(None).await.unwrap();
    assert_eq!(uids.len(), 2);
    assert_eq!(uids[0], (1, "whqtswO00WBw418f9t5JxYwZ".to_string()));

    let top = client.top(1, 0).await.unwrap();
    assert!(top.starts_with(b"From: alice@example.com"));
}

#[tokio::test]
async fn err_reply_surfaces_as_refusal() {
    let server = ScriptServer::start(vec![
        GREETING,
        step("DELE 99", "-ERR no such message\r\n"),
    ])
    .await;

    let config = MailConfig::new("127.0.0.1", server.port())
        .with_credentials("mrose", "tanstaaf");
    let mut client = Pop3Client::connect(config).await.unwrap();
    let err = client.dele(99).await.unwrap_err();
    assert!(matches!(
        err,
        mail_client::Error::ServerStatus { code, .. } if code == "-ERR"
    ));
}
