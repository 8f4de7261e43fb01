use assert_cmd::cargo_bin;
use predicates::prelude::*;
use assert_cmd::Command;

fn tillpay() -> Command {
    let mut cmd = Command::new(cargo_bin!("tillpay"));
    cmd.args(["--api-key", "sk_test_123", "--api-base", "http://127.0.0.1:9"])
        .env_remove("PROCESSOR_WEBHOOK_URL")
        .env_remove("PROCESSOR_WEBHOOK_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_console_rejects_payment_without_online_reader() -> Result<(), Box<dyn std::error::Error>> {
    let input = concat!(
        r#"{"cmd":"add_item","item":{"name":"Latte","quantity":2,"unit_price":"4.50"}}"#,
        "\n",
        r#"{"cmd":"begin_terminal","reader_id":"tmr_1"}"#,
        "\n",
        r#"{"cmd":"poll","kind":"manual","payment_id":"manual_1"}"#,
        "\n",
        "not json\n",
    );

    tillpay()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""result":"cart""#))
        .stdout(predicate::str::contains("no reader available"))
        .stdout(predicate::str::contains("manual card payments conclude when charged"))
        .stdout(predicate::str::contains("Serialization error"))
        .stderr(predicate::str::contains("Could not load online readers"));

    Ok(())
}

#[test]
fn test_console_rejects_unsigned_webhook() {
    tillpay()
        .args(["--webhook-secret", "whsec_test"])
        .write_stdin("{\"cmd\":\"webhook\",\"payload\":\"{}\",\"signature\":\"t=1,v1=00\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Webhook rejected"))
        .stdout(predicate::str::contains(r#""retryable":false"#));
}

#[test]
fn test_webhook_url_requires_secret() {
    tillpay()
        .args(["--webhook-url", "https://till.example.test/webhooks"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--webhook-secret is required"));
}
