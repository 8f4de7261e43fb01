use crate::application::link::LinkStart;
use crate::application::terminal::TerminalStart;
use crate::domain::cart::CartSnapshot;
use crate::domain::payment::{PaymentOutcome, PollResponse};
use crate::domain::processor::Reader;
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Cart(CartSnapshot),
    Readers { readers: Vec<Reader> },
    TerminalStarted(TerminalStart),
    LinkStarted(LinkStart),
    Poll(PollResponse),
    Outcome(PaymentOutcome),
    /// `handled` is absent for verified events that concern no tracked payment.
    Webhook { handled: Option<PollResponse> },
    Error { message: String, retryable: bool },
}

impl From<PaymentError> for Response {
    fn from(err: PaymentError) -> Self {
        Response::Error {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Writes one JSON response per line, flushing after each.
pub struct ResponseWriter<W: Write> {
    sink: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write(&mut self, response: &Response) -> Result<()> {
        serde_json::to_writer(&mut self.sink, response)?;
        self.sink.write_all(b"\n")?;
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Outcome, PaymentKind};
    use crate::error::ValidationError;

    fn written(responses: &[Response]) -> String {
        let mut buffer = Vec::new();
        let mut writer = ResponseWriter::new(&mut buffer);
        for response in responses {
            writer.write(response).unwrap();
        }
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_writes_one_line_per_response() {
        let output = written(&[
            Response::Poll(PollResponse::AlreadyConcluded),
            Response::Outcome(PaymentOutcome::new(
                "pi_1",
                PaymentKind::Manual,
                Outcome::Failed {
                    reason: "Insufficient funds.".to_string(),
                },
            )),
        ]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let poll: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(poll["result"], "poll");
        assert_eq!(poll["status"], "already_concluded");

        let outcome: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(outcome["outcome"], "failed");
        assert_eq!(outcome["reason"], "Insufficient funds.");
        assert_eq!(outcome["kind"], "manual");
    }

    #[test]
    fn test_errors_carry_retryable_flag() {
        let validation: Response = PaymentError::from(ValidationError::EmptyCart).into();
        let remote: Response = PaymentError::RemoteCommunication("timeout".to_string()).into();

        let output = written(&[validation, remote]);
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["result"], "error");
        assert_eq!(lines[0]["retryable"], false);
        assert_eq!(lines[1]["retryable"], true);
    }
}
