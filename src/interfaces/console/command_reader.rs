use crate::domain::cart::CartItem;
use crate::domain::payment::PaymentKind;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    AddItem {
        item: CartItem,
    },
    ClearCart,
    Cart,
    Readers,
    BeginTerminal {
        reader_id: String,
        customer_contact: Option<String>,
    },
    BeginLink,
    ChargeManual {
        payment_method: String,
        customer_contact: Option<String>,
    },
    Poll {
        kind: PaymentKind,
        payment_id: String,
    },
    Cancel {
        kind: PaymentKind,
        payment_id: String,
    },
    /// A webhook delivery relayed by the operator's endpoint.
    Webhook {
        payload: String,
        signature: Option<String>,
    },
}

/// Reads one JSON command per line. Blank lines are skipped.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses commands. A malformed line yields an error and reading continues.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.source.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(PaymentError::from)),
            Err(e) => Some(Err(PaymentError::from(e))),
        })
    }
}
