use super::command_reader::Command;
use super::response_writer::Response;
use crate::application::coordinator::PaymentCoordinator;
use crate::domain::payment::PaymentKind;
use crate::domain::ports::CartService;
use crate::error::Result;
use crate::infrastructure::in_memory::InMemoryCart;
use std::sync::Arc;
use tracing::debug;

/// Executes console commands against the coordinator and the operator's cart.
pub struct ConsoleSession {
    coordinator: Arc<PaymentCoordinator>,
    cart: InMemoryCart,
}

impl ConsoleSession {
    pub fn new(coordinator: Arc<PaymentCoordinator>, cart: InMemoryCart) -> Self {
        Self { coordinator, cart }
    }

    /// Never fails: errors are rendered as `Response::Error`.
    pub async fn execute(&self, command: Command) -> Response {
        debug!(?command, "Console command");
        self.dispatch(command).await.unwrap_or_else(Response::from)
    }

    async fn dispatch(&self, command: Command) -> Result<Response> {
        let response = match command {
            Command::AddItem { item } => {
                self.cart.add_item(item).await;
                Response::Cart(self.cart.snapshot().await?)
            }
            Command::ClearCart => {
                self.cart.clear().await?;
                Response::Cart(self.cart.snapshot().await?)
            }
            Command::Cart => Response::Cart(self.cart.snapshot().await?),
            Command::Readers => Response::Readers {
                readers: self.coordinator.refresh_readers().await?,
            },
            Command::BeginTerminal {
                reader_id,
                customer_contact,
            } => Response::TerminalStarted(
                self.coordinator
                    .begin_terminal_payment(&reader_id, customer_contact)
                    .await?,
            ),
            Command::BeginLink => {
                Response::LinkStarted(self.coordinator.begin_link_payment().await?)
            }
            Command::ChargeManual {
                payment_method,
                customer_contact,
            } => Response::Outcome(
                self.coordinator
                    .charge_manual(&payment_method, customer_contact)
                    .await?,
            ),
            Command::Poll { kind, payment_id } => Response::Poll(match kind {
                PaymentKind::Terminal => self.coordinator.poll_terminal(&payment_id).await,
                PaymentKind::Link => self.coordinator.poll_link(&payment_id).await,
                PaymentKind::Manual => return Ok(manual_not_tracked()),
            }),
            Command::Cancel { kind, payment_id } => Response::Poll(match kind {
                PaymentKind::Terminal => self.coordinator.cancel_terminal(&payment_id).await,
                PaymentKind::Link => self.coordinator.cancel_link(&payment_id).await,
                PaymentKind::Manual => return Ok(manual_not_tracked()),
            }),
            Command::Webhook { payload, signature } => Response::Webhook {
                handled: self
                    .coordinator
                    .handle_webhook(payload.as_bytes(), signature.as_deref())
                    .await?,
            },
        };
        Ok(response)
    }
}

fn manual_not_tracked() -> Response {
    Response::Error {
        message: "manual card payments conclude when charged".to_string(),
        retryable: false,
    }
}
