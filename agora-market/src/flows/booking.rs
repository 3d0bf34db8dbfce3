//! Paid service booking.
//!
//! Booking posts an order to the backend through the payment client. The
//! payment network comes from the server's requirement, not from the identity
//! chain, so no chain guard runs here.

use agora::eip712::Eip712Signer;
use agora::proto::SettlementResult;
use agora_http::negotiate::PaymentClient;
use agora_http::transport::{HttpTransport, ResourceRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use url::Url;

use super::FlowError;
use super::state::{ActionSlot, ActionState};

/// An order for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Service being booked.
    pub service_id: String,
    /// Demand the booking answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_id: Option<String>,
    /// Requested slot, as the backend formats it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<String>,
    /// Free-form notes for the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A completed booking.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingResult {
    /// The order the backend created. Non-JSON bodies are kept as a string.
    pub order: Value,
    /// Settlement receipt, if the backend sent one.
    pub settlement: Option<SettlementResult>,
    /// Whether a payment was signed for this booking.
    pub paid: bool,
}

/// Books services, paying when the backend asks for it.
#[derive(Debug)]
pub struct BookingFlow<T, S> {
    payments: PaymentClient<T, S>,
    orders_url: Url,
    slot: ActionSlot<BookingResult>,
}

impl<T, S> BookingFlow<T, S>
where
    T: HttpTransport,
    S: Eip712Signer,
{
    /// Creates a flow posting orders to `orders_url`.
    pub fn new(payments: PaymentClient<T, S>, orders_url: Url) -> Self {
        Self {
            payments,
            orders_url,
            slot: ActionSlot::new(),
        }
    }

    /// The current action state.
    pub fn state(&self) -> ActionState<BookingResult> {
        self.slot.state()
    }

    /// Clears a finished result.
    ///
    /// # Errors
    ///
    /// [`FlowError::Busy`] while a booking is in flight.
    pub fn reset(&self) -> Result<(), FlowError> {
        self.slot.reset()
    }

    /// Books `order`.
    ///
    /// # Errors
    ///
    /// [`FlowError::Negotiation`] if the backend could not be paid,
    /// [`FlowError::Settlement`] if it rejected a signed payment, and
    /// [`FlowError::Transport`] if the wallet refused to sign.
    #[instrument(name = "agora.flow.book", skip_all, err, fields(service_id = %order.service_id))]
    pub async fn book(&self, order: &OrderRequest) -> Result<BookingResult, FlowError> {
        self.slot.run(self.execute(order)).await
    }

    async fn execute(&self, order: &OrderRequest) -> Result<BookingResult, FlowError> {
        if order.service_id.trim().is_empty() {
            return Err(FlowError::Validation("service id must not be empty".into()));
        }
        let request = ResourceRequest::post_json(self.orders_url.clone(), order)
            .map_err(|e| FlowError::Validation(e.to_string()))?;

        let paid = self.payments.fetch(request).await?;
        let order = paid
            .response
            .json()
            .unwrap_or_else(|_| Value::String(paid.response.text()));

        info!(
            paid = paid.paid(),
            transaction = paid
                .settlement
                .as_ref()
                .and_then(|s| s.transaction.as_deref())
                .unwrap_or("-"),
            "Booking confirmed"
        );
        Ok(BookingResult {
            order,
            paid: paid.paid(),
            settlement: paid.settlement,
        })
    }
}
