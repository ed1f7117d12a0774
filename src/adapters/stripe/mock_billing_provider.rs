//! Mock billing provider for testing.
//!
//! Provides a configurable in-memory implementation of `BillingProvider` for
//! unit and integration tests. Supports:
//! - Pre-configured subscriptions, invoices, charges, sessions and customers
//! - Error injection per method or per customer
//! - Artificial latency
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::billing::{SubscriptionSnapshot, UID_METADATA_KEY};
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{
    BillingProvider, ChargeRef, CheckoutSessionRef, CustomerRef, InvoiceRef, ProviderError,
};

use super::webhook_types::decode_subscription;

/// Mock billing provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockBillingProvider::new();
/// mock.add_subscription(snapshot);
/// mock.set_method_error("get_invoice", ProviderError::network("reset"));
/// ```
#[derive(Default)]
pub struct MockBillingProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, SubscriptionSnapshot>,
    invoices: HashMap<String, InvoiceRef>,
    charges: HashMap<String, ChargeRef>,
    sessions: HashMap<String, CheckoutSessionRef>,
    customers: HashMap<String, CustomerRef>,

    /// Metadata written through the port, keyed by (object id, key).
    subscription_metadata: HashMap<(String, String), String>,
    customer_metadata: HashMap<(String, String), String>,

    /// Specific errors by method name.
    method_errors: HashMap<String, ProviderError>,

    /// Errors for any call naming a given customer.
    customer_errors: HashMap<String, ProviderError>,

    latency: Option<Duration>,

    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_subscription(&self, snapshot: SubscriptionSnapshot) {
        let id = snapshot.subscription_id.as_str().to_string();
        self.inner.lock().unwrap().subscriptions.insert(id, snapshot);
    }

    /// Simulates a subscription the provider no longer returns.
    pub fn remove_subscription(&self, subscription_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .remove(subscription_id);
    }

    pub fn add_invoice(&self, invoice: InvoiceRef) {
        let id = invoice.id.clone();
        self.inner.lock().unwrap().invoices.insert(id, invoice);
    }

    pub fn add_charge(&self, charge: ChargeRef) {
        let id = charge.id.clone();
        self.inner.lock().unwrap().charges.insert(id, charge);
    }

    pub fn add_checkout_session(&self, session: CheckoutSessionRef) {
        let id = session.id.clone();
        self.inner.lock().unwrap().sessions.insert(id, session);
    }

    pub fn add_customer(&self, customer: CustomerRef) {
        let id = customer.id.as_str().to_string();
        self.inner.lock().unwrap().customers.insert(id, customer);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: ProviderError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Fail every customer-scoped call for one customer.
    pub fn fail_customer(&self, customer_id: &str, error: ProviderError) {
        self.inner
            .lock()
            .unwrap()
            .customer_errors
            .insert(customer_id.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.method_errors.clear();
        state.customer_errors.clear();
    }

    /// Delay every async call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().unwrap().latency = Some(latency);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    /// Metadata value written onto a subscription.
    pub fn subscription_metadata(&self, subscription_id: &str, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .subscription_metadata
            .get(&(subscription_id.to_string(), key.to_string()))
            .cloned()
    }

    /// Metadata value written onto a customer.
    pub fn customer_metadata(&self, customer_id: &str, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .customer_metadata
            .get(&(customer_id.to_string(), key.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    /// Records the call, applies latency, then checks injected errors.
    async fn enter(
        &self,
        method: &str,
        args: Vec<String>,
        customer_id: Option<&str>,
    ) -> Result<(), ProviderError> {
        let latency = {
            let mut state = self.inner.lock().unwrap();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.inner.lock().unwrap();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = customer_id.and_then(|id| state.customer_errors.get(id)) {
            return Err(error.clone());
        }
        Ok(())
    }
}

impl Clone for MockBillingProvider {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn decode_subscription(&self, object: &Value) -> Option<SubscriptionSnapshot> {
        decode_subscription(object)
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, ProviderError> {
        self.enter("get_subscription", vec![subscription_id.to_string()], None)
            .await?;
        let state = self.inner.lock().unwrap();
        Ok(state.subscriptions.get(subscription_id.as_str()).cloned())
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRef>, ProviderError> {
        self.enter("get_invoice", vec![invoice_id.to_string()], None)
            .await?;
        Ok(self.inner.lock().unwrap().invoices.get(invoice_id).cloned())
    }

    async fn get_charge(&self, charge_id: &str) -> Result<Option<ChargeRef>, ProviderError> {
        self.enter("get_charge", vec![charge_id.to_string()], None)
            .await?;
        Ok(self.inner.lock().unwrap().charges.get(charge_id).cloned())
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionRef>, ProviderError> {
        self.enter("get_checkout_session", vec![session_id.to_string()], None)
            .await?;
        Ok(self.inner.lock().unwrap().sessions.get(session_id).cloned())
    }

    async fn get_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerRef>, ProviderError> {
        self.enter(
            "get_customer",
            vec![customer_id.to_string()],
            Some(customer_id.as_str()),
        )
        .await?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .customers
            .get(customer_id.as_str())
            .cloned())
    }

    async fn list_customer_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<SubscriptionSnapshot>, ProviderError> {
        self.enter(
            "list_customer_subscriptions",
            vec![customer_id.to_string()],
            Some(customer_id.as_str()),
        )
        .await?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.customer_id == *customer_id)
            .cloned()
            .collect())
    }

    async fn set_subscription_metadata(
        &self,
        subscription_id: &SubscriptionId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        self.enter(
            "set_subscription_metadata",
            vec![subscription_id.to_string(), key.to_string(), value.to_string()],
            None,
        )
        .await?;

        let mut state = self.inner.lock().unwrap();
        state.subscription_metadata.insert(
            (subscription_id.to_string(), key.to_string()),
            value.to_string(),
        );
        if key == UID_METADATA_KEY {
            if let Some(snapshot) = state.subscriptions.get_mut(subscription_id.as_str()) {
                snapshot.metadata_uid = Some(value.to_string());
            }
        }
        Ok(())
    }

    async fn set_customer_metadata(
        &self,
        customer_id: &CustomerId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        self.enter(
            "set_customer_metadata",
            vec![customer_id.to_string(), key.to_string(), value.to_string()],
            Some(customer_id.as_str()),
        )
        .await?;

        let mut state = self.inner.lock().unwrap();
        state.customer_metadata.insert(
            (customer_id.to_string(), key.to_string()),
            value.to_string(),
        );
        if key == UID_METADATA_KEY {
            if let Some(customer) = state.customers.get_mut(customer_id.as_str()) {
                customer.metadata_uid = Some(value.to_string());
            }
        }
        Ok(())
    }
}
