//! Shared application state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::EventBus;
use crate::integrations::{
    CurrencyConverter, ImageHost, IntegrationError, Mailer, PaymentGateway, ShippingProvider,
};
use crate::store::{Collection, Document, DocumentStore};

/// Cheaply clonable handle passed to every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn DocumentStore>,
    payments: Option<Arc<dyn PaymentGateway>>,
    shipping: Option<Arc<dyn ShippingProvider>>,
    images: Option<Arc<dyn ImageHost>>,
    mailer: Arc<dyn Mailer>,
    currency: CurrencyConverter,
    events: EventBus,
    shutdown: CancellationToken,
}

/// Collaborators for [`AppState::new`]; integrations left `None` report
/// themselves unavailable.
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub shipping: Option<Arc<dyn ShippingProvider>>,
    pub images: Option<Arc<dyn ImageHost>>,
    pub mailer: Arc<dyn Mailer>,
    pub currency: CurrencyConverter,
    pub events: EventBus,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, services: Services) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store: services.store,
                payments: services.payments,
                shipping: services.shipping,
                images: services.images,
                mailer: services.mailer,
                currency: services.currency,
                events: services.events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    /// Typed access to one collection.
    pub fn collection<T: Document>(&self) -> Collection<'_, T> {
        Collection::new(self.store())
    }

    /// # Errors
    ///
    /// Returns `IntegrationError::NotConfigured` when no gateway is set up.
    pub fn payments(&self) -> Result<&dyn PaymentGateway, IntegrationError> {
        self.inner.payments.as_deref().ok_or(IntegrationError::NotConfigured("Payments"))
    }

    /// # Errors
    ///
    /// Returns `IntegrationError::NotConfigured` when no shipping provider is set up.
    pub fn shipping(&self) -> Result<&dyn ShippingProvider, IntegrationError> {
        self.inner.shipping.as_deref().ok_or(IntegrationError::NotConfigured("Shipping"))
    }

    /// # Errors
    ///
    /// Returns `IntegrationError::NotConfigured` when no image host is set up.
    pub fn images(&self) -> Result<&dyn ImageHost, IntegrationError> {
        self.inner.images.as_deref().ok_or(IntegrationError::NotConfigured("Image uploads"))
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.mailer.as_ref()
    }

    #[must_use]
    pub fn currency(&self) -> &CurrencyConverter {
        &self.inner.currency
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Cancelled when the server starts shutting down; long-lived responses
    /// end on it.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}
