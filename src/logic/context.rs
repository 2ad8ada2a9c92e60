use std::sync::Arc;

use crate::config::ServiceSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::gateway::{notify, EventSink, LogEventSink, OrgPolicyGateway, PolicyGateway};
use crate::logic::concurrency::ApplicationLocks;
use crate::model::{Application, DomainEvent, EntityKind, Id, Page};
use crate::store::traits::Store;

/// Everything a lifecycle operation needs: the store, the two gateways,
/// settings and the per-application lock table.
pub struct ServiceContext<S: Store> {
    pub store: Arc<S>,
    pub policies: Arc<dyn PolicyGateway>,
    pub events: Arc<dyn EventSink>,
    pub settings: ServiceSettings,
    pub locks: ApplicationLocks,
}

impl<S: Store> ServiceContext<S> {
    /// Context with the org policy gateway and log-only notifications
    pub fn new(store: Arc<S>, settings: ServiceSettings) -> Self {
        Self {
            store,
            policies: Arc::new(OrgPolicyGateway),
            events: Arc::new(LogEventSink),
            settings,
            locks: ApplicationLocks::new(),
        }
    }

    pub fn with_policies(mut self, policies: Arc<dyn PolicyGateway>) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub async fn notify(&self, event: DomainEvent) {
        notify(self.events.as_ref(), event).await;
    }

    pub async fn load_application(&self, id: &Id) -> ServiceResult<Application> {
        self.store
            .get_application(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Application, id))
    }

    pub async fn load_page(&self, id: &Id) -> ServiceResult<Page> {
        self.store
            .get_page(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Page, id))
    }
}
