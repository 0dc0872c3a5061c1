use crate::adapters::{BorrowDirectClient, FolioClient, IlliadClient, ReshareClient, SymphonyClient};
use crate::config::toml_config::{IlsKind, PaymentConfig, PortalConfig};
use crate::core::requests::RequestAggregator;
use crate::domain::patron::{Patron, PatronSummary};
use crate::domain::ports::{IlsClient, RequestSourceClient};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use chrono::Utc;
use std::sync::Arc;

/// Everything a controller needs: the ILS, the supplementary request
/// sources and the payment settings. Cheap to share behind an `Arc`.
pub struct PortalService {
    ils: Arc<dyn IlsClient>,
    requests: RequestAggregator,
    payment: PaymentConfig,
    catalog_url: String,
}

impl PortalService {
    pub fn new(
        ils: Arc<dyn IlsClient>,
        requests: RequestAggregator,
        payment: PaymentConfig,
        catalog_url: impl Into<String>,
    ) -> Self {
        Self {
            ils,
            requests,
            payment,
            catalog_url: catalog_url.into(),
        }
    }

    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        config.validate()?;
        let ttl = config.reference_data_ttl();

        let ils: Arc<dyn IlsClient> = match config.portal.ils {
            IlsKind::Symphony => Arc::new(SymphonyClient::new(
                config.symphony()?.clone(),
                config.pickup.clone(),
                ttl,
            )?),
            IlsKind::Folio => Arc::new(FolioClient::new(
                config.folio()?.clone(),
                config.pickup.clone(),
                ttl,
            )?),
        };

        let mut sources: Vec<Arc<dyn RequestSourceClient>> = Vec::new();
        if let Some(bd) = config.borrow_direct.as_ref().filter(|c| c.enabled) {
            sources.push(Arc::new(BorrowDirectClient::new(bd.clone())?));
        }
        if let Some(reshare) = config.reshare.as_ref().filter(|c| c.enabled) {
            sources.push(Arc::new(ReshareClient::new(reshare.clone())?));
        }
        if let Some(illiad) = config.illiad.as_ref().filter(|c| c.enabled) {
            sources.push(Arc::new(IlliadClient::new(illiad.clone())?));
        }

        tracing::info!(
            "🔧 Portal '{}' using {} with {} supplementary request source(s)",
            config.portal.name,
            ils.name(),
            sources.len()
        );

        Ok(Self::new(
            ils,
            RequestAggregator::new(sources),
            config.payment.clone(),
            config.catalog_url(),
        ))
    }

    pub fn ils(&self) -> &dyn IlsClient {
        self.ils.as_ref()
    }

    pub fn request_aggregator(&self) -> &RequestAggregator {
        &self.requests
    }

    pub fn payment_config(&self) -> &PaymentConfig {
        &self.payment
    }

    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    pub async fn login(&self, library_id: &str, pin: &str) -> Result<String> {
        let key = self.ils.authenticate(library_id, pin).await?;
        tracing::info!("Patron {} logged in", key);
        Ok(key)
    }

    pub async fn patron(&self, patron_key: &str) -> Result<Patron> {
        self.ils.patron_info(patron_key).await
    }

    pub async fn summary(&self, patron_key: &str) -> Result<PatronSummary> {
        let patron = self.patron(patron_key).await?;
        Ok(patron.summary(Utc::now()))
    }
}
