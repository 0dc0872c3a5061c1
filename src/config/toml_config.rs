use crate::domain::pickup::PickupLibraries;
use crate::utils::error::{PortalError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub portal: PortalSection,
    pub symphony: Option<SymphonyConfig>,
    pub folio: Option<FolioConfig>,
    pub payment: PaymentConfig,
    pub borrow_direct: Option<BorrowDirectConfig>,
    pub reshare: Option<ReshareConfig>,
    pub illiad: Option<IlliadConfig>,
    #[serde(default)]
    pub pickup: PickupLibraries,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IlsKind {
    Symphony,
    Folio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSection {
    pub name: String,
    pub ils: IlsKind,
    pub catalog_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymphonyConfig {
    pub base_url: String,
    pub client_id: String,
    pub app_id: Option<String>,
    pub username: String,
    pub password: String,
    pub timeout_seconds: Option<u64>,
    /// Item types whose loans never renew.
    #[serde(default)]
    pub non_renewable_item_types: Vec<String>,
    /// Base of the legacy web services used for payment history.
    pub legacy_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioConfig {
    pub okapi_url: String,
    pub graphql_url: String,
    pub tenant: String,
    pub username: String,
    pub password: String,
    pub cancel_reason_id: Option<String>,
    pub payment_service_point_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub form_url: String,
    pub access_key: String,
    pub profile_id: String,
    pub secret_key: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowDirectConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub library_symbol: String,
    #[serde(default = "default_partnership")]
    pub partnership_id: String,
    pub manage_url: Option<String>,
}

fn default_partnership() -> String {
    "BD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshareConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: String,
    pub tenant: String,
    pub username: String,
    pub password: String,
    pub manage_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IlliadConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub manage_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl")]
    pub reference_data_ttl_seconds: u64,
}

fn default_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            reference_data_ttl_seconds: default_ttl(),
        }
    }
}

fn env_var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").unwrap())
}

impl PortalConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PortalError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| PortalError::ConfigValidation {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn symphony(&self) -> Result<&SymphonyConfig> {
        validation::validate_required_field("symphony", &self.symphony)
    }

    pub fn folio(&self) -> Result<&FolioConfig> {
        validation::validate_required_field("folio", &self.folio)
    }

    pub fn catalog_url(&self) -> &str {
        self.portal
            .catalog_url
            .as_deref()
            .unwrap_or("https://searchworks.stanford.edu")
    }

    pub fn reference_data_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache.reference_data_ttl_seconds)
    }

    pub fn validate_config(&self) -> Result<()> {
        match self.portal.ils {
            IlsKind::Symphony => {
                let symphony = self.symphony()?;
                validation::validate_url("symphony.base_url", &symphony.base_url)?;
                validation::validate_non_empty_string("symphony.client_id", &symphony.client_id)?;
                if let Some(legacy) = &symphony.legacy_base_url {
                    validation::validate_url("symphony.legacy_base_url", legacy)?;
                }
            }
            IlsKind::Folio => {
                let folio = self.folio()?;
                validation::validate_url("folio.okapi_url", &folio.okapi_url)?;
                validation::validate_url("folio.graphql_url", &folio.graphql_url)?;
                validation::validate_non_empty_string("folio.tenant", &folio.tenant)?;
            }
        }

        validation::validate_url("payment.form_url", &self.payment.form_url)?;
        validation::validate_non_empty_string("payment.access_key", &self.payment.access_key)?;
        validation::validate_non_empty_string("payment.profile_id", &self.payment.profile_id)?;
        if self.payment.secret_key.contains("${") {
            return Err(PortalError::ConfigValidation {
                field: "payment.secret_key".to_string(),
                message: "secret key environment variable is not set".to_string(),
            });
        }
        validation::validate_non_empty_string("payment.secret_key", &self.payment.secret_key)?;

        if let Some(bd) = self.borrow_direct.as_ref().filter(|c| c.enabled) {
            validation::validate_url("borrow_direct.base_url", &bd.base_url)?;
        }
        if let Some(reshare) = self.reshare.as_ref().filter(|c| c.enabled) {
            validation::validate_url("reshare.base_url", &reshare.base_url)?;
        }
        if let Some(illiad) = self.illiad.as_ref().filter(|c| c.enabled) {
            validation::validate_url("illiad.base_url", &illiad.base_url)?;
        }

        for code in self.pickup.default.iter().chain(self.pickup.libraries.keys()) {
            validation::validate_library_code("pickup", code)?;
        }

        validation::validate_range(
            "cache.reference_data_ttl_seconds",
            self.cache.reference_data_ttl_seconds,
            1,
            86_400,
        )?;

        Ok(())
    }
}

impl Validate for PortalConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
