//! Configuração do maestro carregada a partir de `maestro.toml`.
//!
//! A struct [`MaestroConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `MAESTRO_STAGING_URL` e `MAESTRO_STAGING_API_KEY`
//! têm precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MaestroError, Result};

pub const CONFIG_FILE: &str = "maestro.toml";

/// Configuração de nível superior carregada de `maestro.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MaestroConfig {
    /// Endpoint do serviço de staging e testes.
    #[serde(default = "default_staging_url")]
    pub staging_url: String,

    /// Token bearer do serviço de staging. Vazio ativa o modo sintético.
    #[serde(default)]
    pub staging_api_key: String,

    /// Timeout, em segundos, da chamada de staging.
    #[serde(default = "default_staging_timeout_secs")]
    pub staging_timeout_secs: u64,

    /// Espera em milissegundos antes de concluir uma delegação.
    #[serde(default = "default_delegation_handoff_ms")]
    pub delegation_handoff_ms: u64,
}

fn default_staging_url() -> String {
    "https://api.embrace.io/mcp/invoke".to_string()
}

// O staging roda a suíte inteira, então espera mais: 60s.
fn default_staging_timeout_secs() -> u64 {
    60
}

fn default_delegation_handoff_ms() -> u64 {
    2000
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            staging_url: default_staging_url(),
            staging_api_key: String::new(),
            staging_timeout_secs: default_staging_timeout_secs(),
            delegation_handoff_ms: default_delegation_handoff_ms(),
        }
    }
}

impl MaestroConfig {
    /// Carrega a configuração de `maestro.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito e aplica o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<MaestroConfig>(&contents)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Rejeita valores que impediriam a chamada de staging.
    pub fn validate(&self) -> Result<()> {
        if !(self.staging_url.starts_with("http://") || self.staging_url.starts_with("https://")) {
            return Err(MaestroError::Config(format!(
                "staging_url must be an http(s) URL, got '{}'",
                self.staging_url
            )));
        }
        if self.staging_timeout_secs == 0 {
            return Err(MaestroError::Config(
                "staging_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    // Variáveis de ambiente não vazias sobrescrevem o arquivo.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MAESTRO_STAGING_URL")
            && !url.is_empty()
        {
            self.staging_url = url;
        }
        if let Some(key) = lookup("MAESTRO_STAGING_API_KEY")
            && !key.is_empty()
        {
            self.staging_api_key = key;
        }
    }

    pub fn staging_timeout(&self) -> Duration {
        Duration::from_secs(self.staging_timeout_secs)
    }

    pub fn delegation_handoff(&self) -> Duration {
        Duration::from_millis(self.delegation_handoff_ms)
    }
}
