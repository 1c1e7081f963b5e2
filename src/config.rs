//! Configuração do TATKAL carregada a partir de `tatkal.toml`.
//!
//! A struct [`TatkalConfig`] contém todos os parâmetros do motor: cadências
//! dos laços, limites de retentativa, a tabela de landmarks e a lista
//! ordenada de regras de inferência do observador.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `TATKAL_CAPTCHA_ENDPOINT` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TatkalError;
use crate::state_machine::{DEFAULT_LOG_CAPACITY, State};
use crate::surface::{LandmarkSet, names};

/// Configuração de nível superior carregada de `tatkal.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TatkalConfig {
    /// Página inicial de busca do site de reservas.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Diretório onde cada sessão publica `bot_<id>_status.json` e `bot_<id>.log`.
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub observer: ObserverSettings,

    /// Sobrescreve entradas da tabela padrão de landmarks.
    #[serde(default, deserialize_with = "overlay_landmarks")]
    pub landmarks: LandmarkSet,

    #[serde(default)]
    pub captcha: CaptchaSettings,

    #[serde(default)]
    pub clock: ClockSettings,
}

/// Cadências e limites do motor reativo. Tempos em milissegundos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub observer_tick_ms: u64,
    pub actor_tick_ms: u64,
    /// Espera máxima de uma consulta de visibilidade do observador.
    pub probe_timeout_ms: u64,
    pub click_timeout_ms: u64,
    /// Pausa após uma falha de handler, antes de voltar a agir.
    pub recovery_pause_ms: u64,
    /// Falhas consecutivas de handler antes de FATAL_ERROR.
    pub recovery_limit: u32,
    /// Tempo parado no mesmo estado até pedir nova inferência (0 desliga).
    pub stall_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    /// Carência antes de liberar o navegador, para respostas em trânsito.
    pub release_grace_ms: u64,
    /// Intervalo entre lançamentos de sessões da frota.
    pub stagger_ms: u64,
    pub captcha_attempt_limit: u32,
    pub approval_polls: u32,
    pub approval_interval_ms: u64,
    pub login_settle_ms: u64,
    pub quota_settle_ms: u64,
    pub log_capacity: usize,
    /// Deslocamento, em segundos, sobre a abertura da janela de reserva.
    pub window_shift_secs: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            observer_tick_ms: 200,
            actor_tick_ms: 200,
            probe_timeout_ms: 100,
            click_timeout_ms: 30_000,
            recovery_pause_ms: 3_000,
            recovery_limit: 10,
            stall_timeout_ms: 30_000,
            stop_timeout_ms: 5_000,
            release_grace_ms: 10_000,
            stagger_ms: 2_000,
            captcha_attempt_limit: 5,
            approval_polls: 24,
            approval_interval_ms: 5_000,
            login_settle_ms: 2_000,
            quota_settle_ms: 1_000,
            log_capacity: DEFAULT_LOG_CAPACITY,
            window_shift_secs: 0,
        }
    }
}

impl EngineSettings {
    pub fn observer_tick(&self) -> Duration {
        Duration::from_millis(self.observer_tick_ms)
    }

    pub fn actor_tick(&self) -> Duration {
        Duration::from_millis(self.actor_tick_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn click_timeout(&self) -> Duration {
        Duration::from_millis(self.click_timeout_ms)
    }

    pub fn recovery_pause(&self) -> Duration {
        Duration::from_millis(self.recovery_pause_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_ms > 0).then(|| Duration::from_millis(self.stall_timeout_ms))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn release_grace(&self) -> Duration {
        Duration::from_millis(self.release_grace_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn approval_interval(&self) -> Duration {
        Duration::from_millis(self.approval_interval_ms)
    }

    pub fn login_settle(&self) -> Duration {
        Duration::from_millis(self.login_settle_ms)
    }

    pub fn quota_settle(&self) -> Duration {
        Duration::from_millis(self.quota_settle_ms)
    }
}

/// Uma entrada da lista de precedência: landmark visível → estado inferido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkRule {
    pub landmark: String,
    pub state: State,
    /// Não sobrescreve um estado mais refinado da mesma família.
    #[serde(default = "default_true")]
    pub hold_family: bool,
    /// Registra um alerta de logout inesperado ao casar.
    #[serde(default)]
    pub watchdog: bool,
}

impl LandmarkRule {
    pub fn new(landmark: &str, state: State) -> Self {
        Self {
            landmark: landmark.to_string(),
            state,
            hold_family: true,
            watchdog: false,
        }
    }

    pub fn watchdog(mut self) -> Self {
        self.watchdog = true;
        self
    }
}

/// Regras do observador, da mais profunda para a mais genérica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverSettings {
    #[serde(default = "default_rules")]
    pub rules: Vec<LandmarkRule>,
    /// Landmarks de obstruções transitórias que o observador fecha.
    #[serde(default = "default_popups")]
    pub popups: Vec<String>,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            popups: default_popups(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaSettings {
    /// Endpoint HTTP do serviço de resolução de captcha.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default = "default_captcha_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CaptchaSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            health_url: None,
            timeout_secs: default_captcha_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSettings {
    /// URL que devolve o horário do servidor em milissegundos epoch.
    #[serde(default = "default_server_time_url")]
    pub server_time_url: String,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            server_time_url: default_server_time_url(),
        }
    }
}

// Valor padrão para a página inicial.
fn default_site_url() -> String {
    "https://www.irctc.co.in/nget/train-search".to_string()
}

// Valor padrão para o diretório de status: "logs".
fn default_status_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

// Valor padrão para o timeout do serviço de captcha: 15s.
fn default_captcha_timeout_secs() -> u64 {
    15
}

fn default_server_time_url() -> String {
    "https://www.irctc.co.in/eticketing/services/committable/bookingAvailability.ping".to_string()
}

// Ordem importa: a primeira regra visível vence.
fn default_rules() -> Vec<LandmarkRule> {
    vec![
        LandmarkRule::new(names::USERNAME_INPUT, State::LoginStarted),
        LandmarkRule::new(names::UPI_OPTION, State::PaymentPage),
        LandmarkRule::new(names::REVIEW_CAPTCHA_INPUT, State::ReviewPage),
        LandmarkRule::new(names::PASSENGER_FORM, State::PassengerDetailsPage),
        LandmarkRule::new(names::TRAIN_LIST_ITEM, State::TrainListPage),
        LandmarkRule::new(names::LOGOUT_BUTTON, State::AtDashboard),
        LandmarkRule::new(names::LOGIN_BUTTON_HOME, State::LoggedOut).watchdog(),
    ]
}

fn default_popups() -> Vec<String> {
    vec![names::AADHAAR_POPUP.to_string(), names::DISHA_BANNER.to_string()]
}

fn overlay_landmarks<'de, D>(deserializer: D) -> Result<LandmarkSet, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = LandmarkSet::deserialize(deserializer)?;
    let mut set = LandmarkSet::default();
    set.merge(overrides);
    Ok(set)
}

impl Default for TatkalConfig {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            status_dir: default_status_dir(),
            engine: EngineSettings::default(),
            observer: ObserverSettings::default(),
            landmarks: LandmarkSet::default(),
            captcha: CaptchaSettings::default(),
            clock: ClockSettings::default(),
        }
    }
}

impl TatkalConfig {
    /// Carrega a configuração do caminho dado, ou de `tatkal.toml` no
    /// diretório atual. Usa valores padrão se nenhum arquivo existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new("tatkal.toml");
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(endpoint) = std::env::var("TATKAL_CAPTCHA_ENDPOINT")
            && !endpoint.is_empty()
        {
            config.captcha.endpoint = Some(endpoint);
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<TatkalConfig>(&contents).map_err(TatkalError::from)?;
        Ok(config)
    }

    /// Verifica se regras e popups apontam para landmarks conhecidos.
    pub fn validate(&self) -> Result<(), TatkalError> {
        if self.observer.rules.is_empty() {
            return Err(TatkalError::Config("observer.rules must not be empty".into()));
        }
        let referenced = self
            .observer
            .rules
            .iter()
            .map(|rule| rule.landmark.as_str())
            .chain(self.observer.popups.iter().map(String::as_str));
        for name in referenced {
            if !self.landmarks.contains(name) {
                return Err(TatkalError::Config(format!("unknown landmark '{name}'")));
            }
        }
        if self.engine.observer_tick_ms == 0 || self.engine.actor_tick_ms == 0 {
            return Err(TatkalError::Config("tick intervals must be positive".into()));
        }
        if self.engine.captcha_attempt_limit == 0 {
            return Err(TatkalError::Config("captcha_attempt_limit must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Locator;

    #[test]
    fn default_config_values() {
        let config = TatkalConfig::default();
        assert_eq!(config.engine.observer_tick_ms, 200);
        assert_eq!(config.engine.captcha_attempt_limit, 5);
        assert_eq!(config.engine.approval_polls, 24);
        assert_eq!(config.engine.approval_interval_ms, 5_000);
        assert_eq!(config.engine.log_capacity, 30);
        assert_eq!(config.status_dir, PathBuf::from("logs"));
        assert!(config.captcha.endpoint.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn default_rules_go_deepest_first() {
        let rules = default_rules();
        assert_eq!(rules.first().unwrap().state, State::LoginStarted);
        assert_eq!(rules.last().unwrap().state, State::LoggedOut);
        assert!(rules.last().unwrap().watchdog);
        let payment = rules.iter().position(|r| r.state == State::PaymentPage).unwrap();
        let dashboard = rules.iter().position(|r| r.state == State::AtDashboard).unwrap();
        assert!(payment < dashboard);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            status_dir = "/tmp/tatkal"

            [engine]
            stagger_ms = 500
            recovery_limit = 3

            [landmarks]
            pnr_banner = { xpath = "//h3[contains(., 'PNR')]" }
        "#;
        let config: TatkalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.stagger_ms, 500);
        assert_eq!(config.engine.recovery_limit, 3);
        assert_eq!(config.engine.observer_tick_ms, 200);
        assert_eq!(config.status_dir, PathBuf::from("/tmp/tatkal"));
        assert_eq!(
            config.landmarks.get(names::PNR_BANNER).unwrap().locator,
            Locator::Xpath("//h3[contains(., 'PNR')]".into())
        );
        // Entradas não sobrescritas continuam presentes.
        assert!(config.landmarks.contains(names::USERNAME_INPUT));
        assert_eq!(config.observer.rules, default_rules());
    }

    #[test]
    fn rule_table_from_toml() {
        let toml_str = r#"
            [[observer.rules]]
            landmark = "upi_option"
            state = "PAYMENT_PAGE"

            [[observer.rules]]
            landmark = "login_button_home"
            state = "LOGGED_OUT"
            hold_family = false
            watchdog = true
        "#;
        let config: TatkalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.observer.rules.len(), 2);
        assert!(config.observer.rules[0].hold_family);
        assert!(!config.observer.rules[1].hold_family);
        assert!(config.observer.rules[1].watchdog);
        assert_eq!(config.observer.popups, default_popups());
        config.validate().unwrap();
    }

    #[test]
    fn validation_rejects_unknown_landmarks() {
        let mut config = TatkalConfig::default();
        config
            .observer
            .rules
            .push(LandmarkRule::new("mystery_banner", State::Unknown));
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Config error: unknown landmark 'mystery_banner'");
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[engine]\nactor_tick_ms = 50\n").unwrap();
        let config = TatkalConfig::load(Some(&path)).unwrap();
        assert_eq!(config.engine.actor_tick_ms, 50);
    }

    #[test]
    fn load_fails_on_missing_explicit_file() {
        assert!(TatkalConfig::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }

    #[test]
    fn stall_timeout_zero_disables() {
        let mut engine = EngineSettings::default();
        assert_eq!(engine.stall_timeout(), Some(Duration::from_secs(30)));
        engine.stall_timeout_ms = 0;
        assert_eq!(engine.stall_timeout(), None);
    }
}
