use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use url::Url;
use validator::{Validate, ValidationError};

pub const DEFAULT_TARGET_URL: &str =
    "https://icp.administracionelectronica.gob.es/icpplus/index.html";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub target: TargetConfig,
    pub telegram: TelegramConfig,
    pub scraper: ScraperConfig,
    pub extraction: ExtractionConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,
    /// Element that must be present before the page counts as loaded.
    /// Pick something only the real page has; `body` matches any response.
    pub ready_selector: Option<String>,
    pub probe: bool,
    pub probe_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TARGET_URL.to_string(),
            ready_selector: Some(".meeting-availability".to_string()),
            probe: true,
            probe_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Http,
    Browser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub mode: FetchMode,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout: u64,
    pub wait_timeout_secs: u64,
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub proxy: Option<String>,
    pub headless: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Http,
            retry_attempts: 3,
            retry_delay_ms: 10_000,
            request_timeout: 30,
            wait_timeout_secs: 30,
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0 Safari/537.36"
            )
            .to_string(),
            chrome_path: None,
            proxy: None,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub entry_selector: String,
    pub city_selector: String,
    pub building_selector: String,
    pub dates_selector: String,
    pub available_marker: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            entry_selector: ".meeting-availability".to_string(),
            city_selector: ".city-name".to_string(),
            building_selector: ".building-name".to_string(),
            dates_selector: ".available-dates".to_string(),
            available_marker: "доступны".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cron expression with a seconds field.
    pub interval: String,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: "0 * * * * *".to_string(),
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub deduplicate: bool,
    pub header: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            deduplicate: true,
            header: "Доступны новые встречи:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub subscribers_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            subscribers_file: PathBuf::from("users.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,cita_watcher=debug".to_string(),
            directory: None,
            file_prefix: "cita-watcher.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BookingConfig {
    /// Falls back to `target.url` when unset.
    pub url: Option<String>,
    #[validate(custom(function = "not_blank"))]
    pub province_code: String,
    #[validate(custom(function = "not_blank"))]
    pub operation_code: String,
    #[validate(nested)]
    pub applicant: ApplicantConfig,
    #[validate(custom(function = "validate_captcha"))]
    pub captcha: CaptchaConfig,
    pub selectors: FormSelectors,
    pub page_timeout_secs: u64,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            url: None,
            province_code: String::new(),
            operation_code: String::new(),
            applicant: ApplicantConfig::default(),
            captcha: CaptchaConfig::default(),
            selectors: FormSelectors::default(),
            page_timeout_secs: 30,
            screenshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ApplicantConfig {
    #[validate(custom(function = "not_blank"))]
    pub document_id: String,
    #[validate(custom(function = "not_blank"))]
    pub full_name: String,
    #[validate(custom(function = "validate_birth_year"))]
    pub birth_year: String,
    #[validate(custom(function = "not_blank"))]
    pub country: String,
    #[validate(custom(function = "not_blank"))]
    pub phone: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Use the solving service instead of waiting for a human.
    pub automatic: bool,
    pub api_key: Option<String>,
    pub service_url: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            automatic: false,
            api_key: None,
            service_url: "https://2captcha.com".to_string(),
            timeout_secs: 300,
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSelectors {
    pub province_select: String,
    pub accept_button: String,
    pub procedure_select: String,
    pub enter_button: String,
    pub captcha_widget: String,
    pub captcha_response: String,
    pub document_input: String,
    pub name_input: String,
    pub birth_year_input: String,
    pub country_select: String,
    pub submit_button: String,
    pub request_button: String,
    pub phone_input: String,
    pub email_input: String,
    pub email_confirm_input: String,
    pub next_button: String,
    pub slot_option: String,
    pub confirm_button: String,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            province_select: "#form".to_string(),
            accept_button: "#btnAceptar".to_string(),
            procedure_select: "select[id='tramiteGrupo[0]']".to_string(),
            enter_button: "#btnEntrar".to_string(),
            captcha_widget: ".g-recaptcha".to_string(),
            captcha_response: "#g-recaptcha-response".to_string(),
            document_input: "#txtIdCitado".to_string(),
            name_input: "#txtDesCitado".to_string(),
            birth_year_input: "#txtAnnoCitado".to_string(),
            country_select: "#txtPaisNac".to_string(),
            submit_button: "#btnEnviar".to_string(),
            request_button: "#btnEnviar".to_string(),
            phone_input: "#txtTelefonoCitado".to_string(),
            email_input: "#emailUNO".to_string(),
            email_confirm_input: "#emailDOS".to_string(),
            next_button: "#btnSiguiente".to_string(),
            slot_option: "input[type='radio'][id^='cita']".to_string(),
            confirm_button: "#btnConfirmar".to_string(),
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("must not be blank".into()))
    } else {
        Ok(())
    }
}

fn validate_birth_year(year: &str) -> Result<(), ValidationError> {
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("birth_year")
            .with_message("birth year must be four digits".into()))
    }
}

fn validate_captcha(captcha: &CaptchaConfig) -> Result<(), ValidationError> {
    if captcha.automatic && captcha.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
        return Err(ValidationError::new("captcha")
            .with_message("automatic captcha solving requires an api_key".into()));
    }
    if captcha.timeout_secs == 0 {
        return Err(ValidationError::new("captcha")
            .with_message("captcha timeout must be greater than 0".into()));
    }
    Ok(())
}

/// Flat names from the single-file `config.json` layout, also read from the
/// environment.
const LEGACY_KEYS: [&str; 3] = ["TELEGRAM_BOT_TOKEN", "TARGET_URL", "CHROME_PATH"];

fn legacy_value(source: &Config, key: &str) -> Option<String> {
    source
        .get_string(key)
        .or_else(|_| source.get_string(&key.to_lowercase()))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

impl AppConfig {
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (ignored by git)
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(
                Environment::with_prefix("CITA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let legacy_keys = LEGACY_KEYS
            .iter()
            .filter_map(|key| legacy_value(&s, key).map(|value| (*key, value)))
            .collect::<Vec<_>>();

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env(|key| {
            legacy_keys
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, value)| value.clone())
                .or_else(|| env::var(key).ok())
        });
        config.validate()?;
        Ok(config)
    }

    /// Fills unset fields from the flat key names older deployments use,
    /// whether they come from a `config.json` or the environment.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.telegram.token.is_empty() {
            if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
                self.telegram.token = token;
            }
        }

        if let Some(url) = lookup("TARGET_URL") {
            if self.target.url == DEFAULT_TARGET_URL {
                self.target.url = url;
            }
        }

        if self.scraper.chrome_path.is_none() {
            self.scraper.chrome_path = lookup("CHROME_PATH");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.target.url).is_err() {
            return Err(ConfigError::Message(format!("Invalid target URL: {}", self.target.url)));
        }

        if let Some(url) = &self.booking.url {
            if Url::parse(url).is_err() {
                return Err(ConfigError::Message(format!("Invalid booking URL: {}", url)));
            }
        }

        if let Some(proxy) = &self.scraper.proxy {
            if Url::parse(proxy).is_err() {
                return Err(ConfigError::Message(format!("Invalid proxy URL: {}", proxy)));
            }
        }

        if self.scraper.retry_attempts == 0 {
            return Err(ConfigError::Message(
                "Scraper retry_attempts must be greater than 0".into(),
            ));
        }

        if self.scraper.wait_timeout_secs == 0 || self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper timeouts must be greater than 0".into()));
        }

        let selectors = [
            &self.extraction.entry_selector,
            &self.extraction.city_selector,
            &self.extraction.building_selector,
            &self.extraction.dates_selector,
        ];
        for selector in selectors.into_iter().chain(self.target.ready_selector.as_ref()) {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ConfigError::Message(format!("Invalid CSS selector: {}", selector)));
            }
        }

        if let Some(ready) = &self.target.ready_selector {
            if matches!(ready.trim(), "html" | "head" | "body") {
                return Err(ConfigError::Message(format!(
                    "target.ready_selector {} is present in every document",
                    ready
                )));
            }
        }

        if self.extraction.available_marker.trim().is_empty() {
            return Err(ConfigError::Message(
                "Extraction available_marker must not be empty".into(),
            ));
        }

        if !is_valid_cron(&self.scheduler.interval) {
            return Err(ConfigError::Message(
                "Invalid cron expression in scheduler.interval".into(),
            ));
        }

        Ok(())
    }

    /// The bot cannot start without credentials.
    pub fn validate_for_watch(&self) -> Result<(), ConfigError> {
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::Message(
                "telegram.token is required (or set TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        Ok(())
    }

    pub fn booking_url(&self) -> &str {
        self.booking.url.as_deref().unwrap_or(&self.target.url)
    }
}

/// Accepts the six or seven field form (seconds first) used by the scheduler.
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?' | '#'))
    })
}
