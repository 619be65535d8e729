//! Configuration system (layered: defaults > config file > env > code).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::backend::http::csrf_from_cookie;
use crate::error::RealtimeError;
use crate::realtime::session::{Modality, ModalitySet};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
pub const DEFAULT_VOICE: &str = "verse";
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_AUTO_UPDATE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MESSAGE_GAP: Duration = Duration::from_millis(100);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONFIG_FILE_NAME: &str = "config.toml";
const SUBTITLE_INSTRUCTIONS: &str = "Please respond in Japanese.";

/// Front-end flavour. The variants disagree on how server defaults and local
/// settings interact, so each keeps its own behavior.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClientVariant {
    /// Plain text/voice chat.
    #[default]
    Chat,
    /// Voice translator with editable voice, instructions and modalities.
    Translator,
    /// Live subtitles; instructions are fixed when the token is minted.
    Subtitle,
}

impl ClientVariant {
    /// Backend app path segment serving this variant.
    pub fn default_app(self) -> &'static str {
        match self {
            Self::Chat => "openai_rtc",
            Self::Translator => "translator",
            Self::Subtitle => "subtitle",
        }
    }

    /// Instructions a fresh config starts with.
    pub fn default_instructions(self) -> &'static str {
        match self {
            Self::Subtitle => SUBTITLE_INSTRUCTIONS,
            _ => "",
        }
    }

    /// Whether server default instructions fill in empty local ones.
    pub fn adopts_server_instructions(self) -> bool {
        matches!(self, Self::Translator)
    }

    /// Whether `session.created` triggers one automatic `session.update`.
    pub fn auto_updates_session(self) -> bool {
        matches!(self, Self::Translator)
    }

    /// Whether the token request is a POST carrying the instructions.
    pub fn posts_instructions(self) -> bool {
        matches!(self, Self::Subtitle)
    }

    /// Whether protocol events (`session.*`, `response.done`) go to the chat log.
    pub fn shows_protocol_events(self) -> bool {
        !matches!(self, Self::Subtitle)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    /// Backend app segment; `None` uses the variant's default.
    pub app: Option<String>,
    pub realtime_url: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: ModalitySet,
    pub variant: ClientVariant,
    pub update_timeout: Duration,
    pub auto_update_delay: Duration,
    pub message_gap: Duration,
    pub request_timeout: Duration,
    /// Bound on microphone acquisition; `None` waits for the device.
    pub media_timeout: Option<Duration>,
    pub csrf_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_variant(ClientVariant::Chat)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    backend_url: Option<String>,
    app: Option<String>,
    realtime_url: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    instructions: Option<String>,
    modalities: Option<Vec<Modality>>,
    variant: Option<ClientVariant>,
    update_timeout_ms: Option<u64>,
    auto_update_delay_ms: Option<u64>,
    message_gap_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    media_timeout_ms: Option<u64>,
    csrf_token: Option<String>,
}

impl ClientConfig {
    /// Defaults for one front-end flavour.
    pub fn for_variant(variant: ClientVariant) -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            app: None,
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: variant.default_instructions().to_string(),
            modalities: ModalitySet::text(),
            variant,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            auto_update_delay: DEFAULT_AUTO_UPDATE_DELAY,
            message_gap: DEFAULT_MESSAGE_GAP,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            media_timeout: None,
            csrf_token: None,
        }
    }

    /// Load defaults, then the config file (`RTC_CONFIG` or the platform
    /// default path, if present), then `RTC_*` environment variables.
    pub fn from_env() -> Result<Self, RealtimeError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let path = std::env::var_os("RTC_CONFIG")
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .filter(|path| path.exists());
        let mut config = match path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML file.
    pub fn load(path: &Path) -> Result<Self, RealtimeError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|error| match error {
            RealtimeError::Configuration(message) => {
                RealtimeError::Configuration(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RealtimeError> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|error| RealtimeError::Configuration(error.message().to_string()))?;
        let mut config = Self::for_variant(file.variant.unwrap_or_default());
        config.apply_file(file);
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/rtc-session/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rtc-session")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(value) = file.backend_url {
            self.backend_url = value;
        }
        if let Some(value) = file.app {
            self.app = Some(value);
        }
        if let Some(value) = file.realtime_url {
            self.realtime_url = value;
        }
        if let Some(value) = file.model {
            self.model = value;
        }
        if let Some(value) = file.voice {
            self.voice = value;
        }
        if let Some(value) = file.instructions {
            self.instructions = value;
        }
        if let Some(value) = file.modalities {
            self.modalities = value.into_iter().collect();
        }
        if let Some(ms) = file.update_timeout_ms {
            self.update_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.auto_update_delay_ms {
            self.auto_update_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.message_gap_ms {
            self.message_gap = Duration::from_millis(ms);
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.media_timeout_ms {
            self.media_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if file.csrf_token.is_some() {
            self.csrf_token = file.csrf_token;
        }
    }

    /// Overlay `RTC_*` variables read through `lookup`.
    ///
    /// Switching the variant also swaps its default instructions, unless the
    /// instructions were already customised.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), RealtimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("RTC_VARIANT") {
            let variant: ClientVariant = value.parse().map_err(|_| {
                RealtimeError::Configuration(format!("Unknown RTC_VARIANT: {value}"))
            })?;
            if variant != self.variant && self.instructions == self.variant.default_instructions()
            {
                self.instructions = variant.default_instructions().to_string();
            }
            self.variant = variant;
        }
        if let Some(value) = lookup("RTC_BACKEND_URL") {
            self.backend_url = value;
        }
        if let Some(value) = lookup("RTC_APP") {
            self.app = Some(value);
        }
        if let Some(value) = lookup("RTC_REALTIME_URL") {
            self.realtime_url = value;
        }
        if let Some(value) = lookup("RTC_MODEL") {
            self.model = value;
        }
        if let Some(value) = lookup("RTC_VOICE") {
            self.voice = value;
        }
        if let Some(value) = lookup("RTC_INSTRUCTIONS") {
            self.instructions = value;
        }
        if let Some(value) = lookup("RTC_MODALITIES") {
            self.modalities = ModalitySet::parse_list(&value).map_err(|_| {
                RealtimeError::Configuration(format!("Invalid RTC_MODALITIES: {value}"))
            })?;
        }
        if let Some(ms) = env_millis(&lookup, "RTC_UPDATE_TIMEOUT_MS")? {
            self.update_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_millis(&lookup, "RTC_AUTO_UPDATE_DELAY_MS")? {
            self.auto_update_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_millis(&lookup, "RTC_MESSAGE_GAP_MS")? {
            self.message_gap = Duration::from_millis(ms);
        }
        if let Some(ms) = env_millis(&lookup, "RTC_REQUEST_TIMEOUT_MS")? {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_millis(&lookup, "RTC_MEDIA_TIMEOUT_MS")? {
            self.media_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(value) = lookup("RTC_CSRF_TOKEN") {
            self.csrf_token = Some(value);
        }
        if self.csrf_token.is_none() {
            if let Some(cookie) = lookup("RTC_COOKIE") {
                self.csrf_token = csrf_from_cookie(&cookie);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RealtimeError> {
        for (name, value) in [
            ("backend_url", &self.backend_url),
            ("realtime_url", &self.realtime_url),
            ("model", &self.model),
        ] {
            if value.trim().is_empty() {
                return Err(RealtimeError::Configuration(format!("{name} cannot be empty")));
            }
        }
        if self.update_timeout.is_zero() {
            return Err(RealtimeError::Configuration(
                "update_timeout must be greater than zero".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(RealtimeError::Configuration(
                "request_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Backend app segment in use.
    pub fn app(&self) -> &str {
        self.app
            .as_deref()
            .unwrap_or_else(|| self.variant.default_app())
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_modalities(mut self, modalities: ModalitySet) -> Self {
        self.modalities = modalities;
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }
}

fn env_millis<F>(lookup: &F, key: &str) -> Result<Option<u64>, RealtimeError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| RealtimeError::Configuration(format!("Invalid {key}: {value}")))
        })
        .transpose()
}
