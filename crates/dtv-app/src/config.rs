use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use dtv_core::DisplayStyle;
use dtv_gen::{HuggingFaceConfig, IdeogramConfig, OpenAiConfig, PromptConfig};
use crate::error::AppError;

const DEFAULT_PROMPT: &str = "A realistic tropical sunset over a calm ocean, captured with a professional camera. \
The sky features soft, muted pastel tones of orange, pink, and blue, blending naturally without oversaturation. \
Gentle waves touch a smooth sandy beach, and palm trees sway lightly. The lighting is warm and subtle, \
with natural shadows for a cinematic yet true-to-life look";

const DEFAULT_NEGATIVE_PROMPT: &str = "ugly, blurry, low quality, distorted, deformed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Serve,
    /// Generate a background and place `LOGO_PATH` on it.
    Logo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    HuggingFace,
    OpenAi,
    Ideogram,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai" => Ok(Self::OpenAi),
            "ideogram" => Ok(Self::Ideogram),
            other => Err(AppError::Config(format!("unknown provider `{other}` in PROVIDERS"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TvConfig {
    pub ip: Option<String>,
    pub port: u16,
    pub client_name: String,
    pub token: Option<String>,
    pub style: DisplayStyle,
    pub settle_delay: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub prompt: Option<String>,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub port: u16,
    pub images_folder: PathBuf,
    pub logo_path: Option<PathBuf>,
    pub tv: TvConfig,
    pub generation: GenerationConfig,
    pub providers: Vec<ProviderKind>,
    pub huggingface: HuggingFaceConfig,
    pub openai: Option<OpenAiConfig>,
    pub ideogram: Option<IdeogramConfig>,
    pub prompt_model: Option<PromptConfig>,
}

impl AppConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn load() -> Result<Self, AppError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(AppError::Config(format!("failed to read .env: {e}")));
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get("RUN_MODE").as_deref() {
            None | Some("once") => RunMode::Once,
            Some("serve") => RunMode::Serve,
            Some("logo") => RunMode::Logo,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "RUN_MODE must be `once`, `serve` or `logo`, got `{other}`"
                )));
            }
        };

        let providers = get("PROVIDERS")
            .unwrap_or_else(|| "huggingface,openai".to_string())
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(ProviderKind::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        let huggingface = HuggingFaceConfig {
            space: get("HF_SPACE").unwrap_or_else(|| HuggingFaceConfig::default().space),
            base_url: get("HF_SPACE_URL"),
            token: get("HF_TOKEN"),
            steps: parse_or(&get, "HF_STEPS", 10)?,
            ..HuggingFaceConfig::default()
        };

        let openai = get("OPENAI_API_KEY").map(|key| {
            let mut config = OpenAiConfig::new(key);
            if let Some(model) = get("OPENAI_MODEL") {
                config.model = model;
            }
            if let Some(base_url) = get("OPENAI_BASE_URL") {
                config.base_url = base_url;
            }
            config
        });

        let ideogram = get("IDEOGRAM_API_KEY").map(|key| {
            let mut config = IdeogramConfig::new(key);
            if let Some(model) = get("IDEOGRAM_MODEL") {
                config.model = model;
            }
            if let Some(style) = get("IDEOGRAM_STYLE_TYPE") {
                config.style_type = style;
            }
            if let Some(magic) = get("IDEOGRAM_MAGIC_PROMPT") {
                config.magic_prompt_option = magic;
            }
            config.aspect_ratio = get("IDEOGRAM_ASPECT_RATIO");
            config
        });

        for kind in &providers {
            let missing = match kind {
                ProviderKind::OpenAi if openai.is_none() => Some("OPENAI_API_KEY"),
                ProviderKind::Ideogram if ideogram.is_none() => Some("IDEOGRAM_API_KEY"),
                _ => None,
            };
            if let Some(key) = missing {
                return Err(AppError::Config(format!("{key} is required by PROVIDERS")));
            }
        }

        let prompt_model = match (get("OPENROUTER_API_KEY"), get("OPENROUTER_MODEL")) {
            (Some(api_key), Some(model)) => Some(PromptConfig {
                api_key,
                model,
                endpoint: get("OPENROUTER_ENDPOINT")
                    .unwrap_or_else(|| "https://openrouter.ai/api/v1/chat/completions".to_string()),
                seeds: (1..=8).filter_map(|i| get(&format!("PROMPT_{i}"))).collect(),
            }),
            _ => None,
        };

        let tv = TvConfig {
            ip: get("TV_IP"),
            port: parse_or(&get, "TV_PORT", 8002)?,
            client_name: get("TV_CLIENT_NAME").unwrap_or_else(|| "DynamicTV".to_string()),
            token: get("TV_TOKEN"),
            style: DisplayStyle {
                matte: get("TV_MATTE").unwrap_or_else(|| DisplayStyle::default().matte),
                portrait_matte: get("TV_PORTRAIT_MATTE"),
            },
            settle_delay: Duration::from_secs(parse_or(&get, "TV_SETTLE_SECS", 5)?),
            timeout: Duration::from_secs(parse_or(&get, "TV_TIMEOUT_SECS", 10)?),
        };
        if tv.timeout.is_zero() {
            return Err(AppError::Config("TV_TIMEOUT_SECS must be at least 1".into()));
        }

        let logo_path = get("LOGO_PATH").map(PathBuf::from);
        if mode == RunMode::Logo && logo_path.is_none() {
            return Err(AppError::Config("RUN_MODE=logo requires LOGO_PATH".into()));
        }

        let generation = GenerationConfig {
            prompt: get("PROMPT"),
            negative_prompt: get("NEGATIVE_PROMPT").unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string()),
            width: parse_or(&get, "IMAGE_WIDTH", 2048)?,
            height: parse_or(&get, "IMAGE_HEIGHT", 1152)?,
            params: parse_params(get("GENERATION_PARAMS").as_deref())?,
        };

        Ok(Self {
            mode,
            port: parse_or(&get, "PORT", 5000)?,
            images_folder: PathBuf::from(get("IMAGES_FOLDER").unwrap_or_else(|| "images".to_string())),
            logo_path,
            tv,
            generation,
            providers,
            huggingface,
            openai,
            ideogram,
            prompt_model,
        })
    }

    pub fn default_prompt() -> &'static str {
        DEFAULT_PROMPT
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got `{raw}`"))),
        None => Ok(default),
    }
}

/// `key=value,key=value`
fn parse_params(raw: Option<&str>) -> Result<BTreeMap<String, String>, AppError> {
    let mut params = BTreeMap::new();
    for pair in raw.unwrap_or_default().split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| AppError::Config(format!("GENERATION_PARAMS entry `{pair}` is not key=value")))?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(params)
}
