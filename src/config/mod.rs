mod types;

pub use types::*;

use crate::{Error, Result, logging::LogLevel};
use std::{collections::BTreeMap, env, fmt::Display, path::PathBuf, str::FromStr};
use tracing::debug;

/// Loads deployment settings from the process environment.
pub fn load() -> Result<Settings> {
    debug!("Loading deployment settings from environment");
    Settings::from_env()
}

/// Loads the settings used by the endpoint client binaries.
pub fn load_client() -> Result<ClientSettings> {
    debug!("Loading client settings from environment");
    ClientSettings::from_env()
}

/// Loads the settings used inside the hosted container.
pub fn load_handler() -> Result<HandlerSettings> {
    debug!("Loading handler settings from environment");
    HandlerSettings::from_env()
}

impl LogLevel for Settings {
    fn log_level(&self) -> &str {
        &self.logs.level
    }
}

impl LogLevel for ClientSettings {
    fn log_level(&self) -> &str {
        &self.logs.level
    }
}

impl LogLevel for HandlerSettings {
    fn log_level(&self) -> &str {
        &self.logs.level
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Typed access to a key/value source. Blank values count as unset.
struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| Error::config(format!("{} is not set", key)))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::config(format!("Invalid {}: '{}' ({})", key, raw, e))),
            None => Ok(default),
        }
    }

    fn flag_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.optional(key) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::config(format!(
                    "Invalid {}: '{}' (expected true or false)",
                    key, raw
                ))),
            },
            None => Ok(default),
        }
    }

    fn quantization(&self) -> Result<QuantizationConfig> {
        let defaults = QuantizationConfig::default();
        Ok(QuantizationConfig {
            load_in_4bit: self.flag_or("QUANT_LOAD_IN_4BIT", defaults.load_in_4bit)?,
            double_quant: self.flag_or("QUANT_DOUBLE_QUANT", defaults.double_quant)?,
            quant_type: match self.optional("QUANT_TYPE") {
                Some(raw) => raw.parse()?,
                None => defaults.quant_type,
            },
            compute_dtype: match self.optional("QUANT_COMPUTE_DTYPE") {
                Some(raw) => raw.parse()?,
                None => defaults.compute_dtype,
            },
            attention: match self.optional("ATTN_IMPLEMENTATION") {
                Some(raw) => raw.parse()?,
                None => defaults.attention,
            },
        })
    }

    fn logs(&self) -> LogsConfig {
        LogsConfig {
            level: self
                .optional("LOG_LEVEL")
                .unwrap_or_else(default_log_level),
        }
    }

    fn endpoint_info_path(&self) -> PathBuf {
        self.optional("ENDPOINT_INFO_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_endpoint_info_path)
    }
}

fn validate_limits(max_context_length: usize, max_new_tokens: usize) -> Result<()> {
    if max_context_length == 0 {
        return Err(Error::config("MAX_CONTEXT_LENGTH must be greater than zero"));
    }
    if max_new_tokens == 0 {
        return Err(Error::config("MAX_NEW_TOKENS must be greater than zero"));
    }
    if max_new_tokens >= max_context_length {
        return Err(Error::config(format!(
            "MAX_NEW_TOKENS ({}) must be smaller than MAX_CONTEXT_LENGTH ({})",
            max_new_tokens, max_context_length
        )));
    }
    Ok(())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };

        let model_id = src.required("MODEL_ID")?;
        let role = src.required("SAGEMAKER_ROLE_NAME")?;

        let max_context_length =
            src.parse_or("MAX_CONTEXT_LENGTH", default_max_context_length())?;
        let max_new_tokens = src.parse_or("MAX_NEW_TOKENS", default_max_new_tokens())?;
        validate_limits(max_context_length, max_new_tokens)?;

        let server_timeout_secs = src.parse_or("MODEL_SERVER_TIMEOUT", default_server_timeout())?;
        if server_timeout_secs == 0 {
            return Err(Error::config("MODEL_SERVER_TIMEOUT must be greater than zero"));
        }

        let instance_count = src.parse_or("INSTANCE_COUNT", default_instance_count())?;
        if instance_count == 0 {
            return Err(Error::config("INSTANCE_COUNT must be at least 1"));
        }

        Ok(Self {
            region: src.optional("AWS_REGION").unwrap_or_else(default_region),
            role,
            model_id,
            instance_type: src
                .optional("INSTANCE_TYPE")
                .unwrap_or_else(default_instance_type),
            instance_count,
            server_timeout_secs,
            max_context_length,
            max_new_tokens,
            endpoint_name: src.optional("ENDPOINT_NAME"),
            image_uri: src.optional("IMAGE_URI"),
            model_data_url: src.optional("MODEL_DATA_URL"),
            endpoint_info_path: src.endpoint_info_path(),
            quantization: src.quantization()?,
            logs: src.logs(),
        })
    }

    /// Environment forwarded into the hosted container.
    pub fn container_environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("HF_MODEL_ID".to_string(), self.model_id.clone());
        env.insert("HF_TASK".to_string(), "text-generation".to_string());
        env.insert(
            "SAGEMAKER_MODEL_SERVER_TIMEOUT".to_string(),
            self.server_timeout_secs.to_string(),
        );
        env.insert("SAGEMAKER_MODEL_SERVER_WORKERS".to_string(), "1".to_string());
        env.insert(
            "MAX_CONTEXT_LENGTH".to_string(),
            self.max_context_length.to_string(),
        );
        env.insert("MAX_NEW_TOKENS".to_string(), self.max_new_tokens.to_string());
        env.insert(
            "MAX_INPUT_TOKENS".to_string(),
            (self.max_context_length - self.max_new_tokens).to_string(),
        );
        env.insert(
            "MAX_TOTAL_TOKENS".to_string(),
            self.max_context_length.to_string(),
        );
        env.insert("SM_NUM_GPUS".to_string(), "1".to_string());
        env.insert("TRUST_REMOTE_CODE".to_string(), "true".to_string());
        env.insert(
            "PYTORCH_CUDA_ALLOC_CONF".to_string(),
            "expandable_segments:True".to_string(),
        );
        env.insert("LOG_LEVEL".to_string(), self.logs.level.clone());
        env.extend(self.quantization.container_environment());
        env
    }

    pub fn client(&self) -> ClientSettings {
        ClientSettings {
            region: self.region.clone(),
            endpoint_name: self.endpoint_name.clone(),
            endpoint_info_path: self.endpoint_info_path.clone(),
            confirm_delete_all: false,
            logs: self.logs.clone(),
        }
    }
}

impl ClientSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };
        Ok(Self {
            region: src.optional("AWS_REGION").unwrap_or_else(default_region),
            endpoint_name: src.optional("ENDPOINT_NAME"),
            endpoint_info_path: src.endpoint_info_path(),
            confirm_delete_all: src.flag_or("CONFIRM_DELETE_ALL", false)?,
            logs: src.logs(),
        })
    }
}

impl HandlerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };

        let model_id = match src.optional("HF_MODEL_ID") {
            Some(id) => id,
            None => src.required("MODEL_ID")?,
        };

        let max_context_length =
            src.parse_or("MAX_CONTEXT_LENGTH", default_max_context_length())?;
        let max_new_tokens = src.parse_or("MAX_NEW_TOKENS", default_max_new_tokens())?;
        validate_limits(max_context_length, max_new_tokens)?;

        let backend = match src.optional("HANDLER_BACKEND").as_deref() {
            None | Some("tgi") => BackendConfig::Tgi {
                url: src.optional("TGI_URL").unwrap_or_else(default_tgi_url),
            },
            Some("stub") => BackendConfig::Stub,
            Some(other) => {
                return Err(Error::config(format!(
                    "Invalid HANDLER_BACKEND: '{}'. Valid values: tgi, stub",
                    other
                )));
            }
        };

        Ok(Self {
            model_id,
            max_context_length,
            max_new_tokens,
            quantization: src.quantization()?,
            backend,
            launcher: src.optional("TGI_LAUNCHER"),
            gpu_count: src.parse_or("SM_NUM_GPUS", 0)?,
            host: src.optional("HANDLER_HOST").unwrap_or_else(default_host),
            port: src.parse_or("SAGEMAKER_BIND_TO_PORT", default_port())?,
            logs: src.logs(),
        })
    }
}
