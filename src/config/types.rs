use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use crate::Error;

/// Everything the deployment driver needs, read once at process start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    /// Role name or full role ARN.
    pub role: String,
    pub model_id: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub server_timeout_secs: u64,
    pub max_context_length: usize,
    pub max_new_tokens: usize,
    pub endpoint_name: Option<String>,
    pub image_uri: Option<String>,
    pub model_data_url: Option<String>,
    pub endpoint_info_path: PathBuf,
    pub quantization: QuantizationConfig,
    pub logs: LogsConfig,
}

/// The subset used by the test / status / logs / cleanup binaries.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub region: String,
    pub endpoint_name: Option<String>,
    pub endpoint_info_path: PathBuf,
    /// Must be set before `cleanup-all` deletes anything.
    pub confirm_delete_all: bool,
    pub logs: LogsConfig,
}

/// Settings read inside the hosted container by the `serve` binary.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub model_id: String,
    pub max_context_length: usize,
    pub max_new_tokens: usize,
    pub quantization: QuantizationConfig,
    pub backend: BackendConfig,
    /// Program started as the generation backend before the server binds.
    /// `None` expects the backend to be running already.
    pub launcher: Option<String>,
    pub gpu_count: u32,
    pub host: String,
    pub port: u16,
    pub logs: LogsConfig,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// A text-generation-inference server running next to the handler.
    Tgi { url: String },
    /// Deterministic in-process generator.
    Stub,
}

#[derive(Debug, Clone)]
pub struct LogsConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationConfig {
    pub load_in_4bit: bool,
    pub double_quant: bool,
    pub quant_type: QuantType,
    pub compute_dtype: ComputeDtype,
    pub attention: AttentionImpl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantType {
    #[default]
    Nf4,
    Fp4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeDtype {
    #[default]
    Bfloat16,
    Float16,
    Float32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttentionImpl {
    FlashAttention2,
    Eager,
    /// Flash attention when a GPU is visible, eager otherwise.
    #[default]
    Auto,
}

impl QuantizationConfig {
    /// Value of the text-generation-inference `--quantize` option, if any.
    pub fn quantize_flag(&self) -> Option<&'static str> {
        if !self.load_in_4bit {
            return None;
        }
        Some(match self.quant_type {
            QuantType::Nf4 => "bitsandbytes-nf4",
            QuantType::Fp4 => "bitsandbytes-fp4",
        })
    }

    /// Arguments appended to the text-generation-inference launcher command line.
    pub fn launcher_args(&self, gpu_available: bool) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(flag) = self.quantize_flag() {
            args.push("--quantize".to_string());
            args.push(flag.to_string());
        } else {
            args.push("--dtype".to_string());
            args.push(self.compute_dtype.to_string());
        }
        if self.attention.resolve(gpu_available) == AttentionImpl::Eager {
            args.push("--disable-custom-kernels".to_string());
        }
        args
    }

    /// Environment entries forwarded into the hosted container.
    pub fn container_environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("QUANT_LOAD_IN_4BIT".to_string(), self.load_in_4bit.to_string());
        env.insert("QUANT_DOUBLE_QUANT".to_string(), self.double_quant.to_string());
        env.insert("QUANT_TYPE".to_string(), self.quant_type.to_string());
        env.insert(
            "QUANT_COMPUTE_DTYPE".to_string(),
            self.compute_dtype.to_string(),
        );
        env.insert("ATTN_IMPLEMENTATION".to_string(), self.attention.to_string());
        if let Some(flag) = self.quantize_flag() {
            env.insert("QUANTIZE".to_string(), flag.to_string());
        }
        match self.attention {
            AttentionImpl::FlashAttention2 => {
                env.insert("USE_FLASH_ATTENTION".to_string(), "true".to_string());
            }
            AttentionImpl::Eager => {
                env.insert("USE_FLASH_ATTENTION".to_string(), "false".to_string());
            }
            AttentionImpl::Auto => {}
        }
        env
    }
}

impl AttentionImpl {
    pub fn resolve(self, gpu_available: bool) -> AttentionImpl {
        match self {
            AttentionImpl::Auto if gpu_available => AttentionImpl::FlashAttention2,
            AttentionImpl::Auto => AttentionImpl::Eager,
            other => other,
        }
    }
}

impl fmt::Display for QuantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuantType::Nf4 => "nf4",
            QuantType::Fp4 => "fp4",
        })
    }
}

impl FromStr for QuantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nf4" => Ok(QuantType::Nf4),
            "fp4" => Ok(QuantType::Fp4),
            other => Err(Error::config(format!(
                "Invalid QUANT_TYPE: '{}'. Valid values: nf4, fp4",
                other
            ))),
        }
    }
}

impl fmt::Display for ComputeDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComputeDtype::Bfloat16 => "bfloat16",
            ComputeDtype::Float16 => "float16",
            ComputeDtype::Float32 => "float32",
        })
    }
}

impl FromStr for ComputeDtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bfloat16" | "bf16" => Ok(ComputeDtype::Bfloat16),
            "float16" | "fp16" => Ok(ComputeDtype::Float16),
            "float32" | "fp32" => Ok(ComputeDtype::Float32),
            other => Err(Error::config(format!(
                "Invalid QUANT_COMPUTE_DTYPE: '{}'. Valid values: bfloat16, float16, float32",
                other
            ))),
        }
    }
}

impl fmt::Display for AttentionImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttentionImpl::FlashAttention2 => "flash_attention_2",
            AttentionImpl::Eager => "eager",
            AttentionImpl::Auto => "auto",
        })
    }
}

impl FromStr for AttentionImpl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flash_attention_2" | "flash" => Ok(AttentionImpl::FlashAttention2),
            "eager" => Ok(AttentionImpl::Eager),
            "auto" => Ok(AttentionImpl::Auto),
            other => Err(Error::config(format!(
                "Invalid ATTN_IMPLEMENTATION: '{}'. Valid values: flash_attention_2, eager, auto",
                other
            ))),
        }
    }
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            load_in_4bit: true,
            double_quant: true,
            quant_type: QuantType::default(),
            compute_dtype: ComputeDtype::default(),
            attention: AttentionImpl::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Tgi {
            url: default_tgi_url(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

pub(crate) fn default_instance_type() -> String {
    "ml.g5.xlarge".to_string()
}

pub(crate) fn default_instance_count() -> u32 {
    1
}

pub(crate) fn default_server_timeout() -> u64 {
    600
}

pub(crate) fn default_max_context_length() -> usize {
    4096
}

pub(crate) fn default_max_new_tokens() -> usize {
    512
}

pub(crate) fn default_endpoint_info_path() -> PathBuf {
    PathBuf::from("endpoint_info.json")
}

pub(crate) fn default_tgi_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
