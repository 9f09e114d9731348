use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SeqretsError, SeqretsResult};

/// Top-level configuration (loaded from seqrets.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeqretsConfig {
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
    pub sharing: SharingConfig,
    pub qr: QrConfig,
    pub card: CardConfig,
}

impl SeqretsConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> SeqretsResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| SeqretsError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> SeqretsResult<Self> {
        toml::from_str(content).map_err(|e| SeqretsError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Instruction cipher key-derivation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Shares required to reconstruct (default: 2)
    pub default_threshold: u8,
    /// Shares produced per split (default: 3)
    pub default_total_shares: u8,
    /// Label stamped on shares when none is given
    pub default_label: String,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            default_threshold: 2,
            default_total_shares: 3,
            default_label: "seqrets".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Maximum payload bytes per QR chunk (default: 700)
    pub max_chunk_size: usize,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self { max_chunk_size: 700 }
    }
}

/// Smart card policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Consecutive wrong PINs before the card blocks (default: 3)
    pub max_pin_attempts: u8,
    /// Whether `erase` also clears the PIN (default: false)
    pub erase_resets_pin: bool,
    /// Storage capacity of emulated cards in bytes (default: 8192)
    pub capacity_bytes: usize,
    /// Per-command timeout in seconds (default: 10)
    pub command_timeout_secs: u64,
    /// Directory holding emulated cards, one `<reader>.card` file each
    pub emulator_dir: PathBuf,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            max_pin_attempts: 3,
            erase_resets_pin: false,
            capacity_bytes: 8192,
            command_timeout_secs: 10,
            emulator_dir: PathBuf::from("~/.local/share/seqrets/cards"),
        }
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[logging]
level = "debug"
format = "json"

[crypto]
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8

[sharing]
default_threshold = 3
default_total_shares = 5
default_label = "estate"

[qr]
max_chunk_size = 400

[card]
max_pin_attempts = 5
erase_resets_pin = true
capacity_bytes = 32768
command_timeout_secs = 30
emulator_dir = "/tmp/cards"
"#;
        let config = SeqretsConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.sharing.default_threshold, 3);
        assert_eq!(config.sharing.default_label, "estate");
        assert_eq!(config.qr.max_chunk_size, 400);
        assert_eq!(config.card.max_pin_attempts, 5);
        assert!(config.card.erase_resets_pin);
        assert_eq!(config.card.emulator_dir, PathBuf::from("/tmp/cards"));
    }

    #[test]
    fn test_parse_defaults() {
        let config = SeqretsConfig::from_toml("").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.crypto.argon2_mem_cost_kib, 65536);
        assert_eq!(config.sharing.default_threshold, 2);
        assert_eq!(config.sharing.default_total_shares, 3);
        assert_eq!(config.qr.max_chunk_size, 700);
        assert_eq!(config.card.max_pin_attempts, 3);
        assert!(!config.card.erase_resets_pin);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[card]
max_pin_attempts = 10
"#;
        let config = SeqretsConfig::from_toml(toml_str).unwrap();

        // Overridden
        assert_eq!(config.card.max_pin_attempts, 10);
        // Defaults
        assert_eq!(config.card.capacity_bytes, 8192);
        assert_eq!(config.crypto.argon2_time_cost, 3);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SeqretsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = SeqretsConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.card.emulator_dir, parsed.card.emulator_dir);
        assert_eq!(config.qr.max_chunk_size, parsed.qr.max_chunk_size);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = SeqretsConfig::from_toml("[card\nmax_pin_attempts = ").unwrap_err();
        assert!(matches!(err, SeqretsError::Config(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SeqretsConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sharing.default_total_shares, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqrets.toml");
        std::fs::write(&path, "[qr]\nmax_chunk_size = 123\n").unwrap();
        let config = SeqretsConfig::load(&path).unwrap();
        assert_eq!(config.qr.max_chunk_size, 123);
    }
}
