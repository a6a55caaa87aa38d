//! Model pricing table.
//!
//! Reads `~/.searchcrabs/pricing.toml` on first use and falls back to the
//! compiled-in table when the file is missing, unparseable or empty.
//!
//! ```toml
//! [[models]]
//! prefix = "gpt-4o-mini"
//! input_per_m = 0.15
//! output_per_m = 0.60
//! ```

use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
struct PricingFile {
    #[serde(default)]
    models: Vec<ModelPricing>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelPricing {
    /// Case-insensitive substring matched against the model id. First match wins.
    pub prefix: String,
    /// USD per 1M input tokens
    pub input_per_m: f64,
    /// USD per 1M output tokens
    pub output_per_m: f64,
}

pub struct PricingTable {
    entries: Vec<ModelPricing>,
}

impl PricingTable {
    fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        let m = model.to_lowercase();
        self.entries
            .iter()
            .find(|e| m.contains(&e.prefix.to_lowercase()))
    }

    /// Cost in USD, 0.0 for unknown models.
    pub fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.lookup(model) {
            Some(entry) => {
                (input_tokens as f64 / 1_000_000.0) * entry.input_per_m
                    + (output_tokens as f64 / 1_000_000.0) * entry.output_per_m
            }
            None => 0.0,
        }
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.lookup(model).is_some()
    }
}

static PRICING: OnceCell<PricingTable> = OnceCell::new();

/// Global pricing table, loaded on first call.
pub fn pricing() -> &'static PricingTable {
    PRICING.get_or_init(|| load_from(&pricing_file_path()))
}

fn pricing_file_path() -> PathBuf {
    crate::config::searchcrabs_home().join("pricing.toml")
}

fn load_from(path: &Path) -> PricingTable {
    let entries = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| match toml::from_str::<PricingFile>(&s) {
            Ok(file) => Some(file.models),
            Err(e) => {
                tracing::warn!("Ignoring invalid pricing file {}: {}", path.display(), e);
                None
            }
        })
        .filter(|entries| !entries.is_empty())
        .unwrap_or_else(default_entries);

    PricingTable { entries }
}

fn default_entries() -> Vec<ModelPricing> {
    // More specific prefixes first: "gpt-4o-mini" must win over "gpt-4o".
    let table: &[(&str, f64, f64)] = &[
        ("gpt-4o-mini", 0.15, 0.60),
        ("gpt-4o", 2.50, 10.0),
        ("gpt-4.1-nano", 0.10, 0.40),
        ("gpt-4.1-mini", 0.40, 1.60),
        ("gpt-4.1", 2.00, 8.00),
        ("o3-mini", 1.10, 4.40),
        ("o3", 2.00, 8.00),
        ("claude-sonnet-4", 3.0, 15.0),
        ("claude-haiku-4", 1.0, 5.0),
        ("gemini-2.0-flash", 0.10, 0.40),
        ("deepseek", 0.27, 1.10),
    ];

    table
        .iter()
        .map(|(prefix, input_per_m, output_per_m)| ModelPricing {
            prefix: (*prefix).to_string(),
            input_per_m: *input_per_m,
            output_per_m: *output_per_m,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_prefix_wins() {
        let table = PricingTable {
            entries: default_entries(),
        };
        let mini = table.calculate_cost("gpt-4o-mini-2024-07-18", 1_000_000, 0);
        assert!((mini - 0.15).abs() < 1e-9);
        let full = table.calculate_cost("GPT-4o", 0, 1_000_000);
        assert!((full - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PricingTable {
            entries: default_entries(),
        };
        assert!(!table.is_known("mystery-model"));
        assert_eq!(table.calculate_cost("mystery-model", 1000, 1000), 0.0);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pricing.toml");
        std::fs::write(
            &path,
            "[[models]]\nprefix = \"local\"\ninput_per_m = 1.0\noutput_per_m = 2.0\n",
        )
        .expect("write");

        let table = load_from(&path);
        assert!(table.is_known("local-llama"));
        assert!(!table.is_known("gpt-4o"));
    }

    #[test]
    fn test_missing_or_broken_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_from(&dir.path().join("absent.toml")).is_known("gpt-4o"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[[models]\nprefix=").expect("write");
        assert!(load_from(&broken).is_known("gpt-4o"));
    }
}
