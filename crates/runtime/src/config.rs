// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! model_path = "./models/mobilenet_v2.tflite"
//! memory_budget = "512M"
//! backend = "cpu"
//! layout = "nhwc"
//! enable_profiling = true
//! ```

use crate::{Backend, CpuBackend, RuntimeError};
use memory_manager::MemoryBudget;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tensor_core::Layout;

/// Configuration for an [`InferenceSession`](crate::InferenceSession).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Path to the `.tflite` model file.
    pub model_path: PathBuf,
    /// Ceiling for all tensor buffers (human-readable, e.g. `"512M"`).
    pub memory_budget: String,
    /// Compute backend name. Only `"cpu"` is built in.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Tensor layout the backend works in.
    #[serde(default)]
    pub layout: Layout,
    /// Record per-operation timings.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
}

fn default_backend() -> String {
    "cpu".to_string()
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("cannot read config '{}': {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str).map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    pub fn parse_budget(&self) -> Result<MemoryBudget, RuntimeError> {
        MemoryBudget::parse(&self.memory_budget).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    /// Instantiates the configured backend.
    pub fn create_backend(&self) -> Result<Arc<dyn Backend>, RuntimeError> {
        match self.backend.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Arc::new(CpuBackend::new())),
            other => Err(RuntimeError::Config(format!("unknown backend '{other}'; expected 'cpu'"))),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./model.tflite"),
            memory_budget: "512M".to_string(),
            backend: default_backend(),
            layout: Layout::Nhwc,
            enable_profiling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert_eq!(c.memory_budget, "512M");
        assert_eq!(c.backend, "cpu");
        assert_eq!(c.layout, Layout::Nhwc);
        assert!(c.enable_profiling);
    }

    #[test]
    fn test_parse_budget() {
        let c = RuntimeConfig { memory_budget: "256M".into(), ..Default::default() };
        assert_eq!(c.parse_budget().unwrap().as_mb(), 256);

        let bad = RuntimeConfig { memory_budget: "lots".into(), ..Default::default() };
        assert!(matches!(bad.parse_budget(), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
model_path = "/tmp/model.tflite"
memory_budget = "1G"
layout = "nchw"
enable_profiling = false
"#;
        let c = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(c.model_path, PathBuf::from("/tmp/model.tflite"));
        assert_eq!(c.memory_budget, "1G");
        assert_eq!(c.backend, "cpu");
        assert_eq!(c.layout, Layout::Nchw);
        assert!(!c.enable_profiling);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(RuntimeConfig::from_toml("model_path = 3"), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = RuntimeConfig { layout: Layout::Nchw, ..Default::default() };
        let back = RuntimeConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("nnrt-config-{}.toml", std::process::id()));
        std::fs::write(&path, "model_path = \"m.tflite\"\nmemory_budget = \"64M\"\n").unwrap();
        let c = RuntimeConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(c.parse_budget().unwrap().as_mb(), 64);

        assert!(RuntimeConfig::from_file(Path::new("/nonexistent/nnrt.toml")).is_err());
    }

    #[test]
    fn test_create_backend() {
        assert_eq!(RuntimeConfig::default().create_backend().unwrap().name(), "cpu");
        let c = RuntimeConfig { backend: "gpu".into(), ..Default::default() };
        assert!(matches!(c.create_backend(), Err(RuntimeError::Config(_))));
    }
}
