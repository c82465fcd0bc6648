//! Driver metadata: which host callbacks the driver implements, per module.
//!
//! Two encodings are accepted. JSON:
//!
//! ```json
//! { "modules": [ { "name": "net_device_ops",
//!                  "entry_points": [ { "host_function": "ndo_open", "procedure": "my_open" } ] } ] }
//! ```
//!
//! and the line-based info format emitted by driver front ends:
//!
//! ```text
//! <net_device_ops>
//! ndo_open::my_open
//! </>
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// One `(host function, driver procedure)` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointDecl {
    pub host_function: String,
    pub procedure: String,
}

/// An operations table registered with the host, e.g. `net_device_ops`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub name: String,
    #[serde(default)]
    pub entry_points: Vec<EntryPointDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverMetadata {
    #[serde(default)]
    pub modules: Vec<ModuleMetadata>,
}

impl DriverMetadata {
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        serde_json::from_str(text).map_err(|e| AnalysisError::Metadata(e.to_string()))
    }

    /// Parse the line-based info format.
    pub fn parse_info(text: &str) -> Result<Self, AnalysisError> {
        let mut modules = Vec::new();
        let mut current: Option<ModuleMetadata> = None;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line == "</>" {
                let module = current.take().ok_or_else(|| {
                    AnalysisError::Metadata(format!("line {}: unmatched '</>'", lineno + 1))
                })?;
                modules.push(module);
            } else if let Some(name) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
                if current.is_some() {
                    return Err(AnalysisError::Metadata(format!(
                        "line {}: module '{name}' opened inside another module",
                        lineno + 1
                    )));
                }
                current = Some(ModuleMetadata {
                    name: name.to_string(),
                    entry_points: Vec::new(),
                });
            } else {
                let module = current.as_mut().ok_or_else(|| {
                    AnalysisError::Metadata(format!(
                        "line {}: entry point outside of a module",
                        lineno + 1
                    ))
                })?;
                let (host, procedure) = line.split_once("::").ok_or_else(|| {
                    AnalysisError::Metadata(format!(
                        "line {}: expected 'host_function::procedure'",
                        lineno + 1
                    ))
                })?;
                module.entry_points.push(EntryPointDecl {
                    host_function: host.trim().to_string(),
                    procedure: procedure.trim().to_string(),
                });
            }
        }
        if let Some(module) = current {
            return Err(AnalysisError::Metadata(format!(
                "module '{}' is never closed",
                module.name
            )));
        }
        Ok(Self { modules })
    }

    /// Parse either encoding, picking JSON when the text starts with `{`.
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        if text.trim_start().starts_with('{') {
            Self::from_json(text)
        } else {
            Self::parse_info(text)
        }
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }
}
