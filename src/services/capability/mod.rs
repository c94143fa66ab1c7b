//! Capability catalog: the executor's only way to touch the outside world.
//!
//! Capabilities implement [`Capability`] and are registered in a
//! [`CapabilityRegistry`], which is the catalog handed to the executor.

pub mod builtin;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::intent::types::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutcome {
    pub success: bool,
    pub outputs: Option<Value>,
    pub error: Option<String>,
}

impl CapabilityOutcome {
    pub fn ok(outputs: Value) -> Self {
        Self {
            success: true,
            outputs: Some(outputs),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl CapabilityParam {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySignature {
    pub name: String,
    pub description: String,
    pub params: Vec<CapabilityParam>,
    pub risk: RiskLevel,
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn signature(&self) -> CapabilitySignature;

    async fn invoke(&self, args: &Value, cancel: &CancellationToken) -> CapabilityOutcome;
}

#[async_trait]
pub trait CapabilityCatalog: Send + Sync {
    /// Human/model readable catalog listing.
    fn describe(&self) -> String;

    fn contains(&self, name: &str) -> bool;

    async fn invoke(&self, name: &str, args: &Value, cancel: &CancellationToken) -> CapabilityOutcome;
}

#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::TimeNow));
        registry.register(Arc::new(builtin::ReadFile));
        registry
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.signature().name;
        self.capabilities.insert(name, capability);
    }

    pub fn signatures(&self) -> Vec<CapabilitySignature> {
        self.capabilities.values().map(|c| c.signature()).collect()
    }

    fn validate(signature: &CapabilitySignature, args: &Value) -> Result<(), String> {
        let object = match args {
            Value::Object(map) => map,
            Value::Null if signature.params.iter().all(|p| !p.required) => return Ok(()),
            _ => return Err(format!("invalid args for {}: expected a JSON object", signature.name)),
        };
        for param in signature.params.iter().filter(|p| p.required) {
            match object.get(&param.name) {
                None | Some(Value::Null) => {
                    return Err(format!(
                        "invalid args for {}: missing required parameter '{}'",
                        signature.name, param.name
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityCatalog for CapabilityRegistry {
    fn describe(&self) -> String {
        let mut out = String::new();
        for signature in self.signatures() {
            out.push_str(&format!("- {}: {}", signature.name, signature.description));
            if !signature.params.is_empty() {
                let params: Vec<String> = signature
                    .params
                    .iter()
                    .map(|p| {
                        if p.required {
                            format!("{} (required): {}", p.name, p.description)
                        } else {
                            format!("{}: {}", p.name, p.description)
                        }
                    })
                    .collect();
                out.push_str(&format!(" [args: {}]", params.join("; ")));
            }
            out.push('\n');
        }
        out
    }

    fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    async fn invoke(&self, name: &str, args: &Value, cancel: &CancellationToken) -> CapabilityOutcome {
        let Some(capability) = self.capabilities.get(name) else {
            return CapabilityOutcome::err(format!("skill not found: {}", name));
        };
        if let Err(message) = Self::validate(&capability.signature(), args) {
            return CapabilityOutcome::err(message);
        }
        tokio::select! {
            _ = cancel.cancelled() => CapabilityOutcome::err("cancelled"),
            outcome = capability.invoke(args, cancel) => outcome,
        }
    }
}

/// Capability that always returns the same outcome and counts its calls.
pub struct FixedCapability {
    signature: CapabilitySignature,
    outcome: CapabilityOutcome,
    calls: AtomicUsize,
}

impl FixedCapability {
    pub fn new(name: &str, outcome: CapabilityOutcome) -> Self {
        Self {
            signature: CapabilitySignature {
                name: name.to_string(),
                description: format!("fixed capability {}", name),
                params: Vec::new(),
                risk: RiskLevel::None,
            },
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for FixedCapability {
    fn signature(&self) -> CapabilitySignature {
        self.signature.clone()
    }

    async fn invoke(&self, _args: &Value, _cancel: &CancellationToken) -> CapabilityOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
