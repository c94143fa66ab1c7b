use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{Capability, CapabilityOutcome, CapabilityParam, CapabilitySignature};
use crate::intent::types::RiskLevel;

pub struct TimeNow;

#[async_trait]
impl Capability for TimeNow {
    fn signature(&self) -> CapabilitySignature {
        CapabilitySignature {
            name: "time_now".to_string(),
            description: "Current UTC time in RFC 3339".to_string(),
            params: Vec::new(),
            risk: RiskLevel::None,
        }
    }

    async fn invoke(&self, _args: &Value, _cancel: &CancellationToken) -> CapabilityOutcome {
        CapabilityOutcome::ok(json!({ "now": Utc::now().to_rfc3339() }))
    }
}

pub struct ReadFile;

const MAX_READ_BYTES: usize = 64 * 1024;

#[async_trait]
impl Capability for ReadFile {
    fn signature(&self) -> CapabilitySignature {
        CapabilitySignature {
            name: "read_file".to_string(),
            description: "Read a UTF-8 text file".to_string(),
            params: vec![CapabilityParam::required("path", "file path to read")],
            risk: RiskLevel::Low,
        }
    }

    async fn invoke(&self, args: &Value, _cancel: &CancellationToken) -> CapabilityOutcome {
        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return CapabilityOutcome::err("invalid args for read_file: 'path' must be a string");
        };
        match tokio::fs::read_to_string(path).await {
            Ok(mut content) => {
                let truncated = content.len() > MAX_READ_BYTES;
                if truncated {
                    let mut cut = MAX_READ_BYTES;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                }
                CapabilityOutcome::ok(json!({ "path": path, "content": content, "truncated": truncated }))
            }
            Err(e) => CapabilityOutcome::err(format!("{}: {}", path, e)),
        }
    }
}
