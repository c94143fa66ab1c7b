//! Risk/trust gate. Decides whether a reviewed plan runs on its own, waits
//! for a human, or never runs.
//!
//! The blocked set is checked before anything else, so a blocked risk level
//! is never auto-approved under any mode or trust level.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::intent::types::{RiskLevel, TrustLevel};
use crate::planner::types::{Plan, PlanReview};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskPolicyMode {
    /// Never bypass review; every plan waits for explicit approval.
    Never,
    /// Apply the risk mapping, gated by the current trust level.
    #[default]
    TrustBased,
    /// Auto-approve everything outside the blocked set.
    Always,
}

impl RiskPolicyMode {
    pub const ALL: [RiskPolicyMode; 3] = [RiskPolicyMode::Never, RiskPolicyMode::TrustBased, RiskPolicyMode::Always];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub mode: RiskPolicyMode,
    pub auto_approve: BTreeSet<RiskLevel>,
    pub require_approval: BTreeSet<RiskLevel>,
    pub blocked: BTreeSet<RiskLevel>,
    /// Minimum current trust for any auto-approval under `trust_based`.
    pub min_trust_for_auto: TrustLevel,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            mode: RiskPolicyMode::TrustBased,
            auto_approve: [RiskLevel::None, RiskLevel::Low].into_iter().collect(),
            require_approval: [RiskLevel::Medium, RiskLevel::High].into_iter().collect(),
            blocked: [RiskLevel::Critical].into_iter().collect(),
            min_trust_for_auto: TrustLevel::Supervised,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    AutoApprove,
    RequireApproval { reason: String },
    Block { reason: String },
}

impl GateDecision {
    pub fn is_auto_approved(&self) -> bool {
        matches!(self, GateDecision::AutoApprove)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, GateDecision::Block { .. })
    }
}

/// Pure decision over risk and trust.
pub fn decide(risk: RiskLevel, required_trust: TrustLevel, current_trust: TrustLevel, policy: &RiskPolicy) -> GateDecision {
    if policy.blocked.contains(&risk) {
        return GateDecision::Block {
            reason: format!("risk level {:?} is blocked by policy", risk),
        };
    }

    match policy.mode {
        RiskPolicyMode::Always => GateDecision::AutoApprove,
        RiskPolicyMode::Never => GateDecision::RequireApproval {
            reason: "policy requires explicit approval for every plan".to_string(),
        },
        RiskPolicyMode::TrustBased => {
            if current_trust < required_trust {
                GateDecision::RequireApproval {
                    reason: format!("trust {:?} is below required {:?}", current_trust, required_trust),
                }
            } else if policy.require_approval.contains(&risk) {
                GateDecision::RequireApproval {
                    reason: format!("risk level {:?} requires approval", risk),
                }
            } else if policy.auto_approve.contains(&risk) && current_trust >= policy.min_trust_for_auto {
                GateDecision::AutoApprove
            } else {
                GateDecision::RequireApproval {
                    reason: format!(
                        "risk level {:?} at trust {:?} is not eligible for auto-approval",
                        risk, current_trust
                    ),
                }
            }
        }
    }
}

/// Gate for a reviewed plan. Combines the plan's own risk with the
/// intention's, honours steps flagged for approval, and demotes an
/// auto-approval whose review alignment is below `auto_approve_threshold`.
/// `Always` mode approves anything not blocked.
pub fn decide_plan(
    plan: &Plan,
    review: &PlanReview,
    intention_risk: RiskLevel,
    intention_trust: TrustLevel,
    current_trust: TrustLevel,
    policy: &RiskPolicy,
    auto_approve_threshold: f32,
) -> GateDecision {
    let risk = plan.estimated_risk.max(intention_risk);
    let required = plan.required_trust_level.max(intention_trust);
    let decision = decide(risk, required, current_trust, policy);

    if !decision.is_auto_approved() || policy.mode == RiskPolicyMode::Always {
        return decision;
    }
    if plan.requires_approval() {
        return GateDecision::RequireApproval {
            reason: "plan contains steps flagged for approval".to_string(),
        };
    }
    if review.alignment_score < auto_approve_threshold {
        return GateDecision::RequireApproval {
            reason: format!(
                "review alignment {:.2} is below auto-approve threshold {:.2}",
                review.alignment_score, auto_approve_threshold
            ),
        };
    }
    decision
}
