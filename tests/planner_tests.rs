use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use volition::intent::types::{Intention, IntentionSource, RiskLevel};
use volition::planner::plan::parse_plan;
use volition::planner::react::{parse_decision, render_trace};
use volition::planner::review::{parse_review, FALLBACK_ALIGNMENT};
use volition::planner::schema::extract_json_object;
use volition::planner::types::{PlannerDecision, ResponseStyle, ReviewVerdict, ScratchpadEntry};
use volition::planner::{PlanGenerator, PlanReviewer, PlannerConfig, PlannerError, ReactPlanner};
use volition::services::capability::CapabilityRegistry;
use volition::services::llm::{ChatMessage, GenerateOptions, GenerateRequest, HttpModel, LanguageModel, LlmConfig, LlmError, ScriptedModel, ScriptedReply};

fn planner(model: &Arc<ScriptedModel>) -> ReactPlanner {
    ReactPlanner::new(model.clone() as Arc<dyn LanguageModel>, PlannerConfig::default())
}

#[test]
fn test_extracts_json_from_prose() {
    let raw = "Sure! Here is my decision:\n{\"thought\": \"check the clock\", \"action\": {\"tool\": \"time_now\", \"args\": {}}}\nHope that helps.";
    assert!(extract_json_object(raw).is_some());

    match parse_decision(raw).expect("prose around the object is tolerated") {
        PlannerDecision::Action { thought, call } => {
            assert_eq!(thought, "check the clock");
            assert_eq!(call.tool, "time_now");
        }
        other => panic!("expected an action, got {:?}", other),
    }
}

#[test]
fn test_decision_shapes() {
    let thought = parse_decision(r#"{"thought": "let me think"}"#).unwrap();
    assert!(matches!(thought, PlannerDecision::Thought { .. }));

    let answer = parse_decision(r#"{"thought": "done", "respond": true, "response": "42", "responseStyle": "strict"}"#).unwrap();
    assert_eq!(
        answer,
        PlannerDecision::FinalAnswer {
            thought: "done".to_string(),
            answer: "42".to_string(),
            style: ResponseStyle::Strict,
        }
    );

    // respond wins over a stray action
    let both = parse_decision(r#"{"thought": "done", "respond": true, "action": {"tool": "x", "args": {}}}"#).unwrap();
    assert!(matches!(both, PlannerDecision::FinalAnswer { ref answer, .. } if answer == "done"));
}

#[test]
fn test_invalid_decisions_rejected() {
    assert!(parse_decision("no json here").is_err());
    assert!(parse_decision(r#"{"action": {"tool": "x", "args": {}}}"#).is_err(), "thought is required");
    assert!(parse_decision(r#"{"thought": "t", "action": {"tool": "", "args": {}}}"#).is_err());
    assert!(parse_decision(r#"{"thought": "t", "action": {"tool": "x"}}"#).is_err(), "args are required");
    assert!(parse_decision(r#"{"thought": "t", "action": "x"}"#).is_err());
}

#[tokio::test]
async fn test_retry_once_at_lower_temperature() {
    let model = Arc::new(ScriptedModel::new([
        "I think I should check the clock.",
        r#"{"thought": "check the clock", "action": {"tool": "time_now", "args": {}}}"#,
    ]));
    let decision = planner(&model)
        .next_step("tell the time", &[], "- time_now: clock", &[], &CancellationToken::new())
        .await
        .expect("second answer is valid");
    assert!(matches!(decision, PlannerDecision::Action { .. }));

    let requests = model.requests();
    assert_eq!(requests.len(), 2, "exactly one retry");
    let config = PlannerConfig::default();
    assert_eq!(requests[0].options.temperature, config.temperature);
    assert_eq!(requests[1].options.temperature, config.retry_temperature);
    assert!(requests[1].options.json_mode);
    let retry_prompt = &requests[1].messages.last().unwrap().content;
    assert!(retry_prompt.contains("I think I should check the clock."), "invalid output is quoted back");
    assert!(retry_prompt.contains("\"thought\""), "schema is included");
}

#[tokio::test]
async fn test_second_invalid_answer_is_terminal() {
    let model = Arc::new(ScriptedModel::new(["nope", "still nope", "never asked"]));
    let result = planner(&model)
        .next_step("tell the time", &[], "", &[], &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PlannerError::InvalidOutput { .. })));
    assert_eq!(model.remaining(), 1, "no third call");
}

#[tokio::test]
async fn test_cancelled_planner_call() {
    let model = Arc::new(ScriptedModel::with_replies([ScriptedReply::Hang]));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let result = planner(&model).next_step("wait forever", &[], "", &[], &cancel).await;
    assert!(matches!(result, Err(PlannerError::Cancelled)));
}

#[tokio::test]
async fn test_warnings_reach_prompt() {
    let model = Arc::new(ScriptedModel::new([r#"{"thought": "ok"}"#]));
    let warnings = vec!["WARNING: `read_file` keeps failing".to_string()];
    planner(&model)
        .next_step("read it", &[], "", &warnings, &CancellationToken::new())
        .await
        .unwrap();
    let prompt = &model.requests()[0].messages[0].content;
    assert!(prompt.contains("Warnings:"));
    assert!(prompt.contains("`read_file` keeps failing"));
}

#[test]
fn test_trace_window() {
    let trace: Vec<ScratchpadEntry> = (1..=12)
        .map(|step| ScratchpadEntry {
            step,
            thought: format!("thought {}", step),
            action: None,
            observation: None,
            timestamp: chrono::Utc::now(),
        })
        .collect();
    let rendered = render_trace(&trace, 10);
    assert!(rendered.contains("(2 earlier steps omitted)"));
    assert!(!rendered.contains("thought 2\n"));
    assert!(rendered.contains("thought 12"));
}

#[test]
fn test_plan_parsing() {
    let catalog = CapabilityRegistry::with_builtins();
    let intention = Intention::new(IntentionSource::Task, "read the changelog");

    let plan = parse_plan(
        r#"{"goal": "read file CHANGELOG.md", "steps": [
            {"action": "open it", "capability": "read_file", "inputs": {"path": "CHANGELOG.md"}, "risk": "low"},
            {"action": "summarize", "risk": "medium", "requires_approval": true}
        ]}"#,
        &intention,
        &catalog,
    )
    .expect("valid plan");
    assert_eq!(plan.version, 1);
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[1].order, 2);
    assert_eq!(plan.estimated_risk, RiskLevel::Medium, "max of step risks");
    assert!(plan.required_capabilities.contains("read_file"));
    assert!(plan.requires_approval());

    let unknown = parse_plan(r#"{"steps": [{"action": "x", "capability": "launch_rockets"}]}"#, &intention, &catalog);
    assert!(unknown.is_err(), "capabilities must come from the catalog");
    assert!(parse_plan(r#"{"steps": []}"#, &intention, &catalog).is_err());
}

#[tokio::test]
async fn test_plan_generator_versions() {
    let model = Arc::new(ScriptedModel::new([r#"{"steps": [{"action": "check", "capability": "time_now"}]}"#]));
    let generator = PlanGenerator::new(model.clone() as Arc<dyn LanguageModel>, PlannerConfig::default());
    let catalog = CapabilityRegistry::with_builtins();

    let mut intention = Intention::new(IntentionSource::Task, "tell the time");
    intention.plan_history.push(volition::planner::types::Plan::new(
        4,
        "old".to_string(),
        Vec::new(),
        intention.required_trust_level,
    ));
    let plan = generator
        .generate(&intention, &catalog, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(plan.version, 5, "one past the highest version seen");
    assert_eq!(plan.goal, "tell the time", "goal defaults to the title");
}

#[tokio::test]
async fn test_plan_review_falls_back() {
    let model = Arc::new(ScriptedModel::new(["garbage", "more garbage"]));
    let reviewer = PlanReviewer::new(model as Arc<dyn LanguageModel>, PlannerConfig::default());
    let intention = Intention::new(IntentionSource::Task, "tell the time");
    let plan = volition::planner::types::Plan::new(1, "tell the time".to_string(), Vec::new(), intention.required_trust_level);

    let review = reviewer.review(&intention, &plan, &CancellationToken::new()).await.unwrap();
    assert_eq!(review.verdict, ReviewVerdict::Approve);
    assert_eq!(review.alignment_score, FALLBACK_ALIGNMENT);
    assert!(!review.concerns.is_empty());

    let parsed = parse_review(r#"{"verdict": "revise", "concerns": "too vague", "alignment_score": 0.4}"#, 3).unwrap();
    assert_eq!(parsed.plan_version, 3);
    assert_eq!(parsed.concerns, vec!["too vague".to_string()]);
    assert!(parse_review(r#"{"verdict": "revise", "alignment_score": 1.4}"#, 1).is_err());
}

#[tokio::test]
async fn test_http_model_reports_unreachable_server() {
    let model = HttpModel::new(LlmConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_secs: 5,
    });
    let request = GenerateRequest {
        system_prompt: "You answer briefly.".to_string(),
        messages: vec![ChatMessage::user("What time is it?")],
        options: GenerateOptions::default(),
    };
    let result = model.generate(&request, &CancellationToken::new()).await;
    assert!(
        matches!(result, Err(LlmError::Request(_)) | Err(LlmError::Timeout(5))),
        "a closed port surfaces as a request error, got {:?}",
        result
    );
}
