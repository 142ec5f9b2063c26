use crate::agent::{Agent, AgentRole};
use crate::metrics::{AgentMetrics, MetricsRecorder};
use maestro_core::{
    CompletionBackend, CompletionRequest, Message, Task, TaskResult, ValidationCheck,
    ValidationReport,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{debug, warn};

/// Pass threshold in normal mode.
pub const NORMAL_THRESHOLD: f64 = 0.70;
/// Pass threshold in strict mode.
pub const STRICT_THRESHOLD: f64 = 0.90;

const MIN_CONTENT_LEN: usize = 10;
const MAX_CONTENT_LEN: usize = 50_000;
const MIN_UNIQUE_RATIO: f64 = 0.3;
const PLACEHOLDERS: [&str; 4] = ["lorem ipsum", "todo", "tbd", "xxx"];
const MAX_RECOMMENDATIONS: usize = 5;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9']+").unwrap_or_else(|_| unreachable!()))
}

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]").unwrap_or_else(|_| unreachable!()))
}

/// The semantic judgement expected back from the completion backend.
#[derive(Debug, Deserialize)]
struct SemanticVerdict {
    #[serde(rename = "isValid")]
    is_valid: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

/// Scores a completed task's result along five independent checks and
/// produces a pass/fail verdict with remediation recommendations.
pub struct Validator {
    name: String,
    completion: Arc<dyn CompletionBackend>,
    threshold: f64,
    metrics: MetricsRecorder,
}

impl Validator {
    pub fn new(completion: Arc<dyn CompletionBackend>) -> Self {
        Self {
            name: "validator".to_string(),
            completion,
            threshold: NORMAL_THRESHOLD,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Raise the pass threshold to strict mode.
    pub fn strict(mut self) -> Self {
        self.threshold = STRICT_THRESHOLD;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Run all five checks over a completed task's result. Check failures
    /// never abort validation; they lower the aggregate.
    pub async fn validate(
        &self,
        task: &Task,
        request: &str,
        prior: Option<&TaskResult>,
    ) -> ValidationReport {
        let start = Instant::now();
        let result = task.result.as_ref();

        let checks = vec![
            structural_check(task, result),
            quality_check(result),
            task_specific_check(task, result),
            self.semantic_check(task, request, result).await,
            consistency_check(result, prior),
        ];

        let mut report = ValidationReport::aggregate(task.id, checks, self.threshold);
        report.recommendations = recommend(&report);

        self.metrics
            .record(report.passed, start.elapsed().as_millis() as u64);
        debug!(
            task_id = %task.id,
            passed = report.passed,
            confidence = report.confidence,
            "Validator: report ready"
        );
        report
    }

    /// Check 4: ask the completion backend to judge relevance/coherence
    /// against the original request. A malformed reply is a failed check
    /// with confidence 0, never an error.
    async fn semantic_check(
        &self,
        task: &Task,
        request: &str,
        result: Option<&TaskResult>,
    ) -> ValidationCheck {
        let content = effective_text(result);
        if content.is_empty() {
            return ValidationCheck::fail(
                "semantic",
                0,
                vec!["no output to judge for relevance".to_string()],
            );
        }

        let prompt = format!(
            "Judge whether the output below is a relevant, coherent response for the task.\n\
             Reply with JSON only: {{\"isValid\": bool, \"confidence\": 0-100, \
             \"issues\": [], \"reasoning\": \"...\"}}.\n\n\
             Original request: {request}\nTask: {}\nOutput:\n{content}",
            task.description
        );

        let reply = match self
            .completion
            .complete(CompletionRequest::new(vec![Message::user(prompt)]).with_temperature(0.0))
            .await
        {
            Ok(c) => c.text,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Semantic check completion failed");
                return ValidationCheck::fail(
                    "semantic",
                    0,
                    vec![format!("semantic judgement unavailable: {e}")],
                );
            }
        };

        match parse_verdict(&reply) {
            Some(verdict) => {
                let score = verdict.confidence.clamp(0.0, 100.0) as u8;
                if verdict.is_valid {
                    ValidationCheck::pass("semantic", score)
                } else {
                    let issues = if verdict.issues.is_empty() {
                        vec!["output judged not relevant to the request".to_string()]
                    } else {
                        verdict.issues
                    };
                    ValidationCheck::fail("semantic", score, issues)
                }
            }
            None => ValidationCheck::fail(
                "semantic",
                0,
                vec!["semantic judgement response was unparsable".to_string()],
            ),
        }
    }
}

impl Agent for Validator {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Validator
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.snapshot()
    }
}

/// Content if present, else the serialized tool output.
fn effective_text(result: Option<&TaskResult>) -> String {
    match result {
        Some(r) => match &r.content {
            Some(c) => c.clone(),
            None => r
                .tool_output
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default(),
        },
        None => String::new(),
    }
}

/// Check 1: the result exists, carries output, and content length is sane.
fn structural_check(task: &Task, result: Option<&TaskResult>) -> ValidationCheck {
    let mut issues = Vec::new();

    let result = match result {
        Some(r) if !r.is_empty() => r,
        _ => {
            return ValidationCheck::fail(
                "structural",
                0,
                vec!["result is missing or carries no content or tool output".to_string()],
            )
        }
    };

    if let Some(content) = &result.content {
        let len = content.chars().count();
        if len < MIN_CONTENT_LEN {
            issues.push(format!(
                "content too short: {len} chars, minimum {MIN_CONTENT_LEN}"
            ));
        }
        if len > MAX_CONTENT_LEN {
            issues.push(format!(
                "content too long: {len} chars, maximum {MAX_CONTENT_LEN}"
            ));
        }
    }

    // Structured analysis results must name their summary; prose content
    // acts as the summary itself.
    if task.task_type == "analysis" && result.content.is_none() {
        let has_summary = result
            .tool_output
            .as_ref()
            .and_then(|v| v.get("summary"))
            .is_some();
        if !has_summary {
            issues.push("analysis result is missing a summary field".to_string());
        }
    }

    if issues.is_empty() {
        ValidationCheck::pass("structural", 100)
    } else {
        ValidationCheck::fail("structural", 25, issues)
    }
}

/// Check 2: lexical quality of prose content. Tool-only results pass.
fn quality_check(result: Option<&TaskResult>) -> ValidationCheck {
    let content = match result.and_then(|r| r.content.as_deref()) {
        Some(c) => c,
        None => return ValidationCheck::pass("quality", 100),
    };

    let mut issues = Vec::new();
    let lower = content.to_lowercase();

    let words: Vec<&str> = word_re().find_iter(&lower).map(|m| m.as_str()).collect();
    if !words.is_empty() {
        let unique: std::collections::HashSet<&&str> = words.iter().collect();
        let ratio = unique.len() as f64 / words.len() as f64;
        if ratio <= MIN_UNIQUE_RATIO {
            issues.push(format!(
                "repetitive content: unique-word ratio {ratio:.2} below {MIN_UNIQUE_RATIO}"
            ));
        }
    }

    for marker in PLACEHOLDERS {
        if lower.contains(marker) {
            issues.push(format!("placeholder marker present: '{marker}'"));
        }
    }

    let trimmed = content.trim_end();
    if !trimmed.ends_with(['.', '!', '?']) {
        issues.push("missing terminal punctuation".to_string());
    }

    let sentences: Vec<&str> = sentence_re()
        .split(content)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !sentences.is_empty() {
        let avg =
            sentences.iter().map(|s| s.chars().count()).sum::<usize>() as f64 / sentences.len() as f64;
        if !(10.0..=300.0).contains(&avg) {
            issues.push(format!(
                "average sentence length {avg:.0} chars outside 10-300 range"
            ));
        }
    }

    if issues.is_empty() {
        ValidationCheck::pass("quality", 100)
    } else {
        let score = 100u8.saturating_sub(25 * issues.len() as u8);
        ValidationCheck::fail("quality", score, issues)
    }
}

/// Check 3: per-task-type rules with a default fallback.
fn task_specific_check(task: &Task, result: Option<&TaskResult>) -> ValidationCheck {
    let text = effective_text(result);
    let min_len = match task.task_type.as_str() {
        "analysis" => 100,
        _ => 50,
    };

    let mut issues = Vec::new();
    let len = text.chars().count();
    if len < min_len {
        issues.push(format!(
            "content too short for {} task: {len} chars, minimum {min_len}",
            task.task_type
        ));
    }
    if text.is_empty() {
        issues.push("core output field is absent".to_string());
    }

    if issues.is_empty() {
        ValidationCheck::pass("task_specific", 100)
    } else {
        ValidationCheck::fail("task_specific", 30, issues)
    }
}

/// Check 5: drift against the most recent prior result in the session.
/// Minimal heuristic; passes when there is no prior result.
fn consistency_check(result: Option<&TaskResult>, prior: Option<&TaskResult>) -> ValidationCheck {
    let prior = match prior {
        Some(p) => p,
        None => return ValidationCheck::pass("consistency", 100),
    };
    let current = match result {
        Some(r) => r,
        None => return ValidationCheck::fail("consistency", 0, vec!["no result to compare".into()]),
    };

    let mut issues = Vec::new();
    if prior.content.is_some() && current.content.is_none() {
        issues.push("result type drift: prose output followed by tool-only output".to_string());
    }
    if prior.tool_output.is_some() && current.tool_output.is_none() && current.content.is_none() {
        issues.push("result type drift: structured output followed by empty output".to_string());
    }

    if issues.is_empty() {
        ValidationCheck::pass("consistency", 100)
    } else {
        ValidationCheck::fail("consistency", 50, issues)
    }
}

/// Extract the first JSON object from the reply text.
fn parse_verdict(text: &str) -> Option<SemanticVerdict> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Derive deduplicated remediation recommendations from failing checks.
fn recommend(report: &ValidationReport) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();
    for issue in report.failing_issues() {
        let lower = issue.to_lowercase();
        let hint = if lower.contains("too short") || lower.contains("short") {
            "Expand the result with more detail"
        } else if lower.contains("placeholder") {
            "Replace placeholder text with real content"
        } else if lower.contains("repetit") {
            "Rephrase repetitive content for variety"
        } else if lower.contains("punctuation") {
            "Complete the final sentence"
        } else if lower.contains("relevan") || lower.contains("off-topic") {
            "Align the result with the original request"
        } else if lower.contains("drift") {
            "Keep the result format consistent with earlier outputs"
        } else {
            "Review and revise the flagged output"
        };
        if !recommendations.iter().any(|r| r == hint) {
            recommendations.push(hint.to_string());
        }
        if recommendations.len() == MAX_RECOMMENDATIONS {
            break;
        }
    }
    recommendations
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_core::{Completion, CompletionBackend, MaestroResult};

    /// Backend returning a fixed semantic verdict.
    struct VerdictBackend {
        reply: String,
    }

    #[async_trait]
    impl CompletionBackend for VerdictBackend {
        async fn complete(&self, _request: CompletionRequest) -> MaestroResult<Completion> {
            Ok(Completion {
                text: self.reply.clone(),
                tokens_used: 5,
            })
        }
    }

    fn approving_validator() -> Validator {
        Validator::new(Arc::new(VerdictBackend {
            reply: r#"{"isValid": true, "confidence": 90, "issues": [], "reasoning": "fine"}"#
                .to_string(),
        }))
    }

    fn completed_task(task_type: &str, content: &str) -> Task {
        let mut task = Task::new("Analyze the quarterly figures", task_type);
        task.mark_running();
        task.mark_completed(TaskResult::text(content));
        task
    }

    #[tokio::test]
    async fn test_good_generation_result_passes() {
        let task = completed_task(
            "generation",
            "Dear team, attached is the quarterly summary you requested. \
             Revenue grew steadily and costs held flat across all regions.",
        );
        let report = approving_validator()
            .validate(&task, "Generate a short professional email", None)
            .await;

        assert!(report.passed);
        assert_eq!(report.checks.len(), 5);
        assert_eq!(report.confidence, 100);
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_short_analysis_fails_on_length() {
        // Structural and quality both pass; the analysis-specific minimum
        // length does not.
        let task = completed_task("analysis", "Looks good to me.");
        let report = approving_validator()
            .validate(&task, "Analyze the report", None)
            .await;

        let structural = &report.checks[0];
        let quality = &report.checks[1];
        let task_specific = &report.checks[2];
        assert!(structural.passed);
        assert!(quality.passed);
        assert!(!task_specific.passed);
        assert!(task_specific.issues[0].contains("too short"));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("Expand")));
    }

    #[tokio::test]
    async fn test_placeholder_and_repetition_fail_quality() {
        let task = completed_task(
            "generation",
            "TODO fill this in later later later later later later later later later \
             later later later later later later later later later later later.",
        );
        let report = approving_validator().validate(&task, "req", None).await;

        let quality = &report.checks[1];
        assert!(!quality.passed);
        assert!(quality.issues.iter().any(|i| i.contains("placeholder")));
        assert!(quality.issues.iter().any(|i| i.contains("repetitive")));
    }

    #[tokio::test]
    async fn test_missing_result_fails_structural() {
        let task = Task::new("Nothing happened", "generation");
        let report = approving_validator().validate(&task, "req", None).await;
        assert!(!report.checks[0].passed);
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_malformed_semantic_reply_is_failed_check() {
        let validator = Validator::new(Arc::new(VerdictBackend {
            reply: "sure, it looks valid to me!".to_string(),
        }));
        let task = completed_task(
            "generation",
            "Dear team, attached is the quarterly summary you requested. \
             Revenue grew steadily and costs held flat across all regions.",
        );
        let report = validator.validate(&task, "req", None).await;

        let semantic = &report.checks[3];
        assert!(!semantic.passed);
        assert_eq!(semantic.score, 0);
        assert!(semantic.issues[0].contains("unparsable"));
        // 4/5 still clears the normal threshold
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_strict_mode_raises_threshold() {
        let validator = Validator::new(Arc::new(VerdictBackend {
            reply: "not json".to_string(),
        }))
        .strict();
        let task = completed_task(
            "generation",
            "Dear team, attached is the quarterly summary you requested. \
             Revenue grew steadily and costs held flat across all regions.",
        );
        let report = validator.validate(&task, "req", None).await;
        // 4/5 = 0.8 < 0.9
        assert!(!report.passed);
        assert_eq!(report.confidence, 80);
    }

    #[tokio::test]
    async fn test_consistency_drift_flagged() {
        let task = completed_task(
            "execution",
            "The deployment completed cleanly across every target environment today.",
        );
        let mut drifted = Task::new("Follow-up", "execution");
        drifted.mark_running();
        drifted.mark_completed(TaskResult::tool(serde_json::json!({"rows": 3})));

        let prior = task.result.clone().unwrap();
        let report = approving_validator()
            .validate(&drifted, "req", Some(&prior))
            .await;

        let consistency = &report.checks[4];
        assert!(!consistency.passed);
        assert!(consistency.issues[0].contains("drift"));
    }

    #[tokio::test]
    async fn test_recommendations_deduplicated_and_capped() {
        let task = Task::new("Empty everything", "analysis");
        let validator = Validator::new(Arc::new(VerdictBackend {
            reply: r#"{"isValid": false, "confidence": 5,
                       "issues": ["too short", "too short", "off-topic"],
                       "reasoning": "bad"}"#
                .to_string(),
        }));
        let report = validator.validate(&task, "req", None).await;

        assert!(report.recommendations.len() <= MAX_RECOMMENDATIONS);
        let mut sorted = report.recommendations.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), report.recommendations.len());
    }

    #[test]
    fn test_parse_verdict_with_fences() {
        let reply = "```json\n{\"isValid\": false, \"confidence\": 10, \"issues\": [\"vague\"], \"reasoning\": \"x\"}\n```";
        let verdict = parse_verdict(reply).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.issues, vec!["vague"]);
    }
}
