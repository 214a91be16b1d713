//! Reference code-quality analyzer

use super::context::AnalysisContext;
use super::rules::{scan, PatternRule};
use super::traits::AnalysisCapability;
use super::types::{AgentType, ChangeType, Finding, Severity, TriggerEvent};
use crate::error::Result;
use async_trait::async_trait;

pub const MAX_LINE_LENGTH: usize = 120;

const SOURCE_PATTERNS: &[&str] = &[
    "*.rs", "*.py", "*.ts", "*.tsx", "*.js", "*.jsx", "*.go", "*.java",
];

pub struct QualityAnalyzer {
    rules: Vec<PatternRule>,
    /// snake_case bindings in JavaScript-family files
    js_naming: PatternRule,
    /// camelCase bindings in Rust and Python files
    snake_naming: PatternRule,
}

impl QualityAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: vec![
                PatternRule::new(
                    r"\bprint\s*\(|console\.log\s*\(|\bdbg!\s*\(",
                    "Leftover debug output",
                    "Debug output statement left in code",
                    "Remove debug output or use the project logger",
                    Severity::Low,
                    0.6,
                    "style",
                )?,
                PatternRule::new(
                    r"\b(TODO|FIXME|XXX)\b",
                    "Unresolved TODO marker",
                    "TODO/FIXME comment found",
                    "Address the debt or link a tracking issue",
                    Severity::Info,
                    0.5,
                    "maintainability",
                )?,
                PatternRule::new(
                    r"import\s+\*|from\s+\S+\s+import\s+\*",
                    "Wildcard import",
                    "Wildcard imports hide where names come from",
                    "Import the names you use explicitly",
                    Severity::Medium,
                    0.65,
                    "style",
                )?,
            ],
            js_naming: PatternRule::new(
                r"\b(?:let|const|var)\s+[a-z][a-z0-9]*_[a-z0-9_]+\b",
                "Naming convention",
                "Variable uses snake_case where camelCase is expected",
                "Rename the binding to camelCase",
                Severity::Low,
                0.6,
                "naming",
            )?,
            snake_naming: PatternRule::new(
                r"\b(?:let|fn|def)\s+(?:mut\s+)?[a-z]+[A-Z][A-Za-z0-9]*\b",
                "Naming convention",
                "Binding uses camelCase where snake_case is expected",
                "Rename the binding to snake_case",
                Severity::Low,
                0.6,
                "naming",
            )?,
        })
    }

    fn naming_rule(&self, file: &str) -> Option<&PatternRule> {
        let ext = file.rsplit('.').next().unwrap_or("");
        match ext {
            "ts" | "tsx" | "js" | "jsx" => Some(&self.js_naming),
            "rs" | "py" => Some(&self.snake_naming),
            _ => None,
        }
    }
}

#[async_trait]
impl AnalysisCapability for QualityAnalyzer {
    fn agent_type(&self) -> AgentType {
        AgentType::Quality
    }

    async fn analyze(&self, context: &AnalysisContext) -> Result<Vec<Finding>> {
        let content = context.content();
        let mut findings = scan(&self.rules, content);

        if let Some(rule) = self.naming_rule(&context.trigger.file) {
            findings.extend(scan(std::slice::from_ref(rule), content));
        }

        for (idx, line) in content.lines().enumerate() {
            let len = line.chars().count();
            if len > MAX_LINE_LENGTH {
                findings.push(Finding {
                    title: "Line too long".to_string(),
                    description: format!("Line is {} characters, limit is {}", len, MAX_LINE_LENGTH),
                    severity: Severity::Low,
                    confidence: 0.6,
                    reasoning: "Long lines hurt readability and diffs".to_string(),
                    line: Some(idx as u32 + 1),
                    code_patch: None,
                    tags: vec!["style".to_string()],
                });
            }
        }

        findings.sort_by_key(|f| f.line);
        Ok(findings)
    }

    fn validate_trigger(&self, event: &TriggerEvent) -> bool {
        event.change_type != ChangeType::Delete
    }

    fn default_trigger_patterns(&self) -> Vec<String> {
        SOURCE_PATTERNS.iter().map(|p| p.to_string()).collect()
    }
}
