//! Reference security analyzer
//!
//! Flags hardcoded credentials, dynamic code execution and shell command
//! injection. Exists to exercise the platform, not as a complete scanner.

use super::context::AnalysisContext;
use super::rules::{scan, PatternRule};
use super::traits::AnalysisCapability;
use super::types::{AgentSuggestion, AgentType, ChangeType, Finding, Severity, TriggerEvent};
use crate::error::Result;
use async_trait::async_trait;

pub struct SecurityAnalyzer {
    rules: Vec<PatternRule>,
    /// Subset of `rules` that detect credentials
    credential_rules: Vec<PatternRule>,
}

impl SecurityAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: vec![
                PatternRule::new(
                    r"\beval\s*\(",
                    "Dynamic code evaluation",
                    "Use of eval() can lead to code injection",
                    "Parse the input explicitly instead of evaluating it",
                    Severity::Critical,
                    0.85,
                    "injection",
                )?,
                PatternRule::new(
                    r"\bexec\s*\(",
                    "Dynamic code execution",
                    "Use of exec() can lead to code injection",
                    "Avoid dynamic code execution or validate input strictly",
                    Severity::Critical,
                    0.8,
                    "injection",
                )?,
                PatternRule::new(
                    r"pickle\.loads?\s*\(",
                    "Unsafe deserialization",
                    "Unpickling untrusted data can execute arbitrary code",
                    "Use JSON or validate the data source",
                    Severity::High,
                    0.8,
                    "deserialization",
                )?,
                PatternRule::new(
                    r"os\.system\s*\(|shell\s*=\s*True|child_process\.exec\s*\(",
                    "Shell command execution",
                    "Commands run through a shell are open to injection",
                    "Pass arguments as a list without a shell",
                    Severity::High,
                    0.85,
                    "command-injection",
                )?,
            ],
            credential_rules: Self::credential_rules()?,
        })
    }

    fn credential_rules() -> Result<Vec<PatternRule>> {
        Ok(vec![
            PatternRule::new(
                r#"(?i)\b(password|passwd|pwd)\s*[=:]\s*["'][^"']+["']"#,
                "Hardcoded password",
                "Password literal committed in source",
                "Read the password from the environment or a secret store",
                Severity::High,
                0.9,
                "secrets",
            )?,
            PatternRule::new(
                r#"(?i)\bapi[_-]?key\s*[=:]\s*["'][^"']+["']"#,
                "Hardcoded API key",
                "API key literal committed in source",
                "Load API keys from environment variables or a credential store",
                Severity::High,
                0.9,
                "secrets",
            )?,
            PatternRule::new(
                r#"(?i)\bsecret\s*[=:]\s*["'][^"']+["']"#,
                "Hardcoded secret",
                "Secret literal committed in source",
                "Move the secret to environment configuration",
                Severity::High,
                0.9,
                "secrets",
            )?,
        ])
    }
}

#[async_trait]
impl AnalysisCapability for SecurityAnalyzer {
    fn agent_type(&self) -> AgentType {
        AgentType::Security
    }

    async fn analyze(&self, context: &AnalysisContext) -> Result<Vec<Finding>> {
        let content = context.content();
        let mut findings = scan(&self.credential_rules, content);
        findings.extend(scan(&self.rules, content));
        findings.sort_by_key(|f| f.line);
        tracing::debug!(file = %context.trigger.file, count = findings.len(), "Security scan complete");
        Ok(findings)
    }

    fn validate_trigger(&self, event: &TriggerEvent) -> bool {
        event.change_type != ChangeType::Delete
    }

    /// A proposed patch must not introduce a credential itself
    fn additional_safety_checks(&self, recommendation: &AgentSuggestion) -> bool {
        match &recommendation.code_patch {
            Some(patch) => !self.credential_rules.iter().any(|r| r.is_match(patch)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(file: &str, content: &str) -> AnalysisContext {
        let trigger = TriggerEvent::new(file, "repo", ChangeType::Modify).with_content(content);
        AnalysisContext::new("a", "security-1", AgentType::Security, trigger, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_detects_hardcoded_secret() {
        let analyzer = SecurityAnalyzer::new().unwrap();
        let findings = analyzer
            .analyze(&context("auth.ts", "const secret = \"sk-live-1234\";\nconst userName = 1;"))
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Hardcoded secret");
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_detects_injection() {
        let analyzer = SecurityAnalyzer::new().unwrap();
        let code = "eval(user_input)\ncall(cmd, shell=True)\npassword = os.environ['PW']";
        let findings = analyzer.analyze(&context("app.py", code)).await.unwrap();
        let titles: Vec<&str> = findings.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["Dynamic code evaluation", "Shell command execution"]);
    }

    #[test]
    fn test_deletes_not_analyzed() {
        let analyzer = SecurityAnalyzer::new().unwrap();
        assert!(!analyzer.validate_trigger(&TriggerEvent::new("a.py", "r", ChangeType::Delete)));
        assert!(analyzer.validate_trigger(&TriggerEvent::new("a.py", "r", ChangeType::Create)));
    }

    #[test]
    fn test_patch_with_credential_vetoed() {
        let analyzer = SecurityAnalyzer::new().unwrap();
        let mut rec = AgentSuggestion {
            id: "1".into(),
            title: "t".into(),
            description: "d".into(),
            severity: Severity::High,
            confidence: 0.9,
            reasoning: String::new(),
            code_patch: Some("api_key = \"abc\"".into()),
            tags: vec![],
        };
        assert!(!analyzer.additional_safety_checks(&rec));
        rec.code_patch = Some("api_key = os.environ[\"API_KEY\"]".into());
        assert!(analyzer.additional_safety_checks(&rec));
    }
}
