//! Line-oriented regex rules shared by the reference analyzers

use super::types::{Finding, Severity};
use crate::error::{AgentError, Result};
use regex::Regex;

pub struct PatternRule {
    regex: Regex,
    pub title: &'static str,
    pub description: &'static str,
    pub suggestion: &'static str,
    pub severity: Severity,
    pub confidence: f64,
    pub tag: &'static str,
}

impl PatternRule {
    pub fn new(
        pattern: &str,
        title: &'static str,
        description: &'static str,
        suggestion: &'static str,
        severity: Severity,
        confidence: f64,
        tag: &'static str,
    ) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| AgentError::Config(format!("invalid rule pattern {}: {}", pattern, e)))?;
        Ok(Self {
            regex,
            title,
            description,
            suggestion,
            severity,
            confidence,
            tag,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn finding(&self, line_no: u32, line: &str) -> Finding {
        Finding {
            title: self.title.to_string(),
            description: self.description.to_string(),
            severity: self.severity,
            confidence: self.confidence,
            reasoning: format!("{} (line {}: `{}`)", self.suggestion, line_no, line.trim()),
            line: Some(line_no),
            code_patch: None,
            tags: vec![self.tag.to_string()],
        }
    }
}

/// One finding per rule per matching line, in line order
pub fn scan(rules: &[PatternRule], content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for rule in rules.iter().filter(|r| r.is_match(line)) {
            findings.push(rule.finding(idx as u32 + 1, line));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_reports_line_numbers() {
        let rule = PatternRule::new(r"eval\s*\(", "Eval", "d", "s", Severity::Critical, 0.8, "injection").unwrap();
        let findings = scan(&[rule], "let a = 1;\neval (input)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(2));
        assert!(findings[0].reasoning.contains("`eval (input)`"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = PatternRule::new("(", "t", "d", "s", Severity::Low, 0.5, "x").err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
