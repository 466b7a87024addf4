//! Lexical deny-list scan over submitted source
//!
//! This is a cheap first pass and trivially bypassed (aliasing, string
//! building, encodings); the sandbox remains the security boundary.
mod rule;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

pub use rule::{default_rules, Rule};

/// What the coordinator does when the filter reports something
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PolicyMode {
    /// execute anyway, report violations in the result
    #[default]
    Advisory,
    /// refuse to execute
    Reject,
}

/// A deny-listed construct found in source text
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    /// the rule pattern that matched
    pub pattern: String,
    pub description: String,
    /// 1-based line of the first match
    pub line: usize,
}

pub struct Filter {
    set: RegexSet,
    rules: Vec<Rule>,
}

impl Filter {
    /// Compile the deny-list, fails if any pattern is not a valid regex
    pub fn new(rules: Vec<Rule>) -> Result<Self, regex::Error> {
        let set = RegexSet::new(rules.iter().map(|rule| rule.pattern.as_str()))?;
        Ok(Self { set, rules })
    }
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
    /// Report every rule that matches somewhere in `source`
    ///
    /// Each rule is reported at most once, at its first matching line, in
    /// order of appearance.
    pub fn check(&self, source: &str) -> Vec<PolicyViolation> {
        let mut seen = vec![false; self.rules.len()];
        let mut violations = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            for matched in self.set.matches(line).iter() {
                if std::mem::replace(&mut seen[matched], true) {
                    continue;
                }
                let rule = &self.rules[matched];
                violations.push(PolicyViolation {
                    pattern: rule.pattern.clone(),
                    description: rule.description.clone(),
                    line: idx + 1,
                });
            }
        }
        violations
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(default_rules()).expect("built-in deny-list must compile")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn descriptions(source: &str) -> Vec<String> {
        Filter::default()
            .check(source)
            .into_iter()
            .map(|v| v.description)
            .collect()
    }

    #[test]
    fn clean_source() {
        let filter = Filter::default();
        assert!(filter.check("print(\"Hello, World!\")\n").is_empty());
        assert!(filter.check("while True: pass").is_empty());
        assert!(filter
            .check("def reopen(x):\n    return x * 2\nprint(reopen(3))\n")
            .is_empty());
        assert!(filter.check("").is_empty());
    }

    #[test]
    fn every_builtin_rule_is_reported_by_pattern() {
        let filter = Filter::default();
        let samples = [
            "import os",
            "import subprocess",
            "from socket import socket",
            "import shutil",
            "import ctypes",
            "m = __import__('os')",
            "eval('1+1')",
            "f = open('/etc/passwd')",
            "print(globals())",
            "import sys\nsys.modules['x']",
            "print(environ)",
        ];
        for (rule, sample) in filter.rules().iter().zip(samples) {
            let violations = filter.check(sample);
            assert!(
                violations.iter().any(|v| v.pattern == rule.pattern),
                "`{}` not reported for {:?}",
                rule.pattern,
                sample
            );
        }
    }

    #[test]
    fn import_lists() {
        assert_eq!(descriptions("import sys, os"), vec!["operating system interface"]);
        assert_eq!(descriptions("import os.path"), vec!["operating system interface"]);
        assert!(descriptions("import osmosis").is_empty());
    }

    #[test]
    fn first_line_reported_once() {
        let filter = Filter::default();
        let violations = filter.check("print(1)\nimport os\nimport os\n");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 2);
    }

    #[test]
    fn comments_are_scanned() {
        assert_eq!(descriptions("# import os"), vec!["operating system interface"]);
    }

    #[test]
    fn custom_rules() {
        let filter = Filter::new(vec![Rule::new(r"\bwhile\s+True\b", "busy loop")]).unwrap();
        let violations = filter.check("x = 1\nwhile True: pass\n");
        assert_eq!(
            violations,
            vec![PolicyViolation {
                pattern: r"\bwhile\s+True\b".to_owned(),
                description: "busy loop".to_owned(),
                line: 2,
            }]
        );
        assert!(Filter::new(vec![Rule::new("(", "broken")]).is_err());
    }
}
