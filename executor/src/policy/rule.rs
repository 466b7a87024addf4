use serde::{Deserialize, Serialize};

/// One deny-list entry: a regular expression and what it stands for
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub pattern: String,
    pub description: String,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            description: description.into(),
        }
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_RULES: Vec<Rule> = vec![
        Rule::new(
            r"\b(?:import|from)\s+(?:[\w.]+\s*,\s*)*(?:os|posix|nt)\b",
            "operating system interface",
        ),
        Rule::new(
            r"\b(?:import|from)\s+(?:[\w.]+\s*,\s*)*(?:subprocess|pty|multiprocessing)\b",
            "process spawning",
        ),
        Rule::new(
            r"\b(?:import|from)\s+(?:[\w.]+\s*,\s*)*(?:socket|ssl|urllib|http|requests|ftplib|smtplib|telnetlib)\b",
            "network access",
        ),
        Rule::new(
            r"\b(?:import|from)\s+(?:[\w.]+\s*,\s*)*(?:shutil|pathlib|tempfile|glob)\b",
            "filesystem manipulation",
        ),
        Rule::new(
            r"\b(?:import|from)\s+(?:[\w.]+\s*,\s*)*(?:ctypes|cffi|signal|resource|importlib)\b",
            "low level runtime access",
        ),
        Rule::new(r"\b__import__\s*\(", "dynamic import"),
        Rule::new(r"\b(?:eval|exec|compile)\s*\(", "dynamic code evaluation"),
        Rule::new(r"\bopen\s*\(", "raw file open"),
        Rule::new(r"\b__builtins__\b|\b(?:globals|locals|vars)\s*\(", "interpreter internals"),
        Rule::new(r"\bsys\s*\.\s*modules\b", "module table access"),
        Rule::new(r"\b(?:os\s*\.\s*)?environ\b|\bgetenv\s*\(", "environment access"),
    ];
}

/// Deny-list used when the config does not list its own rules
pub fn default_rules() -> Vec<Rule> {
    DEFAULT_RULES.clone()
}
