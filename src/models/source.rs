use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Format family of a monitored log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// fail2ban action log (`Ban` / `Found` lines)
    Fail2ban,
    /// sshd auth log (`Accepted ...` lines)
    Auth,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Fail2ban => f.write_str("fail2ban"),
            LogType::Auth => f.write_str("auth"),
        }
    }
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail2ban" => Ok(LogType::Fail2ban),
            "auth" | "secure" => Ok(LogType::Auth),
            other => Err(format!("unknown log type: {}", other)),
        }
    }
}

/// One monitored log file and the substrings that mark interesting lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSource {
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub path: PathBuf,
    /// Checked in order; only the first match is classified
    pub patterns: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl LogSource {
    pub fn new<P: Into<PathBuf>>(log_type: LogType, path: P, patterns: &[&str]) -> Self {
        LogSource {
            log_type,
            path: path.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            enabled: true,
        }
    }

    /// The standard fail2ban, Debian auth.log and RHEL secure sources
    pub fn defaults() -> Vec<LogSource> {
        let auth_patterns = [
            "Accepted password for",
            "Accepted publickey for",
            "session opened for user",
        ];
        vec![
            LogSource::new(LogType::Fail2ban, "/var/log/fail2ban.log", &["Ban", "Found"]),
            LogSource::new(LogType::Auth, "/var/log/auth.log", &auth_patterns),
            LogSource::new(LogType::Auth, "/var/log/secure", &auth_patterns),
        ]
    }
}
