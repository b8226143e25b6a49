//! Allow/deny policy for calls dispatched by name from expression text
//!
//! Targets are qualified names of the form `Type.method` (or a bare `Type` when
//! an expression asks for a type handle with `$('Type')`). A non-empty allow
//! list is authoritative; otherwise the deny list is.

use crate::config::SecurityConfig;
use crate::error::{FelError, FelResult};
use tracing::warn;

/// Targets denied when no deny list is configured: process, runtime,
/// file-system and network primitives plus the engine's own internals.
pub const DEFAULT_DENY: &[&str] = &[
    "System.*",
    "Runtime.*",
    "Process.*",
    "File.*",
    "net.*",
    "fel.compile.*",
    "fel.security.*",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// `*`
    Any,
    /// `Type.*`, matches `Type` and everything below it
    Prefix(String),
    /// Exact target name
    Exact(String),
}

impl Pattern {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            Pattern::Any
        } else if let Some(prefix) = raw.strip_suffix(".*") {
            Pattern::Prefix(prefix.to_string())
        } else {
            Pattern::Exact(raw.to_string())
        }
    }

    fn matches(&self, target: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Prefix(prefix) => {
                target == prefix
                    || (target.starts_with(prefix.as_str())
                        && target[prefix.len()..].starts_with('.'))
            }
            Pattern::Exact(name) => target == name,
        }
    }
}

/// Gate consulted before every reflective call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityManager {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
}

impl Default for SecurityManager {
    fn default() -> Self {
        Self::with_default_policy()
    }
}

impl SecurityManager {
    /// Create a manager from explicit pattern lists
    pub fn new<A, D, S>(allow: A, deny: D) -> Self
    where
        A: IntoIterator<Item = S>,
        D: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allow: allow.into_iter().map(|p| Pattern::parse(p.as_ref())).collect(),
            deny: deny.into_iter().map(|p| Pattern::parse(p.as_ref())).collect(),
        }
    }

    /// Empty allow list plus [`DEFAULT_DENY`]
    pub fn with_default_policy() -> Self {
        Self::new(Vec::<&str>::new(), DEFAULT_DENY.iter().copied())
    }

    /// Allows every target
    pub fn permissive() -> Self {
        Self::new(Vec::<&str>::new(), Vec::<&str>::new())
    }

    /// Build from configuration; an absent deny list means the default one
    pub fn from_config(config: &SecurityConfig) -> Self {
        match &config.deny {
            Some(deny) => Self::new(config.allow.iter(), deny.iter()),
            None => Self::new(
                config.allow.iter().map(String::as_str),
                DEFAULT_DENY.iter().copied(),
            ),
        }
    }

    /// Check whether `target` may be invoked
    pub fn is_callable(&self, target: &str) -> bool {
        if !self.allow.is_empty() {
            return self.allow.iter().any(|p| p.matches(target));
        }
        !self.deny.iter().any(|p| p.matches(target))
    }

    /// Like [`SecurityManager::is_callable`] but fails with a security error
    pub fn check(&self, target: &str) -> FelResult<()> {
        if self.is_callable(target) {
            Ok(())
        } else {
            warn!(target_name = target, "Blocked call from expression");
            Err(FelError::security(target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_blocks_sensitive_types() {
        let security = SecurityManager::with_default_policy();
        assert!(!security.is_callable("System.getenv"));
        assert!(!security.is_callable("System"));
        assert!(!security.is_callable("File.read"));
        assert!(!security.is_callable("Process.id"));
        assert!(!security.is_callable("net.Socket.connect"));
        assert!(!security.is_callable("fel.compile.build"));
        assert!(security.is_callable("Math.min"));
        assert!(security.is_callable("String.upper"));
    }

    #[test]
    fn test_prefix_does_not_match_longer_names() {
        let security = SecurityManager::with_default_policy();
        assert!(security.is_callable("SystemInfo.version"));
    }

    #[test]
    fn test_allow_list_is_authoritative() {
        let security = SecurityManager::new(["Math.*", "String.len"], ["Math.*"]);
        assert!(security.is_callable("Math.max"));
        assert!(security.is_callable("String.len"));
        assert!(!security.is_callable("String.upper"));
    }

    #[test]
    fn test_check_reports_target() {
        let security = SecurityManager::new(Vec::<&str>::new(), ["*"]);
        let err = security.check("Math.min").unwrap_err();
        assert_eq!(err, FelError::security("Math.min"));
    }

    #[test]
    fn test_from_config() {
        let config = SecurityConfig { allow: vec![], deny: Some(vec![]) };
        assert!(SecurityManager::from_config(&config).is_callable("System.getenv"));

        let config = SecurityConfig::default();
        assert!(!SecurityManager::from_config(&config).is_callable("System.getenv"));
    }
}
