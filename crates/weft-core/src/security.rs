use std::path::{Component, Path, PathBuf};

/// Programs the command sandbox may run. Compiled in, never loaded from
/// configuration, so the policy cannot be bypassed by config injection.
pub const SAFE_COMMANDS: &[&str] = &[
    "ls", "cat", "echo", "printf", "pwd", "grep", "find", "head", "tail", "wc", "sort", "uniq",
    "cut", "tr", "date", "whoami", "which", "env", "sleep", "mkdir", "touch", "cp", "mv", "diff",
    "sed", "awk", "tar", "gzip", "node", "npm", "npx", "python", "python3", "pip", "git", "curl",
];

/// A pattern that marks a command as dangerous.
#[derive(Debug, Clone)]
pub struct DangerousPattern {
    pub pattern: String,
    pub label: String,
}

impl DangerousPattern {
    fn new(pattern: &str, label: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            label: label.to_string(),
        }
    }
}

/// Built-in dangerous command patterns. Like the whitelist, these are fixed
/// at compile time.
pub fn default_patterns() -> Vec<DangerousPattern> {
    vec![
        DangerousPattern::new(r"rm\s+(-\w+\s+)*-\w*[rf]", "forced deletion"),
        DangerousPattern::new(r"mkfs\.", "format filesystem"),
        DangerousPattern::new(r"dd\s+if=", "raw disk write"),
        DangerousPattern::new(r">\s*/dev/", "write to device"),
        DangerousPattern::new(r"\$\(", "command substitution"),
        DangerousPattern::new(r"`", "backtick substitution"),
        DangerousPattern::new(r"\$\{", "variable-expansion injection"),
        DangerousPattern::new(r"[;&|]+\s*rm\s", "command chaining into deletion"),
    ]
}

/// Compiled regex cache for dangerous command detection.
pub struct DangerousPatternMatcher {
    patterns: Vec<(regex::Regex, String)>,
}

impl DangerousPatternMatcher {
    /// Compile patterns into regex cache. Invalid patterns are skipped with a warning.
    pub fn new(patterns: &[DangerousPattern]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|p| match regex::Regex::new(&p.pattern) {
                Ok(re) => Some((re, p.label.clone())),
                Err(e) => {
                    tracing::warn!(
                        pattern = %p.pattern,
                        error = %e,
                        "Invalid dangerous pattern regex, skipping"
                    );
                    None
                }
            })
            .collect();
        Self { patterns: compiled }
    }

    /// Check if a command matches any dangerous pattern. Returns the label if matched.
    pub fn is_dangerous(&self, command: &str) -> Option<&str> {
        for (re, label) in &self.patterns {
            if re.is_match(command) {
                return Some(label.as_str());
            }
        }
        None
    }
}

impl Default for DangerousPatternMatcher {
    fn default() -> Self {
        Self::new(&default_patterns())
    }
}

/// Check whether a program name is in the compiled-in whitelist.
pub fn is_whitelisted(program: &str) -> bool {
    SAFE_COMMANDS.contains(&program)
}

/// Validate every path-like token of a command against the working directory.
/// Returns the reason for rejection, or `None` when all paths are confined.
///
/// A token is path-like when it contains a separator or starts with a dot.
/// Any `..` segment is rejected outright; absolute paths must resolve under
/// the working directory after lexical normalization.
pub fn validate_paths(command: &str, working_dir: &Path) -> Option<String> {
    for token in command.split_whitespace().skip(1) {
        let token = token.trim_matches(|c| c == '"' || c == '\'');
        if !looks_like_path(token) {
            continue;
        }

        let path = Path::new(token);
        if path.components().any(|c| c == Component::ParentDir) {
            return Some(format!("path '{}' contains a parent-directory segment", token));
        }

        if path.is_absolute() {
            let normalized = normalize(path);
            if !normalized.starts_with(working_dir) {
                return Some(format!(
                    "path '{}' resolves outside the working directory",
                    token
                ));
            }
        }
    }
    None
}

fn looks_like_path(token: &str) -> bool {
    if token.contains("://") {
        // URL, handled by the whitelist decision for the program itself
        return false;
    }
    token.contains('/') || token.starts_with('.')
}

/// Lexical normalization: resolves `.` segments without touching the
/// filesystem. `..` never survives to this point.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_catches_all_defaults() {
        let matcher = DangerousPatternMatcher::default();

        assert_eq!(matcher.is_dangerous("rm -rf /"), Some("forced deletion"));
        assert_eq!(matcher.is_dangerous("rm -f data.txt"), Some("forced deletion"));
        assert_eq!(matcher.is_dangerous("mkfs.ext4 /dev/sda1"), Some("format filesystem"));
        assert_eq!(matcher.is_dangerous("dd if=/dev/zero of=/dev/sda"), Some("raw disk write"));
        assert_eq!(matcher.is_dangerous("echo x > /dev/sda"), Some("write to device"));
        assert_eq!(matcher.is_dangerous("echo $(whoami)"), Some("command substitution"));
        assert_eq!(matcher.is_dangerous("echo `whoami`"), Some("backtick substitution"));
        assert_eq!(
            matcher.is_dangerous("echo ${HOME}"),
            Some("variable-expansion injection")
        );
        assert_eq!(
            matcher.is_dangerous("ls; rm important.txt"),
            Some("command chaining into deletion")
        );
    }

    #[test]
    fn matcher_allows_ordinary_commands() {
        let matcher = DangerousPatternMatcher::default();
        assert!(matcher.is_dangerous("ls -la").is_none());
        assert!(matcher.is_dangerous("echo hello").is_none());
        assert!(matcher.is_dangerous("git status").is_none());
        assert!(matcher.is_dangerous("grep -n main src/lib.rs").is_none());
    }

    #[test]
    fn whitelist_membership() {
        assert!(is_whitelisted("echo"));
        assert!(is_whitelisted("git"));
        assert!(!is_whitelisted("bash"));
        assert!(!is_whitelisted("sudo"));
        assert!(!is_whitelisted("rm"));
    }

    #[test]
    fn paths_with_parent_segments_rejected() {
        let dir = Path::new("/tmp/project");
        let reason = validate_paths("cat ../secrets.txt", dir);
        assert!(reason.unwrap().contains("parent-directory"));
    }

    #[test]
    fn absolute_paths_outside_working_dir_rejected() {
        let dir = Path::new("/tmp/project");
        let reason = validate_paths("cat /etc/passwd", dir);
        assert!(reason.unwrap().contains("outside the working directory"));
    }

    #[test]
    fn confined_paths_accepted() {
        let dir = Path::new("/tmp/project");
        assert!(validate_paths("cat notes.txt", dir).is_none());
        assert!(validate_paths("cat ./sub/notes.txt", dir).is_none());
        assert!(validate_paths("cat /tmp/project/sub/notes.txt", dir).is_none());
        assert!(validate_paths("cat /tmp/project/./notes.txt", dir).is_none());
    }

    #[test]
    fn urls_are_not_treated_as_paths() {
        let dir = Path::new("/tmp/project");
        assert!(validate_paths("curl https://example.com/data.json", dir).is_none());
    }
}
