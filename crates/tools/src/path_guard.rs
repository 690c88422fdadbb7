//! Path validation shared by the file tools.
//!
//! Relative paths resolve against the workspace root when one is set, and
//! the resolved path must stay inside it. A few credential locations are
//! refused everywhere.

use std::path::{Component, Path, PathBuf};

use steward_core::error::ToolError;

const FORBIDDEN_ABSOLUTE: &[&str] = &["/etc/shadow", "/etc/sudoers", "/etc/gshadow", "/proc/kcore"];
const FORBIDDEN_IN_HOME: &[&str] = &[".ssh", ".gnupg", ".aws", ".kube"];

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: Option<PathBuf>,
    forbidden: Vec<PathBuf>,
}

impl PathGuard {
    /// A guard confined to `root`, or unconfined when `root` is `None`.
    pub fn new(root: Option<PathBuf>) -> Self {
        let mut forbidden: Vec<PathBuf> = FORBIDDEN_ABSOLUTE.iter().map(PathBuf::from).collect();
        if let Ok(home) = std::env::var("HOME") {
            let home = PathBuf::from(home);
            forbidden.extend(FORBIDDEN_IN_HOME.iter().map(|d| home.join(d)));
        }
        Self {
            root: root.map(|r| r.canonicalize().unwrap_or(r)),
            forbidden,
        }
    }

    pub fn unrestricted() -> Self {
        Self::new(None)
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `raw` for `tool`, refusing traversal, forbidden locations and
    /// anything outside the root.
    pub fn resolve(&self, tool: &str, raw: &str) -> Result<PathBuf, ToolError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ToolError::InvalidArguments("path must not be empty".into()));
        }

        let input = Path::new(raw);
        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(deny(tool, format!("path traversal in '{raw}'")));
        }

        let joined = match &self.root {
            Some(root) if input.is_relative() => root.join(input),
            _ => input.to_path_buf(),
        };
        let resolved = canonical(&joined);

        if let Some(root) = &self.root
            && !resolved.starts_with(root)
        {
            return Err(deny(
                tool,
                format!("'{raw}' is outside the workspace {}", root.display()),
            ));
        }

        if self.forbidden.iter().any(|f| resolved.starts_with(f)) {
            return Err(deny(tool, format!("access to '{raw}' is not allowed")));
        }

        Ok(resolved)
    }
}

impl Default for PathGuard {
    fn default() -> Self {
        Self::unrestricted()
    }
}

/// Canonical form of `path`, falling back to the canonical parent for
/// paths that don't exist yet.
fn canonical(path: &Path) -> PathBuf {
    if let Ok(c) = path.canonicalize() {
        return c;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(p) => p.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

fn deny(tool: &str, reason: String) -> ToolError {
    ToolError::PermissionDenied {
        tool_name: tool.to_string(),
        reason,
    }
}
