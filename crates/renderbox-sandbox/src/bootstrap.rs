//! Bootstrap resource loading.
//!
//! Every new execution context is loaded from a fixed bootstrap resource: an
//! HTML shell that establishes the baseline document before any artifact
//! content is painted into it. The shell must contain the content slot
//! (`{{artifact}}`); a resource without it is rejected at load time rather
//! than producing empty documents at render time.

use std::io::{self, Read};
use std::path::Path;

use thiserror::Error;

/// Placeholder the painted artifact body is substituted into.
pub const CONTENT_SLOT: &str = "{{artifact}}";

const BUILTIN_SHELL: &str = "\
<!doctype html>
<html>
<head>
<meta charset=\"utf-8\">
<meta name=\"referrer\" content=\"no-referrer\">
<style>
  body { margin: 0; font-family: system-ui, sans-serif; }
  main { padding: 1rem; }
  pre { overflow-x: auto; background: #f6f6f6; padding: .75rem; }
</style>
</head>
<body>
<main id=\"artifact-root\">{{artifact}}</main>
</body>
</html>
";

/// Error loading or validating a bootstrap resource.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("reading bootstrap resource: {0}")]
    Io(#[from] io::Error),

    #[error("bootstrap resource is missing the content slot `{CONTENT_SLOT}`")]
    MissingContentSlot,
}

/// The fixed baseline document a context is bootstrapped from.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    shell: String,
}

impl Bootstrap {
    /// Load the bootstrap shell from `path`, or fall back to the builtin
    /// shell when no path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, BootstrapError> {
        match path {
            Some(path) => {
                let mut shell = String::new();
                std::fs::File::open(path)?.read_to_string(&mut shell)?;
                Self::from_shell(shell)
            }
            None => Ok(Self::builtin()),
        }
    }

    /// The builtin baseline shell.
    pub fn builtin() -> Self {
        Self {
            shell: BUILTIN_SHELL.to_string(),
        }
    }

    /// Build from an already-read shell string, validating the content slot.
    pub fn from_shell(shell: String) -> Result<Self, BootstrapError> {
        if !shell.contains(CONTENT_SLOT) {
            return Err(BootstrapError::MissingContentSlot);
        }
        Ok(Self { shell })
    }

    /// Substitute the painted artifact body into the shell.
    pub fn apply(&self, body: &str) -> String {
        self.shell.replacen(CONTENT_SLOT, body, 1)
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::builtin()
    }
}
