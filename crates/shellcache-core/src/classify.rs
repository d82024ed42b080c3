//! Request classification.
//!
//! Maps an intercepted request to the strategy that serves it. Rules, first
//! match wins:
//!
//! 1. Non-GET requests pass through untouched.
//! 2. Cross-origin requests pass through untouched.
//! 3. Paths under the image segment with an image extension are `Image`.
//! 4. Paths in the Shell Resource List are `Shell` (`/` and the shell-root
//!    document are the same resource).
//! 5. Everything else is `Default`.

use std::collections::HashSet;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Shell,
    Image,
    Default,
}

impl ResourceClass {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceClass::Shell => "shell",
            ResourceClass::Image => "image",
            ResourceClass::Default => "default",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not managed; the host performs the request itself.
    PassThrough,
    Handle(ResourceClass),
}

/// Which paths count as images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRule {
    /// Segment the path must contain, e.g. `/assets/`.
    pub path_segment: String,
    /// Suffixes including the dot, matched case-sensitively.
    pub extensions: Vec<String>,
}

impl Default for ImageRule {
    fn default() -> Self {
        Self {
            path_segment: "/assets/".to_string(),
            extensions: [".webp", ".png", ".jpg", ".jpeg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ImageRule {
    pub fn matches(&self, path: &str) -> bool {
        path.contains(self.path_segment.as_str())
            && self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    origin: String,
    shell_root: String,
    shell_paths: HashSet<String>,
    images: ImageRule,
}

impl Classifier {
    pub fn new(origin: &Url, shell_root: &str, shell_files: &[String], images: ImageRule) -> Self {
        let shell_paths = shell_files
            .iter()
            .map(|path| normalize(path, shell_root).to_string())
            .collect();
        Self {
            origin: origin.origin().ascii_serialization(),
            shell_root: shell_root.to_string(),
            shell_paths,
            images,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            &config.origin_url()?,
            &config.shell_root,
            &config.shell_files,
            config.images.clone(),
        ))
    }

    pub fn classify(&self, request: &Request) -> Route {
        if !request.is_safe() || request.origin() != self.origin {
            return Route::PassThrough;
        }

        let path = request.path();
        let class = if self.images.matches(path) {
            ResourceClass::Image
        } else if self.shell_paths.contains(normalize(path, &self.shell_root)) {
            ResourceClass::Shell
        } else {
            ResourceClass::Default
        };
        Route::Handle(class)
    }

    /// `/` or the shell-root document itself.
    pub fn is_shell_root(&self, path: &str) -> bool {
        normalize(path, &self.shell_root) == self.shell_root
    }

    pub fn shell_root(&self) -> &str {
        &self.shell_root
    }
}

fn normalize<'a>(path: &'a str, shell_root: &'a str) -> &'a str {
    if path == "/" {
        shell_root
    } else {
        path
    }
}
