//! Inbound path to upstream path mapping.

use std::borrow::Cow;

/// How a matching prefix is turned into the upstream path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteStrategy {
    /// Replace the whole path, suffix included.
    Replace(String),
    /// Drop the prefix; an empty remainder becomes `default`.
    StripPrefix { default: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub prefix: String,
    pub strategy: RewriteStrategy,
}

impl RouteRule {
    pub fn replace(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            strategy: RewriteStrategy::Replace(path.into()),
        }
    }

    pub fn strip(prefix: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            strategy: RewriteStrategy::StripPrefix {
                default: default.into(),
            },
        }
    }
}

/// Ordered rewrite rules, first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

pub const CAMERA_PREFIX: &str = "/dash/limelight/camera";
pub const DASHBOARD_PREFIX: &str = "/dash/limelight/dashboard";
pub const API_PREFIX: &str = "/dash/limelight/api";

/// MJPEG endpoint served by the camera.
pub const STREAM_PATH: &str = "/stream.mjpeg";
pub const DEFAULT_API_PATH: &str = "/status";

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// The fixed Limelight table: camera, dashboard, api.
    pub fn limelight() -> Self {
        Self::new(vec![
            RouteRule::replace(CAMERA_PREFIX, STREAM_PATH),
            RouteRule::strip(DASHBOARD_PREFIX, "/"),
            RouteRule::strip(API_PREFIX, DEFAULT_API_PATH),
        ])
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Maps an inbound path to the upstream path. Unmatched paths pass through.
    pub fn rewrite<'a>(&'a self, path: &'a str) -> Cow<'a, str> {
        for rule in &self.rules {
            let Some(rest) = path.strip_prefix(rule.prefix.as_str()) else {
                continue;
            };

            return match &rule.strategy {
                RewriteStrategy::Replace(target) => Cow::Borrowed(target.as_str()),
                RewriteStrategy::StripPrefix { default } if rest.is_empty() => {
                    Cow::Borrowed(default.as_str())
                }
                RewriteStrategy::StripPrefix { .. } => Cow::Borrowed(rest),
            };
        }

        Cow::Borrowed(path)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::limelight()
    }
}
