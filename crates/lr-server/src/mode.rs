//! Development/production switch.

use std::fmt;

/// Runtime mode gating the live reload mechanism.
///
/// Live reload only runs in [`Mode::Development`]. In production no push
/// endpoint is registered, no watcher is started and no script is injected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Local iterative work: live reload active.
    #[default]
    Development,
    /// Deployed instance: live reload disabled.
    Production,
}

impl Mode {
    /// Environment variable read by [`Mode::from_env`].
    pub const ENV_VAR: &'static str = "LR_ENV";

    /// Interpret an environment name.
    ///
    /// `development`, `dev` (any case) and the empty string mean development;
    /// every other value means production.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty()
            || value.eq_ignore_ascii_case("development")
            || value.eq_ignore_ascii_case("dev")
        {
            Self::Development
        } else {
            Self::Production
        }
    }

    /// Read the mode from `LR_ENV`, defaulting to development when unset.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(Self::ENV_VAR).map_or(Self::Development, |v| Self::parse(&v))
    }

    /// Whether live reload should run.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}
