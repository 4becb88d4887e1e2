//! Operating modes and the transition table.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process-wide operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward to the upstream and record the exchange
    Capture,
    /// Serve stored templates, never contact the upstream
    #[default]
    Simulate,
    /// Forward to the upstream and rewrite the exchange through middleware
    Modify,
    /// Let middleware fabricate the whole response
    Synthesize,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Capture, Mode::Simulate, Mode::Modify, Mode::Synthesize];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Capture => "capture",
            Mode::Simulate => "simulate",
            Mode::Modify => "modify",
            Mode::Synthesize => "synthesize",
        }
    }

    /// Entry in the transition table for this mode.
    pub fn rule(self) -> &'static ModeRule {
        &TRANSITIONS[self as usize]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| EngineError::InvalidMode(s.to_string()))
    }
}

/// Requirements and side effects of entering a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRule {
    pub mode: Mode,
    /// Needs a real upstream; refused in webserver configuration
    pub requires_upstream: bool,
    /// Discard every cache entry on entry
    pub flush_cache_on_entry: bool,
    /// Every exchange goes through middleware
    pub requires_middleware: bool,
}

/// Indexed by `Mode as usize`.
static TRANSITIONS: [ModeRule; 4] = [
    ModeRule {
        mode: Mode::Capture,
        requires_upstream: true,
        flush_cache_on_entry: true,
        requires_middleware: false,
    },
    ModeRule {
        mode: Mode::Simulate,
        requires_upstream: false,
        flush_cache_on_entry: false,
        requires_middleware: false,
    },
    ModeRule {
        mode: Mode::Modify,
        requires_upstream: false,
        flush_cache_on_entry: false,
        requires_middleware: true,
    },
    ModeRule {
        mode: Mode::Synthesize,
        requires_upstream: false,
        flush_cache_on_entry: false,
        requires_middleware: true,
    },
];

/// Result of an accepted mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
    pub flush_cache: bool,
    /// The new mode answers nothing without middleware
    pub needs_middleware: bool,
}

/// Validates mode changes against the legal mode set and the deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeController {
    /// Pure webserver: no forwarding capability
    webserver: bool,
}

impl ModeController {
    pub fn new(webserver: bool) -> Self {
        Self { webserver }
    }

    pub fn is_webserver(&self) -> bool {
        self.webserver
    }

    /// Decide a transition without applying it.
    pub fn transition(&self, from: Mode, candidate: &str) -> Result<Transition, EngineError> {
        let to: Mode = candidate.parse()?;
        let rule = to.rule();
        if rule.requires_upstream && self.webserver {
            return Err(EngineError::IncompatibleMode(to));
        }
        Ok(Transition {
            from,
            to,
            flush_cache: rule.flush_cache_on_entry,
            needs_middleware: rule.requires_middleware,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_mode() {
        for mode in Mode::ALL {
            assert_eq!(mode.rule().mode, mode);
        }
    }

    #[test]
    fn test_every_legal_mode_is_accepted() {
        let controller = ModeController::new(false);
        for from in Mode::ALL {
            for to in Mode::ALL {
                let transition = controller.transition(from, to.as_str()).unwrap();
                assert_eq!(transition.from, from);
                assert_eq!(transition.to, to);
                assert_eq!(transition.flush_cache, to == Mode::Capture);
                assert_eq!(
                    transition.needs_middleware,
                    matches!(to, Mode::Modify | Mode::Synthesize)
                );
            }
        }
    }

    #[test]
    fn test_illegal_modes_are_rejected() {
        let controller = ModeController::new(false);
        for candidate in ["", "Capture", "spy", "simulate ", "record"] {
            assert!(matches!(
                controller.transition(Mode::Simulate, candidate),
                Err(EngineError::InvalidMode(_))
            ));
        }
    }

    #[test]
    fn test_webserver_refuses_capture_only() {
        let controller = ModeController::new(true);
        assert!(matches!(
            controller.transition(Mode::Simulate, "capture"),
            Err(EngineError::IncompatibleMode(Mode::Capture))
        ));
        for candidate in ["simulate", "modify", "synthesize"] {
            assert!(controller.transition(Mode::Simulate, candidate).is_ok());
        }
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Mode::Synthesize).unwrap(), r#""synthesize""#);
        let mode: Mode = serde_yaml::from_str("capture").unwrap();
        assert_eq!(mode, Mode::Capture);
    }
}
