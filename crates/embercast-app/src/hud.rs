//! On-screen status banner (heads-up display).
//!
//! The display namespace carries the receiver's only application-level
//! protocol: a single-field payload whose value `"show"` means "display the
//! status banner"; anything else — another value, a missing field, or an
//! unparseable payload — means "hide it".

use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
struct DisplayPayload {
    display: Option<String>,
}

/// Decide banner visibility from a raw bus payload.
pub fn wants_banner(payload: &str) -> bool {
    serde_json::from_str::<DisplayPayload>(payload)
        .ok()
        .and_then(|p| p.display)
        .is_some_and(|value| value == "show")
}

/// Banner state. Toggled exclusively by display-namespace messages.
#[derive(Default)]
pub struct Hud {
    banner_visible: bool,
}

impl Hud {
    pub fn banner_visible(&self) -> bool {
        self.banner_visible
    }

    pub fn set_banner(&mut self, visible: bool) {
        if visible != self.banner_visible {
            self.banner_visible = visible;
            info!("HUD banner {}", if visible { "shown" } else { "hidden" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_value_shows_the_banner() {
        assert!(wants_banner(r#"{"display":"show"}"#));
    }

    #[test]
    fn anything_else_hides_the_banner() {
        assert!(!wants_banner(r#"{"display":"hide"}"#));
        assert!(!wants_banner(r#"{"display":"SHOW"}"#));
        assert!(!wants_banner(r#"{}"#));
        assert!(!wants_banner("show"));
        assert!(!wants_banner("not even json"));
        assert!(!wants_banner(""));
    }

    #[test]
    fn hud_toggles_and_is_idempotent() {
        let mut hud = Hud::default();
        assert!(!hud.banner_visible());

        hud.set_banner(true);
        assert!(hud.banner_visible());
        hud.set_banner(true);
        assert!(hud.banner_visible());

        hud.set_banner(false);
        assert!(!hud.banner_visible());
    }
}
