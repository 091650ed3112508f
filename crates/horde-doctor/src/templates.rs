//! Embedded repair assets.
//!
//! Repairs that provision files (settings, slash commands, role prompts,
//! rituals) copy from these compiled-in templates, so a doctor binary
//! can heal an encampment without a source checkout nearby.

/// Canonical agent `settings.json`.
pub const SETTINGS_TEMPLATE: &str = include_str!("../assets/settings.json");

/// Encampment-level slash commands.
pub const COMMAND_TEMPLATES: [(&str, &str); 3] = [
    ("raid.md", include_str!("../assets/commands/raid.md")),
    ("report.md", include_str!("../assets/commands/report.md")),
    ("handoff.md", include_str!("../assets/commands/handoff.md")),
];

/// Role prompt templates provisioned per warband.
pub const ROLE_TEMPLATES: [(&str, &str); 3] = [
    ("witness.md", include_str!("../assets/roles/witness.md")),
    ("forge.md", include_str!("../assets/roles/forge.md")),
    ("raider.md", include_str!("../assets/roles/raider.md")),
];

/// Ritual definitions provisioned into `.relics/rituals/`.
pub const RITUAL_TEMPLATES: [(&str, &str); 3] = [
    ("dawn-patrol.yaml", include_str!("../assets/rituals/dawn-patrol.yaml")),
    ("merge-march.yaml", include_str!("../assets/rituals/merge-march.yaml")),
    (
        "sundown-report.yaml",
        include_str!("../assets/rituals/sundown-report.yaml"),
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use horde_camp::AgentSettings;

    #[test]
    fn settings_template_satisfies_its_own_invariants() {
        let settings: AgentSettings =
            serde_json::from_str(SETTINGS_TEMPLATE).expect("template should parse");
        assert!(settings.defects().is_empty());
    }

    #[test]
    fn every_template_set_is_non_empty() {
        for (name, body) in COMMAND_TEMPLATES
            .iter()
            .chain(ROLE_TEMPLATES.iter())
            .chain(RITUAL_TEMPLATES.iter())
        {
            assert!(!body.trim().is_empty(), "{name} template is empty");
        }
    }
}
