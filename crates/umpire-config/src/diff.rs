//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use crate::config::UmpireConfig;
use crate::document::Ruleset;
use crate::error::Result;

const INDENT: &str = "  ";

/// Human-readable difference of the active rulesets of two configs.
///
/// Inactive rulesets are ignored. Returns an empty list when nothing changed.
pub fn show_diff(original: &UmpireConfig, new: &UmpireConfig) -> Result<Vec<String>> {
    let original_active: Vec<&Ruleset> = active(original).collect();
    let new_active: Vec<&Ruleset> = active(new).collect();

    let added: Vec<&Ruleset> = new_active
        .iter()
        .copied()
        .filter(|ruleset| !original_active.contains(ruleset))
        .collect();
    let deleted: Vec<&Ruleset> = original_active
        .iter()
        .copied()
        .filter(|ruleset| !new_active.contains(ruleset))
        .collect();

    let mut lines = Vec::new();
    if !added.is_empty() {
        lines.push("Newly added rulesets:".to_owned());
        render(&added, &mut lines)?;
    }
    if !deleted.is_empty() {
        lines.push("Deleted rulesets:".to_owned());
        render(&deleted, &mut lines)?;
    }
    Ok(lines)
}

fn active(config: &UmpireConfig) -> impl Iterator<Item = &Ruleset> {
    config.rulesets().iter().filter(|ruleset| ruleset.active)
}

fn render(rulesets: &[&Ruleset], lines: &mut Vec<String>) -> Result<()> {
    for ruleset in rulesets {
        let text = serde_json::to_string_pretty(ruleset)?;
        lines.extend(text.lines().map(|line| format!("{INDENT}{line}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rulesets: &str) -> UmpireConfig {
        format!(
            r#"{{"rulesets": {rulesets}, "services": {{}},
                "bundles": [{{"id": "b1", "note": "", "payloads": "p"}},
                            {{"id": "b2", "note": "", "payloads": "p"}}]}}"#
        )
        .parse()
        .expect("config")
    }

    #[test]
    fn identical_configs_have_no_diff() {
        let original = config(r#"[{"bundle_id": "b1", "note": "n", "active": true}]"#);
        assert!(show_diff(&original, &original.clone()).expect("diff").is_empty());
    }

    #[test]
    fn reports_added_then_deleted() {
        let original = config(r#"[{"bundle_id": "b1", "note": "n", "active": true}]"#);
        let new = config(r#"[{"bundle_id": "b2", "note": "n", "active": true}]"#);
        let lines = show_diff(&original, &new).expect("diff");
        let deleted_at = lines
            .iter()
            .position(|line| line == "Deleted rulesets:")
            .expect("deleted header");
        assert_eq!(lines[0], "Newly added rulesets:");
        assert!(lines[1..deleted_at].iter().any(|l| l.contains("\"b2\"")));
        assert!(lines[deleted_at + 1..].iter().any(|l| l.contains("\"b1\"")));
        assert!(lines
            .iter()
            .filter(|line| !line.ends_with("rulesets:"))
            .all(|line| line.starts_with(INDENT)));
    }

    #[test]
    fn inactive_rulesets_are_ignored() {
        let original = config(r#"[{"bundle_id": "b1", "note": "n", "active": true}]"#);
        let new = config(
            r#"[{"bundle_id": "b1", "note": "n", "active": true},
                {"bundle_id": "b2", "note": "n", "active": false}]"#,
        );
        assert!(show_diff(&original, &new).expect("diff").is_empty());
    }
}
