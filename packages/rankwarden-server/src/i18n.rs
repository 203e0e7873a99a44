//! Reply strings.
//!
//! A flat key → template catalog. Templates use `{name}` placeholders. The
//! built-in catalog is English; a JSON object of the same shape can
//! override any subset of keys.

use std::collections::HashMap;

use rankwarden_core::{Error, Result};

const ENGLISH: &[(&str, &str)] = &[
    // invites
    (
        "invites.self",
        "You have **{total}** invites! ({regular} regular, {custom} custom, {fake} fake, {leave} left)",
    ),
    (
        "invites.other",
        "<@{user}> has **{total}** invites! ({regular} regular, {custom} custom, {fake} fake, {leave} left)",
    ),
    ("invites.next.self", "You need **{needed}** more invites to reach **{rank}**."),
    ("invites.next.other", "They need **{needed}** more invites to reach **{rank}**."),
    ("invites.highest.self", "You have reached the highest rank, **{rank}**!"),
    ("invites.highest.other", "They have reached the highest rank, **{rank}**!"),
    ("invites.granted", "Granted: {roles}"),
    ("invites.revoked", "Removed: {roles}"),
    ("invites.failed", "Could not update: {roles}"),
    ("invites.should_have", "Missing rank roles: {roles}"),
    ("invites.should_not_have", "Rank roles no longer earned: {roles}"),
    (
        "invites.dangerous",
        "These rank roles carry dangerous permissions and must be assigned by a moderator: {roles}",
    ),
    (
        "invites.roles_unavailable",
        "Rank roles could not be checked right now. Please try again later.",
    ),
    // clearinvites
    ("clearinvites.done", "Invites of <@{user}> have been reset."),
    // leaderboard
    ("leaderboard.title", "**Top inviters**"),
    ("leaderboard.entry", "{position}. <@{user}> **{total}** ({regular} regular, {fake} fake, {leave} left)"),
    ("leaderboard.empty", "Nobody has invited anyone yet."),
    // ranks
    ("ranks.title", "**Ranks**"),
    ("ranks.entry", "**{name}**: {num_invites} invites, <@&{role}>"),
    ("ranks.empty", "No ranks have been configured."),
    ("addrank.done", "Rank **{name}** now requires **{num_invites}** invites."),
    ("removerank.done", "Removed the rank at **{num_invites}** invites."),
    ("removerank.missing", "There is no rank at **{num_invites}** invites."),
    // errors
    ("error.not_found", "No command found matching `{command}`."),
    ("error.ambiguous", "`{command}` could mean: {candidates}"),
    ("error.arguments", "{message}\nUsage: `{usage}`"),
    ("error.invalid_rank", "{message}"),
];

/// Reply template catalog.
#[derive(Debug, Clone)]
pub struct Translator {
    strings: HashMap<String, String>,
}

impl Translator {
    /// The built-in English catalog.
    pub fn english() -> Self {
        Self {
            strings: ENGLISH
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// English with keys overridden from a JSON object.
    pub fn with_overrides(json: &str) -> Result<Self> {
        let overrides: HashMap<String, String> = serde_json::from_str(json)?;
        let mut translator = Self::english();
        for (key, value) in overrides {
            if !translator.strings.contains_key(&key) {
                return Err(Error::Misconfiguration(format!("unknown string key `{}`", key)));
            }
            translator.strings.insert(key, value);
        }
        Ok(translator)
    }

    /// Render a template. Unknown keys render as the key itself.
    pub fn t(&self, key: &str, params: &[(&str, String)]) -> String {
        let Some(template) = self.strings.get(key) else {
            tracing::debug!(key, "Missing string");
            return key.to_string();
        };

        let mut out = template.clone();
        for (name, value) in params {
            out = out.replace(&format!("{{{}}}", name), value);
        }
        out
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::english()
    }
}
