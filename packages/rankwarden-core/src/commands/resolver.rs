//! Command name resolution.
//!
//! A command matches when the typed name is a case-insensitive substring of
//! its name, or equals one of its aliases. Several matches are narrowed to
//! the single candidate whose name is exactly as long as the input (an exact
//! name hiding among substring hits), then to the single candidate with an
//! exactly matching alias. Anything left over is ambiguous.

use super::Command;
use crate::error::{Error, Result};

/// Find the command the user meant.
pub fn resolve<'a>(typed: &str, commands: &'a [Command]) -> Result<&'a Command> {
    let name = typed.trim().to_lowercase();
    if name.is_empty() {
        return Err(Error::CommandNotFound(typed.to_string()));
    }

    let matches: Vec<&Command> = commands
        .iter()
        .filter(|c| {
            c.name.to_lowercase().contains(&name)
                || c.aliases.iter().any(|a| a.to_lowercase() == name)
        })
        .collect();

    match matches.as_slice() {
        [] => Err(Error::CommandNotFound(typed.trim().to_string())),
        [only] => Ok(*only),
        _ => {
            let typed_len = name.chars().count();
            let by_length = single(matches.iter().filter(|c| c.name.chars().count() == typed_len));
            let by_alias = || {
                single(
                    matches
                        .iter()
                        .filter(|c| c.aliases.iter().any(|a| a.to_lowercase() == name)),
                )
            };

            by_length.or_else(by_alias).ok_or_else(|| Error::AmbiguousCommand {
                typed: typed.trim().to_string(),
                candidates: matches.iter().map(|c| c.name.clone()).collect(),
            })
        }
    }
}

fn single<'a, 'b>(mut iter: impl Iterator<Item = &'b &'a Command>) -> Option<&'a Command>
where
    'a: 'b,
{
    match (iter.next(), iter.next()) {
        (Some(cmd), None) => Some(*cmd),
        _ => None,
    }
}
