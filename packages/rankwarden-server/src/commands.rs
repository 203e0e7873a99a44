//! Chat command execution.
//!
//! A command line is `[prefix]name [args...]`. The name is resolved against
//! the registry, the command runs against the engine, and the reply is
//! rendered through the [`Translator`]. Mistakes by the user come back as a
//! reply with `ok = false`; store and platform failures propagate.
//!
//! [`Translator`]: crate::i18n::Translator

use rankwarden_core::engine::Reconciliation;
use rankwarden_core::{
    Command, CommandGroup, CommandRegistry, Error, InviteCounts, Rank, RankResolution, Result,
};

use crate::protocol::{CommandReply, CommandRequest};
use crate::state::ServerState;

/// Upper bound for an explicit leaderboard length.
const MAX_LEADERBOARD_SIZE: usize = 50;

/// The commands this server answers, in help order.
pub fn registry() -> Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    registry.register(Command::new("invites", &["invite", "rank"], CommandGroup::Invites))?;
    registry.register(Command::new("clearinvites", &["invitesreset"], CommandGroup::Invites))?;
    registry.register(Command::new("leaderboard", &["top"], CommandGroup::Invites))?;
    registry.register(Command::new("ranks", &[], CommandGroup::Ranks))?;
    registry.register(Command::new("addrank", &[], CommandGroup::Ranks))?;
    registry.register(Command::new("removerank", &[], CommandGroup::Ranks))?;
    Ok(registry)
}

fn usage(command: &str) -> &'static str {
    match command {
        "invites" => "invites [@user]",
        "clearinvites" => "clearinvites [@user]",
        "leaderboard" => "leaderboard [limit]",
        "ranks" => "ranks",
        "addrank" => "addrank <invites> <@role> [name]",
        "removerank" => "removerank <invites>",
        _ => "",
    }
}

/// Strip `<@123>`, `<@!123>` and `<@&123>` mention syntax down to the ID.
fn parse_id(arg: &str) -> String {
    arg.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_start_matches('@')
        .trim_start_matches(['!', '&'])
        .to_string()
}

fn parse_threshold(arg: Option<&str>) -> Result<i64> {
    let arg = arg.ok_or_else(|| Error::InvalidArguments("missing invite threshold".into()))?;
    arg.parse::<i64>()
        .map_err(|_| Error::InvalidArguments(format!("`{}` is not a number", arg)))
}

fn mention_roles<'a>(roles: impl IntoIterator<Item = &'a str>) -> String {
    roles
        .into_iter()
        .map(|r| format!("<@&{}>", r))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Execute one command line.
pub async fn execute(state: &ServerState, request: &CommandRequest) -> Result<CommandReply> {
    let line = request.line.trim();
    let line = line
        .strip_prefix(state.config.command_prefix.as_str())
        .unwrap_or(line);
    let mut parts = line.split_whitespace();
    let typed = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let command = match state.registry.resolve(typed) {
        Ok(command) => command.name.clone(),
        Err(e) => return render_user_error(state, None, e),
    };

    let result = match command.as_str() {
        "invites" => invites(state, request, &args).await,
        "clearinvites" => clear_invites(state, request, &args).await,
        "leaderboard" => leaderboard(state, request, &args).await,
        "ranks" => ranks(state, request).await,
        "addrank" => add_rank(state, request, &args).await,
        "removerank" => remove_rank(state, request, &args).await,
        other => Err(Error::Internal(format!("command `{}` has no handler", other))),
    };

    match result {
        Ok(reply) => Ok(CommandReply {
            command: Some(command),
            ok: true,
            reply,
        }),
        Err(e) => render_user_error(state, Some(command), e),
    }
}

/// Render input mistakes as replies; pass everything else up.
fn render_user_error(
    state: &ServerState,
    command: Option<String>,
    error: Error,
) -> Result<CommandReply> {
    let t = &state.translator;
    let reply = match &error {
        Error::CommandNotFound(typed) => t.t("error.not_found", &[("command", typed.clone())]),
        Error::AmbiguousCommand { typed, candidates } => t.t(
            "error.ambiguous",
            &[
                ("command", typed.clone()),
                (
                    "candidates",
                    candidates
                        .iter()
                        .map(|c| format!("`{}`", c))
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            ],
        ),
        Error::InvalidArguments(message) => t.t(
            "error.arguments",
            &[
                ("message", message.clone()),
                ("usage", usage(command.as_deref().unwrap_or_default()).to_string()),
            ],
        ),
        Error::InvalidRank(message) => t.t("error.invalid_rank", &[("message", message.clone())]),
        _ => return Err(error),
    };

    tracing::debug!(command = ?command, "Command rejected: {}", error);
    Ok(CommandReply {
        command,
        ok: false,
        reply,
    })
}

fn count_params(user: &str, counts: &InviteCounts) -> Vec<(&'static str, String)> {
    vec![
        ("user", user.to_string()),
        ("total", counts.total().to_string()),
        ("regular", counts.regular.to_string()),
        ("custom", counts.custom.to_string()),
        ("fake", counts.fake.to_string()),
        ("leave", counts.leave.to_string()),
    ]
}

// ── invites ───────────────────────────────────────────────────────────────────

async fn invites(state: &ServerState, request: &CommandRequest, args: &[&str]) -> Result<String> {
    let community_id = request.community_id.as_str();
    let target = args
        .first()
        .map(|a| parse_id(a))
        .unwrap_or_else(|| request.invoker_id.clone());
    let own = target == request.invoker_id;
    let suffix = if own { "self" } else { "other" };
    let t = &state.translator;

    let counts = state.engine.get_invite_counts(community_id, &target).await?;
    let total = counts.total();
    let mut lines = vec![t.t(&format!("invites.{}", suffix), &count_params(&target, &counts))];

    let resolution = state.engine.resolve_rank(community_id, total).await?;
    if let Some(line) = rank_line(state, suffix, &resolution, total) {
        lines.push(line);
    }

    // Role reconciliation may fail on its own; the counts above still show.
    match state
        .engine
        .reconcile_member_with_counts(community_id, &target, counts, state.config.auto_apply)
        .await
    {
        Ok(Reconciliation::Planned { plan, applied, .. }) => {
            match applied {
                Some(outcome) => {
                    if !outcome.granted.is_empty() {
                        lines.push(t.t(
                            "invites.granted",
                            &[("roles", mention_roles(outcome.granted.iter().map(String::as_str)))],
                        ));
                    }
                    if !outcome.revoked.is_empty() {
                        lines.push(t.t(
                            "invites.revoked",
                            &[("roles", mention_roles(outcome.revoked.iter().map(String::as_str)))],
                        ));
                    }
                    if !outcome.failed.is_empty() {
                        lines.push(t.t(
                            "invites.failed",
                            &[("roles", mention_roles(outcome.failed.iter().map(|(r, _)| r.as_str())))],
                        ));
                    }
                }
                None => {
                    let grants: Vec<&str> = plan.grants().collect();
                    if !grants.is_empty() {
                        lines.push(t.t("invites.should_have", &[("roles", mention_roles(grants))]));
                    }
                    let revocations: Vec<&str> = plan.revocations().collect();
                    if !revocations.is_empty() {
                        lines.push(t.t(
                            "invites.should_not_have",
                            &[("roles", mention_roles(revocations))],
                        ));
                    }
                }
            }
            if !plan.dangerous.is_empty() {
                lines.push(t.t(
                    "invites.dangerous",
                    &[("roles", mention_roles(plan.dangerous.iter().map(String::as_str)))],
                ));
            }
        }
        Ok(Reconciliation::Unranked { .. }) | Ok(Reconciliation::Skipped { .. }) => {}
        Err(e) if e.is_recoverable() => {
            tracing::warn!(community_id, user_id = target.as_str(), "Rank roles not reconciled: {}", e);
            lines.push(t.t("invites.roles_unavailable", &[]));
        }
        Err(e) => return Err(e),
    }

    Ok(lines.join("\n"))
}

fn rank_line(
    state: &ServerState,
    suffix: &str,
    resolution: &RankResolution,
    total: i64,
) -> Option<String> {
    let t = &state.translator;
    match (&resolution.next_rank, &resolution.current_rank) {
        (Some(next), _) => Some(t.t(
            &format!("invites.next.{}", suffix),
            &[
                ("needed", (next.num_invites - total).to_string()),
                ("rank", next.name.clone()),
            ],
        )),
        (None, Some(current)) => Some(t.t(
            &format!("invites.highest.{}", suffix),
            &[("rank", current.name.clone())],
        )),
        (None, None) => None,
    }
}

// ── clearinvites ──────────────────────────────────────────────────────────────

async fn clear_invites(
    state: &ServerState,
    request: &CommandRequest,
    args: &[&str],
) -> Result<String> {
    let target = args
        .first()
        .map(|a| parse_id(a))
        .unwrap_or_else(|| request.invoker_id.clone());
    state
        .engine
        .clear_invites(&request.community_id, &target)
        .await?;
    tracing::info!(
        community_id = request.community_id.as_str(),
        user_id = target.as_str(),
        by = request.invoker_id.as_str(),
        "Invites cleared"
    );
    Ok(state.translator.t("clearinvites.done", &[("user", target)]))
}

// ── leaderboard ───────────────────────────────────────────────────────────────

async fn leaderboard(
    state: &ServerState,
    request: &CommandRequest,
    args: &[&str],
) -> Result<String> {
    let limit = match args.first() {
        Some(arg) => arg
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=MAX_LEADERBOARD_SIZE).contains(n))
            .ok_or_else(|| {
                Error::InvalidArguments(format!(
                    "limit must be between 1 and {}",
                    MAX_LEADERBOARD_SIZE
                ))
            })?,
        None => state.config.leaderboard_size,
    };

    let entries = state
        .engine
        .top_inviters(&request.community_id, limit)
        .await?;
    let t = &state.translator;
    if entries.is_empty() {
        return Ok(t.t("leaderboard.empty", &[]));
    }

    let mut lines = vec![t.t("leaderboard.title", &[])];
    for (i, entry) in entries.iter().enumerate() {
        let mut params = count_params(&entry.user_id, &entry.counts);
        params.push(("position", (i + 1).to_string()));
        lines.push(t.t("leaderboard.entry", &params));
    }
    Ok(lines.join("\n"))
}

// ── rank administration ───────────────────────────────────────────────────────

async fn ranks(state: &ServerState, request: &CommandRequest) -> Result<String> {
    let ranks = state.engine.list_ranks(&request.community_id).await?;
    let t = &state.translator;
    if ranks.is_empty() {
        return Ok(t.t("ranks.empty", &[]));
    }

    let mut lines = vec![t.t("ranks.title", &[])];
    lines.extend(ranks.iter().map(|rank| {
        t.t(
            "ranks.entry",
            &[
                ("name", rank.name.clone()),
                ("num_invites", rank.num_invites.to_string()),
                ("role", rank.role_id.clone()),
            ],
        )
    }));
    Ok(lines.join("\n"))
}

async fn add_rank(state: &ServerState, request: &CommandRequest, args: &[&str]) -> Result<String> {
    let num_invites = parse_threshold(args.first().copied())?;
    let role_id = args
        .get(1)
        .map(|a| parse_id(a))
        .ok_or_else(|| Error::InvalidArguments("missing role".into()))?;
    let name = if args.len() > 2 {
        args[2..].join(" ")
    } else {
        role_id.clone()
    };

    let rank = state
        .engine
        .set_rank(&request.community_id, Rank::new(num_invites, role_id, name)?)
        .await?;
    Ok(state.translator.t(
        "addrank.done",
        &[
            ("name", rank.name),
            ("num_invites", rank.num_invites.to_string()),
        ],
    ))
}

async fn remove_rank(
    state: &ServerState,
    request: &CommandRequest,
    args: &[&str],
) -> Result<String> {
    let num_invites = parse_threshold(args.first().copied())?;
    let removed = state
        .engine
        .remove_rank(&request.community_id, num_invites)
        .await?;
    let key = if removed {
        "removerank.done"
    } else {
        "removerank.missing"
    };
    Ok(state
        .translator
        .t(key, &[("num_invites", num_invites.to_string())]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rankwarden_core::platform::InMemoryMembership;
    use rankwarden_core::storage::Database;
    use rankwarden_core::{Engine, InviteEvent, InviteSource, MemberSnapshot};

    use crate::i18n::Translator;
    use crate::state::ServerConfig;

    fn state() -> (ServerState, Arc<InMemoryMembership>) {
        let config = ServerConfig::default();
        let platform = Arc::new(InMemoryMembership::new());
        let engine = Engine::new(
            Arc::new(Database::open(None).unwrap()),
            platform.clone(),
            config.engine_config().unwrap(),
        );
        (
            ServerState::new(engine, Translator::english(), config).unwrap(),
            platform,
        )
    }

    fn line(text: &str) -> CommandRequest {
        CommandRequest {
            community_id: "guild".into(),
            invoker_id: "alice".into(),
            line: text.into(),
        }
    }

    async fn invite(state: &ServerState, n: usize) {
        for i in 0..n {
            state
                .engine
                .ingest(InviteEvent::InviteUsed {
                    community_id: "guild".into(),
                    inviter_id: "alice".into(),
                    member_id: format!("m{}", i),
                    source: InviteSource::Regular,
                    code: None,
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_registry_resolution() {
        let registry = registry().unwrap();
        assert_eq!(registry.resolve("invite").unwrap().name, "invites");
        assert_eq!(registry.resolve("invites").unwrap().name, "invites");
        assert_eq!(registry.resolve("rank").unwrap().name, "invites");
        assert_eq!(registry.resolve("ranks").unwrap().name, "ranks");
        assert_eq!(registry.resolve("top").unwrap().name, "leaderboard");
        assert_eq!(registry.resolve("invitesreset").unwrap().name, "clearinvites");
        assert!(matches!(registry.resolve("xyz"), Err(Error::CommandNotFound(_))));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("<@123>"), "123");
        assert_eq!(parse_id("<@!123>"), "123");
        assert_eq!(parse_id("<@&55>"), "55");
        assert_eq!(parse_id("bob"), "bob");
    }

    #[tokio::test]
    async fn test_unknown_and_ambiguous_commands_reply() {
        let (state, _) = state();

        let reply = execute(&state, &line("!xyz")).await.unwrap();
        assert!(!reply.ok);
        assert!(reply.command.is_none());
        assert_eq!(reply.reply, "No command found matching `xyz`.");

        let reply = execute(&state, &line("!inv")).await.unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.reply, "`inv` could mean: `invites`, `clearinvites`");

        let reply = execute(&state, &line("   ")).await.unwrap();
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn test_rank_admin_flow() {
        let (state, _) = state();

        let reply = execute(&state, &line("!ranks")).await.unwrap();
        assert_eq!(reply.reply, "No ranks have been configured.");

        let reply = execute(&state, &line("!addrank 10 <@&r10> Bronze Tier")).await.unwrap();
        assert!(reply.ok);
        assert_eq!(reply.reply, "Rank **Bronze Tier** now requires **10** invites.");

        let reply = execute(&state, &line("!ranks")).await.unwrap();
        assert!(reply.reply.contains("**Bronze Tier**: 10 invites, <@&r10>"));

        let reply = execute(&state, &line("!addrank ten <@&r10>")).await.unwrap();
        assert!(!reply.ok);
        assert!(reply.reply.contains("Usage: `addrank <invites> <@role> [name]`"));

        let reply = execute(&state, &line("!addrank -1 r")).await.unwrap();
        assert!(!reply.ok);

        let reply = execute(&state, &line("!removerank 10")).await.unwrap();
        assert_eq!(reply.reply, "Removed the rank at **10** invites.");
        let reply = execute(&state, &line("!removerank 10")).await.unwrap();
        assert_eq!(reply.reply, "There is no rank at **10** invites.");
    }

    #[tokio::test]
    async fn test_invites_reports_progress_and_grants() {
        let (state, platform) = state();
        platform.upsert_member("guild", MemberSnapshot::new("alice", Vec::<String>::new()));
        execute(&state, &line("!addrank 0 r0 Newcomer")).await.unwrap();
        execute(&state, &line("!addrank 5 r5 Bronze")).await.unwrap();
        invite(&state, 3).await;

        let reply = execute(&state, &line("!invite")).await.unwrap();
        assert_eq!(reply.command.as_deref(), Some("invites"));
        let lines: Vec<&str> = reply.reply.lines().collect();
        assert_eq!(
            lines[0],
            "You have **3** invites! (3 regular, 0 custom, 0 fake, 0 left)"
        );
        assert_eq!(lines[1], "You need **2** more invites to reach **Bronze**.");
        assert_eq!(lines[2], "Granted: <@&r0>");
        assert!(platform.member("guild", "alice").unwrap().has_role("r0"));
    }

    #[tokio::test]
    async fn test_invites_about_someone_else_at_top_rank() {
        let (state, _) = state();
        execute(&state, &line("!addrank 0 r0 Newcomer")).await.unwrap();

        let reply = execute(&state, &line("!invites <@bob>")).await.unwrap();
        let lines: Vec<&str> = reply.reply.lines().collect();
        assert!(lines[0].starts_with("<@bob> has **0** invites!"));
        assert_eq!(lines[1], "They have reached the highest rank, **Newcomer**!");
    }

    #[tokio::test]
    async fn test_invites_shows_counts_when_platform_down() {
        let (state, platform) = state();
        execute(&state, &line("!addrank 0 r0 Newcomer")).await.unwrap();
        invite(&state, 2).await;
        platform.set_offline(true);

        let reply = execute(&state, &line("!invites")).await.unwrap();
        assert!(reply.ok);
        assert!(reply.reply.starts_with("You have **2** invites!"));
        assert!(reply
            .reply
            .ends_with("Rank roles could not be checked right now. Please try again later."));
    }

    #[tokio::test]
    async fn test_clear_and_leaderboard() {
        let (state, _) = state();
        invite(&state, 4).await;

        let reply = execute(&state, &line("!top")).await.unwrap();
        assert!(reply.reply.contains("1. <@alice> **4**"));

        let reply = execute(&state, &line("!invitesreset")).await.unwrap();
        assert_eq!(reply.reply, "Invites of <@alice> have been reset.");

        let reply = execute(&state, &line("!invites")).await.unwrap();
        assert!(reply.reply.starts_with("You have **0** invites!"));

        let reply = execute(&state, &line("!leaderboard 0")).await.unwrap();
        assert!(!reply.ok);
    }
}
