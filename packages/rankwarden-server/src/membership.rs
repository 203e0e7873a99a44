//! Platform REST adapter.
//!
//! Speaks the bot REST shape used by Discord-compatible gateways:
//!
//! - `GET    {base}/guilds/{community}/members/{user}`
//! - `PUT    {base}/guilds/{community}/members/{user}/roles/{role}`
//! - `DELETE {base}/guilds/{community}/members/{user}/roles/{role}`
//! - `GET    {base}/guilds/{community}/roles`
//!
//! Requests carry `Authorization: Bot {token}` when a token is configured.
//! Every failure maps to [`Error::PlatformUnavailable`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use rankwarden_core::{Error, MemberSnapshot, MembershipClient, Permissions, Result};

/// Member object as returned by the gateway.
#[derive(Debug, Deserialize)]
struct GatewayMember {
    user: GatewayUser,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

/// Role object as returned by the gateway. Permissions arrive as a decimal
/// string.
#[derive(Debug, Deserialize)]
struct GatewayRole {
    id: String,
    #[serde(default)]
    permissions: String,
}

/// Role ID → permissions. A role whose permissions cannot be read fails the
/// whole catalog, so no role is mistaken for a harmless one.
fn role_catalog(roles: Vec<GatewayRole>) -> Result<HashMap<String, Permissions>> {
    roles
        .into_iter()
        .map(|role| match Permissions::from_string(&role.permissions) {
            Some(perms) => Ok((role.id, perms)),
            None => Err(Error::PlatformUnavailable(format!(
                "get_role_permissions: role {} has unreadable permissions `{}`",
                role.id, role.permissions
            ))),
        })
        .collect()
}

impl From<GatewayMember> for MemberSnapshot {
    fn from(member: GatewayMember) -> Self {
        let mut snapshot = MemberSnapshot::new(member.user.id, member.roles);
        snapshot.bot = member.user.bot;
        snapshot
    }
}

/// Membership client over the platform's REST API.
#[derive(Clone)]
pub struct HttpMembership {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMembership {
    /// Build a client. `timeout` bounds each HTTP request.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Misconfiguration(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn member_url(&self, community_id: &str, user_id: &str) -> String {
        format!("{}/guilds/{}/members/{}", self.base_url, community_id, user_id)
    }

    fn role_url(&self, community_id: &str, user_id: &str, role_id: &str) -> String {
        format!("{}/roles/{}", self.member_url(community_id, user_id), role_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bot {}", token)),
            None => request,
        }
    }

    async fn send(&self, what: &str, request: RequestBuilder) -> Result<Response> {
        self.authorize(request).send().await.map_err(|e| {
            tracing::warn!(operation = what, "Platform request failed: {}", e);
            Error::PlatformUnavailable(format!("{}: {}", what, e))
        })
    }

    async fn expect_success(what: &str, resp: Response) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(operation = what, %status, "Platform rejected request: {}", body);
        Err(Error::PlatformUnavailable(format!("{}: {} {}", what, status, body)))
    }
}

#[async_trait]
impl MembershipClient for HttpMembership {
    async fn get_member(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberSnapshot>> {
        let resp = self
            .send(
                "get_member",
                self.client.get(self.member_url(community_id, user_id)),
            )
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let member: GatewayMember = Self::expect_success("get_member", resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::PlatformUnavailable(format!("get_member: {}", e)))?;
        Ok(Some(member.into()))
    }

    async fn grant_role(&self, community_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        let resp = self
            .send(
                "grant_role",
                self.client.put(self.role_url(community_id, user_id, role_id)),
            )
            .await?;
        Self::expect_success("grant_role", resp).await?;
        tracing::info!(community_id, user_id, role_id, "Role granted");
        Ok(())
    }

    async fn revoke_role(&self, community_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        let resp = self
            .send(
                "revoke_role",
                self.client.delete(self.role_url(community_id, user_id, role_id)),
            )
            .await?;
        Self::expect_success("revoke_role", resp).await?;
        tracing::info!(community_id, user_id, role_id, "Role revoked");
        Ok(())
    }

    async fn get_role_permissions(
        &self,
        community_id: &str,
    ) -> Result<HashMap<String, Permissions>> {
        let url = format!("{}/guilds/{}/roles", self.base_url, community_id);
        let resp = self
            .send("get_role_permissions", self.client.get(url))
            .await?;

        let roles: Vec<GatewayRole> = Self::expect_success("get_role_permissions", resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::PlatformUnavailable(format!("get_role_permissions: {}", e)))?;

        role_catalog(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankwarden_core::Permission;

    #[test]
    fn test_member_payload_parsing() {
        let json = r#"{
            "user": { "id": "42", "username": "bob" },
            "roles": ["r0", "r10"],
            "joined_at": "2024-01-01T00:00:00Z"
        }"#;
        let member: GatewayMember = serde_json::from_str(json).unwrap();
        let snapshot = MemberSnapshot::from(member);
        assert_eq!(snapshot.user_id, "42");
        assert!(snapshot.has_role("r10"));
        assert!(!snapshot.bot);
    }

    #[test]
    fn test_role_payload_parsing() {
        let json = r#"[{ "id": "admin", "permissions": "8" }, { "id": "plain", "permissions": "0" }]"#;
        let roles: Vec<GatewayRole> = serde_json::from_str(json).unwrap();
        let catalog = role_catalog(roles).unwrap();
        assert!(catalog["admin"].has(Permission::Administrator));
        assert!(catalog["plain"].is_empty());
    }

    #[test]
    fn test_unreadable_role_permissions_fail_the_catalog() {
        for json in [
            r#"[{ "id": "admin", "permissions": "8" }, { "id": "odd", "permissions": "lots" }]"#,
            r#"[{ "id": "bare" }]"#,
        ] {
            let roles: Vec<GatewayRole> = serde_json::from_str(json).unwrap();
            let err = role_catalog(roles).unwrap_err();
            assert!(matches!(err, Error::PlatformUnavailable(_)));
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn test_urls() {
        let client =
            HttpMembership::new("https://gateway.example/api/", None, Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.role_url("g", "u", "r"),
            "https://gateway.example/api/guilds/g/members/u/roles/r"
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_retryable() {
        let client =
            HttpMembership::new("http://127.0.0.1:1", None, Duration::from_millis(200)).unwrap();
        let err = client.get_member("g", "u").await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
