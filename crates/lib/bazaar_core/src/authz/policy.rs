//! Policy strings such as `"permission:todo.items.create;role:Admin"`.
//!
//! Tokens are `;`-separated. A `permission:`, `policy:` or `role:` prefix
//! switches the current category and contributes its remainder; a bare
//! token contributes to the current category. Tokens before any prefix,
//! empty tokens and unknown prefixes are ignored. An unknown prefix also
//! clears the current category, so bare tokens after it are ignored too.

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

use crate::models::auth::UserAuthorizationData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Permission,
    Policy,
    Role,
}

impl Category {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "permission" => Some(Category::Permission),
            "policy" => Some(Category::Policy),
            "role" => Some(Category::Role),
            _ => None,
        }
    }
}

/// Everything a principal must hold. All three sets are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequirement {
    pub permissions: BTreeSet<String>,
    pub policies: BTreeSet<String>,
    pub roles: BTreeSet<String>,
}

/// Why a requirement was not met. Logged, never sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementFailure {
    Unauthenticated,
    MissingPermission(String),
    MissingPolicy(String),
    MissingRole(String),
}

impl fmt::Display for RequirementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementFailure::Unauthenticated => write!(f, "no authorization data for principal"),
            RequirementFailure::MissingPermission(p) => write!(f, "missing permission {p}"),
            RequirementFailure::MissingPolicy(p) => write!(f, "missing policy {p}"),
            RequirementFailure::MissingRole(r) => write!(f, "missing role {r}"),
        }
    }
}

impl AuthorizationRequirement {
    pub fn parse(policy: &str) -> Self {
        let mut requirement = Self::default();
        let mut current: Option<Category> = None;

        for token in policy.split(';').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            let value = match token.split_once(':') {
                Some((prefix, rest)) => match Category::from_prefix(prefix) {
                    Some(category) => {
                        current = Some(category);
                        rest.trim()
                    }
                    None => {
                        warn!(%policy, token, "Ignoring policy token with unknown prefix");
                        current = None;
                        continue;
                    }
                },
                None => token,
            };
            if value.is_empty() {
                continue;
            }
            let set = match current {
                Some(Category::Permission) => &mut requirement.permissions,
                Some(Category::Policy) => &mut requirement.policies,
                Some(Category::Role) => &mut requirement.roles,
                None => continue,
            };
            set.insert(value.to_string());
        }
        requirement
    }

    pub fn permission(name: &str) -> Self {
        let mut requirement = Self::default();
        requirement.permissions.insert(name.to_string());
        requirement
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.policies.is_empty() && self.roles.is_empty()
    }

    /// Check `data` against every item; the first missing one is reported.
    pub fn evaluate(&self, data: Option<&UserAuthorizationData>) -> Result<(), RequirementFailure> {
        let data = data.ok_or(RequirementFailure::Unauthenticated)?;
        if let Some(p) = self.permissions.iter().find(|p| !data.has_permission(p)) {
            return Err(RequirementFailure::MissingPermission(p.clone()));
        }
        if let Some(p) = self.policies.iter().find(|p| !data.has_policy(p)) {
            return Err(RequirementFailure::MissingPolicy(p.clone()));
        }
        if let Some(r) = self.roles.iter().find(|r| !data.has_role(r)) {
            return Err(RequirementFailure::MissingRole(r.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for AuthorizationRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .permissions
            .iter()
            .map(|p| format!("permission:{p}"))
            .chain(self.policies.iter().map(|p| format!("policy:{p}")))
            .chain(self.roles.iter().map(|r| format!("role:{r}")))
            .collect();
        f.write_str(&parts.join(";"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn data(permissions: &[&str], roles: &[&str]) -> UserAuthorizationData {
        UserAuthorizationData {
            user_id: Uuid::new_v4(),
            user_name: "ada".into(),
            email: "ada@example.com".into(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            policies: vec![],
        }
    }

    #[test]
    fn parses_prefixed_tokens_into_categories() {
        let req = AuthorizationRequirement::parse("permission:todo.items.create;role:Admin");
        assert_eq!(req.permissions, set(&["todo.items.create"]));
        assert_eq!(req.roles, set(&["Admin"]));
        assert!(req.policies.is_empty());
    }

    #[test]
    fn bare_tokens_follow_the_current_category() {
        let req = AuthorizationRequirement::parse(
            "orphan;permission:a;b;;policy:P; unknown:x ;role:R;S",
        );
        assert_eq!(req.permissions, set(&["a", "b"]));
        assert_eq!(req.policies, set(&["P"]));
        assert_eq!(req.roles, set(&["R", "S"]));
    }

    #[test]
    fn unknown_prefix_clears_the_category() {
        let req = AuthorizationRequirement::parse("permission:a;unknown:x;y");
        assert_eq!(req.permissions, set(&["a"]));

        let req = AuthorizationRequirement::parse("permission:a;todo:items:read;b;role:R");
        assert_eq!(req.permissions, set(&["a"]));
        assert_eq!(req.roles, set(&["R"]));
    }

    #[test]
    fn every_item_is_required() {
        let req = AuthorizationRequirement::parse("permission:todo.items.create;role:Admin");
        assert!(req.evaluate(Some(&data(&["todo.items.create"], &["Admin"]))).is_ok());
        assert_eq!(
            req.evaluate(Some(&data(&["todo.items.create"], &["User"]))),
            Err(RequirementFailure::MissingRole("Admin".into()))
        );
        assert_eq!(
            req.evaluate(Some(&data(&[], &["Admin"]))),
            Err(RequirementFailure::MissingPermission("todo.items.create".into()))
        );
        assert_eq!(req.evaluate(None), Err(RequirementFailure::Unauthenticated));
    }

    #[test]
    fn display_is_parseable() {
        let req = AuthorizationRequirement::parse("role:Admin;policy:UserManagement");
        assert_eq!(AuthorizationRequirement::parse(&req.to_string()), req);
    }
}
