use serenity::all::{GuildId, UserId};

use crate::config::AccessConfig;
use crate::discord::commands::{Context, Error};
use crate::errors::CheckError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Policy {
    OwnerOnly,
    SupportServerOnly,
}

impl Policy {
    pub fn from_name(name: &str) -> Option<Policy> {
        match name {
            "is_owner" => Some(Policy::OwnerOnly),
            "support_server" => Some(Policy::SupportServerOnly),
            _ => None,
        }
    }
}

/// Who ran a command and where.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Invocation {
    pub author_id: UserId,
    pub guild_id: Option<GuildId>,
}

impl Invocation {
    pub fn from_context(ctx: Context<'_>) -> Self {
        Invocation {
            author_id: ctx.author().id,
            guild_id: ctx.guild_id(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AuthzDecision {
    Allowed,
    Denied(CheckError),
}

impl AuthzDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthzDecision::Allowed)
    }

    pub fn into_result(self) -> Result<(), CheckError> {
        match self {
            AuthzDecision::Allowed => Ok(()),
            AuthzDecision::Denied(reason) => Err(reason),
        }
    }
}

pub fn check_is_authorized(policy: Policy, invocation: &Invocation, access: &AccessConfig) -> AuthzDecision {
    match policy {
        Policy::OwnerOnly => {
            if access.owner_ids.contains(&invocation.author_id) {
                AuthzDecision::Allowed
            } else {
                AuthzDecision::Denied(CheckError::NotOwner)
            }
        }
        Policy::SupportServerOnly => match invocation.guild_id {
            None => AuthzDecision::Denied(CheckError::NoPrivateMessages),
            Some(guild_id) if guild_id != access.support_server_id => AuthzDecision::Denied(CheckError::SupportServerOnly),
            Some(_) => AuthzDecision::Allowed,
        },
    }
}

/// Every policy must pass; the first denial in order is returned.
pub fn check_all(policies: &[Policy], invocation: &Invocation, access: &AccessConfig) -> AuthzDecision {
    for policy in policies {
        let decision = check_is_authorized(*policy, invocation, access);
        if !decision.is_allowed() {
            return decision;
        }
    }
    AuthzDecision::Allowed
}

/// Resolves the named policies; every name must be known.
pub fn resolve_policies(names: &[&str]) -> Result<Vec<Policy>, String> {
    names.iter().map(|name| Policy::from_name(name).ok_or_else(|| format!("Unknown check: {}", name))).collect()
}

fn run_checks(ctx: Context<'_>, names: &[&str]) -> Result<bool, Error> {
    let policies = resolve_policies(names)?;
    let invocation = Invocation::from_context(ctx);
    match check_all(&policies, &invocation, &ctx.data().access).into_result() {
        Ok(()) => Ok(true),
        Err(reason) => {
            tracing::debug!("Checks {:?} denied {} in {:?}: {}", names, invocation.author_id, invocation.guild_id, reason);
            Err(Box::new(reason))
        }
    }
}

pub async fn is_owner(ctx: Context<'_>) -> Result<bool, Error> {
    run_checks(ctx, &["is_owner"])
}

pub async fn support_server(ctx: Context<'_>) -> Result<bool, Error> {
    run_checks(ctx, &["support_server"])
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const HOME: u64 = 725336255345475624;

    fn access(owners: &[u64]) -> AccessConfig {
        AccessConfig {
            owner_ids: owners.iter().map(|id| UserId::new(*id)).collect::<HashSet<_>>(),
            support_server_id: GuildId::new(HOME),
        }
    }

    fn invocation(author: u64, guild: Option<u64>) -> Invocation {
        Invocation {
            author_id: UserId::new(author),
            guild_id: guild.map(GuildId::new),
        }
    }

    #[test]
    fn owner_only_passes_for_listed_owner() {
        let access = access(&[10, 11]);
        assert_eq!(check_is_authorized(Policy::OwnerOnly, &invocation(10, None), &access), AuthzDecision::Allowed);
        assert_eq!(check_is_authorized(Policy::OwnerOnly, &invocation(11, Some(5)), &access), AuthzDecision::Allowed);
    }

    #[test]
    fn owner_only_denies_everyone_else() {
        let access = access(&[10]);
        assert_eq!(check_is_authorized(Policy::OwnerOnly, &invocation(12, Some(HOME)), &access), AuthzDecision::Denied(CheckError::NotOwner));
    }

    #[test]
    fn changing_owners_affects_only_later_checks() {
        let mut access = access(&[]);
        let inv = invocation(42, None);
        let before = check_is_authorized(Policy::OwnerOnly, &inv, &access);

        access.owner_ids.insert(UserId::new(42));
        let after = check_is_authorized(Policy::OwnerOnly, &inv, &access);

        assert_eq!(before, AuthzDecision::Denied(CheckError::NotOwner));
        assert_eq!(after, AuthzDecision::Allowed);
    }

    #[test]
    fn support_server_rejects_dms() {
        let decision = check_is_authorized(Policy::SupportServerOnly, &invocation(10, None), &access(&[10]));
        assert_eq!(decision, AuthzDecision::Denied(CheckError::NoPrivateMessages));
    }

    #[test]
    fn support_server_rejects_other_guilds() {
        let decision = check_is_authorized(Policy::SupportServerOnly, &invocation(10, Some(HOME + 1)), &access(&[10]));
        assert_eq!(decision, AuthzDecision::Denied(CheckError::SupportServerOnly));
    }

    #[test]
    fn support_server_allows_home_guild() {
        let decision = check_is_authorized(Policy::SupportServerOnly, &invocation(99, Some(HOME)), &access(&[]));
        assert!(decision.is_allowed());
    }

    #[test]
    fn check_all_returns_first_denial() {
        let access = access(&[10]);
        let policies = [Policy::OwnerOnly, Policy::SupportServerOnly];

        assert_eq!(check_all(&policies, &invocation(11, None), &access), AuthzDecision::Denied(CheckError::NotOwner));
        assert_eq!(check_all(&policies, &invocation(10, None), &access), AuthzDecision::Denied(CheckError::NoPrivateMessages));
        assert_eq!(check_all(&policies, &invocation(10, Some(HOME)), &access), AuthzDecision::Allowed);
        assert_eq!(check_all(&[], &invocation(11, None), &access), AuthzDecision::Allowed);
    }

    #[test]
    fn policies_resolve_by_name() {
        assert_eq!(Policy::from_name("is_owner"), Some(Policy::OwnerOnly));
        assert_eq!(Policy::from_name("support_server"), Some(Policy::SupportServerOnly));
        assert_eq!(Policy::from_name("admin"), None);
    }

    #[test]
    fn named_checks_resolve_in_order() {
        assert_eq!(resolve_policies(&["support_server", "is_owner"]), Ok(vec![Policy::SupportServerOnly, Policy::OwnerOnly]));
        assert_eq!(resolve_policies(&[]), Ok(vec![]));
        assert_eq!(resolve_policies(&["is_owner", "admin"]), Err("Unknown check: admin".to_string()));
    }

    #[test]
    fn decisions_convert_to_results() {
        assert_eq!(AuthzDecision::Allowed.into_result(), Ok(()));
        assert_eq!(AuthzDecision::Denied(CheckError::SupportServerOnly).into_result(), Err(CheckError::SupportServerOnly));
    }
}
