//! Default roles and claims, applied idempotently at start-up.

use tracing::info;

use crate::authz::permissions::{self, POLICY_USER_MANAGEMENT, ROLE_ADMIN, ROLE_USER};
use crate::models::auth::{ClaimType, NewRole, RoleClaim};
use crate::store::{Database, StoreError};

struct RoleSeed {
    name: &'static str,
    description: &'static str,
    is_system: bool,
    permissions: &'static [&'static str],
    policies: &'static [&'static str],
}

const ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: ROLE_ADMIN,
        description: "Administrators",
        is_system: true,
        permissions: permissions::ALL,
        policies: &[POLICY_USER_MANAGEMENT],
    },
    RoleSeed {
        name: ROLE_USER,
        description: "Registered users",
        is_system: false,
        permissions: permissions::USER_DEFAULT,
        policies: &[],
    },
];

/// Upsert the default roles and their claims in one transaction.
pub async fn seed_defaults(db: &dyn Database) -> Result<(), StoreError> {
    let tx = db.begin().await?;
    for seed in ROLES {
        let role = tx
            .upsert_role(NewRole {
                name: seed.name.to_string(),
                description: seed.description.to_string(),
                is_system: seed.is_system,
            })
            .await?;
        let claims = seed
            .permissions
            .iter()
            .map(|p| (ClaimType::Permission, *p))
            .chain(seed.policies.iter().map(|p| (ClaimType::Policy, *p)));
        for (claim_type, value) in claims {
            tx.add_role_claim(
                role.id,
                &RoleClaim {
                    role_name: role.name.clone(),
                    claim_type,
                    claim_value: value.to_string(),
                },
            )
            .await?;
        }
    }
    tx.commit().await?;
    info!(roles = ROLES.len(), "Seeded default roles");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDatabase;

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let db = MemoryDatabase::new();
        seed_defaults(&db).await.unwrap();
        seed_defaults(&db).await.unwrap();

        let tx = db.begin().await.unwrap();
        let roles = tx.list_roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().any(|r| r.name == ROLE_ADMIN && r.is_system));

        let claims = tx.all_role_claims().await.unwrap();
        let admin = claims.iter().filter(|c| c.role_name == ROLE_ADMIN).count();
        assert_eq!(admin, permissions::ALL.len() + 1);
    }
}
