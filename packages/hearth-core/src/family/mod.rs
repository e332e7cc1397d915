//! # Family Module
//!
//! Family context: which families a user sees, which one is active, who owns
//! it, and how new members get in.
//!
//! ## Join Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           JOIN BY CODE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Owner                                        Requester                │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  1. rotate_join_code()                                                 │
//! │     families.join_code = "k3J9x0PqaZ"   ──── shared out of band ───►   │
//! │                                                                         │
//! │                                        2. join_by_code("k3J9x0PqaZ")   │
//! │                                           family_access_requests       │
//! │                                           { status: pending }          │
//! │                                                                         │
//! │  3. access_requests()  (newest first)                                  │
//! │     ├── approve_request(id)                                            │
//! │     │     family_members { role: member }                              │
//! │     │     request.status = approved                                    │
//! │     └── decline_request(id)                                            │
//! │           request.status = rejected                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Family Selection
//!
//! On session start the active family is the first of: the explicitly
//! requested family (a link parameter) if the user can see it, the last
//! family used on this device if the user can still see it, the first family
//! listed. The choice is remembered under `hearth.last.family`.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{tables, AccessRequest, AccessStatus, Family, Membership, Role};
use crate::remote::{parse_row, select_as, Query, RemoteStore};
use crate::state::AppState;
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageKey};

/// Generate a join code of `len` alphanumeric characters
pub fn generate_join_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Deserialize)]
struct RoleRow {
    role: Role,
}

/// Family management
pub struct FamilyService {
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn KeyValueStore>,
    state: Arc<AppState>,
    config: Arc<SyncConfig>,
}

impl FamilyService {
    /// Create a new family service
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<dyn KeyValueStore>,
        state: Arc<AppState>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            remote,
            store,
            state,
            config,
        }
    }

    // ========================================================================
    // CONTEXT
    // ========================================================================

    /// Families `user_id` belongs to, by name. A user without memberships
    /// sees the first few families so they have something to pick from.
    pub async fn list_families(&self, user_id: &str) -> Result<Vec<Family>> {
        let memberships: Vec<Membership> = select_as(
            self.remote.as_ref(),
            &Query::table(tables::FAMILY_MEMBERS).eq("user_id", user_id),
        )
        .await?;

        let query = if memberships.is_empty() {
            Query::table(tables::FAMILIES)
                .order_asc("name")
                .limit(self.config.family_fallback_limit)
        } else {
            let ids: Vec<String> = memberships.into_iter().map(|m| m.family_id).collect();
            Query::table(tables::FAMILIES).in_list("id", ids).order_asc("name")
        };
        select_as(self.remote.as_ref(), &query).await
    }

    /// Last family used on this device
    pub fn last_family(&self) -> Option<String> {
        self.store
            .get_json_or_default::<Option<String>>(&StorageKey::last_family())
    }

    /// Remember `family_id` as the last family used
    pub fn remember_family(&self, family_id: &str) {
        if let Err(e) = self.store.set_json(&StorageKey::last_family(), family_id) {
            tracing::warn!(family_id, error = %e, "Failed to remember family");
        }
    }

    /// Pick the active family from `families`
    pub fn choose_family(&self, families: &[Family], requested: Option<&str>) -> Option<String> {
        let visible = |id: &str| families.iter().any(|f| f.id == id);

        if let Some(requested) = requested.filter(|id| visible(id)) {
            return Some(requested.to_string());
        }
        if let Some(last) = self.last_family().filter(|id| visible(id)) {
            return Some(last);
        }
        families.first().map(|f| f.id.clone())
    }

    /// Role of the signed-in user in the active family
    pub async fn load_role(&self) -> Result<Option<Role>> {
        let scope = self.state.scope()?;
        let rows: Vec<RoleRow> = select_as(
            self.remote.as_ref(),
            &Query::table(tables::FAMILY_MEMBERS)
                .eq("family_id", scope.family_id.as_str())
                .eq("user_id", scope.user_id.as_str())
                .limit(1),
        )
        .await?;
        let role = rows.into_iter().next().map(|r| r.role);
        *self.state.role.write() = role;
        Ok(role)
    }

    fn require_owner(&self) -> Result<()> {
        if self.state.is_owner() {
            Ok(())
        } else {
            Err(Error::OwnerOnly)
        }
    }

    // ========================================================================
    // CREATION & JOIN CODES
    // ========================================================================

    /// Create a family owned by the signed-in user
    pub async fn create_family(&self, name: &str) -> Result<Family> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("family name is required".into()));
        }
        let user_id = self.state.user_id()?;
        let family_id = uuid::Uuid::new_v4().to_string();

        let row = self
            .remote
            .insert(
                tables::FAMILIES,
                json!({ "id": family_id, "name": name, "owner_id": user_id }),
            )
            .await?;
        self.remote
            .insert(
                tables::FAMILY_MEMBERS,
                json!({ "family_id": family_id, "user_id": user_id, "role": "owner" }),
            )
            .await?;

        let family: Family = parse_row(row)?;
        self.state.families.write().push(family.clone());
        tracing::info!(family_id = %family.id, "Created family");
        Ok(family)
    }

    /// Replace the active family's join code. Owner only.
    pub async fn rotate_join_code(&self) -> Result<String> {
        self.require_owner()?;
        let family_id = self.state.family_id()?;
        let code = generate_join_code(self.config.join_code_length);

        let updated = self
            .remote
            .update(
                &Query::table(tables::FAMILIES).eq("id", family_id.as_str()),
                json!({ "join_code": code }),
            )
            .await?;
        if updated == 0 {
            return Err(Error::FamilyNotFound(family_id));
        }

        if let Some(family) = self
            .state
            .families
            .write()
            .iter_mut()
            .find(|f| f.id == family_id)
        {
            family.join_code = Some(code.clone());
        }
        tracing::info!(family_id = %family_id, "Join code rotated");
        Ok(code)
    }

    /// Ask to join the family that owns `code`
    pub async fn join_by_code(&self, code: &str) -> Result<AccessRequest> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::InvalidJoinCode);
        }
        let session = self.state.session.read().clone().ok_or(Error::NotSignedIn)?;

        let families: Vec<Family> = select_as(
            self.remote.as_ref(),
            &Query::table(tables::FAMILIES).eq("join_code", code).limit(1),
        )
        .await?;
        let family = families.into_iter().next().ok_or(Error::InvalidJoinCode)?;

        let requester_name = session.display_name.clone().or_else(|| session.email.clone());
        let row = self
            .remote
            .insert(
                tables::ACCESS_REQUESTS,
                json!({
                    "family_id": family.id,
                    "requester_id": session.user_id,
                    "requester_email": session.email,
                    "requester_name": requester_name,
                    "code": code,
                    "status": AccessStatus::Pending.as_str(),
                }),
            )
            .await?;
        tracing::info!(family_id = %family.id, "Access requested");
        parse_row(row)
    }

    /// Join requests for the active family, newest first. Owner only.
    pub async fn access_requests(&self) -> Result<Vec<AccessRequest>> {
        self.require_owner()?;
        let family_id = self.state.family_id()?;
        select_as(
            self.remote.as_ref(),
            &Query::table(tables::ACCESS_REQUESTS)
                .eq("family_id", family_id.as_str())
                .order_desc("created_at"),
        )
        .await
    }

    /// Let the requester in. Owner only.
    pub async fn approve_request(&self, request_id: &str) -> Result<()> {
        let request = self.owned_request(request_id).await?;
        self.remote
            .insert(
                tables::FAMILY_MEMBERS,
                json!({
                    "family_id": request.family_id,
                    "user_id": request.requester_id,
                    "role": "member",
                }),
            )
            .await?;
        self.set_request_status(request_id, AccessStatus::Approved).await
    }

    /// Turn the requester away. Owner only.
    pub async fn decline_request(&self, request_id: &str) -> Result<()> {
        self.owned_request(request_id).await?;
        self.set_request_status(request_id, AccessStatus::Rejected).await
    }

    async fn owned_request(&self, request_id: &str) -> Result<AccessRequest> {
        self.require_owner()?;
        let family_id = self.state.family_id()?;
        let rows: Vec<AccessRequest> = select_as(
            self.remote.as_ref(),
            &Query::table(tables::ACCESS_REQUESTS)
                .eq("id", request_id)
                .eq("family_id", family_id.as_str()),
        )
        .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("access request {}", request_id)))
    }

    async fn set_request_status(&self, request_id: &str, status: AccessStatus) -> Result<()> {
        self.remote
            .update(
                &Query::table(tables::ACCESS_REQUESTS).eq("id", request_id),
                json!({ "status": status.as_str() }),
            )
            .await?;
        tracing::info!(request_id, status = status.as_str(), "Access request answered");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use crate::state::Session;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn service(backend: &MemoryBackend, user: &str) -> (FamilyService, Arc<AppState>) {
        let config = Arc::new(SyncConfig::default());
        let state = Arc::new(AppState::new(&config));
        *state.session.write() = Some(Session {
            user_id: user.into(),
            email: Some(format!("{}@example.com", user)),
            display_name: None,
            manager: false,
        });
        let service = FamilyService::new(
            Arc::new(backend.clone()),
            Arc::new(MemoryStore::new()),
            state.clone(),
            config,
        );
        (service, state)
    }

    #[test]
    fn test_join_code_shape() {
        let code = generate_join_code(10);
        assert_eq!(code.len(), 10);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_list_families_by_membership_or_fallback() {
        let backend = MemoryBackend::new();
        backend.seed(tables::FAMILIES, vec![
            json!({ "id": "f1", "name": "Smith" }),
            json!({ "id": "f2", "name": "Adams" }),
            json!({ "id": "f3", "name": "Jones" }),
        ]);
        backend.seed(tables::FAMILY_MEMBERS, vec![
            json!({ "family_id": "f1", "user_id": "u1", "role": "owner" }),
            json!({ "family_id": "f3", "user_id": "u1", "role": "member" }),
        ]);
        let (service, _) = service(&backend, "u1");

        let names: Vec<_> = service.list_families("u1").await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Jones", "Smith"]);

        let names: Vec<_> = service.list_families("nobody").await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Adams", "Jones", "Smith"]);
    }

    #[test]
    fn test_choose_family_precedence() {
        let backend = MemoryBackend::new();
        let (service, _) = service(&backend, "u1");
        let families = vec![
            Family { id: "f1".into(), name: "A".into(), join_code: None, owner_id: None },
            Family { id: "f2".into(), name: "B".into(), join_code: None, owner_id: None },
        ];

        assert_eq!(service.choose_family(&families, None).as_deref(), Some("f1"));
        service.remember_family("f2");
        assert_eq!(service.choose_family(&families, None).as_deref(), Some("f2"));
        assert_eq!(service.choose_family(&families, Some("f1")).as_deref(), Some("f1"));
        assert_eq!(service.choose_family(&families, Some("f9")).as_deref(), Some("f2"));

        service.remember_family("gone");
        assert_eq!(service.choose_family(&families, None).as_deref(), Some("f1"));
        assert_eq!(service.choose_family(&[], None), None);
    }

    #[tokio::test]
    async fn test_create_family_makes_owner() {
        let backend = MemoryBackend::new();
        let (service, state) = service(&backend, "u1");

        let family = service.create_family("  Smiths ").await.unwrap();
        assert_eq!(family.name, "Smiths");
        assert_eq!(family.owner_id.as_deref(), Some("u1"));

        *state.family_id.write() = Some(family.id.clone());
        assert_eq!(service.load_role().await.unwrap(), Some(Role::Owner));
        assert!(matches!(service.create_family(" ").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_join_and_approve() {
        let backend = MemoryBackend::new();
        let (owner, owner_state) = service(&backend, "owner");
        let family = owner.create_family("Smiths").await.unwrap();
        *owner_state.family_id.write() = Some(family.id.clone());
        owner.load_role().await.unwrap();
        let code = owner.rotate_join_code().await.unwrap();
        assert_eq!(code.len(), 10);

        let (joiner, joiner_state) = service(&backend, "kid");
        assert!(matches!(joiner.join_by_code("wrong").await, Err(Error::InvalidJoinCode)));
        let request = joiner.join_by_code(&code).await.unwrap();
        assert_eq!(request.status, AccessStatus::Pending);
        assert_eq!(request.requester_name.as_deref(), Some("kid@example.com"));

        let pending = owner.access_requests().await.unwrap();
        assert_eq!(pending.len(), 1);
        owner.approve_request(&request.id).await.unwrap();

        let families = joiner.list_families("kid").await.unwrap();
        assert_eq!(families[0].id, family.id);
        *joiner_state.family_id.write() = Some(family.id.clone());
        assert_eq!(joiner.load_role().await.unwrap(), Some(Role::Member));
        assert!(matches!(joiner.rotate_join_code().await, Err(Error::OwnerOnly)));

        let answered = owner.access_requests().await.unwrap();
        assert_eq!(answered[0].status, AccessStatus::Approved);
    }

    #[tokio::test]
    async fn test_decline_request() {
        let backend = MemoryBackend::new();
        backend.seed(tables::ACCESS_REQUESTS, vec![json!({
            "id": "r1", "family_id": "f1", "requester_id": "u9", "status": "pending"
        })]);
        let (owner, state) = service(&backend, "u1");
        *state.family_id.write() = Some("f1".into());
        *state.role.write() = Some(Role::Owner);

        owner.decline_request("r1").await.unwrap();
        assert_eq!(backend.rows(tables::ACCESS_REQUESTS)[0]["status"], "rejected");
        assert!(matches!(owner.decline_request("missing").await, Err(Error::NotFound(_))));
    }
}
