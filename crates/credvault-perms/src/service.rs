//! Permission management: granting, reading and revoking rows.
//!
//! Two surfaces share one set of rules:
//!
//! - the path/actor surface (`get_permissions`, `save_permissions`,
//!   `delete_permissions`), which merges grants into existing rows
//! - the UUID surface (`save_permission` .. `delete_permission`), which
//!   addresses one row at a time
//!
//! Every change requires `write_acl` on the path, every read `read_acl`, and
//! nobody may change their own row.

use credvault_core::{
    candidate_paths, validate_permission_path, InvalidAccess, PermissionData, PermissionEntry,
    PermissionId, PermissionOperation, PermissionOperations, ValidationError, WILDCARD,
};

use crate::actor::ActorContext;
use crate::checker::PermissionChecker;
use crate::error::{PermsError, Result};

/// Operations a writer may grant on a path nobody else holds rows for.
const UNGUARDED: PermissionOperations = PermissionOperations::from_bits(0b111);

/// Permission rows, guarded by the permission rules themselves.
#[derive(Clone)]
pub struct PermissionService {
    checker: PermissionChecker,
}

impl PermissionService {
    pub fn new(checker: PermissionChecker) -> Self {
        Self { checker }
    }

    pub fn checker(&self) -> &PermissionChecker {
        &self.checker
    }

    fn require_other_actor(&self, ctx: &ActorContext, actor: &str) -> Result<()> {
        if self.checker.user_allowed_to_operate_on_actor(ctx, actor) {
            return Ok(());
        }
        tracing::info!(caller = ?ctx.actor(), actor, "refused change to own permissions");
        Err(PermsError::InvalidPermissionOperation(
            "error.permission.invalid_update_operation",
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Path and actor
    // ─────────────────────────────────────────────────────────────────────────

    /// All rows stored for `path`. Requires `read_acl`.
    pub async fn get_permissions(
        &self,
        ctx: &ActorContext,
        path: &str,
    ) -> Result<Vec<PermissionData>> {
        let path = validate_permission_path(path).map_err(|_| InvalidAccess)?;
        self.checker
            .check(ctx, &path, PermissionOperation::ReadAcl)
            .await?;
        Ok(self.checker.store().find_by_path(&path).await?)
    }

    /// Grant every entry, merging into existing rows.
    ///
    /// All entries are checked before any is written: one refusal fails the
    /// whole call. A caller holding `write` on a concrete path that no other
    /// actor has a covering row for may grant `read`, `write` and `delete`
    /// there without `write_acl`. Wildcard paths always need `write_acl`.
    pub async fn save_permissions(
        &self,
        ctx: &ActorContext,
        entries: &[PermissionEntry],
    ) -> Result<Vec<PermissionData>> {
        let mut validated = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.validated()?;
            self.require_other_actor(ctx, &entry.actor)?;

            if !self.is_unguarded(ctx, &entry).await? {
                self.checker
                    .check(ctx, &entry.path, PermissionOperation::WriteAcl)
                    .await?;
            }
            validated.push(entry);
        }

        let mut saved = Vec::with_capacity(validated.len());
        for entry in validated {
            saved.push(self.merge(&entry.path, &entry.actor, entry.operation_set()).await?);
        }
        Ok(saved)
    }

    async fn is_unguarded(&self, ctx: &ActorContext, entry: &PermissionEntry) -> Result<bool> {
        if entry.path.ends_with(WILDCARD) || !UNGUARDED.is_superset(&entry.operation_set()) {
            return Ok(false);
        }
        let Some(caller) = ctx.actor() else {
            return Ok(false);
        };
        if !self
            .checker
            .has_permission(ctx, &entry.path, PermissionOperation::Write)
            .await?
        {
            return Ok(false);
        }

        let store = self.checker.store();
        for path in candidate_paths(&entry.path) {
            if store.find_by_path(&path).await?.iter().any(|row| row.actor != caller) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Remove the row for (`path`, `actor`). Requires `write_acl`.
    ///
    /// Returns `false` if there was no such row.
    pub async fn delete_permissions(
        &self,
        ctx: &ActorContext,
        path: &str,
        actor: &str,
    ) -> Result<bool> {
        let path = validate_permission_path(path).map_err(|_| InvalidAccess)?;
        self.checker
            .check(ctx, &path, PermissionOperation::WriteAcl)
            .await?;
        self.require_other_actor(ctx, actor)?;

        let store = self.checker.store();
        match store.find_by_path_and_actor(&path, actor).await? {
            Some(row) => Ok(store.delete_permission(&row.uuid).await?),
            None => Ok(false),
        }
    }

    /// Remove some operations from (`path`, `actor`). Requires `write_acl`.
    ///
    /// A row left with no operations is deleted; `None` is returned then.
    pub async fn revoke_operations(
        &self,
        ctx: &ActorContext,
        path: &str,
        actor: &str,
        operations: &[PermissionOperation],
    ) -> Result<Option<PermissionData>> {
        let path = validate_permission_path(path).map_err(|_| InvalidAccess)?;
        self.checker
            .check(ctx, &path, PermissionOperation::WriteAcl)
            .await?;
        self.require_other_actor(ctx, actor)?;

        let store = self.checker.store();
        let mut row = store
            .find_by_path_and_actor(&path, actor)
            .await?
            .ok_or(InvalidAccess)?;
        for op in operations {
            row.operations.remove(*op);
        }

        if row.operations.is_empty() {
            store.delete_permission(&row.uuid).await?;
            return Ok(None);
        }
        store.save_permission(&row).await?;
        Ok(Some(row))
    }

    /// Paths `actor` holds any row for.
    pub async fn find_all_paths_by_actor(&self, actor: &str) -> Result<Vec<String>> {
        self.checker.find_all_paths_by_actor(actor).await
    }

    /// Give the caller every operation on a credential it just created.
    ///
    /// Does nothing for a caller without an identity.
    pub async fn grant_creator(&self, ctx: &ActorContext, path: &str) -> Result<()> {
        if let Some(actor) = ctx.actor() {
            self.merge(path, actor, PermissionOperations::all()).await?;
            tracing::debug!(actor, path, "granted creator permissions");
        }
        Ok(())
    }

    /// Drop every row for exactly `path`, after its credential was deleted.
    pub async fn delete_for_path(&self, path: &str) -> Result<usize> {
        Ok(self.checker.store().delete_by_path(path).await?)
    }

    async fn merge(
        &self,
        path: &str,
        actor: &str,
        operations: PermissionOperations,
    ) -> Result<PermissionData> {
        let store = self.checker.store();
        let row = match store.find_by_path_and_actor(path, actor).await? {
            Some(mut row) => {
                row.operations = row.operations.union(operations);
                row
            }
            None => PermissionData::new(path, actor, operations),
        };
        store.save_permission(&row).await?;
        Ok(row)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // UUID-addressed rows
    // ─────────────────────────────────────────────────────────────────────────

    /// Create one row. Requires `write_acl`; the row must not exist yet.
    pub async fn save_permission(
        &self,
        ctx: &ActorContext,
        entry: &PermissionEntry,
    ) -> Result<PermissionData> {
        let entry = entry.validated()?;
        self.checker
            .check(ctx, &entry.path, PermissionOperation::WriteAcl)
            .await?;
        self.require_other_actor(ctx, &entry.actor)?;

        let store = self.checker.store();
        if store
            .find_by_path_and_actor(&entry.path, &entry.actor)
            .await?
            .is_some()
        {
            return Err(PermsError::Conflict("error.permission.already_exists"));
        }

        let row = PermissionData::new(entry.path, entry.actor, entry.operations.into_iter().collect());
        store.save_permission(&row).await?;
        Ok(row)
    }

    /// One row by id. Requires `read_acl` on its path.
    pub async fn get_permission(
        &self,
        ctx: &ActorContext,
        uuid: &PermissionId,
    ) -> Result<PermissionData> {
        let row = self.find_row(uuid).await?;
        self.checker
            .check(ctx, &row.path, PermissionOperation::ReadAcl)
            .await?;
        Ok(row)
    }

    /// One row by path and actor. Requires `read_acl` on the path.
    pub async fn find_permission_by_path_and_actor(
        &self,
        ctx: &ActorContext,
        path: &str,
        actor: &str,
    ) -> Result<PermissionData> {
        let path = validate_permission_path(path).map_err(|_| InvalidAccess)?;
        self.checker
            .check(ctx, &path, PermissionOperation::ReadAcl)
            .await?;
        Ok(self
            .checker
            .store()
            .find_by_path_and_actor(&path, actor)
            .await?
            .ok_or(InvalidAccess)?)
    }

    /// Replace the operations of row `uuid`, which must have the entry's
    /// path and actor. Requires `write_acl`.
    pub async fn put_permission(
        &self,
        ctx: &ActorContext,
        uuid: &PermissionId,
        entry: &PermissionEntry,
    ) -> Result<PermissionData> {
        let entry = entry.validated()?;
        self.checker
            .check(ctx, &entry.path, PermissionOperation::WriteAcl)
            .await?;
        self.require_other_actor(ctx, &entry.actor)?;

        let mut row = self.find_row(uuid).await?;
        if row.path != entry.path || row.actor != entry.actor {
            return Err(PermsError::Conflict(
                "error.permission.mismatched_uuid_actor_path",
            ));
        }

        row.operations = entry.operation_set();
        self.checker.store().save_permission(&row).await?;
        Ok(row)
    }

    /// Replace the operations of row `uuid`. Requires `write_acl`.
    pub async fn patch_permission(
        &self,
        ctx: &ActorContext,
        uuid: &PermissionId,
        operations: &[PermissionOperation],
    ) -> Result<PermissionData> {
        if operations.is_empty() {
            return Err(ValidationError::new("error.permission.missing_operations").into());
        }

        let mut row = self.find_row(uuid).await?;
        self.checker
            .check(ctx, &row.path, PermissionOperation::WriteAcl)
            .await?;
        self.require_other_actor(ctx, &row.actor)?;

        row.operations = operations.iter().copied().collect();
        self.checker.store().save_permission(&row).await?;
        Ok(row)
    }

    /// Delete row `uuid` and return it. Requires `write_acl`.
    pub async fn delete_permission(
        &self,
        ctx: &ActorContext,
        uuid: &PermissionId,
    ) -> Result<PermissionData> {
        let row = self.find_row(uuid).await?;
        self.checker
            .check(ctx, &row.path, PermissionOperation::WriteAcl)
            .await?;
        self.require_other_actor(ctx, &row.actor)?;

        self.checker.store().delete_permission(&row.uuid).await?;
        Ok(row)
    }

    async fn find_row(&self, uuid: &PermissionId) -> Result<PermissionData> {
        Ok(self
            .checker
            .store()
            .find_permission(uuid)
            .await?
            .ok_or(InvalidAccess)?)
    }
}
