//! The access decision: can this actor perform this operation on this path?

use std::sync::Arc;

use credvault_core::{InvalidAccess, PermissionOperation};
use credvault_store::{PermissionStore, PermissionStoreExt};

use crate::actor::ActorContext;
use crate::error::Result;

/// Answers permission questions against a [`PermissionStore`].
///
/// With enforcement off every check passes, but lookups still run so call
/// sites behave the same either way.
#[derive(Clone)]
pub struct PermissionChecker {
    store: Arc<dyn PermissionStore>,
    enforce: bool,
}

impl PermissionChecker {
    pub fn new(store: Arc<dyn PermissionStore>, enforce: bool) -> Self {
        Self { store, enforce }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    /// Whether `ctx` may perform `op` on `path`.
    ///
    /// A path with no row for the actor (exact or wildcard) is `false`.
    pub async fn has_permission(
        &self,
        ctx: &ActorContext,
        path: &str,
        op: PermissionOperation,
    ) -> Result<bool> {
        let allowed = match ctx.actor() {
            Some(actor) => self.store.has_permission(actor, path, op).await?,
            None => false,
        };
        Ok(allowed || !self.enforce)
    }

    /// Like [`has_permission`](Self::has_permission), but a denial is an
    /// [`InvalidAccess`].
    pub async fn check(
        &self,
        ctx: &ActorContext,
        path: &str,
        op: PermissionOperation,
    ) -> Result<()> {
        if self.has_permission(ctx, path, op).await? {
            return Ok(());
        }
        tracing::info!(actor = ?ctx.actor(), path, operation = %op, "permission denied");
        Err(InvalidAccess.into())
    }

    /// Whether the caller may change the grants of `actor`.
    ///
    /// Nobody may modify their own grant, and a caller without an identity
    /// may modify nothing.
    pub fn user_allowed_to_operate_on_actor(&self, ctx: &ActorContext, actor: &str) -> bool {
        if !self.enforce {
            return true;
        }
        match ctx.actor() {
            Some(current) => current != actor,
            None => false,
        }
    }

    /// Every path `actor` holds a row for.
    pub async fn find_all_paths_by_actor(&self, actor: &str) -> Result<Vec<String>> {
        Ok(self.store.find_all_paths_by_actor(actor).await?)
    }
}
