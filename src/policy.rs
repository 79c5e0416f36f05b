use serde::{Deserialize, Serialize};

/// The authenticated user behind an admin request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// Whether `actor` may view or edit user accounts and groups.
/// Evaluated once per request, before any handler runs.
pub fn can_manage_accounts(actor: &Actor) -> bool {
    actor.is_active && actor.is_superuser
}
