/// Role-based access control
///
/// Every authorization decision goes through [`authorize`], which consults
/// one declarative table of `(resource, action) -> (standard rule, elevated
/// rule)`. Roles fall into two tiers: `admin` and `owner` are elevated,
/// `user` and `sales` are standard.
///
/// A rule either allows the action outright, allows it only on rows the
/// caller owns, or denies it. Owner-only rules produce a [`RowScope`] that
/// list queries push into their `WHERE` clause and single-record handlers
/// check with [`authorize_record`].
///
/// Token identities are additionally limited by their scopes: read actions
/// need `<resource>:read`, all other actions need `<resource>:write`.
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::auth::identity::Identity;
/// use rolodex_shared::auth::policy::{authorize, Action, Resource, RowScope};
///
/// fn visible(identity: &Identity) -> Result<RowScope, Box<dyn std::error::Error>> {
///     Ok(authorize(identity, Resource::Opportunities, Action::List)?)
/// }
/// ```

use serde::Serialize;

use super::identity::Identity;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthzError {
    /// The caller's role does not permit the action on this resource or row
    #[error("You do not have permission to perform this action")]
    Forbidden,

    /// The caller's token lacks the required scope
    #[error("Missing required scope: {0}")]
    MissingScope(String),
}

/// Protected resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Accounts,
    Contacts,
    Opportunities,
    Users,
    Tokens,
    Audit,
    Mail,
}

impl Resource {
    /// Name used in token scopes
    pub fn scope_name(&self) -> &'static str {
        match self {
            Resource::Accounts => "accounts",
            Resource::Contacts => "contacts",
            Resource::Opportunities => "opportunities",
            Resource::Users => "users",
            Resource::Tokens => "tokens",
            Resource::Audit => "audit",
            Resource::Mail => "mail",
        }
    }
}

/// Operations on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
    Import,
    Export,
    ChangeRole,
    ResetPassword,
    Revoke,
    SendMail,
}

impl Action {
    /// Whether the action only reads data
    pub fn is_read(&self) -> bool {
        matches!(self, Action::List | Action::Read | Action::Export)
    }
}

/// Role tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Elevated,
}

impl Tier {
    pub fn of(identity: &Identity) -> Self {
        if identity.is_elevated() {
            Tier::Elevated
        } else {
            Tier::Standard
        }
    }
}

/// Outcome of a policy lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Allow,
    OwnOnly,
    Deny,
}

/// Rows an authorized caller may see or touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowScope {
    /// Every row
    All,

    /// Only rows whose owner is the given user
    OwnedBy(i64),
}

impl RowScope {
    /// Owner filter to push into a query, if any
    pub fn owner_filter(&self) -> Option<i64> {
        match self {
            RowScope::All => None,
            RowScope::OwnedBy(id) => Some(*id),
        }
    }

    /// Whether a row with this owner is inside the scope
    ///
    /// Unowned rows are only visible to an unrestricted scope.
    pub fn permits(&self, owner_id: Option<i64>) -> bool {
        match self {
            RowScope::All => true,
            RowScope::OwnedBy(id) => owner_id == Some(*id),
        }
    }
}

use Action::*;
use Resource::*;
use Rule::{Allow, Deny, OwnOnly};

/// The policy table: `(resource, action, standard, elevated)`
///
/// A pair missing from the table is denied for everyone.
const POLICY: &[(Resource, Action, Rule, Rule)] = &[
    (Accounts, List, Allow, Allow),
    (Accounts, Read, Allow, Allow),
    (Accounts, Create, Allow, Allow),
    (Accounts, Update, Allow, Allow),
    (Accounts, Delete, Allow, Allow),
    (Accounts, Import, Allow, Allow),
    (Accounts, Export, Allow, Allow),
    (Contacts, List, Allow, Allow),
    (Contacts, Read, Allow, Allow),
    (Contacts, Create, Allow, Allow),
    (Contacts, Update, Allow, Allow),
    (Contacts, Delete, Allow, Allow),
    (Contacts, Import, Allow, Allow),
    (Contacts, Export, Allow, Allow),
    (Opportunities, List, OwnOnly, Allow),
    (Opportunities, Read, OwnOnly, Allow),
    (Opportunities, Create, OwnOnly, Allow),
    (Opportunities, Update, OwnOnly, Allow),
    (Opportunities, Delete, OwnOnly, Allow),
    (Opportunities, Import, OwnOnly, Allow),
    (Opportunities, Export, OwnOnly, Allow),
    (Users, List, Deny, Allow),
    (Users, Read, Deny, Allow),
    (Users, Create, Deny, Allow),
    (Users, Update, Deny, Allow),
    (Users, Delete, Deny, Allow),
    (Users, ChangeRole, Deny, Allow),
    (Users, ResetPassword, Deny, Allow),
    (Tokens, List, OwnOnly, Allow),
    (Tokens, Create, OwnOnly, Allow),
    (Tokens, Revoke, OwnOnly, Allow),
    (Audit, List, Deny, Allow),
    (Mail, SendMail, Deny, Allow),
];

/// Looks up the rule for a resource, action and tier
pub fn rule_for(resource: Resource, action: Action, tier: Tier) -> Rule {
    POLICY
        .iter()
        .find(|(r, a, _, _)| *r == resource && *a == action)
        .map(|(_, _, standard, elevated)| match tier {
            Tier::Standard => *standard,
            Tier::Elevated => *elevated,
        })
        .unwrap_or(Deny)
}

/// Authorizes an action and returns the rows it may cover
///
/// # Errors
///
/// - `AuthzError::MissingScope` if a scoped token lacks the resource scope
/// - `AuthzError::Forbidden` if the policy denies the action, or if a token
///   identity tries to mint tokens
pub fn authorize(
    identity: &Identity,
    resource: Resource,
    action: Action,
) -> Result<RowScope, AuthzError> {
    let required = format!(
        "{}:{}",
        resource.scope_name(),
        if action.is_read() { "read" } else { "write" }
    );
    if !identity.has_scope(&required) {
        tracing::debug!(user_id = identity.user_id, scope = %required, "Token scope missing");
        return Err(AuthzError::MissingScope(required));
    }

    // Tokens are minted from interactive sessions only.
    if resource == Tokens && action == Create && !identity.is_session() {
        return Err(AuthzError::Forbidden);
    }

    match rule_for(resource, action, Tier::of(identity)) {
        Allow => Ok(RowScope::All),
        OwnOnly => Ok(RowScope::OwnedBy(identity.user_id)),
        Deny => {
            tracing::debug!(
                user_id = identity.user_id,
                role = ?identity.role,
                ?resource,
                ?action,
                "Policy denied action"
            );
            Err(AuthzError::Forbidden)
        }
    }
}

/// Authorizes an action on one row with the given owner
///
/// # Errors
///
/// Everything [`authorize`] returns, plus `AuthzError::Forbidden` when the
/// row lies outside the caller's scope.
pub fn authorize_record(
    identity: &Identity,
    resource: Resource,
    action: Action,
    owner_id: Option<i64>,
) -> Result<(), AuthzError> {
    let scope = authorize(identity, resource, action)?;
    if scope.permits(owner_id) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}
