//! Authentication gate: the per-connection identity and the LOGIN /
//! REGISTER / LOGOUT transitions.

use skiff_proto::{fail_tag, ok_tag, FailReason, Verb};

use crate::audit;
use crate::error::ServerError;
use crate::password::PasswordHasher;
use crate::state::AppState;
use crate::stores::AccountStore;

/// The authenticated-user snapshot carried by one session.
///
/// Owned exclusively by the session; handlers receive it by reference and
/// return a replacement value when a command changes it.  It is never
/// shared across connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User { id: i64, username: String },
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User { .. })
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::Anonymous => None,
            Identity::User { id, .. } => Some(*id),
        }
    }

    /// Name used for audit attribution; `"unknown"` before authentication.
    pub fn actor_name(&self) -> &str {
        match self {
            Identity::Anonymous => "unknown",
            Identity::User { username, .. } => username,
        }
    }
}

/// Response line plus the identity the session should adopt afterwards.
pub struct AuthReply {
    pub line: String,
    pub transition: Option<Identity>,
}

impl AuthReply {
    fn stay(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            transition: None,
        }
    }

    fn become_identity(line: impl Into<String>, identity: Identity) -> Self {
        Self {
            line: line.into(),
            transition: Some(identity),
        }
    }
}

/// `LOGIN <username> <password>`
pub fn login(state: &AppState, identity: &Identity, args: &str) -> Result<AuthReply, ServerError> {
    if identity.is_authenticated() {
        audit::record(
            &*state.audit,
            identity.user_id(),
            identity.actor_name(),
            &fail_tag(Verb::Login, FailReason::AlreadyLoggedIn),
        );
        return Ok(AuthReply::stay("ERROR: Already logged in"));
    }

    let Some((username, password)) = split_credentials(args) else {
        audit::record(
            &*state.audit,
            None,
            identity.actor_name(),
            &fail_tag(Verb::Login, FailReason::Usage),
        );
        return Ok(AuthReply::stay("ERROR: Usage LOGIN <username> <password>"));
    };

    let Some(account) = state.accounts.find_by_username(username)? else {
        audit::record(
            &*state.audit,
            None,
            identity.actor_name(),
            &fail_tag(Verb::Login, FailReason::UserNotFound),
        );
        return Ok(AuthReply::stay("ERROR: User not found"));
    };

    if !state.hasher.verify(password, &account.password_hash) {
        audit::record(
            &*state.audit,
            Some(account.id),
            identity.actor_name(),
            &fail_tag(Verb::Login, FailReason::InvalidPassword),
        );
        return Ok(AuthReply::stay("ERROR: Invalid password"));
    }

    state
        .accounts
        .update_last_login(account.id, chrono::Utc::now())?;

    tracing::info!(username = %account.username, "login");
    audit::record(
        &*state.audit,
        Some(account.id),
        &account.username,
        &ok_tag(Verb::Login),
    );

    Ok(AuthReply::become_identity(
        "LOGIN OK",
        Identity::User {
            id: account.id,
            username: account.username,
        },
    ))
}

/// `REGISTER <username> <password>` -- creates the account and, per the
/// protocol, immediately authenticates the session as it.
pub fn register(
    state: &AppState,
    identity: &Identity,
    args: &str,
) -> Result<AuthReply, ServerError> {
    if identity.is_authenticated() {
        audit::record(
            &*state.audit,
            identity.user_id(),
            identity.actor_name(),
            &fail_tag(Verb::Register, FailReason::AlreadyLoggedIn),
        );
        return Ok(AuthReply::stay("ERROR: Already logged in"));
    }

    let Some((username, password)) = split_credentials(args) else {
        audit::record(
            &*state.audit,
            None,
            identity.actor_name(),
            &fail_tag(Verb::Register, FailReason::Usage),
        );
        return Ok(AuthReply::stay(
            "ERROR: Usage REGISTER <username> <password>",
        ));
    };

    if state.accounts.find_by_username(username)?.is_some() {
        audit::record(
            &*state.audit,
            None,
            identity.actor_name(),
            &fail_tag(Verb::Register, FailReason::UsernameExists),
        );
        return Ok(AuthReply::stay("ERROR: Username already exists"));
    }

    let digest = state.hasher.hash(password)?;
    let account = state.accounts.insert(username, &digest)?;

    tracing::info!(username = %account.username, "registered new account");
    audit::record(
        &*state.audit,
        Some(account.id),
        &account.username,
        &ok_tag(Verb::Register),
    );

    Ok(AuthReply::become_identity(
        "REGISTER OK",
        Identity::User {
            id: account.id,
            username: account.username,
        },
    ))
}

/// `LOGOUT` -- clears the identity; the connection stays open.
pub fn logout(state: &AppState, identity: &Identity) -> AuthReply {
    audit::record(
        &*state.audit,
        identity.user_id(),
        identity.actor_name(),
        &ok_tag(Verb::Logout),
    );
    AuthReply::become_identity("LOGOUT OK", Identity::Anonymous)
}

/// Credentials are exactly two whitespace-separated tokens.
fn split_credentials(args: &str) -> Option<(&str, &str)> {
    let mut tokens = args.split_whitespace();
    let username = tokens.next()?;
    let password = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    Some((username, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{state_with_memory_store, PlainHasher};

    #[test]
    fn split_credentials_requires_two_tokens() {
        assert_eq!(split_credentials("a b"), Some(("a", "b")));
        assert_eq!(split_credentials("a"), None);
        assert_eq!(split_credentials(""), None);
        assert_eq!(split_credentials("a b c"), None);
    }

    #[test]
    fn register_then_login_round_trip() {
        let (state, store, _dir) = state_with_memory_store();

        let reply = register(&state, &Identity::Anonymous, "alice pw1").unwrap();
        assert_eq!(reply.line, "REGISTER OK");
        let identity = reply.transition.expect("register implies login");
        assert!(identity.is_authenticated());

        // Second registration under the same name fails.
        let reply = register(&state, &Identity::Anonymous, "alice pw2").unwrap();
        assert_eq!(reply.line, "ERROR: Username already exists");
        assert!(reply.transition.is_none());

        // Wrong then right password.
        let reply = login(&state, &Identity::Anonymous, "alice wrongpw").unwrap();
        assert_eq!(reply.line, "ERROR: Invalid password");

        let reply = login(&state, &Identity::Anonymous, "alice pw1").unwrap();
        assert_eq!(reply.line, "LOGIN OK");
        assert_eq!(reply.transition, Some(identity));

        let tags = store.operation_tags();
        assert!(tags.contains(&"REGISTER_OK".to_string()));
        assert!(tags.contains(&"REGISTER_FAIL:UsernameExists".to_string()));
        assert!(tags.contains(&"LOGIN_FAIL:InvalidPassword".to_string()));
        assert!(tags.contains(&"LOGIN_OK".to_string()));
    }

    #[test]
    fn login_unknown_user() {
        let (state, store, _dir) = state_with_memory_store();

        let reply = login(&state, &Identity::Anonymous, "ghost pw").unwrap();
        assert_eq!(reply.line, "ERROR: User not found");
        assert_eq!(
            store.operation_tags(),
            vec!["LOGIN_FAIL:UserNotFound".to_string()]
        );
    }

    #[test]
    fn login_rejected_when_already_authenticated() {
        let (state, _store, _dir) = state_with_memory_store();
        let digest = PlainHasher.hash("pw").unwrap();
        state.accounts.insert("alice", &digest).unwrap();

        let current = Identity::User {
            id: 1,
            username: "alice".into(),
        };
        let reply = login(&state, &current, "alice pw").unwrap();
        assert_eq!(reply.line, "ERROR: Already logged in");
        assert!(reply.transition.is_none());
    }

    #[test]
    fn login_records_last_login() {
        let (state, _store, _dir) = state_with_memory_store();
        let digest = PlainHasher.hash("pw").unwrap();
        state.accounts.insert("alice", &digest).unwrap();

        login(&state, &Identity::Anonymous, "alice pw").unwrap();

        let account = state.accounts.find_by_username("alice").unwrap().unwrap();
        assert!(account.last_login.is_some());
    }

    #[test]
    fn logout_clears_identity() {
        let (state, store, _dir) = state_with_memory_store();
        let current = Identity::User {
            id: 7,
            username: "alice".into(),
        };

        let reply = logout(&state, &current);
        assert_eq!(reply.line, "LOGOUT OK");
        assert_eq!(reply.transition, Some(Identity::Anonymous));
        assert_eq!(store.operation_tags(), vec!["LOGOUT_OK".to_string()]);
    }

    #[test]
    fn usage_errors() {
        let (state, _store, _dir) = state_with_memory_store();

        let reply = login(&state, &Identity::Anonymous, "alice").unwrap();
        assert_eq!(reply.line, "ERROR: Usage LOGIN <username> <password>");

        let reply = register(&state, &Identity::Anonymous, "").unwrap();
        assert_eq!(reply.line, "ERROR: Usage REGISTER <username> <password>");
    }
}
