//! Audit outcome tags.
//!
//! Every terminal command outcome is recorded in operation history under a
//! machine-parseable tag: `<VERB>_OK` (optionally with a detail suffix) or
//! `<VERB>_FAIL:<Reason>`.  Operational tooling matches on these tags, so
//! the vocabulary lives here rather than as free text in the handlers.

use crate::command::Verb;

/// Failure reasons that can appear after `<VERB>_FAIL:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    NotLoggedIn,
    Usage,
    NoFilename,
    InvalidFilename,
    InvalidFileSize,
    TooLarge,
    Incomplete,
    Stalled,
    Storage,
    UserNotFound,
    InvalidPassword,
    AlreadyLoggedIn,
    UsernameExists,
    FileNotFound,
    AccessDenied,
    FileNotFoundOnServer,
    SizeMismatch,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::NotLoggedIn => "NotLoggedIn",
            FailReason::Usage => "Usage",
            FailReason::NoFilename => "NoFilename",
            FailReason::InvalidFilename => "InvalidFilename",
            FailReason::InvalidFileSize => "InvalidFileSize",
            FailReason::TooLarge => "TooLarge",
            FailReason::Incomplete => "Incomplete",
            FailReason::Stalled => "Stalled",
            FailReason::Storage => "Storage",
            FailReason::UserNotFound => "UserNotFound",
            FailReason::InvalidPassword => "InvalidPassword",
            FailReason::AlreadyLoggedIn => "AlreadyLoggedIn",
            FailReason::UsernameExists => "UsernameExists",
            FailReason::FileNotFound => "FileNotFound",
            FailReason::AccessDenied => "AccessDenied",
            FailReason::FileNotFoundOnServer => "FileNotFoundOnServer",
            FailReason::SizeMismatch => "SizeMismatch",
        }
    }
}

/// `<VERB>_OK`
pub fn ok_tag(verb: Verb) -> String {
    format!("{}_OK", verb.as_str())
}

/// `<VERB>_OK: <detail>` -- used by transfers to record the filename.
pub fn ok_tag_with(verb: Verb, detail: &str) -> String {
    format!("{}_OK: {}", verb.as_str(), detail)
}

/// `<VERB>_FAIL:<Reason>`
pub fn fail_tag(verb: Verb, reason: FailReason) -> String {
    format!("{}_FAIL:{}", verb.as_str(), reason.as_str())
}
