//! LDAP result codes and the operation-level error type.
//!
//! Every response carries a [`ResultCode`]. Handlers report failures by
//! returning an [`LdapError`], which becomes the result code, matched DN and
//! diagnostic message of that operation's response. The connection stays
//! open.

use std::fmt;

use thiserror::Error;

/// Result codes from RFC 4511 section 4.1.9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    TimeLimitExceeded = 3,
    SizeLimitExceeded = 4,
    CompareFalse = 5,
    CompareTrue = 6,
    AuthMethodNotSupported = 7,
    StrongAuthRequired = 8,
    Referral = 10,
    AdminLimitExceeded = 11,
    UnavailableCriticalExtension = 12,
    ConfidentialityRequired = 13,
    SaslBindInProgress = 14,
    NoSuchAttribute = 16,
    UndefinedAttributeType = 17,
    InappropriateMatching = 18,
    ConstraintViolation = 19,
    AttributeOrValueExists = 20,
    InvalidAttributeSyntax = 21,
    NoSuchObject = 32,
    AliasProblem = 33,
    InvalidDnSyntax = 34,
    IsLeaf = 35,
    AliasDereferencingProblem = 36,
    InappropriateAuthentication = 48,
    InvalidCredentials = 49,
    InsufficientAccessRights = 50,
    Busy = 51,
    Unavailable = 52,
    UnwillingToPerform = 53,
    LoopDetect = 54,
    NamingViolation = 64,
    ObjectClassViolation = 65,
    NotAllowedOnNonLeaf = 66,
    NotAllowedOnRdn = 67,
    EntryAlreadyExists = 68,
    ObjectClassModsProhibited = 69,
    AffectsMultipleDsas = 71,
    Other = 80,
}

impl ResultCode {
    const ALL: [ResultCode; 40] = [
        ResultCode::Success,
        ResultCode::OperationsError,
        ResultCode::ProtocolError,
        ResultCode::TimeLimitExceeded,
        ResultCode::SizeLimitExceeded,
        ResultCode::CompareFalse,
        ResultCode::CompareTrue,
        ResultCode::AuthMethodNotSupported,
        ResultCode::StrongAuthRequired,
        ResultCode::Referral,
        ResultCode::AdminLimitExceeded,
        ResultCode::UnavailableCriticalExtension,
        ResultCode::ConfidentialityRequired,
        ResultCode::SaslBindInProgress,
        ResultCode::NoSuchAttribute,
        ResultCode::UndefinedAttributeType,
        ResultCode::InappropriateMatching,
        ResultCode::ConstraintViolation,
        ResultCode::AttributeOrValueExists,
        ResultCode::InvalidAttributeSyntax,
        ResultCode::NoSuchObject,
        ResultCode::AliasProblem,
        ResultCode::InvalidDnSyntax,
        ResultCode::IsLeaf,
        ResultCode::AliasDereferencingProblem,
        ResultCode::InappropriateAuthentication,
        ResultCode::InvalidCredentials,
        ResultCode::InsufficientAccessRights,
        ResultCode::Busy,
        ResultCode::Unavailable,
        ResultCode::UnwillingToPerform,
        ResultCode::LoopDetect,
        ResultCode::NamingViolation,
        ResultCode::ObjectClassViolation,
        ResultCode::NotAllowedOnNonLeaf,
        ResultCode::NotAllowedOnRdn,
        ResultCode::EntryAlreadyExists,
        ResultCode::ObjectClassModsProhibited,
        ResultCode::AffectsMultipleDsas,
        ResultCode::Other,
    ];

    /// Numeric value placed in the ENUMERATED resultCode field
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| i64::from(c.code()) == code)
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            ResultCode::Success | ResultCode::CompareFalse | ResultCode::CompareTrue
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Failure of a single operation, reported to the client in its response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct LdapError {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
}

impl LdapError {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: message.into(),
        }
    }

    /// Attach the DN of the deepest existing entry
    pub fn with_matched_dn(mut self, dn: impl Into<String>) -> Self {
        self.matched_dn = dn.into();
        self
    }

    pub fn operations_error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::OperationsError, message)
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::ProtocolError, message)
    }

    pub fn time_limit_exceeded() -> Self {
        Self::new(ResultCode::TimeLimitExceeded, "")
    }

    pub fn size_limit_exceeded() -> Self {
        Self::new(ResultCode::SizeLimitExceeded, "")
    }

    pub fn auth_method_not_supported(message: impl Into<String>) -> Self {
        Self::new(ResultCode::AuthMethodNotSupported, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InvalidCredentials, message)
    }

    pub fn no_such_object(message: impl Into<String>) -> Self {
        Self::new(ResultCode::NoSuchObject, message)
    }

    pub fn entry_already_exists(message: impl Into<String>) -> Self {
        Self::new(ResultCode::EntryAlreadyExists, message)
    }

    pub fn attribute_or_value_exists(message: impl Into<String>) -> Self {
        Self::new(ResultCode::AttributeOrValueExists, message)
    }

    pub fn naming_violation(message: impl Into<String>) -> Self {
        Self::new(ResultCode::NamingViolation, message)
    }

    pub fn unwilling_to_perform(message: impl Into<String>) -> Self {
        Self::new(ResultCode::UnwillingToPerform, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Unavailable, message)
    }

    pub fn unavailable_critical_extension(oid: &str) -> Self {
        Self::new(
            ResultCode::UnavailableCriticalExtension,
            format!("unsupported critical control {oid}"),
        )
    }
}

impl From<ResultCode> for LdapError {
    fn from(code: ResultCode) -> Self {
        Self::new(code, "")
    }
}

impl From<crate::error::ProtocolError> for LdapError {
    fn from(err: crate::error::ProtocolError) -> Self {
        Self::protocol_error(err.to_string())
    }
}

/// Result type for handler callbacks and operation processing
pub type LdapResult<T> = std::result::Result<T, LdapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_values() {
        assert_eq!(ResultCode::Success.code(), 0);
        assert_eq!(ResultCode::SizeLimitExceeded.code(), 4);
        assert_eq!(ResultCode::InvalidCredentials.code(), 49);
        assert_eq!(ResultCode::AffectsMultipleDsas.code(), 71);
        assert_eq!(ResultCode::Other.code(), 80);
    }

    #[test]
    fn test_from_code_round_trip() {
        for code in ResultCode::ALL {
            assert_eq!(ResultCode::from_code(i64::from(code.code())), Some(code));
        }
        assert_eq!(ResultCode::from_code(9), None);
        assert_eq!(ResultCode::from_code(-1), None);
    }

    #[test]
    fn test_error_display_includes_code() {
        let err = LdapError::no_such_object("uid=x").with_matched_dn("dc=example");
        assert_eq!(err.to_string(), "NoSuchObject (32): uid=x");
        assert_eq!(err.matched_dn, "dc=example");
    }
}
