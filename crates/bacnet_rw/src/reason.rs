//! Failure classification for reject, abort and error responses

use std::fmt;

use tracing::warn;

use crate::response::FailurePdu;

bacnet_enumeration! {
    /// Reasons carried by a Reject PDU
    pub enum RejectReason: u8 {
        Other = 0 => "other",
        BufferOverflow = 1 => "bufferOverflow",
        InconsistentParameters = 2 => "inconsistentParameters",
        InvalidParameterDatatype = 3 => "invalidParameterDatatype",
        InvalidTag = 4 => "invalidTag",
        MissingRequiredParameter = 5 => "missingRequiredParameter",
        ParameterOutOfRange = 6 => "parameterOutOfRange",
        TooManyArguments = 7 => "tooManyArguments",
        UndefinedEnumeration = 8 => "undefinedEnumeration",
        UnrecognizedService = 9 => "unrecognizedService",
    }
}

bacnet_enumeration! {
    /// Reasons carried by an Abort PDU
    pub enum AbortReason: u8 {
        Other = 0 => "other",
        BufferOverflow = 1 => "bufferOverflow",
        InvalidApduInThisState = 2 => "invalidApduInThisState",
        PreemptedByHigherPriorityTask = 3 => "preemptedByHigherPriorityTask",
        SegmentationNotSupported = 4 => "segmentationNotSupported",
        SecurityError = 5 => "securityError",
        InsufficientSecurity = 6 => "insufficientSecurity",
        WindowSizeOutOfRange = 7 => "windowSizeOutOfRange",
        ApplicationExceededReplyTime = 8 => "applicationExceededReplyTime",
        OutOfResources = 9 => "outOfResources",
        TsmTimeout = 10 => "tsmTimeout",
        ApduTooLong = 11 => "apduTooLong",
    }
}

bacnet_enumeration! {
    /// Error classes of an Error PDU
    pub enum ErrorClass: u32 {
        Device = 0 => "device",
        Object = 1 => "object",
        Property = 2 => "property",
        Resources = 3 => "resources",
        Security = 4 => "security",
        Services = 5 => "services",
        Vt = 6 => "vt",
        Communication = 7 => "communication",
    }
}

bacnet_enumeration! {
    /// Error codes of an Error PDU
    pub enum ErrorCode: u32 {
        Other = 0 => "other",
        AuthenticationFailed = 1 => "authenticationFailed",
        ConfigurationInProgress = 2 => "configurationInProgress",
        DeviceBusy = 3 => "deviceBusy",
        DynamicCreationNotSupported = 4 => "dynamicCreationNotSupported",
        FileAccessDenied = 5 => "fileAccessDenied",
        IncompatibleSecurityLevels = 6 => "incompatibleSecurityLevels",
        InconsistentParameters = 7 => "inconsistentParameters",
        InconsistentSelectionCriterion = 8 => "inconsistentSelectionCriterion",
        InvalidDataType = 9 => "invalidDataType",
        InvalidFileAccessMethod = 10 => "invalidFileAccessMethod",
        InvalidFileStartPosition = 11 => "invalidFileStartPosition",
        InvalidOperatorName = 12 => "invalidOperatorName",
        InvalidParameterDataType = 13 => "invalidParameterDataType",
        InvalidTimeStamp = 14 => "invalidTimeStamp",
        KeyGenerationError = 15 => "keyGenerationError",
        MissingRequiredParameter = 16 => "missingRequiredParameter",
        NoObjectsOfSpecifiedType = 17 => "noObjectsOfSpecifiedType",
        NoSpaceForObject = 18 => "noSpaceForObject",
        NoSpaceToAddListElement = 19 => "noSpaceToAddListElement",
        NoSpaceToWriteProperty = 20 => "noSpaceToWriteProperty",
        NoVtSessionsAvailable = 21 => "noVtSessionsAvailable",
        PropertyIsNotAList = 22 => "propertyIsNotAList",
        ObjectDeletionNotPermitted = 23 => "objectDeletionNotPermitted",
        ObjectIdentifierAlreadyExists = 24 => "objectIdentifierAlreadyExists",
        OperationalProblem = 25 => "operationalProblem",
        PasswordFailure = 26 => "passwordFailure",
        ReadAccessDenied = 27 => "readAccessDenied",
        SecurityNotSupported = 28 => "securityNotSupported",
        ServiceRequestDenied = 29 => "serviceRequestDenied",
        Timeout = 30 => "timeout",
        UnknownObject = 31 => "unknownObject",
        UnknownProperty = 32 => "unknownProperty",
        UnknownVtClass = 34 => "unknownVtClass",
        UnknownVtSession = 35 => "unknownVtSession",
        UnsupportedObjectType = 36 => "unsupportedObjectType",
        ValueOutOfRange = 37 => "valueOutOfRange",
        VtSessionAlreadyClosed = 38 => "vtSessionAlreadyClosed",
        VtSessionTerminationFailure = 39 => "vtSessionTerminationFailure",
        WriteAccessDenied = 40 => "writeAccessDenied",
        CharacterSetNotSupported = 41 => "characterSetNotSupported",
        InvalidArrayIndex = 42 => "invalidArrayIndex",
        CovSubscriptionFailed = 43 => "covSubscriptionFailed",
        NotCovProperty = 44 => "notCovProperty",
        OptionalFunctionalityNotSupported = 45 => "optionalFunctionalityNotSupported",
        InvalidConfigurationData = 46 => "invalidConfigurationData",
        DatatypeNotSupported = 47 => "datatypeNotSupported",
        DuplicateName = 48 => "duplicateName",
        DuplicateObjectId = 49 => "duplicateObjectId",
        PropertyIsNotAnArray = 50 => "propertyIsNotAnArray",
    }
}

/// Symbolic reason a request failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Name of a reject reason, abort reason or error code
    Named(&'static str),
    /// Numeric code with no known name
    Code(u32),
    /// Error PDU without both class and code
    UnknownError,
    /// Nothing usable came back (timeout, closed gateway)
    NoResponse(String),
}

impl Reason {
    /// Whether this is the named reason `name`
    pub fn is(&self, name: &str) -> bool {
        matches!(self, Reason::Named(n) if *n == name)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Named(name) => f.write_str(name),
            Reason::Code(code) => write!(f, "{}", code),
            Reason::UnknownError => f.write_str("UnknownError"),
            Reason::NoResponse(detail) => f.write_str(detail),
        }
    }
}

/// Map a failure payload to its symbolic reason. Never fails.
pub fn find_reason(failure: &FailurePdu) -> Reason {
    let named = |name: Option<&'static str>, code: u32| match name {
        Some(name) => Reason::Named(name),
        None => Reason::Code(code),
    };

    match *failure {
        FailurePdu::Reject { reason } => {
            named(RejectReason::from_code(reason).name(), u32::from(reason))
        }
        FailurePdu::Abort { reason, .. } => {
            named(AbortReason::from_code(reason).name(), u32::from(reason))
        }
        FailurePdu::Error {
            error_class: Some(_),
            error_code: Some(code),
        } => named(ErrorCode::from_code(code).name(), code),
        FailurePdu::Error {
            error_class,
            error_code,
        } => {
            warn!(
                "Cannot find reason: error without class/code ({:?}/{:?})",
                error_class, error_code
            );
            Reason::UnknownError
        }
    }
}
