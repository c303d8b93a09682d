//! Responses and their interpretation into values

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::datatype::DatatypeResolver;
use crate::encoding::Any;
use crate::error::{Error, Result};
use crate::reason::{ErrorClass, ErrorCode, Reason, find_reason};
use crate::types::{ConfirmedService, ObjectIdentifier, PropertyIdentifier};
use crate::value::Value;

/// Successful reply from a device
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    ReadPropertyAck {
        object: ObjectIdentifier,
        property: PropertyIdentifier,
        array_index: Option<u32>,
        value: Any,
    },
    ReadPropertyMultipleAck {
        results: Vec<ReadAccessResult>,
    },
    SimpleAck {
        service: ConfirmedService,
    },
    /// Complex ack for a service the caller did not expect one from
    ComplexAck {
        service: ConfirmedService,
        payload: Vec<u8>,
    },
}

impl Response {
    fn describe(&self) -> String {
        match self {
            Response::ReadPropertyAck { .. } => "ReadPropertyAck".to_string(),
            Response::ReadPropertyMultipleAck { .. } => "ReadPropertyMultipleAck".to_string(),
            Response::SimpleAck { service } => format!("SimpleAck({})", service),
            Response::ComplexAck { service, .. } => format!("ComplexAck({})", service),
        }
    }
}

/// Results for one object of a ReadPropertyMultiple ack
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAccessResult {
    pub object: ObjectIdentifier,
    pub results: Vec<ResultElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultElement {
    pub property: PropertyIdentifier,
    pub array_index: Option<u32>,
    pub result: ReadResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Value(Any),
    AccessError { error_class: u32, error_code: u32 },
}

/// Failure reply from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePdu {
    Reject { reason: u8 },
    Abort { server: bool, reason: u8 },
    Error {
        error_class: Option<u32>,
        error_code: Option<u32>,
    },
}

impl FailurePdu {
    /// Error PDU with both class and code set
    pub fn error(class: ErrorClass, code: ErrorCode) -> Self {
        FailurePdu::Error {
            error_class: Some(class.code()),
            error_code: Some(code.code()),
        }
    }
}

/// A failure reduced to what callers act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub reason: Reason,
    pub segmentation_not_supported: bool,
    pub unknown_property: bool,
}

impl Classified {
    pub fn from_reason(reason: Reason) -> Self {
        Self {
            segmentation_not_supported: reason.is("segmentationNotSupported"),
            unknown_property: reason.is("unknownProperty"),
            reason,
        }
    }

    pub fn from_failure(failure: &FailurePdu) -> Self {
        Self::from_reason(find_reason(failure))
    }

    /// No reply at all (timeout or closed gateway)
    pub fn no_response(detail: impl Into<String>) -> Self {
        Self::from_reason(Reason::NoResponse(detail.into()))
    }
}

/// Result of one exchange
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Classified),
}

/// Result of a write that got a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Device answered with a SimpleAck
    Acknowledged,
    /// Device answered, but not with a SimpleAck
    Indeterminate,
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::Acknowledged => write!(f, "acknowledged"),
            WriteOutcome::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

fn decode_property(
    resolver: &dyn DatatypeResolver,
    object: ObjectIdentifier,
    property: PropertyIdentifier,
    array_index: Option<u32>,
    value: &Any,
    vendor_id: u16,
) -> Result<Value> {
    let datatype = resolver
        .resolve(object.object_type, property, vendor_id)
        .ok_or(Error::UnknownDatatype {
            object_type: object.object_type,
            property,
        })?;
    let target = datatype.decode_target(array_index);
    debug!("Decoding {} {} as {}", object, property, target);
    Ok(value.decode_as(target)?)
}

/// Decode a ReadProperty ack
pub fn interpret_read(
    response: &Response,
    resolver: &dyn DatatypeResolver,
    vendor_id: u16,
) -> Result<Value> {
    match response {
        Response::ReadPropertyAck {
            object,
            property,
            array_index,
            value,
        } => decode_property(resolver, *object, *property, *array_index, value, vendor_id),
        other => Err(Error::UnexpectedResponse(format!(
            "expected ReadPropertyAck, got {}",
            other.describe()
        ))),
    }
}

/// Decode a ReadPropertyMultiple ack, object by object, property by property
///
/// A property that came back as an access error is logged and recorded as
/// `None`; its neighbours are still decoded.
pub fn interpret_read_multiple(
    response: &Response,
    resolver: &dyn DatatypeResolver,
) -> Result<Vec<Option<Value>>> {
    let Response::ReadPropertyMultipleAck { results } = response else {
        return Err(Error::UnexpectedResponse(format!(
            "expected ReadPropertyMultipleAck, got {}",
            response.describe()
        )));
    };

    let mut values = Vec::new();
    for access in results {
        for element in &access.results {
            match &element.result {
                ReadResult::Value(any) => {
                    values.push(Some(decode_property(
                        resolver,
                        access.object,
                        element.property,
                        element.array_index,
                        any,
                        0,
                    )?));
                }
                ReadResult::AccessError {
                    error_class,
                    error_code,
                } => {
                    warn!(
                        "Property access error for {} {}: {} / {}",
                        access.object,
                        element.property,
                        ErrorClass::from_code(*error_class),
                        ErrorCode::from_code(*error_code)
                    );
                    values.push(None);
                }
            }
        }
    }
    Ok(values)
}

/// A WriteProperty is confirmed only by a SimpleAck
pub fn interpret_write(response: &Response) -> WriteOutcome {
    match response {
        Response::SimpleAck {
            service: ConfirmedService::WriteProperty,
        } => WriteOutcome::Acknowledged,
        _ => WriteOutcome::Indeterminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::StandardRegistry;
    use crate::types::ObjectType;

    fn analog_input(instance: u32) -> ObjectIdentifier {
        ObjectIdentifier::new(ObjectType::AnalogInput, instance)
    }

    #[test]
    fn test_interpret_read() {
        let registry = StandardRegistry::new();
        let response = Response::ReadPropertyAck {
            object: analog_input(1),
            property: PropertyIdentifier::PresentValue,
            array_index: None,
            value: Any::encode(&Value::Real(72.5)),
        };
        assert_eq!(interpret_read(&response, &registry, 0).unwrap(), Value::Real(72.5));
    }

    #[test]
    fn test_index_zero_is_array_length() {
        let registry = StandardRegistry::new();
        let response = Response::ReadPropertyAck {
            object: ObjectIdentifier::new(ObjectType::MultiStateValue, 1),
            property: PropertyIdentifier::StateText,
            array_index: Some(0),
            value: Any::encode(&Value::Unsigned(3)),
        };
        assert_eq!(interpret_read(&response, &registry, 0).unwrap(), Value::Unsigned(3));
    }

    #[test]
    fn test_unknown_datatype_is_fatal() {
        let registry = StandardRegistry::new();
        let response = Response::ReadPropertyAck {
            object: analog_input(1),
            property: PropertyIdentifier::from_code(3653),
            array_index: None,
            value: Any::encode(&Value::Boolean(true)),
        };
        assert!(matches!(
            interpret_read(&response, &registry, 0),
            Err(Error::UnknownDatatype { .. })
        ));
    }

    #[test]
    fn test_wrong_ack_type() {
        let registry = StandardRegistry::new();
        let response = Response::SimpleAck {
            service: ConfirmedService::ReadProperty,
        };
        assert!(matches!(
            interpret_read(&response, &registry, 0),
            Err(Error::UnexpectedResponse(_))
        ));
        assert!(matches!(
            interpret_read_multiple(&response, &registry),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_read_multiple_survives_access_errors() {
        let registry = StandardRegistry::new();
        let response = Response::ReadPropertyMultipleAck {
            results: vec![
                ReadAccessResult {
                    object: analog_input(1),
                    results: vec![
                        ResultElement {
                            property: PropertyIdentifier::PresentValue,
                            array_index: None,
                            result: ReadResult::Value(Any::encode(&Value::Real(72.5))),
                        },
                        ResultElement {
                            property: PropertyIdentifier::Units,
                            array_index: None,
                            result: ReadResult::AccessError {
                                error_class: ErrorClass::Property.code(),
                                error_code: ErrorCode::UnknownProperty.code(),
                            },
                        },
                    ],
                },
                ReadAccessResult {
                    object: analog_input(2),
                    results: vec![ResultElement {
                        property: PropertyIdentifier::ObjectName,
                        array_index: None,
                        result: ReadResult::Value(Any::encode(&Value::CharacterString(
                            "OAT".into(),
                        ))),
                    }],
                },
            ],
        };

        let values = interpret_read_multiple(&response, &registry).unwrap();
        assert_eq!(
            values,
            vec![
                Some(Value::Real(72.5)),
                None,
                Some(Value::CharacterString("OAT".into()))
            ]
        );
    }

    #[test]
    fn test_interpret_write() {
        assert_eq!(
            interpret_write(&Response::SimpleAck {
                service: ConfirmedService::WriteProperty
            }),
            WriteOutcome::Acknowledged
        );
        assert_eq!(
            interpret_write(&Response::ComplexAck {
                service: ConfirmedService::WriteProperty,
                payload: vec![]
            }),
            WriteOutcome::Indeterminate
        );
    }

    #[test]
    fn test_classified_flags() {
        let classified = Classified::from_failure(&FailurePdu::Abort { server: true, reason: 4 });
        assert!(classified.segmentation_not_supported);
        assert!(!classified.unknown_property);

        let classified =
            Classified::from_failure(&FailurePdu::error(ErrorClass::Property, ErrorCode::UnknownProperty));
        assert!(classified.unknown_property);
    }
}
