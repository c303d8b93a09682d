//! Request descriptors and the builder that validates commands into them

use tracing::debug;

use crate::datatype::{AtomicKind, Datatype, DatatypeResolver};
use crate::encoding::Any;
use crate::error::BuildError;
use crate::types::{
    Address, ConfirmedService, MAX_INSTANCE, ObjectIdentifier, ObjectType, PropertyIdentifier,
};
use crate::value::{self, Value};

/// ReadProperty request
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyRequest {
    pub destination: Address,
    pub object: ObjectIdentifier,
    pub property: PropertyIdentifier,
    pub array_index: Option<u32>,
}

/// One property (and optional index) inside a read access specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyReference {
    pub property: PropertyIdentifier,
    pub array_index: Option<u32>,
}

/// Properties to read from one object; never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAccessSpec {
    pub object: ObjectIdentifier,
    pub properties: Vec<PropertyReference>,
}

/// ReadPropertyMultiple request
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMultipleRequest {
    pub destination: Address,
    pub specs: Vec<ReadAccessSpec>,
}

/// WriteProperty request with the value already encoded
#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyRequest {
    pub destination: Address,
    pub object: ObjectIdentifier,
    pub property: PropertyIdentifier,
    pub array_index: Option<u32>,
    pub value: Any,
    /// Passed through as given, no range check
    pub priority: Option<u32>,
}

/// Any request the gateway can carry
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ReadProperty(ReadPropertyRequest),
    ReadPropertyMultiple(ReadPropertyMultipleRequest),
    WriteProperty(WritePropertyRequest),
}

impl Request {
    pub fn service(&self) -> ConfirmedService {
        match self {
            Request::ReadProperty(_) => ConfirmedService::ReadProperty,
            Request::ReadPropertyMultiple(_) => ConfirmedService::ReadPropertyMultiple,
            Request::WriteProperty(_) => ConfirmedService::WriteProperty,
        }
    }

    pub fn destination(&self) -> &Address {
        match self {
            Request::ReadProperty(r) => &r.destination,
            Request::ReadPropertyMultiple(r) => &r.destination,
            Request::WriteProperty(r) => &r.destination,
        }
    }
}

impl From<ReadPropertyRequest> for Request {
    fn from(r: ReadPropertyRequest) -> Self {
        Request::ReadProperty(r)
    }
}

impl From<ReadPropertyMultipleRequest> for Request {
    fn from(r: ReadPropertyMultipleRequest) -> Self {
        Request::ReadPropertyMultiple(r)
    }
}

impl From<WritePropertyRequest> for Request {
    fn from(r: WritePropertyRequest) -> Self {
        Request::WriteProperty(r)
    }
}

/// Value to write: a command token or an already-typed value
#[derive(Debug, Clone, PartialEq)]
pub enum WriteInput<'t> {
    Token(&'t str),
    Value(Value),
}

impl WriteInput<'_> {
    fn is_null(&self) -> bool {
        matches!(self, WriteInput::Token("null") | WriteInput::Value(Value::Null))
    }

    fn into_atomic(self, kind: AtomicKind) -> Result<Value, BuildError> {
        match self {
            WriteInput::Token(token) => parse_atomic(kind, token),
            WriteInput::Value(value) if kind.accepts(&value) => Ok(value),
            WriteInput::Value(_) => Err(BuildError::TypeMismatch {
                expected: Datatype::Atomic(kind).to_string(),
            }),
        }
    }

    fn into_instance(self, datatype: &Datatype) -> Result<Value, BuildError> {
        match self {
            WriteInput::Value(value) if datatype.accepts(&value) => Ok(value),
            _ => Err(BuildError::TypeMismatch {
                expected: datatype.to_string(),
            }),
        }
    }
}

/// Split a command line into tokens
pub fn tokenize(command: &str) -> Vec<&str> {
    command.split_whitespace().collect()
}

/// Parse a token as a value of a primitive kind
pub fn parse_atomic(kind: AtomicKind, token: &str) -> Result<Value, BuildError> {
    let invalid = || BuildError::InvalidValue {
        token: token.to_string(),
        expected: Datatype::Atomic(kind).to_string(),
    };

    match kind {
        AtomicKind::Null => match token {
            "null" => Ok(Value::Null),
            _ => Err(invalid()),
        },
        AtomicKind::Boolean => match token.to_ascii_lowercase().as_str() {
            "true" | "1" | "set" => Ok(Value::Boolean(true)),
            "false" | "0" | "reset" => Ok(Value::Boolean(false)),
            _ => Err(invalid()),
        },
        AtomicKind::Unsigned => token.parse().map(Value::Unsigned).map_err(|_| invalid()),
        AtomicKind::Integer => token.parse().map(Value::Signed).map_err(|_| invalid()),
        AtomicKind::Real => token.parse().map(Value::Real).map_err(|_| invalid()),
        AtomicKind::Double => token.parse().map(Value::Double).map_err(|_| invalid()),
        AtomicKind::OctetString => {
            let hex = token.strip_prefix("0x").unwrap_or(token);
            value::parse_hex(hex).map(Value::OctetString).ok_or_else(invalid)
        }
        AtomicKind::CharacterString => Ok(Value::CharacterString(token.to_string())),
        AtomicKind::BitString => token.parse().map(Value::BitString).map_err(|_| invalid()),
        AtomicKind::Enumerated(enumeration) => token
            .parse::<u32>()
            .ok()
            .or_else(|| enumeration.code_of(token))
            .map(Value::Enumerated)
            .ok_or_else(invalid),
        AtomicKind::Date => token.parse().map(Value::Date).map_err(|_| invalid()),
        AtomicKind::Time => token.parse().map(Value::Time).map_err(|_| invalid()),
        AtomicKind::ObjectIdentifier => token
            .parse()
            .map(Value::ObjectIdentifier)
            .map_err(|_| invalid()),
    }
}

fn parse_instance(token: &str) -> Result<u32, BuildError> {
    token
        .parse::<u32>()
        .ok()
        .filter(|i| *i <= MAX_INSTANCE)
        .ok_or_else(|| BuildError::InvalidInstance(token.to_string()))
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Coerce a write input to the datatype of the target property
fn coerce(
    datatype: &Datatype,
    input: WriteInput<'_>,
    array_index: Option<u32>,
) -> Result<Value, BuildError> {
    if input.is_null() {
        return Ok(Value::Null);
    }

    match datatype {
        Datatype::Atomic(kind) => input.into_atomic(*kind),
        Datatype::Array(element) if array_index.is_some() => {
            if array_index == Some(0) {
                input.into_atomic(AtomicKind::Unsigned)
            } else if let Datatype::Atomic(kind) = element.as_ref() {
                input.into_atomic(*kind)
            } else {
                input.into_instance(element)
            }
        }
        _ => input.into_instance(datatype),
    }
}

/// Turns command tokens into validated request descriptors
pub struct RequestBuilder<'a> {
    resolver: &'a dyn DatatypeResolver,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(resolver: &'a dyn DatatypeResolver) -> Self {
        Self { resolver }
    }

    fn address(&self, token: &str) -> Result<Address, BuildError> {
        let address: Address = token.parse()?;
        if !address.is_station() {
            return Err(BuildError::InvalidAddress(format!(
                "{} (confirmed requests need a station address)",
                token
            )));
        }
        Ok(address)
    }

    fn object_type(&self, token: &str) -> Result<ObjectType, BuildError> {
        if is_digits(token) {
            return token
                .parse::<u16>()
                .map(ObjectType::from_code)
                .map_err(|_| BuildError::InvalidObjectType(token.to_string()));
        }
        self.resolver
            .object_type(token)
            .ok_or_else(|| BuildError::InvalidObjectType(token.to_string()))
    }

    fn object(&self, type_token: &str, instance_token: &str) -> Result<ObjectIdentifier, BuildError> {
        let object_type = self.object_type(type_token)?;
        let instance = parse_instance(instance_token)?;
        Ok(ObjectIdentifier::new(object_type, instance))
    }

    /// Property by name or numeric code; the datatype must resolve
    fn property(
        &self,
        object_type: ObjectType,
        token: &str,
        vendor_id: u16,
    ) -> Result<(PropertyIdentifier, Datatype), BuildError> {
        let unsupported = || BuildError::UnsupportedProperty {
            object_type: object_type.to_string(),
            property: token.to_string(),
        };

        let property = if is_digits(token) {
            token
                .parse::<u32>()
                .map(PropertyIdentifier::from_code)
                .map_err(|_| unsupported())?
        } else {
            PropertyIdentifier::from_name(token).ok_or_else(unsupported)?
        };

        let datatype = self
            .resolver
            .resolve(object_type, property, vendor_id)
            .ok_or_else(unsupported)?;
        Ok((property, datatype))
    }

    fn array_index(token: &str) -> Result<u32, BuildError> {
        token
            .parse()
            .map_err(|_| BuildError::InvalidArrayIndex(token.to_string()))
    }

    /// `<address> <object-type> <instance> <property> [array-index]`
    ///
    /// A fifth token overrides `array_index`.
    pub fn build_read(
        &self,
        tokens: &[&str],
        array_index: Option<u32>,
        vendor_id: u16,
    ) -> Result<ReadPropertyRequest, BuildError> {
        let [address, object_type, instance, property, rest @ ..] = tokens else {
            return Err(BuildError::MissingArguments {
                expected: 4,
                found: tokens.len(),
            });
        };

        let destination = self.address(address)?;
        let object = self.object(object_type, instance)?;
        let (property, _) = self.property(object.object_type, property, vendor_id)?;
        let array_index = match rest.first() {
            Some(token) => Some(Self::array_index(token)?),
            None => array_index,
        };

        debug!(
            "Built ReadProperty {} {} {:?} -> {}",
            object, property, array_index, destination
        );
        Ok(ReadPropertyRequest {
            destination,
            object,
            property,
            array_index,
        })
    }

    /// `<address> ( <object-type> <instance> ( <property> [array-index] )+ )+`
    ///
    /// Properties are consumed greedily while the next token is a known
    /// property name; a purely numeric token right after a property is its
    /// array index. Wildcards (`all`, `required`, `optional`) are not
    /// validated against the registry.
    pub fn build_read_multiple(
        &self,
        tokens: &[&str],
    ) -> Result<ReadPropertyMultipleRequest, BuildError> {
        let Some((address, args)) = tokens.split_first() else {
            return Err(BuildError::MissingArguments {
                expected: 1,
                found: 0,
            });
        };
        let destination = self.address(address)?;

        let mut specs = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let object_type = args[i];
            let instance = args.get(i + 1).ok_or(BuildError::MissingArguments {
                expected: tokens.len() + 1,
                found: tokens.len(),
            })?;
            let object = self.object(object_type, instance)?;
            i += 2;

            let mut properties = Vec::new();
            while let Some(token) = args.get(i) {
                let Some(property) = PropertyIdentifier::from_name(token) else {
                    break;
                };
                i += 1;

                if !property.is_wildcard() {
                    self.property(object.object_type, token, 0)?;
                }

                let mut reference = PropertyReference {
                    property,
                    array_index: None,
                };
                if let Some(index) = args.get(i).filter(|t| is_digits(t)) {
                    reference.array_index = Some(Self::array_index(index)?);
                    i += 1;
                }
                properties.push(reference);
            }

            if properties.is_empty() {
                return Err(BuildError::MissingPropertyList(object));
            }
            specs.push(ReadAccessSpec { object, properties });
        }

        if specs.is_empty() {
            return Err(BuildError::MissingReadSpec);
        }

        debug!(
            "Built ReadPropertyMultiple with {} spec(s) -> {}",
            specs.len(),
            destination
        );
        Ok(ReadPropertyMultipleRequest { destination, specs })
    }

    /// `<address> <object-type> <instance> <property> <value> [array-index|-] [priority]`
    pub fn build_write(
        &self,
        tokens: &[&str],
        vendor_id: u16,
    ) -> Result<WritePropertyRequest, BuildError> {
        let [address, object_type, instance, property, value, rest @ ..] = tokens else {
            return Err(BuildError::MissingArguments {
                expected: 5,
                found: tokens.len(),
            });
        };

        let array_index = match rest.first() {
            Some(&"-") | None => None,
            Some(token) => Some(Self::array_index(token)?),
        };
        let priority = rest
            .get(1)
            .map(|token| {
                token
                    .parse::<u32>()
                    .map_err(|_| BuildError::InvalidPriority(token.to_string()))
            })
            .transpose()?;

        self.build_write_value(
            &[*address, *object_type, *instance, *property],
            WriteInput::Token(*value),
            array_index,
            priority,
            vendor_id,
        )
    }

    /// Write request for `<address> <object-type> <instance> <property>`
    /// with the value supplied separately
    pub fn build_write_value(
        &self,
        target: &[&str],
        input: WriteInput<'_>,
        array_index: Option<u32>,
        priority: Option<u32>,
        vendor_id: u16,
    ) -> Result<WritePropertyRequest, BuildError> {
        let [address, object_type, instance, property] = target else {
            return Err(BuildError::MissingArguments {
                expected: 4,
                found: target.len(),
            });
        };

        let destination = self.address(address)?;
        let object = self.object(object_type, instance)?;
        let (property, datatype) = self.property(object.object_type, property, vendor_id)?;
        let value = coerce(&datatype, input, array_index)?;

        debug!(
            "Built WriteProperty {} {} = {} (index {:?}, priority {:?}) -> {}",
            object, property, value, array_index, priority, destination
        );
        Ok(WritePropertyRequest {
            destination,
            object,
            property,
            array_index,
            value: Any::encode(&value),
            priority,
        })
    }
}
