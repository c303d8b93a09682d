//! Property datatypes and the registry that resolves them

use std::fmt;

use dashmap::DashMap;
use tracing::debug;

use crate::encoding::tag;
use crate::types::{ObjectType, PropertyIdentifier};
use crate::value::Value;

/// Name table of an enumerated datatype
#[derive(Debug, PartialEq, Eq)]
pub struct Enumeration {
    pub name: &'static str,
    pub members: &'static [(&'static str, u32)],
}

impl Enumeration {
    /// Code for a member name
    pub fn code_of(&self, name: &str) -> Option<u32> {
        self.members
            .iter()
            .find(|(member, _)| *member == name)
            .map(|(_, code)| *code)
    }

    /// Member name for a code
    pub fn name_of(&self, code: u32) -> Option<&'static str> {
        self.members
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(member, _)| *member)
    }
}

/// Enumerated property without a name table, numeric tokens only
pub static GENERIC: Enumeration = Enumeration {
    name: "Enumerated",
    members: &[],
};

pub static BINARY_PV: Enumeration = Enumeration {
    name: "BinaryPV",
    members: &[("inactive", 0), ("active", 1)],
};

pub static POLARITY: Enumeration = Enumeration {
    name: "Polarity",
    members: &[("normal", 0), ("reverse", 1)],
};

pub static EVENT_STATE: Enumeration = Enumeration {
    name: "EventState",
    members: &[
        ("normal", 0),
        ("fault", 1),
        ("offnormal", 2),
        ("highLimit", 3),
        ("lowLimit", 4),
        ("lifeSafetyAlarm", 5),
    ],
};

pub static RELIABILITY: Enumeration = Enumeration {
    name: "Reliability",
    members: &[
        ("noFaultDetected", 0),
        ("noSensor", 1),
        ("overRange", 2),
        ("underRange", 3),
        ("openLoop", 4),
        ("shortedLoop", 5),
        ("noOutput", 6),
        ("unreliableOther", 7),
        ("processError", 8),
        ("multiStateFault", 9),
        ("configurationError", 10),
        ("communicationFailure", 12),
    ],
};

pub static DEVICE_STATUS: Enumeration = Enumeration {
    name: "DeviceStatus",
    members: &[
        ("operational", 0),
        ("operationalReadOnly", 1),
        ("downloadRequired", 2),
        ("downloadInProgress", 3),
        ("nonOperational", 4),
        ("backupInProgress", 5),
    ],
};

pub static SEGMENTATION: Enumeration = Enumeration {
    name: "Segmentation",
    members: &[
        ("segmentedBoth", 0),
        ("segmentedTransmit", 1),
        ("segmentedReceive", 2),
        ("noSegmentation", 3),
    ],
};

pub static UNITS: Enumeration = Enumeration {
    name: "EngineeringUnits",
    members: &[
        ("amperes", 3),
        ("volts", 5),
        ("hertz", 27),
        ("kilowatts", 48),
        ("degreesCelsius", 62),
        ("degreesFahrenheit", 64),
        ("noUnits", 95),
        ("percent", 98),
        ("percentRelativeHumidity", 29),
        ("pascals", 53),
        ("cubicFeetPerMinute", 84),
        ("litersPerSecond", 87),
        ("seconds", 73),
        ("minutes", 72),
        ("hours", 71),
    ],
};

pub static FILE_ACCESS_METHOD: Enumeration = Enumeration {
    name: "FileAccessMethod",
    members: &[("recordAccess", 0), ("streamAccess", 1)],
};

/// Primitive datatypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicKind {
    Null,
    Boolean,
    Unsigned,
    Integer,
    Real,
    Double,
    OctetString,
    CharacterString,
    BitString,
    Enumerated(&'static Enumeration),
    Date,
    Time,
    ObjectIdentifier,
}

impl AtomicKind {
    pub fn name(self) -> &'static str {
        match self {
            AtomicKind::Null => "Null",
            AtomicKind::Boolean => "Boolean",
            AtomicKind::Unsigned => "Unsigned",
            AtomicKind::Integer => "Integer",
            AtomicKind::Real => "Real",
            AtomicKind::Double => "Double",
            AtomicKind::OctetString => "OctetString",
            AtomicKind::CharacterString => "CharacterString",
            AtomicKind::BitString => "BitString",
            AtomicKind::Enumerated(_) => "Enumerated",
            AtomicKind::Date => "Date",
            AtomicKind::Time => "Time",
            AtomicKind::ObjectIdentifier => "ObjectIdentifier",
        }
    }

    /// Application tag number the kind is encoded with
    pub fn application_tag(self) -> u8 {
        match self {
            AtomicKind::Null => tag::NULL,
            AtomicKind::Boolean => tag::BOOLEAN,
            AtomicKind::Unsigned => tag::UNSIGNED,
            AtomicKind::Integer => tag::SIGNED,
            AtomicKind::Real => tag::REAL,
            AtomicKind::Double => tag::DOUBLE,
            AtomicKind::OctetString => tag::OCTET_STRING,
            AtomicKind::CharacterString => tag::CHARACTER_STRING,
            AtomicKind::BitString => tag::BIT_STRING,
            AtomicKind::Enumerated(_) => tag::ENUMERATED,
            AtomicKind::Date => tag::DATE,
            AtomicKind::Time => tag::TIME,
            AtomicKind::ObjectIdentifier => tag::OBJECT_IDENTIFIER,
        }
    }

    /// Whether `value` is an instance of this kind
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (AtomicKind::Null, Value::Null)
                | (AtomicKind::Boolean, Value::Boolean(_))
                | (AtomicKind::Unsigned, Value::Unsigned(_))
                | (AtomicKind::Integer, Value::Signed(_))
                | (AtomicKind::Real, Value::Real(_))
                | (AtomicKind::Double, Value::Double(_))
                | (AtomicKind::OctetString, Value::OctetString(_))
                | (AtomicKind::CharacterString, Value::CharacterString(_))
                | (AtomicKind::BitString, Value::BitString(_))
                | (AtomicKind::Enumerated(_), Value::Enumerated(_))
                | (AtomicKind::Date, Value::Date(_))
                | (AtomicKind::Time, Value::Time(_))
                | (AtomicKind::ObjectIdentifier, Value::ObjectIdentifier(_))
        )
    }
}

/// Datatype of a property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Atomic(AtomicKind),
    /// Indexable array; index 0 holds the length
    Array(Box<Datatype>),
    /// Unindexed list
    List(Box<Datatype>),
    /// Constructed value, kept as its sequence of tagged items
    Composite(&'static str),
}

static ARRAY_LENGTH: Datatype = Datatype::Atomic(AtomicKind::Unsigned);

impl Datatype {
    pub fn array_of(element: Datatype) -> Self {
        Datatype::Array(Box::new(element))
    }

    pub fn list_of(element: Datatype) -> Self {
        Datatype::List(Box::new(element))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Datatype::Array(_))
    }

    /// Datatype to decode a value read with `index`
    ///
    /// For arrays, index 0 is always the Unsigned length and any other index
    /// is one element. Everything else decodes as the datatype itself.
    pub fn decode_target(&self, index: Option<u32>) -> &Datatype {
        match (self, index) {
            (Datatype::Array(_), Some(0)) => &ARRAY_LENGTH,
            (Datatype::Array(element), Some(_)) => element,
            _ => self,
        }
    }

    /// Whether `value` is already an instance of this datatype
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Datatype::Atomic(kind), value) => kind.accepts(value),
            (Datatype::Array(element) | Datatype::List(element), Value::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (Datatype::Composite(_), Value::Sequence(_) | Value::Constructed { .. }) => true,
            (Datatype::Composite(_), Value::Context { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Atomic(AtomicKind::Enumerated(e)) => f.write_str(e.name),
            Datatype::Atomic(kind) => f.write_str(kind.name()),
            Datatype::Array(element) => write!(f, "ArrayOf({})", element),
            Datatype::List(element) => write!(f, "ListOf({})", element),
            Datatype::Composite(name) => f.write_str(name),
        }
    }
}

/// Resolves the datatype of an object/property pair
pub trait DatatypeResolver: Send + Sync {
    /// Datatype of `property` on objects of `object_type`, if known.
    /// `vendor_id` selects vendor-specific extensions.
    fn resolve(
        &self,
        object_type: ObjectType,
        property: PropertyIdentifier,
        vendor_id: u16,
    ) -> Option<Datatype>;

    /// Object type named `name`, if this resolver knows it
    fn object_type(&self, name: &str) -> Option<ObjectType> {
        ObjectType::from_name(name)
    }

    /// Whether `name` is a resolvable object type name
    fn known_object_type(&self, name: &str) -> bool {
        self.object_type(name).is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Standard registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of the standard object types plus registered vendor properties
#[derive(Debug, Default)]
pub struct StandardRegistry {
    vendor: DashMap<(u16, ObjectType, PropertyIdentifier), Datatype>,
    object_types: DashMap<String, ObjectType>,
}

impl StandardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vendor-specific property
    ///
    /// Vendor entries take precedence over the standard table for requests
    /// made with that vendor id.
    pub fn register_vendor_property(
        &self,
        vendor_id: u16,
        object_type: ObjectType,
        property: PropertyIdentifier,
        datatype: Datatype,
    ) {
        debug!(
            "Registered vendor {} property {} on {} as {}",
            vendor_id, property, object_type, datatype
        );
        self.vendor.insert((vendor_id, object_type, property), datatype);
    }

    /// Register a name for a proprietary object type
    pub fn register_vendor_object_type(&self, name: &str, code: u16) {
        let object_type = ObjectType::from_code(code);
        debug!("Registered object type {} as {}", name, object_type);
        self.object_types.insert(name.to_string(), object_type);
    }

    /// Standard datatype, ignoring vendor extensions
    pub fn standard(object_type: ObjectType, property: PropertyIdentifier) -> Option<Datatype> {
        use AtomicKind as A;
        use ObjectType as O;
        use PropertyIdentifier as P;

        let atomic = Datatype::Atomic;
        let enumerated = |e: &'static Enumeration| Datatype::Atomic(A::Enumerated(e));

        if let O::Unlisted(_) = object_type {
            return None;
        }

        // properties every standard object carries
        let common = match property {
            P::ObjectIdentifier => Some(atomic(A::ObjectIdentifier)),
            P::ObjectName | P::Description | P::ProfileName => Some(atomic(A::CharacterString)),
            P::ObjectType => Some(enumerated(&GENERIC)),
            P::PropertyList => Some(Datatype::array_of(enumerated(&GENERIC))),
            _ => None,
        };
        if common.is_some() {
            return common;
        }

        let analog = matches!(object_type, O::AnalogInput | O::AnalogOutput | O::AnalogValue);
        let binary = matches!(object_type, O::BinaryInput | O::BinaryOutput | O::BinaryValue);
        let multistate = matches!(
            object_type,
            O::MultiStateInput | O::MultiStateOutput | O::MultiStateValue
        );
        let commandable = matches!(
            object_type,
            O::AnalogOutput
                | O::AnalogValue
                | O::BinaryOutput
                | O::BinaryValue
                | O::MultiStateOutput
                | O::MultiStateValue
        );

        if analog || binary || multistate {
            let present = if analog {
                atomic(A::Real)
            } else if binary {
                enumerated(&BINARY_PV)
            } else {
                atomic(A::Unsigned)
            };

            let datatype = match property {
                P::PresentValue => present,
                P::RelinquishDefault if commandable => present,
                P::PriorityArray if commandable => {
                    Datatype::array_of(Datatype::Composite("BACnetPriorityValue"))
                }
                P::StatusFlags => atomic(A::BitString),
                P::EventState => enumerated(&EVENT_STATE),
                P::Reliability => enumerated(&RELIABILITY),
                P::OutOfService => atomic(A::Boolean),
                P::NotificationClass => atomic(A::Unsigned),
                P::EventEnable | P::AckedTransitions => atomic(A::BitString),
                P::EventTimeStamps => Datatype::array_of(Datatype::Composite("BACnetTimeStamp")),
                P::Units if analog => enumerated(&UNITS),
                P::CovIncrement | P::MinPresValue | P::MaxPresValue | P::Resolution if analog => {
                    atomic(A::Real)
                }
                P::Polarity if matches!(object_type, O::BinaryInput | O::BinaryOutput) => {
                    enumerated(&POLARITY)
                }
                P::ActiveText | P::InactiveText if binary => atomic(A::CharacterString),
                P::NumberOfStates if multistate => atomic(A::Unsigned),
                P::StateText if multistate => Datatype::array_of(atomic(A::CharacterString)),
                _ => return None,
            };
            return Some(datatype);
        }

        let datatype = match (object_type, property) {
            (O::Device, P::SystemStatus) => enumerated(&DEVICE_STATUS),
            (
                O::Device,
                P::VendorName
                | P::ModelName
                | P::FirmwareRevision
                | P::ApplicationSoftwareVersion
                | P::Location,
            ) => atomic(A::CharacterString),
            (
                O::Device,
                P::VendorIdentifier
                | P::ProtocolVersion
                | P::ProtocolRevision
                | P::MaxApduLengthAccepted
                | P::ApduTimeout
                | P::NumberOfApduRetries
                | P::DatabaseRevision,
            ) => atomic(A::Unsigned),
            (O::Device, P::ProtocolServicesSupported | P::ProtocolObjectTypesSupported) => {
                atomic(A::BitString)
            }
            (O::Device, P::ObjectList | P::StructuredObjectList) => {
                Datatype::array_of(atomic(A::ObjectIdentifier))
            }
            (O::Device, P::SegmentationSupported) => enumerated(&SEGMENTATION),
            (O::Device, P::DeviceAddressBinding) => {
                Datatype::list_of(Datatype::Composite("BACnetAddressBinding"))
            }
            (O::Device, P::LocalDate) => atomic(A::Date),
            (O::Device, P::LocalTime) => atomic(A::Time),
            (O::Device, P::UtcOffset) => atomic(A::Integer),
            (O::Device, P::DaylightSavingsStatus) => atomic(A::Boolean),

            (O::Schedule, P::PresentValue | P::ScheduleDefault) => Datatype::Composite("Any"),
            (O::Schedule, P::EffectivePeriod) => Datatype::Composite("BACnetDateRange"),
            (O::Schedule, P::WeeklySchedule) => {
                Datatype::array_of(Datatype::Composite("BACnetDailySchedule"))
            }
            (O::Schedule, P::ExceptionSchedule) => {
                Datatype::array_of(Datatype::Composite("BACnetSpecialEvent"))
            }
            (O::Schedule, P::ListOfObjectPropertyReferences) => Datatype::list_of(
                Datatype::Composite("BACnetDeviceObjectPropertyReference"),
            ),
            (O::Schedule, P::PriorityForWriting) => atomic(A::Unsigned),
            (O::Schedule, P::StatusFlags) => atomic(A::BitString),
            (O::Schedule, P::Reliability) => enumerated(&RELIABILITY),
            (O::Schedule, P::OutOfService) => atomic(A::Boolean),

            (O::Calendar, P::PresentValue) => atomic(A::Boolean),
            (O::Calendar, P::DateList) => {
                Datatype::list_of(Datatype::Composite("BACnetCalendarEntry"))
            }

            (O::NotificationClass, P::NotificationClass) => atomic(A::Unsigned),
            (O::NotificationClass, P::Priority) => Datatype::array_of(atomic(A::Unsigned)),
            (O::NotificationClass, P::AckRequired) => atomic(A::BitString),
            (O::NotificationClass, P::RecipientList) => {
                Datatype::list_of(Datatype::Composite("BACnetDestination"))
            }

            (O::TrendLog, P::LogEnable | P::StopWhenFull) => atomic(A::Boolean),
            (
                O::TrendLog,
                P::LogInterval | P::BufferSize | P::RecordCount | P::TotalRecordCount,
            ) => atomic(A::Unsigned),
            (O::TrendLog, P::StatusFlags) => atomic(A::BitString),
            (O::TrendLog, P::EventState) => enumerated(&EVENT_STATE),

            (O::File, P::FileType) => atomic(A::CharacterString),
            (O::File, P::FileSize) => atomic(A::Unsigned),
            (O::File, P::ModificationDate) => Datatype::Composite("BACnetDateTime"),
            (O::File, P::Archive | P::ReadOnly) => atomic(A::Boolean),
            (O::File, P::FileAccessMethod) => enumerated(&FILE_ACCESS_METHOD),
            (O::File, P::StatusFlags) => atomic(A::BitString),

            _ => return None,
        };
        Some(datatype)
    }
}

impl DatatypeResolver for StandardRegistry {
    fn resolve(
        &self,
        object_type: ObjectType,
        property: PropertyIdentifier,
        vendor_id: u16,
    ) -> Option<Datatype> {
        if let Some(datatype) = self.vendor.get(&(vendor_id, object_type, property)) {
            return Some(datatype.clone());
        }
        Self::standard(object_type, property)
    }

    fn object_type(&self, name: &str) -> Option<ObjectType> {
        ObjectType::from_name(name).or_else(|| self.object_types.get(name).map(|entry| *entry))
    }
}
