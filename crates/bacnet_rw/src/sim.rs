//! Simulated BACnet device
//!
//! Answers ReadProperty, ReadPropertyMultiple and WriteProperty from an
//! in-memory object table. Devices are described in TOML:
//!
//! ```toml
//! [device]
//! instance = 1234
//! vendor_id = 5
//! segmentation = false
//! max_elements = 2
//!
//! [[objects]]
//! object = "analogInput:1"
//! read_only = ["presentValue"]
//! properties = { presentValue = 72.5, units = "degreesFahrenheit" }
//! errors = { description = "unknownProperty" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info};

use crate::datatype::{Datatype, DatatypeResolver};
use crate::dispatch::Responder;
use crate::encoding::Any;
use crate::error::BuildError;
use crate::gateway::Completion;
use crate::reason::{AbortReason, ErrorClass, ErrorCode, RejectReason};
use crate::request::{
    ReadPropertyMultipleRequest, ReadPropertyRequest, Request, WritePropertyRequest, parse_atomic,
};
use crate::response::{FailurePdu, ReadAccessResult, ReadResult, Response, ResultElement};
use crate::types::{ConfirmedService, ObjectIdentifier, ObjectType, PropertyIdentifier};
use crate::value::Value;

/// Longest array a write to index 0 may resize to
pub const MAX_ARRAY_LENGTH: usize = 4096;

// ─────────────────────────────────────────────────────────────────────────────
// Device file
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for loading a device description
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Invalid object: {0}")]
    InvalidObject(#[from] BuildError),

    #[error("Invalid property {property} on {object}: {reason}")]
    InvalidProperty {
        object: ObjectIdentifier,
        property: String,
        reason: String,
    },

    #[error("Unknown error code: {0}")]
    UnknownErrorCode(String),
}

/// Device description file
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceFile {
    pub device: DeviceSection,
    #[serde(default)]
    pub objects: Vec<ObjectSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    pub instance: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vendor_id: u16,
    /// Whether replies may be segmented
    #[serde(default = "default_true")]
    pub segmentation: bool,
    /// Largest number of elements an unsegmented reply can carry
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    /// Answer writes with a SimpleAck
    #[serde(default = "default_true")]
    pub acknowledge_writes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectSection {
    /// `type:instance`, e.g. `analogInput:1`
    pub object: String,
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,
    /// Property name to error code name
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
    #[serde(default)]
    pub read_only: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_elements() -> usize {
    16
}

fn parse_property(name: &str) -> Option<PropertyIdentifier> {
    name.parse::<u32>()
        .ok()
        .map(PropertyIdentifier::from_code)
        .or_else(|| PropertyIdentifier::from_name(name))
}

fn scalar_token(value: &toml::Value) -> Result<String, String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        other => Err(format!("expected a single value, got {}", other.type_str())),
    }
}

fn toml_to_value(datatype: &Datatype, value: &toml::Value) -> Result<Value, String> {
    match datatype {
        Datatype::Atomic(kind) => {
            let token = scalar_token(value)?;
            parse_atomic(*kind, &token).map_err(|e| e.to_string())
        }
        Datatype::Array(element) | Datatype::List(element) => match value {
            toml::Value::Array(items) => items
                .iter()
                .map(|item| toml_to_value(element, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(format!("expected an array, got {}", other.type_str())),
        },
        Datatype::Composite(name) => Err(format!("{} values are not supported in device files", name)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulated device
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct SimObject {
    properties: BTreeMap<PropertyIdentifier, Value>,
    errors: BTreeMap<PropertyIdentifier, ErrorCode>,
    read_only: BTreeSet<PropertyIdentifier>,
}

/// In-memory device that answers confirmed requests
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    device: ObjectIdentifier,
    segmentation: bool,
    max_elements: usize,
    acknowledge_writes: bool,
    objects: BTreeMap<ObjectIdentifier, SimObject>,
}

impl SimulatedDevice {
    /// Device object `device:<instance>` with segmentation enabled
    pub fn new(instance: u32) -> Self {
        let device = ObjectIdentifier::new(ObjectType::Device, instance);
        let mut sim = Self {
            device,
            segmentation: true,
            max_elements: default_max_elements(),
            acknowledge_writes: true,
            objects: BTreeMap::new(),
        };
        sim.object_mut(device);
        sim.set(device, PropertyIdentifier::VendorIdentifier, Value::Unsigned(0));
        sim.set(device, PropertyIdentifier::SegmentationSupported, Value::Enumerated(0));
        sim
    }

    /// Object entry, created with its identifying properties on first use
    fn object_mut(&mut self, object: ObjectIdentifier) -> &mut SimObject {
        self.objects.entry(object).or_insert_with(|| {
            let mut entry = SimObject::default();
            entry
                .properties
                .insert(PropertyIdentifier::ObjectIdentifier, Value::ObjectIdentifier(object));
            entry.properties.insert(
                PropertyIdentifier::ObjectType,
                Value::Enumerated(u32::from(object.object_type.code())),
            );
            entry.properties.insert(
                PropertyIdentifier::ObjectName,
                Value::CharacterString(object.to_string()),
            );
            entry
                .read_only
                .extend([PropertyIdentifier::ObjectIdentifier, PropertyIdentifier::ObjectType]);
            entry
        })
    }

    fn set(&mut self, object: ObjectIdentifier, property: PropertyIdentifier, value: Value) {
        self.object_mut(object).properties.insert(property, value);
    }

    pub fn device(&self) -> ObjectIdentifier {
        self.device
    }

    pub fn with_vendor_id(mut self, vendor_id: u16) -> Self {
        self.set(
            self.device,
            PropertyIdentifier::VendorIdentifier,
            Value::Unsigned(u64::from(vendor_id)),
        );
        self
    }

    pub fn with_property(
        mut self,
        object: ObjectIdentifier,
        property: PropertyIdentifier,
        value: Value,
    ) -> Self {
        self.set(object, property, value);
        self
    }

    /// Reads and writes of `property` fail with `code`
    pub fn with_error(
        mut self,
        object: ObjectIdentifier,
        property: PropertyIdentifier,
        code: ErrorCode,
    ) -> Self {
        self.object_mut(object).errors.insert(property, code);
        self
    }

    pub fn with_read_only(mut self, object: ObjectIdentifier, property: PropertyIdentifier) -> Self {
        self.object_mut(object).read_only.insert(property);
        self
    }

    /// Abort replies with more than `max_elements` elements
    pub fn without_segmentation(mut self, max_elements: usize) -> Self {
        self.segmentation = false;
        self.max_elements = max_elements;
        self.set(
            self.device,
            PropertyIdentifier::SegmentationSupported,
            Value::Enumerated(3),
        );
        self
    }

    /// Whether writes are answered with a SimpleAck
    pub fn acknowledge_writes(mut self, acknowledge: bool) -> Self {
        self.acknowledge_writes = acknowledge;
        self
    }

    /// Current value of a property
    pub fn value(&self, object: ObjectIdentifier, property: PropertyIdentifier) -> Option<Value> {
        if object == self.device && property == PropertyIdentifier::ObjectList {
            return Some(self.object_list());
        }
        self.objects.get(&object)?.properties.get(&property).cloned()
    }

    fn object_list(&self) -> Value {
        Value::List(
            self.objects
                .keys()
                .map(|oid| Value::ObjectIdentifier(*oid))
                .collect(),
        )
    }

    /// Build from a parsed device file, typing property values with `resolver`
    pub fn from_file(file: DeviceFile, resolver: &dyn DatatypeResolver) -> Result<Self, SimError> {
        let vendor_id = file.device.vendor_id;
        let mut sim = Self::new(file.device.instance).with_vendor_id(vendor_id);
        if !file.device.segmentation {
            sim = sim.without_segmentation(file.device.max_elements);
        }
        sim.max_elements = file.device.max_elements;
        sim.acknowledge_writes = file.device.acknowledge_writes;
        if let Some(name) = file.device.name {
            let device = sim.device;
            sim.set(device, PropertyIdentifier::ObjectName, Value::CharacterString(name));
        }

        for section in file.objects {
            let object: ObjectIdentifier = section.object.parse()?;
            sim.object_mut(object);

            let invalid = |property: &str, reason: String| SimError::InvalidProperty {
                object,
                property: property.to_string(),
                reason,
            };

            for (name, raw) in &section.properties {
                let property =
                    parse_property(name).ok_or_else(|| invalid(name, "unknown property".into()))?;
                let datatype = resolver
                    .resolve(object.object_type, property, vendor_id)
                    .ok_or_else(|| invalid(name, "no datatype for this object type".into()))?;
                let value = toml_to_value(&datatype, raw).map_err(|reason| invalid(name, reason))?;
                sim.set(object, property, value);
            }

            for (name, code) in &section.errors {
                let property =
                    parse_property(name).ok_or_else(|| invalid(name, "unknown property".into()))?;
                let code = ErrorCode::from_name(code)
                    .ok_or_else(|| SimError::UnknownErrorCode(code.clone()))?;
                sim.object_mut(object).errors.insert(property, code);
            }

            for name in &section.read_only {
                let property =
                    parse_property(name).ok_or_else(|| invalid(name, "unknown property".into()))?;
                sim.object_mut(object).read_only.insert(property);
            }
        }

        info!(
            "Simulated device {} with {} objects (segmentation: {})",
            sim.device,
            sim.objects.len(),
            sim.segmentation
        );
        Ok(sim)
    }

    /// Parse a device description
    pub fn from_toml_str(content: &str, resolver: &dyn DatatypeResolver) -> Result<Self, SimError> {
        let file: DeviceFile = toml::from_str(content)?;
        Self::from_file(file, resolver)
    }

    /// Load a device description file
    pub async fn load(
        path: impl AsRef<Path>,
        resolver: &dyn DatatypeResolver,
    ) -> Result<Self, SimError> {
        let path = path.as_ref();
        debug!("Loading simulated device from: {}", path.display());
        let content = fs::read_to_string(path).await?;
        Self::from_toml_str(&content, resolver)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Service handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn read_value(
        &self,
        object: ObjectIdentifier,
        property: PropertyIdentifier,
        array_index: Option<u32>,
    ) -> Result<Value, ErrorCode> {
        let entry = self.objects.get(&object).ok_or(ErrorCode::UnknownObject)?;
        if let Some(code) = entry.errors.get(&property) {
            return Err(*code);
        }
        let value = self.value(object, property).ok_or(ErrorCode::UnknownProperty)?;

        match (array_index, value) {
            (None, value) => Ok(value),
            (Some(0), Value::List(items)) => Ok(Value::Unsigned(items.len() as u64)),
            (Some(index), Value::List(items)) => items
                .get(index as usize - 1)
                .cloned()
                .ok_or(ErrorCode::InvalidArrayIndex),
            (Some(_), _) => Err(ErrorCode::PropertyIsNotAnArray),
        }
    }

    /// Properties a wildcard selects on `object`
    fn expand(&self, object: ObjectIdentifier, wildcard: PropertyIdentifier) -> Vec<PropertyIdentifier> {
        const REQUIRED: [PropertyIdentifier; 3] = [
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
        ];

        let mut all: Vec<PropertyIdentifier> = self
            .objects
            .get(&object)
            .map(|entry| entry.properties.keys().copied().collect())
            .unwrap_or_default();
        if object == self.device {
            all.push(PropertyIdentifier::ObjectList);
        }

        match wildcard {
            PropertyIdentifier::Required => all.into_iter().filter(|p| REQUIRED.contains(p)).collect(),
            PropertyIdentifier::Optional => all.into_iter().filter(|p| !REQUIRED.contains(p)).collect(),
            _ => all,
        }
    }

    fn element_count(value: &Value) -> usize {
        match value {
            Value::List(items) => items.len(),
            _ => 1,
        }
    }

    fn too_large(&self, elements: usize) -> bool {
        !self.segmentation && elements > self.max_elements
    }

    fn segmentation_abort() -> Completion {
        Completion::Failure(FailurePdu::Abort {
            server: true,
            reason: AbortReason::SegmentationNotSupported.code(),
        })
    }

    fn error_class(code: ErrorCode) -> ErrorClass {
        match code {
            ErrorCode::UnknownObject => ErrorClass::Object,
            _ => ErrorClass::Property,
        }
    }

    fn error_pdu(code: ErrorCode) -> FailurePdu {
        FailurePdu::error(Self::error_class(code), code)
    }

    fn read_property(&self, request: &ReadPropertyRequest) -> Completion {
        match self.read_value(request.object, request.property, request.array_index) {
            Ok(value) if self.too_large(Self::element_count(&value)) => Self::segmentation_abort(),
            Ok(value) => Completion::Success(Response::ReadPropertyAck {
                object: request.object,
                property: request.property,
                array_index: request.array_index,
                value: Any::encode(&value),
            }),
            Err(code) => Completion::Failure(Self::error_pdu(code)),
        }
    }

    fn read_property_multiple(&self, request: &ReadPropertyMultipleRequest) -> Completion {
        let mut elements = 0;
        let mut results = Vec::with_capacity(request.specs.len());

        for spec in &request.specs {
            let mut access = ReadAccessResult {
                object: spec.object,
                results: Vec::new(),
            };

            for reference in &spec.properties {
                let known = self.objects.contains_key(&spec.object);
                let expanded = if reference.property.is_wildcard() && known {
                    self.expand(spec.object, reference.property)
                        .into_iter()
                        .map(|property| (property, None))
                        .collect()
                } else {
                    vec![(reference.property, reference.array_index)]
                };

                for (property, array_index) in expanded {
                    let result = match self.read_value(spec.object, property, array_index) {
                        Ok(value) => {
                            elements += Self::element_count(&value);
                            ReadResult::Value(Any::encode(&value))
                        }
                        Err(code) => ReadResult::AccessError {
                            error_class: Self::error_class(code).code(),
                            error_code: code.code(),
                        },
                    };
                    access.results.push(ResultElement {
                        property,
                        array_index,
                        result,
                    });
                }
            }
            results.push(access);
        }

        if self.too_large(elements) {
            return Self::segmentation_abort();
        }
        Completion::Success(Response::ReadPropertyMultipleAck { results })
    }

    fn write_property(&mut self, request: &WritePropertyRequest) -> Completion {
        let Some(entry) = self.objects.get(&request.object) else {
            return Completion::Failure(Self::error_pdu(ErrorCode::UnknownObject));
        };
        if let Some(code) = entry.errors.get(&request.property) {
            return Completion::Failure(Self::error_pdu(*code));
        }
        let object_list =
            request.object == self.device && request.property == PropertyIdentifier::ObjectList;
        if object_list || entry.read_only.contains(&request.property) {
            return Completion::Failure(Self::error_pdu(ErrorCode::WriteAccessDenied));
        }

        let mut items = match request.value.decode_items() {
            Ok(items) => items,
            Err(e) => {
                debug!("Rejecting undecodable write: {}", e);
                return Completion::Failure(FailurePdu::Reject {
                    reason: RejectReason::InvalidTag.code(),
                });
            }
        };
        let current = entry.properties.get(&request.property).cloned();

        let updated = match (request.array_index, current) {
            (None, Some(Value::List(_))) => Value::List(items),
            (None, _) if items.len() == 1 => items.remove(0),
            (None, _) => Value::List(items),
            (Some(0), Some(Value::List(mut list))) => match items.as_slice() {
                [Value::Unsigned(len)] => match usize::try_from(*len) {
                    Ok(len) if len <= MAX_ARRAY_LENGTH => {
                        list.resize(len, Value::Null);
                        Value::List(list)
                    }
                    _ => {
                        debug!("Refusing to resize {} to {} elements", request.property, len);
                        return Completion::Failure(Self::error_pdu(ErrorCode::NoSpaceToWriteProperty));
                    }
                },
                _ => return Completion::Failure(Self::error_pdu(ErrorCode::InvalidDataType)),
            },
            (Some(index), Some(Value::List(mut list))) => {
                let slot = (index as usize)
                    .checked_sub(1)
                    .and_then(|i| list.get_mut(i));
                match (slot, items.len()) {
                    (Some(slot), 1) => *slot = items.remove(0),
                    (None, _) => return Completion::Failure(Self::error_pdu(ErrorCode::InvalidArrayIndex)),
                    (Some(_), _) => return Completion::Failure(Self::error_pdu(ErrorCode::InvalidDataType)),
                }
                Value::List(list)
            }
            (Some(_), None) => return Completion::Failure(Self::error_pdu(ErrorCode::UnknownProperty)),
            (Some(_), Some(_)) => {
                return Completion::Failure(Self::error_pdu(ErrorCode::PropertyIsNotAnArray));
            }
        };

        debug!(
            "{} {} <- {} (priority {:?})",
            request.object, request.property, updated, request.priority
        );
        self.set(request.object, request.property, updated);

        if self.acknowledge_writes {
            Completion::Success(Response::SimpleAck {
                service: ConfirmedService::WriteProperty,
            })
        } else {
            Completion::Success(Response::ComplexAck {
                service: ConfirmedService::WriteProperty,
                payload: Vec::new(),
            })
        }
    }
}

impl Responder for SimulatedDevice {
    fn respond(&mut self, request: &Request) -> Completion {
        match request {
            Request::ReadProperty(r) => self.read_property(r),
            Request::ReadPropertyMultiple(r) => self.read_property_multiple(r),
            Request::WriteProperty(r) => self.write_property(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::datatype::{AtomicKind, StandardRegistry};
    use crate::dispatch::{DispatchLoop, GatewayConfig};
    use crate::error::Error;
    use crate::response::WriteOutcome;
    use crate::session::Session;

    const DEVICE: &str = r#"
        [device]
        instance = 1234
        name = "AHU-1"
        vendor_id = 5
        segmentation = false
        max_elements = 2

        [[objects]]
        object = "analogInput:1"
        read_only = ["presentValue"]
        properties = { presentValue = 72.5, units = "degreesFahrenheit" }

        [[objects]]
        object = "analogValue:1"
        properties = { presentValue = 20, description = "setpoint" }
        errors = { units = "unknownProperty" }

        [[objects]]
        object = "multiStateValue:1"
        properties = { presentValue = 1, stateText = ["off", "auto", "on"] }

        [[objects]]
        object = "device:1234"
        properties = { 3653 = true }
    "#;

    fn registry() -> Arc<StandardRegistry> {
        let registry = StandardRegistry::new();
        registry.register_vendor_property(
            5,
            ObjectType::Device,
            PropertyIdentifier::from_code(3653),
            Datatype::Atomic(AtomicKind::Boolean),
        );
        Arc::new(registry)
    }

    fn session_for(device: SimulatedDevice, registry: Arc<StandardRegistry>) -> Session {
        let gateway = DispatchLoop::spawn(device, GatewayConfig::default()).unwrap();
        let session = Session::new(Arc::new(gateway), registry);
        session.start();
        session
    }

    fn device_session() -> Session {
        let registry = registry();
        let device = SimulatedDevice::from_toml_str(DEVICE, registry.as_ref()).unwrap();
        session_for(device, registry)
    }

    #[test]
    fn test_device_file_values() {
        let registry = registry();
        let device = SimulatedDevice::from_toml_str(DEVICE, registry.as_ref()).unwrap();
        let ai1 = ObjectIdentifier::new(ObjectType::AnalogInput, 1);

        assert_eq!(
            device.value(ai1, PropertyIdentifier::PresentValue),
            Some(Value::Real(72.5))
        );
        assert_eq!(device.value(ai1, PropertyIdentifier::Units), Some(Value::Enumerated(64)));
        assert_eq!(
            device.value(device.device(), PropertyIdentifier::ObjectName),
            Some(Value::CharacterString("AHU-1".into()))
        );
        assert_eq!(
            device.value(device.device(), PropertyIdentifier::SegmentationSupported),
            Some(Value::Enumerated(3))
        );
        match device.value(device.device(), PropertyIdentifier::ObjectList) {
            Some(Value::List(objects)) => assert_eq!(objects.len(), 4),
            other => panic!("unexpected object list: {other:?}"),
        }
    }

    #[test]
    fn test_device_file_errors() {
        let registry = StandardRegistry::new();

        let err = SimulatedDevice::from_toml_str(
            "[device]\ninstance = 1\n[[objects]]\nobject = \"analogInput:1\"\nproperties = { stateText = [\"a\"] }\n",
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidProperty { .. }));

        let err = SimulatedDevice::from_toml_str(
            "[device]\ninstance = 1\n[[objects]]\nobject = \"analogInput:1\"\nerrors = { units = \"notAnError\" }\n",
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::UnknownErrorCode(_)));

        let err = SimulatedDevice::from_toml_str(
            "[device]\ninstance = 1\n[[objects]]\nobject = \"widget:1\"\n",
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidObject(_)));

        let err = SimulatedDevice::from_toml_str("[device]\n", &registry).unwrap_err();
        assert!(matches!(err, SimError::TomlParseError(_)));
    }

    #[test]
    fn test_demo_device() {
        let registry = registry();
        let demo = include_str!("../../../demos/device.toml");
        let device = SimulatedDevice::from_toml_str(demo, registry.as_ref()).unwrap();
        assert_eq!(
            device.value(
                ObjectIdentifier::new(ObjectType::BinaryOutput, 1),
                PropertyIdentifier::PresentValue
            ),
            Some(Value::Enumerated(1))
        );
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEVICE.as_bytes()).unwrap();

        let registry = registry();
        let device = SimulatedDevice::load(file.path(), registry.as_ref()).await.unwrap();
        let session = session_for(device, registry);

        let value = session.read("0x0a analogInput 1 presentValue").await.unwrap();
        assert_eq!(value, Value::Real(72.5));
    }

    #[tokio::test]
    async fn test_vendor_property() {
        let session = device_session();
        let value = session
            .read_with(
                "2:5 device 1234 3653",
                crate::session::ReadOptions {
                    vendor_id: 5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(value, Value::Boolean(true));
    }

    #[tokio::test]
    async fn test_segmentation_fallback_end_to_end() {
        let session = device_session();

        let value = session.read("2:5 multiStateValue 1 stateText").await.unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::CharacterString("off".into()),
                Value::CharacterString("auto".into()),
                Value::CharacterString("on".into()),
            ])
        );

        let value = session.read("2:5 multiStateValue 1 stateText 0").await.unwrap();
        assert_eq!(value, Value::Unsigned(3));

        // the object list is too long too
        match session.read("2:5 device 1234 objectList").await.unwrap() {
            Value::List(objects) => assert_eq!(objects.len(), 4),
            other => panic!("unexpected value: {other:?}"),
        }
        assert_eq!(session.notes().len(), 2);
    }

    #[tokio::test]
    async fn test_read_multiple_with_unknown_property() {
        let session = device_session();
        let values = session
            .read_multiple("2:5 analogValue 1 presentValue units")
            .await
            .unwrap();
        assert_eq!(values, vec![Some(Value::Real(20.0)), None]);

        // a reply over the element limit is aborted
        assert!(matches!(
            session
                .read_multiple("2:5 analogInput 1 presentValue units multiStateValue 1 stateText")
                .await,
            Err(Error::SegmentationNotSupported)
        ));
    }

    #[tokio::test]
    async fn test_read_multiple_wildcard() {
        let device = SimulatedDevice::new(7).with_property(
            ObjectIdentifier::new(ObjectType::BinaryValue, 2),
            PropertyIdentifier::PresentValue,
            Value::Enumerated(1),
        );
        let session = session_for(device, Arc::new(StandardRegistry::new()));

        let values = session.read_multiple("2:5 binaryValue 2 all").await.unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.contains(&Some(Value::Enumerated(1))));

        let values = session.read_multiple("2:5 binaryValue 2 required").await.unwrap();
        assert_eq!(values.len(), 3);
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let session = device_session();

        let outcome = session
            .write("2:5 analogValue 1 presentValue 21.5 - 8")
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Acknowledged);
        assert_eq!(
            session.read("2:5 analogValue 1 presentValue").await.unwrap(),
            Value::Real(21.5)
        );

        session
            .write("2:5 multiStateValue 1 stateText heat 3")
            .await
            .unwrap();
        session
            .write("2:5 multiStateValue 1 stateText 2 0")
            .await
            .unwrap();
        assert_eq!(
            session.read("2:5 multiStateValue 1 stateText").await.unwrap(),
            Value::List(vec![
                Value::CharacterString("off".into()),
                Value::CharacterString("auto".into()),
            ])
        );
    }

    #[tokio::test]
    async fn test_write_failures() {
        let session = device_session();

        assert!(matches!(
            session.write("2:5 analogInput 1 presentValue 50").await,
            Err(Error::WriteAccessDenied)
        ));
        match session.write("2:5 analogInput 9 presentValue 50").await {
            Err(Error::NoResponseFromController { reason }) => assert_eq!(reason, "unknownObject"),
            other => panic!("unexpected result: {other:?}"),
        }
        match session.write("2:5 multiStateValue 1 stateText heat 9").await {
            Err(Error::NoResponseFromController { reason }) => {
                assert_eq!(reason, "invalidArrayIndex")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_array_resize_is_refused() {
        let session = device_session();

        match session
            .write("2:5 multiStateValue 1 stateText 18446744073709551615 0")
            .await
        {
            Err(Error::NoResponseFromController { reason }) => {
                assert_eq!(reason, "noSpaceToWriteProperty")
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // The device keeps answering on the same session
        assert_eq!(
            session.read("2:5 multiStateValue 1 presentValue").await.unwrap(),
            Value::Unsigned(1)
        );
        match session.read("2:5 multiStateValue 1 stateText").await.unwrap() {
            Value::List(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unacknowledged_write_is_indeterminate() {
        let av1 = ObjectIdentifier::new(ObjectType::AnalogValue, 1);
        let device = SimulatedDevice::new(7)
            .with_property(av1, PropertyIdentifier::PresentValue, Value::Real(0.0))
            .acknowledge_writes(false);
        let session = session_for(device, Arc::new(StandardRegistry::new()));

        let outcome = session.write("2:5 analogValue 1 presentValue 3").await.unwrap();
        assert_eq!(outcome, WriteOutcome::Indeterminate);
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_read_errors() {
        let av1 = ObjectIdentifier::new(ObjectType::AnalogValue, 1);
        let device = SimulatedDevice::new(7)
            .with_property(av1, PropertyIdentifier::PresentValue, Value::Real(0.0))
            .with_error(av1, PropertyIdentifier::Description, ErrorCode::ReadAccessDenied);
        let session = session_for(device, Arc::new(StandardRegistry::new()));

        match session.read("2:5 analogValue 1 description").await {
            Err(Error::NoResponseFromController { reason }) => assert_eq!(reason, "readAccessDenied"),
            other => panic!("unexpected result: {other:?}"),
        }
        match session.read("2:5 analogValue 1 presentValue 2").await {
            Err(Error::NoResponseFromController { reason }) => {
                assert_eq!(reason, "propertyIsNotAnArray")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match session.read("2:5 analogValue 1 units").await {
            Err(Error::NoResponseFromController { reason }) => assert_eq!(reason, "unknownProperty"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
