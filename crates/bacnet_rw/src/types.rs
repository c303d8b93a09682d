//! BACnet identifiers and addressing

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use crate::error::BuildError;

/// Default BACnet/IP UDP port (0xBAC0)
pub const DEFAULT_BACNET_PORT: u16 = 47808;

/// Largest instance number an object identifier can carry (22 bits)
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

bacnet_enumeration! {
    /// BACnet object types
    pub enum ObjectType: u16 {
        AnalogInput = 0 => "analogInput",
        AnalogOutput = 1 => "analogOutput",
        AnalogValue = 2 => "analogValue",
        BinaryInput = 3 => "binaryInput",
        BinaryOutput = 4 => "binaryOutput",
        BinaryValue = 5 => "binaryValue",
        Calendar = 6 => "calendar",
        Command = 7 => "command",
        Device = 8 => "device",
        EventEnrollment = 9 => "eventEnrollment",
        File = 10 => "file",
        Group = 11 => "group",
        Loop = 12 => "loop",
        MultiStateInput = 13 => "multiStateInput",
        MultiStateOutput = 14 => "multiStateOutput",
        NotificationClass = 15 => "notificationClass",
        Program = 16 => "program",
        Schedule = 17 => "schedule",
        Averaging = 18 => "averaging",
        MultiStateValue = 19 => "multiStateValue",
        TrendLog = 20 => "trendLog",
        LifeSafetyPoint = 21 => "lifeSafetyPoint",
        LifeSafetyZone = 22 => "lifeSafetyZone",
        Accumulator = 23 => "accumulator",
        PulseConverter = 24 => "pulseConverter",
        EventLog = 25 => "eventLog",
        GlobalGroup = 26 => "globalGroup",
        TrendLogMultiple = 27 => "trendLogMultiple",
        LoadControl = 28 => "loadControl",
        StructuredView = 29 => "structuredView",
        AccessDoor = 30 => "accessDoor",
    }
}

bacnet_enumeration! {
    /// BACnet property identifiers
    pub enum PropertyIdentifier: u32 {
        AckedTransitions = 0 => "ackedTransitions",
        AckRequired = 1 => "ackRequired",
        ActiveText = 4 => "activeText",
        All = 8 => "all",
        ApduTimeout = 11 => "apduTimeout",
        ApplicationSoftwareVersion = 12 => "applicationSoftwareVersion",
        Archive = 13 => "archive",
        NotificationClass = 17 => "notificationClass",
        CovIncrement = 22 => "covIncrement",
        DateList = 23 => "dateList",
        DaylightSavingsStatus = 24 => "daylightSavingsStatus",
        Description = 28 => "description",
        DeviceAddressBinding = 30 => "deviceAddressBinding",
        EffectivePeriod = 32 => "effectivePeriod",
        EventEnable = 35 => "eventEnable",
        EventState = 36 => "eventState",
        ExceptionSchedule = 38 => "exceptionSchedule",
        FileAccessMethod = 41 => "fileAccessMethod",
        FileSize = 42 => "fileSize",
        FileType = 43 => "fileType",
        FirmwareRevision = 44 => "firmwareRevision",
        InactiveText = 46 => "inactiveText",
        ListOfObjectPropertyReferences = 54 => "listOfObjectPropertyReferences",
        LocalDate = 56 => "localDate",
        LocalTime = 57 => "localTime",
        Location = 58 => "location",
        MaxApduLengthAccepted = 62 => "maxApduLengthAccepted",
        MaxPresValue = 65 => "maxPresValue",
        MinPresValue = 69 => "minPresValue",
        ModelName = 70 => "modelName",
        ModificationDate = 71 => "modificationDate",
        NumberOfApduRetries = 73 => "numberOfApduRetries",
        NumberOfStates = 74 => "numberOfStates",
        ObjectIdentifier = 75 => "objectIdentifier",
        ObjectList = 76 => "objectList",
        ObjectName = 77 => "objectName",
        ObjectType = 79 => "objectType",
        Optional = 80 => "optional",
        OutOfService = 81 => "outOfService",
        Polarity = 84 => "polarity",
        PresentValue = 85 => "presentValue",
        Priority = 86 => "priority",
        PriorityArray = 87 => "priorityArray",
        PriorityForWriting = 88 => "priorityForWriting",
        ProtocolObjectTypesSupported = 96 => "protocolObjectTypesSupported",
        ProtocolServicesSupported = 97 => "protocolServicesSupported",
        ProtocolVersion = 98 => "protocolVersion",
        ReadOnly = 99 => "readOnly",
        RecipientList = 102 => "recipientList",
        Reliability = 103 => "reliability",
        RelinquishDefault = 104 => "relinquishDefault",
        Required = 105 => "required",
        Resolution = 106 => "resolution",
        SegmentationSupported = 107 => "segmentationSupported",
        StateText = 110 => "stateText",
        StatusFlags = 111 => "statusFlags",
        SystemStatus = 112 => "systemStatus",
        Units = 117 => "units",
        UtcOffset = 119 => "utcOffset",
        VendorIdentifier = 120 => "vendorIdentifier",
        VendorName = 121 => "vendorName",
        WeeklySchedule = 123 => "weeklySchedule",
        BufferSize = 126 => "bufferSize",
        EventTimeStamps = 130 => "eventTimeStamps",
        LogEnable = 133 => "logEnable",
        LogInterval = 134 => "logInterval",
        ProtocolRevision = 139 => "protocolRevision",
        RecordCount = 141 => "recordCount",
        StopWhenFull = 144 => "stopWhenFull",
        TotalRecordCount = 145 => "totalRecordCount",
        DatabaseRevision = 155 => "databaseRevision",
        ScheduleDefault = 174 => "scheduleDefault",
        ProfileName = 168 => "profileName",
        StructuredObjectList = 209 => "structuredObjectList",
        PropertyList = 371 => "propertyList",
    }
}

impl PropertyIdentifier {
    /// `all`, `required` and `optional` select groups of properties in a
    /// ReadPropertyMultiple request rather than a single property.
    pub fn is_wildcard(self) -> bool {
        matches!(
            self,
            PropertyIdentifier::All | PropertyIdentifier::Required | PropertyIdentifier::Optional
        )
    }
}

bacnet_enumeration! {
    /// Confirmed services handled by this crate
    pub enum ConfirmedService: u8 {
        ReadProperty = 12 => "readProperty",
        ReadPropertyMultiple = 14 => "readPropertyMultiple",
        WriteProperty = 15 => "writeProperty",
    }
}

/// BACnet object identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// Pack into the 32-bit wire form (10-bit type, 22-bit instance)
    pub fn to_u32(self) -> u32 {
        (u32::from(self.object_type.code()) << 22) | (self.instance & MAX_INSTANCE)
    }

    /// Unpack from the 32-bit wire form
    pub fn from_u32(raw: u32) -> Self {
        Self {
            object_type: ObjectType::from_code((raw >> 22) as u16),
            instance: raw & MAX_INSTANCE,
        }
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.instance)
    }
}

impl FromStr for ObjectIdentifier {
    type Err = BuildError;

    /// Parses `analogInput:1` or `0:1`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (object_type, instance) = s
            .split_once(':')
            .ok_or_else(|| BuildError::InvalidObjectType(s.to_string()))?;

        let object_type = if object_type.bytes().all(|b| b.is_ascii_digit()) {
            object_type
                .parse::<u16>()
                .map(ObjectType::from_code)
                .map_err(|_| BuildError::InvalidObjectType(object_type.to_string()))?
        } else {
            ObjectType::from_name(object_type)
                .ok_or_else(|| BuildError::InvalidObjectType(object_type.to_string()))?
        };

        let instance = instance
            .parse::<u32>()
            .ok()
            .filter(|i| *i <= MAX_INSTANCE)
            .ok_or_else(|| BuildError::InvalidInstance(instance.to_string()))?;

        Ok(Self::new(object_type, instance))
    }
}

/// Destination of a confirmed request
///
/// Follows the usual BACnet address notation: `5` (local station),
/// `2:5` (station 5 on network 2), `192.168.1.10[:port]` (BACnet/IP station),
/// `0x0a0b` (hex MAC), `*` / `2:*` / `*:*` (broadcasts).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    LocalStation(Vec<u8>),
    RemoteStation { network: u16, mac: Vec<u8> },
    LocalBroadcast,
    RemoteBroadcast(u16),
    GlobalBroadcast,
}

impl Address {
    /// Whether a confirmed request can be directed at this address
    pub fn is_station(&self) -> bool {
        matches!(self, Address::LocalStation(_) | Address::RemoteStation { .. })
    }
}

fn parse_mac(s: &str) -> Option<Vec<u8>> {
    if let Some(hex) = s.strip_prefix("0x") {
        return crate::value::parse_hex(hex);
    }

    if s.contains('.') {
        // BACnet/IP: 4 address octets followed by the port, big endian
        let socket = match s.parse::<SocketAddrV4>() {
            Ok(socket) => socket,
            Err(_) => SocketAddrV4::new(s.parse::<Ipv4Addr>().ok()?, DEFAULT_BACNET_PORT),
        };
        let mut mac = socket.ip().octets().to_vec();
        mac.extend_from_slice(&socket.port().to_be_bytes());
        return Some(mac);
    }

    s.parse::<u8>().ok().map(|station| vec![station])
}

fn fmt_mac(mac: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match mac {
        [station] => write!(f, "{}", station),
        [a, b, c, d, hi, lo] => {
            let port = u16::from_be_bytes([*hi, *lo]);
            if port == DEFAULT_BACNET_PORT {
                write!(f, "{}.{}.{}.{}", a, b, c, d)
            } else {
                write!(f, "{}.{}.{}.{}:{}", a, b, c, d, port)
            }
        }
        _ => {
            f.write_str("0x")?;
            for byte in mac {
                write!(f, "{:02x}", byte)?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::LocalStation(mac) => fmt_mac(mac, f),
            Address::RemoteStation { network, mac } => {
                write!(f, "{}:", network)?;
                fmt_mac(mac, f)
            }
            Address::LocalBroadcast => f.write_str("*"),
            Address::RemoteBroadcast(network) => write!(f, "{}:*", network),
            Address::GlobalBroadcast => f.write_str("*:*"),
        }
    }
}

impl FromStr for Address {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BuildError::InvalidAddress(s.to_string());

        match s {
            "" => return Err(invalid()),
            "*" => return Ok(Address::LocalBroadcast),
            "*:*" => return Ok(Address::GlobalBroadcast),
            _ => {}
        }

        if let Some((network, station)) = s.split_once(':') {
            if !network.is_empty() && network.bytes().all(|b| b.is_ascii_digit()) {
                let network = network.parse::<u16>().map_err(|_| invalid())?;
                if station == "*" {
                    return Ok(Address::RemoteBroadcast(network));
                }
                let mac = parse_mac(station).ok_or_else(invalid)?;
                return Ok(Address::RemoteStation { network, mac });
            }
        }

        parse_mac(s).map(Address::LocalStation).ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_codes_and_names() {
        assert_eq!(ObjectType::from_name("analogInput"), Some(ObjectType::AnalogInput));
        assert_eq!(ObjectType::AnalogValue.code(), 2);
        assert_eq!(ObjectType::from_code(128), ObjectType::Unlisted(128));
        assert_eq!(ObjectType::Unlisted(128).to_string(), "128");
        assert_eq!(PropertyIdentifier::from_code(85), PropertyIdentifier::PresentValue);
        assert_eq!(PropertyIdentifier::PresentValue.to_string(), "presentValue");
        assert!(PropertyIdentifier::Required.is_wildcard());
        assert!(!PropertyIdentifier::Units.is_wildcard());
    }

    #[test]
    fn test_object_identifier_wire_form() {
        let oid = ObjectIdentifier::new(ObjectType::Device, 1234);
        assert_eq!(oid.to_u32(), (8 << 22) | 1234);
        assert_eq!(ObjectIdentifier::from_u32(oid.to_u32()), oid);
    }

    #[test]
    fn test_object_identifier_parse() {
        let oid: ObjectIdentifier = "analogInput:3".parse().unwrap();
        assert_eq!(oid, ObjectIdentifier::new(ObjectType::AnalogInput, 3));

        let oid: ObjectIdentifier = "8:99".parse().unwrap();
        assert_eq!(oid, ObjectIdentifier::new(ObjectType::Device, 99));

        assert!("bogusType:1".parse::<ObjectIdentifier>().is_err());
        assert!("analogInput:x".parse::<ObjectIdentifier>().is_err());
        assert!("analogInput".parse::<ObjectIdentifier>().is_err());
    }

    #[test]
    fn test_address_forms() {
        assert_eq!(
            "2:5".parse::<Address>().unwrap(),
            Address::RemoteStation { network: 2, mac: vec![5] }
        );
        assert_eq!("5".parse::<Address>().unwrap(), Address::LocalStation(vec![5]));
        assert_eq!(
            "192.168.1.10".parse::<Address>().unwrap(),
            Address::LocalStation(vec![192, 168, 1, 10, 0xBA, 0xC0])
        );
        assert_eq!(
            "2:192.168.1.10:47809".parse::<Address>().unwrap(),
            Address::RemoteStation {
                network: 2,
                mac: vec![192, 168, 1, 10, 0xBA, 0xC1]
            }
        );
        assert_eq!("0x0a0b".parse::<Address>().unwrap(), Address::LocalStation(vec![10, 11]));
        assert_eq!("*".parse::<Address>().unwrap(), Address::LocalBroadcast);
        assert_eq!("3:*".parse::<Address>().unwrap(), Address::RemoteBroadcast(3));
        assert_eq!("*:*".parse::<Address>().unwrap(), Address::GlobalBroadcast);
        assert!("".parse::<Address>().is_err());
        assert!("not-an-address".parse::<Address>().is_err());
        assert!("2:999".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_display() {
        for text in ["2:5", "192.168.1.10", "10.0.0.1:47809", "0x0a0b0c", "*", "4:*", "*:*"] {
            let address: Address = text.parse().unwrap();
            assert_eq!(address.to_string(), text);
        }
    }
}
