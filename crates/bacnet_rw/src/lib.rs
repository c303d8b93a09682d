//! BACnet ReadProperty / WriteProperty client core
//!
//! This crate turns loosely-typed commands such as
//! `2:5 analogInput 1 presentValue` into tagged BACnet requests, hands them to
//! a transport gateway, and interprets what comes back:
//! - Request building with datatype validation against a registry
//! - Application-tag codec for property values
//! - Failure classification for reject, abort and error PDUs
//! - Transparent per-index fallback for devices without segmentation
//!
//! The transport itself is a collaborator behind [`TransportGateway`]. A
//! single-threaded [`DispatchLoop`] serving a [`SimulatedDevice`] is provided
//! for tools and tests.

#[macro_use]
mod macros;

pub mod datatype;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod gateway;
pub mod notes;
pub mod reason;
pub mod request;
pub mod response;
pub mod session;
pub mod sim;
pub mod types;
pub mod value;

mod fallback;

pub use datatype::{AtomicKind, Datatype, DatatypeResolver, Enumeration, StandardRegistry};
pub use dispatch::{DispatchLoop, GatewayConfig, Responder};
pub use encoding::Any;
pub use error::{BuildError, DecodeError, Error, Result};
pub use gateway::{Completion, GatewayError, ResponseHandle, TransportGateway};
pub use notes::{Note, Notes};
pub use reason::{find_reason, AbortReason, ErrorClass, ErrorCode, Reason, RejectReason};
pub use request::{
    PropertyReference, ReadAccessSpec, ReadPropertyMultipleRequest, ReadPropertyRequest, Request,
    RequestBuilder, WriteInput, WritePropertyRequest,
};
pub use response::{Classified, FailurePdu, Outcome, Response, WriteOutcome};
pub use session::{BlockingSession, ReadOptions, Session, SessionState, WriteOptions};
pub use sim::{DeviceFile, SimError, SimulatedDevice};
pub use types::{Address, ConfirmedService, ObjectIdentifier, ObjectType, PropertyIdentifier};
pub use value::{BitString, Date, Time, Value};
