//! Session: the entry points for reads and writes
//!
//! A session owns the started flag and the notes journal. Every call builds a
//! fresh request, submits it through the gateway and waits for the one reply
//! before interpreting it.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, info, warn};

use crate::datatype::DatatypeResolver;
use crate::error::{Error, Result};
use crate::fallback::SegmentationFallback;
use crate::gateway::{Completion, TransportGateway};
use crate::notes::Notes;
use crate::request::{ReadPropertyRequest, Request, RequestBuilder, WriteInput, tokenize};
use crate::response::{
    Classified, Outcome, Response, WriteOutcome, interpret_read, interpret_read_multiple,
    interpret_write,
};
use crate::value::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Session State
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the session accepts calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Stopped = 0,
    Running = 1,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Running => write!(f, "running"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Used when the command has no index token
    pub array_index: Option<u32>,
    /// Selects vendor-specific datatypes
    pub vendor_id: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub array_index: Option<u32>,
    pub priority: Option<u32>,
    pub vendor_id: u16,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Read/write client bound to a gateway and a datatype resolver
pub struct Session {
    gateway: Arc<dyn TransportGateway>,
    resolver: Arc<dyn DatatypeResolver>,
    state: AtomicU8,
    notes: Notes,
}

impl Session {
    /// Create a stopped session
    pub fn new(gateway: Arc<dyn TransportGateway>, resolver: Arc<dyn DatatypeResolver>) -> Self {
        Self {
            gateway,
            resolver,
            state: AtomicU8::new(SessionState::Stopped as u8),
            notes: Notes::new(),
        }
    }

    pub fn start(&self) {
        self.state.store(SessionState::Running as u8, Ordering::SeqCst);
        info!("Session started");
    }

    pub fn stop(&self) {
        self.state.store(SessionState::Stopped as u8, Ordering::SeqCst);
        info!("Session stopped");
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    fn ensure_started(&self) -> Result<()> {
        match self.state() {
            SessionState::Running => Ok(()),
            SessionState::Stopped => Err(Error::ApplicationNotStarted),
        }
    }

    fn builder(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(self.resolver.as_ref())
    }

    /// Submit one request and wait for its completion
    async fn exchange(&self, request: Request) -> Outcome<Response> {
        let service = request.service();
        match self.gateway.submit(request).await {
            Ok(Completion::Success(response)) => Outcome::Success(response),
            Ok(Completion::Failure(failure)) => {
                let classified = Classified::from_failure(&failure);
                debug!("{} failed: {}", service, classified.reason);
                Outcome::Failure(classified)
            }
            Err(e) => {
                warn!("{} got no reply: {}", service, e);
                Outcome::Failure(Classified::no_response(e.to_string()))
            }
        }
    }

    /// One ReadProperty exchange, no fallback
    pub(crate) async fn read_once(
        &self,
        request: ReadPropertyRequest,
        vendor_id: u16,
    ) -> Result<Outcome<Value>> {
        match self.exchange(request.into()).await {
            Outcome::Success(response) => Ok(Outcome::Success(interpret_read(
                &response,
                self.resolver.as_ref(),
                vendor_id,
            )?)),
            Outcome::Failure(failure) => Ok(Outcome::Failure(failure)),
        }
    }

    /// Error for a single read that failed for a reason other than segmentation
    pub(crate) fn read_failure(&self, failure: Classified, request: &ReadPropertyRequest) -> Error {
        if failure.unknown_property {
            warn!("Unknown property {} on {}", request.property, request.object);
            self.notes.note(format!(
                "Unknown property {} on {} at {}",
                request.property, request.object, request.destination
            ));
        } else {
            warn!(
                "Read of {} {} from {} failed: {}",
                request.object, request.property, request.destination, failure.reason
            );
        }
        Error::NoResponseFromController {
            reason: failure.reason.to_string(),
        }
    }

    /// `<address> <object-type> <instance> <property> [array-index]`
    pub async fn read(&self, command: &str) -> Result<Value> {
        self.read_with(command, ReadOptions::default()).await
    }

    pub async fn read_with(&self, command: &str, options: ReadOptions) -> Result<Value> {
        self.ensure_started()?;
        let request =
            self.builder()
                .build_read(&tokenize(command), options.array_index, options.vendor_id)?;
        SegmentationFallback::new(self, request, options.vendor_id)
            .run()
            .await
    }

    /// `<address> ( <object-type> <instance> ( <property> [array-index] )+ )+`
    ///
    /// Values come back object by object, property by property; a property
    /// the device could not read is `None`. When the whole request fails for
    /// any reason other than an unrecognized service or segmentation, the
    /// result is a single `None`.
    pub async fn read_multiple(&self, command: &str) -> Result<Vec<Option<Value>>> {
        self.ensure_started()?;
        let request = self.builder().build_read_multiple(&tokenize(command))?;
        let destination = request.destination.clone();

        let failure = match self.exchange(request.into()).await {
            Outcome::Success(response) => {
                return interpret_read_multiple(&response, self.resolver.as_ref());
            }
            Outcome::Failure(failure) => failure,
        };

        if failure.reason.is("unrecognizedService") {
            return Err(Error::UnrecognizedService);
        }
        if failure.segmentation_not_supported {
            return Err(Error::SegmentationNotSupported);
        }
        if failure.unknown_property {
            warn!("Unknown property in ReadPropertyMultiple to {}", destination);
            self.notes
                .note(format!("Unknown property in ReadPropertyMultiple to {}", destination));
        } else {
            warn!(
                "ReadPropertyMultiple to {} failed: {}",
                destination, failure.reason
            );
        }
        Ok(vec![None])
    }

    /// `<address> <object-type> <instance> <property> <value> [array-index|-] [priority]`
    pub async fn write(&self, command: &str) -> Result<WriteOutcome> {
        self.write_with(command, 0).await
    }

    pub async fn write_with(&self, command: &str, vendor_id: u16) -> Result<WriteOutcome> {
        self.ensure_started()?;
        let request = self.builder().build_write(&tokenize(command), vendor_id)?;
        self.submit_write(request.into()).await
    }

    /// Write an already-typed value to `<address> <object-type> <instance> <property>`
    pub async fn write_value(
        &self,
        target: &str,
        value: Value,
        options: WriteOptions,
    ) -> Result<WriteOutcome> {
        self.ensure_started()?;
        let request = self.builder().build_write_value(
            &tokenize(target),
            WriteInput::Value(value),
            options.array_index,
            options.priority,
            options.vendor_id,
        )?;
        self.submit_write(request.into()).await
    }

    async fn submit_write(&self, request: Request) -> Result<WriteOutcome> {
        let destination = request.destination().clone();
        match self.exchange(request).await {
            Outcome::Success(response) => {
                let outcome = interpret_write(&response);
                if outcome == WriteOutcome::Indeterminate {
                    warn!("Write to {} was not acknowledged: {:?}", destination, response);
                    self.notes
                        .note(format!("Write to {} got no SimpleAck", destination));
                }
                Ok(outcome)
            }
            Outcome::Failure(failure) if failure.reason.is("writeAccessDenied") => {
                warn!("Write access denied by {}", destination);
                Err(Error::WriteAccessDenied)
            }
            Outcome::Failure(failure) => {
                warn!("Write to {} failed: {}", destination, failure.reason);
                Err(Error::NoResponseFromController {
                    reason: failure.reason.to_string(),
                })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blocking Session
// ─────────────────────────────────────────────────────────────────────────────

/// Synchronous wrapper: each call blocks the caller until the reply is in
pub struct BlockingSession {
    session: Session,
    runtime: tokio::runtime::Runtime,
}

impl BlockingSession {
    pub fn new(session: Session) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { session, runtime })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn read(&self, command: &str) -> Result<Value> {
        self.runtime.block_on(self.session.read(command))
    }

    pub fn read_with(&self, command: &str, options: ReadOptions) -> Result<Value> {
        self.runtime.block_on(self.session.read_with(command, options))
    }

    pub fn read_multiple(&self, command: &str) -> Result<Vec<Option<Value>>> {
        self.runtime.block_on(self.session.read_multiple(command))
    }

    pub fn write(&self, command: &str) -> Result<WriteOutcome> {
        self.runtime.block_on(self.session.write(command))
    }

    pub fn write_with(&self, command: &str, vendor_id: u16) -> Result<WriteOutcome> {
        self.runtime.block_on(self.session.write_with(command, vendor_id))
    }

    pub fn write_value(&self, target: &str, value: Value, options: WriteOptions) -> Result<WriteOutcome> {
        self.runtime
            .block_on(self.session.write_value(target, value, options))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::datatype::StandardRegistry;
    use crate::encoding::Any;
    use crate::gateway::ResponseHandle;
    use crate::reason::{ErrorClass, ErrorCode};
    use crate::response::{FailurePdu, ReadAccessResult, ReadResult, ResultElement};
    use crate::types::{ConfirmedService, ObjectIdentifier, ObjectType, PropertyIdentifier};

    /// Replies with queued completions and records what was submitted
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Completion>>,
        submitted: Mutex<Vec<Request>>,
    }

    impl Scripted {
        fn new(replies: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                submitted: Mutex::new(Vec::new()),
            })
        }

        fn submitted(&self) -> Vec<Request> {
            self.submitted.lock().clone()
        }
    }

    impl TransportGateway for Scripted {
        fn submit(&self, request: Request) -> ResponseHandle {
            self.submitted.lock().push(request);
            match self.replies.lock().pop_front() {
                Some(completion) => ResponseHandle::ready(completion),
                None => {
                    // sender dropped right away, the handle reports Closed
                    let (_, rx) = tokio::sync::oneshot::channel();
                    ResponseHandle::new(rx, Duration::from_millis(10))
                }
            }
        }
    }

    fn session(gateway: Arc<Scripted>) -> Session {
        let session = Session::new(gateway, Arc::new(StandardRegistry::new()));
        session.start();
        session
    }

    fn ack(property: PropertyIdentifier, array_index: Option<u32>, value: Value) -> Completion {
        Completion::Success(Response::ReadPropertyAck {
            object: ObjectIdentifier::new(ObjectType::MultiStateValue, 1),
            property,
            array_index,
            value: Any::encode(&value),
        })
    }

    fn segmentation_abort() -> Completion {
        Completion::Failure(FailurePdu::Abort { server: true, reason: 4 })
    }

    #[tokio::test]
    async fn test_read_present_value() {
        let gateway = Scripted::new(vec![Completion::Success(Response::ReadPropertyAck {
            object: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
            property: PropertyIdentifier::PresentValue,
            array_index: None,
            value: Any::encode(&Value::Real(72.5)),
        })]);
        let session = session(gateway.clone());

        let value = session.read("2:5 analogInput 1 presentValue").await.unwrap();
        assert_eq!(value, Value::Real(72.5));
        assert_eq!(gateway.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_segmentation_fallback_reads_each_index() {
        let gateway = Scripted::new(vec![
            segmentation_abort(),
            ack(PropertyIdentifier::StateText, Some(0), Value::Unsigned(3)),
            ack(PropertyIdentifier::StateText, Some(1), Value::CharacterString("off".into())),
            ack(PropertyIdentifier::StateText, Some(2), Value::CharacterString("auto".into())),
            ack(PropertyIdentifier::StateText, Some(3), Value::CharacterString("on".into())),
        ]);
        let session = session(gateway.clone());

        let value = session.read("2:5 multiStateValue 1 stateText").await.unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::CharacterString("off".into()),
                Value::CharacterString("auto".into()),
                Value::CharacterString("on".into()),
            ])
        );

        let indices: Vec<Option<u32>> = gateway
            .submitted()
            .iter()
            .map(|request| match request {
                Request::ReadProperty(r) => r.array_index,
                _ => panic!("unexpected request"),
            })
            .collect();
        assert_eq!(indices, vec![None, Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_from_indexed_read_returns_whole_array() {
        let gateway = Scripted::new(vec![
            segmentation_abort(),
            ack(PropertyIdentifier::StateText, Some(0), Value::Unsigned(3)),
            ack(PropertyIdentifier::StateText, Some(1), Value::CharacterString("a".into())),
            ack(PropertyIdentifier::StateText, Some(2), Value::CharacterString("b".into())),
            ack(PropertyIdentifier::StateText, Some(3), Value::CharacterString("c".into())),
        ]);
        let session = session(gateway.clone());

        let value = session
            .read_with(
                "2:5 multiStateValue 1 stateText",
                ReadOptions {
                    array_index: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match value {
            Value::List(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected value: {other:?}"),
        }

        let first = &gateway.submitted()[0];
        assert!(matches!(first, Request::ReadProperty(r) if r.array_index == Some(3)));
    }

    #[tokio::test]
    async fn test_no_nested_fallback() {
        let gateway = Scripted::new(vec![
            segmentation_abort(),
            ack(PropertyIdentifier::StateText, Some(0), Value::Unsigned(2)),
            segmentation_abort(),
        ]);
        let session = session(gateway);

        let err = session.read("2:5 multiStateValue 1 stateText").await.unwrap_err();
        assert!(matches!(err, Error::SegmentationNotSupported));
    }

    #[tokio::test]
    async fn test_fallback_needs_unsigned_length() {
        let gateway = Scripted::new(vec![
            segmentation_abort(),
            Completion::Success(Response::ReadPropertyAck {
                object: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
                property: PropertyIdentifier::PresentValue,
                array_index: Some(0),
                value: Any::encode(&Value::Real(1.0)),
            }),
        ]);
        let session = session(gateway);

        let err = session.read("2:5 analogInput 1 presentValue").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArrayLength(_)));
    }

    #[tokio::test]
    async fn test_unknown_property_single_read() {
        let gateway = Scripted::new(vec![Completion::Failure(FailurePdu::error(
            ErrorClass::Property,
            ErrorCode::UnknownProperty,
        ))]);
        let session = session(gateway);

        let err = session.read("2:5 analogInput 1 description").await.unwrap_err();
        match err {
            Error::NoResponseFromController { reason } => assert_eq!(reason, "unknownProperty"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_session_builds_nothing() {
        let gateway = Scripted::new(vec![]);
        let session = Session::new(gateway.clone(), Arc::new(StandardRegistry::new()));

        assert!(matches!(
            session.read("garbage").await,
            Err(Error::ApplicationNotStarted)
        ));
        assert!(matches!(
            session.read_multiple("garbage").await,
            Err(Error::ApplicationNotStarted)
        ));
        assert!(matches!(
            session.write("garbage").await,
            Err(Error::ApplicationNotStarted)
        ));
        assert!(gateway.submitted().is_empty());

        session.start();
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
        assert!(matches!(
            session.read("2:5 analogInput 1 presentValue").await,
            Err(Error::ApplicationNotStarted)
        ));
    }

    #[tokio::test]
    async fn test_read_multiple_with_access_error() {
        let gateway = Scripted::new(vec![Completion::Success(Response::ReadPropertyMultipleAck {
            results: vec![ReadAccessResult {
                object: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
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
            }],
        })]);
        let session = session(gateway);

        let values = session
            .read_multiple("2:5 analogInput 1 presentValue units")
            .await
            .unwrap();
        assert_eq!(values, vec![Some(Value::Real(72.5)), None]);
    }

    #[tokio::test]
    async fn test_read_multiple_failures() {
        let gateway = Scripted::new(vec![
            Completion::Failure(FailurePdu::Reject { reason: 9 }),
            segmentation_abort(),
            Completion::Failure(FailurePdu::error(ErrorClass::Object, ErrorCode::UnknownObject)),
        ]);
        let session = session(gateway);
        let command = "2:5 analogInput 1 presentValue";

        assert!(matches!(
            session.read_multiple(command).await,
            Err(Error::UnrecognizedService)
        ));
        assert!(matches!(
            session.read_multiple(command).await,
            Err(Error::SegmentationNotSupported)
        ));
        assert_eq!(session.read_multiple(command).await.unwrap(), vec![None]);
        // no reply at all
        assert_eq!(session.read_multiple(command).await.unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_write_outcomes() {
        let gateway = Scripted::new(vec![
            Completion::Success(Response::SimpleAck {
                service: ConfirmedService::WriteProperty,
            }),
            Completion::Success(Response::ComplexAck {
                service: ConfirmedService::WriteProperty,
                payload: vec![0x00],
            }),
            Completion::Failure(FailurePdu::error(ErrorClass::Property, ErrorCode::WriteAccessDenied)),
            Completion::Failure(FailurePdu::error(ErrorClass::Property, ErrorCode::ValueOutOfRange)),
            Completion::Failure(FailurePdu::Error {
                error_class: None,
                error_code: Some(ErrorCode::ValueOutOfRange.code()),
            }),
        ]);
        let session = session(gateway.clone());
        let command = "2:5 analogValue 1 presentValue 21.5 - 300";

        assert_eq!(session.write(command).await.unwrap(), WriteOutcome::Acknowledged);
        assert_eq!(session.write(command).await.unwrap(), WriteOutcome::Indeterminate);
        assert!(matches!(
            session.write(command).await,
            Err(Error::WriteAccessDenied)
        ));
        match session.write(command).await {
            Err(Error::NoResponseFromController { reason }) => assert_eq!(reason, "valueOutOfRange"),
            other => panic!("unexpected result: {other:?}"),
        }
        match session.write(command).await {
            Err(Error::NoResponseFromController { reason }) => assert_eq!(reason, "UnknownError"),
            other => panic!("unexpected result: {other:?}"),
        }

        match &gateway.submitted()[0] {
            Request::WriteProperty(request) => assert_eq!(request.priority, Some(300)),
            _ => panic!("unexpected request"),
        }
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_value_typed() {
        let gateway = Scripted::new(vec![Completion::Success(Response::SimpleAck {
            service: ConfirmedService::WriteProperty,
        })]);
        let session = session(gateway.clone());

        let outcome = session
            .write_value(
                "2:5 binaryValue 3 presentValue",
                Value::Enumerated(1),
                WriteOptions {
                    priority: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Acknowledged);

        match &gateway.submitted()[0] {
            Request::WriteProperty(request) => {
                assert_eq!(request.value, Any::encode(&Value::Enumerated(1)));
                assert_eq!(request.priority, Some(8));
            }
            _ => panic!("unexpected request"),
        }
    }

    #[test]
    fn test_blocking_session() {
        let gateway = Scripted::new(vec![Completion::Success(Response::ReadPropertyAck {
            object: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
            property: PropertyIdentifier::PresentValue,
            array_index: None,
            value: Any::encode(&Value::Real(72.5)),
        })]);
        let blocking = BlockingSession::new(session(gateway)).unwrap();
        assert_eq!(
            blocking.read("2:5 analogInput 1 presentValue").unwrap(),
            Value::Real(72.5)
        );
        // nothing queued, no reply
        assert!(matches!(
            blocking.read("2:5 analogInput 1 presentValue"),
            Err(Error::NoResponseFromController { .. })
        ));
    }
}
