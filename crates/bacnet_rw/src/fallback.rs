//! Per-index fallback for devices that cannot segment a reply
//!
//! A single read starts `Direct`. When the device answers with
//! `segmentationNotSupported` the read moves to `PerIndex`: index 0 gives the
//! element count N, then indices 1..=N are read one at a time, in order.
//! A requested array index does not narrow the fallback, the whole array is
//! reassembled. There is no second level of fallback.

use tracing::info;

use crate::error::{Error, Result};
use crate::request::ReadPropertyRequest;
use crate::response::Outcome;
use crate::session::Session;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadPhase {
    Direct,
    PerIndex,
}

pub(crate) struct SegmentationFallback<'s> {
    session: &'s Session,
    request: ReadPropertyRequest,
    vendor_id: u16,
    phase: ReadPhase,
}

impl<'s> SegmentationFallback<'s> {
    pub(crate) fn new(session: &'s Session, request: ReadPropertyRequest, vendor_id: u16) -> Self {
        Self {
            session,
            request,
            vendor_id,
            phase: ReadPhase::Direct,
        }
    }

    pub(crate) async fn run(mut self) -> Result<Value> {
        let failure = match self.session.read_once(self.request.clone(), self.vendor_id).await? {
            Outcome::Success(value) => return Ok(value),
            Outcome::Failure(failure) => failure,
        };

        if !failure.segmentation_not_supported {
            return Err(self.session.read_failure(failure, &self.request));
        }

        self.phase = ReadPhase::PerIndex;
        info!(
            "{} cannot segment {} {}, reading element by element",
            self.request.destination, self.request.object, self.request.property
        );
        self.session.notes().note(format!(
            "Segmentation not supported by {}: read {} {} per index",
            self.request.destination, self.request.object, self.request.property
        ));

        let count = match self.read_index(0).await? {
            Value::Unsigned(count) => u32::try_from(count)
                .map_err(|_| Error::InvalidArrayLength(count.to_string()))?,
            other => return Err(Error::InvalidArrayLength(other.to_string())),
        };

        let mut values = Vec::new();
        for index in 1..=count {
            values.push(self.read_index(index).await?);
        }
        Ok(Value::List(values))
    }

    async fn read_index(&self, index: u32) -> Result<Value> {
        debug_assert_eq!(self.phase, ReadPhase::PerIndex);

        let request = ReadPropertyRequest {
            array_index: Some(index),
            ..self.request.clone()
        };
        match self.session.read_once(request.clone(), self.vendor_id).await? {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) if failure.segmentation_not_supported => {
                Err(Error::SegmentationNotSupported)
            }
            Outcome::Failure(failure) => Err(self.session.read_failure(failure, &request)),
        }
    }
}
