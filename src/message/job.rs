//! Job-Request, Job-Response, Job-Control-Request/Response, Job-Completed.

use bytes::Bytes;

use crate::codec::{tag::Tag, Element};
use crate::stats::TrackerSnapshot;

use super::codes::{JobControlOp, JobState, ResponseCode};
use super::{child, child_integer, child_string, child_u32, Error};

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogMessage {
    pub level: String,
    pub millis: i64,
    pub text: String,
}

impl LogMessage {
    pub fn encode(&self) -> Element {
        Element::Sequence(vec![
            Element::OctetString(Bytes::from(self.level.clone().into_bytes())),
            Element::Integer(self.millis),
            Element::OctetString(Bytes::from(self.text.clone().into_bytes())),
        ])
    }

    pub fn decode(el: &Element) -> Result<Self, Error> {
        let children = el.as_sequence().ok_or_else(|| Error::InvalidField {
            field: "logMessage",
            reason: "expected a nested sequence".into(),
        })?;
        Ok(LogMessage {
            level: child_string(children, 0, "logMessage.level")?,
            millis: child_integer(children, 1, "logMessage.millis")?,
            text: child_string(children, 2, "logMessage.text")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobRequest {
    pub job_id: JobId,
    pub job_class: String,
    pub start_millis: i64,
    pub stop_millis: i64,
    pub client_number: u32,
    pub duration_sec: u32,
    pub threads_per_client: u32,
    pub thread_startup_delay_ms: u32,
    pub collection_interval_sec: u32,
    /// key/value parameters passed through to the workload/probe.
    pub parameters: Vec<(String, String)>,
}

impl JobRequest {
    /// `threadsPerClient ≥ 1`, `collectionIntervalSec ≥ 1`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.threads_per_client < 1 {
            return Err(Error::InvalidField {
                field: "threadsPerClient",
                reason: "must be at least 1".into(),
            });
        }
        if self.collection_interval_sec < 1 {
            return Err(Error::InvalidField {
                field: "collectionIntervalSec",
                reason: "must be at least 1".into(),
            });
        }
        if self.stop_millis < self.start_millis {
            return Err(Error::InvalidField {
                field: "stopMillis",
                reason: "must not precede startMillis".into(),
            });
        }
        Ok(())
    }

    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::JOB_REQUEST,
            vec![
                Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())),
                Element::OctetString(Bytes::from(self.job_class.clone().into_bytes())),
                Element::Integer(self.start_millis),
                Element::Integer(self.stop_millis),
                Element::Integer(self.client_number as i64),
                Element::Integer(self.duration_sec as i64),
                Element::Integer(self.threads_per_client as i64),
                Element::Integer(self.thread_startup_delay_ms as i64),
                Element::Integer(self.collection_interval_sec as i64),
                encode_parameters(&self.parameters),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 10 {
            return Err(Error::WrongArity { expected_one_of: &[10], got: children.len() });
        }
        let req = JobRequest {
            job_id: JobId(child_string(children, 0, "jobID")?),
            job_class: child_string(children, 1, "jobClass")?,
            start_millis: child_integer(children, 2, "startMillis")?,
            stop_millis: child_integer(children, 3, "stopMillis")?,
            client_number: child_u32(children, 4, "clientNumber")?,
            duration_sec: child_u32(children, 5, "durationSec")?,
            threads_per_client: child_u32(children, 6, "threadsPerClient")?,
            thread_startup_delay_ms: child_u32(children, 7, "threadStartupDelayMs")?,
            collection_interval_sec: child_u32(children, 8, "collectionIntervalSec")?,
            parameters: decode_parameters(child(children, 9, "parameters")?)?,
        };
        req.validate()?;
        Ok(req)
    }
}

fn encode_parameters(parameters: &[(String, String)]) -> Element {
    Element::Sequence(
        parameters
            .iter()
            .map(|(k, v)| {
                Element::Sequence(vec![
                    Element::OctetString(Bytes::from(k.clone().into_bytes())),
                    Element::OctetString(Bytes::from(v.clone().into_bytes())),
                ])
            })
            .collect(),
    )
}

fn decode_parameters(el: &Element) -> Result<Vec<(String, String)>, Error> {
    let entries = el.as_sequence().ok_or_else(|| Error::InvalidField {
        field: "parameters",
        reason: "expected a sequence".into(),
    })?;
    entries
        .iter()
        .map(|entry| {
            let pair = entry.as_sequence().ok_or_else(|| Error::InvalidField {
                field: "parameters[]",
                reason: "expected a key/value pair".into(),
            })?;
            Ok((child_string(pair, 0, "parameters[].key")?, child_string(pair, 1, "parameters[].value")?))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobResponse {
    pub job_id: JobId,
    pub response_code: ResponseCode,
    pub message: String,
}

impl JobResponse {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::JOB_RESPONSE,
            vec![
                Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())),
                self.response_code.encode(),
                Element::OctetString(Bytes::from(self.message.clone().into_bytes())),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 3 {
            return Err(Error::WrongArity { expected_one_of: &[3], got: children.len() });
        }
        Ok(JobResponse {
            job_id: JobId(child_string(children, 0, "jobID")?),
            response_code: ResponseCode::decode(child(children, 1, "responseCode")?)?,
            message: child_string(children, 2, "message")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobControlRequest {
    pub job_id: JobId,
    pub op: JobControlOp,
}

impl JobControlRequest {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::JOB_CONTROL_REQUEST,
            vec![Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())), self.op.encode()],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 2 {
            return Err(Error::WrongArity { expected_one_of: &[2], got: children.len() });
        }
        Ok(JobControlRequest {
            job_id: JobId(child_string(children, 0, "jobID")?),
            op: JobControlOp::decode(child(children, 1, "op")?)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobControlResponse {
    pub job_id: JobId,
    pub response_code: ResponseCode,
    pub message: String,
}

impl JobControlResponse {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::JOB_CONTROL_RESPONSE,
            vec![
                Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())),
                self.response_code.encode(),
                Element::OctetString(Bytes::from(self.message.clone().into_bytes())),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 3 {
            return Err(Error::WrongArity { expected_one_of: &[3], got: children.len() });
        }
        Ok(JobControlResponse {
            job_id: JobId(child_string(children, 0, "jobID")?),
            response_code: ResponseCode::decode(child(children, 1, "responseCode")?)?,
            message: child_string(children, 2, "message")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobCompleted {
    pub job_id: JobId,
    pub job_state: JobState,
    pub actual_start_millis: i64,
    pub actual_stop_millis: i64,
    pub actual_duration_sec: u32,
    pub stat_trackers: Vec<TrackerSnapshot>,
    pub log_messages: Vec<LogMessage>,
}

impl JobCompleted {
    /// `actualStopMillis ≥ actualStartMillis`; `actualDurationSec ==
    /// ⌊(actualStopMillis − actualStartMillis)/1000⌋`.
    pub fn new(
        job_id: JobId,
        job_state: JobState,
        actual_start_millis: i64,
        actual_stop_millis: i64,
        stat_trackers: Vec<TrackerSnapshot>,
        log_messages: Vec<LogMessage>,
    ) -> Self {
        let actual_duration_sec = ((actual_stop_millis - actual_start_millis).max(0) / 1000) as u32;
        JobCompleted {
            job_id,
            job_state,
            actual_start_millis,
            actual_stop_millis,
            actual_duration_sec,
            stat_trackers,
            log_messages,
        }
    }

    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::JOB_COMPLETED,
            vec![
                Element::OctetString(Bytes::from(self.job_id.0.clone().into_bytes())),
                self.job_state.encode(),
                Element::Integer(self.actual_start_millis),
                Element::Integer(self.actual_stop_millis),
                Element::Integer(self.actual_duration_sec as i64),
                Element::Sequence(self.stat_trackers.iter().map(|t| t.encode()).collect()),
                Element::Sequence(self.log_messages.iter().map(|m| m.encode()).collect()),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 7 {
            return Err(Error::WrongArity { expected_one_of: &[7], got: children.len() });
        }
        let stat_trackers = child(children, 5, "statTrackers")?
            .as_sequence()
            .ok_or_else(|| Error::InvalidField { field: "statTrackers", reason: "expected a sequence".into() })?
            .iter()
            .map(|e| TrackerSnapshot::decode(e).map_err(|err| Error::InvalidField {
                field: "statTrackers[]",
                reason: err.to_string(),
            }))
            .collect::<Result<Vec<_>, _>>()?;
        let log_messages = child(children, 6, "logMessages")?
            .as_sequence()
            .ok_or_else(|| Error::InvalidField { field: "logMessages", reason: "expected a sequence".into() })?
            .iter()
            .map(LogMessage::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JobCompleted {
            job_id: JobId(child_string(children, 0, "jobID")?),
            job_state: JobState::decode(child(children, 1, "jobState")?)?,
            actual_start_millis: child_integer(children, 2, "actualStartMillis")?,
            actual_stop_millis: child_integer(children, 3, "actualStopMillis")?,
            actual_duration_sec: child_u32(children, 4, "actualDurationSec")?,
            stat_trackers,
            log_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> JobRequest {
        JobRequest {
            job_id: JobId("J1".into()),
            job_class: "http-get".into(),
            start_millis: 1_700_000_000_000,
            stop_millis: 1_700_000_005_000,
            client_number: 0,
            duration_sec: 5,
            threads_per_client: 2,
            thread_startup_delay_ms: 0,
            collection_interval_sec: 1,
            parameters: vec![("url".into(), "http://example.test".into())],
        }
    }

    #[test]
    fn job_request_round_trip() {
        let req = sample_request();
        let el = req.encode();
        let (tag, children) = el.as_message().unwrap();
        assert_eq!(tag, Tag::JOB_REQUEST);
        assert_eq!(JobRequest::decode(children).unwrap(), req);
    }

    #[test]
    fn job_request_rejects_zero_threads() {
        let mut req = sample_request();
        req.threads_per_client = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn job_request_rejects_zero_interval() {
        let mut req = sample_request();
        req.collection_interval_sec = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn job_completed_duration_is_floor_division() {
        let jc = JobCompleted::new(JobId("J1".into()), JobState::CompletedSuccessfully, 1_000, 3_999, vec![], vec![]);
        assert_eq!(jc.actual_duration_sec, 2);
    }

    #[test]
    fn job_completed_round_trip_with_trackers_and_logs() {
        let jc = JobCompleted::new(
            JobId("J1".into()),
            JobState::StoppedByUser,
            1_000,
            3_000,
            vec![TrackerSnapshot {
                kind: crate::stats::TrackerKind::Integer,
                display_name: "ops".into(),
                client_id: "c1".into(),
                thread_id: 0,
                interval_sec: 1,
                values: vec![1.0, 2.0],
                counts: vec![1, 1],
                categories: vec![],
            }],
            vec![LogMessage { level: "INFO".into(), millis: 1_500, text: "started".into() }],
        );
        let el = jc.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(JobCompleted::decode(children).unwrap(), jc);
    }
}
