//! The two-element wire envelope `{messageID, body}` and the `Body`
//! dispatch enum covering every application-tagged message kind.

use crate::codec::{tag::Tag, Element};

use super::class_transfer::{ClassTransferRequest, ClassTransferResponse};
use super::fleet::{ClientManagerHello, StartClientRequest, StartClientResponse, StopClientRequest, StopClientResponse};
use super::hello::{ClientHello, HelloResponse, ServerHello};
use super::job::{JobCompleted, JobControlRequest, JobControlResponse, JobRequest, JobResponse};
use super::stat::{RegisterStat, ReportStat};
use super::status::{StatusRequest, StatusResponse};
use super::Error;

/// A connection-scoped message identifier. Even on the worker side, odd on
/// the coordinator side; a response carries the same ID as its request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn is_worker_side(self) -> bool {
        self.0 % 2 == 0
    }

    pub fn is_coordinator_side(self) -> bool {
        !self.is_worker_side()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloResponse(HelloResponse),
    JobRequest(JobRequest),
    JobResponse(JobResponse),
    JobControlRequest(JobControlRequest),
    JobControlResponse(JobControlResponse),
    JobCompleted(JobCompleted),
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    ServerShutdown,
    Keepalive,
    ClassTransferRequest(ClassTransferRequest),
    ClassTransferResponse(ClassTransferResponse),
    ClientManagerHello(ClientManagerHello),
    StartClientRequest(StartClientRequest),
    StartClientResponse(StartClientResponse),
    StopClientRequest(StopClientRequest),
    StopClientResponse(StopClientResponse),
    RegisterStat(RegisterStat),
    ReportStat(ReportStat),
}

impl Body {
    pub fn encode(&self) -> Element {
        match self {
            Body::ClientHello(m) => m.encode(),
            Body::ServerHello(m) => m.encode(),
            Body::HelloResponse(m) => m.encode(),
            Body::JobRequest(m) => m.encode(),
            Body::JobResponse(m) => m.encode(),
            Body::JobControlRequest(m) => m.encode(),
            Body::JobControlResponse(m) => m.encode(),
            Body::JobCompleted(m) => m.encode(),
            Body::StatusRequest(m) => m.encode(),
            Body::StatusResponse(m) => m.encode(),
            Body::ServerShutdown => Element::Message(Tag::SERVER_SHUTDOWN, vec![]),
            Body::Keepalive => Element::Message(Tag::KEEPALIVE, vec![]),
            Body::ClassTransferRequest(m) => m.encode(),
            Body::ClassTransferResponse(m) => m.encode(),
            Body::ClientManagerHello(m) => m.encode(),
            Body::StartClientRequest(m) => m.encode(),
            Body::StartClientResponse(m) => m.encode(),
            Body::StopClientRequest(m) => m.encode(),
            Body::StopClientResponse(m) => m.encode(),
            Body::RegisterStat(m) => m.encode(),
            Body::ReportStat(m) => m.encode(),
        }
    }

    pub fn decode(el: &Element) -> Result<Self, Error> {
        let (tag, children) = el.as_message().ok_or_else(|| Error::InvalidField {
            field: "envelope.body",
            reason: "expected a tagged message element".into(),
        })?;
        Ok(match tag {
            Tag::CLIENT_HELLO => Body::ClientHello(ClientHello::decode(children)?),
            Tag::SERVER_HELLO => Body::ServerHello(ServerHello::decode(children)?),
            Tag::HELLO_RESPONSE => Body::HelloResponse(HelloResponse::decode(children)?),
            Tag::JOB_REQUEST => Body::JobRequest(JobRequest::decode(children)?),
            Tag::JOB_RESPONSE => Body::JobResponse(JobResponse::decode(children)?),
            Tag::JOB_CONTROL_REQUEST => Body::JobControlRequest(JobControlRequest::decode(children)?),
            Tag::JOB_CONTROL_RESPONSE => Body::JobControlResponse(JobControlResponse::decode(children)?),
            Tag::JOB_COMPLETED => Body::JobCompleted(JobCompleted::decode(children)?),
            Tag::STATUS_REQUEST => Body::StatusRequest(StatusRequest::decode(children)?),
            Tag::STATUS_RESPONSE => Body::StatusResponse(StatusResponse::decode(children)?),
            Tag::SERVER_SHUTDOWN => Body::ServerShutdown,
            Tag::KEEPALIVE => Body::Keepalive,
            Tag::CLASS_TRANSFER_REQUEST => Body::ClassTransferRequest(ClassTransferRequest::decode(children)?),
            Tag::CLASS_TRANSFER_RESPONSE => Body::ClassTransferResponse(ClassTransferResponse::decode(children)?),
            Tag::CLIENT_MANAGER_HELLO => Body::ClientManagerHello(ClientManagerHello::decode(children)?),
            Tag::START_CLIENT_REQUEST => Body::StartClientRequest(StartClientRequest::decode(children)?),
            Tag::START_CLIENT_RESPONSE => Body::StartClientResponse(StartClientResponse::decode(children)?),
            Tag::STOP_CLIENT_REQUEST => Body::StopClientRequest(StopClientRequest::decode(children)?),
            Tag::STOP_CLIENT_RESPONSE => Body::StopClientResponse(StopClientResponse::decode(children)?),
            Tag::REGISTER_STAT => Body::RegisterStat(RegisterStat::decode(children)?),
            Tag::REPORT_STAT => Body::ReportStat(ReportStat::decode(children)?),
            other => return Err(Error::UnknownTag(other)),
        })
    }
}

/// `{messageID, body}`, the unit of exchange on a control or stat
/// connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub message_id: MessageId,
    pub body: Body,
}

impl Envelope {
    pub fn new(message_id: MessageId, body: Body) -> Self {
        Envelope { message_id, body }
    }

    pub fn encode(&self) -> Element {
        Element::Sequence(vec![Element::Integer(self.message_id.0 as i64), self.body.encode()])
    }

    pub fn decode(el: &Element) -> Result<Self, Error> {
        let children = el.as_sequence().ok_or_else(|| Error::InvalidField {
            field: "envelope",
            reason: "expected a two-element sequence".into(),
        })?;
        if children.len() != 2 {
            return Err(Error::WrongArity { expected_one_of: &[2], got: children.len() });
        }
        let message_id = children[0].as_integer().ok_or_else(|| Error::InvalidField {
            field: "envelope.messageID",
            reason: "expected an integer".into(),
        })?;
        Ok(Envelope { message_id: MessageId(message_id as u64), body: Body::decode(&children[1])? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::codes::ResponseCode;

    #[test]
    fn message_id_parity() {
        assert!(MessageId(0).is_worker_side());
        assert!(MessageId(2).is_worker_side());
        assert!(MessageId(1).is_coordinator_side());
        assert!(MessageId(3).is_coordinator_side());
    }

    #[test]
    fn envelope_round_trip_keepalive() {
        let env = Envelope::new(MessageId(4), Body::Keepalive);
        let el = env.encode();
        assert_eq!(Envelope::decode(&el).unwrap(), env);
    }

    #[test]
    fn envelope_round_trip_server_shutdown() {
        let env = Envelope::new(MessageId(5), Body::ServerShutdown);
        let el = env.encode();
        assert_eq!(Envelope::decode(&el).unwrap(), env);
    }

    #[test]
    fn envelope_round_trip_hello_response() {
        let env = Envelope::new(
            MessageId(1),
            Body::HelloResponse(HelloResponse {
                response_code: ResponseCode::Success,
                message: "welcome".into(),
                server_epoch_millis: Some(1_700_000_000_000),
            }),
        );
        let el = env.encode();
        assert_eq!(Envelope::decode(&el).unwrap(), env);
    }

    #[test]
    fn unknown_tag_is_reported_with_the_offending_tag() {
        let bogus = Element::Sequence(vec![Element::Integer(0), Element::Message(Tag(0x7F), vec![])]);
        match Envelope::decode(&bogus) {
            Err(Error::UnknownTag(tag)) => assert_eq!(tag, Tag(0x7F)),
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }
}
