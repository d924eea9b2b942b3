//! Status-Request and Status-Response.

use bytes::Bytes;

use crate::codec::{tag::Tag, Element};

use super::codes::ResponseCode;
use super::job::JobId;
use super::{child, child_string, Error};

#[derive(Clone, Debug, PartialEq)]
pub struct StatusRequest {
    pub job_id: Option<JobId>,
}

impl StatusRequest {
    pub(super) fn encode(&self) -> Element {
        let children = match &self.job_id {
            Some(id) => vec![Element::OctetString(Bytes::from(id.0.clone().into_bytes()))],
            None => vec![],
        };
        Element::Message(Tag::STATUS_REQUEST, children)
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() > 1 {
            return Err(Error::WrongArity { expected_one_of: &[0, 1], got: children.len() });
        }
        let job_id = match children.first() {
            Some(_) => Some(JobId(child_string(children, 0, "jobID")?)),
            None => None,
        };
        Ok(StatusRequest { job_id })
    }
}

/// Positional layout is deliberately four *distinct* slots
/// (`responseCode`, `clientState`, `clientMessage`, optional `jobStatus`).
#[derive(Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub response_code: ResponseCode,
    pub client_state: String,
    pub client_message: String,
    pub job_status: Option<String>,
}

impl StatusResponse {
    pub(super) fn encode(&self) -> Element {
        let mut children = vec![
            self.response_code.encode(),
            Element::OctetString(Bytes::from(self.client_state.clone().into_bytes())),
            Element::OctetString(Bytes::from(self.client_message.clone().into_bytes())),
        ];
        if let Some(status) = &self.job_status {
            children.push(Element::OctetString(Bytes::from(status.clone().into_bytes())));
        }
        Element::Message(Tag::STATUS_RESPONSE, children)
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if !(3..=4).contains(&children.len()) {
            return Err(Error::WrongArity { expected_one_of: &[3, 4], got: children.len() });
        }
        Ok(StatusResponse {
            response_code: ResponseCode::decode(child(children, 0, "responseCode")?)?,
            client_state: child_string(children, 1, "clientState")?,
            client_message: child_string(children, 2, "clientMessage")?,
            job_status: match children.get(3) {
                Some(_) => Some(child_string(children, 3, "jobStatus")?),
                None => None,
            },
        })
    }
}
