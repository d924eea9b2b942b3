//! Class-Transfer-Request/Response: probe/workload code distribution
//! against the probe roster.

use bytes::Bytes;

use crate::codec::{tag::Tag, Element};

use super::codes::ResponseCode;
use super::{child, child_bytes, child_string, Error};

#[derive(Clone, Debug, PartialEq)]
pub struct ClassTransferRequest {
    pub class_name: String,
}

impl ClassTransferRequest {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::CLASS_TRANSFER_REQUEST,
            vec![Element::OctetString(Bytes::from(self.class_name.clone().into_bytes()))],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 1 {
            return Err(Error::WrongArity { expected_one_of: &[1], got: children.len() });
        }
        Ok(ClassTransferRequest { class_name: child_string(children, 0, "className")? })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassTransferResponse {
    pub response_code: ResponseCode,
    pub class_name: String,
    pub class_data: Bytes,
}

impl ClassTransferResponse {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::CLASS_TRANSFER_RESPONSE,
            vec![
                self.response_code.encode(),
                Element::OctetString(Bytes::from(self.class_name.clone().into_bytes())),
                Element::OctetString(self.class_data.clone()),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 3 {
            return Err(Error::WrongArity { expected_one_of: &[3], got: children.len() });
        }
        Ok(ClassTransferResponse {
            response_code: ResponseCode::decode(child(children, 0, "responseCode")?)?,
            class_name: child_string(children, 1, "className")?,
            class_data: child_bytes(children, 2, "classData")?.clone(),
        })
    }
}
