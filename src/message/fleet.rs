//! Client-Manager-Hello, Start-Client-Request/Response,
//! Stop-Client-Request/Response: fleet-level lifecycle used by a per-host
//! supervisor managing several worker processes.

use bytes::Bytes;

use crate::codec::{tag::Tag, Element};

use super::codes::ResponseCode;
use super::{child, child_integer, child_string, Error};

#[derive(Clone, Debug, PartialEq)]
pub struct ClientManagerHello {
    pub manager_version: i64,
    pub manager_id: String,
    /// client IDs the manager currently supervises.
    pub managed_client_ids: Vec<String>,
}

impl ClientManagerHello {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::CLIENT_MANAGER_HELLO,
            vec![
                Element::Integer(self.manager_version),
                Element::OctetString(Bytes::from(self.manager_id.clone().into_bytes())),
                Element::Sequence(
                    self.managed_client_ids
                        .iter()
                        .map(|id| Element::OctetString(Bytes::from(id.clone().into_bytes())))
                        .collect(),
                ),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 3 {
            return Err(Error::WrongArity { expected_one_of: &[3], got: children.len() });
        }
        let ids = child(children, 2, "managedClientIDs")?
            .as_sequence()
            .ok_or_else(|| Error::InvalidField {
                field: "managedClientIDs",
                reason: "expected a sequence".into(),
            })?
            .iter()
            .map(|el| {
                el.as_octet_string()
                    .ok_or_else(|| Error::InvalidField {
                        field: "managedClientIDs[]",
                        reason: "expected an octet string".into(),
                    })
                    .and_then(|b| {
                        String::from_utf8(b.to_vec()).map_err(|_| Error::InvalidField {
                            field: "managedClientIDs[]",
                            reason: "not valid utf-8".into(),
                        })
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClientManagerHello {
            manager_version: child_integer(children, 0, "managerVersion")?,
            manager_id: child_string(children, 1, "managerID")?,
            managed_client_ids: ids,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartClientRequest {
    pub client_id: String,
}

impl StartClientRequest {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::START_CLIENT_REQUEST,
            vec![Element::OctetString(Bytes::from(self.client_id.clone().into_bytes()))],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 1 {
            return Err(Error::WrongArity { expected_one_of: &[1], got: children.len() });
        }
        Ok(StartClientRequest { client_id: child_string(children, 0, "clientID")? })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartClientResponse {
    pub client_id: String,
    pub response_code: ResponseCode,
    pub message: String,
}

impl StartClientResponse {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::START_CLIENT_RESPONSE,
            vec![
                Element::OctetString(Bytes::from(self.client_id.clone().into_bytes())),
                self.response_code.encode(),
                Element::OctetString(Bytes::from(self.message.clone().into_bytes())),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 3 {
            return Err(Error::WrongArity { expected_one_of: &[3], got: children.len() });
        }
        Ok(StartClientResponse {
            client_id: child_string(children, 0, "clientID")?,
            response_code: ResponseCode::decode(child(children, 1, "responseCode")?)?,
            message: child_string(children, 2, "message")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StopClientRequest {
    pub client_id: String,
}

impl StopClientRequest {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::STOP_CLIENT_REQUEST,
            vec![Element::OctetString(Bytes::from(self.client_id.clone().into_bytes()))],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 1 {
            return Err(Error::WrongArity { expected_one_of: &[1], got: children.len() });
        }
        Ok(StopClientRequest { client_id: child_string(children, 0, "clientID")? })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StopClientResponse {
    pub client_id: String,
    pub response_code: ResponseCode,
    pub message: String,
}

impl StopClientResponse {
    pub(super) fn encode(&self) -> Element {
        Element::Message(
            Tag::STOP_CLIENT_RESPONSE,
            vec![
                Element::OctetString(Bytes::from(self.client_id.clone().into_bytes())),
                self.response_code.encode(),
                Element::OctetString(Bytes::from(self.message.clone().into_bytes())),
            ],
        )
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if children.len() != 3 {
            return Err(Error::WrongArity { expected_one_of: &[3], got: children.len() });
        }
        Ok(StopClientResponse {
            client_id: child_string(children, 0, "clientID")?,
            response_code: ResponseCode::decode(child(children, 1, "responseCode")?)?,
            message: child_string(children, 2, "message")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_manager_hello_round_trip() {
        let msg = ClientManagerHello {
            manager_version: 1,
            manager_id: "host-a-manager".into(),
            managed_client_ids: vec!["worker-1".into(), "worker-2".into()],
        };
        let el = msg.encode();
        let (tag, children) = el.as_message().unwrap();
        assert_eq!(tag, Tag::CLIENT_MANAGER_HELLO);
        assert_eq!(ClientManagerHello::decode(children).unwrap(), msg);
    }

    #[test]
    fn client_manager_hello_round_trips_with_no_managed_clients() {
        let msg = ClientManagerHello { manager_version: 1, manager_id: "host-a".into(), managed_client_ids: vec![] };
        let el = msg.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(ClientManagerHello::decode(children).unwrap(), msg);
    }

    #[test]
    fn start_and_stop_client_round_trip() {
        let start_req = StartClientRequest { client_id: "worker-1".into() };
        let el = start_req.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(StartClientRequest::decode(children).unwrap(), start_req);

        let start_resp = StartClientResponse {
            client_id: "worker-1".into(),
            response_code: ResponseCode::Success,
            message: "started".into(),
        };
        let el = start_resp.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(StartClientResponse::decode(children).unwrap(), start_resp);

        let stop_req = StopClientRequest { client_id: "worker-1".into() };
        let el = stop_req.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(StopClientRequest::decode(children).unwrap(), stop_req);

        let stop_resp = StopClientResponse {
            client_id: "worker-1".into(),
            response_code: ResponseCode::Success,
            message: "stopped".into(),
        };
        let el = stop_resp.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(StopClientResponse::decode(children).unwrap(), stop_resp);
    }
}
