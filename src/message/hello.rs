//! Client-Hello, Server-Hello, and Hello-Response.

use bytes::Bytes;

use crate::codec::{tag::Tag, Element};

use super::{child, child_bytes, child_string, codes::AuthType, child_integer, Error};

#[derive(Clone, Debug, PartialEq)]
pub struct AuthInfo {
    pub auth_type: AuthType,
    pub id: String,
    pub credentials: Bytes,
}

impl AuthInfo {
    fn encode(&self) -> Element {
        Element::Sequence(vec![
            self.auth_type.encode(),
            Element::OctetString(Bytes::from(self.id.clone().into_bytes())),
            Element::OctetString(self.credentials.clone()),
        ])
    }

    fn decode(el: &Element) -> Result<Self, Error> {
        let children = el.as_sequence().ok_or_else(|| Error::InvalidField {
            field: "auth",
            reason: "expected a nested sequence".into(),
        })?;
        Ok(AuthInfo {
            auth_type: AuthType::decode(child(children, 0, "auth.type")?)?,
            id: child_string(children, 1, "auth.id")?,
            credentials: child_bytes(children, 2, "auth.credentials")?.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientHello {
    pub client_version: i64,
    pub client_id: String,
    pub auth: Option<AuthInfo>,
    pub request_server_auth: bool,
    pub restricted_mode: bool,
    pub supports_time_sync: bool,
}

impl ClientHello {
    pub(super) fn encode(&self) -> Element {
        let mut children = vec![
            Element::Integer(self.client_version),
            Element::OctetString(Bytes::from(self.client_id.clone().into_bytes())),
        ];
        if self.auth.is_some() || self.request_server_auth || self.restricted_mode || self.supports_time_sync {
            children.push(match &self.auth {
                Some(a) => a.encode(),
                None => Element::Null,
            });
        }
        if self.request_server_auth || self.restricted_mode || self.supports_time_sync {
            children.push(Element::Boolean(self.request_server_auth));
        }
        if self.restricted_mode || self.supports_time_sync {
            children.push(Element::Boolean(self.restricted_mode));
        }
        if self.supports_time_sync {
            children.push(Element::Boolean(self.supports_time_sync));
        }
        Element::Message(Tag::CLIENT_HELLO, children)
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if !(2..=6).contains(&children.len()) {
            return Err(Error::WrongArity { expected_one_of: &[2, 3, 4, 5, 6], got: children.len() });
        }
        let client_version = child_integer(children, 0, "clientVersion")?;
        let client_id = child_string(children, 1, "clientID")?;
        let auth = match children.get(2) {
            Some(Element::Null) | None => None,
            Some(el) => Some(AuthInfo::decode(el)?),
        };
        let request_server_auth = children.get(3).map(|_| child_bool_at(children, 3)).transpose()?.unwrap_or(false);
        let restricted_mode = children.get(4).map(|_| child_bool_at(children, 4)).transpose()?.unwrap_or(false);
        let supports_time_sync = children.get(5).map(|_| child_bool_at(children, 5)).transpose()?.unwrap_or(false);

        Ok(ClientHello {
            client_version,
            client_id,
            auth,
            request_server_auth,
            restricted_mode,
            supports_time_sync,
        })
    }
}

fn child_bool_at(children: &[Element], idx: usize) -> Result<bool, Error> {
    children[idx].as_boolean().ok_or(Error::InvalidField {
        field: "clientHello flag",
        reason: "expected a boolean".into(),
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHello {
    pub server_version: i64,
    pub server_id: String,
    pub auth: Option<AuthInfo>,
}

impl ServerHello {
    pub(super) fn encode(&self) -> Element {
        let mut children = vec![
            Element::Integer(self.server_version),
            Element::OctetString(Bytes::from(self.server_id.clone().into_bytes())),
        ];
        if let Some(auth) = &self.auth {
            children.push(auth.encode());
        }
        Element::Message(Tag::SERVER_HELLO, children)
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if !(2..=3).contains(&children.len()) {
            return Err(Error::WrongArity { expected_one_of: &[2, 3], got: children.len() });
        }
        Ok(ServerHello {
            server_version: child_integer(children, 0, "serverVersion")?,
            server_id: child_string(children, 1, "serverID")?,
            auth: match children.get(2) {
                Some(el) => Some(AuthInfo::decode(el)?),
                None => None,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HelloResponse {
    pub response_code: super::codes::ResponseCode,
    pub message: String,
    /// Carried on the wire as the ASCII decimal digits of the epoch
    /// millisecond count inside an octet string.
    pub server_epoch_millis: Option<i64>,
}

impl HelloResponse {
    pub(super) fn encode(&self) -> Element {
        let mut children = vec![
            self.response_code.encode(),
            Element::OctetString(Bytes::from(self.message.clone().into_bytes())),
        ];
        if let Some(epoch) = self.server_epoch_millis {
            children.push(Element::OctetString(Bytes::from(epoch.to_string().into_bytes())));
        }
        Element::Message(Tag::HELLO_RESPONSE, children)
    }

    pub(super) fn decode(children: &[Element]) -> Result<Self, Error> {
        if !(2..=3).contains(&children.len()) {
            return Err(Error::WrongArity { expected_one_of: &[2, 3], got: children.len() });
        }
        let response_code = super::codes::ResponseCode::decode(child(children, 0, "responseCode")?)?;
        let message = child_string(children, 1, "message")?;
        let server_epoch_millis = match children.get(2) {
            Some(el) => {
                let digits = el.as_octet_string().ok_or_else(|| Error::InvalidField {
                    field: "serverEpochMillis",
                    reason: "expected an octet string of ASCII decimal digits".into(),
                })?;
                let s = std::str::from_utf8(digits).map_err(|_| Error::InvalidField {
                    field: "serverEpochMillis",
                    reason: "not valid utf-8".into(),
                })?;
                Some(s.parse::<i64>().map_err(|_| Error::InvalidField {
                    field: "serverEpochMillis",
                    reason: "not a signed decimal integer".into(),
                })?)
            },
            None => None,
        };
        Ok(HelloResponse { response_code, message, server_epoch_millis })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::codes::ResponseCode;

    #[test]
    fn client_hello_minimal_round_trip() {
        let msg = ClientHello {
            client_version: 3,
            client_id: "worker-1".into(),
            auth: None,
            request_server_auth: false,
            restricted_mode: false,
            supports_time_sync: false,
        };
        let el = msg.encode();
        let (tag, children) = el.as_message().unwrap();
        assert_eq!(tag, Tag::CLIENT_HELLO);
        assert_eq!(children.len(), 2);
        assert_eq!(ClientHello::decode(children).unwrap(), msg);
    }

    #[test]
    fn client_hello_full_round_trip() {
        let msg = ClientHello {
            client_version: 3,
            client_id: "worker-1".into(),
            auth: Some(AuthInfo {
                auth_type: AuthType::Simple,
                id: "svc".into(),
                credentials: Bytes::from_static(b"secret"),
            }),
            request_server_auth: true,
            restricted_mode: false,
            supports_time_sync: true,
        };
        let el = msg.encode();
        let (_, children) = el.as_message().unwrap();
        assert_eq!(children.len(), 6);
        assert_eq!(ClientHello::decode(children).unwrap(), msg);
    }

    #[test]
    fn hello_response_carries_epoch_as_digit_string() {
        let msg = HelloResponse {
            response_code: ResponseCode::Success,
            message: "ok".into(),
            server_epoch_millis: Some(1_700_000_000_123),
        };
        let el = msg.encode();
        let (_, children) = el.as_message().unwrap();
        let raw = children[2].as_octet_string().unwrap();
        assert_eq!(raw.as_ref(), b"1700000000123");
        assert_eq!(HelloResponse::decode(children).unwrap(), msg);
    }
}
