//! Shared enumerations carried by several message kinds: response codes,
//! job states, and job control operations.

use crate::codec::Element;

use super::Error;

macro_rules! wire_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn to_i64(self) -> i64 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            pub fn from_i64(v: i64) -> Result<Self, Error> {
                match v {
                    $($value => Ok(Self::$variant),)+
                    other => Err(Error::InvalidField {
                        field: stringify!($name),
                        reason: format!("unrecognised value {other}"),
                    }),
                }
            }

            pub fn encode(self) -> Element {
                Element::Integer(self.to_i64())
            }

            pub fn decode(el: &Element) -> Result<Self, Error> {
                let v = el.as_integer().ok_or_else(|| Error::InvalidField {
                    field: stringify!($name),
                    reason: "expected an integer element".into(),
                })?;
                Self::from_i64(v)
            }
        }
    };
}

wire_enum!(ResponseCode {
    Success = 0,
    UnknownAuthId = 1,
    InvalidCredentials = 2,
    UnsupportedAuthType = 3,
    UnsupportedClientVersion = 4,
    UnsupportedServerVersion = 5,
    ClientRejected = 6,
    NoSuchJob = 7,
    UnsupportedControlType = 8,
    LocalError = 9,
    UnsupportedJobClass = 10,
    InvalidParameters = 11,
    ClientBusy = 12,
});

impl ResponseCode {
    /// Response codes that terminate the session without retry.
    pub fn terminates_session(self) -> bool {
        matches!(
            self,
            ResponseCode::UnknownAuthId
                | ResponseCode::InvalidCredentials
                | ResponseCode::UnsupportedAuthType
                | ResponseCode::UnsupportedClientVersion
                | ResponseCode::UnsupportedServerVersion
                | ResponseCode::ClientRejected
        )
    }
}

wire_enum!(JobState {
    Uninitialized = 0,
    NotYetStarted = 1,
    Running = 2,
    Stopping = 3,
    CompletedSuccessfully = 4,
    CompletedWithErrors = 5,
    StoppedByUser = 6,
    StoppedDueToError = 7,
    StoppedDueToShutdown = 8,
});

wire_enum!(JobControlOp {
    Start = 0,
    Stop = 1,
    StopAndWait = 2,
    StopDueToShutdown = 3,
});

wire_enum!(AuthType {
    None = 0,
    Simple = 1,
});

impl Default for AuthType {
    fn default() -> Self {
        AuthType::None
    }
}

// AuthType crosses the wire as a TLV integer but reads as a plain name in
// the YAML config surface.
impl serde::Serialize for AuthType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AuthType::None => serializer.serialize_str("none"),
            AuthType::Simple => serializer.serialize_str("simple"),
        }
    }
}

impl<'de> serde::Deserialize<'de> for AuthType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "none" => Ok(AuthType::None),
            "simple" => Ok(AuthType::Simple),
            other => Err(serde::de::Error::custom(format!("unknown auth_type `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_round_trip() {
        for code in [
            ResponseCode::Success,
            ResponseCode::UnknownAuthId,
            ResponseCode::ClientBusy,
        ] {
            let el = code.encode();
            assert_eq!(ResponseCode::decode(&el).unwrap(), code);
        }
    }

    #[test]
    fn terminal_response_codes() {
        assert!(ResponseCode::UnsupportedClientVersion.terminates_session());
        assert!(!ResponseCode::NoSuchJob.terminates_session());
    }

    #[test]
    fn job_control_op_round_trip() {
        for op in [
            JobControlOp::Start,
            JobControlOp::Stop,
            JobControlOp::StopAndWait,
            JobControlOp::StopDueToShutdown,
        ] {
            assert_eq!(JobControlOp::decode(&op.encode()).unwrap(), op);
        }
    }
}
