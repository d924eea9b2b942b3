//! Application and universal tag bytes for the TLV codec.
//!
//! The top two bits of a tag byte select the class (universal vs
//! application), bit 6 marks constructed content, and the low five bits are
//! the type number within that class. Application tags name message bodies
//! and are taken verbatim from the wire table; universal tags cover the
//! primitive scalar kinds and the generic nested-sequence composite.

pub const CLASS_MASK: u8 = 0b1100_0000;
pub const CLASS_UNIVERSAL: u8 = 0b0000_0000;
pub const CLASS_APPLICATION: u8 = 0b0100_0000;
pub const CONSTRUCTED_FLAG: u8 = 0b0010_0000;
pub const NUMBER_MASK: u8 = 0b0001_1111;

pub const UNIVERSAL_BOOLEAN: u8 = CLASS_UNIVERSAL | 0x01;
pub const UNIVERSAL_INTEGER: u8 = CLASS_UNIVERSAL | 0x02;
pub const UNIVERSAL_OCTET_STRING: u8 = CLASS_UNIVERSAL | 0x04;
pub const UNIVERSAL_NULL: u8 = CLASS_UNIVERSAL | 0x05;
pub const UNIVERSAL_SEQUENCE: u8 = CLASS_UNIVERSAL | CONSTRUCTED_FLAG | 0x10;

pub fn is_application(tag: u8) -> bool {
    tag & CLASS_MASK == CLASS_APPLICATION
}

pub fn is_universal(tag: u8) -> bool {
    tag & CLASS_MASK == CLASS_UNIVERSAL
}

pub fn type_number(tag: u8) -> u8 {
    CLASS_UNIVERSAL | (tag & NUMBER_MASK)
}

/// An application-class tag naming a message kind, or a raw universal tag
/// carried alongside a decoded [`super::element::Element::Message`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Tag(pub u8);

impl Tag {
    pub const CLIENT_HELLO: Tag = Tag(0x60);
    pub const SERVER_HELLO: Tag = Tag(0x61);
    pub const HELLO_RESPONSE: Tag = Tag(0x62);
    pub const JOB_REQUEST: Tag = Tag(0x63);
    pub const JOB_RESPONSE: Tag = Tag(0x64);
    pub const JOB_CONTROL_REQUEST: Tag = Tag(0x65);
    pub const JOB_CONTROL_RESPONSE: Tag = Tag(0x66);
    pub const JOB_COMPLETED: Tag = Tag(0x67);
    pub const STATUS_REQUEST: Tag = Tag(0x68);
    pub const STATUS_RESPONSE: Tag = Tag(0x69);
    pub const SERVER_SHUTDOWN: Tag = Tag(0x4A);
    pub const KEEPALIVE: Tag = Tag(0x4B);
    pub const CLASS_TRANSFER_REQUEST: Tag = Tag(0x4C);
    pub const CLASS_TRANSFER_RESPONSE: Tag = Tag(0x6D);
    pub const CLIENT_MANAGER_HELLO: Tag = Tag(0x6E);
    pub const START_CLIENT_REQUEST: Tag = Tag(0x6F);
    pub const START_CLIENT_RESPONSE: Tag = Tag(0x70);
    pub const STOP_CLIENT_REQUEST: Tag = Tag(0x51);
    pub const STOP_CLIENT_RESPONSE: Tag = Tag(0x72);
    pub const REGISTER_STAT: Tag = Tag(0x73);
    pub const REPORT_STAT: Tag = Tag(0x74);

    pub fn byte(self) -> u8 {
        self.0
    }
}
