//! Wire format of the drdynvc sub-protocol.
//!
//! Every message starts with a one-byte header: the command in the high
//! nibble, the channel-id field width in the low two bits (layout after the
//! `Cmd`/`cbId` split of [MS-RDPEDYC]).

use bit_field::BitField as _;
use opalrdp_core::{
    ensure_size, invalid_field_err, unexpected_message_type_err, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

pub const DVC_CREATION_STATUS_OK: u32 = 0x0000_0000;
pub const DVC_CREATION_STATUS_NO_LISTENER: u32 = 0xC000_0001;

const HEADER_SIZE: usize = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    CreateRequest = 0x01,
    CreateResponse = 0x02,
    OpenRequest = 0x03,
    OpenResponse = 0x04,
    CloseRequest = 0x05,
    CloseResponse = 0x06,
    DataFirst = 0x07,
    Data = 0x08,
    DataLast = 0x09,
    DataFirstLast = 0x0A,
}

impl Cmd {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::CreateRequest),
            0x02 => Some(Self::CreateResponse),
            0x03 => Some(Self::OpenRequest),
            0x04 => Some(Self::OpenResponse),
            0x05 => Some(Self::CloseRequest),
            0x06 => Some(Self::CloseResponse),
            0x07 => Some(Self::DataFirst),
            0x08 => Some(Self::Data),
            0x09 => Some(Self::DataLast),
            0x0A => Some(Self::DataFirstLast),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Width of the variable-size channel id field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    U8 = 0x00,
    U16 = 0x01,
    U32 = 0x02,
}

impl FieldType {
    pub fn for_value(value: u32) -> Self {
        if value <= 0xFF {
            Self::U8
        } else if value <= 0xFFFF {
            Self::U16
        } else {
            Self::U32
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::U8),
            0x01 => Some(Self::U16),
            0x02 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn read(self, src: &mut ReadCursor<'_>) -> DecodeResult<u32> {
        ensure_size!(ctx: "FieldType::read", in: src, size: self.size());

        let value = match self {
            Self::U8 => u32::from(src.read_u8()),
            Self::U16 => u32::from(src.read_u16()),
            Self::U32 => src.read_u32(),
        };

        Ok(value)
    }

    pub fn write(self, dst: &mut WriteCursor<'_>, value: u32) {
        match self {
            Self::U8 => dst.write_u8(value as u8),
            Self::U16 => dst.write_u16(value as u16),
            Self::U32 => dst.write_u32(value),
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

fn write_header(dst: &mut WriteCursor<'_>, cmd: Cmd, field_type: FieldType) {
    let mut header = 0u8;
    header.set_bits(0..2, field_type as u8);
    header.set_bits(4..8, cmd.as_u8());
    dst.write_u8(header);
}

/// Server-to-client drdynvc message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPdu<'a> {
    CreateRequest {
        channel_id: u32,
        channel_name: String,
    },
    OpenRequest {
        channel_id: u32,
    },
    CloseRequest {
        channel_id: u32,
    },
    DataFirst {
        channel_id: u32,
        total_length: u32,
        data: &'a [u8],
    },
    Data {
        channel_id: u32,
        data: &'a [u8],
    },
    DataLast {
        channel_id: u32,
        data: &'a [u8],
    },
    DataFirstLast {
        channel_id: u32,
        data: &'a [u8],
    },
}

impl<'a> ServerPdu<'a> {
    const NAME: &'static str = "DvcServerPdu";

    pub fn channel_id(&self) -> u32 {
        match self {
            Self::CreateRequest { channel_id, .. }
            | Self::OpenRequest { channel_id }
            | Self::CloseRequest { channel_id }
            | Self::DataFirst { channel_id, .. }
            | Self::Data { channel_id, .. }
            | Self::DataLast { channel_id, .. }
            | Self::DataFirstLast { channel_id, .. } => *channel_id,
        }
    }

    pub fn decode(src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: HEADER_SIZE);

        let header = src.read_u8();
        let field_type = FieldType::from_u8(header.get_bits(0..2))
            .ok_or_else(|| invalid_field_err(Self::NAME, "cbId", "invalid channel id width"))?;
        let cmd = Cmd::from_u8(header.get_bits(4..8)).ok_or_else(|| unexpected_message_type_err(Self::NAME, header))?;

        let channel_id = field_type.read(src)?;

        let pdu = match cmd {
            Cmd::CreateRequest => {
                let name_bytes = src.read_remaining();
                let terminator = name_bytes.iter().position(|b| *b == 0).unwrap_or(name_bytes.len());
                let channel_name = core::str::from_utf8(&name_bytes[..terminator])
                    .map_err(|_| invalid_field_err(Self::NAME, "channelName", "not valid UTF-8"))?
                    .to_owned();

                Self::CreateRequest {
                    channel_id,
                    channel_name,
                }
            }
            Cmd::OpenRequest => Self::OpenRequest { channel_id },
            Cmd::CloseRequest => Self::CloseRequest { channel_id },
            Cmd::DataFirst => {
                ensure_size!(ctx: Self::NAME, in: src, size: 4);
                let total_length = src.read_u32();
                Self::DataFirst {
                    channel_id,
                    total_length,
                    data: src.read_remaining(),
                }
            }
            Cmd::Data => Self::Data {
                channel_id,
                data: src.read_remaining(),
            },
            Cmd::DataLast => Self::DataLast {
                channel_id,
                data: src.read_remaining(),
            },
            Cmd::DataFirstLast => Self::DataFirstLast {
                channel_id,
                data: src.read_remaining(),
            },
            Cmd::CreateResponse | Cmd::OpenResponse | Cmd::CloseResponse => {
                return Err(unexpected_message_type_err(Self::NAME, cmd.as_u8()));
            }
        };

        Ok(pdu)
    }
}

/// Client-to-server drdynvc message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPdu<'a> {
    CreateResponse { channel_id: u32, creation_status: u32 },
    OpenResponse { channel_id: u32, status: u32 },
    CloseResponse { channel_id: u32 },
    DataFirst { channel_id: u32, total_length: u32, data: &'a [u8] },
    Data { channel_id: u32, data: &'a [u8] },
    DataLast { channel_id: u32, data: &'a [u8] },
    DataFirstLast { channel_id: u32, data: &'a [u8] },
}

impl ClientPdu<'_> {
    const NAME: &'static str = "DvcClientPdu";

    fn cmd(&self) -> Cmd {
        match self {
            Self::CreateResponse { .. } => Cmd::CreateResponse,
            Self::OpenResponse { .. } => Cmd::OpenResponse,
            Self::CloseResponse { .. } => Cmd::CloseResponse,
            Self::DataFirst { .. } => Cmd::DataFirst,
            Self::Data { .. } => Cmd::Data,
            Self::DataLast { .. } => Cmd::DataLast,
            Self::DataFirstLast { .. } => Cmd::DataFirstLast,
        }
    }

    fn channel_id(&self) -> u32 {
        match self {
            Self::CreateResponse { channel_id, .. }
            | Self::OpenResponse { channel_id, .. }
            | Self::CloseResponse { channel_id }
            | Self::DataFirst { channel_id, .. }
            | Self::Data { channel_id, .. }
            | Self::DataLast { channel_id, .. }
            | Self::DataFirstLast { channel_id, .. } => *channel_id,
        }
    }

    fn field_type(&self) -> FieldType {
        FieldType::for_value(self.channel_id())
    }
}

impl Encode for ClientPdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let field_type = self.field_type();
        write_header(dst, self.cmd(), field_type);
        field_type.write(dst, self.channel_id());

        match self {
            Self::CreateResponse { creation_status, .. } => dst.write_u32(*creation_status),
            Self::OpenResponse { status, .. } => dst.write_u32(*status),
            Self::CloseResponse { .. } => {}
            Self::DataFirst { total_length, data, .. } => {
                dst.write_u32(*total_length);
                dst.write_slice(data);
            }
            Self::Data { data, .. } | Self::DataLast { data, .. } | Self::DataFirstLast { data, .. } => {
                dst.write_slice(data);
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE
            + self.field_type().size()
            + match self {
                Self::CreateResponse { .. } | Self::OpenResponse { .. } => 4,
                Self::CloseResponse { .. } => 0,
                Self::DataFirst { data, .. } => 4 + data.len(),
                Self::Data { data, .. } | Self::DataLast { data, .. } | Self::DataFirstLast { data, .. } => data.len(),
            }
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::encode_vec;

    use super::*;

    #[test]
    fn create_request_is_decoded() {
        // header: cmd=CreateRequest, cbId=U8; id=42; name="FOO\0"
        let payload = [0x10, 42, b'F', b'O', b'O', 0];

        let pdu = ServerPdu::decode(&mut ReadCursor::new(&payload)).unwrap();
        assert_eq!(
            pdu,
            ServerPdu::CreateRequest {
                channel_id: 42,
                channel_name: "FOO".to_owned(),
            }
        );
    }

    #[test]
    fn create_response_encodes_header_and_status() {
        let pdu = ClientPdu::CreateResponse {
            channel_id: 42,
            creation_status: DVC_CREATION_STATUS_OK,
        };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x20, 42, 0, 0, 0, 0]);
    }

    #[test]
    fn wide_channel_ids_grow_the_id_field() {
        let pdu = ClientPdu::CloseResponse { channel_id: 0x1_0000 };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded[0] & 0b11, FieldType::U32 as u8);
        assert_eq!(encoded.len(), 1 + 4);
    }

    #[test]
    fn data_first_carries_total_length() {
        let payload = [0x71, 0x02, 0x01, 16, 0, 0, 0, 0xAA, 0xBB];

        let pdu = ServerPdu::decode(&mut ReadCursor::new(&payload)).unwrap();
        assert_eq!(
            pdu,
            ServerPdu::DataFirst {
                channel_id: 0x0102,
                total_length: 16,
                data: &[0xAA, 0xBB],
            }
        );
    }
}
