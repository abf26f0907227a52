//! GCC Conference Create Request / Response wrapping (T.124 with the
//! [MS-RDPBCGR] user-data profile).

use opalrdp_core::{
    cast_length, ensure_size, invalid_field_err, other_err_with_source, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

use super::{ClientGccBlocks, ServerGccBlocks};
use crate::per;

const CONFERENCE_REQUEST_OBJECT_ID: [u8; 6] = [0, 0, 20, 124, 0, 1];
const CONFERENCE_REQUEST_CLIENT_TO_SERVER_H221_NON_STANDARD: &[u8; 4] = b"Duca";
const CONFERENCE_REQUEST_SERVER_TO_CLIENT_H221_NON_STANDARD: &[u8; 4] = b"McDn";
const CONFERENCE_REQUEST_U16_MIN: u16 = 1001;

const CONFERENCE_REQUEST_CONNECT_PDU_SIZE: usize = 12;
const CONFERENCE_RESPONSE_CONNECT_PDU_SIZE: usize = 13;
const OBJECT_IDENTIFIER_KEY: u8 = 0;
const CONNECT_GCC_PDU_CONFERENCE_REQUEST_CHOICE: u8 = 0;
const CONNECT_GCC_PDU_CONFERENCE_RESPONSE_CHOICE: u8 = 0x14;
const CONFERENCE_REQUEST_USER_DATA_SELECTION: u8 = 8;
const USER_DATA_NUMBER_OF_SETS: u8 = 1;
const USER_DATA_H221_NON_STANDARD_CHOICE: u8 = 0xC0;
const CONFERENCE_RESPONSE_TAG: u32 = 1;
const CONFERENCE_RESPONSE_RESULT: u8 = 0;
const H221_NON_STANDARD_MIN_LENGTH: usize = 4;
const CONFERENCE_NAME: &[u8] = b"1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConferenceCreateRequest {
    pub gcc_blocks: ClientGccBlocks,
}

impl ConferenceCreateRequest {
    const NAME: &'static str = "ConferenceCreateRequest";
}

impl Encode for ConferenceCreateRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let gcc_blocks_buffer_length = self.gcc_blocks.size();

        // ConnectData::Key: select type OBJECT_IDENTIFIER
        per::write_choice(dst, OBJECT_IDENTIFIER_KEY);
        per::write_object_id(dst, CONFERENCE_REQUEST_OBJECT_ID);

        // ConnectData::connectPDU: length
        per::write_length(
            dst,
            cast_length!(
                Self::NAME,
                "connectPduLen",
                gcc_blocks_buffer_length + CONFERENCE_REQUEST_CONNECT_PDU_SIZE
            )?,
        );
        // ConnectGCCPDU (CHOICE): select conferenceCreateRequest
        per::write_choice(dst, CONNECT_GCC_PDU_CONFERENCE_REQUEST_CHOICE);
        // ConferenceCreateRequest::Selection: select optional userData
        per::write_selection(dst, CONFERENCE_REQUEST_USER_DATA_SELECTION);
        per::write_numeric_string(dst, CONFERENCE_NAME, 1).map_err(|e| other_err_with_source(Self::NAME, "confName", e))?;
        per::write_padding(dst, 1);
        // UserData (SET OF SEQUENCE), one set, select h221NonStandard
        per::write_number_of_sets(dst, USER_DATA_NUMBER_OF_SETS);
        per::write_choice(dst, USER_DATA_H221_NON_STANDARD_CHOICE);
        // h221NonStandard: client-to-server H.221 key, "Duca"
        per::write_octet_string(
            dst,
            CONFERENCE_REQUEST_CLIENT_TO_SERVER_H221_NON_STANDARD,
            H221_NON_STANDARD_MIN_LENGTH,
        )
        .map_err(|e| other_err_with_source(Self::NAME, "h221Key", e))?;
        // H221NonStandardIdentifier (octet string)
        per::write_length(dst, cast_length!(Self::NAME, "gccBlocksLen", gcc_blocks_buffer_length)?);
        self.gcc_blocks.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let gcc_blocks_buffer_length = self.gcc_blocks.size();
        let connect_pdu_length = CONFERENCE_REQUEST_CONNECT_PDU_SIZE + gcc_blocks_buffer_length;

        per::CHOICE_SIZE
            + CONFERENCE_REQUEST_OBJECT_ID.len()
            + per::sizeof_length(connect_pdu_length as u16)
            + CONFERENCE_REQUEST_CONNECT_PDU_SIZE
            + per::sizeof_length(gcc_blocks_buffer_length as u16)
            + gcc_blocks_buffer_length
    }
}

impl<'de> Decode<'de> for ConferenceCreateRequest {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let per_err = |e| other_err_with_source(Self::NAME, "PER", e);

        // ConnectData::Key: select object (0) of type OBJECT_IDENTIFIER
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != OBJECT_IDENTIFIER_KEY {
            return Err(invalid_field_err!("key", "unexpected ConnectData key"));
        }
        if per::read_object_id(src).map_err(per_err)? != CONFERENCE_REQUEST_OBJECT_ID {
            return Err(invalid_field_err!("key", "unexpected ConnectData key value"));
        }

        // ConnectData::connectPDU: length
        let _length = per::read_length(src).map_err(per_err)?;
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != CONNECT_GCC_PDU_CONFERENCE_REQUEST_CHOICE {
            return Err(invalid_field_err!(
                "connectPdu",
                "invalid ConnectGCCPDU choice (expected ConferenceCreateRequest)"
            ));
        }
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_selection(src) != CONFERENCE_REQUEST_USER_DATA_SELECTION {
            return Err(invalid_field_err!("selection", "invalid selection (expected userData)"));
        }
        per::read_numeric_string(src, 1).map_err(per_err)?;
        per::read_padding(src, 1);

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_number_of_sets(src) != USER_DATA_NUMBER_OF_SETS {
            return Err(invalid_field_err!("numberOfSets", "expected a single user data set"));
        }
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != USER_DATA_H221_NON_STANDARD_CHOICE {
            return Err(invalid_field_err!("userData", "expected h221NonStandard choice"));
        }
        if per::read_octet_string(src, H221_NON_STANDARD_MIN_LENGTH).map_err(per_err)?
            != CONFERENCE_REQUEST_CLIENT_TO_SERVER_H221_NON_STANDARD
        {
            return Err(invalid_field_err!("h221Key", "invalid client-to-server key"));
        }

        let _gcc_blocks_buffer_length = per::read_length(src).map_err(per_err)?;
        let gcc_blocks = ClientGccBlocks::decode(src)?;

        Ok(Self { gcc_blocks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConferenceCreateResponse {
    pub user_id: u16,
    pub gcc_blocks: ServerGccBlocks,
}

impl ConferenceCreateResponse {
    const NAME: &'static str = "ConferenceCreateResponse";
}

impl Encode for ConferenceCreateResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let gcc_blocks_buffer_length = self.gcc_blocks.size();

        // ConnectData::Key: select type OBJECT_IDENTIFIER
        per::write_choice(dst, OBJECT_IDENTIFIER_KEY);
        per::write_object_id(dst, CONFERENCE_REQUEST_OBJECT_ID);

        // ConnectData::connectPDU: length
        per::write_length(
            dst,
            cast_length!(
                Self::NAME,
                "connectPduLen",
                gcc_blocks_buffer_length + CONFERENCE_RESPONSE_CONNECT_PDU_SIZE
            )?,
        );
        // ConnectGCCPDU (CHOICE): select conferenceCreateResponse
        per::write_choice(dst, CONNECT_GCC_PDU_CONFERENCE_RESPONSE_CHOICE);
        // ConferenceCreateResponse::nodeID
        per::write_u16(dst, self.user_id, CONFERENCE_REQUEST_U16_MIN)
            .map_err(|e| other_err_with_source(Self::NAME, "nodeId", e))?;
        // ConferenceCreateResponse::tag
        per::write_u32(dst, CONFERENCE_RESPONSE_TAG);
        // ConferenceCreateResponse::result
        per::write_enum(dst, CONFERENCE_RESPONSE_RESULT);
        per::write_number_of_sets(dst, USER_DATA_NUMBER_OF_SETS);
        per::write_choice(dst, USER_DATA_H221_NON_STANDARD_CHOICE);
        // h221NonStandard: server-to-client H.221 key, "McDn"
        per::write_octet_string(
            dst,
            CONFERENCE_REQUEST_SERVER_TO_CLIENT_H221_NON_STANDARD,
            H221_NON_STANDARD_MIN_LENGTH,
        )
        .map_err(|e| other_err_with_source(Self::NAME, "h221Key", e))?;
        per::write_length(dst, cast_length!(Self::NAME, "gccBlocksLen", gcc_blocks_buffer_length)?);
        self.gcc_blocks.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let gcc_blocks_buffer_length = self.gcc_blocks.size();
        let connect_pdu_length = CONFERENCE_RESPONSE_CONNECT_PDU_SIZE + gcc_blocks_buffer_length;

        per::CHOICE_SIZE
            + CONFERENCE_REQUEST_OBJECT_ID.len()
            + per::sizeof_length(connect_pdu_length as u16)
            + CONFERENCE_RESPONSE_CONNECT_PDU_SIZE
            + per::sizeof_length(gcc_blocks_buffer_length as u16)
            + gcc_blocks_buffer_length
    }
}

impl<'de> Decode<'de> for ConferenceCreateResponse {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let per_err = |e| other_err_with_source(Self::NAME, "PER", e);

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != OBJECT_IDENTIFIER_KEY {
            return Err(invalid_field_err!("key", "unexpected ConnectData key"));
        }
        if per::read_object_id(src).map_err(per_err)? != CONFERENCE_REQUEST_OBJECT_ID {
            return Err(invalid_field_err!("key", "unexpected ConnectData key value"));
        }

        let _length = per::read_length(src).map_err(per_err)?;

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != CONNECT_GCC_PDU_CONFERENCE_RESPONSE_CHOICE {
            return Err(invalid_field_err!(
                "connectPdu",
                "invalid ConnectGCCPDU choice (expected ConferenceCreateResponse)"
            ));
        }

        let user_id = per::read_u16(src, CONFERENCE_REQUEST_U16_MIN).map_err(per_err)?;
        let _tag = per::read_u32(src).map_err(per_err)?;

        ensure_size!(in: src, size: per::ENUM_SIZE);
        per::read_enum(src, 16).map_err(per_err)?;

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_number_of_sets(src) != USER_DATA_NUMBER_OF_SETS {
            return Err(invalid_field_err!("numberOfSets", "expected a single user data set"));
        }
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != USER_DATA_H221_NON_STANDARD_CHOICE {
            return Err(invalid_field_err!("userData", "expected h221NonStandard choice"));
        }
        if per::read_octet_string(src, H221_NON_STANDARD_MIN_LENGTH).map_err(per_err)?
            != CONFERENCE_REQUEST_SERVER_TO_CLIENT_H221_NON_STANDARD
        {
            return Err(invalid_field_err!("h221Key", "invalid server-to-client key"));
        }

        let _gcc_blocks_buffer_length = per::read_length(src).map_err(per_err)?;
        let gcc_blocks = ServerGccBlocks::decode(src)?;

        Ok(Self { user_id, gcc_blocks })
    }
}
