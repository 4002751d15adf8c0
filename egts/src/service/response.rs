use bytes::BufMut;

use super::{
    Subrecord,
    SubrecordData,
    SubrecordPayload,
    SubrecordType,
};
use crate::{
    DecodeError,
    EncodeError,
    ProcessingResult,
    util::Cursor,
};

/// Confirms that a service record was received (`EGTS_SR_RECORD_RESPONSE`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordResponse {
    /// Number of the confirmed record
    pub confirmed_record_number: u16,

    /// How processing the record went
    pub status: ProcessingResult,
}

impl SubrecordPayload for RecordResponse {
    const SUBRECORD_TYPE: SubrecordType = SubrecordType::RECORD_RESPONSE;

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let confirmed_record_number = cursor.read_u16_le()?;
        let status = ProcessingResult::from_u8(cursor.read_u8()?);
        Ok(Self {
            confirmed_record_number,
            status,
        })
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), EncodeError> {
        buffer.put_u16_le(self.confirmed_record_number);
        buffer.put_u8(self.status.as_u8());
        Ok(())
    }
}

impl From<RecordResponse> for SubrecordData {
    fn from(value: RecordResponse) -> Self {
        Self::RecordResponse(value)
    }
}

impl From<RecordResponse> for Subrecord {
    fn from(value: RecordResponse) -> Self {
        Self::from_payload(value)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::RecordResponse;
    use crate::{
        Layer,
        ProcessingResult,
        service::SubrecordPayload,
        util::Cursor,
    };

    #[test]
    fn it_decodes_a_confirmation() {
        let bytes = [0x61, 0x00, 0x00];
        let response = RecordResponse::decode(&mut Cursor::new(&bytes, Layer::Subrecord)).unwrap();
        assert_eq!(response.confirmed_record_number, 97);
        assert_eq!(response.status, ProcessingResult::OK);
    }

    #[test]
    fn it_encodes_the_status_code() {
        let response = RecordResponse {
            confirmed_record_number: 0x0102,
            status: ProcessingResult::SRVC_UNKN,
        };
        let mut buffer = BytesMut::new();
        response.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0x02, 0x01, 150]);
    }
}
