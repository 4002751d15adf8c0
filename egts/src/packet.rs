//! Whole packets
//!
//! Ties the transport header and the service frame together, and builds the
//! acknowledgements a receiver sends back.

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};

use crate::{
    DecodeError,
    Diagnostics,
    EncodeError,
    Layer,
    PacketType,
    ProcessingResult,
    Registry,
    ServiceFrame,
    ServiceRecord,
    Subrecord,
    service::{
        RecordFlags,
        RecordResponse,
    },
    transport::Header,
    util::Cursor,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub frame: ServiceFrame,
}

/// A packet together with everything about it that is derived on encode.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedPacket {
    pub packet: Packet,
    pub protocol_version: u8,
    pub header_length: u8,
    pub frame_data_length: u16,
    pub header_checksum: u8,

    /// Not present if the frame is empty.
    pub frame_checksum: Option<u16>,

    /// Number of bytes the packet took. Anything after that belongs to the
    /// next packet.
    pub length: usize,

    pub diagnostics: Diagnostics,
}

impl Packet {
    pub fn new(header: Header, frame: ServiceFrame) -> Self {
        Self { header, frame }
    }

    pub fn packet_type(&self) -> PacketType {
        self.frame.packet_type()
    }

    /// Decodes a packet from the start of `bytes`, using the standard
    /// [`Registry`].
    pub fn decode(bytes: &[u8]) -> Result<DecodedPacket, DecodeError> {
        Self::decode_with(bytes, Registry::standard())
    }

    /// Decodes a packet from the start of `bytes`.
    ///
    /// Subrecords with types that `registry` doesn't know are kept as raw
    /// bytes and reported in the [`Diagnostics`].
    pub fn decode_with(bytes: &[u8], registry: &Registry) -> Result<DecodedPacket, DecodeError> {
        let mut cursor = Cursor::new(bytes, Layer::Transport);
        let decoded_header = Header::decode(&mut cursor)?;

        let mut cursor = cursor.with_layer(Layer::Frame);
        let (mut frame_data, frame_checksum) =
            ServiceFrame::verify(&mut cursor, decoded_header.frame_data_length)?;

        let header = decoded_header.header;
        if !frame_data.is_empty() && (header.encryption != 0 || header.compressed) {
            tracing::debug!(
                packet_id = header.packet_id,
                encryption = header.encryption,
                compressed = header.compressed,
                "can't decode frame data"
            );
            return Err(DecodeError::UnsupportedFrameEncoding {
                encryption: header.encryption,
                compressed: header.compressed,
            });
        }

        let frame = ServiceFrame::decode(&mut frame_data, decoded_header.packet_type, registry)?;
        let packet = Packet { header, frame };
        let diagnostics = packet.diagnostics();

        tracing::trace!(
            packet_id = packet.header.packet_id,
            length = cursor.offset(),
            num_records = packet.frame.records().len(),
            "decoded packet"
        );

        Ok(DecodedPacket {
            packet,
            protocol_version: decoded_header.protocol_version,
            header_length: decoded_header.header_length,
            frame_data_length: decoded_header.frame_data_length,
            header_checksum: decoded_header.checksum,
            frame_checksum,
            length: cursor.offset(),
            diagnostics,
        })
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut buffer = BytesMut::new();
        self.encode_into(&mut buffer)?;
        Ok(buffer.freeze())
    }

    /// Encodes the packet. Nothing is written to `buffer` if this fails.
    pub fn encode_into<B: BufMut>(&self, buffer: &mut B) -> Result<(), EncodeError> {
        let mut frame = BytesMut::new();
        let frame_data_length = self.frame.encode(&mut frame)?;

        let mut header = BytesMut::new();
        self.header.encode(self.packet_type(), frame_data_length, &mut header)?;

        buffer.put_slice(&header);
        buffer.put_slice(&frame);
        Ok(())
    }

    /// Results for this packet's records, as a receiver would report them.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            transport: ProcessingResult::OK,
            records: self
                .frame
                .records()
                .iter()
                .map(ServiceRecord::diagnostics)
                .collect(),
        }
    }

    /// Builds the acknowledgement for this packet.
    ///
    /// Every record is confirmed with a record response carrying that
    /// record's processing result, in a record going back the way it came.
    /// The response records are numbered from `first_record_number`.
    pub fn response(&self, packet_id: u16, first_record_number: u16) -> Packet {
        let mut record_number = first_record_number;
        let records = self
            .frame
            .records()
            .iter()
            .map(|record| {
                let response = ServiceRecord {
                    record_number,
                    flags: RecordFlags {
                        source_on_device: record.flags.recipient_on_device,
                        recipient_on_device: record.flags.source_on_device,
                        group: false,
                        priority: record.flags.priority,
                    },
                    object_id: None,
                    event_id: None,
                    time: None,
                    source_service: record.recipient_service,
                    recipient_service: record.source_service,
                    subrecords: vec![Subrecord::from_payload(RecordResponse {
                        confirmed_record_number: record.record_number,
                        status: record.processing_result(),
                    })],
                };
                record_number = record_number.wrapping_add(1);
                response
            })
            .collect();

        Packet {
            header: Header {
                priority: self.header.priority,
                ..Header::new(packet_id)
            },
            frame: ServiceFrame::Response {
                response_packet_id: self.header.packet_id,
                result: ProcessingResult::OK,
                records,
            },
        }
    }

    /// Builds a response that only carries a transport level result.
    ///
    /// This is what's sent back for packets that couldn't be decoded, with
    /// the result from [`DecodeError::processing_result`].
    pub fn transport_response(
        packet_id: u16,
        response_packet_id: u16,
        result: ProcessingResult,
    ) -> Packet {
        Packet {
            header: Header::new(packet_id),
            frame: ServiceFrame::Response {
                response_packet_id,
                result,
                records: vec![],
            },
        }
    }

    /// Length of the packet at the start of `bytes`, from its header alone.
    ///
    /// Use this to find where the next packet starts in a stream. The header
    /// must be complete and its checksum must match.
    pub fn encoded_length(bytes: &[u8]) -> Result<usize, DecodeError> {
        let header = Header::decode(&mut Cursor::new(bytes, Layer::Transport))?;
        let frame_data_length = usize::from(header.frame_data_length);
        let checksum_length = if frame_data_length == 0 { 0 } else { 2 };
        Ok(usize::from(header.header_length) + frame_data_length + checksum_length)
    }
}

impl DecodedPacket {
    /// See [`Packet::response`].
    pub fn response(&self, packet_id: u16, first_record_number: u16) -> Packet {
        self.packet.response(packet_id, first_record_number)
    }
}
