use std::path::PathBuf;

use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Error,
    bail,
};
use egts::{
    DecodedPacket,
    Layer,
    Packet,
    Registry,
    transport::Header,
    util::Cursor,
};

fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Decode {
            packets,
            file,
            raw_subrecords,
        } => {
            let registry = if raw_subrecords {
                Registry::empty()
            }
            else {
                Registry::default()
            };
            let mut printer = PacketPrinter::new(&registry);

            if let Some(file) = &file {
                if !packets.is_empty() {
                    bail!("Either pass packets as hex or use --file, not both.");
                }
                let data = std::fs::read(file)?;
                printer.handle_stream(&data)?;
            }
            else {
                for packet in &packets {
                    printer.handle_packet(&hex::decode(packet.trim())?);
                }
            }

            printer.finish();
        }
        Command::Respond {
            packet,
            packet_id,
            record_number,
        } => {
            let data = hex::decode(packet.trim())?;

            let response = match Packet::decode(&data) {
                Ok(decoded) => decoded.response(packet_id, record_number),
                Err(error) => {
                    // we can still answer if the header is intact
                    let header = Header::decode(&mut Cursor::new(&data, Layer::Transport))?;
                    tracing::warn!(%error, "responding with transport result");
                    Packet::transport_response(
                        packet_id,
                        header.header.packet_id,
                        error.processing_result(),
                    )
                }
            };

            println!("{}", hex::encode_upper(response.encode()?));
        }
    }

    Ok(())
}

#[derive(Debug, Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode packets and print them
    Decode {
        /// Hex encoded packets
        packets: Vec<String>,

        /// Read back-to-back binary packets from a file instead.
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Don't decode any subrecord payloads.
        #[clap(long)]
        raw_subrecords: bool,
    },
    /// Print the acknowledgement for a packet, hex encoded
    Respond {
        /// Hex encoded packet
        packet: String,

        /// Packet id of the response
        #[clap(short, long, env = "EGTS_PACKET_ID", default_value_t = 0)]
        packet_id: u16,

        /// Record number of the first response record
        #[clap(short, long, env = "EGTS_RECORD_NUMBER", default_value_t = 0)]
        record_number: u16,
    },
}

#[derive(Debug)]
struct PacketPrinter<'a> {
    registry: &'a Registry,
    num_packets: usize,
    num_errors: usize,
    num_bytes: usize,
}

impl<'a> PacketPrinter<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            num_packets: 0,
            num_errors: 0,
            num_bytes: 0,
        }
    }

    /// Decodes and prints one packet. Returns how many bytes it took, if it
    /// could be decoded.
    fn handle_packet(&mut self, data: &[u8]) -> Option<usize> {
        match Packet::decode_with(data, self.registry) {
            Ok(decoded) => {
                self.print(&decoded);
                self.num_packets += 1;
                self.num_bytes += decoded.length;
                Some(decoded.length)
            }
            Err(error) => {
                println!(
                    "error: {error} (result {})",
                    error.processing_result()
                );
                self.num_errors += 1;
                None
            }
        }
    }

    fn handle_stream(&mut self, mut data: &[u8]) -> Result<(), Error> {
        while !data.is_empty() {
            let length = match self.handle_packet(data) {
                Some(length) => length,
                None => {
                    // skip the packet if at least its header is fine
                    Packet::encoded_length(data)?
                }
            };
            if length > data.len() {
                bail!("stream ends in the middle of a packet");
            }
            data = &data[length..];
        }
        Ok(())
    }

    fn print(&self, decoded: &DecodedPacket) {
        println!("{:#?}", decoded.packet);
        println!(
            "version {}, header length {}, header checksum 0x{:02x}, frame length {}, frame checksum {}",
            decoded.protocol_version,
            decoded.header_length,
            decoded.header_checksum,
            decoded.frame_data_length,
            decoded
                .frame_checksum
                .map_or_else(|| "none".to_owned(), |checksum| format!("0x{checksum:04x}")),
        );

        for record in &decoded.diagnostics.records {
            if !record.is_ok() {
                println!(
                    "record {}: {} (subrecords: {:?})",
                    record.record_number,
                    record.result,
                    record
                        .subrecords
                        .iter()
                        .map(|result| result.as_u8())
                        .collect::<Vec<_>>()
                );
            }
        }
    }

    fn finish(self) {
        println!(
            "{} packets ({} bytes), {} errors",
            self.num_packets, self.num_bytes, self.num_errors
        );
    }
}
