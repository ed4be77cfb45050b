//! The binary demo framing spoken by the TCP demo client and sink.
//!
//! Every frame is a 24-byte big-endian header followed by `length` payload
//! bytes. The codecs are plain byte-slice transforms; thin async helpers
//! read and write whole frames on a stream.

use crate::error::CoreError;
use crate::ids::TokenId;
use crate::location::{Location, LOCATION_WIRE_LEN};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// First byte of every frame ('e').
pub const WIRE_MAGIC: u8 = 0x65;
/// Protocol version carried in the second byte.
pub const WIRE_VERSION: u8 = 1;
/// Fixed header size.
pub const HEADER_LEN: usize = 24;
/// Upper bound on a frame payload; a header beyond it is rejected.
pub const MAX_PAYLOAD_LEN: u32 = 1 << 20;

const SYNC_REQUEST_LEN: u32 = 48;
const SYNC_RESPONSE_LEN: u32 = 32;
const DATA_REQUEST_LEN: u32 = LOCATION_WIRE_LEN as u32;

/// Frame discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    SyncRequest = 1,
    SyncResponse = 2,
    DataRequest = 3,
    DataResponse = 4,
}

impl TryFrom<u8> for MsgType {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, CoreError> {
        match value {
            1 => Ok(MsgType::SyncRequest),
            2 => Ok(MsgType::SyncResponse),
            3 => Ok(MsgType::DataRequest),
            4 => Ok(MsgType::DataResponse),
            other => Err(CoreError::malformed(format!("message type {other}"))),
        }
    }
}

/// The 24-byte frame header: magic, version, type, user agent, a 16-byte
/// uuid (client or token depending on the message) and the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub user_agent: u8,
    pub uuid: Uuid,
    pub length: u32,
}

impl Header {
    pub fn new(msg_type: MsgType, user_agent: u8, uuid: Uuid, length: u32) -> Self {
        Header {
            msg_type,
            user_agent,
            uuid,
            length,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(WIRE_MAGIC);
        out.push(WIRE_VERSION);
        out.push(self.msg_type as u8);
        out.push(self.user_agent);
        out.extend_from_slice(self.uuid.as_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoreError> {
        if buf.len() < HEADER_LEN {
            return Err(CoreError::malformed("header: short read"));
        }
        if buf[0] != WIRE_MAGIC || buf[1] != WIRE_VERSION {
            return Err(CoreError::malformed("header: bad magic or version"));
        }
        let msg_type = MsgType::try_from(buf[2])?;
        let uuid = Uuid::from_bytes(buf[4..20].try_into().unwrap());
        let length = u32::from_be_bytes(buf[20..24].try_into().unwrap());
        if length > MAX_PAYLOAD_LEN {
            return Err(CoreError::malformed(format!("payload length {length}")));
        }
        Ok(Header {
            msg_type,
            user_agent: buf[3],
            uuid,
            length,
        })
    }
}

/// Sync handshake request: the header uuid is the client identity; the
/// payload is a service uuid plus the client's initial location.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequestMsg {
    pub user_agent: u8,
    pub client_uuid: Uuid,
    pub service_uuid: Uuid,
    pub location: Location,
}

impl SyncRequestMsg {
    pub fn encode(&self) -> Vec<u8> {
        let header = Header::new(
            MsgType::SyncRequest,
            self.user_agent,
            self.client_uuid,
            SYNC_REQUEST_LEN,
        );
        let mut out = Vec::with_capacity(HEADER_LEN + SYNC_REQUEST_LEN as usize);
        header.encode_into(&mut out);
        out.extend_from_slice(self.service_uuid.as_bytes());
        self.location.encode_into(&mut out);
        out
    }

    pub fn decode(header: &Header, payload: &[u8]) -> Result<Self, CoreError> {
        if header.msg_type != MsgType::SyncRequest || payload.len() != SYNC_REQUEST_LEN as usize {
            return Err(CoreError::malformed("sync request"));
        }
        Ok(SyncRequestMsg {
            user_agent: header.user_agent,
            client_uuid: header.uuid,
            service_uuid: Uuid::from_bytes(payload[..16].try_into().unwrap()),
            location: Location::decode(&payload[16..])?,
        })
    }
}

/// Sync handshake response: the freshly minted session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponseMsg {
    pub client_uuid: Uuid,
    pub service_uuid: Uuid,
    pub token_id: TokenId,
}

impl SyncResponseMsg {
    pub fn encode(&self) -> Vec<u8> {
        let header = Header::new(MsgType::SyncResponse, 0, self.client_uuid, SYNC_RESPONSE_LEN);
        let mut out = Vec::with_capacity(HEADER_LEN + SYNC_RESPONSE_LEN as usize);
        header.encode_into(&mut out);
        out.extend_from_slice(self.service_uuid.as_bytes());
        out.extend_from_slice(self.token_id.as_bytes());
        out
    }

    pub fn decode(header: &Header, payload: &[u8]) -> Result<Self, CoreError> {
        if header.msg_type != MsgType::SyncResponse || payload.len() != SYNC_RESPONSE_LEN as usize {
            return Err(CoreError::malformed("sync response"));
        }
        Ok(SyncResponseMsg {
            client_uuid: header.uuid,
            service_uuid: Uuid::from_bytes(payload[..16].try_into().unwrap()),
            token_id: TokenId::from(Uuid::from_bytes(payload[16..32].try_into().unwrap())),
        })
    }
}

/// A location report on an established session; the header uuid is the
/// session token.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequestMsg {
    pub token_id: TokenId,
    pub location: Location,
}

impl DataRequestMsg {
    pub fn encode(&self) -> Vec<u8> {
        let header = Header::new(
            MsgType::DataRequest,
            0,
            self.token_id.as_uuid(),
            DATA_REQUEST_LEN,
        );
        let mut out = Vec::with_capacity(HEADER_LEN + DATA_REQUEST_LEN as usize);
        header.encode_into(&mut out);
        self.location.encode_into(&mut out);
        out
    }

    pub fn decode(header: &Header, payload: &[u8]) -> Result<Self, CoreError> {
        if header.msg_type != MsgType::DataRequest || payload.len() != DATA_REQUEST_LEN as usize {
            return Err(CoreError::malformed("data request"));
        }
        Ok(DataRequestMsg {
            token_id: TokenId::from(header.uuid),
            location: Location::decode(payload)?,
        })
    }
}

/// Opaque application payload pushed back to the demo client.
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponseMsg {
    pub token_id: TokenId,
    pub data: Vec<u8>,
}

impl DataResponseMsg {
    pub fn encode(&self) -> Vec<u8> {
        let header = Header::new(
            MsgType::DataResponse,
            0,
            self.token_id.as_uuid(),
            self.data.len() as u32,
        );
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        header.encode_into(&mut out);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(header: &Header, payload: &[u8]) -> Result<Self, CoreError> {
        if header.msg_type != MsgType::DataResponse {
            return Err(CoreError::malformed("data response"));
        }
        Ok(DataResponseMsg {
            token_id: TokenId::from(header.uuid),
            data: payload.to_vec(),
        })
    }
}

/// Read one whole frame (header + payload) from the stream.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<(Header, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut buf).await?;
    let header =
        Header::decode(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).await?;
    Ok((header, payload))
}

/// Write an encoded frame to the stream.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_location() -> Location {
        Location::new(-34.9287, 138.5999, 86.45, 0.0, 1_700_000_000)
    }

    #[test]
    fn header_is_24_bytes_and_round_trips() {
        let header = Header::new(MsgType::SyncRequest, 7, Uuid::new_v4(), 48);
        let mut bytes = Vec::new();
        header.encode_into(&mut bytes);
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(bytes[0], WIRE_MAGIC);
        assert_eq!(Header::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let header = Header::new(MsgType::DataRequest, 0, Uuid::new_v4(), 32);
        let mut bytes = Vec::new();
        header.encode_into(&mut bytes);
        bytes[0] = 0x66;
        assert!(Header::decode(&bytes).is_err());
    }

    #[test]
    fn sync_request_frame_is_72_bytes() {
        let msg = SyncRequestMsg {
            user_agent: 0,
            client_uuid: Uuid::new_v4(),
            service_uuid: Uuid::new_v4(),
            location: sample_location(),
        };
        let frame = msg.encode();
        assert_eq!(frame.len(), HEADER_LEN + 48);

        let header = Header::decode(&frame[..HEADER_LEN]).unwrap();
        let back = SyncRequestMsg::decode(&header, &frame[HEADER_LEN..]).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn sync_response_round_trips() {
        let msg = SyncResponseMsg {
            client_uuid: Uuid::new_v4(),
            service_uuid: Uuid::new_v4(),
            token_id: TokenId::random(),
        };
        let frame = msg.encode();
        assert_eq!(frame.len(), HEADER_LEN + 32);
        let header = Header::decode(&frame[..HEADER_LEN]).unwrap();
        assert_eq!(
            SyncResponseMsg::decode(&header, &frame[HEADER_LEN..]).unwrap(),
            msg
        );
    }

    #[test]
    fn data_request_round_trips() {
        let msg = DataRequestMsg {
            token_id: TokenId::random(),
            location: sample_location(),
        };
        let frame = msg.encode();
        assert_eq!(frame.len(), HEADER_LEN + 32);
        let header = Header::decode(&frame[..HEADER_LEN]).unwrap();
        assert_eq!(
            DataRequestMsg::decode(&header, &frame[HEADER_LEN..]).unwrap(),
            msg
        );
    }

    #[tokio::test]
    async fn frames_survive_a_stream() {
        let msg = DataResponseMsg {
            token_id: TokenId::random(),
            data: br#"{"activities":[]}"#.to_vec(),
        };
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, &msg.encode()).await.unwrap();

        let (header, payload) = read_frame(&mut server).await.unwrap();
        assert_eq!(header.msg_type, MsgType::DataResponse);
        assert_eq!(DataResponseMsg::decode(&header, &payload).unwrap(), msg);
    }
}
