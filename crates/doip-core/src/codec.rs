//! DoIP wire framing: the 8-byte header and payload envelope (ISO 13400-2).

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::DoipError;

/// Fixed protocol version byte.
pub const DOIP_VERSION: u8 = 0x03;
/// Fixed inverse-version byte (`!DOIP_VERSION & 0xFF`).
pub const DOIP_INVERSE_VERSION: u8 = 0xFC;
/// Size of the DoIP header in bytes.
pub const HEADER_SIZE: usize = 8;
/// Recommended payload ceiling for standard DoIP traffic.
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024;

/// DoIP payload types this emulator understands.
///
/// Unknown types are represented by the `Unknown` variant rather than
/// rejected at the framing layer — dispatch decides what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    VehicleIdentificationRequest,
    VehicleIdentificationResponse,
    RoutingActivationRequest,
    RoutingActivationResponse,
    DiagnosticMessage,
    DiagnosticMessageAck,
    DiagnosticMessageNack,
    Unknown(u16),
}

impl From<u16> for PayloadType {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => Self::VehicleIdentificationRequest,
            0x0004 => Self::VehicleIdentificationResponse,
            0x0005 => Self::RoutingActivationRequest,
            0x0006 => Self::RoutingActivationResponse,
            0x8001 => Self::DiagnosticMessage,
            0x8002 => Self::DiagnosticMessageAck,
            0x8003 => Self::DiagnosticMessageNack,
            other => Self::Unknown(other),
        }
    }
}

impl From<PayloadType> for u16 {
    fn from(pt: PayloadType) -> Self {
        match pt {
            PayloadType::VehicleIdentificationRequest => 0x0001,
            PayloadType::VehicleIdentificationResponse => 0x0004,
            PayloadType::RoutingActivationRequest => 0x0005,
            PayloadType::RoutingActivationResponse => 0x0006,
            PayloadType::DiagnosticMessage => 0x8001,
            PayloadType::DiagnosticMessageAck => 0x8002,
            PayloadType::DiagnosticMessageNack => 0x8003,
            PayloadType::Unknown(v) => v,
        }
    }
}

/// Decoded 8-byte DoIP header: payload type and declared payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedHeader {
    pub payload_type: PayloadType,
    pub payload_length: u32,
}

/// Encode a payload-type/payload pair into a full DoIP message on the wire.
pub fn encode(payload_type: PayloadType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.push(DOIP_VERSION);
    out.push(DOIP_INVERSE_VERSION);
    out.extend_from_slice(&u16::from(payload_type).to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode an 8-byte DoIP header.
///
/// Rejects the header if `inverse != !version & 0xFF`, per ISO 13400-2.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<DecodedHeader, DoipError> {
    let version = header[0];
    let inverse = header[1];
    if inverse != !version {
        return Err(DoipError::MalformedHeader { version, inverse });
    }

    let payload_type = u16::from_be_bytes([header[2], header[3]]);
    let payload_length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    Ok(DecodedHeader {
        payload_type: payload_type.into(),
        payload_length,
    })
}

/// Read exactly `n` bytes from `stream`, failing with `ShortRead` if the
/// stream closes before `n` bytes arrive.
pub async fn read_exact<R: AsyncRead + Unpin>(
    stream: &mut R,
    n: usize,
) -> Result<Vec<u8>, DoipError> {
    let mut buf = vec![0u8; n];
    let mut read = 0;
    while read < n {
        let got = stream
            .read(&mut buf[read..])
            .await
            .map_err(|_| DoipError::ShortRead {
                expected: n,
                got: read,
            })?;
        if got == 0 {
            return Err(DoipError::ShortRead {
                expected: n,
                got: read,
            });
        }
        read += got;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_expected_header() {
        let msg = encode(PayloadType::VehicleIdentificationRequest, &[]);
        assert_eq!(msg, vec![0x03, 0xFC, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_header_round_trips_with_encode() {
        let payload = vec![0x0E, 0x80, 0x00, 0x00, 0x00, 0x00];
        let msg = encode(PayloadType::RoutingActivationRequest, &payload);
        let header: [u8; HEADER_SIZE] = msg[..HEADER_SIZE].try_into().unwrap();
        let decoded = decode_header(&header).unwrap();
        assert_eq!(decoded.payload_type, PayloadType::RoutingActivationRequest);
        assert_eq!(decoded.payload_length as usize, payload.len());
        assert_eq!(&msg[HEADER_SIZE..], &payload[..]);
    }

    #[test]
    fn decode_header_rejects_bad_inverse_version() {
        let header = [0x03, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        let err = decode_header(&header).unwrap_err();
        assert!(matches!(err, DoipError::MalformedHeader { .. }));
    }

    #[tokio::test]
    async fn read_exact_reads_precisely_n_bytes() {
        let mut cursor = std::io::Cursor::new(vec![1, 2, 3, 4, 5]);
        let got = read_exact(&mut cursor, 3).await.unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn read_exact_fails_on_short_stream() {
        let mut cursor = std::io::Cursor::new(vec![1, 2]);
        let err = read_exact(&mut cursor, 5).await.unwrap_err();
        assert!(matches!(err, DoipError::ShortRead { expected: 5, got: 2 }));
    }
}
