//! Protocol Engine: payload-type dispatch and the request/response shaping
//! that sits between framed bytes and the UDS Responder.
//!
//! Every function here is pure — it takes identity/catalog state and a
//! decoded payload and returns the payload(s) to frame and send. I/O,
//! session-state mutation and logging are the caller's job (the Client
//! Session / Transport Runtime in the `doip-emulator` crate).

use crate::catalog::ResponseCatalog;
use crate::codec::PayloadType;
use crate::error::DoipError;
use crate::identity::{ServerIdentity, VehicleIdentity};
use crate::uds::{self, AddressType};

/// Response code for a successfully activated routing session.
///
/// Hard-coded per `spec.md` §4.5 / §9 Open Question 1: the source never
/// varies this by activation type, so neither does this implementation.
pub const ROUTING_ACTIVATION_SUCCESS: u8 = 0x10;

/// Build the Vehicle Identification Response payload for a `0x0001`
/// request, addressed to the server's physical logical address.
pub fn vehicle_identification_response(vehicle: &VehicleIdentity, identity: &ServerIdentity) -> Vec<u8> {
    vehicle.response_payload(identity.server_addr)
}

/// Build the Vehicle Announcement Message payload (the UDP-only variant
/// with a trailing `sync_status` byte), used for the optional start-up
/// broadcast.
pub fn vehicle_announcement(vehicle: &VehicleIdentity, identity: &ServerIdentity) -> Vec<u8> {
    vehicle.announcement_payload(identity.server_addr)
}

/// Result of a successful Routing Activation Request.
pub struct RoutingActivation {
    /// The `0x0006` response payload to send back.
    pub response_payload: Vec<u8>,
    /// The source address the requester activated routing for.
    pub source_addr: u16,
}

/// Handle a `0x0005` Routing Activation Request.
///
/// Payloads shorter than 4 bytes are rejected per `spec.md` §4.5: no
/// response is written, and the caller should log a warning.
pub fn handle_routing_activation_request(
    payload: &[u8],
    identity: &ServerIdentity,
) -> Result<RoutingActivation, DoipError> {
    if payload.len() < 4 {
        return Err(DoipError::InvalidRoutingRequest(payload.len()));
    }

    let source_addr = u16::from_be_bytes([payload[0], payload[1]]);

    let mut response_payload = Vec::with_capacity(9);
    response_payload.extend_from_slice(&source_addr.to_be_bytes());
    response_payload.extend_from_slice(&identity.server_addr.to_be_bytes());
    response_payload.push(ROUTING_ACTIVATION_SUCCESS);
    response_payload.extend_from_slice(&[0u8; 4]);

    Ok(RoutingActivation {
        source_addr,
        response_payload,
    })
}

/// Classify a diagnostic message's target address per `spec.md` §4.5.
pub fn classify_address(target_addr: u16, identity: &ServerIdentity) -> AddressType {
    if target_addr == identity.server_addr {
        AddressType::Physical
    } else if target_addr == identity.server_addr_func {
        AddressType::Functional
    } else {
        AddressType::Unknown
    }
}

/// Everything the Transport Runtime needs to write back in response to one
/// `0x8001` Diagnostic Message.
pub struct DiagnosticOutcome {
    /// Source DoIP address from the request (the tester).
    pub source_addr: u16,
    /// Target DoIP address from the request (this ECU, or an unknown one).
    pub target_addr: u16,
    /// How the target address classified.
    pub address_type: AddressType,
    /// `0x8002` ACK payload — always sent, and always sent first.
    pub ack_payload: Vec<u8>,
    /// `0x8001` response payload, if the UDS Responder didn't suppress it.
    pub response_payload: Option<Vec<u8>>,
}

/// Handle a `0x8001` Diagnostic Message: classify addressing, build the ACK,
/// then consult the UDS Responder for the data response (if any).
///
/// Returns `None` if the payload is too short to carry `source | target`
/// (fewer than 4 bytes) — the caller should log and drop it silently, same
/// as an unrecognized payload type.
pub fn handle_diagnostic_message(
    payload: &[u8],
    identity: &ServerIdentity,
    catalog: &ResponseCatalog,
) -> Option<DiagnosticOutcome> {
    if payload.len() < 4 {
        return None;
    }

    let source_addr = u16::from_be_bytes([payload[0], payload[1]]);
    let target_addr = u16::from_be_bytes([payload[2], payload[3]]);
    let user_data = &payload[4..];

    let address_type = classify_address(target_addr, identity);

    let mut ack_payload = Vec::with_capacity(5);
    ack_payload.extend_from_slice(&source_addr.to_be_bytes());
    ack_payload.extend_from_slice(&target_addr.to_be_bytes());
    ack_payload.push(0x00);

    let response_payload = if user_data.is_empty() {
        None
    } else {
        uds::resolve(catalog, user_data, address_type)
    };

    Some(DiagnosticOutcome {
        source_addr,
        target_addr,
        address_type,
        ack_payload,
        response_payload,
    })
}

/// Build the `0x8001` response envelope payload (`server_addr | tester_addr
/// | uds_response`) for the data that follows an ACK.
pub fn diagnostic_response_payload(
    identity: &ServerIdentity,
    tester_addr: u16,
    uds_response: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + uds_response.len());
    out.extend_from_slice(&identity.server_addr.to_be_bytes());
    out.extend_from_slice(&tester_addr.to_be_bytes());
    out.extend_from_slice(uds_response);
    out
}

/// Payload type dispatch outcome for anything outside VIR / RAR / Diagnostic
/// Message — logged and ignored, per `spec.md` §4.5/§7.
pub fn is_unknown(payload_type: PayloadType) -> bool {
    matches!(payload_type, PayloadType::Unknown(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ServerIdentity {
        ServerIdentity {
            server_addr: 0x1001,
            server_addr_func: 0x1FFF,
            client_addr: 0x0E80,
        }
    }

    #[test]
    fn classify_address_matches_physical_functional_unknown() {
        let id = identity();
        assert_eq!(classify_address(0x1001, &id), AddressType::Physical);
        assert_eq!(classify_address(0x1FFF, &id), AddressType::Functional);
        assert_eq!(classify_address(0x9999, &id), AddressType::Unknown);
    }

    #[test]
    fn routing_activation_rejects_short_payload() {
        let err = handle_routing_activation_request(&[0x0E, 0x80, 0x00], &identity()).unwrap_err();
        assert!(matches!(err, DoipError::InvalidRoutingRequest(3)));
    }

    #[test]
    fn routing_activation_echoes_source_address() {
        let activation = handle_routing_activation_request(
            &[0x0E, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00],
            &identity(),
        )
        .unwrap();
        assert_eq!(activation.source_addr, 0x0E80);
        assert_eq!(
            activation.response_payload,
            vec![0x0E, 0x80, 0x10, 0x01, 0x10, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn diagnostic_message_acks_before_response_and_suppresses_tester_present() {
        let id = identity();
        let catalog = ResponseCatalog::empty();

        // TesterPresent functional, suppressed: ACK present, response absent.
        let outcome =
            handle_diagnostic_message(&[0x0E, 0x80, 0x1F, 0xFF, 0x3E, 0x80], &id, &catalog).unwrap();
        assert_eq!(outcome.address_type, AddressType::Functional);
        assert_eq!(outcome.ack_payload, vec![0x0E, 0x80, 0x1F, 0xFF, 0x00]);
        assert_eq!(outcome.response_payload, None);
    }

    #[test]
    fn diagnostic_message_too_short_is_ignored() {
        assert!(handle_diagnostic_message(&[0x0E, 0x80], &identity(), &ResponseCatalog::empty())
            .is_none());
    }

    #[test]
    fn diagnostic_response_payload_layout() {
        let payload = diagnostic_response_payload(&identity(), 0x0E80, &[0x50, 0x03]);
        assert_eq!(payload, vec![0x10, 0x01, 0x0E, 0x80, 0x50, 0x03]);
    }
}
