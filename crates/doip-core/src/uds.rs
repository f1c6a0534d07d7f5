//! UDS Responder: catalog lookup with a deterministic default-response
//! synthesizer as fallback.

use crate::catalog::ResponseCatalog;

/// UDS service identifiers this emulator recognizes in its default
/// synthesizer.
#[allow(dead_code)]
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// UDS negative response codes used by the default synthesizer.
pub mod nrc {
    pub const SERVICE_NOT_SUPPORTED: u8 = 0x11;
}

/// How a diagnostic request was addressed, per `spec.md` §4.5's
/// classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Physical,
    Functional,
    /// Target address matched neither server address. Still processed (for
    /// logging) and ACKed, but synthesis treats it as Physical.
    Unknown,
}

/// Resolve a UDS request to a response, consulting the catalog first and
/// falling back to the default synthesizer.
///
/// Returns `None` to mean "suppress response", which is valid protocol
/// behavior (e.g. functional TesterPresent), not an error.
pub fn resolve(
    catalog: &ResponseCatalog,
    request: &[u8],
    address_type: AddressType,
) -> Option<Vec<u8>> {
    if request.is_empty() {
        return None;
    }

    let request_hex = hex::encode_upper(request);
    if let Some(response) = catalog.lookup(&request_hex) {
        return Some(response);
    }

    synthesize_default(request, address_type)
}

/// The deterministic default-response table from `spec.md` §4.3, consulted
/// when no catalog entry matches. Rules are tried in order; the first
/// match wins.
fn synthesize_default(request: &[u8], _address_type: AddressType) -> Option<Vec<u8>> {
    let sid = request[0];
    let len = request.len();

    if sid == service_id::TESTER_PRESENT {
        // Both physical and functional TesterPresent are suppressed by this
        // emulator, matching ISO 14229 suppressPosRspMsgIndication
        // semantics for `3E 80` and the emulator's blanket functional
        // suppression.
        return None;
    }

    if sid == service_id::DIAGNOSTIC_SESSION_CONTROL && len >= 2 {
        return Some(vec![0x50, request[1], 0x00, 0x32, 0x01, 0xF4]);
    }

    if sid == service_id::READ_DATA_BY_ID && len >= 3 {
        let mut response = vec![0x62, request[1], request[2]];
        response.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        return Some(response);
    }

    if sid == service_id::SECURITY_ACCESS && len >= 2 {
        let level = request[1];
        if level % 2 == 1 {
            let mut response = vec![0x67, level];
            response.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0].repeat(2));
            return Some(response);
        }
        return Some(vec![0x67, level]);
    }

    if sid == service_id::ECU_RESET && len >= 2 {
        return Some(vec![0x51, request[1]]);
    }

    if sid == service_id::ROUTINE_CONTROL && len >= 4 {
        if request[1] == 0x01 && request[2] == 0xDD && request[3] == 0x02 {
            return Some(vec![0x71, 0x01, 0xDD, 0x02, 0x00]);
        }
        if request[1] == 0x01 && request[2] == 0xFF && request[3] == 0x00 {
            return Some(vec![0x71, 0x01, 0xFF, 0x00, 0x00]);
        }
    }

    if sid == service_id::REQUEST_DOWNLOAD && len >= 2 {
        return Some(vec![0x74, 0x40, 0x00, 0x00, 0x3F, 0x02]);
    }

    if sid == service_id::TRANSFER_DATA && len >= 2 {
        return Some(vec![0x76, request[1]]);
    }

    if sid == service_id::REQUEST_TRANSFER_EXIT {
        return Some(vec![0x77]);
    }

    Some(vec![service_id::NEGATIVE_RESPONSE, sid, nrc::SERVICE_NOT_SUPPORTED])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ResponseCatalog {
        ResponseCatalog::from_json(r#"[{"req":"22F190","res":"62F190414243"}]"#).unwrap()
    }

    #[test]
    fn catalog_hit_short_circuits_synthesis() {
        let response = resolve(&catalog(), &[0x22, 0xF1, 0x90], AddressType::Physical).unwrap();
        assert_eq!(response, vec![0x62, 0xF1, 0x90, 0x41, 0x42, 0x43]);
    }

    #[test]
    fn diagnostic_session_control_synthesis() {
        let response =
            resolve(&catalog(), &[0x10, 0x03], AddressType::Physical).unwrap();
        assert_eq!(response, vec![0x50, 0x03, 0x00, 0x32, 0x01, 0xF4]);
    }

    #[test]
    fn tester_present_suppressed_both_addressings() {
        assert_eq!(resolve(&catalog(), &[0x3E, 0x80], AddressType::Physical), None);
        assert_eq!(resolve(&catalog(), &[0x3E, 0x00], AddressType::Physical), None);
        assert_eq!(resolve(&catalog(), &[0x3E, 0x80], AddressType::Functional), None);
    }

    #[test]
    fn security_access_seed_and_key() {
        let seed = resolve(&catalog(), &[0x27, 0x01], AddressType::Physical).unwrap();
        assert_eq!(seed[0], 0x67);
        assert_eq!(seed[1], 0x01);
        assert_eq!(seed.len(), 18);

        let key_ack = resolve(&catalog(), &[0x27, 0x02], AddressType::Physical).unwrap();
        assert_eq!(key_ack, vec![0x67, 0x02]);
    }

    #[test]
    fn routine_control_start_routines() {
        assert_eq!(
            resolve(&catalog(), &[0x31, 0x01, 0xDD, 0x02], AddressType::Physical),
            Some(vec![0x71, 0x01, 0xDD, 0x02, 0x00])
        );
        assert_eq!(
            resolve(&catalog(), &[0x31, 0x01, 0xFF, 0x00], AddressType::Physical),
            Some(vec![0x71, 0x01, 0xFF, 0x00, 0x00])
        );
    }

    #[test]
    fn transfer_data_echoes_sequence_byte() {
        assert_eq!(
            resolve(&catalog(), &[0x36, 0x07], AddressType::Physical),
            Some(vec![0x76, 0x07])
        );
    }

    #[test]
    fn unknown_service_yields_negative_response() {
        assert_eq!(
            resolve(&catalog(), &[0x7A, 0x00], AddressType::Physical),
            Some(vec![0x7F, 0x7A, 0x11])
        );
    }

    #[test]
    fn unknown_address_type_uses_physical_rules() {
        assert_eq!(
            resolve(&catalog(), &[0x10, 0x03], AddressType::Unknown),
            Some(vec![0x50, 0x03, 0x00, 0x32, 0x01, 0xF4])
        );
    }
}
