//! TCP framing (MBAP header + PDU)
//!
//! ```text
//! Transaction ID : 2 bytes
//! Protocol ID    : 2 bytes (0)
//! Length         : 2 bytes (unit id + PDU)
//! Unit ID        : 1 byte
//! Function       : 1 byte
//! Data           : 0 up to 252 bytes
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use super::Packager;
use crate::constants::{TCP_HEADER_SIZE, TCP_MAX_LENGTH, TCP_PROTOCOL_ID};
use crate::error::{FieldbusError, Result};
use crate::pdu::ProtocolDataUnit;

/// TCP packager with a per-instance transaction counter
#[derive(Debug, Default)]
pub struct TcpPackager {
    slave_id: u8,
    transaction_id: AtomicU32,
}

impl TcpPackager {
    pub fn new(slave_id: u8) -> Self {
        Self {
            slave_id,
            transaction_id: AtomicU32::new(0),
        }
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// Next transaction id; the first one issued is 1 and the counter wraps
    fn next_transaction_id(&self) -> u16 {
        self.transaction_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1) as u16
    }
}

/// Split a frame into its header fields without panicking on short input
fn header(frame: &[u8]) -> Result<(u16, u16, u16, u8)> {
    match frame {
        [t0, t1, p0, p1, l0, l1, unit, ..] => Ok((
            u16::from_be_bytes([*t0, *t1]),
            u16::from_be_bytes([*p0, *p1]),
            u16::from_be_bytes([*l0, *l1]),
            *unit,
        )),
        _ => Err(FieldbusError::FrameTooShort {
            actual: frame.len(),
            min: TCP_HEADER_SIZE,
        }),
    }
}

impl Packager for TcpPackager {
    fn encode(&self, pdu: &ProtocolDataUnit) -> Result<Vec<u8>> {
        let size = TCP_HEADER_SIZE + pdu.encoded_len();
        if size > TCP_MAX_LENGTH {
            return Err(FieldbusError::FrameTooLarge {
                size,
                max: TCP_MAX_LENGTH,
            });
        }

        let transaction_id = self.next_transaction_id();
        // Unit id + function code + data
        let length = (1 + pdu.encoded_len()) as u16;

        let mut frame = Vec::with_capacity(size);
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&TCP_PROTOCOL_ID.to_be_bytes());
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(self.slave_id);
        frame.push(pdu.function_code);
        frame.extend_from_slice(&pdu.data);

        debug!(
            "TCP frame: txn={:04X} unit={} fc={:02X} len={}",
            transaction_id, self.slave_id, pdu.function_code, length
        );
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> Result<ProtocolDataUnit> {
        let (_, _, length, _) = header(frame)?;
        let Some(&function_code) = frame.get(TCP_HEADER_SIZE) else {
            return Err(FieldbusError::FrameTooShort {
                actual: frame.len(),
                min: TCP_HEADER_SIZE + 1,
            });
        };

        let actual = frame.len() - (TCP_HEADER_SIZE - 1);
        if usize::from(length) != actual {
            return Err(FieldbusError::invalid_length(format!(
                "declared {length}, actual {actual}"
            )));
        }

        Ok(ProtocolDataUnit::new(
            function_code,
            &frame[TCP_HEADER_SIZE + 1..],
        ))
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> Result<()> {
        let (req_txn, req_proto, _, req_unit) = header(request)?;
        let (resp_txn, resp_proto, _, resp_unit) = header(response)?;

        if resp_txn != req_txn {
            return Err(FieldbusError::Mismatch {
                field: "transaction id",
                request: req_txn,
                response: resp_txn,
            });
        }
        if resp_proto != req_proto {
            return Err(FieldbusError::Mismatch {
                field: "protocol id",
                request: req_proto,
                response: resp_proto,
            });
        }
        if resp_unit != req_unit {
            return Err(FieldbusError::Mismatch {
                field: "unit id",
                request: u16::from(req_unit),
                response: u16::from(resp_unit),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    // ============================================================================
    // Encode
    // ============================================================================

    #[test]
    fn test_encode_read_holding_registers() {
        let packager = TcpPackager::new(0x11);
        let frame = packager
            .encode(&ProtocolDataUnit::read_request(0x03, 0x006B, 3))
            .unwrap();

        assert_eq!(
            frame,
            vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
    }

    #[test]
    fn test_encode_rejects_oversized_pdu() {
        let packager = TcpPackager::new(1);
        let pdu = ProtocolDataUnit::new(0x10, vec![0u8; 253]);
        let err = packager.encode(&pdu).unwrap_err();
        assert_eq!(err, FieldbusError::FrameTooLarge { size: 261, max: 260 });
    }

    #[test]
    fn test_encode_max_sized_pdu() {
        let packager = TcpPackager::new(1);
        let frame = packager
            .encode(&ProtocolDataUnit::new(0x10, vec![0u8; 252]))
            .unwrap();
        assert_eq!(frame.len(), TCP_MAX_LENGTH);
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 254);
    }

    // ============================================================================
    // Transaction IDs
    // ============================================================================

    #[test]
    fn test_transaction_ids_increase_and_wrap() {
        let packager = TcpPackager::new(1);
        packager.transaction_id.store(0xFFFD, Ordering::Relaxed);
        let pdu = ProtocolDataUnit::read_request(0x03, 0, 1);

        let ids: Vec<u16> = (0..4)
            .map(|_| {
                let frame = packager.encode(&pdu).unwrap();
                u16::from_be_bytes([frame[0], frame[1]])
            })
            .collect();

        assert_eq!(ids, vec![0xFFFE, 0xFFFF, 0x0000, 0x0001]);
    }

    #[test]
    fn test_transaction_ids_unique_across_threads() {
        let packager = Arc::new(TcpPackager::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let packager = Arc::clone(&packager);
                std::thread::spawn(move || {
                    let pdu = ProtocolDataUnit::read_request(0x03, 0, 1);
                    (0..500)
                        .map(|_| {
                            let frame = packager.encode(&pdu).unwrap();
                            u16::from_be_bytes([frame[0], frame[1]])
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate transaction id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_separate_packagers_have_separate_counters() {
        let a = TcpPackager::new(1);
        let b = TcpPackager::new(1);
        let pdu = ProtocolDataUnit::read_request(0x03, 0, 1);
        a.encode(&pdu).unwrap();
        a.encode(&pdu).unwrap();
        let frame = b.encode(&pdu).unwrap();
        assert_eq!(&frame[..2], &[0x00, 0x01]);
    }

    // ============================================================================
    // Decode / Verify
    // ============================================================================

    #[test]
    fn test_decode_round_trip() {
        let packager = TcpPackager::new(7);
        let pdu = ProtocolDataUnit::new(0x10, vec![0x00, 0x01, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0x12, 0x34]);
        let frame = packager.encode(&pdu).unwrap();
        assert_eq!(packager.decode(&frame).unwrap(), pdu);
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let packager = TcpPackager::new(1);
        let frame = [0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x01, 0x03, 0x02, 0x00, 0x0A];
        assert!(matches!(
            packager.decode(&frame),
            Err(FieldbusError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_decode_short_frames_do_not_panic() {
        let packager = TcpPackager::new(1);
        for len in 0..TCP_HEADER_SIZE + 1 {
            let frame = vec![0u8; len];
            assert!(matches!(
                packager.decode(&frame),
                Err(FieldbusError::FrameTooShort { .. })
            ));
        }
    }

    #[test]
    fn test_verify_accepts_matching_response() {
        let packager = TcpPackager::new(1);
        let request = packager
            .encode(&ProtocolDataUnit::read_request(0x03, 0, 1))
            .unwrap();
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A];
        packager.verify(&request, &response).unwrap();
    }

    #[test]
    fn test_verify_rejects_transaction_mismatch() {
        let packager = TcpPackager::new(1);
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let response = [0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A];
        let err = packager.verify(&request, &response).unwrap_err();
        assert_eq!(
            err,
            FieldbusError::Mismatch {
                field: "transaction id",
                request: 1,
                response: 2
            }
        );
    }

    #[test]
    fn test_verify_rejects_protocol_mismatch() {
        let packager = TcpPackager::new(1);
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let response = [0x00, 0x01, 0x00, 0x01, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A];
        assert!(matches!(
            packager.verify(&request, &response),
            Err(FieldbusError::Mismatch { field: "protocol id", .. })
        ));
    }

    #[test]
    fn test_verify_rejects_unit_mismatch() {
        let packager = TcpPackager::new(5);
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x05, 0x03, 0x00, 0x00, 0x00, 0x01];
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x06, 0x03, 0x02, 0x00, 0x2A];
        let err = packager.verify(&request, &response).unwrap_err();
        assert_eq!(
            err,
            FieldbusError::Mismatch {
                field: "unit id",
                request: 5,
                response: 6
            }
        );
    }

    #[test]
    fn test_verify_short_response_does_not_panic() {
        let packager = TcpPackager::new(1);
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert!(packager.verify(&request, &[0x00, 0x01]).is_err());
    }
}
