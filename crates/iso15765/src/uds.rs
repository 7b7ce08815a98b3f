//! UDS Read Data By Identifier Driver

use crate::error::{IsoTpError, UdsError};
use crate::isotp::{flow_control, single_frame, IsoTpReassembler, Reassembly};
use crate::{nrc, service};
use frame_queue::FrameConsumer;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use vda_link::{CanId, DeviceError, RawFrame};

/// PDU format of ISO 15765 normal fixed addressing on J1939 (PGN 0xDA00)
const DIAGNOSTIC_PF: u8 = 0xDA;

/// ISO 14229-1 Annex C identification data identifiers
pub const IDENTIFICATION_DIDS: RangeInclusive<u16> = 0xF180..=0xF19E;

/// Transmit capability for CAN frames
pub trait CanSender: Send + Sync {
    fn send_can(&self, id: CanId, data: &[u8]) -> Result<(), DeviceError>;
}

impl<T: CanSender + ?Sized> CanSender for Arc<T> {
    fn send_can(&self, id: CanId, data: &[u8]) -> Result<(), DeviceError> {
        (**self).send_can(id, data)
    }
}

/// Identifier for requests from `tester` to `target`
pub fn request_id(target: u8, tester: u8) -> u32 {
    0x18DA_0000 | (target as u32) << 8 | tester as u32
}

/// Identifier for responses from `target` to `tester`
pub fn response_id(target: u8, tester: u8) -> u32 {
    request_id(tester, target)
}

/// Whether a CAN frame uses ISO 15765 normal fixed addressing
pub fn is_diagnostic_frame(frame: &RawFrame) -> bool {
    matches!(frame.can_id, Some(id) if id.extended && (id.raw >> 16) as u8 == DIAGNOSTIC_PF)
}

#[derive(Debug, Clone)]
pub struct UdsConfig {
    /// Wait for a response, restarted by each "response pending"
    pub timeout: Duration,
    /// Server address
    pub target_address: u8,
    /// Tester (this tool) address
    pub tester_address: u8,
    /// Fill byte for short frames
    pub padding: u8,
}

impl Default for UdsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            target_address: 0x00,
            tester_address: vda_link::TOOL_ADDRESS,
            padding: 0x00,
        }
    }
}

/// State of the single exchange slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingResponse { did: u16 },
    Complete { did: u16 },
    TimedOut { did: u16 },
}

/// Issues one request at a time; `&mut self` keeps callers serialized.
pub struct UdsDriver<S> {
    sender: S,
    responses: FrameConsumer,
    config: UdsConfig,
    state: ExchangeState,
    reassembler: IsoTpReassembler,
}

impl<S: CanSender> UdsDriver<S> {
    /// `responses` is the diagnostic tap of the CAN channel
    pub fn new(sender: S, responses: FrameConsumer, config: UdsConfig) -> Self {
        Self {
            sender,
            responses,
            config,
            state: ExchangeState::Idle,
            reassembler: IsoTpReassembler::new(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn config(&self) -> &UdsConfig {
        &self.config
    }

    /// Read one data identifier from the target.
    ///
    /// Waits at most the configured timeout for the response; a "response
    /// pending" answer restarts the wait. A timeout leaves the driver ready
    /// for the next request.
    pub async fn read_data_by_id(&mut self, did: u16) -> Result<Vec<u8>, UdsError> {
        let stale = self.responses.clear();
        if stale > 0 {
            debug!("Dropped {} stale diagnostic frames before DID {:04X}", stale, did);
        }
        self.reassembler.reset();

        let [hi, lo] = did.to_be_bytes();
        let request = single_frame(&[service::READ_DATA_BY_ID, hi, lo], self.config.padding)?;
        let tx_id = CanId::extended(request_id(self.config.target_address, self.config.tester_address));
        if let Err(e) = self.sender.send_can(tx_id, &request) {
            self.state = ExchangeState::Idle;
            return Err(e.into());
        }
        self.state = ExchangeState::AwaitingResponse { did };

        let result = self.await_response(did).await;
        self.state = match &result {
            Ok(_) => ExchangeState::Complete { did },
            Err(UdsError::Timeout { .. }) => ExchangeState::TimedOut { did },
            Err(_) => ExchangeState::Idle,
        };
        result
    }

    async fn await_response(&mut self, did: u16) -> Result<Vec<u8>, UdsError> {
        let rx_id = response_id(self.config.target_address, self.config.tester_address);
        let mut deadline = Instant::now() + self.config.timeout;

        loop {
            let frame = match timeout_at(deadline, self.responses.pop()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(UdsError::NotConnected),
                Err(_) => return Err(UdsError::Timeout { did }),
            };
            if frame.echoed || frame.can_id.map(|id| id.raw) != Some(rx_id) {
                continue;
            }

            let message = match self.reassembler.feed(&frame.payload) {
                Ok(Reassembly::Complete(message)) => message,
                Ok(Reassembly::SendFlowControl) => {
                    let tx_id = CanId::extended(request_id(self.config.target_address, self.config.tester_address));
                    self.sender.send_can(tx_id, &flow_control(self.config.padding))?;
                    continue;
                }
                Ok(Reassembly::InProgress) | Ok(Reassembly::Ignored) => continue,
                Err(IsoTpError::OutOfSequence { expected, got }) => {
                    debug!("Discarding response to DID {:04X}: expected sequence {} got {}", did, expected, got);
                    continue;
                }
                Err(e) => {
                    debug!("Ignoring diagnostic frame: {}", e);
                    continue;
                }
            };

            match message.as_slice() {
                [sid, hi, lo, data @ ..]
                    if *sid == service::READ_DATA_BY_ID + service::POSITIVE_OFFSET
                        && u16::from_be_bytes([*hi, *lo]) == did =>
                {
                    return Ok(data.to_vec());
                }
                [service::NEGATIVE_RESPONSE, service::READ_DATA_BY_ID, code, ..] => {
                    if *code == nrc::RESPONSE_PENDING {
                        debug!("DID {:04X} response pending", did);
                        deadline = Instant::now() + self.config.timeout;
                        continue;
                    }
                    return Err(UdsError::Negative {
                        service: service::READ_DATA_BY_ID,
                        code: *code,
                    });
                }
                _ => debug!("Uncorrelated UDS response {:02X?}", message),
            }
        }
    }

    /// Read every ISO 14229-1 Annex C identification DID
    pub async fn read_identification(&mut self) -> BTreeMap<u16, Result<Vec<u8>, UdsError>> {
        let mut results = BTreeMap::new();
        for did in IDENTIFICATION_DIDS {
            let result = self.read_data_by_id(did).await;
            if let Err(e) = &result {
                match e {
                    UdsError::Timeout { .. } | UdsError::Negative { .. } => {
                        debug!("DID {:04X}: {}", did, e)
                    }
                    _ => warn!("DID {:04X}: {}", did, e),
                }
            }
            results.insert(did, result);
        }
        let answered = results.values().filter(|r| r.is_ok()).count();
        info!("Identification sweep complete: {}/{} DIDs answered", answered, results.len());
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_queue::{bounded, FrameProducer};
    use std::sync::Mutex;

    type Reply = Box<dyn Fn(u32, &[u8]) -> Vec<(u32, Vec<u8>)> + Send + Sync>;

    /// Records requests and plays scripted replies into the tap
    struct ScriptedEcu {
        tap: FrameProducer,
        sent: Mutex<Vec<(u32, Vec<u8>)>>,
        reply: Mutex<Option<Reply>>,
    }

    impl ScriptedEcu {
        fn new(tap: FrameProducer) -> Arc<Self> {
            Arc::new(Self {
                tap,
                sent: Mutex::new(Vec::new()),
                reply: Mutex::new(None),
            })
        }

        fn answer_with(&self, reply: Reply) {
            *self.reply.lock().unwrap() = Some(reply);
        }

        fn sent(&self) -> Vec<(u32, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CanSender for ScriptedEcu {
        fn send_can(&self, id: CanId, data: &[u8]) -> Result<(), DeviceError> {
            self.sent.lock().unwrap().push((id.raw, data.to_vec()));
            if let Some(reply) = self.reply.lock().unwrap().as_ref() {
                for (id, data) in reply(id.raw, data) {
                    let _ = self.tap.try_push(RawFrame::can(id, &data, std::time::Instant::now()));
                }
            }
            Ok(())
        }
    }

    fn driver() -> (UdsDriver<Arc<ScriptedEcu>>, Arc<ScriptedEcu>) {
        let (tap, responses) = bounded(64);
        let ecu = ScriptedEcu::new(tap);
        (UdsDriver::new(ecu.clone(), responses, UdsConfig::default()), ecu)
    }

    const RX: u32 = 0x18DAF900;

    #[test]
    fn test_addressing() {
        assert_eq!(request_id(0x00, 0xF9), 0x18DA00F9);
        assert_eq!(response_id(0x00, 0xF9), 0x18DAF900);
        assert!(is_diagnostic_frame(&RawFrame::can(RX, &[0; 8], std::time::Instant::now())));
        assert!(!is_diagnostic_frame(&RawFrame::can(0x0CF00400, &[0; 8], std::time::Instant::now())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_frame_response() {
        let (mut driver, ecu) = driver();
        ecu.answer_with(Box::new(|_, req| {
            if req[1] == 0x22 {
                vec![(RX, vec![0x05, 0x62, req[2], req[3], 0x12, 0x34, 0, 0])]
            } else {
                vec![]
            }
        }));

        let data = driver.read_data_by_id(0xF18C).await.unwrap();
        assert_eq!(data, vec![0x12, 0x34]);
        assert_eq!(driver.state(), ExchangeState::Complete { did: 0xF18C });
        assert_eq!(ecu.sent()[0], (0x18DA00F9, vec![0x03, 0x22, 0xF1, 0x8C, 0, 0, 0, 0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_recovery() {
        let (mut driver, ecu) = driver();

        let result = driver.read_data_by_id(0xF190).await;
        assert_eq!(result, Err(UdsError::Timeout { did: 0xF190 }));
        assert_eq!(driver.state(), ExchangeState::TimedOut { did: 0xF190 });

        ecu.answer_with(Box::new(|_, req| {
            vec![(RX, vec![0x04, 0x62, req[2], req[3], 0xAB, 0, 0, 0])]
        }));
        assert_eq!(driver.read_data_by_id(0xF190).await.unwrap(), vec![0xAB]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_frame_response_with_flow_control() {
        let (mut driver, ecu) = driver();
        ecu.answer_with(Box::new(|_, req| match req[0] {
            0x03 => vec![(RX, vec![0x10, 20, 0x62, 0xF1, 0x90, b'1', b'X', b'K'])],
            0x30 => vec![
                (RX, vec![0x21, b'W', b'D', b'4', b'9', b'X', b'0', b'J']),
                (RX, vec![0x22, b'J', b'1', b'2', b'3', b'4', b'5', b'6']),
            ],
            _ => vec![],
        }));

        let vin = driver.read_data_by_id(0xF190).await.unwrap();
        assert_eq!(vin, b"1XKWD49X0JJ123456".to_vec());
        let sent = ecu.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1[0], 0x30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_response() {
        let (mut driver, ecu) = driver();
        ecu.answer_with(Box::new(|_, _| vec![(RX, vec![0x03, 0x7F, 0x22, 0x31, 0, 0, 0, 0])]));
        assert_eq!(
            driver.read_data_by_id(0xF195).await,
            Err(UdsError::Negative { service: 0x22, code: 0x31 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_pending_extends_wait() {
        let (tap, responses) = bounded(64);
        let ecu = ScriptedEcu::new(tap.clone());
        let mut driver = UdsDriver::new(ecu.clone(), responses, UdsConfig::default());

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(800)).await;
            tap.try_push(RawFrame::can(RX, &[0x03, 0x7F, 0x22, 0x78, 0, 0, 0, 0], std::time::Instant::now()))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(800)).await;
            tap.try_push(RawFrame::can(RX, &[0x04, 0x62, 0xF1, 0x80, 0x07, 0, 0, 0], std::time::Instant::now()))
                .unwrap();
        });

        assert_eq!(driver.read_data_by_id(0xF180).await.unwrap(), vec![0x07]);
        server.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_echo_and_other_addresses() {
        let (mut driver, ecu) = driver();
        ecu.answer_with(Box::new(|id, req| {
            vec![
                (0x18DAF917, vec![0x04, 0x62, 0xF1, 0x8A, 0xEE, 0, 0, 0]),
                (id, req.to_vec()),
                (RX, vec![0x04, 0x62, 0xF1, 0x8A, 0x01, 0, 0, 0]),
            ]
        }));
        assert_eq!(driver.read_data_by_id(0xF18A).await.unwrap(), vec![0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_echoed_response_id_ignored() {
        let (tap, responses) = bounded(64);
        let ecu = ScriptedEcu::new(tap.clone());
        let mut driver = UdsDriver::new(ecu.clone(), responses, UdsConfig::default());
        ecu.answer_with(Box::new(move |_, _| {
            let mut echo = RawFrame::can(RX, &[0x04, 0x62, 0xF1, 0x8B, 0xEE, 0, 0, 0], std::time::Instant::now());
            echo.echoed = true;
            let _ = tap.try_push(echo);
            vec![(RX, vec![0x04, 0x62, 0xF1, 0x8B, 0x02, 0, 0, 0])]
        }));
        assert_eq!(driver.read_data_by_id(0xF18B).await.unwrap(), vec![0x02]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identification_sweep() {
        let (mut driver, ecu) = driver();
        ecu.answer_with(Box::new(|_, req| {
            if req[2] == 0xF1 && req[3] == 0x90 {
                vec![(RX, vec![0x04, 0x62, 0xF1, 0x90, 0x56, 0, 0, 0])]
            } else {
                vec![(RX, vec![0x03, 0x7F, 0x22, 0x31, 0, 0, 0, 0])]
            }
        }));

        let results = driver.read_identification().await;
        assert_eq!(results.len(), 31);
        assert_eq!(results[&0xF190], Ok(vec![0x56]));
        assert_eq!(results[&0xF180], Err(UdsError::Negative { service: 0x22, code: 0x31 }));
    }
}
