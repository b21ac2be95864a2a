//! Exclusive access to the physical bus.

use std::sync::{Mutex, PoisonError};

use i2cnet::{Error, SmBus};
use i2cnet_proto::{BusOperation, BusResponse, Status, encode_scan_bitmap, is_valid_address};
use tracing::{debug, warn};

/// Owns the server's bus handle and runs one transaction at a time.
///
/// Every call to [`execute`](Self::execute) holds the lock for exactly one
/// hardware transaction (or one full scan) and releases it before
/// returning, so a slow or failed network write never keeps the bus locked.
pub struct Gateway {
    /// The single hardware handle.
    bus: Mutex<Box<dyn SmBus + Send>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").finish_non_exhaustive()
    }
}

impl Gateway {
    /// Takes ownership of `bus`.
    pub fn new(bus: impl SmBus + Send + 'static) -> Self {
        Self {
            bus: Mutex::new(Box::new(bus)),
        }
    }

    /// Runs `op` against the bus and reports the hardware outcome.
    ///
    /// Addresses outside `0x03..=0x77` answer [`Status::NoDevice`] without
    /// touching the hardware.
    pub fn execute(&self, op: &BusOperation) -> BusResponse {
        if let Some(address) = op.address() {
            if !is_valid_address(address) {
                debug!(address, "address out of range");
                return BusResponse::failure(Status::NoDevice);
            }
        }

        let outcome = {
            // A panic mid-transaction leaves the handle itself intact.
            let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
            run(&mut **bus, op)
        };

        match outcome {
            Ok(payload) => BusResponse::with_payload(payload),
            Err(Error::NoDevice { address }) => {
                debug!(address, opcode = ?op.opcode(), "no acknowledgment");
                BusResponse::failure(Status::NoDevice)
            }
            Err(e) => {
                warn!(error = %e, opcode = ?op.opcode(), "bus transaction failed");
                BusResponse::failure(Status::BusError)
            }
        }
    }
}

/// Performs one operation and encodes its result as a response payload.
fn run(bus: &mut dyn SmBus, op: &BusOperation) -> i2cnet::Result<Vec<u8>> {
    match *op {
        BusOperation::WriteQuick { address } => bus.write_quick(address).map(|()| Vec::new()),
        BusOperation::WriteByte { address, value } => {
            bus.write_byte(address, value).map(|()| Vec::new())
        }
        BusOperation::ReadByte { address } => bus.read_byte(address).map(|v| vec![v]),
        BusOperation::WriteByteData {
            address,
            register,
            value,
        } => bus
            .write_byte_data(address, register, value)
            .map(|()| Vec::new()),
        BusOperation::ReadByteData { address, register } => {
            bus.read_byte_data(address, register).map(|v| vec![v])
        }
        BusOperation::WriteWordData {
            address,
            register,
            value,
        } => bus
            .write_word_data(address, register, value)
            .map(|()| Vec::new()),
        BusOperation::ReadWordData { address, register } => bus
            .read_word_data(address, register)
            .map(|w| w.to_le_bytes().to_vec()),
        BusOperation::WriteBlock {
            address,
            register,
            ref data,
        } => bus
            .write_i2c_block_data(address, register, data)
            .map(|()| Vec::new()),
        BusOperation::ReadBlock {
            address,
            register,
            length,
        } => bus.read_i2c_block_data(address, register, length),
        BusOperation::Scan => bus.scan().map(|found| encode_scan_bitmap(&found).to_vec()),
        BusOperation::Reset => bus.reset().map(|()| Vec::new()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use i2cnet::{MockBus, Result};

    use super::*;

    #[test]
    fn write_then_read_same_register() {
        let gw = Gateway::new(MockBus::with_devices([0x50]));
        let write = BusOperation::WriteByteData {
            address: 0x50,
            register: 0x10,
            value: 0x55,
        };
        assert!(gw.execute(&write).is_ok());
        let read = BusOperation::ReadByteData {
            address: 0x50,
            register: 0x10,
        };
        assert_eq!(gw.execute(&read), BusResponse::with_payload(vec![0x55]));
    }

    #[test]
    fn out_of_range_address_is_no_device() {
        let gw = Gateway::new(MockBus::with_devices([0x00, 0x78]));
        for address in [0x00, 0x02, 0x78, 0x7F, 0xFF] {
            let resp = gw.execute(&BusOperation::ReadByte { address });
            assert_eq!(resp.status, Status::NoDevice, "address {address:#04x}");
        }
    }

    #[test]
    fn hardware_outcomes_map_to_status() {
        let mut bus = MockBus::with_devices([0x20, 0x21]);
        bus.fail_address(0x21);
        let gw = Gateway::new(bus);
        assert_eq!(
            gw.execute(&BusOperation::WriteQuick { address: 0x22 }).status,
            Status::NoDevice
        );
        assert_eq!(
            gw.execute(&BusOperation::WriteQuick { address: 0x21 }).status,
            Status::BusError
        );
        assert!(gw.execute(&BusOperation::WriteQuick { address: 0x20 }).is_ok());
    }

    #[test]
    fn scan_returns_bitmap() {
        let gw = Gateway::new(MockBus::with_devices([0x50, 0x68]));
        let resp = gw.execute(&BusOperation::Scan);
        assert_eq!(
            i2cnet_proto::decode_scan_bitmap(&resp.payload),
            vec![0x50, 0x68]
        );
    }

    #[test]
    fn scan_works_without_quick_write_support() {
        let mut bus = MockBus::with_devices([0x50, 0x68]);
        bus.reject_quick_writes();
        let gw = Gateway::new(bus);
        let resp = gw.execute(&BusOperation::Scan);
        assert!(resp.is_ok());
        assert_eq!(
            i2cnet_proto::decode_scan_bitmap(&resp.payload),
            vec![0x50, 0x68]
        );
    }

    #[test]
    fn word_payload_is_little_endian() {
        let gw = Gateway::new(MockBus::with_devices([0x40]));
        gw.execute(&BusOperation::WriteWordData {
            address: 0x40,
            register: 0,
            value: 0xBEEF,
        });
        let resp = gw.execute(&BusOperation::ReadWordData {
            address: 0x40,
            register: 0,
        });
        assert_eq!(resp.payload, vec![0xEF, 0xBE]);
    }

    /// Records the wall-clock span of every transaction and flags overlap.
    struct TimedBus {
        spans: Arc<Mutex<Vec<(Instant, Instant)>>>,
        active: Arc<AtomicUsize>,
        overlaps: Arc<AtomicUsize>,
    }

    impl TimedBus {
        fn transaction(&self) -> Result<()> {
            let start = Instant::now();
            if self.active.fetch_add(1, Ordering::SeqCst) != 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.spans.lock().unwrap().push((start, Instant::now()));
            Ok(())
        }
    }

    impl SmBus for TimedBus {
        fn write_quick(&mut self, _: u8) -> Result<()> {
            self.transaction()
        }
        fn write_byte(&mut self, _: u8, _: u8) -> Result<()> {
            self.transaction()
        }
        fn read_byte(&mut self, _: u8) -> Result<u8> {
            self.transaction().map(|()| 0)
        }
        fn write_byte_data(&mut self, _: u8, _: u8, _: u8) -> Result<()> {
            self.transaction()
        }
        fn read_byte_data(&mut self, _: u8, _: u8) -> Result<u8> {
            self.transaction().map(|()| 0)
        }
        fn write_word_data(&mut self, _: u8, _: u8, _: u16) -> Result<()> {
            self.transaction()
        }
        fn read_word_data(&mut self, _: u8, _: u8) -> Result<u16> {
            self.transaction().map(|()| 0)
        }
        fn write_i2c_block_data(&mut self, _: u8, _: u8, _: &[u8]) -> Result<()> {
            self.transaction()
        }
        fn read_i2c_block_data(&mut self, _: u8, _: u8, len: u8) -> Result<Vec<u8>> {
            self.transaction().map(|()| vec![0; usize::from(len)])
        }
    }

    #[test]
    fn concurrent_transactions_never_overlap() {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let gw = Arc::new(Gateway::new(TimedBus {
            spans: Arc::clone(&spans),
            active: Arc::new(AtomicUsize::new(0)),
            overlaps: Arc::clone(&overlaps),
        }));

        let workers = 4;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let gw = Arc::clone(&gw);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..10 {
                        let op = BusOperation::ReadByteData {
                            address: 0x40 + u8::try_from(i).unwrap(),
                            register: 0,
                        };
                        assert!(gw.execute(&op).is_ok());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        let mut spans = spans.lock().unwrap().clone();
        assert_eq!(spans.len(), workers * 10);
        spans.sort_by_key(|&(start, _)| start);
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "transactions overlapped");
        }
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        struct PanicBus(MockBus);
        impl SmBus for PanicBus {
            fn write_quick(&mut self, _: u8) -> Result<()> {
                panic!("hardware driver panicked")
            }
            fn write_byte(&mut self, a: u8, v: u8) -> Result<()> {
                self.0.write_byte(a, v)
            }
            fn read_byte(&mut self, a: u8) -> Result<u8> {
                self.0.read_byte(a)
            }
            fn write_byte_data(&mut self, a: u8, r: u8, v: u8) -> Result<()> {
                self.0.write_byte_data(a, r, v)
            }
            fn read_byte_data(&mut self, a: u8, r: u8) -> Result<u8> {
                self.0.read_byte_data(a, r)
            }
            fn write_word_data(&mut self, a: u8, r: u8, v: u16) -> Result<()> {
                self.0.write_word_data(a, r, v)
            }
            fn read_word_data(&mut self, a: u8, r: u8) -> Result<u16> {
                self.0.read_word_data(a, r)
            }
            fn write_i2c_block_data(&mut self, a: u8, r: u8, d: &[u8]) -> Result<()> {
                self.0.write_i2c_block_data(a, r, d)
            }
            fn read_i2c_block_data(&mut self, a: u8, r: u8, n: u8) -> Result<Vec<u8>> {
                self.0.read_i2c_block_data(a, r, n)
            }
        }

        let gw = Arc::new(Gateway::new(PanicBus(MockBus::with_devices([0x50]))));
        let gw2 = Arc::clone(&gw);
        let crashed = thread::spawn(move || gw2.execute(&BusOperation::WriteQuick { address: 0x50 }));
        assert!(crashed.join().is_err());

        let resp = gw.execute(&BusOperation::ReadByteData {
            address: 0x50,
            register: 0,
        });
        assert_eq!(resp, BusResponse::with_payload(vec![0]));
    }
}
