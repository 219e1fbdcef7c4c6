//! TMC single-wire UART transport
//!
//! The TMC2209/TMC2226 talk an addressed half-duplex UART protocol at
//! 115200 baud (8N1):
//!
//! - Write: sync `0x05`, node address, register | 0x80, 4 data bytes (big-endian), CRC8
//! - Read request: sync, node address, register, CRC8
//! - Read reply: sync, master address `0xFF`, register, 4 data bytes, CRC8
//!
//! TX and RX share one wire, so every byte sent is received back first.

use embedded_hal::delay::DelayNs;
use meridian_core::config::DriverInterface;
use meridian_hal::uart::Uart;
use meridian_hal::{UartRx, UartTx};

use super::registers::{read_address, write_address};
use super::{RegisterRead, RegisterTransport};
use crate::error::{DriverError, ProtocolError};

/// Sync byte starting every datagram
pub const SYNC_BYTE: u8 = 0x05;

/// Address the chip uses for its replies
pub const MASTER_ADDRESS: u8 = 0xFF;

/// Highest node address selectable through MS1/MS2
pub const MAX_NODE_ADDRESS: u8 = 3;

/// Idle time between datagrams
///
/// The chip needs 8 bit times before it accepts the next request and
/// waits as long before replying; 1 ms covers both at 115200 baud.
const INTER_DATAGRAM_US: u32 = 1_000;

/// CRC8 over a datagram
///
/// Polynomial 0x07, initial value 0, each byte shifted in LSB first.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut current = byte;
        for _ in 0..8 {
            if ((crc >> 7) ^ (current & 0x01)) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            current >>= 1;
        }
    }
    crc
}

/// Build a write datagram
pub fn build_write_datagram(address: u8, register: u8, data: u32) -> [u8; 8] {
    let mut datagram = [0u8; 8];
    datagram[0] = SYNC_BYTE;
    datagram[1] = address;
    datagram[2] = write_address(register);
    datagram[3..7].copy_from_slice(&data.to_be_bytes());
    datagram[7] = crc8(&datagram[..7]);
    datagram
}

/// Build a read request datagram
pub fn build_read_request(address: u8, register: u8) -> [u8; 4] {
    let mut datagram = [0u8; 4];
    datagram[0] = SYNC_BYTE;
    datagram[1] = address;
    datagram[2] = read_address(register);
    datagram[3] = crc8(&datagram[..3]);
    datagram
}

/// Parse a read reply for `register`
pub fn parse_read_response(response: &[u8; 8], register: u8) -> Result<u32, ProtocolError> {
    if response[0] != SYNC_BYTE {
        return Err(ProtocolError::InvalidSync);
    }

    if response[7] != crc8(&response[..7]) {
        return Err(ProtocolError::CrcMismatch);
    }

    if response[2] != read_address(register) {
        return Err(ProtocolError::UnexpectedRegister);
    }

    Ok(u32::from_be_bytes([
        response[3],
        response[4],
        response[5],
        response[6],
    ]))
}

/// Register transport over a TMC UART link
pub struct UartTransport<U, D> {
    uart: U,
    delay: D,
    address: u8,
    single_wire: bool,
}

impl<U: Uart, D: DelayNs> UartTransport<U, D> {
    /// Transport for the chip at `address` on a single-wire link
    pub fn new(uart: U, delay: D, address: u8) -> Self {
        Self {
            uart,
            delay,
            address: address.min(MAX_NODE_ADDRESS),
            single_wire: true,
        }
    }

    /// Use separate TX and RX wires (no echo)
    pub fn dual_wire(mut self) -> Self {
        self.single_wire = false;
        self
    }

    /// Node address
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    /// Release the UART and delay
    pub fn release(self) -> (U, D) {
        (self.uart, self.delay)
    }

    fn send(&mut self, datagram: &[u8]) -> Result<(), DriverError<<U as UartTx>::Error>> {
        self.uart.write_blocking(datagram).map_err(DriverError::Bus)?;
        self.uart.flush().map_err(DriverError::Bus)?;

        if self.single_wire {
            let mut echo = [0u8; 8];
            let echo = &mut echo[..datagram.len()];
            self.receive(echo)?;
            if *echo != *datagram {
                return Err(ProtocolError::EchoMismatch.into());
            }
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(), DriverError<<U as UartTx>::Error>> {
        let n = self.uart.read_blocking(buf).map_err(DriverError::Bus)?;
        if n < buf.len() {
            return Err(ProtocolError::Truncated.into());
        }
        Ok(())
    }
}

impl<U: Uart, D: DelayNs> RegisterTransport for UartTransport<U, D> {
    type Error = <U as UartTx>::Error;

    const INTERFACE: DriverInterface = DriverInterface::Uart;

    fn write_register(&mut self, register: u8, value: u32) -> Result<(), DriverError<Self::Error>> {
        let datagram = build_write_datagram(self.address, register, value);
        let result = self.send(&datagram);
        self.delay.delay_us(INTER_DATAGRAM_US);
        result
    }

    fn read_register(&mut self, register: u8) -> Result<RegisterRead, DriverError<Self::Error>> {
        let request = build_read_request(self.address, register);
        let result = self.send(&request).and_then(|()| {
            let mut response = [0u8; 8];
            self.receive(&mut response)?;
            Ok(parse_read_response(&response, register)?)
        });
        self.delay.delay_us(INTER_DATAGRAM_US);

        let value = result?;
        trace!("tmc uart read {=u8:#x} = {=u32:#x}", register, value);
        Ok(RegisterRead {
            value,
            status: None,
        })
    }

    fn pause_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stepper::tmc::registers::reg;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// UART that records what was written and replays queued bytes
    ///
    /// In single-wire mode every written byte is also queued for reading.
    #[derive(Default)]
    pub struct MockUart {
        pub written: Vec<u8>,
        pub rx: VecDeque<u8>,
        pub loopback: bool,
        pub corrupt_echo: bool,
    }

    impl MockUart {
        pub fn single_wire() -> Self {
            Self {
                loopback: true,
                ..Default::default()
            }
        }

        pub fn queue_reply(&mut self, register: u8, value: u32) {
            let mut reply = [0u8; 8];
            reply[0] = SYNC_BYTE;
            reply[1] = MASTER_ADDRESS;
            reply[2] = register;
            reply[3..7].copy_from_slice(&value.to_be_bytes());
            reply[7] = crc8(&reply[..7]);
            self.rx.extend(reply);
        }

        /// Register writes decoded from the sent bytes
        pub fn writes(&self) -> Vec<(u8, u32)> {
            let mut writes = Vec::new();
            let mut i = 0;
            while i < self.written.len() {
                if self.written[i + 2] & 0x80 != 0 {
                    let value = u32::from_be_bytes([
                        self.written[i + 3],
                        self.written[i + 4],
                        self.written[i + 5],
                        self.written[i + 6],
                    ]);
                    writes.push((self.written[i + 2] & 0x7F, value));
                    i += 8;
                } else {
                    i += 4;
                }
            }
            writes
        }
    }

    impl UartTx for MockUart {
        type Error = ();

        fn write_blocking(&mut self, data: &[u8]) -> Result<(), ()> {
            self.written.extend_from_slice(data);
            if self.loopback {
                // An echo arrives ahead of any queued reply
                let mut echo: Vec<u8> = data.to_vec();
                if self.corrupt_echo {
                    echo[1] ^= 0x01;
                }
                for byte in echo.into_iter().rev() {
                    self.rx.push_front(byte);
                }
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ()> {
            Ok(())
        }
    }

    impl UartRx for MockUart {
        type Error = ();

        fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
            let mut n = 0;
            for slot in buf.iter_mut() {
                match self.rx.pop_front() {
                    Some(byte) => {
                        *slot = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    #[derive(Default)]
    pub struct MockDelay {
        pub total_ns: u64,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += ns as u64;
        }
    }

    #[test]
    fn test_crc8_known_vectors() {
        assert_eq!(crc8(&[0x05, 0x00, 0x80, 0x00, 0x00, 0x01, 0xC0]), 0xF6);
        assert_eq!(crc8(&[0x05, 0x00, 0x6F]), 0x84);
        assert_eq!(crc8(&[0x05, 0x00, 0x00]), 0x48);
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn test_write_datagram() {
        let datagram = build_write_datagram(0, reg::GCONF, 0x0000_01C0);

        assert_eq!(datagram[0], SYNC_BYTE);
        assert_eq!(datagram[1], 0);
        assert_eq!(datagram[2], reg::GCONF | 0x80);
        assert_eq!(&datagram[3..7], &[0x00, 0x00, 0x01, 0xC0]);
        assert_eq!(datagram[7], 0xF6);
    }

    #[test]
    fn test_read_request() {
        let request = build_read_request(0, reg::DRV_STATUS);
        assert_eq!(request, [0x05, 0x00, 0x6F, 0x84]);

        // The write flag is stripped from read requests
        let request = build_read_request(2, reg::DRV_STATUS | 0x80);
        assert_eq!(request[2], reg::DRV_STATUS);
    }

    #[test]
    fn test_parse_read_response() {
        let response = [0x05, 0xFF, 0x6F, 0x12, 0x34, 0x56, 0x78, 0x79];
        assert_eq!(parse_read_response(&response, reg::DRV_STATUS), Ok(0x1234_5678));

        let mut bad_sync = response;
        bad_sync[0] = 0x00;
        assert_eq!(
            parse_read_response(&bad_sync, reg::DRV_STATUS),
            Err(ProtocolError::InvalidSync)
        );

        let mut bad_crc = response;
        bad_crc[7] = 0x00;
        assert_eq!(
            parse_read_response(&bad_crc, reg::DRV_STATUS),
            Err(ProtocolError::CrcMismatch)
        );

        assert_eq!(
            parse_read_response(&response, reg::GCONF),
            Err(ProtocolError::UnexpectedRegister)
        );
    }

    #[test]
    fn test_transport_write_checks_echo() {
        let mut transport = UartTransport::new(MockUart::single_wire(), MockDelay::default(), 1);
        transport.write_register(reg::CHOPCONF, 0x1401_0045).unwrap();

        let (uart, delay) = transport.release();
        assert_eq!(uart.written, [0x05, 0x01, 0xEC, 0x14, 0x01, 0x00, 0x45, 0xAA]);
        assert!(uart.rx.is_empty());
        assert!(delay.total_ns > 0);
    }

    #[test]
    fn test_transport_echo_mismatch() {
        let mut uart = MockUart::single_wire();
        uart.corrupt_echo = true;
        let mut transport = UartTransport::new(uart, MockDelay::default(), 0);

        assert_eq!(
            transport.write_register(reg::GCONF, 0),
            Err(DriverError::Protocol(ProtocolError::EchoMismatch))
        );
    }

    #[test]
    fn test_transport_read() {
        let mut uart = MockUart::single_wire();
        uart.queue_reply(reg::DRV_STATUS, 0x8000_0000);
        let mut transport = UartTransport::new(uart, MockDelay::default(), 0);

        let read = transport.read_register(reg::DRV_STATUS).unwrap();
        assert_eq!(read.value, 0x8000_0000);
        assert_eq!(read.status, None);
    }

    #[test]
    fn test_transport_read_without_reply_is_truncated() {
        let mut transport = UartTransport::new(MockUart::single_wire(), MockDelay::default(), 0);
        assert_eq!(
            transport.read_register(reg::DRV_STATUS),
            Err(DriverError::Protocol(ProtocolError::Truncated))
        );
    }

    #[test]
    fn test_dual_wire_has_no_echo() {
        let mut uart = MockUart::default();
        uart.queue_reply(reg::GCONF, 0x1C0);
        let mut transport = UartTransport::new(uart, MockDelay::default(), 3).dual_wire();

        assert_eq!(transport.read_register(reg::GCONF).unwrap().value, 0x1C0);
        transport.write_register(reg::GCONF, 0x1C4).unwrap();
        let (uart, _) = transport.release();
        assert_eq!(uart.writes(), std::vec![(reg::GCONF, 0x1C4)]);
    }

    #[test]
    fn test_address_clamped() {
        let transport = UartTransport::new(MockUart::default(), MockDelay::default(), 7);
        assert_eq!(transport.address(), MAX_NODE_ADDRESS);
    }
}
